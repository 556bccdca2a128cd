//! Quest start/complete state machine.
//!
//! # Responsibility
//! - Move a quest between not-started, active and completed for a player.
//! - Gate transitions by quest type, activity flag and completion cap.
//!
//! # Invariants
//! - Ordinary quests must be active before they can complete; checkin and
//!   arcade quests complete directly.
//! - Removal from `active_quest_ids` and the completion append happen in
//!   one atomic write, together with the staged XP award.
//! - XP is only awarded when this call's own transaction recorded the
//!   completion.

use crate::model::audit::{AuditDraft, AuditEventType, XpContext};
use crate::model::player::PlayerKey;
use crate::model::quest::Quest;
use crate::model::week::WeekKey;
use crate::repo::player_repo::PendingAward;
use crate::repo::LedgerStore;
use crate::service::clock::Clock;
use crate::service::error::LedgerError;
use crate::service::ledger_service::{LedgerService, PlayerSummary};
use log::{debug, info, warn};

/// XP source tag for ordinary quest completions.
pub const QUEST_COMPLETE_SOURCE: &str = "quest_complete";

/// Result of `complete_quest`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestCompletion {
    /// Whether this call recorded a new completion.
    pub completed: bool,
    pub xp_awarded: i64,
    pub summary: PlayerSummary,
}

impl<S: LedgerStore, C: Clock> LedgerService<S, C> {
    /// Activates an ordinary quest. Idempotent when already active.
    pub fn start_quest(
        &mut self,
        key: &PlayerKey,
        quest_id: &str,
    ) -> Result<PlayerSummary, LedgerError> {
        let week = self.current_week();
        self.reconcile_pending(key, &week)?;

        let quest = self.load_quest(&key.org_id, quest_id)?;
        if quest.kind.is_direct_completable() {
            return Err(log_quest_error(
                "quest_start",
                key,
                quest_id,
                LedgerError::QuestNotStartable {
                    quest_id: quest.id.clone(),
                    kind: quest.kind,
                },
            ));
        }
        if !quest.is_active {
            return Err(log_quest_error(
                "quest_start",
                key,
                quest_id,
                LedgerError::QuestInactive(quest.id.clone()),
            ));
        }

        let started = self
            .store
            .with_transaction(key, |write| -> Result<bool, LedgerError> {
                let completions = write.player.completion_count(&quest.id);
                if quest.is_one_time() && completions >= 1 {
                    return Err(LedgerError::QuestAlreadyCompletedOneTime(quest.id.clone()));
                }
                if let Some(max_completions) = quest.max_completions_per_user {
                    if quest.cap_reached(completions) {
                        return Err(LedgerError::CompletionLimitReached {
                            quest_id: quest.id.clone(),
                            max_completions,
                        });
                    }
                }
                if !write.player.activate(&quest.id) {
                    return Ok(false);
                }
                write.append_audit(
                    AuditDraft::lifecycle(AuditEventType::QuestStart, "quest_start")
                        .with_quest(quest.id.as_str()),
                );
                Ok(true)
            })
            .map_err(|err| log_quest_error("quest_start", key, quest_id, err))?;

        info!(
            "event=quest_start module=quest status={} org_id={} user_id={} quest_id={}",
            if started { "ok" } else { "noop" },
            key.org_id,
            key.user_id,
            quest.id
        );
        let player = self.load_player(key)?;
        Ok(PlayerSummary::from(&player))
    }

    /// Completes a quest and awards its base XP when the transition happens.
    ///
    /// Completing an ordinary quest that is not active, or a capped quest
    /// whose cap is reached, is a silent no-op with zero XP.
    pub fn complete_quest(
        &mut self,
        key: &PlayerKey,
        quest_id: &str,
    ) -> Result<QuestCompletion, LedgerError> {
        let week = self.current_week();
        self.reconcile_pending(key, &week)?;

        let quest = self.load_quest(&key.org_id, quest_id)?;
        if !quest.is_active {
            return Err(log_quest_error(
                "quest_complete",
                key,
                quest_id,
                LedgerError::QuestInactive(quest.id.clone()),
            ));
        }

        let xp_awarded = self.complete_loaded_quest(key, &quest, QUEST_COMPLETE_SOURCE, &week)?;
        let player = self.load_player(key)?;
        Ok(QuestCompletion {
            completed: xp_awarded.is_some(),
            xp_awarded: xp_awarded.unwrap_or(0),
            summary: PlayerSummary::from(&player),
        })
    }

    /// Runs both completion phases for an already loaded quest.
    ///
    /// Returns `None` when no completion was recorded, otherwise the XP
    /// granted by this call.
    pub(crate) fn complete_loaded_quest(
        &mut self,
        key: &PlayerKey,
        quest: &Quest,
        source: &str,
        week: &WeekKey,
    ) -> Result<Option<i64>, LedgerError> {
        let award = self
            .store
            .with_transaction(key, |write| -> Result<Option<PendingAward>, LedgerError> {
                let player = &mut write.player;
                if !quest.kind.is_direct_completable() && !player.is_active(&quest.id) {
                    return Ok(None);
                }
                if quest.cap_reached(player.completion_count(&quest.id)) {
                    return Ok(None);
                }
                player.record_completion(&quest.id);

                let award = PendingAward::new(
                    key.clone(),
                    quest.xp,
                    XpContext::new(source).with_quest(quest.id.as_str()),
                    Some(
                        AuditDraft::lifecycle(AuditEventType::QuestComplete, source)
                            .with_quest(quest.id.as_str())
                            .with_xp_change(quest.xp),
                    ),
                );
                write.enqueue_award(award.clone());
                Ok(Some(award))
            })
            .map_err(|err| log_quest_error("quest_complete", key, &quest.id, err))?;

        let Some(award) = award else {
            debug!(
                "event=quest_complete module=quest status=noop org_id={} user_id={} quest_id={}",
                key.org_id, key.user_id, quest.id
            );
            return Ok(None);
        };

        self.settle_award(&award, week)?;
        info!(
            "event=quest_complete module=quest status=ok org_id={} user_id={} quest_id={} xp={} source={}",
            key.org_id, key.user_id, quest.id, award.xp, source
        );
        Ok(Some(award.xp))
    }

    pub(crate) fn load_quest(&self, org_id: &str, quest_id: &str) -> Result<Quest, LedgerError> {
        self.store
            .get_quest(org_id, quest_id)?
            .ok_or_else(|| LedgerError::QuestNotFound(quest_id.to_string()))
    }
}

pub(crate) fn log_quest_error(
    event: &str,
    key: &PlayerKey,
    quest_id: &str,
    err: LedgerError,
) -> LedgerError {
    warn!(
        "event={event} module=quest status=error org_id={} user_id={} quest_id={} error_code={}",
        key.org_id,
        key.user_id,
        quest_id,
        err.code()
    );
    err
}
