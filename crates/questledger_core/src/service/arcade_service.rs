//! Arcade tier completion.
//!
//! # Responsibility
//! - Clamp a claimed tier against what the submitted stats justify.
//! - Enforce the weekly anti-regression ladder and award only the XP
//!   difference between the new tier and this week's best.
//! - Keep per-game weekly best records with per-stat running maxima.
//!
//! # Invariants
//! - A player can only claim a strictly higher tier than this week's best.
//! - A new ISO week starts a fresh ladder (best tier 0, empty bests).
//! - The lifetime completion marker is independent of the weekly ladder.
//! - Without stats the claimed tier is trusted as submitted.

use crate::model::audit::{AuditDraft, AuditEventType, XpContext};
use crate::model::player::{ArcadeRecord, PlayerKey};
use crate::model::quest::QuestType;
use crate::model::week::WeekKey;
use crate::progression::arcade::{effective_tier, GameStats, StatsSubmission, MAX_TIER};
use crate::repo::player_repo::PendingAward;
use crate::repo::LedgerStore;
use crate::service::clock::Clock;
use crate::service::error::LedgerError;
use crate::service::ledger_service::{LedgerService, PlayerSummary};
use crate::service::quest_service::log_quest_error;
use log::info;
use serde_json::json;

/// Result of `complete_arcade_quest`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcadeCompletion {
    pub week_key: WeekKey,
    /// Effective tier recorded after the stats clamp.
    pub tier: u8,
    pub xp_awarded: i64,
    pub summary: PlayerSummary,
}

impl<S: LedgerStore, C: Clock> LedgerService<S, C> {
    /// Records an arcade result at `claimed_level` and awards the tier
    /// difference.
    pub fn complete_arcade_quest(
        &mut self,
        key: &PlayerKey,
        quest_id: &str,
        claimed_level: u8,
        stats: Option<StatsSubmission>,
    ) -> Result<ArcadeCompletion, LedgerError> {
        if !(1..=MAX_TIER).contains(&claimed_level) {
            return Err(log_quest_error(
                "arcade_tier_complete",
                key,
                quest_id,
                LedgerError::InvalidLevel(claimed_level),
            ));
        }

        let week = self.current_week();
        self.reconcile_pending(key, &week)?;

        let quest = self.load_quest(&key.org_id, quest_id)?;
        let game = match (quest.kind, quest.arcade_game) {
            (QuestType::Arcade, Some(game)) => game,
            _ => {
                return Err(log_quest_error(
                    "arcade_tier_complete",
                    key,
                    quest_id,
                    LedgerError::QuestNotStartable {
                        quest_id: quest.id.clone(),
                        kind: quest.kind,
                    },
                ));
            }
        };
        if !quest.is_active {
            return Err(log_quest_error(
                "arcade_tier_complete",
                key,
                quest_id,
                LedgerError::QuestInactive(quest.id.clone()),
            ));
        }

        let typed_stats = stats.as_ref().map(|raw| GameStats::from_submission(game, raw));
        let tier = effective_tier(claimed_level, typed_stats.as_ref());

        let award = self
            .store
            .with_transaction(key, |write| -> Result<PendingAward, LedgerError> {
                let previous_best = write
                    .player
                    .special_events
                    .get(&game)
                    .map_or(0, |record| record.best_level_in(&week));
                if tier <= previous_best {
                    return Err(LedgerError::TierAlreadyRecorded {
                        quest_id: quest.id.clone(),
                        tier,
                        best_level: previous_best,
                    });
                }

                let delta = quest.xp_for_level(tier) - quest.xp_for_level(previous_best);
                if delta <= 0 {
                    return Err(LedgerError::NoXpDelta {
                        quest_id: quest.id.clone(),
                        tier,
                    });
                }

                let record = write
                    .player
                    .special_events
                    .entry(game)
                    .or_insert_with(|| ArcadeRecord {
                        week_key: week.clone(),
                        best_level: 0,
                        best: GameStats::empty(game),
                        last_result: None,
                    });
                if record.week_key != week {
                    record.week_key = week.clone();
                    record.best = GameStats::empty(game);
                }
                record.best_level = tier;
                if let Some(submitted) = typed_stats.as_ref() {
                    record.best.merge_max(submitted);
                }
                record.last_result = stats.clone();

                write.player.mark_completed_once(&quest.id);

                let award = PendingAward::new(
                    key.clone(),
                    delta,
                    XpContext::new(game.xp_source())
                        .with_quest(quest.id.as_str())
                        .with_meta(json!({ "weekKey": week.as_str(), "tier": tier })),
                    Some(
                        AuditDraft::lifecycle(AuditEventType::ArcadeTierComplete, game.xp_source())
                            .with_quest(quest.id.as_str())
                            .with_xp_change(delta)
                            .with_meta(json!({
                                "weekKey": week.as_str(),
                                "tier": tier,
                                "stats": stats,
                            })),
                    ),
                );
                write.enqueue_award(award.clone());
                Ok(award)
            })
            .map_err(|err| log_quest_error("arcade_tier_complete", key, quest_id, err))?;

        self.settle_award(&award, &week)?;
        info!(
            "event=arcade_tier_complete module=arcade status=ok org_id={} user_id={} quest_id={} game={} claimed={} tier={} xp={}",
            key.org_id,
            key.user_id,
            quest.id,
            game.as_str(),
            claimed_level,
            tier,
            award.xp
        );

        let player = self.load_player(key)?;
        Ok(ArcadeCompletion {
            week_key: week,
            tier,
            xp_awarded: award.xp,
            summary: PlayerSummary::from(&player),
        })
    }
}
