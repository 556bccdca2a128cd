//! XP ledger service: the single authorized path for changing total XP.
//!
//! # Responsibility
//! - Apply XP deltas with rank/level recomputation and weekly windowing.
//! - Apply pending awards staged by quest transactions (phase 2) and
//!   reconcile awards left behind by an interrupted request.
//! - Serve the player read path (lazy create + progress view).
//!
//! # Invariants
//! - `total_xp` is floored at 0; `weekly_xp` is floored at 0.
//! - After any update `weekly_week_key` equals the week of that update.
//! - Every nonzero delta stages exactly one `xp` audit entry in the same
//!   atomic write as the aggregate change.

use crate::model::audit::{AuditDraft, AuditLogEntry, XpContext};
use crate::model::player::{Player, PlayerKey};
use crate::model::week::WeekKey;
use crate::progression::rank::{level_for, progress_for, rank_for, Rank, RankProgress};
use crate::repo::player_repo::{PendingAward, PlayerWrite, RepoError};
use crate::repo::LedgerStore;
use crate::service::clock::{Clock, SystemClock};
use crate::service::error::LedgerError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Largest magnitude accepted by `award_xp` for one call.
pub const MAX_XP_DELTA: i64 = 1_000_000_000_000;

/// Read model returned by every ledger and quest operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub key: PlayerKey,
    pub total_xp: i64,
    pub rank: Rank,
    pub level: i64,
    pub weekly_xp: i64,
    pub weekly_week_key: WeekKey,
    pub progress: RankProgress,
    pub active_quest_ids: Vec<String>,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            key: player.key.clone(),
            total_xp: player.total_xp,
            rank: player.rank,
            level: player.level,
            weekly_xp: player.weekly_xp,
            weekly_week_key: player.weekly_week_key.clone(),
            progress: progress_for(player.total_xp),
            active_quest_ids: player.active_quest_ids.clone(),
        }
    }
}

/// Facade over the ledger, quest, arcade and check-in engines.
pub struct LedgerService<S: LedgerStore, C: Clock = SystemClock> {
    pub(crate) store: S,
    clock: C,
}

impl<S: LedgerStore> LedgerService<S, SystemClock> {
    /// Creates a service on the wall clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: LedgerStore, C: Clock> LedgerService<S, C> {
    pub fn with_clock(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Week key for the request being served. Read once per request.
    pub(crate) fn current_week(&self) -> WeekKey {
        WeekKey::from_datetime(self.clock.now())
    }

    /// Loads the player, creating it on first touch, after applying any
    /// awards an interrupted request left pending.
    pub fn player_summary(&mut self, key: &PlayerKey) -> Result<PlayerSummary, LedgerError> {
        let week = self.current_week();
        self.get_or_create_player(key, &week)?;
        self.reconcile_pending(key, &week)?;
        let player = self.load_player(key)?;
        Ok(PlayerSummary::from(&player))
    }

    /// Lists the audit trail for one player in write order.
    pub fn audit_entries(&self, key: &PlayerKey) -> Result<Vec<AuditLogEntry>, LedgerError> {
        Ok(self.store.list_entries(key)?)
    }

    /// Applies an arbitrary XP delta.
    ///
    /// `delta_xp` is rounded to the nearest integer and must fit in
    /// `±MAX_XP_DELTA`. The player must already exist.
    pub fn award_xp(
        &mut self,
        key: &PlayerKey,
        delta_xp: f64,
        ctx: XpContext,
    ) -> Result<PlayerSummary, LedgerError> {
        let Some(delta) = xp_delta_from_f64(delta_xp) else {
            warn!(
                "event=award_xp module=ledger status=error org_id={} user_id={} error_code=invalid_amount",
                key.org_id, key.user_id
            );
            return Err(LedgerError::InvalidAmount(delta_xp));
        };

        let week = self.current_week();
        self.reconcile_pending(key, &week)?;
        let player = self.update_xp(key, delta, &ctx, &week)?;
        Ok(PlayerSummary::from(&player))
    }

    /// Ledger transaction: one aggregate write plus, for nonzero deltas,
    /// one `xp` audit entry.
    pub(crate) fn update_xp(
        &mut self,
        key: &PlayerKey,
        delta: i64,
        ctx: &XpContext,
        week: &WeekKey,
    ) -> Result<Player, LedgerError> {
        let player = self
            .store
            .with_transaction(key, |write| -> Result<Player, LedgerError> {
                stage_xp_change(write, delta, ctx, week);
                Ok(write.player.clone())
            })
            .inspect_err(|err| log_ledger_error(key, err))?;

        info!(
            "event=award_xp module=ledger status=ok org_id={} user_id={} delta={} total_xp={} rank={} source={}",
            key.org_id,
            key.user_id,
            delta,
            player.total_xp,
            player.rank.as_str(),
            ctx.source
        );
        Ok(player)
    }

    /// Phase 2 of a completion: applies `award`, writes its follow-up
    /// lifecycle entry and removes it from the pending set atomically.
    ///
    /// Returns `Ok(false)` when another writer already applied it.
    pub(crate) fn settle_award(
        &mut self,
        award: &PendingAward,
        week: &WeekKey,
    ) -> Result<bool, LedgerError> {
        let result = self
            .store
            .with_transaction(&award.key, |write| -> Result<(), LedgerError> {
                stage_xp_change(write, award.xp, &award.context, week);
                if let Some(follow_up) = award.follow_up.as_ref() {
                    write.append_audit(follow_up.clone());
                }
                write.settle_award(award.award_id);
                Ok(())
            });

        match result {
            Ok(()) => {
                info!(
                    "event=settle_award module=ledger status=ok org_id={} user_id={} award_id={} delta={} source={}",
                    award.key.org_id, award.key.user_id, award.award_id, award.xp, award.context.source
                );
                Ok(true)
            }
            Err(LedgerError::Repo(RepoError::AwardSettled(award_id))) => {
                debug!(
                    "event=settle_award module=ledger status=noop org_id={} user_id={} award_id={award_id}",
                    award.key.org_id, award.key.user_id
                );
                Ok(false)
            }
            Err(err) => {
                log_ledger_error(&award.key, &err);
                Err(err)
            }
        }
    }

    /// Applies every award still pending for `key`. Returns how many were
    /// applied by this call.
    pub fn reconcile(&mut self, key: &PlayerKey) -> Result<usize, LedgerError> {
        let week = self.current_week();
        self.reconcile_pending(key, &week)
    }

    pub(crate) fn reconcile_pending(
        &mut self,
        key: &PlayerKey,
        week: &WeekKey,
    ) -> Result<usize, LedgerError> {
        let pending = self.store.pending_awards(key)?;
        let mut applied = 0;
        for award in &pending {
            if self.settle_award(award, week)? {
                applied += 1;
            }
        }
        if applied > 0 {
            warn!(
                "event=reconcile module=ledger status=ok org_id={} user_id={} applied={}",
                key.org_id, key.user_id, applied
            );
        }
        Ok(applied)
    }

    pub(crate) fn load_player(&self, key: &PlayerKey) -> Result<Player, LedgerError> {
        self.store
            .get_player(key)?
            .ok_or_else(|| LedgerError::PlayerNotFound(key.clone()))
    }

    fn get_or_create_player(
        &self,
        key: &PlayerKey,
        week: &WeekKey,
    ) -> Result<Player, LedgerError> {
        if let Some(player) = self.store.get_player(key)? {
            return Ok(player);
        }
        let player = self
            .store
            .create_player(&Player::new(key.clone(), week.clone()))?;
        info!(
            "event=player_create module=ledger status=ok org_id={} user_id={} week={}",
            key.org_id, key.user_id, week
        );
        Ok(player)
    }
}

/// Rounds a caller-supplied amount. `None` for non-finite values and for
/// anything beyond `MAX_XP_DELTA` in magnitude.
fn xp_delta_from_f64(delta_xp: f64) -> Option<i64> {
    if !delta_xp.is_finite() {
        return None;
    }
    let rounded = delta_xp.round();
    if rounded.abs() > MAX_XP_DELTA as f64 {
        return None;
    }
    Some(rounded as i64)
}

/// Applies `delta` to the aggregate fields: floor at zero, derived rank and
/// level, weekly window reset when `week` differs from the stored key.
pub fn apply_xp_delta(player: &mut Player, delta: i64, week: &WeekKey) {
    let total_xp = player.total_xp.saturating_add(delta).max(0);
    player.total_xp = total_xp;
    player.rank = rank_for(total_xp);
    player.level = level_for(total_xp);

    player.weekly_xp = if &player.weekly_week_key == week {
        player.weekly_xp.saturating_add(delta).max(0)
    } else {
        delta.max(0)
    };
    player.weekly_week_key = week.clone();
}

pub(crate) fn stage_xp_change(
    write: &mut PlayerWrite,
    delta: i64,
    ctx: &XpContext,
    week: &WeekKey,
) {
    apply_xp_delta(&mut write.player, delta, week);
    if delta != 0 {
        write.append_audit(AuditDraft::xp(delta, ctx));
    }
}

fn log_ledger_error(key: &PlayerKey, err: &LedgerError) {
    warn!(
        "event=award_xp module=ledger status=error org_id={} user_id={} error_code={} error={}",
        key.org_id,
        key.user_id,
        err.code(),
        err
    );
}

#[cfg(test)]
mod tests {
    use super::apply_xp_delta;
    use crate::model::player::{Player, PlayerKey};
    use crate::model::week::WeekKey;
    use crate::progression::rank::Rank;

    fn week(value: &str) -> WeekKey {
        WeekKey::parse(value).unwrap()
    }

    fn player_in(week_key: &str) -> Player {
        Player::new(PlayerKey::new("org", "u1"), week(week_key))
    }

    #[test]
    fn delta_recomputes_rank_and_level() {
        let mut player = player_in("2024-W33");
        apply_xp_delta(&mut player, 1_200, &week("2024-W33"));
        assert_eq!(player.total_xp, 1_200);
        assert_eq!(player.rank, Rank::Rookie);
        assert_eq!(player.level, 2);
        assert_eq!(player.weekly_xp, 1_200);
    }

    #[test]
    fn large_negative_delta_floors_at_zero() {
        let mut player = player_in("2024-W33");
        apply_xp_delta(&mut player, 300, &week("2024-W33"));
        apply_xp_delta(&mut player, -5_000, &week("2024-W33"));
        assert_eq!(player.total_xp, 0);
        assert_eq!(player.weekly_xp, 0);
        assert_eq!(player.rank, Rank::Underdog);

        apply_xp_delta(&mut player, i64::MIN, &week("2024-W33"));
        assert_eq!(player.total_xp, 0);
    }

    #[test]
    fn new_week_resets_window_to_floored_delta() {
        let mut player = player_in("2024-W33");
        apply_xp_delta(&mut player, 400, &week("2024-W33"));
        apply_xp_delta(&mut player, 150, &week("2024-W34"));
        assert_eq!(player.weekly_xp, 150);
        assert_eq!(player.weekly_week_key, week("2024-W34"));
        assert_eq!(player.total_xp, 550);

        apply_xp_delta(&mut player, -50, &week("2024-W35"));
        assert_eq!(player.weekly_xp, 0);
        assert_eq!(player.weekly_week_key, week("2024-W35"));
        assert_eq!(player.total_xp, 500);
    }
}
