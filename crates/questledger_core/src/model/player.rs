//! Player aggregate model.
//!
//! # Responsibility
//! - Hold the mutable per-player record owned by the player store.
//! - Provide the small set-like helpers the quest engines mutate through.
//!
//! # Invariants
//! - `total_xp >= 0` and `weekly_xp >= 0`.
//! - `rank` and `level` always match what `progression::rank` derives from
//!   `total_xp`.
//! - `completed_quest_ids` is a completion history: a quest id appears once
//!   per completion, so capped quests can be counted.
//!
//! # See also
//! - progression/rank.rs

use crate::model::week::WeekKey;
use crate::progression::arcade::{ArcadeGame, GameStats, StatsSubmission};
use crate::progression::rank::{level_for, rank_for, Rank};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Identity of one player inside one organization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerKey {
    pub org_id: String,
    pub user_id: String,
}

impl PlayerKey {
    pub fn new(org_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl Display for PlayerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.org_id, self.user_id)
    }
}

/// Weekly best record for one mini-game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcadeRecord {
    pub week_key: WeekKey,
    /// Best tier reached during `week_key`.
    pub best_level: u8,
    /// Per-stat running maxima for `week_key`.
    pub best: GameStats,
    /// Raw stats of the most recent accepted submission.
    pub last_result: Option<StatsSubmission>,
}

impl ArcadeRecord {
    /// Best tier that still counts in `week`. A stale week starts at 0.
    pub fn best_level_in(&self, week: &WeekKey) -> u8 {
        if &self.week_key == week {
            self.best_level
        } else {
            0
        }
    }
}

/// Mutable player aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub key: PlayerKey,
    pub total_xp: i64,
    pub rank: Rank,
    pub level: i64,
    pub weekly_xp: i64,
    pub weekly_week_key: WeekKey,
    pub active_quest_ids: Vec<String>,
    pub completed_quest_ids: Vec<String>,
    pub special_events: BTreeMap<ArcadeGame, ArcadeRecord>,
    /// Opaque pass-through field.
    pub current_program_id: Option<String>,
    /// Opaque pass-through field.
    pub inventory: Vec<serde_json::Value>,
    /// Optimistic concurrency counter, bumped on every write.
    pub revision: i64,
    /// Epoch milliseconds, assigned by storage.
    pub created_at: i64,
    /// Epoch milliseconds, assigned by storage.
    pub updated_at: i64,
}

impl Player {
    /// Fresh player with zero XP in `week`.
    pub fn new(key: PlayerKey, week: WeekKey) -> Self {
        Self {
            key,
            total_xp: 0,
            rank: rank_for(0),
            level: level_for(0),
            weekly_xp: 0,
            weekly_week_key: week,
            active_quest_ids: Vec::new(),
            completed_quest_ids: Vec::new(),
            special_events: BTreeMap::new(),
            current_program_id: None,
            inventory: Vec::new(),
            revision: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn is_active(&self, quest_id: &str) -> bool {
        self.active_quest_ids.iter().any(|id| id == quest_id)
    }

    pub fn has_completed(&self, quest_id: &str) -> bool {
        self.completed_quest_ids.iter().any(|id| id == quest_id)
    }

    /// Number of recorded completions of `quest_id`.
    pub fn completion_count(&self, quest_id: &str) -> usize {
        self.completed_quest_ids
            .iter()
            .filter(|id| id.as_str() == quest_id)
            .count()
    }

    /// Adds `quest_id` to the active set. Returns `false` if already active.
    pub fn activate(&mut self, quest_id: &str) -> bool {
        if self.is_active(quest_id) {
            return false;
        }
        self.active_quest_ids.push(quest_id.to_string());
        true
    }

    /// Removes `quest_id` from the active set and records one completion.
    pub fn record_completion(&mut self, quest_id: &str) {
        self.active_quest_ids.retain(|id| id != quest_id);
        self.completed_quest_ids.push(quest_id.to_string());
    }

    /// Records a lifetime completion marker once.
    pub fn mark_completed_once(&mut self, quest_id: &str) {
        if !self.has_completed(quest_id) {
            self.completed_quest_ids.push(quest_id.to_string());
        }
    }

    /// Checks the derived-field and non-negativity invariants.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.total_xp < 0 {
            return Err(format!("total_xp is negative: {}", self.total_xp));
        }
        if self.weekly_xp < 0 {
            return Err(format!("weekly_xp is negative: {}", self.weekly_xp));
        }
        if self.rank != rank_for(self.total_xp) {
            return Err(format!(
                "rank `{}` does not match total_xp {}",
                self.rank.as_str(),
                self.total_xp
            ));
        }
        if self.level != level_for(self.total_xp) {
            return Err(format!(
                "level {} does not match total_xp {}",
                self.level, self.total_xp
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Player, PlayerKey};
    use crate::model::week::WeekKey;
    use crate::progression::rank::Rank;

    fn player() -> Player {
        Player::new(
            PlayerKey::new("org-1", "user-1"),
            WeekKey::parse("2024-W33").unwrap(),
        )
    }

    #[test]
    fn new_player_starts_at_lowest_rank() {
        let player = player();
        assert_eq!(player.total_xp, 0);
        assert_eq!(player.rank, Rank::Underdog);
        assert_eq!(player.level, 1);
        assert!(player.check_invariants().is_ok());
    }

    #[test]
    fn completion_moves_out_of_active_set() {
        let mut player = player();
        assert!(player.activate("q1"));
        assert!(!player.activate("q1"));
        player.record_completion("q1");
        assert!(!player.is_active("q1"));
        assert_eq!(player.completion_count("q1"), 1);

        player.record_completion("q1");
        assert_eq!(player.completion_count("q1"), 2);

        player.mark_completed_once("q1");
        assert_eq!(player.completion_count("q1"), 2);
    }

    #[test]
    fn invariants_detect_stale_rank() {
        let mut player = player();
        player.total_xp = 1_200;
        assert!(player.check_invariants().is_err());
    }
}
