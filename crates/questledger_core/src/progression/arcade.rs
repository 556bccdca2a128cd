//! Arcade mini-game telemetry and tier math.
//!
//! # Responsibility
//! - Type each mini-game's submitted stats.
//! - Recompute the tier that submitted stats justify, and clamp claims to it.
//! - Merge per-stat running maxima for weekly best records.
//!
//! # Invariants
//! - Stats never justify less than tier 1 or more than tier 3.
//! - A claim is only ever lowered by the stats clamp, never raised.

use serde::{Deserialize, Serialize};

/// Highest claimable arcade tier.
pub const MAX_TIER: u8 = 3;

const GALAXY_PADDLE_HITS: [i64; 3] = [5, 15, 30];
const GALAXY_PADDLE_SURVIVAL_MS: [i64; 3] = [30_000, 60_000, 120_000];
const NEBULA_BREAK_BRICKS: [i64; 3] = [10, 25, 45];
const NEBULA_BREAK_SCORE: [i64; 3] = [500, 1_500, 3_000];
const NEON_MEMORY_PAIRS: [i64; 3] = [4, 8, 12];

/// Mini-game identity. Also the key of the player's special-event map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcadeGame {
    GalaxyPaddle,
    NebulaBreak,
    NeonMemory,
}

impl ArcadeGame {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GalaxyPaddle => "galaxy_paddle",
            Self::NebulaBreak => "nebula_break",
            Self::NeonMemory => "neon_memory",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "galaxy_paddle" => Some(Self::GalaxyPaddle),
            "nebula_break" => Some(Self::NebulaBreak),
            "neon_memory" => Some(Self::NeonMemory),
            _ => None,
        }
    }

    /// Ledger source tag for XP earned in this game.
    pub fn xp_source(self) -> &'static str {
        match self {
            Self::GalaxyPaddle => "arcade_galaxy_paddle",
            Self::NebulaBreak => "arcade_nebula_break",
            Self::NeonMemory => "arcade_neon_memory",
        }
    }
}

/// Raw stats object as submitted by a client. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSubmission {
    pub hits: Option<i64>,
    pub time_ms: Option<i64>,
    pub max_speed: Option<f64>,
    pub score: Option<i64>,
    pub bricks: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalaxyPaddleStats {
    pub hits: Option<i64>,
    pub time_ms: Option<i64>,
    pub max_speed: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NebulaBreakStats {
    pub bricks: Option<i64>,
    pub score: Option<i64>,
    pub time_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeonMemoryStats {
    /// Matched pairs.
    pub score: Option<i64>,
    pub time_ms: Option<i64>,
}

/// Typed telemetry, one variant per mini-game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameStats {
    GalaxyPaddle(GalaxyPaddleStats),
    NebulaBreak(NebulaBreakStats),
    NeonMemory(NeonMemoryStats),
}

impl GameStats {
    /// Keeps the fields relevant to `game` and drops the rest.
    pub fn from_submission(game: ArcadeGame, raw: &StatsSubmission) -> Self {
        match game {
            ArcadeGame::GalaxyPaddle => Self::GalaxyPaddle(GalaxyPaddleStats {
                hits: raw.hits,
                time_ms: raw.time_ms,
                max_speed: raw.max_speed.filter(|speed| speed.is_finite()),
            }),
            ArcadeGame::NebulaBreak => Self::NebulaBreak(NebulaBreakStats {
                bricks: raw.bricks,
                score: raw.score,
                time_ms: raw.time_ms,
            }),
            ArcadeGame::NeonMemory => Self::NeonMemory(NeonMemoryStats {
                score: raw.score,
                time_ms: raw.time_ms,
            }),
        }
    }

    /// Empty stats record for `game`.
    pub fn empty(game: ArcadeGame) -> Self {
        Self::from_submission(game, &StatsSubmission::default())
    }

    pub fn game(&self) -> ArcadeGame {
        match self {
            Self::GalaxyPaddle(_) => ArcadeGame::GalaxyPaddle,
            Self::NebulaBreak(_) => ArcadeGame::NebulaBreak,
            Self::NeonMemory(_) => ArcadeGame::NeonMemory,
        }
    }

    /// Highest tier these stats support, floored at 1.
    pub fn justified_tier(&self) -> u8 {
        let tier = match self {
            Self::GalaxyPaddle(stats) => tier_from(stats.hits, &GALAXY_PADDLE_HITS)
                .max(tier_from(stats.time_ms, &GALAXY_PADDLE_SURVIVAL_MS)),
            Self::NebulaBreak(stats) => tier_from(stats.bricks, &NEBULA_BREAK_BRICKS)
                .max(tier_from(stats.score, &NEBULA_BREAK_SCORE)),
            Self::NeonMemory(stats) => tier_from(stats.score, &NEON_MEMORY_PAIRS),
        };
        tier.clamp(1, MAX_TIER)
    }

    /// Raises every stored stat to the newer value where the newer one is
    /// higher. Missing new values leave the stored best untouched.
    pub fn merge_max(&mut self, newer: &GameStats) {
        match (self, newer) {
            (Self::GalaxyPaddle(best), Self::GalaxyPaddle(new)) => {
                best.hits = max_opt(best.hits, new.hits);
                best.time_ms = max_opt(best.time_ms, new.time_ms);
                best.max_speed = max_opt_f64(best.max_speed, new.max_speed);
            }
            (Self::NebulaBreak(best), Self::NebulaBreak(new)) => {
                best.bricks = max_opt(best.bricks, new.bricks);
                best.score = max_opt(best.score, new.score);
                best.time_ms = max_opt(best.time_ms, new.time_ms);
            }
            (Self::NeonMemory(best), Self::NeonMemory(new)) => {
                best.score = max_opt(best.score, new.score);
                best.time_ms = max_opt(best.time_ms, new.time_ms);
            }
            (best, new) => *best = new.clone(),
        }
    }
}

/// Clamps a claimed tier to what the stats justify.
///
/// Without stats the claim is trusted as-is.
pub fn effective_tier(claimed: u8, stats: Option<&GameStats>) -> u8 {
    match stats {
        Some(stats) => claimed.min(stats.justified_tier()),
        None => claimed,
    }
}

fn tier_from(value: Option<i64>, thresholds: &[i64; 3]) -> u8 {
    let Some(value) = value else {
        return 0;
    };
    thresholds
        .iter()
        .take_while(|threshold| value >= **threshold)
        .count() as u8
}

fn max_opt(stored: Option<i64>, new: Option<i64>) -> Option<i64> {
    match (stored, new) {
        (Some(stored), Some(new)) => Some(stored.max(new)),
        (stored, None) => stored,
        (None, new) => new,
    }
}

fn max_opt_f64(stored: Option<f64>, new: Option<f64>) -> Option<f64> {
    match (stored, new) {
        (Some(stored), Some(new)) => Some(stored.max(new)),
        (stored, None) => stored,
        (None, new) => new,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        effective_tier, ArcadeGame, GalaxyPaddleStats, GameStats, NebulaBreakStats,
        StatsSubmission,
    };

    fn paddle(hits: Option<i64>, time_ms: Option<i64>) -> GameStats {
        GameStats::GalaxyPaddle(GalaxyPaddleStats {
            hits,
            time_ms,
            max_speed: None,
        })
    }

    #[test]
    fn stats_below_first_threshold_still_justify_tier_one() {
        let stats = paddle(Some(2), Some(500));
        assert_eq!(stats.justified_tier(), 1);
        assert_eq!(effective_tier(3, Some(&stats)), 1);
    }

    #[test]
    fn best_criterion_wins_for_paddle() {
        assert_eq!(paddle(Some(16), Some(1_000)).justified_tier(), 2);
        assert_eq!(paddle(Some(1), Some(125_000)).justified_tier(), 3);
    }

    #[test]
    fn claim_is_never_raised_and_trusted_without_stats() {
        let strong = paddle(Some(100), None);
        assert_eq!(effective_tier(1, Some(&strong)), 1);
        assert_eq!(effective_tier(3, None), 3);
    }

    #[test]
    fn submission_keeps_only_game_fields() {
        let raw = StatsSubmission {
            hits: Some(9),
            bricks: Some(30),
            score: Some(700),
            ..StatsSubmission::default()
        };
        let stats = GameStats::from_submission(ArcadeGame::NebulaBreak, &raw);
        assert_eq!(
            stats,
            GameStats::NebulaBreak(NebulaBreakStats {
                bricks: Some(30),
                score: Some(700),
                time_ms: None,
            })
        );
        assert_eq!(stats.justified_tier(), 2);
    }

    #[test]
    fn merge_keeps_per_stat_maxima_independently() {
        let mut best = paddle(Some(20), Some(10_000));
        best.merge_max(&paddle(Some(5), Some(90_000)));
        assert_eq!(best, paddle(Some(20), Some(90_000)));

        best.merge_max(&paddle(None, None));
        assert_eq!(best, paddle(Some(20), Some(90_000)));
    }

    #[test]
    fn stats_serialize_with_game_tag() {
        let json = serde_json::to_value(paddle(Some(3), None)).unwrap();
        assert_eq!(json["game"], "galaxy_paddle");
        assert_eq!(json["hits"], 3);
    }
}
