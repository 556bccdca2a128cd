//! Rank and level derivation from total XP.
//!
//! # Responsibility
//! - Map total XP to a rank tier, a level number and progress windows.
//!
//! # Invariants
//! - Rank tiers are ascending, non-overlapping and gapless from 0 XP.
//! - Negative XP is clamped to 0 before any lookup.
//! - No state, no I/O.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// XP span of one level.
pub const LEVEL_STEP: i64 = 1000;

/// XP at which the unbounded top tier reports 100% progress.
pub const TOP_TIER_SENTINEL_XP: i64 = 150_000;

/// Player rank tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Underdog,
    Rookie,
    BountyHunter,
    Maverick,
    Legend,
}

impl Rank {
    /// Stable storage id.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Underdog => "underdog",
            Self::Rookie => "rookie",
            Self::BountyHunter => "bounty_hunter",
            Self::Maverick => "maverick",
            Self::Legend => "legend",
        }
    }

    /// Parses a stored rank id.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "underdog" => Some(Self::Underdog),
            "rookie" => Some(Self::Rookie),
            "bounty_hunter" => Some(Self::BountyHunter),
            "maverick" => Some(Self::Maverick),
            "legend" => Some(Self::Legend),
            _ => None,
        }
    }

    /// User-facing rank name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Underdog => "Underdog",
            Self::Rookie => "Rookie",
            Self::BountyHunter => "Bounty Hunter",
            Self::Maverick => "Maverick",
            Self::Legend => "Legend",
        }
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One row of the rank table. `max_xp = None` marks the unbounded top tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankTier {
    pub rank: Rank,
    pub min_xp: i64,
    pub max_xp: Option<i64>,
}

pub const RANK_TIERS: &[RankTier] = &[
    RankTier {
        rank: Rank::Underdog,
        min_xp: 0,
        max_xp: Some(999),
    },
    RankTier {
        rank: Rank::Rookie,
        min_xp: 1_000,
        max_xp: Some(14_999),
    },
    RankTier {
        rank: Rank::BountyHunter,
        min_xp: 15_000,
        max_xp: Some(39_999),
    },
    RankTier {
        rank: Rank::Maverick,
        min_xp: 40_000,
        max_xp: Some(74_999),
    },
    RankTier {
        rank: Rank::Legend,
        min_xp: 75_000,
        max_xp: None,
    },
];

/// Progress view over rank tier and level windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankProgress {
    pub rank: Rank,
    pub tier_min_xp: i64,
    /// `None` for the top tier.
    pub tier_max_xp: Option<i64>,
    /// Percent through the current tier, in `[0, 100]`.
    pub progress_percent: f64,
    /// True when the player sits in the top tier.
    pub is_max_rank: bool,
    pub level: i64,
    pub level_min_xp: i64,
    pub level_max_xp: i64,
    pub level_progress_percent: f64,
}

/// Returns the tier row that contains `xp`.
pub fn tier_for(xp: i64) -> &'static RankTier {
    let xp = xp.max(0);
    RANK_TIERS
        .iter()
        .rev()
        .find(|tier| tier.min_xp <= xp)
        .unwrap_or(&RANK_TIERS[0])
}

pub fn rank_for(xp: i64) -> Rank {
    tier_for(xp).rank
}

/// `floor(max(0, xp) / LEVEL_STEP) + 1`.
pub fn level_for(xp: i64) -> i64 {
    xp.max(0) / LEVEL_STEP + 1
}

pub fn progress_for(xp: i64) -> RankProgress {
    let xp = xp.max(0);
    let tier = tier_for(xp);
    let level = level_for(xp);

    // The top tier has no ceiling; measure it against the sentinel instead.
    let percent_ceiling = tier.max_xp.unwrap_or(TOP_TIER_SENTINEL_XP);
    let level_min_xp = (level - 1) * LEVEL_STEP;

    RankProgress {
        rank: tier.rank,
        tier_min_xp: tier.min_xp,
        tier_max_xp: tier.max_xp,
        progress_percent: percent_between(xp, tier.min_xp, percent_ceiling),
        is_max_rank: tier.max_xp.is_none(),
        level,
        level_min_xp,
        level_max_xp: level_min_xp.saturating_add(LEVEL_STEP - 1),
        level_progress_percent: percent_between(
            xp,
            level_min_xp,
            level_min_xp.saturating_add(LEVEL_STEP),
        ),
    }
}

fn percent_between(xp: i64, min: i64, max: i64) -> f64 {
    if max <= min {
        return 100.0;
    }
    let ratio = (xp - min) as f64 / (max - min) as f64;
    (ratio * 100.0).clamp(0.0, 100.0)
}
