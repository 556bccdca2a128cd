//! Quest document model (authored outside the engine, read-only here).
//!
//! # Invariants
//! - `xp` and every tier reward are non-negative.
//! - Arcade quests name the mini-game they belong to.
//! - Check-in quests carry a non-empty check-in code.

use crate::progression::arcade::ArcadeGame;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum number of arcade reward tiers.
pub const MAX_TIERS: usize = 3;

/// Quest category. Controls which entry points may drive the quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestType {
    Checkin,
    Purchase,
    Photo,
    Referral,
    Visit,
    Custom,
    Arcade,
}

impl QuestType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checkin => "checkin",
            Self::Purchase => "purchase",
            Self::Photo => "photo",
            Self::Referral => "referral",
            Self::Visit => "visit",
            Self::Custom => "custom",
            Self::Arcade => "arcade",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "checkin" => Some(Self::Checkin),
            "purchase" => Some(Self::Purchase),
            "photo" => Some(Self::Photo),
            "referral" => Some(Self::Referral),
            "visit" => Some(Self::Visit),
            "custom" => Some(Self::Custom),
            "arcade" => Some(Self::Arcade),
            _ => None,
        }
    }

    /// Direct-completable types skip the active state entirely.
    pub fn is_direct_completable(self) -> bool {
        matches!(self, Self::Checkin | Self::Arcade)
    }
}

/// One arcade reward tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLevel {
    pub xp: i64,
}

/// Externally authored quest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QuestType,
    /// Base reward, and the fallback ladder base for arcade quests.
    pub xp: i64,
    /// Three-tier ladder for arcade quests.
    pub levels: Option<Vec<TierLevel>>,
    /// `None` means unlimited, `Some(1)` means one-time.
    pub max_completions_per_user: Option<u32>,
    pub is_active: bool,
    pub checkin_code: Option<String>,
    pub arcade_game: Option<ArcadeGame>,
}

impl Quest {
    /// Creates an active, unlimited quest with no tiers.
    pub fn new(id: impl Into<String>, kind: QuestType, xp: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            xp,
            levels: None,
            max_completions_per_user: None,
            is_active: true,
            checkin_code: None,
            arcade_game: None,
        }
    }

    pub fn is_one_time(&self) -> bool {
        self.max_completions_per_user == Some(1)
    }

    /// Returns whether `completions` prior completions exhaust the cap.
    pub fn cap_reached(&self, completions: usize) -> bool {
        match self.max_completions_per_user {
            Some(cap) => completions >= cap as usize,
            None => false,
        }
    }

    /// XP granted for reaching `level` (0 means "nothing yet").
    ///
    /// Missing ladder entries fall back to `level * xp`.
    pub fn xp_for_level(&self, level: u8) -> i64 {
        if level == 0 {
            return 0;
        }
        let index = usize::from(level) - 1;
        self.levels
            .as_ref()
            .and_then(|levels| levels.get(index))
            .map(|tier| tier.xp)
            .unwrap_or_else(|| self.xp.saturating_mul(i64::from(level)))
    }

    pub fn validate(&self) -> Result<(), QuestValidationError> {
        if self.id.trim().is_empty() {
            return Err(QuestValidationError::EmptyId);
        }
        if self.xp < 0 {
            return Err(QuestValidationError::NegativeXp(self.xp));
        }
        if let Some(levels) = self.levels.as_ref() {
            if levels.len() > MAX_TIERS {
                return Err(QuestValidationError::TooManyTiers(levels.len()));
            }
            if let Some(tier) = levels.iter().find(|tier| tier.xp < 0) {
                return Err(QuestValidationError::NegativeXp(tier.xp));
            }
        }
        if self.max_completions_per_user == Some(0) {
            return Err(QuestValidationError::ZeroCompletionCap);
        }
        match self.kind {
            QuestType::Checkin => {
                let has_code = self
                    .checkin_code
                    .as_deref()
                    .is_some_and(|code| !code.trim().is_empty());
                if !has_code {
                    return Err(QuestValidationError::MissingCheckinCode);
                }
            }
            QuestType::Arcade => {
                if self.arcade_game.is_none() {
                    return Err(QuestValidationError::MissingArcadeGame);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Validation failures for quest documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestValidationError {
    EmptyId,
    NegativeXp(i64),
    TooManyTiers(usize),
    ZeroCompletionCap,
    MissingCheckinCode,
    MissingArcadeGame,
}

impl Display for QuestValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "quest id must not be blank"),
            Self::NegativeXp(xp) => write!(f, "quest xp must be non-negative, got {xp}"),
            Self::TooManyTiers(count) => {
                write!(f, "quest defines {count} tiers, at most {MAX_TIERS} allowed")
            }
            Self::ZeroCompletionCap => write!(f, "maxCompletionsPerUser must be at least 1"),
            Self::MissingCheckinCode => write!(f, "checkin quest requires a checkin code"),
            Self::MissingArcadeGame => write!(f, "arcade quest requires an arcade game"),
        }
    }
}

impl Error for QuestValidationError {}
