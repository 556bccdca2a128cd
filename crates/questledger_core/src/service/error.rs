//! Error taxonomy surfaced by the ledger services.

use crate::model::player::PlayerKey;
use crate::model::quest::QuestType;
use crate::repo::player_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Typed failure of one ledger or quest operation.
#[derive(Debug)]
pub enum LedgerError {
    /// No aggregate exists for the `(org, user)` pair.
    PlayerNotFound(PlayerKey),
    QuestNotFound(String),
    QuestInactive(String),
    /// Quest type is not accepted by this entry point.
    QuestNotStartable {
        quest_id: String,
        kind: QuestType,
    },
    QuestAlreadyCompletedOneTime(String),
    /// An at-most-N quest has already been completed N times.
    CompletionLimitReached {
        quest_id: String,
        max_completions: u32,
    },
    /// Claimed tier does not beat this week's best.
    TierAlreadyRecorded {
        quest_id: String,
        tier: u8,
        best_level: u8,
    },
    /// The tier ladder yields no positive XP for this step.
    NoXpDelta {
        quest_id: String,
        tier: u8,
    },
    /// XP amount is not finite or exceeds `MAX_XP_DELTA` in magnitude.
    InvalidAmount(f64),
    /// Claimed arcade level is outside `1..=3`.
    InvalidLevel(u8),
    /// Actor may not act on another player's record.
    Unauthorized {
        actor_user_id: String,
        target: PlayerKey,
    },
    Repo(RepoError),
}

impl LedgerError {
    /// HTTP-equivalent status for outer surfaces.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::PlayerNotFound(_) | Self::QuestNotFound(_) => 404,
            Self::QuestInactive(_)
            | Self::QuestNotStartable { .. }
            | Self::QuestAlreadyCompletedOneTime(_)
            | Self::InvalidAmount(_)
            | Self::InvalidLevel(_) => 400,
            Self::CompletionLimitReached { .. }
            | Self::TierAlreadyRecorded { .. }
            | Self::NoXpDelta { .. } => 409,
            Self::Unauthorized { .. } => 403,
            Self::Repo(_) => 500,
        }
    }

    /// Stable machine-readable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PlayerNotFound(_) => "player_not_found",
            Self::QuestNotFound(_) => "quest_not_found",
            Self::QuestInactive(_) => "quest_inactive",
            Self::QuestNotStartable { .. } => "quest_not_startable",
            Self::QuestAlreadyCompletedOneTime(_) => "quest_already_completed",
            Self::CompletionLimitReached { .. } => "completion_limit_reached",
            Self::TierAlreadyRecorded { .. } => "tier_already_recorded",
            Self::NoXpDelta { .. } => "no_xp_delta",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidLevel(_) => "invalid_level",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Repo(_) => "storage_error",
        }
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlayerNotFound(key) => write!(f, "player not found: {key}"),
            Self::QuestNotFound(id) => write!(f, "quest not found: {id}"),
            Self::QuestInactive(id) => write!(f, "quest is inactive: {id}"),
            Self::QuestNotStartable { quest_id, kind } => write!(
                f,
                "quest {quest_id} of type `{}` cannot be used here",
                kind.as_str()
            ),
            Self::QuestAlreadyCompletedOneTime(id) => {
                write!(f, "one-time quest already completed: {id}")
            }
            Self::CompletionLimitReached {
                quest_id,
                max_completions,
            } => write!(
                f,
                "quest {quest_id} already completed {max_completions} times"
            ),
            Self::TierAlreadyRecorded {
                quest_id,
                tier,
                best_level,
            } => write!(
                f,
                "tier {tier} for quest {quest_id} does not beat this week's best {best_level}"
            ),
            Self::NoXpDelta { quest_id, tier } => {
                write!(f, "tier {tier} for quest {quest_id} yields no additional xp")
            }
            Self::InvalidAmount(value) => {
                write!(f, "xp amount must be finite and within range, got {value}")
            }
            Self::InvalidLevel(level) => write!(f, "arcade level must be 1..=3, got {level}"),
            Self::Unauthorized {
                actor_user_id,
                target,
            } => write!(f, "actor {actor_user_id} may not act on player {target}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LedgerError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::PlayerNotFound(key) => Self::PlayerNotFound(key),
            other => Self::Repo(other),
        }
    }
}

/// Rejects self-service calls where the actor is not the target player.
pub fn ensure_actor(actor_user_id: &str, target: &PlayerKey) -> Result<(), LedgerError> {
    if actor_user_id.is_empty() || actor_user_id != target.user_id {
        return Err(LedgerError::Unauthorized {
            actor_user_id: actor_user_id.to_string(),
            target: target.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ensure_actor, LedgerError};
    use crate::model::player::PlayerKey;
    use crate::repo::player_repo::RepoError;

    #[test]
    fn repo_not_found_maps_to_player_not_found() {
        let key = PlayerKey::new("org", "u1");
        let err = LedgerError::from(RepoError::PlayerNotFound(key.clone()));
        assert!(matches!(err, LedgerError::PlayerNotFound(ref k) if *k == key));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn nothing_to_do_errors_are_conflicts() {
        let err = LedgerError::TierAlreadyRecorded {
            quest_id: "paddle".to_string(),
            tier: 2,
            best_level: 2,
        };
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.code(), "tier_already_recorded");
    }

    #[test]
    fn ensure_actor_only_allows_self() {
        let key = PlayerKey::new("org", "u1");
        assert!(ensure_actor("u1", &key).is_ok());
        let err = ensure_actor("u2", &key).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert!(ensure_actor("", &key).is_err());
    }
}
