//! Audit log entries.
//!
//! # Invariants
//! - Every audited side effect maps to exactly one `AuditEventType`; there
//!   is no catch-all variant.
//! - Entries are never mutated after they are written.

use crate::model::player::PlayerKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audited event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Xp,
    QuestStart,
    QuestComplete,
    ArcadeTierComplete,
    Checkin,
    RewardRedeem,
    Referral,
}

impl AuditEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Xp => "xp",
            Self::QuestStart => "quest_start",
            Self::QuestComplete => "quest_complete",
            Self::ArcadeTierComplete => "arcade_tier_complete",
            Self::Checkin => "checkin",
            Self::RewardRedeem => "reward_redeem",
            Self::Referral => "referral",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "xp" => Some(Self::Xp),
            "quest_start" => Some(Self::QuestStart),
            "quest_complete" => Some(Self::QuestComplete),
            "arcade_tier_complete" => Some(Self::ArcadeTierComplete),
            "checkin" => Some(Self::Checkin),
            "reward_redeem" => Some(Self::RewardRedeem),
            "referral" => Some(Self::Referral),
            _ => None,
        }
    }
}

/// Caller-supplied context attached to an XP change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpContext {
    pub source: String,
    pub quest_id: Option<String>,
    pub reward_id: Option<String>,
    pub meta: Option<serde_json::Value>,
}

impl XpContext {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn with_quest(mut self, quest_id: impl Into<String>) -> Self {
        self.quest_id = Some(quest_id.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Entry content before storage assigns identity and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDraft {
    pub event_type: AuditEventType,
    pub xp_change: Option<i64>,
    pub quest_id: Option<String>,
    pub reward_id: Option<String>,
    pub source: String,
    pub meta: Option<serde_json::Value>,
}

impl AuditDraft {
    /// Lifecycle entry without an XP component.
    pub fn lifecycle(event_type: AuditEventType, source: impl Into<String>) -> Self {
        Self {
            event_type,
            xp_change: None,
            quest_id: None,
            reward_id: None,
            source: source.into(),
            meta: None,
        }
    }

    /// `xp` entry mirroring one ledger change.
    pub fn xp(delta: i64, ctx: &XpContext) -> Self {
        Self {
            event_type: AuditEventType::Xp,
            xp_change: Some(delta),
            quest_id: ctx.quest_id.clone(),
            reward_id: ctx.reward_id.clone(),
            source: ctx.source.clone(),
            meta: ctx.meta.clone(),
        }
    }

    pub fn with_quest(mut self, quest_id: impl Into<String>) -> Self {
        self.quest_id = Some(quest_id.into());
        self
    }

    pub fn with_xp_change(mut self, xp_change: i64) -> Self {
        self.xp_change = Some(xp_change);
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Persisted, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub entry_id: Uuid,
    pub key: PlayerKey,
    pub event_type: AuditEventType,
    pub xp_change: Option<i64>,
    pub quest_id: Option<String>,
    pub reward_id: Option<String>,
    pub source: String,
    pub meta: Option<serde_json::Value>,
    /// Server-assigned epoch milliseconds, non-decreasing per player.
    pub timestamp: i64,
}
