//! Core engine for the quest XP ledger.
//! This crate is the single source of truth for XP, rank and quest
//! progression invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod progression;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::audit::{AuditDraft, AuditEventType, AuditLogEntry, XpContext};
pub use model::player::{ArcadeRecord, Player, PlayerKey};
pub use model::quest::{Quest, QuestType, QuestValidationError, TierLevel};
pub use model::week::WeekKey;
pub use progression::arcade::{ArcadeGame, GameStats, StatsSubmission};
pub use progression::rank::{level_for, progress_for, rank_for, Rank, RankProgress};
pub use repo::audit_repo::AuditLog;
pub use repo::player_repo::{
    PendingAward, PlayerStore, PlayerWrite, RepoError, RepoResult, SqliteLedgerStore,
    MAX_TX_ATTEMPTS,
};
pub use repo::quest_repo::{OrgSettings, QuestCatalog};
pub use repo::LedgerStore;
pub use service::arcade_service::ArcadeCompletion;
pub use service::checkin_service::{CheckinResult, CheckinSource};
pub use service::clock::{Clock, ManualClock, SystemClock};
pub use service::error::{ensure_actor, LedgerError};
pub use service::ledger_service::{apply_xp_delta, LedgerService, PlayerSummary, MAX_XP_DELTA};
pub use service::quest_service::QuestCompletion;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
