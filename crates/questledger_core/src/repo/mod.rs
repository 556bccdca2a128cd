//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the storage contracts the ledger and quest engines depend on.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`PlayerNotFound`, `Conflict`)
//!   in addition to DB transport errors.
//! - All player mutations go through `PlayerStore::with_transaction`.

pub mod audit_repo;
pub mod player_repo;
pub mod quest_repo;

use crate::repo::audit_repo::AuditLog;
use crate::repo::player_repo::PlayerStore;
use crate::repo::quest_repo::QuestCatalog;

/// Everything the ledger services need from storage.
pub trait LedgerStore: PlayerStore + QuestCatalog + AuditLog {}

impl<T: PlayerStore + QuestCatalog + AuditLog> LedgerStore for T {}
