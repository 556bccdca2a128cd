//! Domain model for the XP ledger and quest engine.
//!
//! # Responsibility
//! - Define the player aggregate, quest documents and audit entries.
//! - Keep storage-agnostic invariants next to the data they protect.
//!
//! # Invariants
//! - A player is identified by the `(org_id, user_id)` pair.
//! - Audit entries are immutable once written.

pub mod audit;
pub mod player;
pub mod quest;
pub mod week;
