//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate player-store transactions into ledger, quest, arcade and
//!   check-in operations.
//! - Keep outer surfaces (HTTP, CLI) decoupled from storage details.
//!
//! # Invariants
//! - Quest and tier state commit in one transaction; XP commits in a
//!   second one. Awards staged by the first are applied by the second or,
//!   after an interruption, by the next request's reconciliation.

pub mod arcade_service;
pub mod checkin_service;
pub mod clock;
pub mod error;
pub mod ledger_service;
pub mod quest_service;
