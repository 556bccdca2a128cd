//! Ledger database bootstrap.
//!
//! # Responsibility
//! - Open SQLite connections for the XP ledger and bring the schema up to
//!   date before any player, quest or audit row is touched.
//! - Name the server clock used for every stored timestamp.
//!
//! # Invariants
//! - `players` holds one aggregate row per `(org_id, user_id)`; `revision`
//!   grows by one per committed write.
//! - `audit_log` only ever grows; triggers abort UPDATE and DELETE.
//! - `pending_awards` rows exist only between the quest write that stages
//!   an award and the XP write that applies it.
//! - `created_at`/`updated_at` come from `NOW_MS_SQL`, never from callers.
//! - A connection whose `user_version` is newer than this binary is refused.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// SQL expression for the server-assigned timestamp in epoch milliseconds.
pub(crate) const NOW_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER)";

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A migration script failed; nothing from the batch was kept.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "ledger schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Migration { version, source } => {
                write!(f, "ledger migration {version} failed: {source}")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::Migration { source, .. } => Some(source),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
