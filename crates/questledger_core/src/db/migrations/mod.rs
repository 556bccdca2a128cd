//! Ledger schema migrations.
//!
//! # Responsibility
//! - List the ledger schema steps: players and the audit log (1), the
//!   per-org quest catalog and check-in settings (2), the pending award
//!   outbox (3).
//! - Bring a connection from its `user_version` to the latest step in one
//!   transaction.
//!
//! # Invariants
//! - Steps are append-only and numbered without gaps; a shipped step is
//!   never edited.
//! - A failed step rolls back the whole batch and leaves `user_version`
//!   at its previous value.

use crate::db::{DbError, DbResult};
use log::{debug, error, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "players_audit_log",
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        name: "quests",
        sql: include_str!("0002_quests.sql"),
    },
    Migration {
        version: 3,
        name: "pending_awards",
        sql: include_str!("0003_pending_awards.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tx.execute_batch(migration.sql).map_err(|source| {
            error!(
                "event=db_migrate module=db status=error version={} name={} error={source}",
                migration.version, migration.name
            );
            DbError::Migration {
                version: migration.version,
                source,
            }
        })?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
        debug!(
            "event=db_migrate module=db status=step version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from_version={current_version} to_version={latest}"
    );
    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
