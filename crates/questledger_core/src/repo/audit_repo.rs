//! Append-only audit log storage.
//!
//! # Invariants
//! - Entries are only ever inserted; the schema aborts UPDATE and DELETE.
//! - Per player, `timestamp` never decreases in `seq` order.

use crate::db::NOW_MS_SQL;
use crate::model::audit::{AuditDraft, AuditEventType, AuditLogEntry};
use crate::model::player::PlayerKey;
use crate::repo::player_repo::{from_json, to_json, RepoError, RepoResult, SqliteLedgerStore};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Audit log contract.
pub trait AuditLog {
    /// Appends one standalone entry for an existing player.
    fn append_entry(&self, key: &PlayerKey, draft: &AuditDraft) -> RepoResult<AuditLogEntry>;
    /// Lists a player's entries in write order.
    fn list_entries(&self, key: &PlayerKey) -> RepoResult<Vec<AuditLogEntry>>;
}

impl AuditLog for SqliteLedgerStore<'_> {
    fn append_entry(&self, key: &PlayerKey, draft: &AuditDraft) -> RepoResult<AuditLogEntry> {
        let entry_id = insert_audit_entry(self.conn, key, draft)?;
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, org_id, user_id, event_type, xp_change, quest_id, reward_id, source, meta, created_at
             FROM audit_log
             WHERE entry_id = ?1;",
        )?;
        let mut rows = stmt.query([entry_id.to_string()])?;
        match rows.next()? {
            Some(row) => parse_audit_row(row),
            None => Err(RepoError::InvalidData(format!(
                "audit entry {entry_id} missing after insert"
            ))),
        }
    }

    fn list_entries(&self, key: &PlayerKey) -> RepoResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, org_id, user_id, event_type, xp_change, quest_id, reward_id, source, meta, created_at
             FROM audit_log
             WHERE org_id = ?1 AND user_id = ?2
             ORDER BY seq ASC;",
        )?;
        let mut rows = stmt.query(params![key.org_id.as_str(), key.user_id.as_str()])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_audit_row(row)?);
        }
        Ok(entries)
    }
}

/// Inserts one entry on `conn`, which may be an open transaction.
pub(crate) fn insert_audit_entry(
    conn: &Connection,
    key: &PlayerKey,
    draft: &AuditDraft,
) -> RepoResult<Uuid> {
    let entry_id = Uuid::new_v4();
    conn.execute(
        &format!(
            "INSERT INTO audit_log (
                entry_id,
                org_id,
                user_id,
                event_type,
                xp_change,
                quest_id,
                reward_id,
                source,
                meta,
                created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                MAX(
                    {NOW_MS_SQL},
                    COALESCE(
                        (SELECT MAX(created_at) FROM audit_log WHERE org_id = ?2 AND user_id = ?3),
                        0
                    )
                )
            );"
        ),
        params![
            entry_id.to_string(),
            key.org_id.as_str(),
            key.user_id.as_str(),
            draft.event_type.as_str(),
            draft.xp_change,
            draft.quest_id.as_deref(),
            draft.reward_id.as_deref(),
            draft.source.as_str(),
            draft.meta.as_ref().map(to_json).transpose()?,
        ],
    )?;
    Ok(entry_id)
}

fn parse_audit_row(row: &Row<'_>) -> RepoResult<AuditLogEntry> {
    let id_text: String = row.get("entry_id")?;
    let entry_id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid `{id_text}` in audit_log.entry_id"))
    })?;

    let event_text: String = row.get("event_type")?;
    let event_type = AuditEventType::parse(&event_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid event type `{event_text}` in audit_log.event_type"
        ))
    })?;

    let meta = match row.get::<_, Option<String>>("meta")? {
        Some(text) => Some(from_json(&text, "audit_log.meta")?),
        None => None,
    };

    Ok(AuditLogEntry {
        entry_id,
        key: PlayerKey::new(
            row.get::<_, String>("org_id")?,
            row.get::<_, String>("user_id")?,
        ),
        event_type,
        xp_change: row.get("xp_change")?,
        quest_id: row.get("quest_id")?,
        reward_id: row.get("reward_id")?,
        source: row.get("source")?,
        meta,
        timestamp: row.get("created_at")?,
    })
}
