//! Quest catalog and per-org settings.
//!
//! Quest documents are authored outside the engine; this module reads them
//! and offers a validated upsert so they can be seeded.
//!
//! # Invariants
//! - Writes call `Quest::validate()` before SQL mutations.
//! - Missing `org_settings` rows read as `OrgSettings::default()`.

use crate::model::quest::{Quest, QuestType, TierLevel};
use crate::progression::arcade::ArcadeGame;
use crate::repo::player_repo::{from_json, to_json, RepoError, RepoResult, SqliteLedgerStore};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const QUEST_SELECT_SQL: &str = "SELECT
    quest_id,
    type,
    xp,
    levels,
    max_completions_per_user,
    is_active,
    checkin_code,
    arcade_game
FROM quests";

/// Per-organization engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgSettings {
    /// Flat check-in reward when no check-in quest matches. 0 disables it.
    pub xp_per_checkin: i64,
}

/// Read access to quest documents and org settings.
pub trait QuestCatalog {
    fn get_quest(&self, org_id: &str, quest_id: &str) -> RepoResult<Option<Quest>>;
    /// Finds the active check-in quest whose code matches `code`.
    fn find_active_checkin_quest(&self, org_id: &str, code: &str) -> RepoResult<Option<Quest>>;
    fn upsert_quest(&self, org_id: &str, quest: &Quest) -> RepoResult<()>;
    fn org_settings(&self, org_id: &str) -> RepoResult<OrgSettings>;
    fn set_org_settings(&self, org_id: &str, settings: &OrgSettings) -> RepoResult<()>;
}

impl QuestCatalog for SqliteLedgerStore<'_> {
    fn get_quest(&self, org_id: &str, quest_id: &str) -> RepoResult<Option<Quest>> {
        let mut stmt = self.conn.prepare(&format!(
            "{QUEST_SELECT_SQL}
             WHERE org_id = ?1 AND quest_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![org_id, quest_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_quest_row(row)?)),
            None => Ok(None),
        }
    }

    fn find_active_checkin_quest(&self, org_id: &str, code: &str) -> RepoResult<Option<Quest>> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        let mut stmt = self.conn.prepare(&format!(
            "{QUEST_SELECT_SQL}
             WHERE org_id = ?1
               AND type = 'checkin'
               AND is_active = 1
               AND checkin_code = ?2
             ORDER BY quest_id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query(params![org_id, code])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_quest_row(row)?)),
            None => Ok(None),
        }
    }

    fn upsert_quest(&self, org_id: &str, quest: &Quest) -> RepoResult<()> {
        quest.validate()?;

        self.conn.execute(
            "INSERT INTO quests (
                org_id,
                quest_id,
                type,
                xp,
                levels,
                max_completions_per_user,
                is_active,
                checkin_code,
                arcade_game
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (org_id, quest_id) DO UPDATE SET
                type = excluded.type,
                xp = excluded.xp,
                levels = excluded.levels,
                max_completions_per_user = excluded.max_completions_per_user,
                is_active = excluded.is_active,
                checkin_code = excluded.checkin_code,
                arcade_game = excluded.arcade_game;",
            params![
                org_id,
                quest.id.as_str(),
                quest.kind.as_str(),
                quest.xp,
                quest.levels.as_ref().map(|levels| to_json(levels)).transpose()?,
                quest.max_completions_per_user,
                i64::from(quest.is_active),
                quest.checkin_code.as_deref().map(str::trim),
                quest.arcade_game.map(ArcadeGame::as_str),
            ],
        )?;
        Ok(())
    }

    fn org_settings(&self, org_id: &str) -> RepoResult<OrgSettings> {
        let xp_per_checkin: Option<i64> = self
            .conn
            .query_row(
                "SELECT xp_per_checkin FROM org_settings WHERE org_id = ?1;",
                [org_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(xp_per_checkin
            .map(|xp_per_checkin| OrgSettings { xp_per_checkin })
            .unwrap_or_default())
    }

    fn set_org_settings(&self, org_id: &str, settings: &OrgSettings) -> RepoResult<()> {
        if settings.xp_per_checkin < 0 {
            return Err(RepoError::InvalidData(format!(
                "xp_per_checkin must be non-negative, got {}",
                settings.xp_per_checkin
            )));
        }
        self.conn.execute(
            "INSERT INTO org_settings (org_id, xp_per_checkin) VALUES (?1, ?2)
             ON CONFLICT (org_id) DO UPDATE SET xp_per_checkin = excluded.xp_per_checkin;",
            params![org_id, settings.xp_per_checkin],
        )?;
        Ok(())
    }
}

fn parse_quest_row(row: &Row<'_>) -> RepoResult<Quest> {
    let type_text: String = row.get("type")?;
    let kind = QuestType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid quest type `{type_text}` in quests.type"))
    })?;

    let levels: Option<Vec<TierLevel>> = match row.get::<_, Option<String>>("levels")? {
        Some(text) => Some(from_json(&text, "quests.levels")?),
        None => None,
    };

    let arcade_game = match row.get::<_, Option<String>>("arcade_game")? {
        Some(text) => Some(ArcadeGame::parse(&text).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid arcade game `{text}` in quests.arcade_game"))
        })?),
        None => None,
    };

    let is_active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_active value `{other}` in quests.is_active"
            )));
        }
    };

    let quest = Quest {
        id: row.get("quest_id")?,
        kind,
        xp: row.get("xp")?,
        levels,
        max_completions_per_user: row.get("max_completions_per_user")?,
        is_active,
        checkin_code: row.get("checkin_code")?,
        arcade_game,
    };
    quest.validate()?;
    Ok(quest)
}
