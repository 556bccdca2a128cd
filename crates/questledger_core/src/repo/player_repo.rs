//! Player aggregate store: contracts and SQLite implementation.
//!
//! # Responsibility
//! - Own the mutable player record and its read-modify-write protocol.
//! - Stage audit entries and pending XP awards inside the same atomic
//!   write as the aggregate they describe.
//!
//! # Invariants
//! - Every mutation runs inside `with_transaction`: read current state,
//!   compute next state, write, commit. Conflicts and busy/locked failures
//!   re-run the closure against freshly read state, up to `MAX_TX_ATTEMPTS`.
//! - Players are created only by `create_player` (lazy create on read),
//!   never as a side effect of a write.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::{DbError, NOW_MS_SQL};
use crate::model::audit::{AuditDraft, XpContext};
use crate::model::player::{ArcadeRecord, Player, PlayerKey};
use crate::model::quest::QuestValidationError;
use crate::model::week::WeekKey;
use crate::progression::arcade::ArcadeGame;
use crate::progression::rank::Rank;
use crate::repo::audit_repo::insert_audit_entry;
use log::warn;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Attempts per transaction before a conflict is surfaced to the caller.
pub const MAX_TX_ATTEMPTS: u32 = 5;

/// Base pause between attempts, multiplied by the attempt number.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

const PLAYER_SELECT_SQL: &str = "SELECT
    org_id,
    user_id,
    total_xp,
    rank,
    level,
    weekly_xp,
    weekly_week_key,
    active_quest_ids,
    completed_quest_ids,
    special_events,
    current_program_id,
    inventory,
    revision,
    created_at,
    updated_at
FROM players";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for player, quest and audit persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    PlayerNotFound(PlayerKey),
    Validation(QuestValidationError),
    /// Optimistic revision check failed after all retry attempts.
    Conflict(PlayerKey),
    /// A pending award was already applied by another writer.
    AwardSettled(Uuid),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::PlayerNotFound(key) => write!(f, "player not found: {key}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Conflict(key) => write!(f, "write conflict on player {key}"),
            Self::AwardSettled(id) => write!(f, "pending award already settled: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "player store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<QuestValidationError> for RepoError {
    fn from(value: QuestValidationError) -> Self {
        Self::Validation(value)
    }
}

impl RepoError {
    /// Busy/locked databases and lost revision races are worth retrying.
    fn is_retryable(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _))) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// XP award staged by a quest transaction and applied by a later XP
/// transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAward {
    pub award_id: Uuid,
    pub key: PlayerKey,
    pub xp: i64,
    pub context: XpContext,
    /// Lifecycle entry written together with the XP change.
    pub follow_up: Option<AuditDraft>,
    pub created_at: i64,
}

impl PendingAward {
    pub fn new(key: PlayerKey, xp: i64, context: XpContext, follow_up: Option<AuditDraft>) -> Self {
        Self {
            award_id: Uuid::new_v4(),
            key,
            xp,
            context,
            follow_up,
            created_at: 0,
        }
    }
}

/// Working copy handed to a transaction closure.
///
/// Audit drafts and award operations staged here commit atomically with
/// the player write, or not at all.
#[derive(Debug)]
pub struct PlayerWrite {
    pub player: Player,
    audit: Vec<AuditDraft>,
    enqueued: Vec<PendingAward>,
    settled: Vec<Uuid>,
}

impl PlayerWrite {
    fn new(player: Player) -> Self {
        Self {
            player,
            audit: Vec::new(),
            enqueued: Vec::new(),
            settled: Vec::new(),
        }
    }

    /// Stages one audit entry.
    pub fn append_audit(&mut self, draft: AuditDraft) {
        self.audit.push(draft);
    }

    /// Stages a pending XP award for the follow-up ledger transaction.
    pub fn enqueue_award(&mut self, award: PendingAward) {
        self.enqueued.push(award);
    }

    /// Marks a pending award as applied. The commit fails with
    /// `RepoError::AwardSettled` if another writer applied it first.
    pub fn settle_award(&mut self, award_id: Uuid) {
        self.settled.push(award_id);
    }

    fn has_side_effects(&self) -> bool {
        !(self.audit.is_empty() && self.enqueued.is_empty() && self.settled.is_empty())
    }
}

/// Storage contract for the player aggregate.
pub trait PlayerStore {
    /// Loads one player, if present.
    fn get_player(&self, key: &PlayerKey) -> RepoResult<Option<Player>>;
    /// Inserts `player` unless a row already exists; returns the stored row.
    fn create_player(&self, player: &Player) -> RepoResult<Player>;
    /// Runs `f` against the current player inside one atomic write.
    ///
    /// Fails with `RepoError::PlayerNotFound` when no aggregate exists.
    fn with_transaction<T, E, F>(&mut self, key: &PlayerKey, f: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnMut(&mut PlayerWrite) -> Result<T, E>;
    /// Lists unapplied awards for one player, oldest first.
    fn pending_awards(&self, key: &PlayerKey) -> RepoResult<Vec<PendingAward>>;
}

/// SQLite-backed store for players, quests and the audit log.
pub struct SqliteLedgerStore<'conn> {
    pub(crate) conn: &'conn mut Connection,
}

impl<'conn> SqliteLedgerStore<'conn> {
    /// Wraps a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        let actual_version: u32 =
            conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }
}

enum Attempt<E> {
    Store(RepoError),
    Aborted(E),
}

impl<E> From<RepoError> for Attempt<E> {
    fn from(value: RepoError) -> Self {
        Self::Store(value)
    }
}

impl<E> From<rusqlite::Error> for Attempt<E> {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(value.into())
    }
}

impl PlayerStore for SqliteLedgerStore<'_> {
    fn get_player(&self, key: &PlayerKey) -> RepoResult<Option<Player>> {
        load_player(self.conn, key)
    }

    fn create_player(&self, player: &Player) -> RepoResult<Player> {
        self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO players (
                    org_id,
                    user_id,
                    total_xp,
                    rank,
                    level,
                    weekly_xp,
                    weekly_week_key,
                    active_quest_ids,
                    completed_quest_ids,
                    special_events,
                    current_program_id,
                    inventory,
                    revision,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0, {NOW_MS_SQL}, {NOW_MS_SQL});"
            ),
            params![
                player.key.org_id.as_str(),
                player.key.user_id.as_str(),
                player.total_xp,
                player.rank.as_str(),
                player.level,
                player.weekly_xp,
                player.weekly_week_key.as_str(),
                to_json(&player.active_quest_ids)?,
                to_json(&player.completed_quest_ids)?,
                to_json(&special_events_to_db(&player.special_events))?,
                player.current_program_id.as_deref(),
                to_json(&player.inventory)?,
            ],
        )?;

        load_player(self.conn, &player.key)?.ok_or_else(|| {
            RepoError::InvalidData(format!("player {} missing after insert", player.key))
        })
    }

    fn with_transaction<T, E, F>(&mut self, key: &PlayerKey, mut f: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnMut(&mut PlayerWrite) -> Result<T, E>,
    {
        retry_attempts(key, || run_transaction_once(self.conn, key, &mut f))
    }

    fn pending_awards(&self, key: &PlayerKey) -> RepoResult<Vec<PendingAward>> {
        let mut stmt = self.conn.prepare(
            "SELECT award_id, org_id, user_id, xp, context, follow_up, created_at
             FROM pending_awards
             WHERE org_id = ?1 AND user_id = ?2
             ORDER BY created_at ASC, award_id ASC;",
        )?;
        let mut rows = stmt.query(params![key.org_id.as_str(), key.user_id.as_str()])?;
        let mut awards = Vec::new();
        while let Some(row) = rows.next()? {
            awards.push(parse_pending_award_row(row)?);
        }
        Ok(awards)
    }
}

/// Runs `attempt_once` until it succeeds, aborts, fails for good or uses up
/// `MAX_TX_ATTEMPTS`. Sleeps a growing backoff between attempts.
fn retry_attempts<T, E, A>(key: &PlayerKey, mut attempt_once: A) -> Result<T, E>
where
    E: From<RepoError>,
    A: FnMut() -> Result<T, Attempt<E>>,
{
    let mut attempt = 1;
    loop {
        match attempt_once() {
            Ok(value) => return Ok(value),
            Err(Attempt::Aborted(err)) => return Err(err),
            Err(Attempt::Store(err)) if err.is_retryable() && attempt < MAX_TX_ATTEMPTS => {
                warn!(
                    "event=player_tx module=repo status=retry org_id={} user_id={} attempt={} error={}",
                    key.org_id, key.user_id, attempt, err
                );
                thread::sleep(RETRY_BACKOFF * attempt);
                attempt += 1;
            }
            Err(Attempt::Store(err)) => return Err(err.into()),
        }
    }
}

fn run_transaction_once<T, E, F>(
    conn: &mut Connection,
    key: &PlayerKey,
    f: &mut F,
) -> Result<T, Attempt<E>>
where
    F: FnMut(&mut PlayerWrite) -> Result<T, E>,
{
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current =
        load_player(&tx, key)?.ok_or_else(|| RepoError::PlayerNotFound(key.clone()))?;

    let mut write = PlayerWrite::new(current.clone());
    // Dropping `tx` on abort rolls back.
    let value = f(&mut write).map_err(Attempt::Aborted)?;

    if write.player == current && !write.has_side_effects() {
        return Ok(value);
    }

    write
        .player
        .check_invariants()
        .map_err(RepoError::InvalidData)?;

    let changed = tx.execute(
        &format!(
            "UPDATE players
             SET
                total_xp = ?3,
                rank = ?4,
                level = ?5,
                weekly_xp = ?6,
                weekly_week_key = ?7,
                active_quest_ids = ?8,
                completed_quest_ids = ?9,
                special_events = ?10,
                current_program_id = ?11,
                inventory = ?12,
                revision = revision + 1,
                updated_at = {NOW_MS_SQL}
             WHERE org_id = ?1
               AND user_id = ?2
               AND revision = ?13;"
        ),
        params![
            key.org_id.as_str(),
            key.user_id.as_str(),
            write.player.total_xp,
            write.player.rank.as_str(),
            write.player.level,
            write.player.weekly_xp,
            write.player.weekly_week_key.as_str(),
            to_json(&write.player.active_quest_ids)?,
            to_json(&write.player.completed_quest_ids)?,
            to_json(&special_events_to_db(&write.player.special_events))?,
            write.player.current_program_id.as_deref(),
            to_json(&write.player.inventory)?,
            current.revision,
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::Conflict(key.clone()).into());
    }

    for award_id in &write.settled {
        let removed = tx.execute(
            "DELETE FROM pending_awards WHERE award_id = ?1 AND org_id = ?2 AND user_id = ?3;",
            params![award_id.to_string(), key.org_id.as_str(), key.user_id.as_str()],
        )?;
        if removed == 0 {
            return Err(RepoError::AwardSettled(*award_id).into());
        }
    }

    for award in &write.enqueued {
        tx.execute(
            &format!(
                "INSERT INTO pending_awards (
                    award_id,
                    org_id,
                    user_id,
                    xp,
                    context,
                    follow_up,
                    created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, {NOW_MS_SQL});"
            ),
            params![
                award.award_id.to_string(),
                key.org_id.as_str(),
                key.user_id.as_str(),
                award.xp,
                to_json(&award.context)?,
                award.follow_up.as_ref().map(to_json).transpose()?,
            ],
        )?;
    }

    for draft in &write.audit {
        insert_audit_entry(&tx, key, draft)?;
    }

    tx.commit()?;
    Ok(value)
}

pub(crate) fn load_player(conn: &Connection, key: &PlayerKey) -> RepoResult<Option<Player>> {
    let mut stmt = conn.prepare(&format!(
        "{PLAYER_SELECT_SQL}
         WHERE org_id = ?1 AND user_id = ?2;"
    ))?;
    stmt.query_row(params![key.org_id.as_str(), key.user_id.as_str()], |row| {
        Ok(parse_player_row(row))
    })
    .optional()?
    .transpose()
}

fn parse_player_row(row: &Row<'_>) -> RepoResult<Player> {
    let rank_text: String = row.get("rank")?;
    let rank = Rank::parse(&rank_text)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid rank `{rank_text}` in players.rank")))?;

    let week_text: String = row.get("weekly_week_key")?;
    let weekly_week_key = WeekKey::parse(&week_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid week key `{week_text}` in players.weekly_week_key"
        ))
    })?;

    let special_events: BTreeMap<String, ArcadeRecord> =
        from_json(&row.get::<_, String>("special_events")?, "players.special_events")?;

    let player = Player {
        key: PlayerKey::new(row.get::<_, String>("org_id")?, row.get::<_, String>("user_id")?),
        total_xp: row.get("total_xp")?,
        rank,
        level: row.get("level")?,
        weekly_xp: row.get("weekly_xp")?,
        weekly_week_key,
        active_quest_ids: from_json(
            &row.get::<_, String>("active_quest_ids")?,
            "players.active_quest_ids",
        )?,
        completed_quest_ids: from_json(
            &row.get::<_, String>("completed_quest_ids")?,
            "players.completed_quest_ids",
        )?,
        special_events: special_events_from_db(special_events)?,
        current_program_id: row.get("current_program_id")?,
        inventory: from_json(&row.get::<_, String>("inventory")?, "players.inventory")?,
        revision: row.get("revision")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    player.check_invariants().map_err(RepoError::InvalidData)?;
    Ok(player)
}

fn parse_pending_award_row(row: &Row<'_>) -> RepoResult<PendingAward> {
    let id_text: String = row.get("award_id")?;
    let award_id = Uuid::parse_str(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid `{id_text}` in pending_awards.award_id"))
    })?;
    let follow_up = match row.get::<_, Option<String>>("follow_up")? {
        Some(text) => Some(from_json(&text, "pending_awards.follow_up")?),
        None => None,
    };

    Ok(PendingAward {
        award_id,
        key: PlayerKey::new(row.get::<_, String>("org_id")?, row.get::<_, String>("user_id")?),
        xp: row.get("xp")?,
        context: from_json(&row.get::<_, String>("context")?, "pending_awards.context")?,
        follow_up,
        created_at: row.get("created_at")?,
    })
}

// Special events are keyed by the game's storage id in the JSON column.
fn special_events_to_db(
    events: &BTreeMap<ArcadeGame, ArcadeRecord>,
) -> BTreeMap<&'static str, &ArcadeRecord> {
    events
        .iter()
        .map(|(game, record)| (game.as_str(), record))
        .collect()
}

fn special_events_from_db(
    events: BTreeMap<String, ArcadeRecord>,
) -> RepoResult<BTreeMap<ArcadeGame, ArcadeRecord>> {
    events
        .into_iter()
        .map(|(game_text, record)| {
            let game = ArcadeGame::parse(&game_text).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid arcade game `{game_text}` in players.special_events"
                ))
            })?;
            if record.best.game() != game {
                return Err(RepoError::InvalidData(format!(
                    "special event `{game_text}` holds stats for `{}`",
                    record.best.game().as_str()
                )));
            }
            Ok((game, record))
        })
        .collect()
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("failed to encode json: {err}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(text: &str, column: &str) -> RepoResult<T> {
    serde_json::from_str(text)
        .map_err(|err| RepoError::InvalidData(format!("invalid json in {column}: {err}")))
}
