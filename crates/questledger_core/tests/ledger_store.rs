use chrono::{TimeZone, Utc};
use questledger_core::db::{open_db, open_db_in_memory, DbError};
use questledger_core::{
    apply_xp_delta, ArcadeGame, AuditDraft, AuditEventType, AuditLog, LedgerService,
    ManualClock, OrgSettings, PlayerKey, PlayerStore, Quest, QuestCatalog, QuestType,
    QuestValidationError, RepoError, SqliteLedgerStore, TierLevel, XpContext, MAX_TX_ATTEMPTS,
};
use rusqlite::{Connection, ErrorCode};
use serde_json::json;
use std::time::Duration;

const ORG: &str = "org-1";

fn player() -> PlayerKey {
    PlayerKey::new(ORG, "user-1")
}

fn create_player(conn: &mut Connection) {
    let store = SqliteLedgerStore::try_new(conn).unwrap();
    let clock = ManualClock::at(Utc.with_ymd_and_hms(2024, 8, 14, 12, 0, 0).unwrap());
    let mut service = LedgerService::with_clock(store, clock);
    service.player_summary(&player()).unwrap();
}

#[test]
fn quest_upsert_round_trips_ladder_and_flags() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();

    let mut quest = Quest::new("nebula", QuestType::Arcade, 30);
    quest.arcade_game = Some(ArcadeGame::NebulaBreak);
    quest.levels = Some(vec![
        TierLevel { xp: 30 },
        TierLevel { xp: 70 },
        TierLevel { xp: 120 },
    ]);
    quest.max_completions_per_user = Some(3);
    store.upsert_quest(ORG, &quest).unwrap();
    assert_eq!(store.get_quest(ORG, "nebula").unwrap(), Some(quest.clone()));

    quest.is_active = false;
    quest.levels = None;
    store.upsert_quest(ORG, &quest).unwrap();
    assert_eq!(store.get_quest(ORG, "nebula").unwrap(), Some(quest));

    assert_eq!(store.get_quest("org-2", "nebula").unwrap(), None);
}

#[test]
fn quest_upsert_validates_before_writing() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();

    let mut quest = Quest::new("nebula", QuestType::Arcade, 30);
    quest.levels = Some(vec![TierLevel { xp: 10 }; 4]);
    quest.arcade_game = Some(ArcadeGame::NebulaBreak);
    let err = store.upsert_quest(ORG, &quest).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(QuestValidationError::TooManyTiers(4))
    ));
    assert_eq!(store.get_quest(ORG, "nebula").unwrap(), None);
}

#[test]
fn checkin_lookup_is_exact_and_ignores_inactive_quests() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();

    let mut door = Quest::new("door", QuestType::Checkin, 10);
    door.checkin_code = Some(" DOOR ".to_string());
    store.upsert_quest(ORG, &door).unwrap();

    let found = store.find_active_checkin_quest(ORG, "DOOR").unwrap();
    assert_eq!(found.map(|quest| quest.id), Some("door".to_string()));
    assert!(store
        .find_active_checkin_quest(ORG, "door")
        .unwrap()
        .is_none());

    door.is_active = false;
    store.upsert_quest(ORG, &door).unwrap();
    assert!(store
        .find_active_checkin_quest(ORG, "DOOR")
        .unwrap()
        .is_none());
}

#[test]
fn org_settings_default_to_disabled_checkin_reward() {
    let mut conn = open_db_in_memory().unwrap();
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();

    assert_eq!(store.org_settings(ORG).unwrap(), OrgSettings::default());
    store
        .set_org_settings(ORG, &OrgSettings { xp_per_checkin: 25 })
        .unwrap();
    assert_eq!(store.org_settings(ORG).unwrap().xp_per_checkin, 25);
    assert!(store
        .set_org_settings(ORG, &OrgSettings { xp_per_checkin: -1 })
        .is_err());
}

#[test]
fn transaction_on_missing_player_reports_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let mut store = SqliteLedgerStore::try_new(&mut conn).unwrap();

    let err = store
        .with_transaction(&player(), |_| -> Result<(), RepoError> { Ok(()) })
        .unwrap_err();
    assert!(matches!(err, RepoError::PlayerNotFound(ref key) if *key == player()));
}

#[test]
fn standalone_audit_entry_is_listed_in_order() {
    let mut conn = open_db_in_memory().unwrap();
    create_player(&mut conn);
    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();

    let first = store
        .append_entry(
            &player(),
            &AuditDraft::lifecycle(AuditEventType::RewardRedeem, "shop")
                .with_meta(json!({ "sku": "mug" })),
        )
        .unwrap();
    let second = store
        .append_entry(
            &player(),
            &AuditDraft::lifecycle(AuditEventType::Referral, "invite"),
        )
        .unwrap();

    let entries = store.list_entries(&player()).unwrap();
    assert_eq!(entries, vec![first.clone(), second]);
    assert_eq!(first.meta, Some(json!({ "sku": "mug" })));
    assert_eq!(first.key, player());
}

#[test]
fn corrupt_player_row_is_rejected_on_read() {
    let mut conn = open_db_in_memory().unwrap();
    create_player(&mut conn);
    conn.execute(
        "UPDATE players SET rank = 'captain' WHERE user_id = 'user-1';",
        [],
    )
    .unwrap();

    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    let err = store.get_player(&player()).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(ref message) if message.contains("captain")));
}

#[test]
fn player_row_with_stale_rank_is_rejected_on_read() {
    let mut conn = open_db_in_memory().unwrap();
    create_player(&mut conn);
    conn.execute(
        "UPDATE players SET total_xp = 20000 WHERE user_id = 'user-1';",
        [],
    )
    .unwrap();

    let store = SqliteLedgerStore::try_new(&mut conn).unwrap();
    assert!(matches!(
        store.get_player(&player()),
        Err(RepoError::InvalidData(_))
    ));
}

fn open_with_short_busy_timeout(path: &std::path::Path) -> Connection {
    let conn = open_db(path).unwrap();
    conn.busy_timeout(Duration::from_millis(10)).unwrap();
    conn
}

fn is_busy(err: &RepoError) -> bool {
    matches!(
        err,
        RepoError::Db(DbError::Sqlite(rusqlite::Error::SqliteFailure(inner, _)))
            if inner.code == ErrorCode::DatabaseBusy
    )
}

#[test]
fn commit_blocked_by_reader_reruns_closure_and_commits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let mut writer = open_with_short_busy_timeout(&path);
    create_player(&mut writer);

    // An open read transaction keeps a shared lock, so the writer's COMMIT
    // reports busy until the reader finishes.
    let reader = open_db(&path).unwrap();
    reader.execute_batch("BEGIN;").unwrap();
    let seen: i64 = reader
        .query_row("SELECT total_xp FROM players;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(seen, 0);

    let mut store = SqliteLedgerStore::try_new(&mut writer).unwrap();
    let mut calls = 0;
    store
        .with_transaction(&player(), |write| -> Result<(), RepoError> {
            calls += 1;
            if calls == 2 {
                reader.execute_batch("COMMIT;").unwrap();
            }
            let week = write.player.weekly_week_key.clone();
            apply_xp_delta(&mut write.player, 40, &week);
            write.append_audit(AuditDraft::xp(40, &XpContext::new("retry")));
            Ok(())
        })
        .unwrap();
    assert_eq!(calls, 2);

    let stored = store.get_player(&player()).unwrap().unwrap();
    assert_eq!(stored.total_xp, 40);
    assert_eq!(stored.revision, 1);
    let entries = store.list_entries(&player()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].xp_change, Some(40));
}

#[test]
fn lock_held_by_other_writer_surfaces_busy_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let mut writer = open_with_short_busy_timeout(&path);
    create_player(&mut writer);

    let holder = open_db(&path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let mut store = SqliteLedgerStore::try_new(&mut writer).unwrap();
    let mut calls = 0;
    let err = store
        .with_transaction(&player(), |write| -> Result<(), RepoError> {
            calls += 1;
            let week = write.player.weekly_week_key.clone();
            apply_xp_delta(&mut write.player, 10, &week);
            Ok(())
        })
        .unwrap_err();
    assert!(is_busy(&err), "unexpected error: {err}");
    // BEGIN IMMEDIATE never succeeded, so the closure never ran.
    assert_eq!(calls, 0);

    holder.execute_batch("ROLLBACK;").unwrap();
    assert_eq!(store.get_player(&player()).unwrap().unwrap().total_xp, 0);
}

#[test]
fn commit_blocked_for_every_attempt_runs_closure_max_times() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let mut writer = open_with_short_busy_timeout(&path);
    create_player(&mut writer);

    let reader = open_db(&path).unwrap();
    reader.execute_batch("BEGIN;").unwrap();
    reader
        .query_row("SELECT COUNT(*) FROM players;", [], |row| row.get::<_, i64>(0))
        .unwrap();

    let mut store = SqliteLedgerStore::try_new(&mut writer).unwrap();
    let mut calls = 0;
    let err = store
        .with_transaction(&player(), |write| -> Result<(), RepoError> {
            calls += 1;
            let week = write.player.weekly_week_key.clone();
            apply_xp_delta(&mut write.player, 10, &week);
            write.append_audit(AuditDraft::xp(10, &XpContext::new("retry")));
            Ok(())
        })
        .unwrap_err();
    assert!(is_busy(&err), "unexpected error: {err}");
    assert_eq!(calls, MAX_TX_ATTEMPTS);

    reader.execute_batch("COMMIT;").unwrap();
    assert_eq!(store.get_player(&player()).unwrap().unwrap().total_xp, 0);
    assert!(store.list_entries(&player()).unwrap().is_empty());
}
