use chrono::{TimeZone, Utc};
use questledger_core::db::open_db_in_memory;
use questledger_core::{
    AuditEventType, LedgerError, LedgerService, ManualClock, PlayerKey, PlayerStore, Quest,
    QuestCatalog, QuestType, SqliteLedgerStore,
};
use rusqlite::Connection;

const ORG: &str = "org-1";

fn service(conn: &mut Connection) -> LedgerService<SqliteLedgerStore<'_>, ManualClock> {
    let store = SqliteLedgerStore::try_new(conn).unwrap();
    let clock = ManualClock::at(Utc.with_ymd_and_hms(2024, 8, 14, 12, 0, 0).unwrap());
    LedgerService::with_clock(store, clock)
}

fn player() -> PlayerKey {
    PlayerKey::new(ORG, "user-1")
}

fn seed(service: &LedgerService<SqliteLedgerStore<'_>, ManualClock>, quest: Quest) {
    service.store().upsert_quest(ORG, &quest).unwrap();
}

fn one_time(id: &str, xp: i64) -> Quest {
    let mut quest = Quest::new(id, QuestType::Custom, xp);
    quest.max_completions_per_user = Some(1);
    quest
}

fn count_events(
    service: &LedgerService<SqliteLedgerStore<'_>, ManualClock>,
    event_type: AuditEventType,
) -> usize {
    service
        .audit_entries(&player())
        .unwrap()
        .iter()
        .filter(|entry| entry.event_type == event_type)
        .count()
}

#[test]
fn one_time_quest_awards_once_and_cannot_restart() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    seed(&service, one_time("visit-hq", 50));
    service.player_summary(&player()).unwrap();

    let started = service.start_quest(&player(), "visit-hq").unwrap();
    assert_eq!(started.active_quest_ids, vec!["visit-hq".to_string()]);

    let done = service.complete_quest(&player(), "visit-hq").unwrap();
    assert!(done.completed);
    assert_eq!(done.xp_awarded, 50);
    assert_eq!(done.summary.total_xp, 50);
    assert!(done.summary.active_quest_ids.is_empty());

    let again = service.complete_quest(&player(), "visit-hq").unwrap();
    assert!(!again.completed);
    assert_eq!(again.xp_awarded, 0);
    assert_eq!(again.summary.total_xp, 50);

    let err = service.start_quest(&player(), "visit-hq").unwrap_err();
    assert!(matches!(err, LedgerError::QuestAlreadyCompletedOneTime(ref id) if id == "visit-hq"));

    assert_eq!(count_events(&service, AuditEventType::QuestStart), 1);
    assert_eq!(count_events(&service, AuditEventType::QuestComplete), 1);
    assert_eq!(count_events(&service, AuditEventType::Xp), 1);
}

#[test]
fn completion_audit_carries_quest_and_source() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    seed(&service, one_time("visit-hq", 50));
    service.player_summary(&player()).unwrap();
    service.start_quest(&player(), "visit-hq").unwrap();
    service.complete_quest(&player(), "visit-hq").unwrap();

    let entries = service.audit_entries(&player()).unwrap();
    let kinds: Vec<_> = entries.iter().map(|entry| entry.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            AuditEventType::QuestStart,
            AuditEventType::Xp,
            AuditEventType::QuestComplete,
        ]
    );

    let xp = &entries[1];
    assert_eq!(xp.xp_change, Some(50));
    assert_eq!(xp.source, "quest_complete");
    assert_eq!(xp.quest_id.as_deref(), Some("visit-hq"));

    let complete = &entries[2];
    assert_eq!(complete.xp_change, Some(50));
    assert_eq!(complete.quest_id.as_deref(), Some("visit-hq"));
}

#[test]
fn completing_without_start_is_a_noop() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    seed(&service, Quest::new("photo-wall", QuestType::Photo, 80));
    service.player_summary(&player()).unwrap();

    let result = service.complete_quest(&player(), "photo-wall").unwrap();
    assert!(!result.completed);
    assert_eq!(result.xp_awarded, 0);
    assert_eq!(result.summary.total_xp, 0);
    assert!(service.audit_entries(&player()).unwrap().is_empty());
}

#[test]
fn start_is_idempotent_while_active() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    seed(&service, Quest::new("photo-wall", QuestType::Photo, 80));
    service.player_summary(&player()).unwrap();

    service.start_quest(&player(), "photo-wall").unwrap();
    let second = service.start_quest(&player(), "photo-wall").unwrap();
    assert_eq!(second.active_quest_ids, vec!["photo-wall".to_string()]);
    assert_eq!(count_events(&service, AuditEventType::QuestStart), 1);
}

#[test]
fn direct_completable_types_cannot_be_started() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    let mut door = Quest::new("door", QuestType::Checkin, 10);
    door.checkin_code = Some("OPEN".to_string());
    let mut paddle = Quest::new("paddle", QuestType::Arcade, 10);
    paddle.arcade_game = Some(questledger_core::ArcadeGame::GalaxyPaddle);
    seed(&service, door);
    seed(&service, paddle);
    service.player_summary(&player()).unwrap();

    for (id, kind) in [("door", QuestType::Checkin), ("paddle", QuestType::Arcade)] {
        let err = service.start_quest(&player(), id).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::QuestNotStartable { kind: k, .. } if k == kind
        ));
        assert_eq!(err.status_code(), 400);
    }
    assert!(service
        .player_summary(&player())
        .unwrap()
        .active_quest_ids
        .is_empty());
}

#[test]
fn inactive_quest_rejects_start_and_complete() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    seed(&service, Quest::new("photo-wall", QuestType::Photo, 80));
    service.player_summary(&player()).unwrap();
    service.start_quest(&player(), "photo-wall").unwrap();

    let mut retired = Quest::new("photo-wall", QuestType::Photo, 80);
    retired.is_active = false;
    seed(&service, retired);

    let err = service.complete_quest(&player(), "photo-wall").unwrap_err();
    assert!(matches!(err, LedgerError::QuestInactive(_)));
    let err = service.start_quest(&player(), "photo-wall").unwrap_err();
    assert!(matches!(err, LedgerError::QuestInactive(_)));
    assert_eq!(service.player_summary(&player()).unwrap().total_xp, 0);
}

#[test]
fn unknown_quest_is_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    service.player_summary(&player()).unwrap();

    let err = service.start_quest(&player(), "missing").unwrap_err();
    assert!(matches!(err, LedgerError::QuestNotFound(ref id) if id == "missing"));
    assert_eq!(err.status_code(), 404);
    let err = service.complete_quest(&player(), "missing").unwrap_err();
    assert!(matches!(err, LedgerError::QuestNotFound(_)));
}

#[test]
fn quest_operations_require_an_existing_player() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    seed(&service, Quest::new("photo-wall", QuestType::Photo, 80));

    let err = service.start_quest(&player(), "photo-wall").unwrap_err();
    assert!(matches!(err, LedgerError::PlayerNotFound(_)));
    assert!(service.store().get_player(&player()).unwrap().is_none());
}

#[test]
fn unlimited_quest_repeats() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    seed(&service, Quest::new("daily-visit", QuestType::Visit, 20));
    service.player_summary(&player()).unwrap();

    for round in 1..=3 {
        service.start_quest(&player(), "daily-visit").unwrap();
        let done = service.complete_quest(&player(), "daily-visit").unwrap();
        assert!(done.completed);
        assert_eq!(done.summary.total_xp, 20 * round);
    }

    let player = service.store().get_player(&player()).unwrap().unwrap();
    assert_eq!(player.completion_count("daily-visit"), 3);
}

#[test]
fn capped_quest_stops_at_its_limit() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    let mut quest = Quest::new("purchase-combo", QuestType::Purchase, 40);
    quest.max_completions_per_user = Some(2);
    seed(&service, quest);
    service.player_summary(&player()).unwrap();

    for _ in 0..2 {
        service.start_quest(&player(), "purchase-combo").unwrap();
        service.complete_quest(&player(), "purchase-combo").unwrap();
    }

    let err = service.start_quest(&player(), "purchase-combo").unwrap_err();
    assert!(matches!(
        err,
        LedgerError::CompletionLimitReached {
            max_completions: 2,
            ..
        }
    ));
    assert_eq!(err.status_code(), 409);
    assert_eq!(service.player_summary(&player()).unwrap().total_xp, 80);
}

#[test]
fn checkin_quest_completes_without_start() {
    let mut conn = open_db_in_memory().unwrap();
    let mut service = service(&mut conn);
    let mut door = Quest::new("door", QuestType::Checkin, 15);
    door.checkin_code = Some("OPEN".to_string());
    door.max_completions_per_user = Some(1);
    seed(&service, door);
    service.player_summary(&player()).unwrap();

    let done = service.complete_quest(&player(), "door").unwrap();
    assert!(done.completed);
    assert_eq!(done.xp_awarded, 15);

    let again = service.complete_quest(&player(), "door").unwrap();
    assert!(!again.completed);
    assert_eq!(again.summary.total_xp, 15);
}
