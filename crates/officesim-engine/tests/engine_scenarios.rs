//! End-to-end scenarios driven through the full engine with the stub
//! planner and in-memory backends.

use std::sync::Arc;

use officesim_core::config::SimConfig;
use officesim_core::types::{PersonDraft, StartRequest};
use officesim_engine::{ReplayManager, SimulationEngine};
use officesim_gateways::{InMemoryChatGateway, InMemoryEmailGateway};
use officesim_planner::StubPlanner;
use officesim_store::{Db, PlanStore, PlanType, ReportStore};
use officesim_ticks::AdvanceDriver;

fn draft(name: &str, role: &str, head: bool) -> PersonDraft {
    PersonDraft {
        name: name.into(),
        role: role.into(),
        timezone: "UTC".into(),
        work_hours: "09:00-17:00".into(),
        break_frequency: "hourly".into(),
        communication_style: "direct".into(),
        email_address: format!("{}@co", name.to_lowercase()),
        chat_handle: name.to_lowercase(),
        is_department_head: head,
        team_name: None,
        skills: vec!["rust".into()],
        personality: vec!["calm".into()],
        objectives: vec![],
        metrics: vec![],
        planning_guidelines: vec![],
        event_playbook: Default::default(),
        statuses: vec![],
        schedule: vec![],
    }
}

struct Harness {
    engine: Arc<SimulationEngine>,
    db: Db,
    email: Arc<InMemoryEmailGateway>,
    chat: Arc<InMemoryChatGateway>,
}

async fn harness(people: Vec<PersonDraft>) -> Harness {
    let config = SimConfig::default();
    let db = Db::open_in_memory().unwrap();
    let email = Arc::new(InMemoryEmailGateway::new());
    let chat = Arc::new(InMemoryChatGateway::new());
    let engine = SimulationEngine::with_db(
        config,
        db.clone(),
        email.clone(),
        chat.clone(),
        Arc::new(StubPlanner::new()),
    )
    .await
    .unwrap();
    for person in &people {
        engine.create_person(person).unwrap();
    }
    Harness {
        engine,
        db,
        email,
        chat,
    }
}

fn start_request(project: &str, duration_weeks: i64, seed: u64) -> StartRequest {
    StartRequest {
        project_name: Some(project.into()),
        project_summary: Some("a test project".into()),
        duration_weeks,
        random_seed: Some(seed),
        ..Default::default()
    }
}

#[tokio::test]
async fn single_persona_single_day_smoke() {
    let h = harness(vec![draft("Alice", "Developer", true)]).await;
    h.engine
        .start(Some(&start_request("Alpha", 1, 1)))
        .await
        .unwrap();

    let result = h.engine.advance(8, "smoke").await.unwrap();
    assert_eq!(result.ticks_advanced, 8);
    assert_eq!(result.current_tick, 8);
    assert_eq!(result.sim_time, "Day 1 21:00");

    let plans = PlanStore::new(h.db.clone());
    // Exactly one daily plan for day 0, however many times planning ran.
    assert_eq!(plans.count_daily_plans(1, 0).unwrap(), 1);
    for tick in 1..=8 {
        assert!(
            plans
                .get_worker_plan(1, PlanType::Hourly, Some(tick), true)
                .unwrap()
                .is_some(),
            "hourly plan missing for tick {tick}"
        );
    }
    let reports = ReportStore::new(h.db.clone());
    let report = reports.get_daily_report(1, 0).unwrap();
    assert!(report.is_some(), "daily report for day 0 missing");
}

#[tokio::test]
async fn advancing_twice_matches_one_double_advance() {
    let a = harness(vec![draft("Alice", "Developer", true)]).await;
    a.engine.start(Some(&start_request("Alpha", 1, 5))).await.unwrap();
    a.engine.advance(1, "manual").await.unwrap();
    let split = a.engine.advance(1, "manual").await.unwrap();

    let b = harness(vec![draft("Alice", "Developer", true)]).await;
    b.engine.start(Some(&start_request("Alpha", 1, 5))).await.unwrap();
    let joined = b.engine.advance(2, "manual").await.unwrap();

    assert_eq!(split.current_tick, joined.current_tick);
}

#[tokio::test]
async fn two_personas_exchange_traffic() {
    let h = harness(vec![
        draft("Alice", "Developer", true),
        draft("Bob", "Designer", false),
    ])
    .await;
    h.engine
        .start(Some(&start_request("Alpha", 1, 2)))
        .await
        .unwrap();
    let result = h.engine.advance(8, "smoke").await.unwrap();

    // Fallback comms fire on tick 1 at the latest.
    assert!(result.emails_sent >= 2, "expected emails, got {result:?}");
    assert!(result.chat_messages_sent >= 2, "expected chats, got {result:?}");
    assert!(!h.email.emails().is_empty());
    assert!(!h.chat.dms().is_empty());

    let plans = PlanStore::new(h.db.clone());
    for person_id in [1, 2] {
        assert_eq!(plans.count_daily_plans(person_id, 0).unwrap(), 1);
    }

    // The project chat room exists for the one active project.
    let project = h.engine.get_project_plan().unwrap().unwrap();
    let room = h.engine.project_chat_room(project.id).unwrap().unwrap();
    assert!(room.starts_with(&format!("project-{}-", project.id)));
    assert!(h.chat.room_participants(&room).is_some());
}

#[tokio::test]
async fn rewind_purges_everything_past_the_cutoff() {
    let h = harness(vec![
        draft("Alice", "Developer", true),
        draft("Bob", "Designer", false),
    ])
    .await;
    h.engine
        .start(Some(&start_request("Alpha", 1, 3)))
        .await
        .unwrap();
    h.engine.advance(16, "smoke").await.unwrap();

    let snapshot = h.engine.rewind(8).await.unwrap();
    assert_eq!(snapshot.current_tick, 8);

    let plans = PlanStore::new(h.db.clone());
    for person_id in [1, 2] {
        assert!(plans
            .get_worker_plan(person_id, PlanType::Hourly, Some(9), false)
            .unwrap()
            .map(|row| row.tick <= 8)
            .unwrap_or(true));
    }
    let reports = ReportStore::new(h.db.clone());
    assert_eq!(reports.max_daily_report_day().unwrap(), Some(0));

    let cutoff = h
        .engine
        .tick_manager()
        .sim_datetime_for_tick(8)
        .unwrap()
        .to_rfc3339();
    for email in h.email.emails() {
        if let Some(sent_at) = email.sent_at_iso {
            assert!(sent_at <= cutoff, "email past cutoff survived: {sent_at}");
        }
    }
    for dm in h.chat.dms() {
        if let Some(sent_at) = dm.sent_at_iso {
            assert!(sent_at <= cutoff, "dm past cutoff survived: {sent_at}");
        }
    }

    let after_cutoff: i64 = h
        .db
        .with(|conn| {
            conn.query_row("SELECT COUNT(*) FROM tick_log WHERE tick > 8", [], |r| {
                r.get(0)
            })
        })
        .unwrap();
    assert_eq!(after_cutoff, 0);
}

#[tokio::test]
async fn reset_keeps_personas_and_zeroes_state() {
    let h = harness(vec![draft("Alice", "Developer", true)]).await;
    h.engine
        .start(Some(&start_request("Alpha", 1, 4)))
        .await
        .unwrap();
    h.engine.advance(4, "smoke").await.unwrap();

    let snapshot = h.engine.reset().await.unwrap();
    assert_eq!(snapshot.current_tick, 0);
    assert!(!snapshot.is_running);
    assert!(!snapshot.auto_tick);
    assert_eq!(h.engine.list_people().unwrap().len(), 1);
    assert!(h.engine.get_project_plan().unwrap().is_none());

    // reset_full removes personas and clears the backends too.
    h.engine.reset_full().await.unwrap();
    assert!(h.engine.list_people().unwrap().is_empty());
    assert!(h.email.emails().is_empty());
    assert!(h.chat.dms().is_empty());
}

#[tokio::test]
async fn auto_pause_archives_rooms_when_projects_finish() {
    let h = harness(vec![
        draft("Alice", "Developer", true),
        draft("Bob", "Designer", false),
    ])
    .await;
    h.engine
        .start(Some(&start_request("Alpha", 1, 6)))
        .await
        .unwrap();
    let project = h.engine.get_project_plan().unwrap().unwrap();
    assert!(h.engine.project_chat_room(project.id).unwrap().is_some());

    // Week 2 begins at tick 5*H + 1 = 41 with the default H = 8.
    h.engine.advance(41, "smoke").await.unwrap();
    let status = h.engine.auto_pause_status().unwrap();
    assert_eq!(status.current_week, 2);
    assert!(status.should_pause, "{}", status.reason);

    h.engine.supervise().await;
    assert!(h.engine.project_chat_room(project.id).unwrap().is_none());
    assert!(!h.engine.get_state().unwrap().auto_tick);
    // Auto-pause never clears the running flag.
    assert!(h.engine.get_state().unwrap().is_running);
}

#[tokio::test]
async fn replay_is_bounded_by_generated_traffic() {
    let h = harness(vec![
        draft("Alice", "Developer", true),
        draft("Bob", "Designer", false),
    ])
    .await;
    h.engine
        .start(Some(&start_request("Alpha", 1, 7)))
        .await
        .unwrap();
    h.engine.advance(8, "smoke").await.unwrap();

    let replay = ReplayManager::new(h.engine.clone());
    let metadata = replay.metadata().unwrap();
    assert!(metadata.max_generated_tick >= 1);
    assert!(metadata.total_emails + metadata.total_chats > 0);

    let data = replay.jump_to_tick(1).unwrap();
    assert_eq!(data.tick, 1);
    assert!(!data.emails.is_empty() || !data.chats.is_empty());
    assert!(replay
        .jump_to_tick(metadata.max_generated_tick + 100)
        .is_err());

    let live = replay.reset_to_live().unwrap();
    assert_eq!(live.current_tick, live.max_generated_tick);
}

#[tokio::test]
async fn advance_requires_a_running_simulation() {
    let h = harness(vec![draft("Alice", "Developer", true)]).await;
    let err = h.engine.advance(1, "manual").await.unwrap_err();
    assert_eq!(err.code(), "NOT_RUNNING");
}
