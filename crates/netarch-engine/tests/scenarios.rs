//! Workflow scenarios against an in-memory database and a scripted provider.

use std::sync::Arc;

use netarch_core::{CompletionError, MasteryLevel, Module};
use netarch_engine::{
    DiagnosisRequest, EngineError, Phase, SessionContext, TaskRequest, Tutor, PROGRESS_MAX,
};
use netarch_llm::{CompletionClient, MockProvider, MockResponse, StreamControl};
use netarch_store::{ConversationRepo, Database, HISTORY_LIMIT};

struct Harness {
    tutor: Tutor,
    mock: Arc<MockProvider>,
    conversations: ConversationRepo,
}

fn harness(responses: Vec<MockResponse>) -> Harness {
    let db = Database::in_memory().unwrap();
    let mock = Arc::new(MockProvider::new(responses));
    let tutor = Tutor::new(db.clone(), CompletionClient::new(mock.clone()));
    Harness { tutor, mock, conversations: ConversationRepo::new(db) }
}

fn signed_in(h: &Harness, username: &str) -> SessionContext {
    h.tutor.register(username, "pw1").unwrap();
    let mut ctx = SessionContext::new();
    h.tutor.sign_in(&mut ctx, username, "pw1").unwrap();
    ctx
}

fn ospf() -> DiagnosisRequest {
    DiagnosisRequest {
        topic: "OSPF neighbor".into(),
        hypothesis: "Hello timers mismatch".into(),
        code: "neighbor down".into(),
    }
}

#[test]
fn register_and_sign_in() {
    let h = harness(vec![]);
    h.tutor.register("alice", "pw1").unwrap();

    let err = h.tutor.register("alice", "pw1").unwrap_err();
    assert_eq!(err.code(), "CONFLICT");
    assert!(err.user_message().contains("already exists"));

    let mut ctx = SessionContext::new();
    let user = h.tutor.sign_in(&mut ctx, "alice", "pw1").unwrap();
    assert_eq!(ctx.user().unwrap().id, user.id);

    let mut other = SessionContext::new();
    let err = h.tutor.sign_in(&mut other, "alice", "wrong").unwrap_err();
    assert!(matches!(err, EngineError::InvalidCredentials));
    assert!(other.user().is_none());
}

#[test]
fn sign_in_uses_the_stored_username() {
    let h = harness(vec![]);
    h.tutor.register("alice", "pw1").unwrap();

    let mut ctx = SessionContext::new();
    let user = h.tutor.sign_in(&mut ctx, "  alice  ", "pw1").unwrap();
    assert_eq!(user.username, "alice");
    assert_eq!(ctx.view().username.as_deref(), Some("alice"));
}

#[test]
fn register_rejects_blank_fields() {
    let h = harness(vec![]);
    assert!(matches!(h.tutor.register("  ", "pw"), Err(EngineError::MissingInput(_))));
    assert!(matches!(h.tutor.register("bob", ""), Err(EngineError::MissingInput(_))));
}

#[tokio::test]
async fn diagnosis_submit_then_delete() {
    let h = harness(vec![MockResponse::chunks(&["Are the ", "timers really the issue?"])]);
    let mut ctx = signed_in(&h, "alice");
    let user_id = ctx.user().unwrap().id;

    let entry = h
        .tutor
        .submit_diagnosis(&mut ctx, &ospf(), &StreamControl::default())
        .await
        .unwrap();
    assert_eq!(entry.content, "Are the timers really the issue?");
    assert!(entry.title.contains("OSPF neighbor"));

    let state = ctx.module(Module::Diagnosis);
    assert_eq!(state.history.len(), 1);
    assert_eq!(ctx.phase(Module::Diagnosis), Phase::Live);

    let request = h.mock.last_request().unwrap();
    assert_eq!(request.user_prompt(), Some("neighbor down"));
    assert!(request.system_prompt().unwrap().contains("Hello timers mismatch"));

    let stored = h.conversations.list_recent(user_id, Module::Diagnosis, HISTORY_LIMIT).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, entry.content);

    // Delete mode is off.
    let err = h.tutor.delete_history(&mut ctx, Module::Diagnosis, 0).unwrap_err();
    assert!(matches!(err, EngineError::DeleteModeInactive(Module::Diagnosis)));

    ctx.select_module(Module::Diagnosis);
    ctx.toggle_delete_mode();
    let removed = h.tutor.delete_history(&mut ctx, Module::Diagnosis, 0).unwrap();
    assert_eq!(removed.id, entry.id);
    assert_eq!(ctx.module(Module::Diagnosis).history.len(), 0);
    assert!(h.conversations.list_recent(user_id, Module::Diagnosis, HISTORY_LIMIT).unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_only_the_chosen_duplicate() {
    let h = harness(vec![MockResponse::text("first"), MockResponse::text("second")]);
    let mut ctx = signed_in(&h, "alice");
    let user_id = ctx.user().unwrap().id;

    let first = h.tutor.ask(&mut ctx, "ARP", &StreamControl::default()).await.unwrap();
    let second = h.tutor.ask(&mut ctx, "ARP", &StreamControl::default()).await.unwrap();

    ctx.select_module(Module::Inquiry);
    ctx.toggle_delete_mode();
    h.tutor.delete_history(&mut ctx, Module::Inquiry, 0).unwrap();

    let stored = h.conversations.list_recent(user_id, Module::Inquiry, HISTORY_LIMIT).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, second.id);
    assert_ne!(stored[0].id, first.id);
}

#[tokio::test]
async fn missing_inputs_never_reach_the_service() {
    let h = harness(vec![]);
    let mut ctx = signed_in(&h, "alice");

    let mut request = ospf();
    request.hypothesis = "   ".into();
    let err = h
        .tutor
        .submit_diagnosis(&mut ctx, &request, &StreamControl::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingInput(msg) if msg.contains("what you think")));

    let mut request = ospf();
    request.code = String::new();
    assert!(h.tutor.submit_diagnosis(&mut ctx, &request, &StreamControl::default()).await.is_err());

    let task = TaskRequest { topic: "".into(), mastery: MasteryLevel::Novice };
    assert!(h.tutor.generate_task(&mut ctx, &task, &StreamControl::default()).await.is_err());
    assert!(h.tutor.ask(&mut ctx, "", &StreamControl::default()).await.is_err());

    assert_eq!(h.mock.call_count(), 0);
}

#[tokio::test]
async fn signed_out_sessions_are_rejected() {
    let h = harness(vec![MockResponse::text("unused")]);
    let mut ctx = SessionContext::new();
    let err = h
        .tutor
        .submit_diagnosis(&mut ctx, &ospf(), &StreamControl::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotSignedIn));
    assert_eq!(h.mock.call_count(), 0);
}

#[tokio::test]
async fn completion_failure_sets_inline_error_and_saves_nothing() {
    let h = harness(vec![
        MockResponse::FailAfter(vec!["half an ans".into()], CompletionError::StreamInterrupted("reset".into())),
        MockResponse::text("full answer"),
    ]);
    let mut ctx = signed_in(&h, "alice");
    let user_id = ctx.user().unwrap().id;

    let err = h.tutor.ask(&mut ctx, "VLAN", &StreamControl::default()).await.unwrap_err();
    assert_eq!(err.code(), "COMPLETION_FAILED");

    let state = ctx.module(Module::Inquiry);
    assert!(state.error.is_some());
    assert!(state.history.is_empty());
    assert_eq!(ctx.phase(Module::Inquiry), Phase::Idle);
    assert!(h.conversations.list_recent(user_id, Module::Inquiry, HISTORY_LIMIT).unwrap().is_empty());

    // Retrying succeeds and clears the error.
    h.tutor.ask(&mut ctx, "VLAN", &StreamControl::default()).await.unwrap();
    let state = ctx.module(Module::Inquiry);
    assert!(state.error.is_none());
    assert_eq!(state.history.len(), 1);
}

#[tokio::test]
async fn authentication_error_is_actionable() {
    let h = harness(vec![MockResponse::Error(CompletionError::AuthenticationFailed(
        "invalid api key".into(),
    ))]);
    let mut ctx = signed_in(&h, "alice");
    let _ = h.tutor.ask(&mut ctx, "NAT", &StreamControl::default()).await.unwrap_err();
    let error = ctx.module(Module::Inquiry).error.clone().unwrap();
    assert!(error.contains("AI_API_KEY"));
}

#[tokio::test]
async fn cancelled_generation_leaves_module_untouched() {
    let h = harness(vec![MockResponse::text("first"), MockResponse::Hang]);
    let mut ctx = signed_in(&h, "alice");
    h.tutor.ask(&mut ctx, "OSPF", &StreamControl::default()).await.unwrap();
    let before = ctx.view();

    let control = StreamControl::default();
    control.cancel.cancel();
    let err = h.tutor.ask(&mut ctx, "BGP", &control).await.unwrap_err();
    assert_eq!(err.code(), "CANCELLED");
    assert_eq!(ctx.view(), before);
    assert!(ctx.module(Module::Inquiry).error.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropped_request_does_not_leave_module_generating() {
    let h = harness(vec![MockResponse::Hang]);
    let mut ctx = signed_in(&h, "alice");

    let control = StreamControl::default();
    let timed_out = tokio::time::timeout(
        std::time::Duration::from_secs(300),
        h.tutor.submit_diagnosis(&mut ctx, &ospf(), &control),
    )
    .await;
    assert!(timed_out.is_err());

    assert_eq!(ctx.phase(Module::Diagnosis), Phase::Idle);
    assert!(!ctx.module(Module::Diagnosis).generating);
    assert!(ctx.module(Module::Diagnosis).error.is_none());
    let user_id = ctx.user().unwrap().id;
    let stored = h.conversations.list_recent(user_id, Module::Diagnosis, HISTORY_LIMIT).unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn task_solution_is_generated_once_and_scored_once() {
    let h = harness(vec![
        MockResponse::text("### 🎯 Build two VLANs"),
        MockResponse::chunks(&["vlan 10\n", "vlan 20"]),
    ]);
    let mut ctx = signed_in(&h, "alice");
    let user_id = ctx.user().unwrap().id;

    let task = TaskRequest { topic: "VLAN".into(), mastery: MasteryLevel::Proficient };
    let entry = h.tutor.generate_task(&mut ctx, &task, &StreamControl::default()).await.unwrap();

    let first = h.tutor.reveal_solution(&mut ctx, &StreamControl::default()).await.unwrap();
    assert!(first.generated);
    assert!(first.scored);
    assert_eq!(first.solution, "vlan 10\nvlan 20");

    let second = h.tutor.reveal_solution(&mut ctx, &StreamControl::default()).await.unwrap();
    assert!(!second.generated);
    assert!(!second.scored);
    assert_eq!(second.solution, first.solution);

    assert_eq!(h.mock.call_count(), 2);
    assert_eq!(ctx.progress().value(), 1);
    assert!(h.mock.requests()[1].user_prompt().unwrap().contains("Build two VLANs"));

    // Cached in the session history and persisted.
    let cached = ctx.module(Module::Task).history.get(0).unwrap().solution.clone();
    assert_eq!(cached.as_deref(), Some("vlan 10\nvlan 20"));
    let stored = h.conversations.get(user_id, entry.id).unwrap();
    assert_eq!(stored.solution.as_deref(), Some("vlan 10\nvlan 20"));

    let view = ctx.view();
    let task_view = view.module(Module::Task).unwrap();
    assert_eq!(task_view.solution.as_deref(), Some("vlan 10\nvlan 20"));
}

#[tokio::test]
async fn reveal_needs_a_task() {
    let h = harness(vec![]);
    let mut ctx = signed_in(&h, "alice");
    let err = h.tutor.reveal_solution(&mut ctx, &StreamControl::default()).await.unwrap_err();
    assert!(matches!(err, EngineError::NothingToReveal));
}

#[tokio::test]
async fn viewing_a_stored_task_reuses_its_solution() {
    let h = harness(vec![MockResponse::text("task body"), MockResponse::text("answer")]);
    {
        let mut ctx = signed_in(&h, "alice");
        let task = TaskRequest { topic: "NAT".into(), mastery: MasteryLevel::Novice };
        h.tutor.generate_task(&mut ctx, &task, &StreamControl::default()).await.unwrap();
        h.tutor.reveal_solution(&mut ctx, &StreamControl::default()).await.unwrap();
    }

    // A new session loads the stored solution with the history.
    let mut ctx = SessionContext::new();
    h.tutor.sign_in(&mut ctx, "alice", "pw1").unwrap();
    ctx.view_history(Module::Task, 0).unwrap();

    let revealed = h.tutor.reveal_solution(&mut ctx, &StreamControl::default()).await.unwrap();
    assert!(!revealed.generated);
    assert_eq!(revealed.solution, "answer");
    assert!(revealed.scored);
    assert_eq!(h.mock.call_count(), 2);
}

#[tokio::test]
async fn progress_caps_at_ten() {
    let mut responses = Vec::new();
    for i in 0..12 {
        responses.push(MockResponse::text(&format!("task {i}")));
        responses.push(MockResponse::text(&format!("answer {i}")));
    }
    let h = harness(responses);
    let mut ctx = signed_in(&h, "alice");

    for i in 0..12 {
        let task = TaskRequest { topic: format!("topic {i}"), mastery: MasteryLevel::Shaky };
        h.tutor.generate_task(&mut ctx, &task, &StreamControl::default()).await.unwrap();
        h.tutor.reveal_solution(&mut ctx, &StreamControl::default()).await.unwrap();
    }
    assert_eq!(ctx.progress().value(), PROGRESS_MAX);
    assert_eq!(ctx.module(Module::Task).history.len(), HISTORY_LIMIT);
}

#[tokio::test]
async fn history_is_bounded_and_reloaded_newest_last() {
    let responses = (0..11).map(|i| MockResponse::text(&format!("answer {i}"))).collect();
    let h = harness(responses);
    let mut ctx = signed_in(&h, "alice");

    for i in 0..11 {
        h.tutor.ask(&mut ctx, &format!("concept {i}"), &StreamControl::default()).await.unwrap();
    }
    let live = ctx.module(Module::Inquiry);
    assert_eq!(live.history.len(), HISTORY_LIMIT);
    assert_eq!(live.history.get(0).unwrap().content, "answer 1");
    assert_eq!(live.history.get(HISTORY_LIMIT - 1).unwrap().content, "answer 10");

    h.tutor.sign_out(&mut ctx);
    assert!(ctx.user().is_none());
    assert!(ctx.module(Module::Inquiry).history.is_empty());

    h.tutor.sign_in(&mut ctx, "alice", "pw1").unwrap();
    let reloaded = ctx.module(Module::Inquiry);
    assert_eq!(reloaded.history.len(), HISTORY_LIMIT);
    assert_eq!(reloaded.history.get(0).unwrap().content, "answer 1");
    assert_eq!(reloaded.history.get(HISTORY_LIMIT - 1).unwrap().content, "answer 10");
}

#[tokio::test]
async fn histories_are_per_user() {
    let h = harness(vec![MockResponse::text("alice's")]);
    let mut alice = signed_in(&h, "alice");
    h.tutor.ask(&mut alice, "ARP", &StreamControl::default()).await.unwrap();

    let bob = signed_in(&h, "bob");
    assert!(bob.module(Module::Inquiry).history.is_empty());
}

#[tokio::test]
async fn rendering_twice_changes_nothing() {
    let h = harness(vec![MockResponse::text("task"), MockResponse::text("answer")]);
    let mut ctx = signed_in(&h, "alice");
    let task = TaskRequest { topic: "ACL".into(), mastery: MasteryLevel::Challenge };
    h.tutor.generate_task(&mut ctx, &task, &StreamControl::default()).await.unwrap();
    h.tutor.reveal_solution(&mut ctx, &StreamControl::default()).await.unwrap();

    let a = ctx.view();
    let b = ctx.view();
    assert_eq!(a, b);
    assert_eq!(a.progress, 1);
    assert_eq!(ctx.module(Module::Task).history.len(), 1);
}
