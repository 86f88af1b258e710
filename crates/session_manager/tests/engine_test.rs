
use std::sync::Arc;

use chat_core::TurnKey;
use chat_state::{Direction, SendState};
use session_manager::{EngineError, SendOutcome};
use test_utils::{engine, history, FakeBackend};

fn backend_with_history() -> Arc<FakeBackend> {
    let backend = Arc::new(FakeBackend::new());
    backend.seed("s1", history());
    backend.seed("s2", vec![chat_core::Message::root(50, "Other session")]);
    backend
}

#[tokio::test]
async fn load_session_builds_turns_with_latest_versions() {
    let backend = backend_with_history();
    let engine = engine(&backend);

    engine.load_session("s1").await.unwrap();
    let snapshot = engine.snapshot().await;

    assert_eq!(snapshot.session_id.as_deref(), Some("s1"));
    assert_eq!(snapshot.sessions.len(), 2);
    assert_eq!(snapshot.turns.len(), 2);
    assert_eq!(snapshot.turns[0].version_count, 2);
    assert_eq!(snapshot.turns[0].selected, Some(1));
    assert_eq!(
        snapshot.turns[0].reply.as_ref().unwrap().content,
        "A systems language."
    );
    assert_eq!(snapshot.state, SendState::Idle);
}

#[tokio::test]
async fn failed_load_leaves_current_session_untouched() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();
    let before = engine.snapshot().await;

    let err = engine.load_session("missing").await.unwrap_err();
    assert!(matches!(err, EngineError::FetchMessagesFailed(_)));

    let after = engine.snapshot().await;
    assert_eq!(after.session_id, before.session_id);
    assert_eq!(after.turns, before.turns);
    assert!(after.notice.unwrap().contains("missing"));
}

#[tokio::test]
async fn first_send_creates_session_and_new_turn() {
    let backend = Arc::new(FakeBackend::new());
    let engine = engine(&backend);

    let outcome = engine.send("Hello", None).await.unwrap();

    assert_eq!(backend.created_sessions(), 1);
    assert_eq!(outcome.session_id(), "created-1");
    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "test-model");
    assert_eq!(requests[0].user_id, "tester");

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.session_id.as_deref(), Some("created-1"));
    assert_eq!(snapshot.turns.len(), 1);
    assert_eq!(snapshot.turns[0].prompt, "Hello");
    assert_eq!(snapshot.turns[0].reply.as_ref().unwrap().content, "reply 0 to Hello");
    assert_eq!(snapshot.state, SendState::Idle);
}

#[tokio::test]
async fn session_create_failure_applies_nothing() {
    let backend = Arc::new(FakeBackend::new());
    backend.fail_creates(true);
    let engine = engine(&backend);

    let err = engine.send("Hello", None).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionCreateFailed(_)));

    let snapshot = engine.snapshot().await;
    assert!(snapshot.session_id.is_none());
    assert!(snapshot.turns.is_empty());
    assert_eq!(snapshot.state, SendState::Idle);
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn empty_input_is_rejected() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    assert!(matches!(
        engine.send("   ", None).await,
        Err(EngineError::EmptyInput)
    ));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn retry_previews_prospective_index_then_selects_newest() {
    let backend = backend_with_history();
    let gate = backend.hold_sends();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send("What is Rust?", Some("other-model")).await }
    });
    backend.wait_for_send().await;

    let preview = engine.snapshot().await;
    let turn = preview.turn(&TurnKey::new("1")).unwrap();
    assert_eq!(turn.version_count, 3);
    assert_eq!(turn.selected, Some(2));
    assert!(turn.reply.as_ref().unwrap().pending);
    assert!(preview.is_sending());
    assert_eq!(preview.turns.len(), 2);

    gate.notify_one();
    let outcome = task.await.unwrap().unwrap();
    match outcome {
        SendOutcome::Confirmed { turn, version, .. } => {
            assert_eq!(turn, Some(TurnKey::new("1")));
            assert_eq!(version, Some(2));
        }
        other => panic!("expected confirmation, got {other:?}"),
    }

    let snapshot = engine.snapshot().await;
    let turn = snapshot.turn(&TurnKey::new("1")).unwrap();
    assert_eq!(turn.version_count, 3);
    assert_eq!(turn.reply.as_ref().unwrap().content, "reply 2 to What is Rust?");
    assert!(!turn.reply.as_ref().unwrap().pending);
    assert_eq!(backend.requests()[0].model, "other-model");
}

#[tokio::test]
async fn confirmation_replaces_optimistic_entries() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    engine.send("A new question", None).await.unwrap();

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.turns.len(), 3);
    let last = snapshot.last_turn().unwrap();
    // Server key, not the provisional one.
    assert!(!last.key.as_str().starts_with("local"));
    assert_eq!(last.prompt, "A new question");
    assert_eq!(last.version_count, 1);
}

#[tokio::test]
async fn failed_send_shows_error_reply_and_keeps_prompt() {
    let backend = backend_with_history();
    backend.fail_sends(Some(500));
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let outcome = engine.send("Will this work?", None).await.unwrap();
    match &outcome {
        SendOutcome::Failed { error, .. } => {
            assert!(error.to_string().contains("model exploded"));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.state, SendState::Idle);
    let last = snapshot.last_turn().unwrap();
    assert_eq!(last.prompt, "Will this work?");
    let reply = last.reply.as_ref().unwrap();
    assert!(reply.error);
    assert!(reply.content.starts_with("Sorry, something went wrong:"));
    assert!(snapshot.notice.unwrap().contains("model exploded"));
}

#[tokio::test]
async fn failed_retry_keeps_existing_versions() {
    let backend = backend_with_history();
    backend.fail_sends(Some(502));
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    engine.send("Explain ownership", None).await.unwrap();

    let snapshot = engine.snapshot().await;
    let turn = snapshot.turn(&TurnKey::new("4")).unwrap();
    assert_eq!(turn.version_count, 2);
    assert_eq!(turn.selected, Some(1));
    assert!(turn.reply.as_ref().unwrap().error);

    engine
        .select_version(&TurnKey::new("4"), 0)
        .await
        .unwrap();
    let snapshot = engine.snapshot().await;
    let turn = snapshot.turn(&TurnKey::new("4")).unwrap();
    assert_eq!(
        turn.reply.as_ref().unwrap().content,
        "Each value has one owner."
    );
}

#[tokio::test]
async fn second_send_while_in_flight_is_rejected() {
    let backend = backend_with_history();
    let gate = backend.hold_sends();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send("First", None).await }
    });
    backend.wait_for_send().await;

    let err = engine.send("Second", None).await.unwrap_err();
    assert!(matches!(err, EngineError::SendInProgress(ref id) if id == "s1"));

    gate.notify_one();
    assert!(task.await.unwrap().unwrap().is_confirmed());
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn late_response_after_switch_is_ignored() {
    let backend = backend_with_history();
    let gate = backend.hold_sends();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send("Slow question", None).await }
    });
    backend.wait_for_send().await;

    engine.load_session("s2").await.unwrap();
    let before = engine.snapshot().await;

    gate.notify_one();
    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, SendOutcome::Stale { ref session_id } if session_id == "s1"));

    let after = engine.snapshot().await;
    assert_eq!(after.session_id.as_deref(), Some("s2"));
    assert_eq!(after.turns, before.turns);
    assert_eq!(after.state, SendState::Idle);

    // The send itself went through; reopening shows it.
    engine.load_session("s1").await.unwrap();
    let reopened = engine.snapshot().await;
    assert_eq!(reopened.last_turn().unwrap().prompt, "Slow question");
}

#[tokio::test]
async fn fetch_failure_after_send_keeps_reply_visible() {
    let backend = backend_with_history();
    let gate = backend.hold_sends();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send("Fresh prompt", None).await }
    });
    backend.wait_for_send().await;
    backend.fail_fetches(true);
    gate.notify_one();

    assert!(task.await.unwrap().unwrap().is_confirmed());
    let snapshot = engine.snapshot().await;
    let last = snapshot.last_turn().unwrap();
    assert_eq!(last.prompt, "Fresh prompt");
    assert_eq!(
        last.reply.as_ref().unwrap().content,
        "reply 0 to Fresh prompt"
    );
    assert!(snapshot.notice.is_some());
}

#[tokio::test]
async fn version_navigation_saturates() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();
    let key = TurnKey::new("1");

    assert_eq!(engine.advance(&key, Direction::Next).await.unwrap(), Some(1));
    assert_eq!(engine.advance(&key, Direction::Previous).await.unwrap(), Some(0));
    assert_eq!(engine.advance(&key, Direction::Previous).await.unwrap(), Some(0));
    assert_eq!(engine.select_version(&key, 99).await.unwrap(), Some(1));
    assert_eq!(engine.select_version(&key, -4).await.unwrap(), Some(0));

    let missing = engine.advance(&TurnKey::new("nope"), Direction::Next).await;
    assert!(matches!(missing, Err(EngineError::TurnNotFound(_))));
}

#[tokio::test]
async fn selection_resets_on_session_switch() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();
    engine.select_version(&TurnKey::new("1"), 0).await.unwrap();

    engine.load_session("s2").await.unwrap();
    engine.load_session("s1").await.unwrap();

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.turn(&TurnKey::new("1")).unwrap().selected, Some(1));
}

#[tokio::test]
async fn edit_truncates_and_sends_new_turn() {
    let backend = backend_with_history();
    let gate = backend.hold_sends();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let task = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine
                .edit(&TurnKey::new("1"), "What is Rust, briefly?", None)
                .await
        }
    });
    backend.wait_for_send().await;

    let preview = engine.snapshot().await;
    assert_eq!(preview.turns.len(), 1);
    assert_eq!(preview.turns[0].prompt, "What is Rust, briefly?");

    gate.notify_one();
    assert!(task.await.unwrap().unwrap().is_confirmed());

    // Server history is unchanged apart from the new turn.
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.turns.len(), 3);
    assert_eq!(snapshot.last_turn().unwrap().prompt, "What is Rust, briefly?");
}

#[tokio::test]
async fn regenerate_adds_a_version() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let outcome = engine.regenerate(&TurnKey::new("4"), None).await.unwrap();
    assert!(outcome.is_confirmed());

    let snapshot = engine.snapshot().await;
    let turn = snapshot.turn(&TurnKey::new("4")).unwrap();
    assert_eq!(turn.version_count, 2);
    assert_eq!(turn.selected, Some(1));
    assert_eq!(backend.requests()[0].message, "Explain ownership");
}

#[tokio::test]
async fn branch_starts_a_new_session() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let outcome = engine.branch("Start over", None).await.unwrap();

    assert_eq!(outcome.session_id(), "created-1");
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.turns.len(), 1);
    assert_eq!(snapshot.turns[0].prompt, "Start over");
    assert_eq!(backend.stored("s1").len(), history().len());
}

#[tokio::test]
async fn correct_message_updates_and_refreshes() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    engine.correct_message("5", "Every value has exactly one owner.").await.unwrap();

    let snapshot = engine.snapshot().await;
    let turn = snapshot.turn(&TurnKey::new("4")).unwrap();
    assert_eq!(
        turn.reply.as_ref().unwrap().content,
        "Every value has exactly one owner."
    );

    let err = engine.correct_message("999", "nope").await.unwrap_err();
    assert!(matches!(err, EngineError::MessageNotFound(_)));
}

#[tokio::test]
async fn subscribers_see_updates() {
    let backend = backend_with_history();
    let engine = engine(&backend);
    let mut updates = engine.subscribe();

    engine.load_session("s1").await.unwrap();

    assert!(updates.has_changed().unwrap());
    let latest = updates.borrow_and_update().clone();
    assert_eq!(latest.session_id.as_deref(), Some("s1"));
}

#[tokio::test]
async fn retry_after_failed_retry_previews_pending_slot() {
    let backend = backend_with_history();
    backend.fail_sends(Some(502));
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let outcome = engine.send("Explain ownership", None).await.unwrap();
    assert!(matches!(outcome, SendOutcome::Failed { .. }));

    backend.fail_sends(None);
    let gate = backend.hold_sends();
    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send("Explain ownership", None).await }
    });
    backend.wait_for_send().await;

    let preview = engine.snapshot().await;
    let turn = preview.turn(&TurnKey::new("4")).unwrap();
    assert_eq!(turn.version_count, 2);
    assert_eq!(turn.selected, Some(1));
    let reply = turn.reply.as_ref().unwrap();
    assert!(reply.pending);
    assert!(!reply.error);
    assert_eq!(preview.anomalies, 0);

    gate.notify_one();
    assert!(task.await.unwrap().unwrap().is_confirmed());
    let snapshot = engine.snapshot().await;
    let turn = snapshot.turn(&TurnKey::new("4")).unwrap();
    assert_eq!(turn.version_count, 2);
    assert_eq!(
        turn.reply.as_ref().unwrap().content,
        "reply 1 to Explain ownership"
    );
}

#[tokio::test]
async fn repeated_failed_retries_keep_one_error_reply() {
    let backend = backend_with_history();
    backend.fail_sends(Some(502));
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    engine.send("Explain ownership", None).await.unwrap();
    engine.send("Explain ownership", None).await.unwrap();

    let snapshot = engine.snapshot().await;
    let turn = snapshot.turn(&TurnKey::new("4")).unwrap();
    assert_eq!(turn.version_count, 2);
    assert!(turn.reply.as_ref().unwrap().error);
    assert_eq!(snapshot.anomalies, 0);
}

#[tokio::test]
async fn resending_failed_new_turn_does_not_duplicate_it() {
    let backend = backend_with_history();
    backend.fail_sends(Some(500));
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    engine.send("Brand new", None).await.unwrap();
    engine.send("Brand new", None).await.unwrap();

    let prompts: Vec<String> = engine
        .snapshot()
        .await
        .turns
        .iter()
        .map(|t| t.prompt.clone())
        .collect();
    assert_eq!(prompts, ["What is Rust?", "Explain ownership", "Brand new"]);

    backend.fail_sends(None);
    assert!(engine.send("Brand new", None).await.unwrap().is_confirmed());
    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.turns.len(), 3);
    let last = snapshot.last_turn().unwrap();
    assert!(!last.key.as_str().starts_with("local"));
    assert_eq!(last.reply.as_ref().unwrap().content, "reply 0 to Brand new");
}

#[tokio::test]
async fn late_failure_after_switch_is_ignored() {
    let backend = backend_with_history();
    backend.fail_sends(Some(500));
    let gate = backend.hold_sends();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send("Doomed question", None).await }
    });
    backend.wait_for_send().await;

    engine.load_session("s2").await.unwrap();
    let before = engine.snapshot().await;

    gate.notify_one();
    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, SendOutcome::Stale { ref session_id } if session_id == "s1"));

    let after = engine.snapshot().await;
    assert_eq!(after.turns, before.turns);
    assert!(after.notice.is_none());
    assert_eq!(after.state, SendState::Idle);

    // Nothing in flight any more, and no error reply was left behind.
    engine.load_session("s1").await.unwrap();
    let reopened = engine.snapshot().await;
    assert_eq!(reopened.state, SendState::Idle);
    assert_eq!(reopened.turns.len(), 2);
    assert!(reopened.turns.iter().all(|t| !t.reply.as_ref().is_some_and(|r| r.error)));
}

#[tokio::test]
async fn reopening_session_with_send_in_flight_shows_sending() {
    let backend = backend_with_history();
    let gate = backend.hold_sends();
    let engine = engine(&backend);
    engine.load_session("s1").await.unwrap();

    let task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.send("Slow question", None).await }
    });
    backend.wait_for_send().await;

    engine.load_session("s2").await.unwrap();
    engine.load_session("s1").await.unwrap();

    let reopened = engine.snapshot().await;
    assert!(reopened.is_sending());
    assert_eq!(reopened.state.sending_session(), Some("s1"));
    let err = engine.send("Another one", None).await.unwrap_err();
    assert!(matches!(err, EngineError::SendInProgress(ref id) if id == "s1"));

    gate.notify_one();
    assert!(task.await.unwrap().unwrap().is_confirmed());

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.state, SendState::Idle);
    assert_eq!(snapshot.last_turn().unwrap().prompt, "Slow question");
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn session_list_failure_has_its_own_error() {
    let backend = backend_with_history();
    backend.fail_session_lists(true);
    let engine = engine(&backend);

    let err = engine.refresh_sessions().await.unwrap_err();
    assert!(matches!(err, EngineError::FetchSessionsFailed(_)));
    assert!(err.to_string().contains("sessions unavailable"));
}

#[tokio::test]
async fn model_names_are_checked_against_catalog() {
    let backend = backend_with_history();
    backend.set_models(&["gpt-4o", "deepseek-chat"]);
    let engine = engine(&backend);

    assert_eq!(engine.check_model("deepseek-chat").await.unwrap(), "deepseek-chat");
    let err = engine.check_model("gpt-5-imaginary").await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownModel(ref name) if name == "gpt-5-imaginary"));

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.models.len(), 2);
    assert_eq!(snapshot.models[0].label, "GPT-4O");
}

#[tokio::test]
async fn empty_catalog_accepts_any_model() {
    let backend = backend_with_history();
    let engine = engine(&backend);

    assert_eq!(engine.check_model("local-llama").await.unwrap(), "local-llama");
    assert!(engine.list_models().await.unwrap().is_empty());
}
