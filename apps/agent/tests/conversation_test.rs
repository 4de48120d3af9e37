//! Integration tests for conversation runs
//!
//! Drives the conversation service with a scripted model over the in-memory
//! store and checks what ends up in the transcript.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;

use cadence_agent::models::{Role, ToolRequest, Turn};
use cadence_agent::services::conversation::INTERRUPTED_TOOL_RESULT;
use cadence_agent::services::ChatError;
use common::*;

/// Every tool request has exactly one tool turn carrying its id
fn assert_requests_answered(turns: &[Turn]) {
    let requested: Vec<&str> = turns
        .iter()
        .flat_map(|t| t.tool_requests.iter().map(|r| r.id.as_str()))
        .collect();
    let answered: Vec<&str> = turns
        .iter()
        .filter_map(|t| t.tool_request_id.as_deref())
        .collect();

    assert_eq!(requested.len(), answered.len());
    let requested: HashSet<&str> = requested.into_iter().collect();
    let answered_set: HashSet<&str> = answered.iter().copied().collect();
    assert_eq!(requested, answered_set);
    assert_eq!(answered.len(), answered_set.len());
}

#[tokio::test]
async fn test_play_playlist_scenario() {
    let harness = HarnessBuilder::new()
        .catalog(lofi_catalog())
        .script(vec![
            call("play_playlist", json!({"query": "Lofi Beats"})),
            text("Now playing Lofi Beats."),
        ])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    let outcome = harness
        .service
        .advance(session.id, "play Lofi Beats")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.reply, "Now playing Lofi Beats.");
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.appended, 4);

    let turns = harness.service.load(session.id).await.unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0], Turn::user("play Lofi Beats"));
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].tool_requests.len(), 1);
    assert_eq!(turns[1].tool_requests[0].name, "play_playlist");
    assert_eq!(turns[2].role, Role::Tool);
    assert_eq!(turns[2].content, "playing playlist for Lofi Beats");
    assert_eq!(
        turns[2].tool_request_id.as_deref(),
        Some(turns[1].tool_requests[0].id.as_str())
    );
    assert!(turns[3].is_final_reply());
    assert_requests_answered(&turns);

    assert_eq!(
        harness.opener.opened(),
        vec!["https://www.youtube.com/playlist?list=PL1".to_string()]
    );
}

#[tokio::test]
async fn test_open_url_scenario_makes_two_infer_calls() {
    let harness = HarnessBuilder::new()
        .script(vec![
            call("open_url", json!({"link": "https://example.com"})),
            text("Opened it for you."),
        ])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    let outcome = harness
        .service
        .advance(session.id, "open https://example.com")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(harness.model.calls(), 2);
    assert_eq!(outcome.reply, "Opened it for you.");

    let turns = harness.service.load(session.id).await.unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[2].content, "opened https://example.com in the browser");
    assert_requests_answered(&turns);
}

#[tokio::test]
async fn test_playlist_miss_is_reported_and_run_finishes() {
    let harness = HarnessBuilder::new()
        .script(vec![
            call("play_playlist", json!({"query": "polka"})),
            text("I couldn't find that playlist."),
        ])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    let outcome = harness
        .service
        .advance(session.id, "play polka")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.reply, "I couldn't find that playlist.");
    let turns = harness.service.load(session.id).await.unwrap();
    assert!(turns[2].content.contains("polka"));
    assert_eq!(turns[2].content, "No playlist found for polka");
    assert!(harness.opener.opened().is_empty());
}

#[tokio::test]
async fn test_multiple_requests_in_one_round() {
    let harness = HarnessBuilder::new()
        .catalog(mixed_catalog())
        .script(vec![
            calls(&[
                ("search_video", json!({"query": "jazz piano"})),
                ("play_playlist", json!({"query": "Sunday Morning Jazz"})),
                ("no_such_tool", json!({})),
            ]),
            text("Done."),
        ])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    let outcome = harness
        .service
        .advance(session.id, "jazz please")
        .await
        .unwrap()
        .unwrap();

    // user + assistant + 3 tool turns + final
    assert_eq!(outcome.appended, 6);

    let turns = harness.service.load(session.id).await.unwrap();
    assert_eq!(turns.len(), 6);
    assert_requests_answered(&turns);

    let results: Vec<&str> = turns[2..5].iter().map(|t| t.content.as_str()).collect();
    assert_eq!(
        results,
        vec![
            "jazz piano opened on YouTube search",
            "playing playlist for Sunday Morning Jazz",
            "unknown tool: no_such_tool",
        ]
    );
}

#[tokio::test]
async fn test_turn_count_over_several_calls() {
    let harness = HarnessBuilder::new()
        .catalog(lofi_catalog())
        .script(vec![
            text("Hello!"),
            call("play_playlist", json!({"query": "lofi"})),
            call("search_video", json!({"query": "rain"})),
            text("Playing lofi and showing rain videos."),
        ])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    let first = harness.service.advance(session.id, "hi").await.unwrap().unwrap();
    let second = harness
        .service
        .advance(session.id, "lofi and rain")
        .await
        .unwrap()
        .unwrap();

    // 1 + 1, then 1 + (1 + 1) + (1 + 1) + 1
    assert_eq!(first.appended, 2);
    assert_eq!(second.appended, 6);
    assert_eq!(second.rounds, 3);

    let turns = harness.service.load(session.id).await.unwrap();
    assert_eq!(turns.len(), 8);
    assert_requests_answered(&turns);
}

#[tokio::test]
async fn test_context_includes_whole_transcript() {
    let harness = HarnessBuilder::new()
        .script(vec![text("first reply"), text("second reply")])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    harness.service.advance(session.id, "one").await.unwrap();
    harness.service.advance(session.id, "two").await.unwrap();

    let contexts = harness.model.contexts();
    assert_eq!(contexts[0], vec![Turn::user("one")]);
    assert_eq!(
        contexts[1],
        vec![
            Turn::user("one"),
            Turn::assistant("first reply", vec![]),
            Turn::user("two"),
        ]
    );
}

#[tokio::test]
async fn test_empty_message_is_noop() {
    let harness = HarnessBuilder::new().build().await;
    let session = harness.service.create_session("ana").await.unwrap();

    let outcome = harness.service.advance(session.id, "   \n").await.unwrap();

    assert!(outcome.is_none());
    assert_eq!(harness.model.calls(), 0);
    assert!(harness.service.load(session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_too_long_message_rejected() {
    let harness = HarnessBuilder::new().build().await;
    let session = harness.service.create_session("ana").await.unwrap();

    let result = harness.service.advance(session.id, &"x".repeat(10_001)).await;

    assert_matches!(result, Err(ChatError::InvalidInput(_)));
    assert!(harness.service.load(session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_session_rejected() {
    let harness = HarnessBuilder::new().build().await;
    let missing = Uuid::new_v4();

    let result = harness.service.advance(missing, "hello").await;

    assert_matches!(result, Err(ChatError::SessionNotFound(id)) if id == missing);
    assert!(harness.service.load(missing).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_model_failure_keeps_user_turn_only() {
    let harness = HarnessBuilder::new()
        .script(vec![Step::Fail("backend down".into())])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    let result = harness.service.advance(session.id, "play something").await;

    assert_matches!(result, Err(ChatError::Model(_)));
    let turns = harness.service.load(session.id).await.unwrap();
    assert_eq!(turns, vec![Turn::user("play something")]);
}

#[tokio::test]
async fn test_retry_after_failure_merges_user_turns_in_context() {
    let harness = HarnessBuilder::new()
        .script(vec![Step::Fail("backend down".into()), text("Here you go.")])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    assert!(harness.service.advance(session.id, "play jazz").await.is_err());

    let outcome = harness
        .service
        .advance(session.id, "play jazz again")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.reply, "Here you go.");

    let turns = harness.service.load(session.id).await.unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[1].role, Role::User);
}

#[tokio::test]
async fn test_model_timeout_is_fatal() {
    let harness = HarnessBuilder::new()
        .script(vec![Step::Stall(Duration::from_secs(5))])
        .model_timeout(Duration::from_millis(50))
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    let result = harness.service.advance(session.id, "hello").await;

    assert_matches!(result, Err(ChatError::Timeout));
    assert_eq!(harness.service.load(session.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_round_limit_leaves_valid_transcript() {
    let harness = HarnessBuilder::new()
        .max_rounds(2)
        .script(vec![
            call("search_video", json!({"query": "a"})),
            call("search_video", json!({"query": "b"})),
            call("search_video", json!({"query": "c"})),
        ])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    let result = harness.service.advance(session.id, "loop forever").await;

    assert_matches!(result, Err(ChatError::RoundLimitExceeded(2)));
    assert_eq!(harness.model.calls(), 3);

    let turns = harness.service.load(session.id).await.unwrap();
    // user + 2 x (assistant + tool); the third request is not recorded
    assert_eq!(turns.len(), 5);
    assert_requests_answered(&turns);
    assert_eq!(harness.opener.opened().len(), 2);
}

#[tokio::test]
async fn test_dangling_requests_are_repaired_before_next_message() {
    let harness = HarnessBuilder::new().script(vec![text("Back again.")]).build().await;
    let session = harness.service.create_session("ana").await.unwrap();

    // Transcript of a run that crashed between the assistant turn and its tool turns
    let request = ToolRequest::new("call_crashed", "search_video", object(json!({"query": "x"})));
    harness.service.append(session.id, &Turn::user("search x")).await.unwrap();
    harness
        .service
        .append(session.id, &Turn::assistant("", vec![request]))
        .await
        .unwrap();

    let outcome = harness
        .service
        .advance(session.id, "hello?")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.appended, 3);

    let turns = harness.service.load(session.id).await.unwrap();
    assert_eq!(turns.len(), 5);
    assert_eq!(turns[2], Turn::tool("call_crashed", INTERRUPTED_TOOL_RESULT));
    assert_eq!(turns[3], Turn::user("hello?"));
    assert_requests_answered(&turns);
}

#[tokio::test]
async fn test_load_is_idempotent() {
    let harness = HarnessBuilder::new()
        .catalog(lofi_catalog())
        .script(vec![call("play_playlist", json!({"query": "lofi"})), text("ok")])
        .build()
        .await;

    let session = harness.service.create_session("ana").await.unwrap();
    harness.service.advance(session.id, "lofi").await.unwrap();

    let first = harness.service.load(session.id).await.unwrap();
    let second = harness.service.load(session.id).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_runs_on_one_session_are_serialized() {
    let harness = HarnessBuilder::new()
        .script(vec![text("reply one"), text("reply two")])
        .build()
        .await;
    let session = harness.service.create_session("ana").await.unwrap();

    let (a, b) = tokio::join!(
        harness.service.advance(session.id, "first"),
        harness.service.advance(session.id, "second"),
    );
    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());

    let turns = harness.service.load(session.id).await.unwrap();
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}
