//! Tests for `Conversation::submit()`: streamed replies, one turn at a time,
//! cancellation on drop and tool activity reporting.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::*;
use futures_util::StreamExt;
use hisho_core::{Conversation, ReplyFragment, ToolActivity};
use hisho_types::HishoError;
use serde_json::json;

async fn collect(stream: hisho_core::ReplyStream) -> Vec<Result<ReplyFragment, HishoError>> {
    stream.collect().await
}

#[tokio::test]
async fn submit_streams_text_then_finishes() {
    let provider = ScriptedProvider::rounds(vec![vec![
        text("Good "),
        text("morning."),
        usage(12, 4),
        finish(),
    ]]);
    let server = FakeToolServer::new(|_, _| Ok(text_result("{}")));
    let conversation = Conversation::new(make_loop(provider, server));

    let items = collect(conversation.submit("Hi")).await;

    assert_eq!(items.len(), 3);
    assert!(matches!(&items[0], Ok(ReplyFragment::Text(t)) if t == "Good "));
    assert!(matches!(&items[1], Ok(ReplyFragment::Text(t)) if t == "morning."));
    match &items[2] {
        Ok(ReplyFragment::Finished { truncated, usage }) => {
            assert!(!truncated);
            assert_eq!(usage.output_tokens, 4);
        }
        other => panic!("expected Finished, got {other:?}"),
    }
    assert_eq!(conversation.history().await.len(), 2);
}

#[tokio::test]
async fn second_submit_while_running_is_rejected() {
    let provider = ScriptedProvider::rounds(vec![vec![
        delayed(text("slow"), 200),
        finish(),
    ]]);
    let server = FakeToolServer::new(|_, _| Ok(text_result("{}")));
    let conversation = Conversation::new(make_loop(provider, server));

    let first = conversation.submit("one");
    assert!(conversation.is_busy());

    let second = collect(conversation.submit("two")).await;
    assert_eq!(second.len(), 1);
    assert!(matches!(second[0], Err(HishoError::TurnInProgress)));
    assert!(matches!(conversation.clear(), Err(HishoError::TurnInProgress)));

    let first = collect(first).await;
    assert!(matches!(first.last(), Some(Ok(ReplyFragment::Finished { .. }))));
    assert!(!conversation.is_busy());

    // Only the first turn reached the history.
    let history = conversation.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text(), "one");
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_turn() {
    let provider = ScriptedProvider::rounds(vec![vec![
        text("Thinking"),
        delayed(text("..."), 5_000),
        finish(),
    ]]);
    let server = FakeToolServer::new(|_, _| Ok(text_result("{}")));
    let conversation = Conversation::new(make_loop(provider, server));

    let mut stream = conversation.submit("Hi");
    let first = stream.next().await;
    assert!(matches!(first, Some(Ok(ReplyFragment::Text(_)))));
    drop(stream);

    // The turn releases the history promptly instead of waiting 5s.
    let history = tokio::time::timeout(Duration::from_secs(1), conversation.history())
        .await
        .expect("cancelled turn should release the conversation");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn explicit_cancel_ends_stream_with_cancelled() {
    let provider = ScriptedProvider::rounds(vec![vec![
        delayed(text("late"), 5_000),
        finish(),
    ]]);
    let server = FakeToolServer::new(|_, _| Ok(text_result("{}")));
    let conversation = Conversation::new(make_loop(provider, server));

    let stream = conversation.submit("Hi");
    stream.cancel();
    let items = tokio::time::timeout(Duration::from_secs(1), collect(stream))
        .await
        .unwrap();
    assert!(matches!(items.last(), Some(Err(HishoError::Cancelled))));
}

#[tokio::test]
async fn tool_activity_hook_sees_start_and_finish() {
    let provider = ScriptedProvider::rounds(vec![
        vec![tool_call("p1", "get_profile", json!({})), finish()],
        vec![text("You are Sato."), finish()],
    ]);
    let server = FakeToolServer::new(|_, _| Ok(text_result(r#"{"name":"Sato"}"#)));
    let mut conversation = Conversation::new(make_loop(provider, server));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    conversation.on_tool_activity(move |activity| {
        let label = match activity {
            ToolActivity::Started { name, .. } => format!("start {name}"),
            ToolActivity::Finished(invocation) => format!(
                "end {} ok={}",
                invocation.abstract_name,
                invocation.outcome.is_ok()
            ),
        };
        sink.lock().unwrap().push(label);
    });

    let items = collect(conversation.submit("Who am I?")).await;
    assert!(items.iter().all(Result::is_ok));

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["start get_profile", "end get_profile ok=true"]
    );
}

#[tokio::test]
async fn clear_forgets_history() {
    let provider = ScriptedProvider::rounds(vec![vec![text("Hi."), finish()]]);
    let server = FakeToolServer::new(|_, _| Ok(text_result("{}")));
    let conversation = Conversation::new(make_loop(provider, server));

    collect(conversation.submit("Hello")).await;
    assert_eq!(conversation.history().await.len(), 2);

    conversation.clear().unwrap();
    assert!(conversation.history().await.is_empty());
}
