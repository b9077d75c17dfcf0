//! Session-level tests: envelopes in, envelopes out, with scripted providers.

mod common;

use aria_server::session::{SessionError, SessionState, REPROMPT_REPLY};
use aria_types::{decode_audio, HistoryEntry, Role, READY_MESSAGE};
use aria_voice::{FALLBACK_REPLY, MAX_STT_INPUT_BYTES};
use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn context_emits_ready_and_loads_history_window() {
    let harness = Harness::new();
    harness.history.seed(
        "u1",
        (0..12)
            .map(|i| HistoryEntry::now(Role::User, format!("turn {i}")))
            .collect(),
    );
    let (mut session, mut rx) = harness.session();

    session
        .handle_frame(&context_frame(json!({"userId": "u1", "householdId": "h1"})))
        .await
        .unwrap();

    let frames = drain(&mut rx);
    assert_eq!(frames, vec![json!({"type": "ready", "message": READY_MESSAGE})]);
    assert_eq!(session.state(), SessionState::Ready);

    let window: Vec<&str> = session
        .history_window()
        .iter()
        .map(|entry| entry.content.as_str())
        .collect();
    assert_eq!(window.len(), 10);
    assert_eq!(window.first(), Some(&"turn 2"));
    assert_eq!(window.last(), Some(&"turn 11"));
}

#[tokio::test]
async fn second_context_reemits_ready_and_replaces_context() {
    let harness = Harness::new();
    let (mut session, mut rx) = harness.session();

    session
        .handle_frame(&context_frame(json!({"userId": "u1", "userName": "Sam"})))
        .await
        .unwrap();
    harness
        .history
        .seed("u2", vec![HistoryEntry::now(Role::Assistant, "hi u2")]);
    session
        .handle_frame(&context_frame(json!({"userId": "u2"})))
        .await
        .unwrap();

    assert_eq!(kinds(&drain(&mut rx)), vec!["ready", "ready"]);
    assert_eq!(session.context().user_id.as_deref(), Some("u2"));
    assert_eq!(session.context().user_name, None);
    assert_eq!(session.history_window().len(), 1);
    assert_eq!(harness.history.reads(), 2);
}

#[tokio::test]
async fn full_turn_is_framed_and_recorded() {
    let harness = Harness::new();
    let (mut session, mut rx) = harness.session();

    session
        .handle_frame(&context_frame(json!({
            "userId": "u1",
            "userName": "Sam",
            "voicePreferences": {"name": "en-US-GuyNeural", "rate": 1.2}
        })))
        .await
        .unwrap();
    drain(&mut rx);

    session.handle_frame(&audio_frame(b"utterance")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), FULL_TURN);
    assert_eq!(frames[1]["text"], "what time is it");
    assert_eq!(frames[2]["text"], "It is noon.");
    let audio = decode_audio(frames[3]["audio"].as_str().unwrap()).unwrap();
    assert_eq!(audio, b"mp3-bytes");
    assert_eq!(session.state(), SessionState::Ready);

    assert_eq!(harness.stt.calls.lock().unwrap()[0], b"utterance");
    let call = harness.model.last_call();
    assert_eq!(call.prompt, "what time is it");
    assert!(call.system_prompt.contains("You are speaking with Sam."));

    let (text, voice) = harness.tts.calls.lock().unwrap()[0].clone();
    assert_eq!(text, "It is noon.");
    assert_eq!(voice.name, "en-US-GuyNeural");
    assert_eq!(voice.rate, 1.2);
    assert_eq!(voice.pitch, 1.0);

    let log = harness.history.log("u1");
    assert_eq!(log.len(), 2);
    assert_eq!((log[0].role, log[0].content.as_str()), (Role::User, "what time is it"));
    assert_eq!((log[1].role, log[1].content.as_str()), (Role::Assistant, "It is noon."));
}

#[tokio::test]
async fn loaded_history_reaches_the_language_model() {
    let harness = Harness::new();
    harness.history.seed(
        "u1",
        vec![
            HistoryEntry::now(Role::User, "my name is Sam"),
            HistoryEntry::now(Role::Assistant, "Nice to meet you, Sam."),
        ],
    );
    let (mut session, _rx) = harness.session();

    session
        .handle_frame(&context_frame(json!({"userId": "u1"})))
        .await
        .unwrap();
    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let history = harness.model.last_call().history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "my name is Sam");
    assert_eq!(history[1].role, Role::Assistant);
}

#[tokio::test]
async fn anonymous_session_never_touches_history() {
    let harness = Harness::new();
    let (mut session, mut rx) = harness.session();

    session
        .handle_frame(&context_frame(json!({"householdId": "h1", "userId": "  "})))
        .await
        .unwrap();
    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames)[0], "ready");
    assert_eq!(kinds(&frames[1..]), FULL_TURN);
    assert_eq!(harness.history.reads(), 0);
    assert_eq!(harness.history.writes(), 0);
}

#[tokio::test]
async fn empty_transcript_reprompts_without_the_language_model() {
    let harness = Harness::scripted(
        vec![Step::ok("")],
        vec![Step::ok("unused")],
        vec![Step::ok("reprompt-audio")],
    );
    let (mut session, mut rx) = harness.session();
    session
        .handle_frame(&context_frame(json!({"userId": "u1"})))
        .await
        .unwrap();
    drain(&mut rx);

    session.handle_frame(&audio_frame(b"silence")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), FULL_TURN);
    assert_eq!(frames[1]["text"], "");
    assert_eq!(frames[2]["text"], REPROMPT_REPLY);
    assert_eq!(harness.model.call_count(), 0);
    assert_eq!(harness.tts.calls.lock().unwrap()[0].0, REPROMPT_REPLY);
    assert_eq!(harness.history.writes(), 0);
}

#[tokio::test]
async fn transcription_failure_is_one_error_inside_the_frame() {
    let harness = Harness::scripted(
        vec![Step::Fail("HTTP 500".to_string())],
        vec![Step::ok("unused")],
        vec![Step::ok("unused")],
    );
    let (mut session, mut rx) = harness.session();

    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), ["processing:start", "error", "processing:end"]);
    assert!(frames[1]["message"]
        .as_str()
        .unwrap()
        .contains("transcription failed"));
    assert_eq!(harness.model.call_count(), 0);
    assert_eq!(harness.tts.call_count(), 0);
}

#[tokio::test]
async fn unconfigured_provider_fails_the_turn_but_not_the_session() {
    let harness = Harness::scripted(
        vec![Step::ok("hello")],
        vec![Step::Unconfigured, Step::ok("Hello again.")],
        vec![Step::ok("audio")],
    );
    let (mut session, mut rx) = harness.session();
    session
        .handle_frame(&context_frame(json!({"userId": "u1"})))
        .await
        .unwrap();
    drain(&mut rx);

    session.handle_frame(&audio_frame(b"one")).await.unwrap();
    let first = drain(&mut rx);
    assert_eq!(
        kinds(&first),
        ["processing:start", "transcript", "error", "processing:end"]
    );
    assert_eq!(first[2]["message"], "provider `claude` is not configured");
    assert_eq!(session.state(), SessionState::Ready);

    session.handle_frame(&audio_frame(b"two")).await.unwrap();
    let second = drain(&mut rx);
    assert_eq!(kinds(&second), FULL_TURN);
    assert_eq!(second[2]["text"], "Hello again.");

    // The user entry of the failed turn was still written.
    let log = harness.history.log("u1");
    let roles: Vec<Role> = log.iter().map(|entry| entry.role).collect();
    assert_eq!(roles, [Role::User, Role::User, Role::Assistant]);
}

#[tokio::test]
async fn unknown_provider_name_is_reported() {
    let harness = Harness::new();
    let (mut session, mut rx) = harness.session();
    session
        .handle_frame(&context_frame(json!({"llmProvider": "mistral"})))
        .await
        .unwrap();
    drain(&mut rx);

    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(
        kinds(&frames),
        ["processing:start", "transcript", "error", "processing:end"]
    );
    assert!(frames[2]["message"].as_str().unwrap().contains("mistral"));
    assert_eq!(harness.tts.call_count(), 0);
}

#[tokio::test]
async fn provider_failure_speaks_the_fallback_reply() {
    let harness = Harness::scripted(
        vec![Step::ok("hello")],
        vec![Step::Fail("HTTP 529".to_string())],
        vec![Step::ok("sorry-audio")],
    );
    let (mut session, mut rx) = harness.session();

    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), FULL_TURN);
    assert_eq!(frames[2]["text"], FALLBACK_REPLY);
    assert_eq!(harness.tts.calls.lock().unwrap()[0].0, FALLBACK_REPLY);
}

#[tokio::test]
async fn synthesis_failure_comes_after_the_response() {
    let harness = Harness::scripted(
        vec![Step::ok("hello")],
        vec![Step::ok("Hi.")],
        vec![Step::Fail("HTTP 401".to_string())],
    );
    let (mut session, mut rx) = harness.session();

    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(
        kinds(&frames),
        ["processing:start", "transcript", "response", "error", "processing:end"]
    );
    assert!(frames[3]["message"]
        .as_str()
        .unwrap()
        .contains("speech synthesis failed"));
}

#[tokio::test]
async fn history_outage_is_swallowed() {
    let harness = Harness::new();
    let (mut session, mut rx) =
        session_with(harness.services_with_history(Arc::new(FailingHistory)));

    session
        .handle_frame(&context_frame(json!({"userId": "u1"})))
        .await
        .unwrap();
    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames)[0], "ready");
    assert_eq!(kinds(&frames[1..]), FULL_TURN);
    assert!(session.history_window().is_empty());
}

#[tokio::test]
async fn audio_before_context_runs_with_defaults() {
    let harness = Harness::new();
    let (mut session, mut rx) = harness.session();

    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    assert_eq!(kinds(&drain(&mut rx)), FULL_TURN);
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(session.context().llm_provider, "claude");
    assert_eq!(harness.tts.calls.lock().unwrap()[0].1.name, "en-US-AriaNeural");
    assert!(!harness.model.last_call().system_prompt.contains("speaking with"));
    assert_eq!(harness.history.writes(), 0);
}

#[tokio::test]
async fn unknown_envelope_types_are_ignored() {
    let harness = Harness::new();
    let (mut session, mut rx) = harness.session();

    session
        .handle_frame(r#"{"type":"ping","nonce":1}"#)
        .await
        .unwrap();

    assert!(drain(&mut rx).is_empty());
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn malformed_frame_gets_an_error_and_the_session_continues() {
    let harness = Harness::new();
    let (mut session, mut rx) = harness.session();

    session.handle_frame("{not json").await.unwrap();
    session.handle_frame(r#"{"data":{}}"#).await.unwrap();
    session
        .handle_frame(&context_frame(json!({"userId": "u1"})))
        .await
        .unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), ["error", "error", "ready"]);
    assert!(frames[0]["message"]
        .as_str()
        .unwrap()
        .starts_with("malformed envelope"));
}

#[tokio::test]
async fn bad_audio_payloads_never_reach_the_recognizer() {
    let harness = Harness::new();
    let (mut session, mut rx) = harness.session();

    session
        .handle_frame(r#"{"type":"audio","data":"@@@"}"#)
        .await
        .unwrap();
    session.handle_frame(r#"{"type":"audio"}"#).await.unwrap();
    session
        .handle_frame(&audio_frame(&vec![0u8; MAX_STT_INPUT_BYTES + 1]))
        .await
        .unwrap();

    let frames = drain(&mut rx);
    let expected: Vec<&str> = ["processing:start", "error", "processing:end"]
        .into_iter()
        .cycle()
        .take(9)
        .collect();
    assert_eq!(kinds(&frames), expected);
    assert!(frames[7]["message"].as_str().unwrap().contains("too large"));
    assert_eq!(harness.stt.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_transcription_times_out() {
    let harness = Harness::scripted(
        vec![Step::Hang],
        vec![Step::ok("unused")],
        vec![Step::ok("unused")],
    );
    let services = harness
        .services()
        .with_stage_timeout(Duration::from_secs(5));
    let (mut session, mut rx) = session_with(services);

    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), ["processing:start", "error", "processing:end"]);
    assert_eq!(frames[1]["message"], "transcription timed out after 5s");
}

#[tokio::test(start_paused = true)]
async fn stalled_completion_falls_back() {
    let harness = Harness::scripted(
        vec![Step::ok("hello")],
        vec![Step::Hang],
        vec![Step::ok("audio")],
    );
    let services = harness
        .services()
        .with_stage_timeout(Duration::from_secs(5));
    let (mut session, mut rx) = session_with(services);

    session.handle_frame(&audio_frame(b"x")).await.unwrap();

    let frames = drain(&mut rx);
    assert_eq!(kinds(&frames), FULL_TURN);
    assert_eq!(frames[2]["text"], FALLBACK_REPLY);
}

#[tokio::test]
async fn closed_transport_ends_the_session() {
    let harness = Harness::new();
    let (mut session, rx) = harness.session();
    drop(rx);

    let result = session
        .handle_frame(&context_frame(json!({"userId": "u1"})))
        .await;
    assert!(matches!(result, Err(SessionError::TransportClosed)));

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.handle_frame(r#"{"type":"ping"}"#).await.is_err());
}
