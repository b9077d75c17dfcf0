//! Voice endpoints: the `/voice/stream` WebSocket and the synthesis test hook.

use crate::registry::ConnectionHandle;
use crate::session::VoiceSession;
use crate::AppState;
use aria_types::{encode_audio, VoicePreferences, DEFAULT_VOICE_NAME};
use aria_voice::OUTPUT_FORMAT;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Extension, Json, Query, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Largest accepted WebSocket frame. Base64 inflates 10 MiB of audio to
/// roughly 13.4 MiB, plus the envelope itself.
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Outbound frames buffered per connection before the session waits on the
/// writer.
const OUTBOUND_BUFFER: usize = 64;

/// Inbound frames read ahead while a turn is running. A client that gets
/// further ahead than this is disconnected.
const INBOUND_BUFFER: usize = 16;

/// Handler for `GET /voice/stream`.
pub async fn voice_stream_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs one voice connection to completion.
///
/// Three tasks cooperate: a reader forwarding text frames, a writer draining
/// the outbound queue, and this task driving the session. Whichever side
/// notices the transport going away cancels the shared token, which also
/// abandons any turn still in flight.
///
/// The reader keeps polling the socket while it waits for queue space, so a
/// close is noticed even when the session is stuck in a long turn.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(INBOUND_BUFFER);

    state
        .registry
        .register(connection_id, ConnectionHandle::new(cancel.clone()))
        .await;
    tracing::info!(%connection_id, "voice connection opened");

    let writer_cancel = cancel.clone();
    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
        writer_cancel.cancel();
    });

    let reader_cancel = cancel.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(frame) = next_text(&mut stream).await {
            let permit = tokio::select! {
                biased;
                permit = inbound_tx.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                next = next_text(&mut stream) => {
                    if next.is_some() {
                        tracing::warn!(%connection_id, "client outran the session, closing");
                    }
                    break;
                }
            };
            permit.send(frame);
        }
        reader_cancel.cancel();
    });

    let mut session = VoiceSession::new(connection_id, Arc::clone(&state.services), outbound_tx);
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = inbound_rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = session.handle_frame(&frame) => result,
        };
        if let Err(e) = result {
            tracing::debug!(%connection_id, error = %e, "session ended");
            break;
        }
    }

    session.close();
    cancel.cancel();
    state.registry.deregister(connection_id).await;
    recv_task.abort();
    send_task.abort();
    tracing::info!(%connection_id, "voice connection closed");
}

/// Reads until the next text frame. `None` means the transport is closed or
/// broken.
async fn next_text(stream: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => return Some(text.to_string()),
            Message::Close(_) => return None,
            // Binary frames carry nothing in this protocol; pings are
            // answered by axum.
            _ => {}
        }
    }
    None
}

/// Request for `POST /voice/test-tts`, sent as a JSON body.
#[derive(Debug, Deserialize)]
pub struct TestTtsRequest {
    pub text: String,
    #[serde(default)]
    pub voice_name: Option<String>,
}

/// The same request carried in the query string (`?text=...&voice_name=...`).
#[derive(Debug, Default, Deserialize)]
pub struct TestTtsQuery {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub voice_name: Option<String>,
}

impl TestTtsRequest {
    /// A non-empty body wins; otherwise the query string must carry `text`.
    fn resolve(query: TestTtsQuery, body: &[u8]) -> Result<Self, String> {
        if !body.trim_ascii().is_empty() {
            return serde_json::from_slice(body).map_err(|e| format!("invalid request body: {e}"));
        }
        match query.text {
            Some(text) => Ok(Self {
                text,
                voice_name: query.voice_name,
            }),
            None => Err("missing `text` in body or query string".to_string()),
        }
    }
}

/// Response body for `POST /voice/test-tts`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TestTtsResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn test_tts_failure(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(TestTtsResponse {
            success: false,
            audio: None,
            format: None,
            error: Some(error),
        }),
    )
        .into_response()
}

/// Handler for `POST /voice/test-tts`.
///
/// Synthesizes `text` with neutral prosody, outside of any session. The
/// request may come as a JSON body or as query parameters.
pub async fn test_tts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<TestTtsQuery>,
    body: Bytes,
) -> Response {
    let request = match TestTtsRequest::resolve(query, &body) {
        Ok(request) => request,
        Err(error) => return test_tts_failure(StatusCode::UNPROCESSABLE_ENTITY, error),
    };

    let voice = VoicePreferences::with_voice(
        request
            .voice_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VOICE_NAME.to_string()),
    );

    let services = &state.services;
    let outcome = tokio::time::timeout(
        services.stage_timeout,
        services.tts.synthesize(&request.text, &voice),
    )
    .await;

    let error = match outcome {
        Ok(Ok(audio)) => {
            return Json(TestTtsResponse {
                success: true,
                audio: Some(encode_audio(&audio)),
                format: Some(OUTPUT_FORMAT.to_string()),
                error: None,
            })
            .into_response();
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!(
            "synthesis timed out after {}s",
            services.stage_timeout.as_secs()
        ),
    };

    tracing::warn!(voice = %voice.name, %error, "test synthesis failed");
    test_tts_failure(StatusCode::INTERNAL_SERVER_ERROR, error)
}
