//! Telephony bridge (spec §4.6): terminates the provider's Media Streams
//! WebSocket, translates its JSON/base64 envelope to/from the session's
//! PCM16 world, and answers the call-webhook with TwiML pointing back at
//! that WebSocket.
//!
//! Grounded on `original_source/src/voice_ai/api/routes/voice_ws.py`'s
//! `incoming_call`/`twilio_websocket`/`TwilioVoiceSession` for the wire
//! format, wired up as an axum handler the way the teacher's
//! `server/mod.rs` wires its own websocket routes.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::SinkExt;
use serde::Deserialize;

use crate::audio::codec::decode_mulaw_to_pcm16_with;
use crate::audio::resample::Resampler;
use crate::session::{self, OutboundEvent, SessionDeps};

/// Inbound Media Streams envelope (spec §4.6 message grammar).
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum InboundMessage {
    #[serde(rename = "start")]
    Start { #[serde(rename = "streamSid")] stream_sid: String },
    #[serde(rename = "media")]
    Media { media: MediaPayload },
    #[serde(rename = "stop")]
    Stop {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

/// HTTP GET/POST webhook: responds with TwiML instructing the provider
/// to open a Media Streams WebSocket back at this process (spec §6).
pub async fn incoming_call(State(deps): State<TelephonyState>, headers: HeaderMap) -> Response {
    let host = headers.get("host").and_then(|h| h.to_str().ok()).unwrap_or("localhost");
    let forwarded_proto = headers.get("x-forwarded-proto").and_then(|h| h.to_str().ok()).unwrap_or("");
    let is_tls = forwarded_proto.eq_ignore_ascii_case("https") || host.contains("ngrok");
    let scheme = if is_tls { "wss" } else { "ws" };

    let twiml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Response><Connect><Stream url=\"{scheme}://{host}{}\"/></Connect></Response>",
        deps.stream_path,
    );

    ([(axum::http::header::CONTENT_TYPE, "application/xml")], twiml).into_response()
}

/// Shared state handed to the telephony routes (spec §5: "Provider client
/// instances may be shared across sessions").
#[derive(Clone)]
pub struct TelephonyState {
    pub deps: SessionDeps,
    pub stream_path: String,
}

pub async fn stream_upgrade(State(state): State<TelephonyState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_call(socket, state.deps))
}

/// Bridge one call's lifetime: wait for `start`, spawn the session, then
/// shuttle `media`/`stop` in and audio/`clear` out until the socket closes.
async fn run_call(mut socket: WebSocket, deps: SessionDeps) {
    let stream_sid = match wait_for_start(&mut socket).await {
        Some(sid) => sid,
        None => {
            tracing::warn!("telephony socket closed before a start envelope arrived");
            return;
        }
    };
    let call_id = uuid::Uuid::new_v4();
    let connected_at = chrono::Utc::now();
    tracing::info!(%call_id, stream_sid, %connected_at, "call connected");

    let (mut handles, session_task) = match session::spawn(deps).await {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(%call_id, error = %e, "failed to open session (fatal init failure)");
            let _ = socket.close().await;
            return;
        }
    };

    // 160 samples (20ms @ 8kHz) is the typical Media Streams frame size;
    // held for the whole call so the 8kHz->16kHz filter state carries
    // across frames instead of clicking at every chunk boundary.
    let mut inbound_resampler = Resampler::new(8_000, 16_000, 160);

    loop {
        tokio::select! {
            biased;

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_inbound_frame(&text, &handles.inbound_audio, &mut inbound_resampler) {
                            let _ = handles.stop.send(());
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = handles.stop.send(());
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "telephony transport failure");
                        let _ = handles.stop.send(());
                        break;
                    }
                }
            }

            outbound = handles.outbound.recv() => {
                match outbound {
                    Some(OutboundEvent::Audio(frame)) => {
                        let payload = BASE64.encode(&frame.data);
                        let message = serde_json::json!({
                            "event": "media",
                            "streamSid": stream_sid,
                            "media": { "payload": payload },
                        });
                        if socket.send(Message::Text(message.to_string().into())).await.is_err() {
                            let _ = handles.stop.send(());
                            break;
                        }
                    }
                    Some(OutboundEvent::Clear) => {
                        let message = serde_json::json!({ "event": "clear", "streamSid": stream_sid });
                        if socket.send(Message::Text(message.to_string().into())).await.is_err() {
                            let _ = handles.stop.send(());
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = socket.close().await;
    let _ = session_task.await;
}

/// Wait for the first envelope, requiring it to be `start` (spec §4.7.1
/// step 1: "Reject the session on any other first message.").
async fn wait_for_start(socket: &mut WebSocket) -> Option<String> {
    loop {
        match socket.recv().await? {
            Ok(Message::Text(text)) => match serde_json::from_str::<InboundMessage>(&text).ok()? {
                InboundMessage::Start { stream_sid } => return Some(stream_sid),
                _ => return None,
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            _ => return None,
        }
    }
}

/// Decode and forward one `media` frame; returns `false` once `stop` has
/// been observed (caller should tear down).
fn handle_inbound_frame(
    text: &str,
    inbound_audio: &tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    resampler: &mut Resampler,
) -> bool {
    let Ok(message) = serde_json::from_str::<InboundMessage>(text) else {
        tracing::debug!("dropping malformed telephony frame");
        return true;
    };
    match message {
        InboundMessage::Media { media } => {
            let Ok(mulaw) = BASE64.decode(media.payload) else {
                tracing::debug!("dropping media frame with invalid base64 payload");
                return true;
            };
            let pcm = decode_mulaw_to_pcm16_with(resampler, &mulaw);
            let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
            let _ = inbound_audio.send(bytes);
            true
        }
        InboundMessage::Stop {} => false,
        InboundMessage::Start { .. } | InboundMessage::Other => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_media_stop_envelopes() {
        let start: InboundMessage = serde_json::from_str(r#"{"event":"start","streamSid":"SD123"}"#).unwrap();
        assert!(matches!(start, InboundMessage::Start { stream_sid } if stream_sid == "SD123"));

        let media: InboundMessage = serde_json::from_str(r#"{"event":"media","media":{"payload":"//8="}}"#).unwrap();
        assert!(matches!(media, InboundMessage::Media { .. }));

        let stop: InboundMessage = serde_json::from_str(r#"{"event":"stop"}"#).unwrap();
        assert!(matches!(stop, InboundMessage::Stop {}));
    }

    #[tokio::test]
    async fn malformed_media_payload_is_dropped_not_fatal() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut resampler = Resampler::new(8_000, 16_000, 160);
        let kept_going =
            handle_inbound_frame(r#"{"event":"media","media":{"payload":"not-base64!!"}}"#, &tx, &mut resampler);
        assert!(kept_going);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn valid_media_frame_forwards_decoded_pcm() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut resampler = Resampler::new(8_000, 16_000, 3);
        let payload = BASE64.encode([0xFFu8, 0xFF, 0xFF]);
        let text = serde_json::json!({"event": "media", "media": {"payload": payload}}).to_string();
        let kept_going = handle_inbound_frame(&text, &tx, &mut resampler);
        assert!(kept_going);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn stop_envelope_signals_teardown() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut resampler = Resampler::new(8_000, 16_000, 160);
        assert!(!handle_inbound_frame(r#"{"event":"stop"}"#, &tx, &mut resampler));
    }
}
