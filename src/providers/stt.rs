//! Streaming speech-to-text client (spec §4.2).
//!
//! Opens one WebSocket connection per call to the STT upstream's v2
//! listen endpoint and delivers typed turn events over a channel. The
//! spec's design notes (§9 "Callbacks vs channels") explicitly prefer the
//! channel formulation over registered callbacks because it "makes the
//! state machine literal" — this follows that guidance, using the
//! `connect_async` + split-sink/reader-task pattern the teacher already
//! uses for its Slack Socket Mode client (`messaging/slack.rs`).
//!
//! Grounded on `original_source/src/voice_ai/providers/stt/deepgram.py`
//! and the inline `VoiceSession.__aenter__` STT wiring in
//! `original_source/src/voice_ai/services/voice_session.py`.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::SttConfig;
use crate::providers::ProviderError;

const STT_ENDPOINT: &str = "wss://api.deepgram.com/v2/listen";

/// Events delivered over the channel returned by [`SttHandle::events`].
/// Mirrors the provider's `TurnInfo` event taxonomy (spec §4.2).
#[derive(Debug, Clone)]
pub enum SttEvent {
    Connected,
    StartOfTurn,
    Update(String),
    EndOfTurn(String),
    Error(String),
    Closed,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireMessage {
    TurnInfo { event: String, #[serde(default)] transcript: String },
    Connected,
    #[serde(other)]
    Other,
}

/// STT client: one instance can open connections for many calls.
pub struct SttClient {
    config: SttConfig,
}

/// A single call's open STT connection: the outbound sink for audio
/// frames plus the inbound event channel.
pub struct SttHandle {
    sender: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        WsMessage,
    >,
    events: mpsc::UnboundedReceiver<SttEvent>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl SttClient {
    pub fn new(config: SttConfig) -> Self {
        Self { config }
    }

    /// Open a persistent STT connection for one call. Stays open for the
    /// entire call (spec §3 invariant: STT stream count == 1 from
    /// just-after-open to just-before-close).
    pub async fn open(&self) -> Result<SttHandle, ProviderError> {
        let url = format!(
            "{STT_ENDPOINT}?model={}&encoding=linear16&sample_rate=16000&eot_threshold={}&eot_timeout_ms={}",
            self.config.model, self.config.eot_threshold, self.config.eot_timeout_ms,
        );

        let mut request = url
            .into_client_request()
            .map_err(|e| ProviderError::Fatal(format!("invalid STT url: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.config.api_key)
                .parse()
                .map_err(|e| ProviderError::Fatal(format!("invalid STT api key header: {e}")))?,
        );

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ProviderError::Fatal(format!("failed to open STT connection: {e}")))?;

        let (sender, mut receiver) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                let event = match msg {
                    Ok(WsMessage::Text(text)) => parse_event(&text),
                    Ok(WsMessage::Binary(_)) => continue, // STT upstream sends text frames only
                    Ok(WsMessage::Close(_)) => {
                        let _ = tx.send(SttEvent::Closed);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => SttEvent::Error(e.to_string()),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            let _ = tx.send(SttEvent::Closed);
        });

        Ok(SttHandle { sender, events: rx, reader_task })
    }
}

fn parse_event(text: &str) -> SttEvent {
    match serde_json::from_str::<WireMessage>(text) {
        Ok(WireMessage::Connected) => SttEvent::Connected,
        Ok(WireMessage::TurnInfo { event, transcript }) => match event.as_str() {
            "StartOfTurn" => SttEvent::StartOfTurn,
            "Update" => SttEvent::Update(transcript),
            "EndOfTurn" => SttEvent::EndOfTurn(transcript),
            other => SttEvent::Error(format!("unrecognized TurnInfo event: {other}")),
        },
        Ok(WireMessage::Other) => SttEvent::Error(format!("unrecognized STT frame: {text}")),
        Err(e) => SttEvent::Error(format!("malformed STT frame: {e}")),
    }
}

impl SttHandle {
    /// Push a PCM linear16 16kHz frame to the STT upstream. Non-blocking
    /// in intent: the bounded work here is a single WebSocket send.
    pub async fn send_media(&mut self, pcm_frame: &[u8]) -> Result<(), ProviderError> {
        self.sender
            .send(WsMessage::Binary(pcm_frame.to_vec().into()))
            .await
            .map_err(|e| ProviderError::Transient(format!("STT send failed: {e}")))
    }

    /// Receive the next turn event, or `None` once the reader task has
    /// exited (connection closed).
    pub async fn recv_event(&mut self) -> Option<SttEvent> {
        self.events.recv().await
    }

    /// Send the provider's end-of-stream sentinel and await the reader
    /// task so every in-flight event has been drained first.
    pub async fn close(mut self) -> Result<(), ProviderError> {
        let close_msg = serde_json::json!({ "type": "CloseStream" }).to_string();
        let _ = self.sender.send(WsMessage::Text(close_msg.into())).await;
        let _ = self.sender.close().await;
        let _ = self.reader_task.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_turn_info_events() {
        assert!(matches!(
            parse_event(r#"{"type":"TurnInfo","event":"StartOfTurn"}"#),
            SttEvent::StartOfTurn
        ));
        match parse_event(r#"{"type":"TurnInfo","event":"Update","transcript":"actually"}"#) {
            SttEvent::Update(t) => assert_eq!(t, "actually"),
            other => panic!("expected Update, got {other:?}"),
        }
        match parse_event(r#"{"type":"TurnInfo","event":"EndOfTurn","transcript":"hello there"}"#) {
            SttEvent::EndOfTurn(t) => assert_eq!(t, "hello there"),
            other => panic!("expected EndOfTurn, got {other:?}"),
        }
    }

    #[test]
    fn parses_connected_event() {
        assert!(matches!(parse_event(r#"{"type":"Connected"}"#), SttEvent::Connected));
    }

    #[test]
    fn malformed_frame_becomes_error_event_not_panic() {
        assert!(matches!(parse_event("not json"), SttEvent::Error(_)));
    }
}
