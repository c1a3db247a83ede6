//! Streaming text-to-speech client (spec §4.4).
//!
//! One WebSocket connection per *speak epoch* (spec §2 "speak-epoch"):
//! the session opens a fresh connection for every turn it speaks, and
//! tears it down on flush/close or on interrupt. Grounded on
//! `original_source/src/voice_ai/providers/tts/deepgram.py`'s
//! `SpeakV1Text`/`SpeakV1Flush`/`SpeakV1Close` message sequence, wired up
//! with the same `connect_async` + split-sink/reader-task shape as
//! [`crate::providers::stt`].

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::TtsConfig;
use crate::providers::ProviderError;

const TTS_ENDPOINT: &str = "wss://api.deepgram.com/v1/speak";

/// Events delivered over the channel returned by [`TtsHandle::events`].
#[derive(Debug, Clone)]
pub enum TtsEvent {
    /// A chunk of linear16 audio at the session's requested sample rate.
    Audio(Vec<u8>),
    /// The provider has flushed everything sent before the last `Flush`.
    Flushed,
    Error(String),
    Closed,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireMessage {
    Flushed,
    Warning { #[serde(default)] description: String },
    #[serde(other)]
    Other,
}

pub struct TtsClient {
    config: TtsConfig,
}

pub struct TtsHandle {
    sender: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        WsMessage,
    >,
    events: mpsc::UnboundedReceiver<TtsEvent>,
    reader_task: tokio::task::JoinHandle<()>,
}

impl TtsClient {
    pub fn new(config: TtsConfig) -> Self {
        Self { config }
    }

    /// Open a new TTS connection for one speak-epoch, requesting audio at
    /// `sample_rate` (the telephony bridge asks for 16kHz linear16, which
    /// it then resamples/encodes to 8kHz mu-law on the way out).
    pub async fn open(&self, sample_rate: u32) -> Result<TtsHandle, ProviderError> {
        let url = format!(
            "{TTS_ENDPOINT}?model={}&encoding=linear16&sample_rate={sample_rate}",
            self.config.model,
        );

        let mut request = url
            .into_client_request()
            .map_err(|e| ProviderError::Fatal(format!("invalid TTS url: {e}")))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Token {}", self.config.api_key)
                .parse()
                .map_err(|e| ProviderError::Fatal(format!("invalid TTS api key header: {e}")))?,
        );

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ProviderError::Fatal(format!("failed to open TTS connection: {e}")))?;

        let (sender, mut receiver) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                let event = match msg {
                    Ok(WsMessage::Binary(bytes)) => TtsEvent::Audio(bytes.to_vec()),
                    Ok(WsMessage::Text(text)) => parse_event(&text),
                    Ok(WsMessage::Close(_)) => {
                        let _ = tx.send(TtsEvent::Closed);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => TtsEvent::Error(e.to_string()),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            let _ = tx.send(TtsEvent::Closed);
        });

        Ok(TtsHandle { sender, events: rx, reader_task })
    }
}

fn parse_event(text: &str) -> TtsEvent {
    match serde_json::from_str::<WireMessage>(text) {
        Ok(WireMessage::Flushed) => TtsEvent::Flushed,
        Ok(WireMessage::Warning { description }) => TtsEvent::Error(description),
        Ok(WireMessage::Other) => TtsEvent::Error(format!("unrecognized TTS frame: {text}")),
        Err(e) => TtsEvent::Error(format!("malformed TTS frame: {e}")),
    }
}

impl TtsHandle {
    /// Send one sentence of text to be synthesized (spec §4.7.3: the
    /// session sentence-buffers LLM deltas before calling this).
    pub async fn send_text(&mut self, text: &str) -> Result<(), ProviderError> {
        let payload = serde_json::json!({ "type": "Speak", "text": text }).to_string();
        self.sender
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| ProviderError::Transient(format!("TTS send failed: {e}")))
    }

    /// Ask the provider to emit audio for everything sent so far without
    /// closing the connection (used between sentences within a turn).
    pub async fn send_flush(&mut self) -> Result<(), ProviderError> {
        let payload = serde_json::json!({ "type": "Flush" }).to_string();
        self.sender
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| ProviderError::Transient(format!("TTS flush failed: {e}")))
    }

    pub async fn recv_event(&mut self) -> Option<TtsEvent> {
        self.events.recv().await
    }

    /// Send the close sentinel and drain every remaining event — forwarding
    /// audio chunks to `on_audio` as they arrive — until the provider
    /// confirms the connection closed. Spec §4.7.3 step 7: "await the TTS
    /// reader task so that all drained audio is delivered before the turn
    /// completes."
    pub async fn close_after_drain<F: FnMut(Vec<u8>)>(mut self, mut on_audio: F) -> Result<(), ProviderError> {
        let payload = serde_json::json!({ "type": "Close" }).to_string();
        let _ = self.sender.send(WsMessage::Text(payload.into())).await;
        let _ = self.sender.close().await;

        while let Some(event) = self.events.recv().await {
            match event {
                TtsEvent::Audio(bytes) => on_audio(bytes),
                TtsEvent::Closed => break,
                TtsEvent::Flushed | TtsEvent::Error(_) => {}
            }
        }
        let _ = self.reader_task.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flushed_event() {
        assert!(matches!(parse_event(r#"{"type":"Flushed"}"#), TtsEvent::Flushed));
    }

    #[test]
    fn parses_warning_as_error_event() {
        match parse_event(r#"{"type":"Warning","description":"rate limited"}"#) {
            TtsEvent::Error(msg) => assert_eq!(msg, "rate limited"),
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_frame_becomes_error_event_not_panic() {
        assert!(matches!(parse_event("{}"), TtsEvent::Error(_)));
    }
}
