//! Streaming LLM client (spec §4.3), talking to an OpenAI-Responses-style
//! API: conversations are server-side objects (`create_conversation`)
//! and a turn is driven by one `stream_complete` SSE request per turn.
//!
//! Grounded on `original_source/src/voice_ai/providers/llm/openai.py`'s
//! `create_conversation()`/`stream_complete()` for the wire shape, on
//! `original_source/src/voice_ai/services/reservation_agent.py`'s
//! `ReservationAgent.process()` for the function-call continuation
//! shape (antecedent `function_call` items plus `function_call_output`
//! items, sent as a structured `input` array rather than a string), and
//! on the teacher's `agent/llm.rs` for the tool-definition/tool-call
//! types and `agent/tool_loop.rs` for how a tool call flows back out of
//! the client. The teacher parses SSE by hand off
//! `response.bytes_stream()`; this uses `reqwest-eventsource` instead,
//! which the teacher's `Cargo.toml` already carries.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::config::LlmConfig;
use crate::providers::ProviderError;
use crate::types::ToolCall;

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const CONVERSATIONS_URL: &str = "https://api.openai.com/v1/conversations";

/// A tool made available to the model for one turn, mirroring the
/// teacher's `ToolDefinition`/`FunctionDefinition` but flattened to the
/// Responses API's top-level tool shape.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub r#type: &'static str,
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolSpec {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self { r#type: "function", name: name.into(), description: description.into(), parameters }
    }
}

/// Events surfaced while streaming one turn's completion.
#[derive(Debug, Clone)]
pub enum LlmEvent {
    TextDelta(String),
    ToolCall(ToolCall),
    Done,
    Error(String),
}

pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Deserialize)]
struct ConversationResponse {
    id: String,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    conversation: &'a str,
    input: serde_json::Value,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    /// Create a server-side conversation object, returning its id. Called
    /// once per call on the first turn (spec §4.7.3).
    pub async fn create_conversation(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(CONVERSATIONS_URL)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("create_conversation request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::Transient(format!("create_conversation returned {status}")));
        }

        let parsed: ConversationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("malformed conversation response: {e}")))?;
        Ok(parsed.id)
    }

    /// Stream one turn's completion. `input` is either a plain string (a
    /// fresh user utterance) or a structured array of items — the
    /// antecedent `function_call` items plus their `function_call_output`
    /// results — when continuing after a tool call (spec §4.3/§4.7.3).
    /// Returns a channel of [`LlmEvent`]s; the caller sentence-buffers
    /// [`LlmEvent::TextDelta`] values before forwarding them to TTS.
    pub fn stream_complete(
        &self,
        input: serde_json::Value,
        conversation_id: &str,
        tools: Vec<ToolSpec>,
    ) -> mpsc::UnboundedReceiver<LlmEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        let body = ResponsesRequest {
            model: &self.config.model,
            conversation: conversation_id,
            input,
            stream: true,
            temperature: self.config.temperature,
            tools,
        };
        let request = self
            .client
            .post(RESPONSES_URL)
            .bearer_auth(&self.config.api_key)
            .json(&body);

        tokio::spawn(async move {
            let mut es = match EventSource::new(request) {
                Ok(es) => es,
                Err(e) => {
                    let _ = tx.send(LlmEvent::Error(format!("cannot open LLM stream: {e}")));
                    return;
                }
            };

            // call_id -> (name, accumulated JSON-argument fragments)
            let mut pending_calls: HashMap<String, (String, String)> = HashMap::new();

            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {}
                    Ok(Event::Message(message)) => {
                        if message.data == "[DONE]" {
                            break;
                        }
                        if let Some(stop) = handle_frame(&message.data, &mut pending_calls, &tx) {
                            if stop {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(LlmEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            es.close();
            let _ = tx.send(LlmEvent::Done);
        });

        rx
    }
}

/// Parse one SSE frame's JSON payload and forward the events it implies.
/// Returns `Some(true)` if the caller should stop reading (terminal
/// event already sent), `Some(false)`/`None` otherwise.
fn handle_frame(
    data: &str,
    pending_calls: &mut HashMap<String, (String, String)>,
    tx: &mpsc::UnboundedSender<LlmEvent>,
) -> Option<bool> {
    let frame: serde_json::Value = serde_json::from_str(data).ok()?;
    let frame_type = frame.get("type")?.as_str()?;

    match frame_type {
        "response.output_text.delta" => {
            let delta = frame.get("delta")?.as_str()?.to_string();
            let _ = tx.send(LlmEvent::TextDelta(delta));
        }
        // The reference implementation explicitly ignores refusal deltas
        // and mid-stream error frames rather than surfacing them as text.
        "response.refusal.delta" => {}
        "response.output_item.added" => {
            let item = frame.get("item")?;
            if item.get("type")?.as_str()? == "function_call" {
                let call_id = item.get("call_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let name = item.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                pending_calls.insert(call_id, (name, String::new()));
            }
        }
        "response.function_call_arguments.delta" => {
            let call_id = frame.get("item_id")?.as_str()?.to_string();
            let delta = frame.get("delta")?.as_str()?.to_string();
            if let Some((_, args)) = pending_calls.get_mut(&call_id) {
                args.push_str(&delta);
            }
        }
        "response.output_item.done" => {
            let item = frame.get("item")?;
            if item.get("type")?.as_str()? == "function_call" {
                let call_id = item.get("call_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                if let Some((name, args)) = pending_calls.remove(&call_id) {
                    let arguments = serde_json::from_str(&args).unwrap_or(serde_json::Value::Null);
                    let _ = tx.send(LlmEvent::ToolCall(ToolCall { call_id, name, arguments }));
                }
            }
        }
        "response.completed" | "response.done" => {
            return Some(true);
        }
        "response.error" | "error" => {
            let message = frame
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown LLM error")
                .to_string();
            let _ = tx.send(LlmEvent::Error(message));
        }
        _ => {}
    }
    Some(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_frame_emits_text_delta_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = HashMap::new();
        handle_frame(r#"{"type":"response.output_text.delta","delta":"hello"}"#, &mut pending, &tx);
        match rx.try_recv().unwrap() {
            LlmEvent::TextDelta(s) => assert_eq!(s, "hello"),
            other => panic!("expected TextDelta, got {other:?}"),
        }
    }

    #[test]
    fn function_call_lifecycle_emits_tool_call_on_done() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = HashMap::new();
        handle_frame(
            r#"{"type":"response.output_item.added","item":{"type":"function_call","call_id":"c1","name":"query_room_inventory"}}"#,
            &mut pending,
            &tx,
        );
        handle_frame(
            r#"{"type":"response.function_call_arguments.delta","item_id":"c1","delta":"{\"room_type\""}"#,
            &mut pending,
            &tx,
        );
        handle_frame(
            r#"{"type":"response.function_call_arguments.delta","item_id":"c1","delta":":\"suite\"}"}"#,
            &mut pending,
            &tx,
        );
        handle_frame(
            r#"{"type":"response.output_item.done","item":{"type":"function_call","call_id":"c1"}}"#,
            &mut pending,
            &tx,
        );
        match rx.try_recv().unwrap() {
            LlmEvent::ToolCall(call) => {
                assert_eq!(call.call_id, "c1");
                assert_eq!(call.name, "query_room_inventory");
                assert_eq!(call.arguments["room_type"], "suite");
            }
            other => panic!("expected ToolCall, got {other:?}"),
        }
        assert!(pending.is_empty());
    }

    #[test]
    fn refusal_delta_is_silently_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pending = HashMap::new();
        handle_frame(r#"{"type":"response.refusal.delta","delta":"no"}"#, &mut pending, &tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn completed_frame_signals_stop() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut pending = HashMap::new();
        assert_eq!(handle_frame(r#"{"type":"response.completed"}"#, &mut pending, &tx), Some(true));
    }
}
