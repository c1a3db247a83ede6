//! Turn execution (spec §4.7.3): the body of a single turn task, spawned
//! fresh for each `EndOfTurn` and cancelled wholesale on interrupt or a
//! newly arriving `EndOfTurn`.
//!
//! Grounded on `VoiceSession.process_llm_and_tts`/`_run_turn` in
//! `original_source/src/voice_ai/services/voice_session.py` for the
//! sentence-buffering/markdown-stripping/flush sequence, and on the
//! teacher's `agent/tool_loop.rs` ReAct loop for the tool-call-then-continue
//! shape (generalized here to the Responses API's conversation-based
//! continuation instead of an in-memory message list).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use regex::Regex;
use std::sync::OnceLock;

use crate::audio::codec::encode_pcm16_to_mulaw_with;
use crate::providers::llm::{LlmEvent, ToolSpec};
use crate::providers::tts::{TtsEvent, TtsHandle};
use crate::types::SessionState;

use super::{OutboundEvent, TurnContext};

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\s+|\n\n+").expect("valid sentence-boundary regex"))
}

fn bold_markdown() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid bold-markdown regex"))
}

fn italic_markdown() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*(.+?)\*").expect("valid italic-markdown regex"))
}

/// Strip lightweight markdown emphasis so the TTS voice doesn't read
/// asterisks aloud (spec §4.7.3 step 5).
fn strip_markdown(text: &str) -> String {
    let text = bold_markdown().replace_all(text, "$1");
    italic_markdown().replace_all(&text, "$1").into_owned()
}

/// Run exactly one turn to completion (spec §4.7.3). Cancellation-safe by
/// construction: the owning session aborts this task's `JoinHandle`
/// directly and awaits it, so there is no explicit cancellation signal
/// to check here — dropping mid-`.await` is this task's "finally".
pub(crate) async fn run_turn(ctx: Arc<TurnContext>, user_text: String) {
    let conversation_id = match ensure_conversation(&ctx).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "failed to create LLM conversation, aborting turn");
            ctx.state.set(SessionState::Listening);
            return;
        }
    };

    ctx.state.set(SessionState::Processing);
    let my_epoch = ctx.epoch.fetch_add(1, Ordering::SeqCst) + 1;
    ctx.state.set(SessionState::Speaking);

    let mut tts = match ctx.tts.open(16_000).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "failed to open TTS stream, aborting turn");
            ctx.state.set(SessionState::Listening);
            return;
        }
    };

    let tool_specs: Vec<ToolSpec> = ctx
        .tools
        .specs()
        .iter()
        .map(|meta| ToolSpec::function(meta.name.clone(), meta.description.clone(), meta.parameters.clone()))
        .collect();

    drive_conversation(&ctx, &conversation_id, user_text, &mut tts, my_epoch, tool_specs).await;

    let _ = tts
        .close_after_drain(|pcm16_bytes| forward_if_current(&ctx, &pcm16_bytes, my_epoch))
        .await;

    ctx.state.set(SessionState::Listening);
}

async fn ensure_conversation(ctx: &TurnContext) -> Result<String, crate::providers::ProviderError> {
    let existing = ctx.conversation_id.lock().expect("conversation id mutex poisoned").clone();
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = ctx.llm.create_conversation().await?;
    *ctx.conversation_id.lock().expect("conversation id mutex poisoned") = Some(id.clone());
    Ok(id)
}

/// Drive the LLM/tool-call ReAct loop for this turn, sentence-buffering
/// text into TTS and forwarding audio as it streams back, until a plain
/// (tool-call-free) completion is produced.
async fn drive_conversation(
    ctx: &TurnContext,
    conversation_id: &str,
    first_input: String,
    tts: &mut TtsHandle,
    my_epoch: u64,
    tool_specs: Vec<ToolSpec>,
) {
    let mut input = serde_json::Value::String(first_input);

    loop {
        let mut llm_rx = ctx.llm.stream_complete(input.clone(), conversation_id, tool_specs.clone());
        let mut sentence_buf = String::new();
        let mut tool_calls = Vec::new();

        loop {
            tokio::select! {
                biased;

                llm_event = llm_rx.recv() => {
                    match llm_event {
                        Some(LlmEvent::TextDelta(delta)) => {
                            sentence_buf.push_str(&delta);
                            flush_complete_sentences(&mut sentence_buf, tts).await;
                        }
                        Some(LlmEvent::ToolCall(call)) => tool_calls.push(call),
                        Some(LlmEvent::Error(message)) => {
                            tracing::warn!(error = %message, "LLM provider error mid-turn");
                        }
                        Some(LlmEvent::Done) | None => break,
                    }
                }

                tts_event = tts.recv_event() => {
                    match tts_event {
                        Some(TtsEvent::Audio(bytes)) => forward_if_current(ctx, &bytes, my_epoch),
                        Some(TtsEvent::Error(message)) => tracing::warn!(error = %message, "TTS provider error mid-turn"),
                        Some(TtsEvent::Flushed) | None => {}
                        Some(TtsEvent::Closed) => {
                            tracing::warn!("TTS closed unexpectedly mid-turn");
                        }
                    }
                }
            }
        }

        let tail = strip_markdown(sentence_buf.trim());
        if !tail.is_empty() {
            let _ = tts.send_text(&tail).await;
        }
        let _ = tts.send_flush().await;

        if tool_calls.is_empty() {
            break;
        }

        // Build the continuation the way `ReservationAgent.process()` does:
        // each antecedent `function_call` item immediately followed by its
        // `function_call_output`, so the model sees both halves of the
        // round trip it made.
        let mut items = Vec::with_capacity(tool_calls.len() * 2);
        for call in tool_calls {
            items.push(serde_json::json!({
                "type": "function_call",
                "call_id": call.call_id,
                "name": call.name,
                "arguments": call.arguments.to_string(),
            }));
            let result = ctx.tools.invoke(call).await;
            items.push(serde_json::json!({
                "type": "function_call_output",
                "call_id": result.call_id,
                "output": result.output.to_string(),
            }));
        }
        input = serde_json::Value::Array(items);
    }
}

/// Send every sentence-terminated prefix of `buf` to TTS, leaving any
/// trailing partial sentence in place for the next delta.
async fn flush_complete_sentences(buf: &mut String, tts: &mut TtsHandle) {
    while let Some(m) = sentence_boundary().find(buf) {
        let end = m.end();
        let sentence: String = buf.drain(..end).collect();
        let sentence = strip_markdown(sentence.trim());
        if !sentence.is_empty() {
            let _ = tts.send_text(&sentence).await;
            let _ = tts.send_flush().await;
        }
    }
}

/// Drop the frame unless the epoch that produced it is still live (spec
/// §4.7.3 step 4): the core defense against stale audio surviving an
/// interrupt.
fn forward_if_current(ctx: &TurnContext, pcm16_bytes: &[u8], my_epoch: u64) {
    if ctx.epoch.load(Ordering::SeqCst) != my_epoch {
        return;
    }
    let pcm: Vec<i16> = pcm16_bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
    let mulaw = {
        let mut resampler = ctx.outbound_resampler.lock().expect("outbound resampler mutex poisoned");
        encode_pcm16_to_mulaw_with(&mut resampler, &pcm)
    };
    let frame = super::mulaw_frame(mulaw, my_epoch);
    let _ = ctx.outbound.send(OutboundEvent::Audio(frame));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::resample::Resampler;
    use proptest::prop_assert_eq;

    #[test]
    fn strip_markdown_removes_bold_and_italic() {
        assert_eq!(strip_markdown("this is **bold** and *italic*"), "this is bold and italic");
    }

    #[test]
    fn strip_markdown_leaves_plain_text_untouched() {
        assert_eq!(strip_markdown("nothing special here"), "nothing special here");
    }

    #[tokio::test]
    async fn flush_complete_sentences_drains_each_terminated_sentence() {
        // This exercises the regex/drain logic directly since a real
        // `TtsHandle` needs a live WebSocket; the `tts.send_text` calls
        // inside `flush_complete_sentences` are exercised end-to-end by
        // the session integration tests instead.
        let mut buf = String::from("Hello there. How can I help");
        let first_boundary = sentence_boundary().find(&buf).unwrap();
        assert_eq!(&buf[..first_boundary.end()], "Hello there. ");
        buf.drain(..first_boundary.end());
        assert_eq!(buf, "How can I help");
    }

    fn test_ctx(epoch: u64) -> TurnContext {
        use crate::config::{LlmConfig, TtsConfig};
        use crate::providers::llm::LlmClient;
        use crate::providers::tts::TtsClient;
        use crate::tools::ToolRegistry;
        use std::sync::atomic::AtomicU64;
        use std::sync::Mutex;
        use tokio::sync::mpsc;

        let (outbound, _rx) = mpsc::unbounded_channel();
        TurnContext {
            llm: Arc::new(LlmClient::new(LlmConfig { api_key: "k".into(), model: "m".into(), temperature: 0.0 })),
            tts: Arc::new(TtsClient::new(TtsConfig { api_key: "k".into(), model: "m".into() })),
            tools: Arc::new(ToolRegistry::new()),
            state: Arc::new(super::super::SharedState::new_for_test(SessionState::Speaking)),
            epoch: Arc::new(AtomicU64::new(epoch)),
            conversation_id: Arc::new(Mutex::new(None)),
            outbound,
            outbound_resampler: Mutex::new(Resampler::new(16_000, 8_000, 320)),
        }
    }

    #[test]
    fn forward_if_current_drops_frames_from_a_stale_epoch() {
        let ctx = test_ctx(5);
        // my_epoch == 5 matches the live epoch: forwarded.
        forward_if_current(&ctx, &[0, 0], 5);
        // my_epoch == 3 is stale (session has moved on to epoch 5): dropped.
        forward_if_current(&ctx, &[0, 0], 3);

        drop(ctx.outbound);
    }

    proptest::proptest! {
        #[test]
        fn no_stale_audio_property_holds_across_arbitrary_epoch_sequences(live in 0u64..64, my_epoch in 0u64..64) {
            // Property from spec §8: a frame stamped with epoch `e` is only
            // ever forwarded while the session's live epoch is still `e`.
            use std::sync::Mutex;
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let ctx = TurnContext {
                llm: Arc::new(crate::providers::llm::LlmClient::new(crate::config::LlmConfig {
                    api_key: "k".into(),
                    model: "m".into(),
                    temperature: 0.0,
                })),
                tts: Arc::new(crate::providers::tts::TtsClient::new(crate::config::TtsConfig { api_key: "k".into(), model: "m".into() })),
                tools: Arc::new(crate::tools::ToolRegistry::new()),
                state: Arc::new(super::super::SharedState::new_for_test(SessionState::Speaking)),
                epoch: Arc::new(std::sync::atomic::AtomicU64::new(live)),
                conversation_id: Arc::new(std::sync::Mutex::new(None)),
                outbound: tx,
                outbound_resampler: Mutex::new(Resampler::new(16_000, 8_000, 320)),
            };
            forward_if_current(&ctx, &[1, 2, 3, 4], my_epoch);
            let forwarded = rx.try_recv().is_ok();
            prop_assert_eq!(forwarded, my_epoch == live, "live={} my_epoch={}", live, my_epoch);
        }
    }
}
