//! Shared types used across modules
//!
//! This module contains types that are used by multiple modules
//! to avoid circular dependencies: the call state machine, audio frame
//! tagging, and the tool-call triple threaded between the LLM client and
//! the tool registry.

use serde::{Deserialize, Serialize};

/// Call lifecycle state (spec §4.7.5).
///
/// `Idle` only exists between WebSocket accept and the first `start`
/// envelope; every other transition is driven by STT/TTS/interrupt events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Speaking => "speaking",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction an audio frame travels relative to the telephony bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDirection {
    Inbound,
    Outbound,
}

/// Sample format/rate tag for an [`AudioFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// G.711 mu-law, 8 kHz, mono.
    MuLaw8k,
    /// Linear PCM16, 16 kHz, mono.
    Pcm16k,
}

/// An immutable audio buffer tagged by direction, format, and (for
/// outbound TTS audio) the speak-epoch that produced it.
///
/// Never retained past the point it is forwarded; see spec §3 "Audio
/// frame" invariant.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub data: Vec<u8>,
    pub direction: AudioDirection,
    pub format: AudioFormat,
    /// Speak-epoch active when this frame's TTS stream was opened.
    /// `None` for inbound frames, which are not epoch-tagged.
    pub epoch: Option<u64>,
}

impl AudioFrame {
    pub fn inbound(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, direction: AudioDirection::Inbound, format, epoch: None }
    }

    pub fn outbound(data: Vec<u8>, format: AudioFormat, epoch: u64) -> Self {
        Self { data, direction: AudioDirection::Outbound, format, epoch: Some(epoch) }
    }
}

/// A tool call issued mid-response by the LLM: {call-id, tool-name,
/// argument-object}. Resolved by the session against the tool registry;
/// the result is fed back as a `function_call_output` continuation item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The outcome of dispatching a [`ToolCall`] against the registry: either
/// the handler's JSON result, or a `{"error": "..."}` object per the
/// tool-handler-failure policy in spec §7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub output: serde_json::Value,
}
