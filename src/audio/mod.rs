//! Audio format conversion layer (spec §4.1).
//!
//! Pure functions converting telephony-format audio (G.711 mu-law, 8 kHz
//! mono) to and from the internal PCM linear16 16 kHz mono representation
//! used by the STT/TTS providers. No I/O; the only allocation is the
//! output buffer.
//!
//! Grounded on `original_source/src/voice_ai/audio_utils.py`
//! (`_mulaw_decode`/`_mulaw_encode`/`_resample`), reimplemented without a
//! NumPy/scipy dependency: mu-law codec as scalar bit arithmetic, resample
//! via `rubato`'s FFT-based polyphase resampler (the teacher depends on
//! `rubato` already, under its `voice` feature, for speed-change resampling
//! in `voice/tts.rs`).

pub mod codec;
pub mod resample;

pub use codec::{decode_mulaw_to_pcm16, encode_pcm16_to_mulaw};
pub use resample::Resampler;
