//! Polyphase rate conversion between 8 kHz and 16 kHz mono PCM.
//!
//! Spec §9 "Audio-resampling quality" is explicit that naive linear
//! interpolation passes the happy-path tests but fails listening quality,
//! and calls for a polyphase filter. This wraps `rubato`'s FFT-based
//! polyphase resampler (`FftFixedIn`), which the teacher already depends
//! on (see `voice/tts.rs`'s speed-change resampling), and keeps the
//! resampler alive across calls for a given stream so no click is
//! introduced at buffer boundaries.

use rubato::{FftFixedIn, Resampler as _};

/// A stateful 1-channel resampler for one direction of one call's audio.
///
/// Constructed lazily on the first chunk (telephony frames arrive at a
/// fixed size in practice, ~20ms); if a later chunk's length differs the
/// resampler is rebuilt, trading a single-frame boundary artifact for
/// correctness rather than panicking.
pub struct Resampler {
    in_rate: u32,
    out_rate: u32,
    chunk_len: usize,
    inner: FftFixedIn<f32>,
}

impl Resampler {
    pub fn new(in_rate: u32, out_rate: u32, chunk_len: usize) -> Self {
        let inner = build(in_rate, out_rate, chunk_len);
        Self { in_rate, out_rate, chunk_len, inner }
    }

    /// Resample one chunk of PCM16 samples, maintaining filter state
    /// across calls for continuity at chunk boundaries.
    pub fn process(&mut self, pcm: &[i16]) -> Vec<i16> {
        if self.in_rate == self.out_rate {
            return pcm.to_vec();
        }
        if pcm.is_empty() {
            return Vec::new();
        }
        let padded_len = round_up_to_granularity(pcm.len(), self.in_rate, self.out_rate);
        if padded_len != self.chunk_len {
            self.chunk_len = padded_len;
            self.inner = build(self.in_rate, self.out_rate, self.chunk_len);
        }

        let wanted = (pcm.len() as u64 * self.out_rate as u64 / self.in_rate as u64) as usize;
        let input = pad_to(pcm, padded_len);
        match self.inner.process(&[input], None) {
            Ok(waves_out) => to_i16(&waves_out[0], wanted),
            Err(_) => {
                // Fall back to a stateless one-shot conversion rather than
                // dropping the frame; a single glitched chunk beats silence.
                Self::oneshot(pcm, self.in_rate, self.out_rate)
            }
        }
    }

    /// Stateless resample of an isolated buffer, used by the codec's
    /// pure functions which have no per-stream resampler to hold state in.
    pub fn oneshot(pcm: &[i16], in_rate: u32, out_rate: u32) -> Vec<i16> {
        if in_rate == out_rate || pcm.is_empty() {
            return pcm.to_vec();
        }
        // `FftFixedIn` requires the input length to be a multiple of
        // `in_rate / gcd(in_rate, out_rate)`; a buffer that doesn't land on
        // that granularity (e.g. an odd-length downsample chunk) otherwise
        // silently yields zero output frames instead of an error.
        let padded_len = round_up_to_granularity(pcm.len(), in_rate, out_rate);
        let wanted = (pcm.len() as u64 * out_rate as u64 / in_rate as u64) as usize;
        let mut resampler = build(in_rate, out_rate, padded_len);
        let input = pad_to(pcm, padded_len);
        match resampler.process(&[input], None) {
            Ok(waves_out) => to_i16(&waves_out[0], wanted),
            Err(_) => pcm.to_vec(),
        }
    }
}

/// Smallest multiple of `in_rate / gcd(in_rate, out_rate)` at or above `len`.
fn round_up_to_granularity(len: usize, in_rate: u32, out_rate: u32) -> usize {
    let g = (in_rate / gcd(in_rate, out_rate)) as usize;
    len.div_ceil(g) * g
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Extend `pcm` to `len` samples by repeating its last sample (or silence
/// if empty), so the padding region doesn't introduce a discontinuity.
fn pad_to(pcm: &[i16], len: usize) -> Vec<f32> {
    let mut out: Vec<f32> = pcm.iter().map(|&s| s as f32).collect();
    let fill = pcm.last().copied().unwrap_or(0) as f32;
    out.resize(len, fill);
    out
}

fn to_i16(samples: &[f32], wanted: usize) -> Vec<i16> {
    samples
        .iter()
        .take(wanted)
        .map(|&s| s.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

fn build(in_rate: u32, out_rate: u32, chunk_len: usize) -> FftFixedIn<f32> {
    FftFixedIn::<f32>::new(in_rate as usize, out_rate as usize, chunk_len.max(1), 1, 1)
        .expect("valid resampler parameters: nonzero sample rates and chunk length")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsample_doubles_sample_count_for_1_to_2_ratio() {
        let pcm: Vec<i16> = (0..160).map(|i| (i as i16) * 10).collect();
        let out = Resampler::oneshot(&pcm, 8000, 16000);
        assert_eq!(out.len(), pcm.len() * 2);
    }

    #[test]
    fn downsample_halves_sample_count_for_2_to_1_ratio() {
        let pcm: Vec<i16> = (0..320).map(|i| (i as i16) * 10).collect();
        let out = Resampler::oneshot(&pcm, 16000, 8000);
        assert_eq!(out.len(), pcm.len() / 2);
    }

    #[test]
    fn stateful_resampler_handles_repeated_fixed_size_chunks() {
        let mut r = Resampler::new(8000, 16000, 160);
        for _ in 0..5 {
            let pcm = vec![0i16; 160];
            let out = r.process(&pcm);
            assert_eq!(out.len(), 320);
        }
    }

    #[test]
    fn matching_rates_are_a_no_op() {
        let pcm = vec![1i16, 2, 3, 4];
        assert_eq!(Resampler::oneshot(&pcm, 16000, 16000), pcm);
    }
}
