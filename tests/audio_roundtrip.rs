//! G.711 round-trip law (spec §8): encoding then decoding a PCM16 buffer
//! at matching sample rates must stay within mu-law's quantization
//! error bound, for any signal, not just the handful of fixed vectors
//! covered by the unit tests in `audio::codec`.

use proptest::prelude::*;
use voice_agent::audio::codec::{decode_mulaw_to_pcm16, encode_pcm16_to_mulaw};

proptest! {
    #[test]
    fn roundtrip_stays_within_quantization_error(samples in proptest::collection::vec(-32000i16..=32000, 1..400)) {
        let mulaw = encode_pcm16_to_mulaw(&samples, 16_000);
        let decoded = decode_mulaw_to_pcm16(&mulaw, 16_000);

        prop_assert_eq!(decoded.len(), samples.len());
        for (orig, rt) in samples.iter().zip(decoded.iter()) {
            let err = (*orig as i32 - *rt as i32).abs();
            prop_assert!(err <= 1536, "roundtrip error {err} exceeds G.711 bound for sample {orig}");
        }
    }

    #[test]
    fn resampling_preserves_sample_count_ratio(samples in proptest::collection::vec(-30000i16..=30000, 8..320)) {
        let up = voice_agent::audio::resample::Resampler::oneshot(&samples, 8_000, 16_000);
        prop_assert_eq!(up.len(), samples.len() * 2);

        let down = voice_agent::audio::resample::Resampler::oneshot(&samples, 16_000, 8_000);
        prop_assert_eq!(down.len(), samples.len() / 2);
    }
}
