use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Sample rate of the PCM16 audio the agent streams back.
pub const PLAYBACK_PCM16_SAMPLE_RATE: u32 = 24000;
/// Sample rate of the PCM16 audio the agent expects from the microphone.
pub const CAPTURE_PCM16_SAMPLE_RATE: u32 = 16000;

const PCM16_ENCODE_SCALE: f32 = 32767.0;
const PCM16_DECODE_SCALE: f32 = 32768.0;

/// Converts one float sample to PCM16, rounding and clamping to the i16 range.
pub fn f32_to_pcm16(sample: f32) -> i16 {
    (sample * PCM16_ENCODE_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Converts one PCM16 sample to a float in `[-1.0, 1.0)`.
pub fn pcm16_to_f32(sample: i16) -> f32 {
    sample as f32 / PCM16_DECODE_SCALE
}

/// Converts float samples into little-endian PCM16 bytes.
pub fn f32_to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_pcm16(sample).to_le_bytes());
    }
    bytes
}

/// Converts little-endian PCM16 bytes into float samples.
///
/// A dangling odd byte cannot form a sample and is dropped.
pub fn pcm16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    if bytes.len() % 2 != 0 {
        tracing::debug!("dropping dangling byte from {} byte pcm16 chunk", bytes.len());
    }
    bytes
        .chunks_exact(2)
        .map(|chunk| pcm16_to_f32(i16::from_le_bytes([chunk[0], chunk[1]])))
        .collect()
}

/// Transport-encodes raw bytes as standard base64.
pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Reverses [`encode_bytes`].
pub fn decode_bytes(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

/// Encodes float samples straight to a base64 PCM16 string.
pub fn encode(samples: &[f32]) -> String {
    encode_bytes(&f32_to_pcm16_bytes(samples))
}

/// Decodes a base64 PCM16 string to float samples; invalid input yields no samples.
pub fn decode(encoded: &str) -> Vec<f32> {
    match decode_bytes(encoded) {
        Ok(bytes) => pcm16_bytes_to_f32(&bytes),
        Err(e) => {
            tracing::error!("failed to decode base64 fragment: {}", e);
            Vec::new()
        }
    }
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> Result<FastFixedIn<f32>, rubato::ResamplerConstructionError> {
    FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )
}

/// Mono resampler fed with arbitrarily sized frames.
///
/// Every frame is resampled as soon as it arrives; the final chunk of a frame
/// shrinks the resampler's chunk size instead of waiting for more input. Only
/// the filter delay stays behind until [`StreamResampler::finish`].
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    chunk_size: usize,
    primed: bool,
}

impl StreamResampler {
    pub fn new(
        in_sampling_rate: u32,
        out_sampling_rate: u32,
        chunk_size: usize,
    ) -> Result<Self, rubato::ResamplerConstructionError> {
        let chunk_size = chunk_size.max(1);
        let resampler =
            create_resampler(in_sampling_rate as f64, out_sampling_rate as f64, chunk_size)?;
        Ok(Self {
            resampler,
            chunk_size,
            primed: false,
        })
    }

    /// Returns a resampler only when the two rates differ.
    pub fn between(
        in_sampling_rate: u32,
        out_sampling_rate: u32,
        chunk_size: usize,
    ) -> Result<Option<Self>, rubato::ResamplerConstructionError> {
        if in_sampling_rate == out_sampling_rate {
            return Ok(None);
        }
        Self::new(in_sampling_rate, out_sampling_rate, chunk_size).map(Some)
    }

    /// Drops the filter state, including any delayed output.
    pub fn reset(&mut self) {
        self.resampler.reset();
        self.primed = false;
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut resampled = Vec::new();
        for chunk in samples.chunks(self.chunk_size) {
            if let Err(e) = self.resampler.set_chunk_size(chunk.len()) {
                tracing::error!("failed to resize resampler chunk: {}", e);
                continue;
            }
            match self.resampler.process(&[chunk], None) {
                Ok(mut output) => {
                    self.primed = true;
                    if let Some(channel) = output.pop() {
                        resampled.extend(channel);
                    }
                }
                Err(e) => {
                    tracing::error!("failed to resample audio chunk: {}", e);
                }
            }
        }
        resampled
    }

    /// Pushes out the samples still held by the filter and starts over.
    pub fn finish(&mut self) -> Vec<f32> {
        if !self.primed {
            return Vec::new();
        }
        let delay = self.resampler.output_delay();
        let mut tail = Vec::new();
        if delay > 0 {
            let no_input: Option<&[Vec<f32>]> = None;
            let flushed = self
                .resampler
                .set_chunk_size(self.chunk_size)
                .and_then(|_| self.resampler.process_partial(no_input, None));
            match flushed {
                Ok(mut output) => {
                    if let Some(mut channel) = output.pop() {
                        channel.truncate(delay);
                        tail = channel;
                    }
                }
                Err(e) => {
                    tracing::error!("failed to flush resampler: {}", e);
                }
            }
        }
        self.reset();
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_to_pcm16_clamps() {
        assert_eq!(f32_to_pcm16(0.0), 0);
        assert_eq!(f32_to_pcm16(1.0), i16::MAX);
        assert_eq!(f32_to_pcm16(2.5), i16::MAX);
        assert_eq!(f32_to_pcm16(-1.0), -32767);
        assert_eq!(f32_to_pcm16(-7.0), i16::MIN);
        assert_eq!(f32_to_pcm16(0.5), 16384);
        assert_eq!(f32_to_pcm16(0.75), 24575);
        assert_eq!(f32_to_pcm16(-0.6), -19660);
        assert_eq!(f32_to_pcm16(0.999), 32734);
    }

    #[test]
    fn test_pcm16_round_trip_stays_within_one_step() {
        for s in i16::MIN..=i16::MAX {
            let back = f32_to_pcm16(pcm16_to_f32(s));
            assert!((back as i32 - s as i32).abs() <= 1, "sample {} came back as {}", s, back);
        }
    }

    #[test]
    fn test_transport_encoding_round_trip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0xff, 0x00],
            vec![1, 2, 3],
            (0..=255u8).collect(),
        ];
        for bytes in cases {
            assert_eq!(decode_bytes(&encode_bytes(&bytes)).unwrap(), bytes);
        }
    }

    #[test]
    fn test_invalid_base64_is_an_error() {
        assert!(decode_bytes("not base64!").is_err());
        assert!(decode("not base64!").is_empty());
    }

    #[test]
    fn test_pcm16_bytes_are_little_endian() {
        let bytes = f32_to_pcm16_bytes(&[pcm16_to_f32(0x0102), pcm16_to_f32(-2)]);
        assert_eq!(bytes, vec![0x02, 0x01, 0xfe, 0xff]);
        assert_eq!(
            pcm16_bytes_to_f32(&bytes),
            vec![pcm16_to_f32(0x0102), pcm16_to_f32(-2)]
        );
    }

    #[test]
    fn test_odd_byte_is_dropped() {
        let samples = pcm16_bytes_to_f32(&[0x00, 0x40, 0x7f]);
        assert_eq!(samples, vec![0.5]);
    }

    #[test]
    fn test_same_rate_skips_resampler() {
        assert!(StreamResampler::between(16000, 16000, 256).unwrap().is_none());
        assert!(StreamResampler::between(48000, 16000, 256).unwrap().is_some());
    }

    #[test]
    fn test_stream_resampler_keeps_up_with_short_frames() {
        let mut resampler = StreamResampler::new(48000, 16000, 480).unwrap();
        let mut produced = resampler.process(&[0.0; 100]).len();
        for _ in 0..10 {
            produced += resampler.process(&[0.0; 4730]).len();
        }
        produced += resampler.finish().len();
        assert!(produced.abs_diff(47400 / 3) <= 8, "produced {}", produced);
    }

    #[test]
    fn test_finish_without_input_is_empty() {
        let mut resampler = StreamResampler::new(24000, 48000, 1024).unwrap();
        assert!(resampler.finish().is_empty());
        resampler.process(&[0.1; 10]);
        resampler.finish();
        assert!(resampler.finish().is_empty());
    }
}
