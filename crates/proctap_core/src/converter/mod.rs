//! Format conversion pipeline: decode → channel remix → resample → encode.
//!
//! The canonical intermediate format is always float32 interleaved, and
//! source-encoding auto-detection runs once per session and is cached
//! (`detected_src_encoding`) rather than re-inspected on every `convert`
//! call.

mod decode;
mod encode;
mod remix;
mod resample;

use proctap_platform::{AudioFormat, PlatformError, PlatformResult, SampleEncoding};

use crate::config::{ResamplingQuality, AUTO_DETECT_WINDOW_BYTES};
use resample::Resampler;

/// Stateful converter from one `(rate, channels, encoding)` triple to
/// another. Owns resampler phase/filter state across calls; only the
/// worker thread that owns a `Converter` may call into it.
pub struct Converter {
    src: AudioFormat,
    dst: AudioFormat,
    resampler: Resampler,
    /// `None` until the source encoding is auto-detected from the first
    /// buffer, if the caller constructed this converter without a known
    /// source encoding (see [`Converter::with_auto_detected_encoding`]).
    detected_src_encoding: Option<SampleEncoding>,
}

impl Converter {
    /// Build a converter between two fully-known formats.
    pub fn new(src: AudioFormat, dst: AudioFormat, quality: ResamplingQuality) -> Self {
        let resampler = Resampler::new(quality, dst.channel_count as usize, src.sample_rate_hz, dst.sample_rate_hz);
        Self { src, dst, resampler, detected_src_encoding: Some(src.sample_encoding) }
    }

    /// Build a converter whose source encoding is not yet known; it is
    /// auto-detected from the first `convert` call's leading window and
    /// cached for the remainder of the session.
    pub fn with_auto_detected_encoding(
        src_rate_hz: u32,
        src_channels: u16,
        dst: AudioFormat,
        quality: ResamplingQuality,
    ) -> Self {
        // Placeholder source encoding; overwritten by the first detection.
        let src = AudioFormat::new(src_rate_hz, src_channels, SampleEncoding::Int16);
        let resampler = Resampler::new(quality, dst.channel_count as usize, src_rate_hz, dst.sample_rate_hz);
        Self { src, dst, resampler, detected_src_encoding: None }
    }

    pub fn source_format(&self) -> AudioFormat {
        self.src
    }

    pub fn target_format(&self) -> AudioFormat {
        self.dst
    }

    /// Convert one buffer of source-format bytes into destination-format
    /// bytes. `bytes.len()` must be a whole-frame multiple in the source
    /// format, else `PlatformError::InvalidArgument`.
    pub fn convert(&mut self, bytes: &[u8]) -> PlatformResult<Vec<u8>> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        if self.detected_src_encoding.is_none() {
            let encoding = detect_encoding(&bytes[..bytes.len().min(AUTO_DETECT_WINDOW_BYTES)]);
            self.src.sample_encoding = encoding;
            self.detected_src_encoding = Some(encoding);
        }

        let bytes_per_frame = self.src.bytes_per_frame();
        if bytes.len() % bytes_per_frame != 0 {
            return Err(PlatformError::InvalidArgument(format!(
                "input length {} is not a whole multiple of the source frame size {bytes_per_frame}",
                bytes.len(),
            )));
        }

        let float_samples = decode::decode(bytes, self.src.sample_encoding);
        let remixed = remix::remix(&float_samples, self.src.channel_count as usize, self.dst.channel_count as usize);
        let resampled = if self.src.sample_rate_hz == self.dst.sample_rate_hz {
            remixed
        } else {
            self.resampler.process(&remixed)
        };
        Ok(encode::encode(&resampled, self.dst.sample_encoding))
    }

    /// Drain any audio the resampler is still holding in its internal
    /// leftover buffer and encode it to the destination format. Must be
    /// called once at end-of-stream, after the last `convert` call, or that
    /// trailing audio is lost silently.
    pub fn flush(&mut self) -> Vec<u8> {
        let flushed = self.resampler.flush();
        if flushed.is_empty() {
            return Vec::new();
        }
        encode::encode(&flushed, self.dst.sample_encoding)
    }
}

/// Inspect a leading window of raw bytes and guess whether they are int16
/// or float32 PCM.
///
/// If the float32 interpretation produces values far outside the normalized
/// ±1.0 range (implausible for float audio, but a perfectly ordinary int16
/// bit pattern), prefer int16. If the float32 interpretation is plausible,
/// it's still ambiguous: quiet int16 PCM naturally decodes to small float32
/// values too. In that case, fall back to reading the same bytes as int16
/// and check whether they land in a credible dynamic range; if so, int16
/// wins the tie. Defaults to int16 on an empty window.
fn detect_encoding(window: &[u8]) -> SampleEncoding {
    let as_float32: Vec<f32> = window
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    if as_float32.is_empty() {
        return SampleEncoding::Int16;
    }

    let float32_plausible = as_float32.iter().all(|&s| s.is_finite() && s.abs() <= 1.5);
    if !float32_plausible {
        return SampleEncoding::Int16;
    }

    let as_int16: Vec<i16> = window
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    let int16_credible = !as_int16.is_empty()
        && as_int16.iter().filter(|&&s| s == i16::MAX || s == i16::MIN).count() * 10 < as_int16.len();

    if int16_credible {
        SampleEncoding::Int16
    } else {
        SampleEncoding::Float32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_format_passes_through_unchanged_content() {
        let fmt = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let mut conv = Converter::new(fmt, fmt, ResamplingQuality::LowLatency);
        let bytes: Vec<u8> = (0..16u8).collect();
        let out = conv.convert(&bytes).unwrap();
        assert_eq!(out.len(), bytes.len());
    }

    #[test]
    fn rejects_non_frame_aligned_input() {
        let src = AudioFormat::new(48_000, 2, SampleEncoding::Int16); // 4 bytes/frame
        let dst = src;
        let mut conv = Converter::new(src, dst, ResamplingQuality::LowLatency);
        let err = conv.convert(&[0u8; 3]).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidArgument(_)));
    }

    #[test]
    fn empty_input_returns_empty_output() {
        let fmt = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let mut conv = Converter::new(fmt, fmt, ResamplingQuality::LowLatency);
        assert!(conv.convert(&[]).unwrap().is_empty());
    }

    #[test]
    fn stereo_to_mono_mixdown_of_opposite_constants_is_silence() {
        let src = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let dst = AudioFormat::new(48_000, 1, SampleEncoding::Int16);
        let mut conv = Converter::new(src, dst, ResamplingQuality::LowLatency);

        let l = (0.5f32 * 32767.0) as i16;
        let r = (-0.5f32 * 32767.0) as i16;
        let mut bytes = Vec::new();
        for _ in 0..100 {
            bytes.extend_from_slice(&l.to_le_bytes());
            bytes.extend_from_slice(&r.to_le_bytes());
        }

        let out = conv.convert(&bytes).unwrap();
        for chunk in out.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            assert!(sample.abs() <= 1);
        }
    }

    #[test]
    fn target_channel_count_greater_than_native_zeros_extra_channels() {
        let src = AudioFormat::new(48_000, 1, SampleEncoding::Float32);
        let dst = AudioFormat::new(48_000, 2, SampleEncoding::Float32);
        let mut conv = Converter::new(src, dst, ResamplingQuality::LowLatency);
        let bytes = 0.25f32.to_ne_bytes();
        let out = conv.convert(&bytes).unwrap();
        let l = f32::from_ne_bytes(out[0..4].try_into().unwrap());
        let r = f32::from_ne_bytes(out[4..8].try_into().unwrap());
        assert_eq!(l, 0.25);
        assert_eq!(r, 0.25); // mono->stereo duplicates, not zero-pads
    }

    #[test]
    fn auto_detects_encoding_once_and_caches_it() {
        let dst = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let mut conv = Converter::with_auto_detected_encoding(48_000, 2, dst, ResamplingQuality::LowLatency);
        let bytes: Vec<u8> = (0..64u8).collect();
        conv.convert(&bytes).unwrap();
        assert!(conv.detected_src_encoding.is_some());
        let cached = conv.detected_src_encoding.unwrap();
        // A second, differently-shaped buffer must not re-trigger detection.
        conv.convert(&[1, 2, 3, 4]).unwrap();
        assert_eq!(conv.detected_src_encoding.unwrap(), cached);
    }

    #[test]
    fn resample_output_length_matches_ratio_within_one_frame() {
        let src = AudioFormat::new(44_100, 1, SampleEncoding::Float32);
        let dst = AudioFormat::new(48_000, 1, SampleEncoding::Float32);
        let mut conv = Converter::new(src, dst, ResamplingQuality::LowLatency);

        let frames = 4410;
        let samples = vec![0.0f32; frames];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_ne_bytes()).collect();
        let out = conv.convert(&bytes).unwrap();
        let out_frames = out.len() / 4;
        let expected = (frames as f64 * 48_000.0 / 44_100.0).round() as usize;
        assert!((out_frames as i64 - expected as i64).abs() <= 2);
    }

    /// Scenario: a 1kHz tone of amplitude 0.5 at 44100 Hz stereo int16,
    /// resampled to 48000 Hz, must land near the expected frame count and
    /// never clip while preserving roughly its source peak amplitude.
    #[test]
    fn scenario_resample_44100_to_48000_preserves_tone_peak_amplitude() {
        let src = AudioFormat::new(44_100, 2, SampleEncoding::Int16);
        let dst = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let mut conv = Converter::new(src, dst, ResamplingQuality::LowLatency);

        let seconds = 1.0;
        let frames = (44_100.0 * seconds) as usize;
        let amplitude = 0.5f32;
        let mut bytes = Vec::with_capacity(frames * src.bytes_per_frame());
        for i in 0..frames {
            let t = i as f32 / 44_100.0;
            let sample = (amplitude * (2.0 * std::f32::consts::PI * 1000.0 * t).sin() * 32768.0) as i16;
            bytes.extend_from_slice(&sample.to_le_bytes());
            bytes.extend_from_slice(&sample.to_le_bytes());
        }

        let out = conv.convert(&bytes).unwrap();
        let out_frames = out.len() / dst.bytes_per_frame();
        let expected_frames = (frames as f64 * 48_000.0 / 44_100.0).round() as usize;
        assert!(
            (out_frames as i64 - expected_frames as i64).abs() <= (48_000 / 50) as i64,
            "got {out_frames} frames, expected ~{expected_frames}"
        );

        let mut peak = 0i16;
        for chunk in out.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            peak = peak.max(sample.abs());
        }
        assert!(
            (16_000..=17_000).contains(&peak),
            "peak amplitude {peak} outside [16000, 17000]"
        );
    }
}
