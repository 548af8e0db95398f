//! Resampling, selectable quality.
//!
//! *low-latency*: linear interpolation between adjacent frames, phase state
//! retained across calls so chunk boundaries do not click. *high-quality*:
//! band-limited sinc interpolation via `rubato`
//! (grounded on the retrieved pack's `FftFixedIn`/`SincFixedIn` wrapper
//! pattern), degrading to low-latency with a one-time warning if the
//! resampler cannot be built for the requested ratio or the crate was
//! compiled without the `high-quality-resampling` feature.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::config::ResamplingQuality;

static HIGH_QUALITY_FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_fallback_once(reason: &str) {
    if !HIGH_QUALITY_FALLBACK_WARNED.swap(true, Ordering::SeqCst) {
        warn!(reason, "high-quality resampler unavailable, degrading to low-latency linear resampling");
    }
}

/// Linear-interpolation resampler. Retains phase and the previous call's
/// last frame so interpolation spans chunk boundaries without clicking.
pub struct LinearResampler {
    channels: usize,
    ratio: f64,
    phase: f64,
    prev_last_frame: Vec<f32>,
}

impl LinearResampler {
    pub fn new(channels: usize, src_rate: u32, dst_rate: u32) -> Self {
        Self {
            channels: channels.max(1),
            ratio: dst_rate as f64 / src_rate as f64,
            phase: 0.0,
            prev_last_frame: vec![0.0; channels.max(1)],
        }
    }

    /// `input` is interleaved float32 frames at the source rate; returns
    /// interleaved float32 frames at the destination rate.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let channels = self.channels;
        if input.is_empty() {
            return Vec::new();
        }
        let in_frames = input.len() / channels;
        let virtual_len = in_frames + 1; // index 0 = prev_last_frame, i = input frame i-1

        let step = 1.0 / self.ratio;
        let mut out = Vec::new();
        while (self.phase.floor() as usize) + 1 < virtual_len {
            let idx0 = self.phase.floor() as usize;
            let frac = (self.phase - idx0 as f64) as f32;
            for c in 0..channels {
                let s0 = if idx0 == 0 {
                    self.prev_last_frame[c]
                } else {
                    input[(idx0 - 1) * channels + c]
                };
                let idx1 = idx0 + 1;
                let s1 = if idx1 == 0 {
                    self.prev_last_frame[c]
                } else {
                    input[(idx1 - 1) * channels + c]
                };
                out.push(s0 + (s1 - s0) * frac);
            }
            self.phase += step;
        }

        self.phase -= in_frames as f64;
        self.prev_last_frame.copy_from_slice(&input[(in_frames - 1) * channels..in_frames * channels]);
        out
    }
}

#[cfg(feature = "high-quality-resampling")]
mod sinc {
    use rubato::{Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    /// Wraps `rubato::SincFixedIn`, which consumes fixed-size input chunks
    /// deinterleaved per channel. Input arriving in arbitrary chunk sizes
    /// (as it does from the ring buffer / worker loop) is buffered until a
    /// full chunk is available; leftovers carry over to the next call.
    pub struct SincResampler {
        inner: SincFixedIn<f32>,
        channels: usize,
        chunk_size: usize,
        pending: Vec<Vec<f32>>, // per-channel leftover input samples
    }

    impl SincResampler {
        pub fn try_new(channels: usize, src_rate: u32, dst_rate: u32) -> Result<Self, rubato::ResamplerConstructionError> {
            let ratio = dst_rate as f64 / src_rate as f64;
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            let chunk_size = 1024;
            let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, channels)?;
            Ok(Self {
                inner,
                channels,
                chunk_size,
                pending: vec![Vec::new(); channels],
            })
        }

        pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
            let channels = self.channels;
            for (c, bucket) in self.pending.iter_mut().enumerate() {
                bucket.extend(input.iter().skip(c).step_by(channels).copied());
            }

            let mut interleaved_out = Vec::new();
            while self.pending[0].len() >= self.chunk_size {
                let chunks: Vec<Vec<f32>> = self
                    .pending
                    .iter_mut()
                    .map(|bucket| bucket.drain(..self.chunk_size).collect())
                    .collect();
                if let Ok(out) = self.inner.process(&chunks, None) {
                    let out_frames = out[0].len();
                    for f in 0..out_frames {
                        for ch in out.iter().take(channels) {
                            interleaved_out.push(ch[f]);
                        }
                    }
                }
            }
            interleaved_out
        }

        /// Drain the leftover partial chunk at end-of-stream. Zero-pads the
        /// pending samples up to a full chunk so `rubato` has something to
        /// process; without this, up to `chunk_size - 1` genuinely captured
        /// frames sit in `pending` forever and never reach the caller.
        pub fn flush(&mut self) -> Vec<f32> {
            let channels = self.channels;
            if self.pending[0].is_empty() {
                return Vec::new();
            }

            let chunk_size = self.chunk_size;
            let chunks: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|bucket| {
                    let mut chunk = std::mem::take(bucket);
                    chunk.resize(chunk_size, 0.0);
                    chunk
                })
                .collect();

            let mut interleaved_out = Vec::new();
            if let Ok(out) = self.inner.process(&chunks, None) {
                let out_frames = out[0].len();
                for f in 0..out_frames {
                    for ch in out.iter().take(channels) {
                        interleaved_out.push(ch[f]);
                    }
                }
            }
            interleaved_out
        }
    }
}

/// The active resampling strategy, chosen at construction and never
/// switched mid-session.
pub enum Resampler {
    LowLatency(LinearResampler),
    #[cfg(feature = "high-quality-resampling")]
    HighQuality(sinc::SincResampler),
}

impl Resampler {
    pub fn new(quality: ResamplingQuality, channels: usize, src_rate: u32, dst_rate: u32) -> Self {
        match quality {
            ResamplingQuality::LowLatency => Resampler::LowLatency(LinearResampler::new(channels, src_rate, dst_rate)),
            ResamplingQuality::HighQuality => {
                #[cfg(feature = "high-quality-resampling")]
                {
                    match sinc::SincResampler::try_new(channels, src_rate, dst_rate) {
                        Ok(r) => Resampler::HighQuality(r),
                        Err(e) => {
                            warn_fallback_once(&e.to_string());
                            Resampler::LowLatency(LinearResampler::new(channels, src_rate, dst_rate))
                        }
                    }
                }
                #[cfg(not(feature = "high-quality-resampling"))]
                {
                    warn_fallback_once("crate built without high-quality-resampling feature");
                    Resampler::LowLatency(LinearResampler::new(channels, src_rate, dst_rate))
                }
            }
        }
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        match self {
            Resampler::LowLatency(r) => r.process(input),
            #[cfg(feature = "high-quality-resampling")]
            Resampler::HighQuality(r) => r.process(input),
        }
    }

    /// Drain any buffered input that a chunked resampler is still holding
    /// onto. The linear resampler never buffers more than its phase
    /// fraction, so it has nothing to flush.
    pub fn flush(&mut self) -> Vec<f32> {
        match self {
            Resampler::LowLatency(_) => Vec::new(),
            #[cfg(feature = "high-quality-resampling")]
            Resampler::HighQuality(r) => r.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ratio_preserves_samples() {
        let mut r = LinearResampler::new(1, 48_000, 48_000);
        let input: Vec<f32> = (0..10).map(|i| i as f32 * 0.1).collect();
        let out = r.process(&input);
        assert_eq!(out.len(), input.len());
    }

    #[test]
    fn upsampling_roughly_doubles_frame_count() {
        let mut r = LinearResampler::new(1, 24_000, 48_000);
        let input = vec![0.0f32; 1000];
        let out = r.process(&input);
        assert!((out.len() as i64 - 2000).abs() < 10);
    }

    #[test]
    fn downsampling_roughly_halves_frame_count() {
        let mut r = LinearResampler::new(1, 48_000, 24_000);
        let input = vec![0.0f32; 1000];
        let out = r.process(&input);
        assert!((out.len() as i64 - 500).abs() < 10);
    }

    #[test]
    fn phase_state_spans_chunk_boundary_without_discontinuity() {
        let mut r = LinearResampler::new(1, 48_000, 48_000);
        let first = r.process(&[0.0, 1.0]);
        let second = r.process(&[1.0, 0.0]);
        // With identity ratio every input sample round-trips; the boundary
        // sample (1.0) must not be duplicated or dropped.
        assert_eq!(first, vec![0.0, 1.0]);
        assert_eq!(second, vec![1.0, 0.0]);
    }

    #[test]
    fn empty_input_produces_empty_output_and_no_panic() {
        let mut r = LinearResampler::new(2, 44_100, 48_000);
        assert!(r.process(&[]).is_empty());
    }
}
