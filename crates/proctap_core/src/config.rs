//! Capture session configuration: target format and resampler quality.
//!
//! Construction is plain constructor arguments, not file-based config
//! parsing — that remains an embedding application's job. The `serde`
//! derives let such an application persist or transmit a target format
//! descriptor without this crate reading a config file itself.

use serde::{Deserialize, Serialize};

pub use proctap_platform::{AudioFormat, SampleEncoding};

/// Resampling quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResamplingQuality {
    /// Linear interpolation between adjacent frames, phase-retaining across
    /// calls. Cheap, always available.
    LowLatency,

    /// Band-limited sinc interpolation via `rubato`. Degrades to
    /// `LowLatency` (with a one-time warning) if the resampler cannot be
    /// built for the requested ratio, or if the crate was compiled without
    /// the `high-quality-resampling` feature.
    #[default]
    HighQuality,
}

/// How many output chunks the coordinator's output queue holds before it
/// starts dropping the oldest.
pub const OUTPUT_QUEUE_CAPACITY: usize = 100;

/// Size of the leading window the converter inspects to auto-detect the
/// source sample encoding when the caller does not declare one.
pub const AUTO_DETECT_WINDOW_BYTES: usize = 400;

/// Bound on the coordinator's worker join during `stop`.
pub const WORKER_STOP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Threshold before sustained ring-buffer overflow is reported as
/// `CaptureError::ResourceExhausted`.
pub const RESOURCE_EXHAUSTION_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_quality_is_high_quality() {
        assert_eq!(ResamplingQuality::default(), ResamplingQuality::HighQuality);
    }

    #[test]
    fn quality_serializes() {
        let json = serde_json::to_string(&ResamplingQuality::LowLatency).unwrap();
        let back: ResamplingQuality = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ResamplingQuality::LowLatency);
    }
}
