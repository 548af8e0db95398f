//! Capture-session error types.
//!
//! Wraps `proctap_platform::PlatformError` and adds the one error kind that
//! belongs to this crate's layer: `resource-exhausted`, a property of the
//! worker/ring-buffer relationship rather than of anything a platform
//! backend observed.

use thiserror::Error;

use proctap_platform::PlatformError;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// The ring buffer or output queue has been under sustained overflow
    /// for more than a second — the worker cannot keep up with the source.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// API misuse not already covered by `PlatformError::InvalidArgument`
    /// (e.g. calling `read` in callback mode).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_error_converts_via_from() {
        let platform_err = PlatformError::NoAudio;
        let capture_err: CaptureError = platform_err.into();
        assert!(matches!(capture_err, CaptureError::Platform(_)));
        assert!(capture_err.to_string().contains("no audio"));
    }

    #[test]
    fn resource_exhausted_carries_message() {
        let err = CaptureError::ResourceExhausted("ring buffer overflowed for 1.4s".into());
        assert!(err.to_string().contains("1.4s"));
    }
}
