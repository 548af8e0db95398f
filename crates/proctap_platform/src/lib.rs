//! Platform capture backends for per-process audio capture.
//!
//! One [`CaptureBackend`] implementation per supported platform: the
//! Windows WASAPI process-loopback engine, and the two macOS engines
//! (aggregate process tap, ScreenCaptureKit content-sharing). Callers
//! obtain the right one for the current OS via [`create_backend`] rather
//! than naming a concrete engine type.

pub mod discovery;
pub mod error;
pub mod format;
pub mod ring_buffer;
pub mod traits;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "windows")]
pub mod windows;

pub use error::{PlatformError, PlatformResult};
pub use format::{AudioFormat, SampleEncoding};
pub use ring_buffer::RingBuffer;
pub use traits::CaptureBackend;

/// Select and construct the capture engine for the current platform and
/// target process: macOS prefers content-sharing where available, falling
/// back to the process tap; Windows always uses process-loopback (its only
/// engine).
pub fn create_backend(pid: u32) -> PlatformResult<Box<dyn CaptureBackend>> {
    #[cfg(target_os = "macos")]
    {
        macos::create_backend(pid)
    }
    #[cfg(target_os = "windows")]
    {
        windows::create_backend(pid)
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let _ = pid;
        Err(PlatformError::UnsupportedPlatform(
            "process-scoped audio capture is only implemented for macOS and Windows".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn unsupported_platform_reports_error() {
        assert!(create_backend(std::process::id()).is_err());
    }
}
