//! PID → platform-token translation and capture authorization.
//!
//! On macOS this delegates to [`crate::macos::permissions`] and the
//! PID-translation helpers in [`crate::macos::tap_ffi`]/
//! [`crate::macos::content_share`]. On Windows and Linux no runtime
//! authorization is required.

use crate::error::PlatformResult;

/// Probe whether this process is currently authorized to capture audio.
///
/// On macOS this checks the microphone (audio-input) authorization status
/// via AVFoundation. On Windows and Linux this always returns `true`: no
/// runtime authorization gate exists for WASAPI loopback capture.
pub fn has_capture_permission() -> bool {
    #[cfg(target_os = "macos")]
    {
        crate::macos::permissions::has_microphone_permission()
    }
    #[cfg(not(target_os = "macos"))]
    {
        true
    }
}

/// Request capture authorization from the user, blocking until the user
/// responds (or the OS denies automatically, e.g. non-interactive session).
/// On Windows and Linux this is a no-op that returns `Ok(())` immediately.
pub fn request_capture_permission() -> PlatformResult<()> {
    #[cfg(target_os = "macos")]
    {
        crate::macos::permissions::request_microphone_permission()
    }
    #[cfg(not(target_os = "macos"))]
    {
        Ok(())
    }
}
