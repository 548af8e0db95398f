//! macOS capture engines: the aggregate process tap and the
//! ScreenCaptureKit content-sharing helper, plus the version and
//! authorization probes both depend on.

mod content_share;
mod permissions;
mod tap;
mod tap_description;
mod tap_ffi;
mod version;

pub use content_share::ContentShareEngine;
pub use permissions::{
    has_microphone_permission, has_screen_recording_permission, request_microphone_permission,
    request_screen_recording_permission,
};
pub use tap::TapEngine;
pub use version::{is_content_share_available, is_tap_available, macos_version};

use crate::error::PlatformResult;
use crate::traits::CaptureBackend;

/// Select the best available engine for a target process, per the
/// platform-specific ordering: content-sharing is tried first where it's
/// available, falling back to the aggregate process tap.
pub fn create_backend(pid: u32) -> PlatformResult<Box<dyn CaptureBackend>> {
    if content_share::is_available() {
        return Ok(Box::new(ContentShareEngine::new(pid)));
    }
    if TapEngine::is_available() {
        return Ok(Box::new(TapEngine::new(pid)));
    }
    Err(crate::error::PlatformError::UnsupportedPlatform(
        "neither content-sharing (macOS 13+) nor process tap (macOS 14.4+) is available".into(),
    ))
}
