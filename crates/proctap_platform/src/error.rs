//! Platform error taxonomy: a `thiserror` enum with `Result<T, PlatformError>`
//! used everywhere a capture backend can fail.

use thiserror::Error;

/// Errors a platform capture backend can report.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// OS version below the minimum required by the chosen backend.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The target process has no addressable audio object (macOS tap), or
    /// its bundle id could not be inferred (content-sharing).
    #[error("process has no audio")]
    NoAudio,

    /// The OS refused capture for authorization reasons.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The OS returned a non-zero status; the raw code is preserved.
    #[error("platform error (code {code}): {message}")]
    PlatformStatus { code: i32, message: String },

    /// Malformed input or API misuse (e.g. reading from a stopped backend).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend (or one of its external collaborators) is not available
    /// right now, though the platform version would otherwise support it.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Catch-all for conditions that are not one of the named kinds above
    /// (thread spawn failure, channel disconnect, etc).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Map a platform status code to a `Result`: 0 is success, any non-zero
    /// becomes a platform error with the code preserved for diagnostics.
    pub fn from_status(code: i32, context: &str) -> Result<(), Self> {
        if code == 0 {
            Ok(())
        } else {
            Err(Self::PlatformStatus {
                code,
                message: context.to_string(),
            })
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
