//! macOS version probing, shared by the tap and content-sharing engines to
//! decide availability.

use std::process::Command;

/// `(major, minor, patch)` from `sw_vers -productVersion`. Returns
/// `(0, 0, 0)` if the version cannot be determined (never on a real macOS
/// host, but keeps this testable off-platform).
pub fn macos_version() -> (u32, u32, u32) {
    let output = Command::new("sw_vers").arg("-productVersion").output().ok();

    if let Some(output) = output {
        if output.status.success() {
            let version_str = String::from_utf8_lossy(&output.stdout);
            let parts: Vec<&str> = version_str.trim().split('.').collect();
            let major = parts.first().and_then(|s| s.parse().ok()).unwrap_or(0);
            let minor = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
            let patch = parts.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);
            return (major, minor, patch);
        }
    }
    (0, 0, 0)
}

/// Process Tap API (`AudioHardwareCreateProcessTap`) requires macOS 14.4+.
pub fn is_tap_available() -> bool {
    matches!(macos_version(), (major, _, _) if major > 14)
        || matches!(macos_version(), (14, minor, _) if minor >= 4)
}

/// Content-sharing picker capture requires macOS 13+ (`ScreenCaptureKit`
/// audio support).
pub fn is_content_share_available() -> bool {
    matches!(macos_version(), (major, _, _) if major >= 13)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_probe_does_not_panic() {
        let _ = macos_version();
    }

    #[test]
    fn tap_available_implies_14_4_or_newer() {
        let (major, minor, _) = macos_version();
        if is_tap_available() && major != 0 {
            assert!(major > 14 || (major == 14 && minor >= 4));
        }
    }
}
