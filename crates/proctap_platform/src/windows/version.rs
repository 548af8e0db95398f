//! Windows version probing via `RtlGetVersion`, which (unlike `GetVersionEx`)
//! is not subject to application-manifest compatibility shims.

use crate::error::{PlatformError, PlatformResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowsVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl WindowsVersion {
    /// Minimum build exposing `AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS`
    /// (Windows 10 21H2 / Server 2022).
    pub const MIN_PROCESS_LOOPBACK_BUILD: u32 = 20348;

    #[cfg(target_os = "windows")]
    pub fn current() -> PlatformResult<Self> {
        use std::mem;
        use windows::Win32::Foundation::STATUS_SUCCESS;
        use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
        use windows::Win32::System::SystemInformation::OSVERSIONINFOEXW;

        unsafe {
            let ntdll = GetModuleHandleW(windows::core::w!("ntdll.dll"))
                .map_err(|e| PlatformError::Internal(format!("failed to load ntdll.dll: {e}")))?;

            let rtl_get_version = GetProcAddress(ntdll, windows::core::s!("RtlGetVersion"))
                .ok_or_else(|| PlatformError::Internal("RtlGetVersion not found in ntdll".into()))?;

            type RtlGetVersionFn = unsafe extern "system" fn(*mut OSVERSIONINFOEXW) -> i32;
            let rtl_get_version: RtlGetVersionFn = mem::transmute(rtl_get_version);

            let mut version_info: OSVERSIONINFOEXW = mem::zeroed();
            version_info.dwOSVersionInfoSize = mem::size_of::<OSVERSIONINFOEXW>() as u32;

            let status = rtl_get_version(&mut version_info);
            if status != STATUS_SUCCESS.0 {
                return Err(PlatformError::Internal(format!(
                    "RtlGetVersion failed with NTSTATUS 0x{status:08X}"
                )));
            }

            Ok(Self {
                major: version_info.dwMajorVersion,
                minor: version_info.dwMinorVersion,
                build: version_info.dwBuildNumber,
            })
        }
    }

    #[cfg(not(target_os = "windows"))]
    pub fn current() -> PlatformResult<Self> {
        Err(PlatformError::UnsupportedPlatform("Windows version detection requires Windows".into()))
    }

    pub fn supports_process_loopback(&self) -> bool {
        (self.major == 10 && self.build >= Self::MIN_PROCESS_LOOPBACK_BUILD) || self.major > 10
    }

    pub fn supports_wasapi(&self) -> bool {
        self.major >= 6
    }
}

impl std::fmt::Display for WindowsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Windows {}.{} (Build {})", self.major, self.minor, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_loopback_support_detection() {
        let old = WindowsVersion { major: 10, minor: 0, build: 19041 };
        assert!(!old.supports_process_loopback());
        assert!(old.supports_wasapi());

        let new = WindowsVersion { major: 10, minor: 0, build: 20348 };
        assert!(new.supports_process_loopback());

        let win11 = WindowsVersion { major: 10, minor: 0, build: 22000 };
        assert!(win11.supports_process_loopback());
    }

    #[test]
    #[cfg(target_os = "windows")]
    fn current_version_detects_real_os() {
        let version = WindowsVersion::current().unwrap();
        assert!(version.major >= 10);
        assert!(version.supports_wasapi());
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn current_version_unavailable_off_windows() {
        assert!(WindowsVersion::current().is_err());
    }
}
