//! RAII COM initialization, apartment-threaded, required before any WASAPI
//! call on a given thread.

use crate::error::{PlatformError, PlatformResult};

/// Guards a thread's COM initialization; uninitializes on drop.
///
/// Not `Send`/`Sync` — COM apartments are thread-local, so a guard must be
/// created and dropped on the same thread.
pub struct ComGuard {
    _not_send_sync: std::marker::PhantomData<*const ()>,
}

impl ComGuard {
    #[cfg(target_os = "windows")]
    pub fn new() -> PlatformResult<Self> {
        use windows::Win32::System::Com::{
            CoInitializeEx, COINIT_APARTMENTTHREADED, COINIT_DISABLE_OLE1DDE,
        };

        unsafe {
            let hr = CoInitializeEx(None, COINIT_APARTMENTTHREADED | COINIT_DISABLE_OLE1DDE);
            if hr.is_err() {
                return Err(PlatformError::Internal(format!("COM initialization failed: {hr:?}")));
            }
        }
        Ok(Self { _not_send_sync: std::marker::PhantomData })
    }

    #[cfg(not(target_os = "windows"))]
    pub fn new() -> PlatformResult<Self> {
        Err(PlatformError::UnsupportedPlatform("COM is only available on Windows".into()))
    }
}

impl Drop for ComGuard {
    #[cfg(target_os = "windows")]
    fn drop(&mut self) {
        use windows::Win32::System::Com::CoUninitialize;
        unsafe {
            CoUninitialize();
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn drop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_os = "windows")]
    fn guard_initializes_and_drops_cleanly() {
        let guard = ComGuard::new();
        assert!(guard.is_ok());
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn guard_unavailable_off_windows() {
        assert!(ComGuard::new().is_err());
    }
}
