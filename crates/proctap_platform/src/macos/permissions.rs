//! macOS capture authorization probes.
//!
//! Two distinct TCC gates matter here: microphone/audio-input authorization
//! (required by the tap engine, since a process tap is treated by the OS
//! like an audio input) and screen-recording authorization (required by
//! both the tap engine, per Apple's process-tap entitlement requirements,
//! and the content-sharing engine, since it rides the screen-sharing audio
//! path).

use crate::error::{PlatformError, PlatformResult};
use std::sync::{Arc, Condvar, Mutex};

use block2::RcBlock;
use objc2::msg_send;
use objc2::runtime::{AnyClass, Bool};

#[link(name = "AVFoundation", kind = "framework")]
extern "C" {}

/// `AVAuthorizationStatusAuthorized` from `AVFoundation/AVCaptureDevice.h`.
const AV_AUTH_STATUS_AUTHORIZED: isize = 3;

/// Check current microphone (audio input) authorization status without
/// prompting the user.
pub fn has_microphone_permission() -> bool {
    unsafe {
        let cls = match AnyClass::get(c"AVCaptureDevice") {
            Some(c) => c,
            None => return false,
        };
        let media_type = objc2_foundation::NSString::from_str("soun"); // AVMediaTypeAudio
        let status: isize = msg_send![cls, authorizationStatusForMediaType: &*media_type];
        status == AV_AUTH_STATUS_AUTHORIZED
    }
}

/// Request microphone authorization, blocking the calling thread until the
/// user answers the system dialog (or the OS denies automatically, e.g. no
/// UI session). Returns an error if authorization was refused.
pub fn request_microphone_permission() -> PlatformResult<()> {
    if has_microphone_permission() {
        return Ok(());
    }

    unsafe {
        let cls = AnyClass::get(c"AVCaptureDevice")
            .ok_or_else(|| PlatformError::Internal("AVCaptureDevice class not found".into()))?;
        let media_type = objc2_foundation::NSString::from_str("soun");

        let pair = Arc::new((Mutex::new(None::<bool>), Condvar::new()));
        let pair_for_block = Arc::clone(&pair);

        let block = RcBlock::new(move |granted: Bool| {
            let (lock, cvar) = &*pair_for_block;
            let mut done = lock.lock().unwrap();
            *done = Some(granted.is_true());
            cvar.notify_one();
        });

        let _: () = msg_send![
            cls,
            requestAccessForMediaType: &*media_type,
            completionHandler: &*block,
        ];

        let (lock, cvar) = &*pair;
        let mut guard = lock.lock().unwrap();
        while guard.is_none() {
            guard = cvar.wait(guard).unwrap();
        }
        if guard.unwrap() {
            Ok(())
        } else {
            Err(PlatformError::PermissionDenied(
                "microphone access denied by user".into(),
            ))
        }
    }
}

/// Check whether this process already holds Screen Recording authorization
/// (required for process-tap and content-sharing capture).
pub fn has_screen_recording_permission() -> bool {
    unsafe { CGPreflightScreenCaptureAccess() }
}

/// Prompt the user for Screen Recording authorization (shows the system
/// dialog the first time; subsequent calls are no-ops if already
/// granted/denied). Does not block on the user's answer.
pub fn request_screen_recording_permission() -> bool {
    unsafe { CGRequestScreenCaptureAccess() }
}

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGPreflightScreenCaptureAccess() -> bool;
    fn CGRequestScreenCaptureAccess() -> bool;
}
