//! `CATapDescription` bindings (macOS 14.4+ Process Tap API).
//!
//! `CATapDescription` is an Objective-C class (inherits from `NSObject`, not
//! toll-free bridged to `CFDictionary`); `AudioHardwareCreateProcessTap`
//! accepts it as a `CFTypeRef`.
//!
//! `initStereoMixdownOfProcesses:` takes `AudioObjectID`s (wrapped in
//! `NSNumber`), not PIDs or `NSRunningApplication` — passing PIDs directly
//! fails with a `'what'` error.

use objc2::msg_send;
use objc2::rc::Retained;
use objc2::runtime::{AnyClass, NSObject};
use objc2_foundation::{NSArray, NSNumber};
use tracing::{debug, error, warn};

use coreaudio_sys::{
    kAudioObjectPropertyElementMain, kAudioObjectPropertyScopeGlobal, kAudioObjectSystemObject,
    AudioObjectGetPropertyData, AudioObjectID, AudioObjectPropertyAddress,
};
use std::mem;

const K_AUDIO_HARDWARE_PROPERTY_TRANSLATE_PID_TO_PROCESS_OBJECT: u32 = 0x69643270; // 'id2p'

pub type CATapDescriptionRef = *const std::ffi::c_void;

/// Safe wrapper around a `CATapDescription` instance.
pub struct TapDescription {
    inner: Retained<NSObject>,
    uuid: String,
}

// The object is only ever created, configured, and handed to CoreAudio from
// the engine's owning thread; ARC retain/release is thread-safe.
unsafe impl Send for TapDescription {}
unsafe impl Sync for TapDescription {}

fn translate_pid_to_audio_object_id(pid: i32) -> Option<AudioObjectID> {
    unsafe {
        let address = AudioObjectPropertyAddress {
            mSelector: K_AUDIO_HARDWARE_PROPERTY_TRANSLATE_PID_TO_PROCESS_OBJECT,
            mScope: kAudioObjectPropertyScopeGlobal,
            mElement: kAudioObjectPropertyElementMain,
        };

        let mut object_id: AudioObjectID = 0;
        let mut data_size = mem::size_of::<AudioObjectID>() as u32;
        let qualifier_size = mem::size_of::<i32>() as u32;

        let status = AudioObjectGetPropertyData(
            kAudioObjectSystemObject,
            &address,
            qualifier_size,
            &pid as *const i32 as *const _,
            &mut data_size,
            &mut object_id as *mut AudioObjectID as *mut _,
        );

        if status != 0 || object_id == 0 {
            warn!(pid, status, "PID has no AudioObjectID (not producing audio?)");
            return None;
        }
        Some(object_id)
    }
}

impl TapDescription {
    /// Build a stereo-mixdown tap for the given process IDs.
    pub fn with_process_ids(pids: &[i32]) -> Option<Self> {
        if pids.is_empty() {
            error!("cannot create a tap with an empty PID list");
            return None;
        }

        unsafe {
            let tap_class = AnyClass::get(c"CATapDescription")?;

            let audio_object_ids: Vec<Retained<NSNumber>> = pids
                .iter()
                .filter_map(|&pid| translate_pid_to_audio_object_id(pid))
                .map(NSNumber::new_u32)
                .collect();

            if audio_object_ids.is_empty() {
                error!(?pids, "no PID in the list is currently producing audio");
                return None;
            }

            let object_ids_array = NSArray::from_retained_slice(&audio_object_ids);

            let alloc: *mut NSObject = msg_send![tap_class, alloc];
            if alloc.is_null() {
                error!("failed to allocate CATapDescription");
                return None;
            }

            let obj: *mut NSObject =
                msg_send![alloc, initStereoMixdownOfProcesses: &*object_ids_array];
            if obj.is_null() {
                error!(?pids, "initStereoMixdownOfProcesses: returned nil");
                return None;
            }

            let tap_uuid = uuid::Uuid::new_v4().to_string();
            if let Some(uuid_class) = AnyClass::get(c"NSUUID") {
                if let Some(string_class) = AnyClass::get(c"NSString") {
                    if let Ok(uuid_cstr) = std::ffi::CString::new(tap_uuid.as_str()) {
                        let ns_string: *mut NSObject =
                            msg_send![string_class, stringWithUTF8String: uuid_cstr.as_ptr()];
                        if !ns_string.is_null() {
                            let uuid_alloc: *mut NSObject = msg_send![uuid_class, alloc];
                            let ns_uuid: *mut NSObject =
                                msg_send![uuid_alloc, initWithUUIDString: ns_string];
                            if !ns_uuid.is_null() {
                                let _: () = msg_send![obj, setUUID: ns_uuid];
                            }
                        }
                    }
                }
            }

            let inner = Retained::from_raw(obj)?;
            debug!(pid_count = audio_object_ids.len(), uuid = %tap_uuid, "created CATapDescription");
            Some(Self { inner, uuid: tap_uuid })
        }
    }

    /// UUID assigned to this tap (informational only — the aggregate device
    /// tap list must use the UID CoreAudio reports via
    /// [`super::tap_ffi::get_tap_uid`], not this value).
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn set_mute(&self, mute: bool) {
        unsafe {
            let behavior: i64 = if mute { 1 } else { 0 };
            let _: () = msg_send![&*self.inner, setMuteBehavior: behavior];
        }
    }

    pub fn set_private(&self, private: bool) {
        unsafe {
            let _: () = msg_send![&*self.inner, setPrivate: private];
        }
    }

    /// Raw pointer to pass to `AudioHardwareCreateProcessTap` as a `CFTypeRef`.
    pub fn as_ptr(&self) -> CATapDescriptionRef {
        Retained::as_ptr(&self.inner) as CATapDescriptionRef
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_lookup_does_not_panic() {
        unsafe {
            let _ = AnyClass::get(c"CATapDescription");
        }
    }

    #[test]
    fn own_pid_tap_creation_does_not_panic() {
        let our_pid = std::process::id() as i32;
        let _ = TapDescription::with_process_ids(&[our_pid]);
    }
}
