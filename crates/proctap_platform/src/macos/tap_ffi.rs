//! Raw FFI bindings for the Core Audio Process Tap API (macOS 14.4+) and the
//! aggregate-device machinery used to read a tap's audio.
//!
//! [`create_aggregate_device_description`] includes a main sub-device,
//! `stacked`/`tapautostart` keys, and a sub-device list so the aggregate
//! device has a clock source of its own rather than being tap-only.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use std::ffi::c_void;

pub use coreaudio_sys::{
    kAudioObjectPropertyElementMain, kAudioObjectPropertyScopeGlobal,
    kAudioObjectPropertyScopeOutput, kAudioObjectSystemObject, AudioDeviceID, AudioObjectID,
    AudioObjectGetPropertyData, AudioObjectGetPropertyDataSize, AudioObjectPropertyAddress,
    OSStatus,
};

pub type CFStringRef = *const c_void;
pub type CFDictionaryRef = *const c_void;
pub type CFMutableDictionaryRef = *mut c_void;
pub type CFMutableArrayRef = *mut c_void;
pub type CFNumberRef = *const c_void;
pub type CFTypeRef = *const c_void;
pub type CFIndex = isize;
pub type CFAllocatorRef = *const c_void;

pub type AudioHardwareTapID = AudioObjectID;

/// Tap description dictionary keys (used only by the legacy CFDictionary
/// path kept for diagnostics; the live tap is built via `CATapDescription`
/// in [`super::tap_description`]).
pub mod tap_properties {
    /// Property to get the audio format of a tap.
    pub const kAudioTapPropertyFormat: u32 = 0x74617066; // 'tapf'
    /// Property to get the UID string of a tap — the UID to place in an
    /// aggregate device's tap list.
    pub const kAudioTapPropertyUID: u32 = 0x74756964; // 'tuid'
}

/// Aggregate device dictionary keys.
pub mod aggregate_keys {
    pub const UID_KEY: &str = "uid";
    pub const NAME_KEY: &str = "name";
    pub const MAIN_SUBDEVICE_KEY: &str = "master";
    pub const IS_PRIVATE_KEY: &str = "private";
    pub const IS_STACKED_KEY: &str = "stacked";
    pub const SUB_DEVICE_LIST_KEY: &str = "subdevices";
    pub const TAP_LIST_KEY: &str = "taps";
    pub const TAP_AUTO_START_KEY: &str = "tapautostart";
}

pub mod sub_device_keys {
    pub const UID_KEY: &str = "uid";
}

pub mod sub_tap_keys {
    pub const UID_KEY: &str = "uid";
    pub const DRIFT_COMPENSATION_KEY: &str = "drift";
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    pub static kCFAllocatorDefault: CFAllocatorRef;
    pub static kCFBooleanTrue: CFTypeRef;
    pub static kCFBooleanFalse: CFTypeRef;

    pub fn CFDictionaryCreateMutable(
        allocator: CFAllocatorRef,
        capacity: CFIndex,
        keyCallBacks: *const c_void,
        valueCallBacks: *const c_void,
    ) -> CFMutableDictionaryRef;

    pub fn CFDictionarySetValue(dict: CFMutableDictionaryRef, key: CFTypeRef, value: CFTypeRef);

    pub fn CFArrayCreateMutable(
        allocator: CFAllocatorRef,
        capacity: CFIndex,
        callBacks: *const c_void,
    ) -> CFMutableArrayRef;

    pub fn CFArrayAppendValue(array: CFMutableArrayRef, value: CFTypeRef);

    pub fn CFNumberCreate(
        allocator: CFAllocatorRef,
        theType: CFIndex,
        valuePtr: *const c_void,
    ) -> CFNumberRef;

    pub fn CFStringCreateWithCString(
        alloc: CFAllocatorRef,
        cStr: *const i8,
        encoding: u32,
    ) -> CFStringRef;

    pub fn CFRelease(cf: CFTypeRef);

    pub static kCFTypeDictionaryKeyCallBacks: c_void;
    pub static kCFTypeDictionaryValueCallBacks: c_void;
    pub static kCFTypeArrayCallBacks: c_void;
}

pub const kCFNumberSInt32Type: CFIndex = 3;
pub const kCFStringEncodingUTF8: u32 = 0x08000100;

#[link(name = "CoreAudio", kind = "framework")]
extern "C" {
    /// Create a process tap from a `CATapDescription*` (passed as
    /// `CFTypeRef`). macOS 14.4+.
    pub fn AudioHardwareCreateProcessTap(
        inDescription: CFTypeRef,
        outTapID: *mut AudioHardwareTapID,
    ) -> OSStatus;

    pub fn AudioHardwareDestroyProcessTap(inTapID: AudioHardwareTapID) -> OSStatus;

    pub fn AudioHardwareCreateAggregateDevice(
        inDescription: CFDictionaryRef,
        outDeviceID: *mut AudioDeviceID,
    ) -> OSStatus;

    pub fn AudioHardwareDestroyAggregateDevice(inDeviceID: AudioDeviceID) -> OSStatus;

    pub fn AudioDeviceCreateIOProcID(
        inDevice: AudioDeviceID,
        inProc: AudioDeviceIOProc,
        inClientData: *mut c_void,
        outIOProcID: *mut AudioDeviceIOProcID,
    ) -> OSStatus;

    pub fn AudioDeviceDestroyIOProcID(inDevice: AudioDeviceID, inIOProcID: AudioDeviceIOProcID)
        -> OSStatus;

    pub fn AudioDeviceStart(inDevice: AudioDeviceID, inProcID: AudioDeviceIOProcID) -> OSStatus;

    pub fn AudioDeviceStop(inDevice: AudioDeviceID, inProcID: AudioDeviceIOProcID) -> OSStatus;
}

pub type AudioDeviceIOProcID = *mut c_void;

pub type AudioDeviceIOProc = extern "C" fn(
    inDevice: AudioDeviceID,
    inNow: *const AudioTimeStamp,
    inInputData: *const AudioBufferList,
    inInputTime: *const AudioTimeStamp,
    outOutputData: *mut AudioBufferList,
    inOutputTime: *const AudioTimeStamp,
    inClientData: *mut c_void,
) -> OSStatus;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioTimeStamp {
    pub mSampleTime: f64,
    pub mHostTime: u64,
    pub mRateScalar: f64,
    pub mWordClockTime: u64,
    pub mSMPTETime: SMPTETime,
    pub mFlags: u32,
    pub mReserved: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SMPTETime {
    pub mSubframes: i16,
    pub mSubframeDivisor: i16,
    pub mCounter: u32,
    pub mType: u32,
    pub mFlags: u32,
    pub mHours: i16,
    pub mMinutes: i16,
    pub mSeconds: i16,
    pub mFrames: i16,
}

#[repr(C)]
pub struct AudioBufferList {
    pub mNumberBuffers: u32,
}

impl AudioBufferList {
    /// # Safety
    /// Caller must ensure the list has at least `index + 1` buffers.
    pub unsafe fn buffer(&self, index: u32) -> *const AudioBuffer {
        let base = (self as *const AudioBufferList).add(1) as *const AudioBuffer;
        base.add(index as usize)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AudioBuffer {
    pub mNumberChannels: u32,
    pub mDataByteSize: u32,
    pub mData: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioStreamBasicDescription {
    pub mSampleRate: f64,
    pub mFormatID: u32,
    pub mFormatFlags: u32,
    pub mBytesPerPacket: u32,
    pub mFramesPerPacket: u32,
    pub mBytesPerFrame: u32,
    pub mChannelsPerFrame: u32,
    pub mBitsPerChannel: u32,
    pub mReserved: u32,
}

/// # Safety
/// `s` must not contain interior NUL bytes. Caller must `CFRelease` the result.
pub unsafe fn create_cf_string(s: &str) -> CFStringRef {
    let c_str = std::ffi::CString::new(s).unwrap();
    CFStringCreateWithCString(kCFAllocatorDefault, c_str.as_ptr(), kCFStringEncodingUTF8)
}

/// # Safety
/// `cf_string` must be a live, non-owning CFString reference.
pub unsafe fn cfstring_to_string(cf_string: CFStringRef) -> Option<String> {
    use core_foundation::base::TCFType;
    use core_foundation::string::CFString;

    if cf_string.is_null() {
        return None;
    }
    let cf_str = CFString::wrap_under_get_rule(cf_string as *const _);
    Some(cf_str.to_string())
}

/// # Safety
/// Caller must `CFRelease` the result.
unsafe fn create_cf_number_u32(value: u32) -> CFNumberRef {
    CFNumberCreate(
        kCFAllocatorDefault,
        kCFNumberSInt32Type,
        &value as *const u32 as *const c_void,
    )
}

const K_AUDIO_DEVICE_PROPERTY_DEVICE_UID: u32 = 0x75696420; // 'uid '
const K_AUDIO_HARDWARE_PROPERTY_DEFAULT_OUTPUT_DEVICE: u32 = 0x644F7574; // 'dOut'

/// Resolve the device UID string for an `AudioDeviceID`.
///
/// # Safety
/// Uses raw CoreAudio calls; `device_id` must be a live object.
pub unsafe fn get_device_uid(device_id: AudioDeviceID) -> Option<String> {
    let address = AudioObjectPropertyAddress {
        mSelector: K_AUDIO_DEVICE_PROPERTY_DEVICE_UID,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };

    let mut uid_ref: CFStringRef = std::ptr::null();
    let mut data_size = std::mem::size_of::<CFStringRef>() as u32;

    let status = AudioObjectGetPropertyData(
        device_id,
        &address,
        0,
        std::ptr::null(),
        &mut data_size,
        &mut uid_ref as *mut CFStringRef as *mut _,
    );

    if status != 0 || uid_ref.is_null() {
        tracing::warn!(device_id, status, "failed to read device UID");
        return None;
    }

    let uid = cfstring_to_string(uid_ref);
    CFRelease(uid_ref as CFTypeRef);
    uid
}

/// Resolve the system's current default output device.
///
/// # Safety
/// Uses raw CoreAudio calls.
pub unsafe fn get_default_output_device() -> Option<AudioDeviceID> {
    let address = AudioObjectPropertyAddress {
        mSelector: K_AUDIO_HARDWARE_PROPERTY_DEFAULT_OUTPUT_DEVICE,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };

    let mut device_id: AudioDeviceID = 0;
    let mut size = std::mem::size_of::<AudioDeviceID>() as u32;

    let status = AudioObjectGetPropertyData(
        kAudioObjectSystemObject,
        &address,
        0,
        std::ptr::null(),
        &mut size,
        &mut device_id as *mut AudioDeviceID as *mut c_void,
    );

    if status != 0 || device_id == 0 {
        tracing::warn!(status, "failed to resolve default output device");
        return None;
    }
    Some(device_id)
}

/// Build the aggregate-device description dictionary for a single tap.
///
/// Unlike the SoundPusher-style dictionary that contains only the tap, this
/// includes the live default output device as the aggregate's main
/// sub-device and sole entry in its sub-device list, `stacked = false` and
/// `tapautostart = true` — without a real sub-device the aggregate has no
/// clock source to drive the tap's I/O proc.
///
/// # Safety
/// Caller must `CFRelease` the returned dictionary.
pub unsafe fn create_aggregate_device_description(
    tap_uid: &str,
    name: &str,
    main_subdevice_uid: &str,
) -> CFMutableDictionaryRef {
    let dict = CFDictionaryCreateMutable(
        kCFAllocatorDefault,
        0,
        &kCFTypeDictionaryKeyCallBacks,
        &kCFTypeDictionaryValueCallBacks,
    );

    let set = |key: &str, value: CFTypeRef| {
        let key_ref = create_cf_string(key);
        CFDictionarySetValue(dict, key_ref as CFTypeRef, value);
        CFRelease(key_ref as CFTypeRef);
    };

    let agg_uid = format!("com.proctap.aggregate.{}", uuid::Uuid::new_v4());
    let uid_value = create_cf_string(&agg_uid);
    set(aggregate_keys::UID_KEY, uid_value as CFTypeRef);
    CFRelease(uid_value as CFTypeRef);

    let name_value = create_cf_string(name);
    set(aggregate_keys::NAME_KEY, name_value as CFTypeRef);
    CFRelease(name_value as CFTypeRef);

    set(aggregate_keys::IS_PRIVATE_KEY, kCFBooleanTrue);
    set(aggregate_keys::IS_STACKED_KEY, kCFBooleanFalse);
    set(aggregate_keys::TAP_AUTO_START_KEY, kCFBooleanTrue);

    let main_uid_value = create_cf_string(main_subdevice_uid);
    set(aggregate_keys::MAIN_SUBDEVICE_KEY, main_uid_value as CFTypeRef);
    CFRelease(main_uid_value as CFTypeRef);

    let sub_devices = CFArrayCreateMutable(kCFAllocatorDefault, 1, &kCFTypeArrayCallBacks);
    let sub_device_dict = CFDictionaryCreateMutable(
        kCFAllocatorDefault,
        0,
        &kCFTypeDictionaryKeyCallBacks,
        &kCFTypeDictionaryValueCallBacks,
    );
    let sub_uid_key = create_cf_string(sub_device_keys::UID_KEY);
    let sub_uid_value = create_cf_string(main_subdevice_uid);
    CFDictionarySetValue(sub_device_dict, sub_uid_key as CFTypeRef, sub_uid_value as CFTypeRef);
    CFRelease(sub_uid_key as CFTypeRef);
    CFRelease(sub_uid_value as CFTypeRef);
    CFArrayAppendValue(sub_devices, sub_device_dict as CFTypeRef);
    CFRelease(sub_device_dict as CFTypeRef);
    set(aggregate_keys::SUB_DEVICE_LIST_KEY, sub_devices as CFTypeRef);
    CFRelease(sub_devices as CFTypeRef);

    let taps = CFArrayCreateMutable(kCFAllocatorDefault, 1, &kCFTypeArrayCallBacks);
    let tap_dict = CFDictionaryCreateMutable(
        kCFAllocatorDefault,
        0,
        &kCFTypeDictionaryKeyCallBacks,
        &kCFTypeDictionaryValueCallBacks,
    );
    let tap_uid_key = create_cf_string(sub_tap_keys::UID_KEY);
    let tap_uid_value = create_cf_string(tap_uid);
    CFDictionarySetValue(tap_dict, tap_uid_key as CFTypeRef, tap_uid_value as CFTypeRef);
    CFRelease(tap_uid_key as CFTypeRef);
    CFRelease(tap_uid_value as CFTypeRef);
    let drift_key = create_cf_string(sub_tap_keys::DRIFT_COMPENSATION_KEY);
    CFDictionarySetValue(tap_dict, drift_key as CFTypeRef, kCFBooleanTrue);
    CFRelease(drift_key as CFTypeRef);
    CFArrayAppendValue(taps, tap_dict as CFTypeRef);
    CFRelease(tap_dict as CFTypeRef);
    set(aggregate_keys::TAP_LIST_KEY, taps as CFTypeRef);
    CFRelease(taps as CFTypeRef);

    tracing::debug!(name, tap_uid, main_subdevice_uid, "built aggregate device description");
    dict
}

/// Read a tap's native stream format. Must be called before creating the
/// aggregate device — reading the format is what activates the tap's
/// streams.
///
/// # Safety
/// `tap_id` must be a live tap object.
pub unsafe fn get_tap_stream_format(tap_id: AudioObjectID) -> Option<AudioStreamBasicDescription> {
    let address = AudioObjectPropertyAddress {
        mSelector: tap_properties::kAudioTapPropertyFormat,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };

    let mut format = AudioStreamBasicDescription::default();
    let mut size = std::mem::size_of::<AudioStreamBasicDescription>() as u32;

    let status = AudioObjectGetPropertyData(
        tap_id,
        &address,
        0,
        std::ptr::null(),
        &mut size,
        &mut format as *mut AudioStreamBasicDescription as *mut c_void,
    );

    if status != 0 {
        tracing::warn!(tap_id, status, "failed to read tap format");
        return None;
    }
    Some(format)
}

/// Read the UID string CoreAudio assigned to a created tap — this, not the
/// UUID set on the `CATapDescription`, is what goes in the aggregate
/// device's tap list.
///
/// # Safety
/// `tap_id` must be a live tap object.
pub unsafe fn get_tap_uid(tap_id: AudioObjectID) -> Option<String> {
    let address = AudioObjectPropertyAddress {
        mSelector: tap_properties::kAudioTapPropertyUID,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMain,
    };

    let mut size: u32 = 0;
    if AudioObjectGetPropertyDataSize(tap_id, &address, 0, std::ptr::null(), &mut size) != 0 {
        return None;
    }

    let mut cf_string: CFStringRef = std::ptr::null();
    let status = AudioObjectGetPropertyData(
        tap_id,
        &address,
        0,
        std::ptr::null(),
        &mut size,
        &mut cf_string as *mut CFStringRef as *mut c_void,
    );

    if status != 0 || cf_string.is_null() {
        tracing::warn!(tap_id, status, "failed to read tap UID");
        return None;
    }

    let uid = cfstring_to_string(cf_string);
    CFRelease(cf_string as CFTypeRef);
    uid
}
