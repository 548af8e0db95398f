//! The macOS aggregate-tap `CaptureBackend`.
//!
//! Protocol: create a `CATapDescription` for the target PID, create the
//! process tap, read its UID, resolve the live default output device as the
//! aggregate's main sub-device, build the aggregate device description,
//! create the aggregate device, register an IO proc, and start it. The
//! aggregate device carries a real sub-device so it has its own clock
//! source rather than being a tap-only dictionary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use coreaudio_sys::AudioDeviceID;
use tracing::{debug, warn};

use crate::discovery;
use crate::error::{PlatformError, PlatformResult};
use crate::format::{AudioFormat, SampleEncoding};
use crate::ring_buffer::RingBuffer;
use crate::traits::CaptureBackend;

use super::tap_description::TapDescription;
use super::tap_ffi::{
    create_aggregate_device_description, get_default_output_device, get_device_uid,
    get_tap_stream_format, get_tap_uid, AudioBufferList, AudioDeviceCreateIOProcID,
    AudioDeviceDestroyIOProcID, AudioDeviceIOProcID, AudioDeviceStart, AudioDeviceStop,
    AudioHardwareCreateAggregateDevice, AudioHardwareCreateProcessTap,
    AudioHardwareDestroyAggregateDevice, AudioHardwareDestroyProcessTap, AudioHardwareTapID,
    AudioTimeStamp, CFRelease, CFTypeRef,
};

/// Ring buffer capacity: 2 seconds of stereo float32 at 48kHz.
const RING_CAPACITY_BYTES: usize = 48_000 * 2 * 4 * 2;

/// `AudioDeviceIOProcID` handle, made `Send`/`Sync`: CoreAudio's
/// start/stop/destroy functions are safe to call from any thread once the
/// proc is registered.
#[derive(Clone, Copy)]
struct IoProcHandle(AudioDeviceIOProcID);
unsafe impl Send for IoProcHandle {}
unsafe impl Sync for IoProcHandle {}

struct IoProcContext {
    ring: Arc<RingBuffer>,
    callback_count: Arc<AtomicU32>,
}

extern "C" fn audio_io_proc(
    _device: AudioDeviceID,
    _now: *const AudioTimeStamp,
    input_data: *const AudioBufferList,
    _input_time: *const AudioTimeStamp,
    _output_data: *mut AudioBufferList,
    _output_time: *const AudioTimeStamp,
    client_data: *mut std::ffi::c_void,
) -> i32 {
    if client_data.is_null() || input_data.is_null() {
        return 0;
    }

    // SAFETY: client_data points at a live IoProcContext kept alive for the
    // registration's whole lifetime (owned by TapEngine.io_proc_context).
    unsafe {
        let ctx = &*(client_data as *const IoProcContext);
        let list = &*input_data;
        ctx.callback_count.fetch_add(1, Ordering::Relaxed);

        for i in 0..list.mNumberBuffers {
            let buf = &*list.buffer(i);
            if buf.mData.is_null() || buf.mDataByteSize == 0 {
                continue;
            }
            let bytes =
                std::slice::from_raw_parts(buf.mData as *const u8, buf.mDataByteSize as usize);
            ctx.ring.push(bytes);
        }
    }
    0
}

pub struct TapEngine {
    pid: u32,
    tap_id: AudioHardwareTapID,
    aggregate_device_id: AudioDeviceID,
    io_proc: Option<IoProcHandle>,
    io_proc_context: Option<Box<IoProcContext>>,
    _tap_description: Option<TapDescription>,
    ring: Arc<RingBuffer>,
    format: Option<AudioFormat>,
    running: bool,
    callback_count: Arc<AtomicU32>,
}

impl TapEngine {
    pub fn is_available() -> bool {
        super::version::is_tap_available()
    }

    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            tap_id: 0,
            aggregate_device_id: 0,
            io_proc: None,
            io_proc_context: None,
            _tap_description: None,
            ring: Arc::new(RingBuffer::new(RING_CAPACITY_BYTES, 8)),
            format: None,
            running: false,
            callback_count: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl CaptureBackend for TapEngine {
    fn start(&mut self) -> PlatformResult<()> {
        if self.running {
            return Ok(());
        }

        if !Self::is_available() {
            return Err(PlatformError::UnsupportedPlatform(
                "process tap capture requires macOS 14.4+".into(),
            ));
        }

        if !discovery::has_capture_permission() {
            discovery::request_capture_permission()?;
        }
        if !super::permissions::has_screen_recording_permission() {
            if !super::permissions::request_screen_recording_permission() {
                return Err(PlatformError::PermissionDenied(
                    "screen recording permission required for process tap capture".into(),
                ));
            }
        }

        let tap_description = TapDescription::with_process_ids(&[self.pid as i32]).ok_or_else(
            || PlatformError::NoAudio,
        )?;
        tap_description.set_mute(false);
        tap_description.set_private(true);

        let tap_id = unsafe {
            let mut tap_id: AudioHardwareTapID = 0;
            let status = AudioHardwareCreateProcessTap(tap_description.as_ptr(), &mut tap_id);
            if status != 0 {
                return Err(PlatformError::PlatformStatus {
                    code: status,
                    message: "AudioHardwareCreateProcessTap".into(),
                });
            }
            tap_id
        };

        let cleanup_tap = |tap_id: AudioHardwareTapID| unsafe {
            AudioHardwareDestroyProcessTap(tap_id);
        };

        let tap_uid = match unsafe { get_tap_uid(tap_id) } {
            Some(uid) => uid,
            None => {
                cleanup_tap(tap_id);
                return Err(PlatformError::Internal("tap created but UID unreadable".into()));
            }
        };

        let stream_format = unsafe { get_tap_stream_format(tap_id) };
        let (sample_rate, channels) = match stream_format {
            Some(fmt) if fmt.mSampleRate > 0.0 && fmt.mChannelsPerFrame > 0 => {
                (fmt.mSampleRate as u32, fmt.mChannelsPerFrame)
            }
            _ => {
                warn!(pid = self.pid, "tap format unreadable, assuming 48kHz stereo");
                (48_000, 2)
            }
        };

        let main_subdevice = unsafe { get_default_output_device() }
            .and_then(|id| unsafe { get_device_uid(id) });
        let main_subdevice = match main_subdevice {
            Some(uid) => uid,
            None => {
                cleanup_tap(tap_id);
                return Err(PlatformError::Internal(
                    "could not resolve default output device UID".into(),
                ));
            }
        };

        let aggregate_device_id = unsafe {
            let name = format!("proctap-{}", self.pid);
            let description =
                create_aggregate_device_description(&tap_uid, &name, &main_subdevice);
            if description.is_null() {
                cleanup_tap(tap_id);
                return Err(PlatformError::Internal(
                    "failed to build aggregate device description".into(),
                ));
            }
            let mut device_id: AudioDeviceID = 0;
            let status = AudioHardwareCreateAggregateDevice(description, &mut device_id);
            CFRelease(description as CFTypeRef);
            if status != 0 {
                cleanup_tap(tap_id);
                return Err(PlatformError::PlatformStatus {
                    code: status,
                    message: "AudioHardwareCreateAggregateDevice".into(),
                });
            }
            device_id
        };

        let cleanup_aggregate = |aggregate_device_id: AudioDeviceID, tap_id: AudioHardwareTapID| unsafe {
            AudioHardwareDestroyAggregateDevice(aggregate_device_id);
            cleanup_tap(tap_id);
        };

        let context = Box::new(IoProcContext {
            ring: Arc::clone(&self.ring),
            callback_count: Arc::clone(&self.callback_count),
        });
        let context_ptr = Box::into_raw(context);

        let io_proc_id = unsafe {
            let mut proc_id: AudioDeviceIOProcID = std::ptr::null_mut();
            let status = AudioDeviceCreateIOProcID(
                aggregate_device_id,
                audio_io_proc,
                context_ptr as *mut std::ffi::c_void,
                &mut proc_id,
            );
            if status != 0 {
                let _ = Box::from_raw(context_ptr);
                cleanup_aggregate(aggregate_device_id, tap_id);
                return Err(PlatformError::PlatformStatus {
                    code: status,
                    message: "AudioDeviceCreateIOProcID".into(),
                });
            }
            proc_id
        };

        let status = unsafe { AudioDeviceStart(aggregate_device_id, io_proc_id) };
        if status != 0 {
            unsafe {
                AudioDeviceDestroyIOProcID(aggregate_device_id, io_proc_id);
                let _ = Box::from_raw(context_ptr);
            }
            cleanup_aggregate(aggregate_device_id, tap_id);
            return Err(PlatformError::PlatformStatus {
                code: status,
                message: "AudioDeviceStart".into(),
            });
        }

        debug!(pid = self.pid, sample_rate, channels, "process tap capture started");

        self.tap_id = tap_id;
        self.aggregate_device_id = aggregate_device_id;
        self.io_proc = Some(IoProcHandle(io_proc_id));
        self.io_proc_context = Some(unsafe { Box::from_raw(context_ptr) });
        self._tap_description = Some(tap_description);
        self.format = Some(AudioFormat::new(sample_rate, channels as u16, SampleEncoding::Float32));
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> PlatformResult<()> {
        if !self.running {
            return Ok(());
        }

        if let Some(IoProcHandle(proc_id)) = self.io_proc.take() {
            unsafe {
                if AudioDeviceStop(self.aggregate_device_id, proc_id) != 0 {
                    warn!(pid = self.pid, "AudioDeviceStop failed");
                }
                if AudioDeviceDestroyIOProcID(self.aggregate_device_id, proc_id) != 0 {
                    warn!(pid = self.pid, "AudioDeviceDestroyIOProcID failed");
                }
            }
        }
        self.io_proc_context = None;

        if self.aggregate_device_id != 0 {
            unsafe {
                if AudioHardwareDestroyAggregateDevice(self.aggregate_device_id) != 0 {
                    warn!(pid = self.pid, "AudioHardwareDestroyAggregateDevice failed");
                }
            }
            self.aggregate_device_id = 0;
        }

        if self.tap_id != 0 {
            unsafe {
                if AudioHardwareDestroyProcessTap(self.tap_id) != 0 {
                    warn!(pid = self.pid, "AudioHardwareDestroyProcessTap failed");
                }
            }
            self.tap_id = 0;
        }

        self._tap_description = None;
        self.running = false;
        debug!(pid = self.pid, "process tap capture stopped");
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.running {
            return 0;
        }
        let data = self.ring.pop(buf.len());
        buf[..data.len()].copy_from_slice(&data);
        data.len()
    }

    fn native_format(&self) -> Option<AudioFormat> {
        self.format
    }
}

impl Drop for TapEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_has_no_format_until_started() {
        let engine = TapEngine::new(std::process::id());
        assert!(engine.native_format().is_none());
    }

    #[test]
    fn read_before_start_returns_zero() {
        let mut engine = TapEngine::new(std::process::id());
        let mut buf = [0u8; 64];
        assert_eq!(engine.read(&mut buf), 0);
    }

    /// Scenario: aggregate-device creation fails partway through `start`.
    /// No tap, aggregate device, or I/O proc may remain, and a second
    /// `start` on a fresh instance must still succeed. `start`'s unwind
    /// chain above (`cleanup_tap`/`cleanup_aggregate` called at every
    /// failure point) is what this test pins; it requires a real CoreAudio
    /// host to force a genuine failure and so only runs with hardware.
    #[test]
    #[ignore = "requires macOS audio hardware and induced CoreAudio failure"]
    fn scenario_start_failure_cleans_up_partial_state() {
        let mut engine = TapEngine::new(u32::MAX); // PID unlikely to have an audio session
        assert!(engine.start().is_err());
        assert_eq!(engine.tap_id, 0);
        assert_eq!(engine.aggregate_device_id, 0);

        let mut second = TapEngine::new(std::process::id());
        let _ = second.start();
    }
}
