//! The Windows WASAPI process-loopback `CaptureBackend`.
//!
//! Real per-process activation (see [`activation`]) drives an
//! `AUDCLNT_STREAMFLAGS_EVENTCALLBACK` capture client; the worker thread
//! waits on the event handle rather than polling.

mod activation;
mod com;
mod version;

pub use com::ComGuard;
pub use version::WindowsVersion;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};
use windows::Win32::Media::Audio::{
    AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_LOOPBACK,
    IAudioCaptureClient, WAVEFORMATEX,
};
use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForSingleObject, WAIT_OBJECT_0};

use crate::error::{PlatformError, PlatformResult};
use crate::format::{AudioFormat, SampleEncoding};
use crate::ring_buffer::RingBuffer;
use crate::traits::CaptureBackend;

/// Ring buffer capacity: 2 seconds of stereo float32 at 48kHz, the common
/// WASAPI shared-mode mix format.
const RING_CAPACITY_BYTES: usize = 48_000 * 2 * 4 * 2;

/// Bounded wait per event signal; also the responsiveness ceiling for the
/// shutdown flag when no audio is flowing.
const EVENT_WAIT: Duration = Duration::from_millis(200);

fn encoding_for_wave_format(format: &WAVEFORMATEX) -> SampleEncoding {
    const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
    const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
    match format.wFormatTag {
        WAVE_FORMAT_IEEE_FLOAT => SampleEncoding::Float32,
        WAVE_FORMAT_EXTENSIBLE if format.wBitsPerSample == 32 => SampleEncoding::Float32,
        _ if format.wBitsPerSample == 16 => SampleEncoding::Int16,
        _ if format.wBitsPerSample == 32 => SampleEncoding::Int32,
        _ => SampleEncoding::Float32,
    }
}

struct WorkerHandle {
    join: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    wake: windows::Win32::Foundation::HANDLE,
}

// SAFETY: the event handle is only ever signaled via SetEvent from another
// thread; Win32 event objects are safe to share this way.
unsafe impl Send for WorkerHandle {}

pub struct WasapiEngine {
    pid: u32,
    ring: Arc<parking_lot::Mutex<Option<Arc<RingBuffer>>>>,
    format: Arc<parking_lot::Mutex<Option<AudioFormat>>>,
    worker: Option<WorkerHandle>,
    running: bool,
}

impl WasapiEngine {
    pub fn is_available() -> bool {
        WindowsVersion::current()
            .map(|v| v.supports_process_loopback())
            .unwrap_or(false)
    }

    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            ring: Arc::new(parking_lot::Mutex::new(None)),
            format: Arc::new(parking_lot::Mutex::new(None)),
            worker: None,
            running: false,
        }
    }
}

fn worker_main(
    pid: u32,
    ring_slot: Arc<parking_lot::Mutex<Option<Arc<RingBuffer>>>>,
    format_slot: Arc<parking_lot::Mutex<Option<AudioFormat>>>,
    shutdown: Arc<AtomicBool>,
    wake: windows::Win32::Foundation::HANDLE,
    ready: std::sync::mpsc::Sender<PlatformResult<()>>,
) {
    let _com = match ComGuard::new() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let client = match activation::activate_process_loopback_client(pid) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let result = (|| -> PlatformResult<(IAudioCaptureClient, AudioFormat, u16, usize)> {
        unsafe {
            let mix_format = client
                .GetMixFormat()
                .map_err(|e| PlatformError::Internal(format!("GetMixFormat failed: {e}")))?;
            let channels = (*mix_format).nChannels;
            let sample_rate = (*mix_format).nSamplesPerSec;
            let encoding = encoding_for_wave_format(&*mix_format);

            client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    (AUDCLNT_STREAMFLAGS_LOOPBACK.0 | AUDCLNT_STREAMFLAGS_EVENTCALLBACK.0) as u32,
                    0,
                    0,
                    mix_format,
                    None,
                )
                .map_err(|e| PlatformError::Internal(format!("IAudioClient::Initialize failed: {e}")))?;
            windows::Win32::System::Com::CoTaskMemFree(Some(mix_format as *mut _));

            client
                .SetEventHandle(wake)
                .map_err(|e| PlatformError::Internal(format!("SetEventHandle failed: {e}")))?;

            let capture_client: IAudioCaptureClient = client
                .GetService()
                .map_err(|e| PlatformError::Internal(format!("GetService failed: {e}")))?;

            client.Start().map_err(|e| PlatformError::Internal(format!("IAudioClient::Start failed: {e}")))?;

            let format = AudioFormat::new(sample_rate, channels, encoding);
            let bytes_per_frame = format.bytes_per_frame();
            Ok((capture_client, format, channels, bytes_per_frame))
        }
    })();

    let (capture_client, format, _channels, bytes_per_frame) = match result {
        Ok(v) => v,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // The ring buffer is only constructible once the real mix format (and
    // therefore the real bytes-per-frame) is known; a wrong frame size
    // would silently corrupt every push's frame alignment.
    let ring = Arc::new(RingBuffer::new(RING_CAPACITY_BYTES, bytes_per_frame));
    *ring_slot.lock() = Some(Arc::clone(&ring));
    *format_slot.lock() = Some(format);
    let _ = ready.send(Ok(()));

    debug!(pid, ?format, "WASAPI process-loopback capture started");

    while !shutdown.load(Ordering::Acquire) {
        let wait = unsafe { WaitForSingleObject(wake, EVENT_WAIT.as_millis() as u32) };
        if wait != WAIT_OBJECT_0 {
            continue; // timeout: re-check shutdown flag
        }
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        loop {
            let packet_len = match unsafe { capture_client.GetNextPacketSize() } {
                Ok(len) => len,
                Err(_) => break,
            };
            if packet_len == 0 {
                break;
            }

            let mut data_ptr: *mut u8 = std::ptr::null_mut();
            let mut frames_available: u32 = 0;
            let mut flags: u32 = 0;
            let got = unsafe {
                capture_client.GetBuffer(&mut data_ptr, &mut frames_available, &mut flags, None, None)
            };
            if got.is_err() {
                break;
            }

            let byte_len = frames_available as usize * format.bytes_per_frame();
            const AUDCLNT_BUFFERFLAGS_SILENT: u32 = 0x2;
            if flags & AUDCLNT_BUFFERFLAGS_SILENT != 0 {
                let silence = vec![0u8; byte_len];
                ring.push(&silence);
            } else {
                let bytes = unsafe { std::slice::from_raw_parts(data_ptr, byte_len) };
                ring.push(bytes);
            }

            let _ = unsafe { capture_client.ReleaseBuffer(frames_available) };
        }
    }

    unsafe {
        let _ = client.Stop();
    }
    debug!(pid, "WASAPI process-loopback capture stopped");
}

impl CaptureBackend for WasapiEngine {
    fn start(&mut self) -> PlatformResult<()> {
        if self.running {
            return Ok(());
        }
        if !Self::is_available() {
            return Err(PlatformError::UnsupportedPlatform(format!(
                "process-loopback capture requires Windows 10 build {}+",
                WindowsVersion::MIN_PROCESS_LOOPBACK_BUILD
            )));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = unsafe { CreateEventW(None, false, false, None) }
            .map_err(|e| PlatformError::Internal(format!("CreateEventW failed: {e}")))?;

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let pid = self.pid;
        let ring_slot = Arc::clone(&self.ring);
        let format_slot = Arc::clone(&self.format);
        let shutdown_clone = Arc::clone(&shutdown);
        let wake_clone = wake;

        let join = std::thread::Builder::new()
            .name(format!("proctap-wasapi-{pid}"))
            .spawn(move || worker_main(pid, ring_slot, format_slot, shutdown_clone, wake_clone, ready_tx))
            .map_err(|e| PlatformError::Internal(format!("failed to spawn WASAPI worker thread: {e}")))?;

        match ready_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = join.join();
                return Err(e);
            }
            Err(_) => {
                shutdown.store(true, Ordering::Release);
                unsafe {
                    let _ = SetEvent(wake);
                }
                let _ = join.join();
                return Err(PlatformError::Unavailable("WASAPI worker startup timed out".into()));
            }
        }

        self.worker = Some(WorkerHandle { join, shutdown, wake });
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> PlatformResult<()> {
        if !self.running {
            return Ok(());
        }
        if let Some(worker) = self.worker.take() {
            worker.shutdown.store(true, Ordering::Release);
            unsafe {
                if SetEvent(worker.wake).is_err() {
                    warn!(pid = self.pid, "SetEvent failed while stopping WASAPI worker");
                }
            }
            if worker.join.join().is_err() {
                warn!(pid = self.pid, "WASAPI worker thread panicked");
            }
        }
        *self.format.lock() = None;
        *self.ring.lock() = None;
        self.running = false;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        if !self.running {
            return 0;
        }
        let ring = match self.ring.lock().as_ref() {
            Some(ring) => Arc::clone(ring),
            None => return 0,
        };
        let data = ring.pop(buf.len());
        buf[..data.len()].copy_from_slice(&data);
        data.len()
    }

    fn native_format(&self) -> Option<AudioFormat> {
        *self.format.lock()
    }
}

impl Drop for WasapiEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

pub fn create_backend(pid: u32) -> PlatformResult<Box<dyn CaptureBackend>> {
    Ok(Box::new(WasapiEngine::new(pid)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_has_no_format_until_started() {
        let engine = WasapiEngine::new(std::process::id());
        assert!(engine.native_format().is_none());
    }

    #[test]
    fn read_before_start_returns_zero() {
        let mut engine = WasapiEngine::new(std::process::id());
        let mut buf = [0u8; 64];
        assert_eq!(engine.read(&mut buf), 0);
    }
}
