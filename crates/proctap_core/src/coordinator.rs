//! The public capture object: owns a backend, an optional converter, an
//! output queue, and the worker thread that ties them together.
//!
//! Construction is activation: the only way to get a `Coordinator` is
//! [`Coordinator::start`], and `Drop` always performs `stop`, so there is
//! no separate idle state to manage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use proctap_platform::{AudioFormat, CaptureBackend};

use crate::config::{ResamplingQuality, RESOURCE_EXHAUSTION_THRESHOLD, WORKER_STOP_TIMEOUT};
use crate::converter::Converter;
use crate::error::{CaptureError, CaptureResult};
use crate::output_queue::OutputQueue;

/// User callback invoked from the worker thread with `(bytes, frame_count)`.
/// The byte slice is valid only for the duration of the call.
pub type DataCallback = Box<dyn FnMut(&[u8], usize) + Send + 'static>;

const WORKER_IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Owns one backend, an optional converter, and either a user callback or
/// a bounded output queue for pull-mode `read`.
pub struct Coordinator {
    target_format: AudioFormat,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    stop_ack: Option<std::sync::mpsc::Receiver<()>>,
    output_queue: Option<Arc<OutputQueue>>,
    resource_exhausted: Arc<AtomicBool>,
    read_timeout: Duration,
}

impl Coordinator {
    /// Select a backend for the host platform, open it, and spawn the
    /// worker. If the backend's native format differs from `target_format`,
    /// a [`Converter`] is instantiated and run on every worker iteration.
    /// `on_data` selects callback mode; its absence selects pull mode via
    /// [`Coordinator::read`].
    pub fn start(
        pid: u32,
        target_format: AudioFormat,
        quality: ResamplingQuality,
        on_data: Option<DataCallback>,
    ) -> CaptureResult<Self> {
        Self::start_with_read_timeout(pid, target_format, quality, on_data, Duration::from_millis(500))
    }

    /// As [`start`](Self::start), with an explicit timeout for pull-mode
    /// [`read`](Self::read) calls.
    pub fn start_with_read_timeout(
        pid: u32,
        target_format: AudioFormat,
        quality: ResamplingQuality,
        on_data: Option<DataCallback>,
        read_timeout: Duration,
    ) -> CaptureResult<Self> {
        let mut backend = proctap_platform::create_backend(pid)?;
        backend.start()?;

        let native_format = backend.native_format();
        let converter = match native_format {
            Some(native) if native != target_format => {
                Some(Converter::new(native, target_format, quality))
            }
            _ => None,
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let resource_exhausted = Arc::new(AtomicBool::new(false));
        let output_queue = if on_data.is_none() {
            Some(Arc::new(OutputQueue::new()))
        } else {
            None
        };

        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let shutdown_clone = Arc::clone(&shutdown);
        let exhausted_clone = Arc::clone(&resource_exhausted);
        let queue_clone = output_queue.clone();

        let worker = std::thread::Builder::new()
            .name(format!("proctap-coordinator-{pid}"))
            .spawn(move || {
                worker_main(backend, converter, target_format, shutdown_clone, exhausted_clone, queue_clone, on_data, stop_tx);
            })
            .map_err(|e| CaptureError::Platform(proctap_platform::PlatformError::Internal(format!(
                "failed to spawn coordinator worker thread: {e}"
            ))))?;

        Ok(Self {
            target_format,
            shutdown,
            worker: Some(worker),
            stop_ack: Some(stop_rx),
            output_queue,
            resource_exhausted,
            read_timeout,
        })
    }

    /// Signal the worker, join it with a 2-second bound, close the backend,
    /// drop all resources. Idempotent: `start; stop; stop; ...` is
    /// equivalent to `start; stop`.
    pub fn stop(&mut self) -> CaptureResult<()> {
        if self.worker.is_none() {
            return Ok(());
        }
        self.shutdown.store(true, Ordering::Release);
        if let Some(queue) = &self.output_queue {
            queue.close();
        }

        if let Some(ack) = self.stop_ack.take() {
            // The worker signals this channel just before returning, so a
            // well-behaved worker always beats the bound; a missed signal
            // still lets us proceed because the worker is effectively a
            // daemon thread from the process's point of view.
            let _ = ack.recv_timeout(WORKER_STOP_TIMEOUT);
        }

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("coordinator worker thread panicked");
            }
        }
        Ok(())
    }

    /// Pull-mode read: pops from the output queue, blocking up to the
    /// configured timeout. Returns empty on timeout or if constructed in
    /// callback mode.
    pub fn read(&self, max_bytes: usize) -> CaptureResult<Vec<u8>> {
        match &self.output_queue {
            Some(queue) => {
                let mut out = queue.pop(self.read_timeout);
                out.truncate(max_bytes);
                Ok(out)
            }
            None => Err(CaptureError::InvalidArgument(
                "read() is only valid in pull mode (no callback was supplied to start)".into(),
            )),
        }
    }

    /// The *target* format (post-conversion), not the native one.
    pub fn format(&self) -> AudioFormat {
        self.target_format
    }

    /// Whether the worker has reported sustained ring/queue overflow for
    /// more than one continuous second.
    pub fn is_resource_exhausted(&self) -> bool {
        self.resource_exhausted.load(Ordering::Acquire)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn worker_main(
    mut backend: Box<dyn CaptureBackend>,
    mut converter: Option<Converter>,
    target_format: AudioFormat,
    shutdown: Arc<AtomicBool>,
    resource_exhausted: Arc<AtomicBool>,
    output_queue: Option<Arc<OutputQueue>>,
    mut on_data: Option<DataCallback>,
    stop_ack: std::sync::mpsc::Sender<()>,
) {
    info!("coordinator worker started");

    let mut overflow_since: Option<Instant> = None;
    let mut read_buf = vec![0u8; 64 * 1024];
    let target_bytes_per_frame = target_format.bytes_per_frame().max(1);

    while !shutdown.load(Ordering::Acquire) {
        let n = backend.read(&mut read_buf);
        if n == 0 {
            std::thread::sleep(WORKER_IDLE_SLEEP);
            continue;
        }

        let chunk = &read_buf[..n];
        let converted = match &mut converter {
            Some(c) => match c.convert(chunk) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "converter rejected a chunk, dropping it and continuing");
                    continue;
                }
            },
            None => chunk.to_vec(),
        };

        if converted.is_empty() {
            continue;
        }

        let frame_count = converted.len() / target_bytes_per_frame;
        if let Some(cb) = on_data.as_mut() {
            cb(&converted, frame_count);
            overflow_since = None;
        } else if let Some(queue) = &output_queue {
            let dropped = queue.push(converted);
            if dropped {
                let since = overflow_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= RESOURCE_EXHAUSTION_THRESHOLD {
                    if !resource_exhausted.swap(true, Ordering::Release) {
                        warn!("output queue has dropped chunks continuously for over 1s");
                    }
                }
            } else {
                overflow_since = None;
                resource_exhausted.store(false, Ordering::Release);
            }
        }
    }

    if let Some(c) = converter.as_mut() {
        let flushed = c.flush();
        if !flushed.is_empty() {
            let frame_count = flushed.len() / target_bytes_per_frame;
            if let Some(cb) = on_data.as_mut() {
                cb(&flushed, frame_count);
            } else if let Some(queue) = &output_queue {
                queue.push(flushed);
            }
        }
    }

    if let Err(e) = backend.stop() {
        warn!(error = %e, "backend reported an error while stopping");
    }
    debug!("coordinator worker stopped");
    let _ = stop_ack.send(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctap_platform::{PlatformResult, SampleEncoding};
    use std::sync::atomic::AtomicUsize;

    struct SilentBackend {
        format: AudioFormat,
        started: bool,
        frames_remaining: Arc<AtomicUsize>,
    }

    impl CaptureBackend for SilentBackend {
        fn start(&mut self) -> PlatformResult<()> {
            self.started = true;
            Ok(())
        }
        fn stop(&mut self) -> PlatformResult<()> {
            self.started = false;
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> usize {
            let remaining = self.frames_remaining.load(Ordering::Relaxed);
            if remaining == 0 {
                return 0;
            }
            let bpf = self.format.bytes_per_frame();
            let frames = (buf.len() / bpf).min(remaining);
            for b in buf[..frames * bpf].iter_mut() {
                *b = 0;
            }
            self.frames_remaining.fetch_sub(frames, Ordering::Relaxed);
            frames * bpf
        }
        fn native_format(&self) -> Option<AudioFormat> {
            Some(self.format)
        }
    }

    #[test]
    fn read_in_callback_mode_is_rejected() {
        let coordinator = Coordinator {
            target_format: AudioFormat::new(48_000, 2, SampleEncoding::Int16),
            shutdown: Arc::new(AtomicBool::new(true)),
            worker: None,
            stop_ack: None,
            output_queue: None,
            resource_exhausted: Arc::new(AtomicBool::new(false)),
            read_timeout: Duration::from_millis(10),
        };
        assert!(matches!(coordinator.read(1024), Err(CaptureError::InvalidArgument(_))));
    }

    #[test]
    fn stop_on_already_stopped_coordinator_is_a_noop() {
        let mut coordinator = Coordinator {
            target_format: AudioFormat::new(48_000, 2, SampleEncoding::Int16),
            shutdown: Arc::new(AtomicBool::new(true)),
            worker: None,
            stop_ack: None,
            output_queue: None,
            resource_exhausted: Arc::new(AtomicBool::new(false)),
            read_timeout: Duration::from_millis(10),
        };
        assert!(coordinator.stop().is_ok());
        assert!(coordinator.stop().is_ok());
    }

    #[test]
    fn worker_main_drains_silent_backend_into_output_queue() {
        let format = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let backend = Box::new(SilentBackend {
            format,
            started: true,
            frames_remaining: Arc::new(AtomicUsize::new(100)),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let resource_exhausted = Arc::new(AtomicBool::new(false));
        let queue = Arc::new(OutputQueue::new());
        let (tx, rx) = std::sync::mpsc::channel();

        let shutdown_clone = Arc::clone(&shutdown);
        let queue_clone = Some(Arc::clone(&queue));
        let handle = std::thread::spawn(move || {
            worker_main(backend, None, format, shutdown_clone, resource_exhausted, queue_clone, None, tx);
        });

        std::thread::sleep(Duration::from_millis(50));
        shutdown.store(true, Ordering::Release);
        let _ = rx.recv_timeout(Duration::from_secs(2));
        handle.join().unwrap();

        assert!(!queue.is_empty());
    }

    /// A backend that always reports the same fixed total frame count as
    /// "available", regardless of how many times `read` drains it — used to
    /// simulate a source that runs for a known wall-clock duration without
    /// actually sleeping in the test.
    struct FixedDurationSilentBackend {
        format: AudioFormat,
        frames_remaining: Arc<AtomicUsize>,
    }

    impl CaptureBackend for FixedDurationSilentBackend {
        fn start(&mut self) -> PlatformResult<()> {
            Ok(())
        }
        fn stop(&mut self) -> PlatformResult<()> {
            Ok(())
        }
        fn read(&mut self, buf: &mut [u8]) -> usize {
            let remaining = self.frames_remaining.load(Ordering::Relaxed);
            if remaining == 0 {
                return 0;
            }
            let bpf = self.format.bytes_per_frame();
            let frames = (buf.len() / bpf).min(remaining);
            buf[..frames * bpf].fill(0);
            self.frames_remaining.fetch_sub(frames, Ordering::Relaxed);
            frames * bpf
        }
        fn native_format(&self) -> Option<AudioFormat> {
            Some(self.format)
        }
    }

    /// Scenario: a silent source at the target format (no conversion) for
    /// 2 seconds worth of frames. The worker must deliver every produced
    /// zero byte to the output queue with none lost or duplicated.
    #[test]
    fn scenario_silent_source_yields_exact_byte_count_at_target_format() {
        let format = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let total_frames = 48_000 * 2; // 2 seconds at 48kHz
        let expected_bytes = total_frames * format.bytes_per_frame();

        let backend = Box::new(FixedDurationSilentBackend {
            format,
            frames_remaining: Arc::new(AtomicUsize::new(total_frames)),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let resource_exhausted = Arc::new(AtomicBool::new(false));
        let queue = Arc::new(OutputQueue::with_capacity(usize::MAX / 2));
        let (tx, rx) = std::sync::mpsc::channel();

        let shutdown_clone = Arc::clone(&shutdown);
        let queue_clone = Some(Arc::clone(&queue));
        let handle = std::thread::spawn(move || {
            worker_main(backend, None, format, shutdown_clone, resource_exhausted, queue_clone, None, tx);
        });

        // Give the worker enough idle-sleep cycles to fully drain the
        // fixed frame count, then signal shutdown.
        std::thread::sleep(Duration::from_millis(200));
        shutdown.store(true, Ordering::Release);
        let _ = rx.recv_timeout(Duration::from_secs(2));
        handle.join().unwrap();

        let mut total = 0usize;
        loop {
            let chunk = queue.pop(Duration::from_millis(1));
            if chunk.is_empty() {
                break;
            }
            total += chunk.len();
        }
        assert_eq!(total, expected_bytes);
    }

    /// Scenario: stop while a slow user callback is mid-flight. `stop` must
    /// return within its bound and the callback must never be interrupted
    /// partway (the worker loop is synchronous, so this is true by
    /// construction, but this test pins that behavior).
    #[test]
    fn scenario_stop_waits_for_in_flight_callback_to_complete() {
        let format = AudioFormat::new(48_000, 2, SampleEncoding::Int16);
        let backend = Box::new(FixedDurationSilentBackend {
            format,
            frames_remaining: Arc::new(AtomicUsize::new(usize::MAX / format.bytes_per_frame())),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        let resource_exhausted = Arc::new(AtomicBool::new(false));
        let (tx, rx) = std::sync::mpsc::channel();

        let completed_calls = Arc::new(AtomicUsize::new(0));
        let completed_calls_clone = Arc::clone(&completed_calls);
        let callback: DataCallback = Box::new(move |bytes, _frames| {
            assert!(!bytes.is_empty());
            std::thread::sleep(Duration::from_millis(50));
            completed_calls_clone.fetch_add(1, Ordering::Relaxed);
        });

        let shutdown_clone = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || {
            worker_main(backend, None, format, shutdown_clone, resource_exhausted, None, Some(callback), tx);
        });

        std::thread::sleep(Duration::from_millis(200));
        let stop_requested_at = Instant::now();
        shutdown.store(true, Ordering::Release);
        let _ = rx.recv_timeout(WORKER_STOP_TIMEOUT);
        handle.join().unwrap();

        assert!(stop_requested_at.elapsed() <= WORKER_STOP_TIMEOUT + Duration::from_millis(500));
        assert!(completed_calls.load(Ordering::Relaxed) > 0);
    }
}
