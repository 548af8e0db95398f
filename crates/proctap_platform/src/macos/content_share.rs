//! The macOS content-sharing `CaptureBackend`.
//!
//! No teacher precedent exists for this engine — it is grounded directly
//! on `original_source/src/proctap/backends/macos_screencapture.py`'s
//! `ScreenCaptureBackend`: resolve the target PID's bundle identifier,
//! spawn a helper binary parameterized `(bundle_id, sample_rate,
//! channels)` that captures via ScreenCaptureKit and streams raw
//! interleaved PCM on stdout, read that stream on a dedicated thread into
//! the shared ring buffer, and on stop send SIGTERM and escalate to
//! SIGKILL if the helper hasn't exited within two seconds.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{PlatformError, PlatformResult};
use crate::format::{AudioFormat, SampleEncoding};
use crate::ring_buffer::RingBuffer;
use crate::traits::CaptureBackend;

const RING_CAPACITY_BYTES: usize = 48_000 * 2 * 2 * 2; // 2s stereo int16
const SAMPLE_RATE_HZ: u32 = 48_000;
const CHANNEL_COUNT: u16 = 2;
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Environment variable overriding the helper binary's path; falls back to
/// `screencapture-audio` resolved via `PATH` when unset.
const HELPER_PATH_ENV: &str = "PROCTAP_SCREENCAPTURE_HELPER";

fn default_helper_path() -> String {
    std::env::var(HELPER_PATH_ENV).unwrap_or_else(|_| "screencapture-audio".to_string())
}

/// Infer a process's bundle identifier via `lsappinfo`, falling back to a
/// heuristic derived from its executable path for non-bundled processes.
fn bundle_id_from_pid(pid: u32) -> Option<String> {
    let output = Command::new("lsappinfo")
        .args(["info", "-only", "bundleid", &pid.to_string()])
        .output()
        .ok()?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();

        if let Some(rest) = stdout.split("\"CFBundleIdentifier\"=").nth(1) {
            let id = rest.trim().trim_matches('"');
            if !id.is_empty() && id != "NULL" {
                return Some(id.to_string());
            }
        }
        if let Some(rest) = stdout.split("bundleid=").nth(1) {
            let id = rest.trim().trim_matches('"');
            if !id.is_empty() && id != "NULL" {
                return Some(id.to_string());
            }
        }
    }

    let ps = Command::new("ps").args(["-p", &pid.to_string(), "-o", "comm="]).output().ok()?;
    if ps.status.success() {
        let comm = String::from_utf8_lossy(&ps.stdout).trim().to_string();
        if let Some(app_dir) = comm.split(".app/").next() {
            if comm.contains(".app/") {
                let app_name = app_dir.rsplit('/').next().unwrap_or(app_dir);
                return Some(format!("com.apple.{app_name}"));
            }
        }
    }
    None
}

pub fn is_available() -> bool {
    if !super::version::is_content_share_available() {
        return false;
    }
    Command::new("which")
        .arg(default_helper_path())
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub struct ContentShareEngine {
    pid: u32,
    bundle_id: Option<String>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
    ring: Arc<RingBuffer>,
    running: bool,
}

impl ContentShareEngine {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            bundle_id: None,
            child: None,
            reader: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            ring: Arc::new(RingBuffer::new(RING_CAPACITY_BYTES, 4)),
            running: false,
        }
    }
}

impl CaptureBackend for ContentShareEngine {
    fn start(&mut self) -> PlatformResult<()> {
        if self.running {
            return Ok(());
        }

        let bundle_id = bundle_id_from_pid(self.pid).ok_or(PlatformError::NoAudio)?;

        let helper_path = default_helper_path();
        let mut child = Command::new(&helper_path)
            .args([&bundle_id, &SAMPLE_RATE_HZ.to_string(), &CHANNEL_COUNT.to_string()])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PlatformError::Unavailable(format!("failed to spawn {helper_path}: {e}"))
            })?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            PlatformError::Internal("helper process has no stdout pipe".into())
        })?;

        self.stop_flag.store(false, Ordering::Release);
        let stop_flag = Arc::clone(&self.stop_flag);
        let ring = Arc::clone(&self.ring);
        let pid = self.pid;

        let reader = std::thread::Builder::new()
            .name(format!("proctap-screencap-{pid}"))
            .spawn(move || {
                // 10ms chunks at the negotiated rate, matching the helper's own cadence.
                let chunk_bytes =
                    (SAMPLE_RATE_HZ as usize * CHANNEL_COUNT as usize * 2) / 100;
                let mut buf = vec![0u8; chunk_bytes];
                while !stop_flag.load(Ordering::Acquire) {
                    match stdout.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => ring.push(&buf[..n]),
                        Err(e) => {
                            warn!(pid, "screencapture helper stdout read error: {e}");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| PlatformError::Internal(format!("failed to spawn reader thread: {e}")))?;

        debug!(pid, bundle_id, "content-sharing capture started");

        self.bundle_id = Some(bundle_id);
        self.reader = Some(reader);
        self.child = Some(child);
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> PlatformResult<()> {
        if !self.running {
            return Ok(());
        }

        self.stop_flag.store(true, Ordering::Release);

        if let Some(mut child) = self.child.take() {
            // SAFETY: std::process::Child::id() is always a live PID until reaped.
            unsafe {
                libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
            }

            let deadline = Instant::now() + TERMINATE_GRACE;
            loop {
                match child.try_wait() {
                    Ok(Some(_)) => break,
                    Ok(None) if Instant::now() < deadline => {
                        std::thread::sleep(Duration::from_millis(20));
                    }
                    Ok(None) => {
                        warn!(pid = self.pid, "screencapture helper did not exit, killing");
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    Err(e) => {
                        warn!(pid = self.pid, "error waiting on screencapture helper: {e}");
                        break;
                    }
                }
            }
        }

        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }

        self.bundle_id = None;
        self.running = false;
        debug!(pid = self.pid, "content-sharing capture stopped");
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
        self.running
            .then(|| AudioFormat::new(SAMPLE_RATE_HZ, CHANNEL_COUNT, SampleEncoding::Int16))
    }
}

impl Drop for ContentShareEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
