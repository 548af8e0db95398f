//! The capability trait every concrete platform engine implements: three
//! operations (start, stop, read) plus a native_format probe. Concrete
//! backends are tagged variants behind the trait rather than an open-ended
//! plugin registry.

use crate::error::PlatformResult;
use crate::format::AudioFormat;

/// A single-process audio capture engine.
///
/// Implementors own every OS handle they acquire during [`start`](Self::start)
/// and must release all of them — in reverse acquisition order, attempting
/// every release even if an earlier one failed — by the time
/// [`stop`](Self::stop) returns, including on a failed `start`.
pub trait CaptureBackend: Send {
    /// Open the capture session: acquire OS handles, spawn the internal
    /// producer thread that feeds the backend's ring buffer, and return once
    /// the native format is known. On failure, nothing acquired so far may
    /// remain held.
    fn start(&mut self) -> PlatformResult<()>;

    /// Close the capture session and release every resource acquired in
    /// `start`. Idempotent: calling `stop` on an already-stopped (or
    /// never-started) backend is a no-op that returns `Ok(())`.
    fn stop(&mut self) -> PlatformResult<()>;

    /// Consumer-side read: pop up to `buf.len()` bytes (rounded down to a
    /// whole-frame multiple) into `buf`, returning the number of bytes
    /// written. Returns `0` when nothing is available or the backend is not
    /// running. Never blocks.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// The format the backend actually delivers, if known. `None` before
    /// `start` has completed.
    fn native_format(&self) -> Option<AudioFormat>;
}
