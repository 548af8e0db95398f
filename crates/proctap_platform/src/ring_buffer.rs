//! Lock-free SPSC byte ring buffer with drop-oldest overflow.
//!
//! Hands audio off from a real-time OS callback thread (the producer) to a
//! worker thread (the consumer) without blocking, allocating, or taking
//! locks on the producer side.
//!
//! One implementation serves both the macOS tap/content-sharing engines and
//! the Windows WASAPI engine, storing raw bytes rather than `f32` samples so
//! any of the three can reuse it regardless of native sample format.
//! Overflow always drops the *oldest* frames, keeping the most recent audio
//! rather than the newly arriving audio.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Single-producer/single-consumer byte queue, fixed capacity, frame-aligned,
/// drop-oldest on overflow.
///
/// # Safety / concurrency contract
///
/// Exactly one thread may call [`push`](Self::push) and exactly one thread
/// (which may differ from the first) may call [`pop`](Self::pop). No other
/// concurrent access is permitted. Both methods are wait-free.
pub struct RingBuffer {
    buf: UnsafeCell<Vec<u8>>,
    capacity: usize,
    bytes_per_frame: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

// SAFETY: access to `buf` is disjoint by construction - the producer only
// writes the region it is about to publish via `write_pos`, the consumer
// only reads the region already published and not yet retired via
// `read_pos`. The single-producer/single-consumer contract above is what
// makes this sound; it is not enforced by the type system.
unsafe impl Sync for RingBuffer {}
unsafe impl Send for RingBuffer {}

impl RingBuffer {
    /// Create a ring buffer whose capacity is `capacity_bytes` rounded down
    /// to a whole number of frames of `bytes_per_frame` bytes (minimum one
    /// frame).
    pub fn new(capacity_bytes: usize, bytes_per_frame: usize) -> Self {
        let bytes_per_frame = bytes_per_frame.max(1);
        let frames = (capacity_bytes / bytes_per_frame).max(1);
        let capacity = frames * bytes_per_frame;
        Self {
            buf: UnsafeCell::new(vec![0u8; capacity]),
            capacity,
            bytes_per_frame,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_frame
    }

    /// Advisory count of readable bytes.
    pub fn available(&self) -> usize {
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Acquire);
        w.wrapping_sub(r)
    }

    /// Producer side. Writes as many whole frames from `data` as fit; if
    /// `data` (rounded down to whole frames) would overflow the buffer,
    /// advances the read index by whole frames first to make room
    /// (drop-oldest). Never blocks, never allocates, never fails.
    ///
    /// `data` whose length is not a whole-frame multiple has its trailing
    /// partial frame silently ignored — partial frames are never stored.
    pub fn push(&self, data: &[u8]) {
        let frame = self.bytes_per_frame;
        let aligned_len = data.len() - (data.len() % frame);
        if aligned_len == 0 {
            return;
        }
        // If the incoming chunk alone exceeds capacity, only the most
        // recent `capacity` bytes of it (frame-aligned) can ever be kept.
        let data = if aligned_len > self.capacity {
            let skip = aligned_len - self.capacity;
            &data[skip..skip + self.capacity]
        } else {
            &data[..aligned_len]
        };

        let mut w = self.write_pos.load(Ordering::Relaxed);
        let mut r = self.read_pos.load(Ordering::Acquire);

        // Drop-oldest: advance the read index by whole frames until there
        // is room for `data`.
        let occupied = w.wrapping_sub(r);
        let free = self.capacity - occupied;
        if data.len() > free {
            let to_drop = data.len() - free;
            let frames_to_drop = to_drop.div_ceil(frame);
            r = r.wrapping_add(frames_to_drop * frame);
            self.read_pos.store(r, Ordering::Release);
        }

        // SAFETY: single producer; the region [w, w+data.len()) modulo
        // capacity is not being read concurrently because we just ensured
        // (via the drop-oldest advance above) that read_pos has moved past
        // any of it the consumer might still be reading.
        let buf = unsafe { &mut *self.buf.get() };
        let cap = self.capacity;
        for (i, &byte) in data.iter().enumerate() {
            buf[(w + i) % cap] = byte;
        }
        w = w.wrapping_add(data.len());
        self.write_pos.store(w, Ordering::Release);
    }

    /// Consumer side. Returns up to `max_bytes`, rounded down to a
    /// whole-frame multiple. Returns an empty vector when nothing is
    /// available. Never blocks.
    pub fn pop(&self, max_bytes: usize) -> Vec<u8> {
        let frame = self.bytes_per_frame;
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Relaxed);
        let available = w.wrapping_sub(r);
        let want = max_bytes - (max_bytes % frame);
        let take = available.min(want);
        if take == 0 {
            return Vec::new();
        }

        // SAFETY: single consumer; region [r, r+take) has already been
        // published by the producer (write_pos observed via Acquire above).
        let buf = unsafe { &*self.buf.get() };
        let cap = self.capacity;
        let mut out = Vec::with_capacity(take);
        for i in 0..take {
            out.push(buf[(r + i) % cap]);
        }
        self.read_pos.store(r.wrapping_add(take), Ordering::Release);
        out
    }
}
