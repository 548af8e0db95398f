//! Per-process audio capture: format conversion, the bounded output queue,
//! and the [`Coordinator`] public capture object, built on top of
//! `proctap_platform`'s backends.

pub mod config;
pub mod converter;
pub mod coordinator;
pub mod error;
pub mod output_queue;

pub use config::{AudioFormat, ResamplingQuality, SampleEncoding};
pub use converter::Converter;
pub use coordinator::{Coordinator, DataCallback};
pub use error::{CaptureError, CaptureResult};
pub use output_queue::OutputQueue;
