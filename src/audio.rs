//! Audio capture
//!
//! Device selection and the live-metered recording buffer.

pub mod recorder;

pub use recorder::{CaptureOutcome, Recorder};

/// Capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 48_000;
