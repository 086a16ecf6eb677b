//! Playback engines.
//!
//! - [`local`] - on-device synthesis, chunk by chunk, with a watchdog
//! - [`remote`] - audio generated by the TTS proxy, prefetched one chunk ahead

pub mod local;
pub mod remote;

/// How a driver run ended. Drivers never surface errors any other way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    Completed,
    /// The session was stopped or replaced. Nothing to report.
    Cancelled,
    /// A user-visible failure message.
    Failed(String),
    QuotaExceeded { reset_unix: Option<i64> },
}
