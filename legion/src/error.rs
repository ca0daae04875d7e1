//! Error types for Legion

use thiserror::Error;

/// Core topology and actuation errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Core 0 is the primary core and never goes offline
    #[error("CPU0 is the primary core and cannot be taken offline")]
    PrimaryCore,

    /// Index outside the platform's possible cores
    #[error("CPU{0} does not exist on this platform")]
    NoSuchCore(u32),

    /// Platform refused the transition
    #[error("CPU{core} refused to go {target}: {reason}")]
    Refused {
        core: u32,
        target: &'static str,
        reason: String,
    },

    /// Fewer than two possible cores; hotplug has nothing to act on
    #[error("nothing to hotplug on a single-core platform")]
    SingleCore,

    /// Malformed cpulist (e.g. "0-3,5")
    #[error("invalid cpu list {0:?}")]
    InvalidCpuList(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load sampling errors
#[derive(Debug, Error)]
pub enum SampleError {
    /// Nothing was recorded since the last read
    #[error("no load samples recorded since last read")]
    NoSamples,

    /// Run-queue source could not be parsed
    #[error("failed to parse run-queue source: {0}")]
    Parse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration surface errors
#[derive(Debug, Error)]
pub enum TunableError {
    #[error("unknown tunable: {0}")]
    Unknown(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}
