//! Run-queue load sampling

use crate::config::SamplerConfig;
use crate::error::SampleError;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Source of the per-poll load signal
pub trait LoadSampler: Send + Sync {
    /// Average load since the previous call; the accumulator is cleared
    /// in the same step.
    fn sample_and_reset(&self) -> Result<u32, SampleError>;
}

#[derive(Debug, Default)]
struct Accumulator {
    sum: u64,
    count: u64,
}

/// Averages `procs_running` from `/proc/stat`
pub struct RunQueueSampler {
    stat_path: PathBuf,
    scale: u32,
    acc: Mutex<Accumulator>,
}

impl RunQueueSampler {
    /// Create new run-queue sampler
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            stat_path: config.stat_path.clone(),
            scale: config.scale,
            acc: Mutex::new(Accumulator::default()),
        }
    }

    /// Read the run queue once and fold it into the average.
    ///
    /// `procs_running` includes the reading task itself, so an idle system
    /// reads 1 and records 0.
    pub fn record(&self) -> Result<u32, SampleError> {
        let content = fs::read_to_string(&self.stat_path)?;
        let running = parse_procs_running(&content)?;
        let load = running.saturating_sub(1).saturating_mul(self.scale);

        let mut acc = self.acc.lock().unwrap_or_else(PoisonError::into_inner);
        acc.sum += u64::from(load);
        acc.count += 1;
        Ok(load)
    }

    /// Sampling loop
    pub async fn run(self: Arc<Self>, interval_ms: u32) {
        use tokio::time::{interval, Duration};

        info!(
            "Run-queue sampling from {} every {}ms",
            self.stat_path.display(),
            interval_ms
        );
        let mut interval = interval(Duration::from_millis(u64::from(interval_ms.max(1))));

        loop {
            interval.tick().await;

            if let Err(e) = self.record() {
                debug!("Run-queue sample failed: {}", e);
            }
        }
    }
}

impl LoadSampler for RunQueueSampler {
    fn sample_and_reset(&self) -> Result<u32, SampleError> {
        let mut acc = self.acc.lock().unwrap_or_else(PoisonError::into_inner);
        let taken = std::mem::take(&mut *acc);
        drop(acc);

        if taken.count == 0 {
            return Err(SampleError::NoSamples);
        }
        Ok((taken.sum / taken.count) as u32)
    }
}

/// Parse the `procs_running` line of /proc/stat
fn parse_procs_running(content: &str) -> Result<u32, SampleError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("procs_running"))
        .ok_or_else(|| SampleError::Parse("procs_running missing".to_string()))?;

    line.split_whitespace()
        .nth(1)
        .ok_or_else(|| SampleError::Parse(format!("no value in {:?}", line)))?
        .parse()
        .map_err(|e| SampleError::Parse(format!("{:?}: {}", line, e)))
}
