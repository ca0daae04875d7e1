//! Per-core hotplug statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Offline transition counters, one per possible core index
pub struct StatsRegistry {
    offline: BTreeMap<u32, AtomicU64>,
}

impl StatsRegistry {
    /// Create counters for the given core indices (possibly sparse)
    pub fn new(cores: impl IntoIterator<Item = u32>) -> Self {
        Self {
            offline: cores
                .into_iter()
                .map(|core| (core, AtomicU64::new(0)))
                .collect(),
        }
    }

    /// Count one offline transition
    pub fn record_offline(&self, core: u32) {
        match self.offline.get(&core) {
            Some(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            None => debug!("No offline counter for CPU{}", core),
        }
    }

    pub fn offline_count(&self, core: u32) -> u64 {
        self.offline
            .get(&core)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> CoreStats {
        CoreStats {
            times_offlined: self
                .offline
                .iter()
                .map(|(core, c)| (*core, c.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// Cumulative offline transitions by core index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStats {
    pub times_offlined: BTreeMap<u32, u64>,
}
