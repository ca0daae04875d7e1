//! The hotplug decision loop
//!
//! One call to [`ControlLoop::poll`] is one iteration:
//!
//! ```text
//! cycle += 1
//! load   = sampler.sample_and_reset()        (error => 0)
//! online = |online cores|
//!
//! if online < max && load >= up:
//!     if cycle >= cycles_up:   online lowest offline core, cycle = 0
//! else if online > min && load <= down:
//!     if cycle >= cycles_down: offline slowest core > 0, cycle = 0
//! ```
//!
//! Scale-up is evaluated first. A refused actuation leaves the cycle count
//! untouched and is not retried until the next poll.

use crate::cores::{CoreManager, PRIMARY_CORE};
use crate::hysteresis::HysteresisState;
use crate::sampler::LoadSampler;
use crate::stats::StatsRegistry;
use crate::tunables::Tunables;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Direction of a hotplug request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Online,
    Offline,
}

/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing requested
    Hold,
    /// Core brought online
    Onlined(u32),
    /// Core taken offline
    Offlined(u32),
    /// Platform refused the request
    Refused(Action, u32),
}

/// Most recent successful actuation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastAction {
    pub action: Action,
    pub core: u32,
    pub load: u32,
    pub at: DateTime<Local>,
}

/// Load-driven hotplug controller
pub struct ControlLoop {
    tunables: Arc<Tunables>,
    sampler: Arc<dyn LoadSampler>,
    cores: Arc<dyn CoreManager>,
    stats: Option<Arc<StatsRegistry>>,
    hysteresis: Mutex<HysteresisState>,
    last_action: Mutex<Option<LastAction>>,
}

impl ControlLoop {
    pub fn new(
        tunables: Arc<Tunables>,
        sampler: Arc<dyn LoadSampler>,
        cores: Arc<dyn CoreManager>,
        stats: Option<Arc<StatsRegistry>>,
    ) -> Self {
        Self {
            tunables,
            sampler,
            cores,
            stats,
            hysteresis: Mutex::new(HysteresisState::new()),
            last_action: Mutex::new(None),
        }
    }

    pub fn tunables(&self) -> &Arc<Tunables> {
        &self.tunables
    }

    pub fn cores(&self) -> &Arc<dyn CoreManager> {
        &self.cores
    }

    pub fn stats(&self) -> Option<&Arc<StatsRegistry>> {
        self.stats.as_ref()
    }

    pub fn cycle_count(&self) -> u32 {
        self.hysteresis
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cycle_count()
    }

    pub fn last_action(&self) -> Option<LastAction> {
        self.last_action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one iteration
    pub fn poll(&self) -> PollOutcome {
        let config = self.tunables.snapshot();
        let mut hysteresis = self.hysteresis.lock().unwrap_or_else(PoisonError::into_inner);

        let cycle = hysteresis.tick();

        let load = match self.sampler.sample_and_reset() {
            Ok(load) => load,
            Err(e) => {
                debug!("Load sample unavailable, assuming idle: {}", e);
                0
            }
        };

        let online = self.cores.online_cores();
        let online_count = online.len() as u32;

        let (action, core) = if online_count < config.max_active_cores
            && load >= config.load_threshold_up
        {
            if !hysteresis.ready(config.cycles_required_up) {
                return PollOutcome::Hold;
            }
            let Some(core) = self.first_offline(&online) else {
                return PollOutcome::Hold;
            };
            (Action::Online, core)
        } else if online_count > config.min_active_cores && load <= config.load_threshold_down {
            if !hysteresis.ready(config.cycles_required_down) {
                return PollOutcome::Hold;
            }
            let Some(core) = self.slowest_online(&online) else {
                return PollOutcome::Hold;
            };
            (Action::Offline, core)
        } else {
            return PollOutcome::Hold;
        };

        let result = match action {
            Action::Online => self.cores.bring_online(core),
            Action::Offline => self.cores.take_offline(core),
        };

        if let Err(e) = result {
            warn!("CPU{} {:?} request refused (load {}): {}", core, action, load, e);
            return PollOutcome::Refused(action, core);
        }

        hysteresis.reset();
        drop(hysteresis);

        if action == Action::Offline {
            if let Some(stats) = &self.stats {
                stats.record_offline(core);
            }
        }

        info!(
            "CPU{} {} (load {}, {} online, cycle {})",
            core,
            if action == Action::Online { "on" } else { "off" },
            load,
            online_count,
            cycle
        );

        *self.last_action.lock().unwrap_or_else(PoisonError::into_inner) = Some(LastAction {
            action,
            core,
            load,
            at: Local::now(),
        });

        match action {
            Action::Online => PollOutcome::Onlined(core),
            Action::Offline => PollOutcome::Offlined(core),
        }
    }

    /// Lowest-indexed secondary core that is not online
    fn first_offline(&self, online: &BTreeSet<u32>) -> Option<u32> {
        self.cores
            .possible_cores()
            .into_iter()
            .find(|core| *core != PRIMARY_CORE && !online.contains(core))
    }

    /// Online secondary core with the lowest clock; ties go to the lower index
    fn slowest_online(&self, online: &BTreeSet<u32>) -> Option<u32> {
        let mut slowest: Option<(u32, u64)> = None;

        for &core in online.iter().filter(|c| **c != PRIMARY_CORE) {
            let rate = self.cores.clock_rate(core);
            match slowest {
                Some((_, slow_rate)) if rate >= slow_rate => {}
                _ => slowest = Some((core, rate)),
            }
        }

        slowest.map(|(core, _)| core)
    }
}
