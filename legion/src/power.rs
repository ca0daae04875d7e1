//! Enable/disable and display suspend handling
//!
//! Every transition that touches the online set outside the control loop
//! first cancels the loop and waits for an in-flight iteration to finish.
//! Transitions are serialized against each other by one async lock.

use crate::controller::ControlLoop;
use crate::cores::{CoreManager, PRIMARY_CORE};
use crate::error::CoreError;
use crate::worker::LoopHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Controller run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Hotplug off, every core online
    Disabled,
    /// Polling
    Enabled,
    /// Enabled but the display is off; no polling
    Suspended,
}

#[derive(Default)]
struct PowerInner {
    enabled: bool,
    display_off: bool,
    /// Secondary cores were parked by the single-core suspend policy
    parked: bool,
    worker: Option<LoopHandle>,
}

impl PowerInner {
    fn state(&self) -> RunState {
        match (self.enabled, self.display_off) {
            (false, _) => RunState::Disabled,
            (true, true) => RunState::Suspended,
            (true, false) => RunState::Enabled,
        }
    }

    async fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel().await;
        }
    }
}

/// Drives the control loop's lifecycle
pub struct PowerStateMachine {
    control: Arc<ControlLoop>,
    startup_delay: Duration,
    inner: Mutex<PowerInner>,
}

impl PowerStateMachine {
    /// Create a state machine in the Disabled state
    pub fn new(control: Arc<ControlLoop>, startup_delay: Duration) -> Self {
        Self {
            control,
            startup_delay,
            inner: Mutex::new(PowerInner::default()),
        }
    }

    pub fn control(&self) -> &Arc<ControlLoop> {
        &self.control
    }

    pub async fn state(&self) -> RunState {
        self.inner.lock().await.state()
    }

    /// Whether a loop iteration is pending
    pub async fn is_scheduled(&self) -> bool {
        self.inner
            .lock()
            .await
            .worker
            .as_ref()
            .is_some_and(|w| !w.is_finished())
    }

    /// Master toggle
    pub async fn set_enabled(&self, enabled: bool) -> Result<RunState, CoreError> {
        if enabled {
            self.enable().await
        } else {
            Ok(self.disable().await)
        }
    }

    /// Start hotplugging after the startup delay.
    ///
    /// Refused on a platform with a single possible core; the state stays
    /// Disabled and nothing is scheduled.
    pub async fn enable(&self) -> Result<RunState, CoreError> {
        let mut inner = self.inner.lock().await;
        if inner.enabled {
            return Ok(inner.state());
        }
        if self.control.cores().total_cores() < 2 {
            return Err(CoreError::SingleCore);
        }
        inner.enabled = true;

        if inner.display_off {
            // Picked up by the next resume
            self.park(&mut inner);
            info!("Legion enabled while display is off");
        } else {
            inner.worker = Some(LoopHandle::spawn(self.control.clone(), self.startup_delay));
            info!(
                "Legion enabled, first poll in {}ms",
                self.startup_delay.as_millis()
            );
        }
        Ok(inner.state())
    }

    /// Stop hotplugging and bring every core online
    pub async fn disable(&self) -> RunState {
        let mut inner = self.inner.lock().await;
        if !inner.enabled {
            return inner.state();
        }
        inner.enabled = false;

        inner.stop_worker().await;
        self.online_all();
        inner.parked = false;

        info!("Legion disabled");
        inner.state()
    }

    /// Display went off
    pub async fn on_suspend(&self) -> RunState {
        let mut inner = self.inner.lock().await;
        if inner.display_off {
            debug!("Duplicate suspend ignored");
            return inner.state();
        }
        inner.display_off = true;

        if inner.enabled {
            inner.stop_worker().await;
            self.park(&mut inner);
            info!("Legion suspended");
        }
        inner.state()
    }

    /// Display came back on
    pub async fn on_resume(&self) -> RunState {
        let mut inner = self.inner.lock().await;
        if !inner.display_off {
            debug!("Duplicate resume ignored");
            return inner.state();
        }
        inner.display_off = false;

        if inner.enabled {
            if inner.parked {
                self.online_all();
                inner.parked = false;
            }
            let delay = self.poll_interval();
            inner.worker = Some(LoopHandle::spawn(self.control.clone(), delay));
            info!("Legion resumed");
        }
        inner.state()
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(
            self.control.tunables().snapshot().poll_interval_ms,
        ))
    }

    /// Apply the single-core suspend policy; loop must already be stopped
    fn park(&self, inner: &mut PowerInner) {
        if !self.control.tunables().snapshot().force_single_core_on_suspend {
            return;
        }

        let cores = self.control.cores();
        for core in cores.online_cores() {
            if core == PRIMARY_CORE {
                continue;
            }
            if let Err(e) = cores.take_offline(core) {
                warn!("Failed to park CPU{}: {}", core, e);
            }
        }
        inner.parked = true;
    }

    /// Bring every secondary core online; loop must already be stopped
    fn online_all(&self) {
        let cores = self.control.cores();
        let online = cores.online_cores();
        for core in cores.possible_cores() {
            if core == PRIMARY_CORE || online.contains(&core) {
                continue;
            }
            if let Err(e) = cores.bring_online(core) {
                warn!("Failed to restore CPU{}: {}", core, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::cores::fake::{Call, FakeCores};
    use crate::sampler::scripted::ScriptedSampler;
    use crate::tunables::Tunables;
    use std::collections::BTreeSet;

    fn machine(cores: Arc<FakeCores>, config: ControllerConfig) -> PowerStateMachine {
        let control = Arc::new(ControlLoop::new(
            Arc::new(Tunables::new(config.resolve(cores.total_cores()))),
            Arc::new(ScriptedSampler::constant(10)),
            cores,
            None,
        ));
        PowerStateMachine::new(control, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_enable_schedules_loop() {
        let cores = Arc::new(FakeCores::new(4, 2));
        let power = machine(cores.clone(), ControllerConfig::default());

        assert_eq!(power.state().await, RunState::Disabled);
        assert!(!power.is_scheduled().await);

        assert_eq!(power.enable().await.unwrap(), RunState::Enabled);
        assert!(power.is_scheduled().await);

        // Duplicate enable keeps the single pending schedule
        assert_eq!(power.enable().await.unwrap(), RunState::Enabled);
        assert!(cores.calls().is_empty());
    }

    #[tokio::test]
    async fn test_enable_refused_on_single_core() {
        let cores = Arc::new(FakeCores::new(1, 1));
        let power = machine(cores.clone(), ControllerConfig::default());

        assert!(matches!(power.enable().await, Err(CoreError::SingleCore)));
        assert!(matches!(power.set_enabled(true).await, Err(CoreError::SingleCore)));
        assert_eq!(power.state().await, RunState::Disabled);
        assert!(!power.is_scheduled().await);
        assert!(cores.calls().is_empty());
    }

    #[tokio::test]
    async fn test_suspend_parks_secondary_cores() {
        let cores = Arc::new(FakeCores::new(4, 4));
        let power = machine(cores.clone(), ControllerConfig::default());
        power.enable().await.unwrap();

        assert_eq!(power.on_suspend().await, RunState::Suspended);
        assert_eq!(cores.online_cores(), BTreeSet::from([0]));
        assert!(!power.is_scheduled().await);
        assert!(!cores.calls().contains(&Call::Offline(0)));

        // Duplicate suspend is a no-op
        let calls = cores.calls().len();
        assert_eq!(power.on_suspend().await, RunState::Suspended);
        assert_eq!(cores.calls().len(), calls);
    }

    #[tokio::test]
    async fn test_resume_restores_and_reschedules() {
        let cores = Arc::new(FakeCores::new(4, 4));
        let power = machine(
            cores.clone(),
            ControllerConfig {
                poll_interval_ms: 3_600_000,
                ..Default::default()
            },
        );
        power.enable().await.unwrap();
        power.on_suspend().await;

        assert_eq!(power.on_resume().await, RunState::Enabled);
        assert_eq!(cores.online_count(), 4);
        assert!(power.is_scheduled().await);

        assert_eq!(power.on_resume().await, RunState::Enabled);
    }

    #[tokio::test]
    async fn test_suspend_without_single_core_policy() {
        let cores = Arc::new(FakeCores::new(4, 3));
        let power = machine(
            cores.clone(),
            ControllerConfig {
                force_single_core_on_suspend: false,
                ..Default::default()
            },
        );
        power.enable().await.unwrap();

        power.on_suspend().await;
        assert_eq!(cores.online_count(), 3);
        assert!(!power.is_scheduled().await);

        power.on_resume().await;
        assert_eq!(cores.online_count(), 3);
        assert!(power.is_scheduled().await);
    }

    #[tokio::test]
    async fn test_disable_restores_every_core() {
        let cores = Arc::new(FakeCores::new(4, 2));
        let power = machine(
            cores.clone(),
            ControllerConfig {
                max_active_cores: 2,
                ..Default::default()
            },
        );
        power.enable().await.unwrap();

        assert_eq!(power.disable().await, RunState::Disabled);
        assert_eq!(cores.online_count(), 4);
        assert!(!power.is_scheduled().await);
    }

    #[tokio::test]
    async fn test_disable_while_suspended() {
        let cores = Arc::new(FakeCores::new(4, 4));
        let power = machine(cores.clone(), ControllerConfig::default());
        power.enable().await.unwrap();
        power.on_suspend().await;

        assert_eq!(power.set_enabled(false).await.unwrap(), RunState::Disabled);
        assert_eq!(cores.online_count(), 4);

        // Display events while disabled never actuate
        let calls = cores.calls().len();
        power.on_resume().await;
        power.on_suspend().await;
        assert_eq!(cores.calls().len(), calls);
        assert_eq!(power.state().await, RunState::Disabled);
    }

    #[tokio::test]
    async fn test_enable_while_display_off() {
        let cores = Arc::new(FakeCores::new(4, 4));
        let power = machine(cores.clone(), ControllerConfig::default());

        power.on_suspend().await;
        assert_eq!(cores.online_count(), 4);

        assert_eq!(power.enable().await.unwrap(), RunState::Suspended);
        assert_eq!(cores.online_count(), 1);
        assert!(!power.is_scheduled().await);

        assert_eq!(power.on_resume().await, RunState::Enabled);
        assert_eq!(cores.online_count(), 4);
        assert!(power.is_scheduled().await);
    }

    #[tokio::test]
    async fn test_suspend_waits_for_running_loop() {
        let cores = Arc::new(FakeCores::new(4, 1));
        let control = Arc::new(ControlLoop::new(
            Arc::new(Tunables::new(
                ControllerConfig {
                    poll_interval_ms: 1,
                    ..Default::default()
                }
                .resolve(4),
            )),
            Arc::new(ScriptedSampler::constant(90)),
            cores.clone(),
            None,
        ));
        let power = PowerStateMachine::new(control, Duration::from_millis(1));
        power.enable().await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        power.on_suspend().await;

        // Nothing runs after the transition returned
        assert_eq!(cores.online_cores(), BTreeSet::from([0]));
        let calls = cores.calls().len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cores.calls().len(), calls);
        assert_eq!(cores.online_count(), 1);
    }
}
