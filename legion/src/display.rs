//! Display power state monitoring

use crate::config::DisplayConfig;
use crate::power::PowerStateMachine;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Display power state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    On,
    Off,
}

/// Polls a sysfs attribute and forwards display on/off edges
pub struct DisplayMonitor {
    path: PathBuf,
    off_values: Vec<String>,
    last: Option<DisplayState>,
}

impl DisplayMonitor {
    /// Create a monitor, or None when no state path is configured
    pub fn new(config: &DisplayConfig) -> Option<Self> {
        let path = config.state_path.clone()?;
        Some(Self {
            path,
            off_values: config.off_values.clone(),
            last: None,
        })
    }

    /// Read the current display state
    pub fn read(&self) -> Option<DisplayState> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let value = content.trim();
                if self.off_values.iter().any(|v| v == value) {
                    Some(DisplayState::Off)
                } else {
                    Some(DisplayState::On)
                }
            }
            Err(e) => {
                debug!("Failed to read display state {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Return the new state if it changed since the last call
    pub fn poll_change(&mut self) -> Option<DisplayState> {
        let state = self.read()?;
        if self.last == Some(state) {
            return None;
        }
        self.last = Some(state);
        Some(state)
    }

    /// Monitoring loop
    pub async fn run(mut self, power: Arc<PowerStateMachine>, interval_ms: u32) {
        use tokio::time::{interval, Duration};

        info!("Watching display state at {}", self.path.display());
        let mut interval = interval(Duration::from_millis(u64::from(interval_ms.max(1))));

        loop {
            interval.tick().await;

            match self.poll_change() {
                Some(DisplayState::Off) => {
                    power.on_suspend().await;
                }
                Some(DisplayState::On) => {
                    power.on_resume().await;
                }
                None => {}
            }
        }
    }
}
