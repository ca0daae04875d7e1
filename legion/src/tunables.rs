//! Runtime tunables surface
//!
//! Each controller parameter can be read and written by name while the
//! daemon runs. Writes land on the next poll. Values are not checked
//! against each other: `min_active_cores > max_active_cores` is accepted and
//! simply disables scale-down.

use crate::config::ControllerConfig;
use crate::error::TunableError;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// A named controller parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tunable {
    PollIntervalMs,
    ForceSingleCoreOnSuspend,
    MinActiveCores,
    MaxActiveCores,
    LoadThresholdUp,
    LoadThresholdDown,
    CyclesRequiredUp,
    CyclesRequiredDown,
}

impl Tunable {
    pub const ALL: [Tunable; 8] = [
        Tunable::PollIntervalMs,
        Tunable::ForceSingleCoreOnSuspend,
        Tunable::MinActiveCores,
        Tunable::MaxActiveCores,
        Tunable::LoadThresholdUp,
        Tunable::LoadThresholdDown,
        Tunable::CyclesRequiredUp,
        Tunable::CyclesRequiredDown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tunable::PollIntervalMs => "poll_interval_ms",
            Tunable::ForceSingleCoreOnSuspend => "force_single_core_on_suspend",
            Tunable::MinActiveCores => "min_active_cores",
            Tunable::MaxActiveCores => "max_active_cores",
            Tunable::LoadThresholdUp => "load_threshold_up",
            Tunable::LoadThresholdDown => "load_threshold_down",
            Tunable::CyclesRequiredUp => "cycles_required_up",
            Tunable::CyclesRequiredDown => "cycles_required_down",
        }
    }

    fn is_flag(self) -> bool {
        matches!(self, Tunable::ForceSingleCoreOnSuspend)
    }

    fn get(self, config: &ControllerConfig) -> u32 {
        match self {
            Tunable::PollIntervalMs => config.poll_interval_ms,
            Tunable::ForceSingleCoreOnSuspend => u32::from(config.force_single_core_on_suspend),
            Tunable::MinActiveCores => config.min_active_cores,
            Tunable::MaxActiveCores => config.max_active_cores,
            Tunable::LoadThresholdUp => config.load_threshold_up,
            Tunable::LoadThresholdDown => config.load_threshold_down,
            Tunable::CyclesRequiredUp => config.cycles_required_up,
            Tunable::CyclesRequiredDown => config.cycles_required_down,
        }
    }

    fn set(self, config: &mut ControllerConfig, value: u32) {
        match self {
            Tunable::PollIntervalMs => config.poll_interval_ms = value,
            Tunable::ForceSingleCoreOnSuspend => config.force_single_core_on_suspend = value != 0,
            Tunable::MinActiveCores => config.min_active_cores = value,
            Tunable::MaxActiveCores => config.max_active_cores = value,
            Tunable::LoadThresholdUp => config.load_threshold_up = value,
            Tunable::LoadThresholdDown => config.load_threshold_down = value,
            Tunable::CyclesRequiredUp => config.cycles_required_up = value,
            Tunable::CyclesRequiredDown => config.cycles_required_down = value,
        }
    }

    /// Parse operator input: an unsigned decimal, or true/false for flags
    fn parse(self, input: &str) -> Result<u32, TunableError> {
        let trimmed = input.trim();
        if self.is_flag() {
            match trimmed {
                "true" | "y" | "Y" => return Ok(1),
                "false" | "n" | "N" => return Ok(0),
                _ => {}
            }
        }
        trimmed.parse().map_err(|_| TunableError::InvalidValue {
            name: self.name().to_string(),
            value: input.to_string(),
        })
    }
}

impl FromStr for Tunable {
    type Err = TunableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tunable::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| TunableError::Unknown(s.to_string()))
    }
}

/// Shared, live controller parameters
#[derive(Debug, Default)]
pub struct Tunables {
    inner: RwLock<ControllerConfig>,
}

impl Tunables {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            inner: RwLock::new(config),
        }
    }

    /// Copy of the current parameters
    pub fn snapshot(&self) -> ControllerConfig {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read one parameter by name
    pub fn get(&self, name: &str) -> Result<u32, TunableError> {
        let tunable: Tunable = name.parse()?;
        Ok(tunable.get(&self.snapshot()))
    }

    /// Write one parameter by name. Malformed input leaves the old value.
    pub fn set(&self, name: &str, input: &str) -> Result<u32, TunableError> {
        let tunable: Tunable = name.parse()?;
        let value = tunable.parse(input)?;

        let mut config = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        tunable.set(&mut config, value);
        info!("Tunable {} set to {}", tunable.name(), value);
        Ok(value)
    }

    /// Every parameter with its current value
    pub fn list(&self) -> BTreeMap<String, u32> {
        let config = self.snapshot();
        Tunable::ALL
            .into_iter()
            .map(|t| (t.name().to_string(), t.get(&config)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_by_name() {
        let tunables = Tunables::new(ControllerConfig::default().resolve(4));
        assert_eq!(tunables.get("max_active_cores").unwrap(), 4);

        tunables.set("load_threshold_up", "40\n").unwrap();
        assert_eq!(tunables.snapshot().load_threshold_up, 40);
        assert_eq!(tunables.get("load_threshold_up").unwrap(), 40);
    }

    #[test]
    fn test_rejects_malformed_input() {
        let tunables = Tunables::new(ControllerConfig::default());

        let err = tunables.set("cycles_required_down", "five").unwrap_err();
        assert!(matches!(err, TunableError::InvalidValue { .. }));
        assert!(tunables.set("cycles_required_down", "-1").is_err());
        assert_eq!(tunables.snapshot().cycles_required_down, 5);

        assert!(matches!(
            tunables.set("turbo", "1"),
            Err(TunableError::Unknown(_))
        ));
        assert!(tunables.get("turbo").is_err());
    }

    #[test]
    fn test_flag_values() {
        let tunables = Tunables::new(ControllerConfig::default());

        tunables.set("force_single_core_on_suspend", "0").unwrap();
        assert!(!tunables.snapshot().force_single_core_on_suspend);

        tunables.set("force_single_core_on_suspend", "2").unwrap();
        assert!(tunables.snapshot().force_single_core_on_suspend);
        assert_eq!(tunables.get("force_single_core_on_suspend").unwrap(), 1);

        tunables.set("force_single_core_on_suspend", "false").unwrap();
        assert!(!tunables.snapshot().force_single_core_on_suspend);
    }

    #[test]
    fn test_no_cross_field_validation() {
        let tunables = Tunables::new(ControllerConfig::default().resolve(4));
        tunables.set("min_active_cores", "6").unwrap();

        let config = tunables.snapshot();
        assert!(config.min_active_cores > config.max_active_cores);
    }

    #[test]
    fn test_list() {
        let tunables = Tunables::new(ControllerConfig::default());
        let listed = tunables.list();
        assert_eq!(listed.len(), Tunable::ALL.len());
        assert_eq!(listed["poll_interval_ms"], 100);
        assert_eq!(listed["force_single_core_on_suspend"], 1);
    }
}
