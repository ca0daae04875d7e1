//! Configuration for Legion hotplug daemon

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegionConfig {
    /// Control loop tunables
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Run-queue sampler settings
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// CPU topology settings
    #[serde(default)]
    pub cores: CoresConfig,

    /// Display power state source
    #[serde(default)]
    pub display: DisplayConfig,

    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Control loop tunables
///
/// Everything here except `enabled`, `startup_delay_ms` and `stats` is exposed
/// through the tunables surface and re-read on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Hotplug on startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay before the first poll after start or enable (milliseconds)
    #[serde(default = "default_startup_delay")]
    pub startup_delay_ms: u32,

    /// Count offline transitions per core
    #[serde(default = "default_true")]
    pub stats: bool,

    /// Time between polls (milliseconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u32,

    /// Park every secondary core while the display is off
    #[serde(default = "default_true")]
    pub force_single_core_on_suspend: bool,

    /// Never offline below this many cores
    #[serde(default = "default_min_cores")]
    pub min_active_cores: u32,

    /// Never online above this many cores (0 = all cores)
    #[serde(default)]
    pub max_active_cores: u32,

    /// Load at or above which a core is added
    #[serde(default = "default_load_up")]
    pub load_threshold_up: u32,

    /// Load at or below which a core is removed
    #[serde(default = "default_load_down")]
    pub load_threshold_down: u32,

    /// Polls required before adding a core
    #[serde(default = "default_cycles_up")]
    pub cycles_required_up: u32,

    /// Polls required before removing a core
    #[serde(default = "default_cycles_down")]
    pub cycles_required_down: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            startup_delay_ms: default_startup_delay(),
            stats: true,
            poll_interval_ms: default_poll_interval(),
            force_single_core_on_suspend: true,
            min_active_cores: default_min_cores(),
            max_active_cores: 0,
            load_threshold_up: default_load_up(),
            load_threshold_down: default_load_down(),
            cycles_required_up: default_cycles_up(),
            cycles_required_down: default_cycles_down(),
        }
    }
}

impl ControllerConfig {
    /// Replace the "all cores" placeholder with the platform core count
    pub fn resolve(mut self, total_cores: u32) -> Self {
        if self.max_active_cores == 0 || self.max_active_cores > total_cores {
            self.max_active_cores = total_cores;
        }
        if self.min_active_cores == 0 {
            self.min_active_cores = 1;
        }
        self
    }
}

/// Run-queue sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Source of procs_running
    #[serde(default = "default_stat_path")]
    pub stat_path: PathBuf,

    /// Sampling period (milliseconds)
    #[serde(default = "default_sample_interval")]
    pub poll_interval_ms: u32,

    /// Load units per runnable task
    #[serde(default = "default_scale")]
    pub scale: u32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            stat_path: default_stat_path(),
            poll_interval_ms: default_sample_interval(),
            scale: default_scale(),
        }
    }
}

/// CPU topology configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoresConfig {
    /// sysfs cpu directory
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
}

impl Default for CoresConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
        }
    }
}

/// Display power state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// File holding the display power state (e.g. backlight bl_power)
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Poll interval (milliseconds)
    #[serde(default = "default_display_interval")]
    pub poll_interval_ms: u32,

    /// Contents that mean "display off"
    #[serde(default = "default_off_values")]
    pub off_values: Vec<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            poll_interval_ms: default_display_interval(),
            off_values: default_off_values(),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Socket path
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            log_level: default_log_level(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_startup_delay() -> u32 {
    20_000
}

fn default_poll_interval() -> u32 {
    100
}

fn default_min_cores() -> u32 {
    1
}

fn default_load_up() -> u32 {
    25
}

fn default_load_down() -> u32 {
    5
}

fn default_cycles_up() -> u32 {
    1
}

fn default_cycles_down() -> u32 {
    5
}

fn default_stat_path() -> PathBuf {
    PathBuf::from("/proc/stat")
}

fn default_sample_interval() -> u32 {
    10
}

fn default_scale() -> u32 {
    10
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys/devices/system/cpu")
}

fn default_display_interval() -> u32 {
    500
}

fn default_off_values() -> Vec<String> {
    ["1", "4", "Off", "off"].iter().map(|s| s.to_string()).collect()
}

fn default_socket_path() -> String {
    "/run/legion/legion.sock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LegionConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = LegionConfig::load(Path::new("/nonexistent/legion.yaml")).unwrap();
        assert_eq!(config.controller, ControllerConfig::default());
        assert_eq!(config.controller.load_threshold_up, 25);
        assert_eq!(config.controller.cycles_required_down, 5);
        assert!(config.display.state_path.is_none());
    }

    #[test]
    fn test_partial_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legion.yaml");
        std::fs::write(
            &path,
            "controller:\n  poll_interval_ms: 250\n  cycles_required_up: 3\ndisplay:\n  state_path: /sys/class/backlight/panel0/bl_power\n",
        )
        .unwrap();

        let config = LegionConfig::load(&path).unwrap();
        assert_eq!(config.controller.poll_interval_ms, 250);
        assert_eq!(config.controller.cycles_required_up, 3);
        assert_eq!(config.controller.load_threshold_down, 5);
        assert!(config.controller.force_single_core_on_suspend);
        assert_eq!(
            config.display.state_path.as_deref(),
            Some(Path::new("/sys/class/backlight/panel0/bl_power"))
        );
        assert_eq!(config.sampler.scale, 10);
    }

    #[test]
    fn test_resolve_max_cores() {
        let resolved = ControllerConfig::default().resolve(8);
        assert_eq!(resolved.max_active_cores, 8);

        let capped = ControllerConfig {
            max_active_cores: 16,
            ..Default::default()
        }
        .resolve(4);
        assert_eq!(capped.max_active_cores, 4);

        let kept = ControllerConfig {
            max_active_cores: 2,
            ..Default::default()
        }
        .resolve(4);
        assert_eq!(kept.max_active_cores, 2);
    }
}
