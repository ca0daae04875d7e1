//! CPU core topology and hotplug actuation

use crate::error::CoreError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The always-on core
pub const PRIMARY_CORE: u32 = 0;

/// Platform hotplug capability
///
/// The controller only observes the online set and requests single-core
/// transitions; it never assumes a request took effect.
pub trait CoreManager: Send + Sync {
    /// Cores currently online
    fn online_cores(&self) -> BTreeSet<u32>;

    /// Every core the platform can bring online
    fn possible_cores(&self) -> BTreeSet<u32>;

    /// Bring a core online
    fn bring_online(&self, core: u32) -> Result<(), CoreError>;

    /// Take a core offline. Never called with core 0.
    fn take_offline(&self, core: u32) -> Result<(), CoreError>;

    /// Current clock rate of a core in kHz (0 if unknown)
    fn clock_rate(&self, core: u32) -> u64;

    /// Number of cores on the platform
    fn total_cores(&self) -> u32 {
        self.possible_cores().len() as u32
    }
}

/// Hotplug through `/sys/devices/system/cpu`
pub struct SysfsCores {
    root: PathBuf,
}

impl SysfsCores {
    /// Create new sysfs core manager
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_cpulist(&self, name: &str) -> Result<BTreeSet<u32>, CoreError> {
        let content = fs::read_to_string(self.root.join(name))?;
        parse_cpulist(&content)
    }

    fn set_online(&self, core: u32, online: bool) -> Result<(), CoreError> {
        let path = self.root.join(format!("cpu{}", core)).join("online");
        if !path.exists() {
            return Err(CoreError::NoSuchCore(core));
        }

        let value = if online { "1" } else { "0" };
        debug!("Writing {} to {}", value, path.display());

        fs::write(&path, value).map_err(|e| CoreError::Refused {
            core,
            target: if online { "online" } else { "offline" },
            reason: e.to_string(),
        })
    }
}

impl CoreManager for SysfsCores {
    fn online_cores(&self) -> BTreeSet<u32> {
        match self.read_cpulist("online") {
            Ok(cores) => cores,
            Err(e) => {
                debug!("Failed to read online cpus: {}", e);
                BTreeSet::from([PRIMARY_CORE])
            }
        }
    }

    fn possible_cores(&self) -> BTreeSet<u32> {
        match self.read_cpulist("possible") {
            Ok(cores) => cores,
            Err(e) => {
                debug!("Failed to read possible cpus: {}", e);
                self.online_cores()
            }
        }
    }

    fn bring_online(&self, core: u32) -> Result<(), CoreError> {
        self.set_online(core, true)
    }

    fn take_offline(&self, core: u32) -> Result<(), CoreError> {
        if core == PRIMARY_CORE {
            return Err(CoreError::PrimaryCore);
        }
        self.set_online(core, false)
    }

    fn clock_rate(&self, core: u32) -> u64 {
        let path = self
            .root
            .join(format!("cpu{}", core))
            .join("cpufreq/scaling_cur_freq");
        read_u64(&path).unwrap_or(0)
    }
}

fn read_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Parse kernel cpulist format (e.g. "0-3,5,7-8")
pub fn parse_cpulist(content: &str) -> Result<BTreeSet<u32>, CoreError> {
    let trimmed = content.trim();
    let invalid = || CoreError::InvalidCpuList(trimmed.to_string());

    let mut cores = BTreeSet::new();
    if trimmed.is_empty() {
        return Ok(cores);
    }

    for part in trimmed.split(',') {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.trim().parse().map_err(|_| invalid())?;
                let end: u32 = end.trim().parse().map_err(|_| invalid())?;
                if start > end {
                    return Err(invalid());
                }
                cores.extend(start..=end);
            }
            None => {
                cores.insert(part.trim().parse().map_err(|_| invalid())?);
            }
        }
    }

    Ok(cores)
}
