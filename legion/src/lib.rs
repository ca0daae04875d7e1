//! Legion - Load-driven CPU core hotplug for DaemonOS
//!
//! Provides:
//! - Run-queue sampling from procfs
//! - A hysteresis control loop that onlines and offlines secondary cores
//! - Single-core parking while the display is off
//! - Runtime tunables and per-core statistics over a control socket

pub mod config;
pub mod controller;
pub mod cores;
pub mod display;
pub mod error;
pub mod hysteresis;
pub mod ipc;
pub mod power;
pub mod sampler;
pub mod stats;
pub mod tunables;
pub mod worker;

pub use config::{ControllerConfig, LegionConfig};
pub use controller::{Action, ControlLoop, PollOutcome};
pub use cores::{CoreManager, SysfsCores};
pub use error::{CoreError, SampleError, TunableError};
pub use power::{PowerStateMachine, RunState};
pub use sampler::{LoadSampler, RunQueueSampler};
