//! legiond - Core hotplug daemon for DaemonOS

use anyhow::Result;
use clap::Parser;
use legion::cores::{CoreManager, SysfsCores};
use legion::display::DisplayMonitor;
use legion::ipc::IpcServer;
use legion::sampler::RunQueueSampler;
use legion::stats::StatsRegistry;
use legion::tunables::Tunables;
use legion::{ControlLoop, LegionConfig, PowerStateMachine};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Legion - Core hotplug daemon
#[derive(Parser, Debug)]
#[command(name = "legiond", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/grimoire/system/legion.yaml")]
    config: PathBuf,

    /// Socket path (overrides daemon.socket_path)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Debug mode
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = LegionConfig::load(&args.config)?;

    let log_level = if args.debug {
        "debug"
    } else {
        config.daemon.log_level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .init();

    info!("Legion v{} starting", env!("CARGO_PKG_VERSION"));

    let cores = Arc::new(SysfsCores::new(&config.cores.sysfs_root));
    let total = cores.total_cores();
    info!(
        "{} cores, {} online",
        total,
        cores.online_cores().len()
    );

    let controller = config.controller.resolve(total);
    let stats = controller
        .stats
        .then(|| Arc::new(StatsRegistry::new(cores.possible_cores())));

    // Start run-queue sampling
    let sampler = Arc::new(RunQueueSampler::new(&config.sampler));
    tokio::spawn(Arc::clone(&sampler).run(config.sampler.poll_interval_ms));

    let control = Arc::new(ControlLoop::new(
        Arc::new(Tunables::new(controller)),
        sampler,
        cores,
        stats,
    ));
    let power = Arc::new(PowerStateMachine::new(
        control,
        Duration::from_millis(u64::from(controller.startup_delay_ms)),
    ));

    if controller.enabled {
        if let Err(e) = power.enable().await {
            error!("Hotplug not started, cores left as they are: {}", e);
        }
    } else {
        info!("Hotplug disabled by configuration");
    }

    // Start display monitoring
    match DisplayMonitor::new(&config.display) {
        Some(monitor) => {
            tokio::spawn(monitor.run(Arc::clone(&power), config.display.poll_interval_ms));
        }
        None => warn!("No display state path configured, suspend only via IPC"),
    }

    // Start IPC server
    let socket_path = args
        .socket
        .unwrap_or_else(|| PathBuf::from(&config.daemon.socket_path));
    let server = IpcServer::new(socket_path, power);

    info!("Legion ready");
    server.run().await
}

