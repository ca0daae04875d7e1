//! legionctl - Legion control utility

use anyhow::Result;
use clap::{Parser, Subcommand};
use legion::controller::Action;
use legion::ipc::IpcClient;
use legion::RunState;

/// Legion control utility
#[derive(Parser)]
#[command(name = "legionctl", version, about = "Control the Legion hotplug daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Socket path
    #[arg(long, default_value = "/run/legion/legion.sock")]
    socket: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show controller status
    Status,

    /// List every tunable
    Tunables,

    /// Read a tunable
    Get {
        /// Tunable name (e.g. load_threshold_up)
        name: String,
    },

    /// Write a tunable
    Set {
        /// Tunable name
        name: String,
        /// New value
        value: String,
    },

    /// Start hotplugging
    Enable,

    /// Stop hotplugging and bring every core online
    Disable,

    /// Signal display off
    Suspend,

    /// Signal display on
    Resume,

    /// Per-core offline counters
    Stats,
}

fn state_name(state: RunState) -> &'static str {
    match state {
        RunState::Disabled => "disabled",
        RunState::Enabled => "enabled",
        RunState::Suspended => "suspended",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = IpcClient::new(&cli.socket);

    match cli.command {
        Commands::Status => {
            let status = client.get_status().await?;

            println!("Legion Status");
            println!("=============");
            println!("Version:       {}", status.version);
            println!("State:         {}", state_name(status.state));
            println!("Started:       {}", status.started_at.format("%Y-%m-%d %H:%M:%S"));
            println!(
                "Online:        {}/{} ({})",
                status.online_cores.len(),
                status.total_cores,
                status
                    .online_cores
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            );
            println!("Cycle:         {}", status.cycle_count);

            match status.last_action {
                Some(last) => {
                    let verb = match last.action {
                        Action::Online => "online",
                        Action::Offline => "offline",
                    };
                    println!(
                        "Last action:   CPU{} {} at load {} ({})",
                        last.core,
                        verb,
                        last.load,
                        last.at.format("%H:%M:%S")
                    );
                }
                None => println!("Last action:   none"),
            }
        }

        Commands::Tunables => {
            let tunables = client.list_tunables().await?;

            println!("Tunables");
            println!("========");
            for (name, value) in &tunables {
                println!("  {:<30} {}", name, value);
            }
        }

        Commands::Get { name } => {
            println!("{}", client.get_tunable(&name).await?);
        }

        Commands::Set { name, value } => {
            let applied = client.set_tunable(&name, &value).await?;
            println!("{} set to: {}", name, applied);
        }

        Commands::Enable => {
            let state = client.set_enabled(true).await?;
            println!("Legion {}", state_name(state));
        }

        Commands::Disable => {
            let state = client.set_enabled(false).await?;
            println!("Legion {}", state_name(state));
        }

        Commands::Suspend => {
            let state = client.suspend().await?;
            println!("Legion {}", state_name(state));
        }

        Commands::Resume => {
            let state = client.resume().await?;
            println!("Legion {}", state_name(state));
        }

        Commands::Stats => {
            let stats = client.get_stats().await?;

            println!("Times Offlined");
            println!("==============");
            for (core, count) in &stats.times_offlined {
                println!("  CPU{:<4} {}", core, count);
            }
        }
    }

    Ok(())
}
