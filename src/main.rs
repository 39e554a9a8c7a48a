//! fieldnode - host-side sensor node
//!
//! Runs the node against the host's network stack, publishing simulated
//! readings on a fixed cadence.

use clap::{Parser, Subcommand};
use fieldnode::config::NodeConfig;
use fieldnode::node::{FieldNode, NodePorts};
use fieldnode::observability::init_default_logging;
use std::path::PathBuf;
use std::process;
use tokio::{
    signal,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};

/// Sensor node client for an HTTP ingestion platform
#[derive(Parser)]
#[command(name = "fieldnode")]
#[command(about = "Sensor node client for an HTTP ingestion platform")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "FIELDNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Print debug lines to stdout
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and publish readings until interrupted
    Run {
        /// Maintenance tick cadence in milliseconds
        #[arg(long, default_value_t = 1000)]
        tick_ms: u64,

        /// Seconds between sensor publishes
        #[arg(long, default_value_t = 60)]
        sample_secs: u64,
    },
    /// Connect once and run the connectivity self-test
    Check,
    /// Validate configuration
    Config {
        /// Show current configuration with secrets masked
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting fieldnode v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run {
            tick_ms,
            sample_secs,
        } => run_node(config, cli.verbose > 0, tick_ms, sample_secs).await,
        Commands::Check => check_node(config, cli.verbose > 0).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    match result {
        Ok(true) => info!("Shutdown complete"),
        Ok(false) => process::exit(2),
        Err(e) => {
            error!("Command failed: {}", e);
            process::exit(1);
        }
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<NodeConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(NodeConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["fieldnode.toml", "config/fieldnode.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(NodeConfig::load_from_file(&path)?);
                }
            }

            Err("no configuration file found; pass -c/--config or create fieldnode.toml".into())
        }
    }
}

fn build_node(config: NodeConfig, console: bool) -> Result<FieldNode, Box<dyn std::error::Error>> {
    let mut node = FieldNode::new(NodePorts::host(console)?);
    node.init(config)?;
    if console {
        node.set_debug(true);
    }
    Ok(node)
}

async fn run_node(
    config: NodeConfig,
    console: bool,
    tick_ms: u64,
    sample_secs: u64,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut node = build_node(config, console)?;

    if !node.connect().await {
        warn!("Initial connect failed, tick will keep retrying: {}", node.last_error());
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let mut ticker = interval(Duration::from_millis(tick_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sampler = interval(Duration::from_secs(sample_secs.max(1)));
    sampler.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut round: u32 = 0;
    info!("Node running");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            _ = ticker.tick() => {
                node.tick().await;
            }
            _ = sampler.tick() => {
                round = round.wrapping_add(1);
                let (temperature, humidity) = simulated_reading(round);
                let response = node.publish_sensors(temperature, humidity, -1.0, -1.0).await;
                if response.ok {
                    info!(code = response.http_code, "Sensor data published");
                } else {
                    warn!(
                        code = response.http_code,
                        kind = %response.error_kind,
                        detail = %response.error_detail,
                        "Sensor publish failed"
                    );
                }
            }
        }
    }

    node.disconnect();
    Ok(true)
}

async fn check_node(config: NodeConfig, console: bool) -> Result<bool, Box<dyn std::error::Error>> {
    let mut node = build_node(config, console)?;

    let passed = node.connect().await && node.run_connectivity_test().await;
    println!("{}", node.diagnostics_text());
    if passed {
        info!("Connectivity test passed");
    } else {
        error!("Connectivity test failed: {}", node.last_error());
    }

    node.disconnect();
    Ok(passed)
}

fn handle_config_command(
    config: &NodeConfig,
    show: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config.redacted())?);
    }

    info!("Configuration validation complete");
    Ok(true)
}

/// Slowly drifting readings so successive frames differ
fn simulated_reading(round: u32) -> (f32, f32) {
    let phase = (round % 24) as f32;
    (20.0 + phase * 0.25, 55.0 - phase * 0.5)
}
