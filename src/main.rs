//! TotalMix Remote
//!
//! Control the main output level of RME TotalMix FX on another machine.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use totalmix_remote::cli::{self, ControlCommand};
use totalmix_remote::config::{AppConfig, FaderSpec, MixerConfig};
use totalmix_remote::controller::{ConnectionStatus, Controller};
use totalmix_remote::sniffer;
use totalmix_remote::transport::{FeedbackCallback, Transport};

/// How often the command loop checks whether `stop` was requested
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// TotalMix Remote - control RME TotalMix FX volume over OSC
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address of the PC running TotalMix
    #[arg(short, long, env = "TOTALMIX_IP")]
    ip: Option<String>,

    /// Port TotalMix listens on ("Port incoming", default 7001)
    #[arg(short = 'p', long, env = "TOTALMIX_SEND_PORT")]
    send_port: Option<u16>,

    /// Port TotalMix sends feedback to ("Port outgoing", default 9001)
    #[arg(short, long, env = "TOTALMIX_RECEIVE_PORT")]
    receive_port: Option<u16>,

    /// Volume change per step, 0-1 (default 0.02)
    #[arg(short, long)]
    step: Option<f32>,

    /// Comma-separated fader numbers to control (default 1,2,3,4,5,6)
    #[arg(short, long, env = "TOTALMIX_FADERS")]
    faders: Option<String>,

    /// Fader value TotalMix shows as 0 dB (default 0.7197)
    #[arg(long)]
    unity_gain: Option<f32>,

    /// Path to an optional YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Print every OSC message TotalMix sends, then exit on Ctrl+C
    #[arg(long, conflicts_with = "probe")]
    monitor: bool,

    /// Send a diagnostic command sequence and report feedback
    #[arg(long)]
    probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.log_json)?;

    let mixer = merge_config(&args).await?;

    if args.monitor {
        return sniffer::run_monitor(mixer.receive_port).await;
    }

    // Invalid settings end the process before any socket is opened
    let endpoint = mixer.validate().context("Invalid configuration")?;

    if args.probe {
        sniffer::run_probe(&endpoint).await?;
        return Ok(());
    }

    info!("Starting TotalMix Remote...");
    info!(
        "Target: {} | feedback port {} | faders {:?} | step {}",
        endpoint.target(),
        endpoint.receive_port,
        endpoint.faders,
        endpoint.step
    );

    run_app(endpoint).await?;

    info!("TotalMix Remote shutdown complete");
    Ok(())
}

/// File values first, command-line values on top
async fn merge_config(args: &Args) -> Result<MixerConfig> {
    let mut mixer = match &args.config {
        Some(path) => {
            let config = AppConfig::load(path).await?;
            info!("Configuration loaded from {}", path);
            config.mixer
        }
        None => MixerConfig::default(),
    };

    if let Some(ip) = &args.ip {
        mixer.ip = Some(ip.clone());
    }
    if let Some(port) = args.send_port {
        mixer.send_port = port;
    }
    if let Some(port) = args.receive_port {
        mixer.receive_port = port;
    }
    if let Some(step) = args.step {
        mixer.step = step;
    }
    if let Some(faders) = &args.faders {
        mixer.faders = FaderSpec::Csv(faders.clone());
    }
    if let Some(unity) = args.unity_gain {
        mixer.unity_gain = unity;
    }

    Ok(mixer)
}

async fn run_app(endpoint: totalmix_remote::config::EndpointConfig) -> Result<()> {
    let transport = Arc::new(
        Transport::open(endpoint.target())
            .await
            .context("Failed to open outbound socket")?,
    );
    let controller = Arc::new(Controller::new(endpoint.clone(), transport.clone()));

    // Feedback is optional; commands still go out without it
    let feedback = controller.clone();
    let on_message: FeedbackCallback = Arc::new(move |message| feedback.on_feedback(&message));
    let receiver = match transport
        .start_receiving(endpoint.receive_port, on_message)
        .await
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("⚠️  {} - running without feedback", e);
            None
        }
    };

    if let Err(e) = controller.select_output_bus().await {
        warn!("Failed to select output bus: {}", e);
    }

    println!("\n{}", "=== TotalMix Remote ===".bold().cyan());
    println!("Type 'help' for commands, 'quit' to exit\n");
    println!("{}", cli::render_status(&controller.status()));

    // Readline blocks, so it gets its own OS thread
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<ControlCommand>(32);
    std::thread::Builder::new()
        .name("repl".into())
        .spawn(move || {
            if let Err(e) = cli::run_repl(cmd_tx) {
                warn!("REPL failed: {}", e);
            }
        })
        .context("Failed to start REPL thread")?;

    let mut connection_rx = controller.subscribe_connection();
    let mut poll = tokio::time::interval(STOP_POLL_INTERVAL);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(cmd) = cmd_rx.recv() => {
                cli::dispatch(&controller, cmd).await;
            }

            Ok(()) = connection_rx.changed() => {
                if *connection_rx.borrow_and_update() == ConnectionStatus::Confirmed {
                    println!("{}", "✓ Connection to TotalMix verified".green());
                }
            }

            _ = poll.tick() => {
                if !controller.is_running() {
                    break;
                }
            }

            _ = &mut shutdown => {
                controller.stop();
                break;
            }
        }
    }

    if let Some(handle) = receiver {
        handle.stop().await;
    }

    println!("{}", "Goodbye!".yellow());
    Ok(())
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .init();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
