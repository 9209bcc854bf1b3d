//! OSC sniffer and connectivity probe
//!
//! `run_monitor` prints every feedback message arriving on the receive port.
//! `run_probe` sends a short, visible command sequence (including DIM on and
//! off) and reports whether TotalMix answered.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::*;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::EndpointConfig;
use crate::controller::MixerAddress;
use crate::osc::OscMessage;
use crate::transport::{self, CommandSink, FeedbackCallback, ReceiverHandle, Transport};

/// Pause between probe commands so each change is visible in TotalMix
const PROBE_STEP_DELAY: Duration = Duration::from_millis(500);
/// How long DIM stays on before the probe undoes it
const PROBE_DIM_HOLD: Duration = Duration::from_secs(1);
/// How long the probe keeps listening after the last command
const PROBE_LISTEN_WINDOW: Duration = Duration::from_secs(5);

const PROBE_SEQUENCE: &[(MixerAddress, f32, &str)] = &[
    (MixerAddress::BusOutput, 1.0, "Select output bus"),
    (MixerAddress::Volume(1), 0.5, "Set fader 1 to 50%"),
    (MixerAddress::Volume(2), 0.5, "Set fader 2 to 50%"),
    (MixerAddress::Volume(3), 0.5, "Set fader 3 to 50%"),
    (MixerAddress::Volume(4), 0.5, "Set fader 4 to 50%"),
    (MixerAddress::MasterVolume, 0.5, "Set master volume to 50%"),
    (MixerAddress::MainDim, 1.0, "DIM on (should be visible!)"),
];

/// Direction of an OSC message relative to this process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Received,
    Sent,
}

impl Direction {
    fn display(&self) -> ColoredString {
        match self {
            Direction::Received => "RX".green(),
            Direction::Sent => "TX".red(),
        }
    }
}

/// One observed OSC message
#[derive(Debug, Clone)]
pub struct SnifferEvent {
    pub timestamp: DateTime<Local>,
    pub direction: Direction,
    pub message: OscMessage,
}

impl SnifferEvent {
    fn now(direction: Direction, message: OscMessage) -> Self {
        Self {
            timestamp: Local::now(),
            direction,
            message,
        }
    }

    /// One terminal line: `[time] DIR address args`
    pub fn format(&self) -> String {
        let address = self.message.address();
        let address = match MixerAddress::parse(address) {
            Some(MixerAddress::Volume(_)) | Some(MixerAddress::MasterVolume) => {
                address.bright_cyan()
            }
            Some(MixerAddress::MainMute) | Some(MixerAddress::MainDim) => address.bright_yellow(),
            Some(MixerAddress::BusOutput) => address.bright_magenta(),
            None => address.normal(),
        };

        let args = self
            .message
            .args()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        format!(
            "[{}] {} {:30} {}",
            self.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
            self.direction.display(),
            address,
            args.bright_blue()
        )
    }
}

/// Listen on `receive_port` and print feedback until Ctrl+C
pub async fn run_monitor(receive_port: u16) -> Result<()> {
    println!("{}", "=== TotalMix OSC Monitor ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let (callback, mut event_rx) = event_channel();
    let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, receive_port).into();
    let handle = transport::listen(addr, callback)
        .await
        .context("Failed to bind feedback port")?;

    println!(
        "{}",
        format!("Listening on {} (TotalMix 'Port outgoing')", handle.local_addr()).green()
    );
    println!("{}", "Move a fader in TotalMix to see its value".dimmed());
    println!("{}\n", "─".repeat(80).dimmed());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut count = 0usize;
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                count += 1;
                println!("{}", event.format());
            }
            _ = &mut shutdown => break,
        }
    }

    handle.stop().await;
    println!("\n{}", format!("Monitor stopped ({} messages)", count).yellow());
    Ok(())
}

/// Outcome of a connectivity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReport {
    pub sent: usize,
    pub failed: usize,
    pub received: usize,
    pub listening: bool,
}

/// Send the diagnostic sequence and count the feedback that comes back
pub async fn run_probe(endpoint: &EndpointConfig) -> Result<ProbeReport> {
    println!("\n{}", "=== TotalMix OSC Probe ===".bold().cyan());
    print_settings_hint(endpoint);

    let (callback, event_rx) = event_channel();
    let receiver = match transport::listen(
        (Ipv4Addr::UNSPECIFIED, endpoint.receive_port).into(),
        callback,
    )
    .await
    {
        Ok(handle) => {
            println!("{} Listening for feedback on port {}", "✓".green(), endpoint.receive_port);
            Some(handle)
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            None
        }
    };
    let printer = tokio::spawn(print_events(event_rx));

    let transport = Transport::open(endpoint.target())
        .await
        .context("Failed to open outbound socket")?;
    println!("{} Sending to TotalMix at {}", "✓".green(), transport.target());
    println!("\n{}", "Sending test commands... Watch TotalMix for changes!".bold());
    println!("{}\n", "─".repeat(60).dimmed());

    let mut report = ProbeReport {
        sent: 0,
        failed: 0,
        received: 0,
        listening: receiver.is_some(),
    };

    for (address, value, description) in PROBE_SEQUENCE {
        println!("Sending: {} = {}  ({})", address, value, description.dimmed());
        send_counted(&transport, OscMessage::float(address.to_string(), *value), &mut report).await;
        tokio::time::sleep(PROBE_STEP_DELAY).await;
    }

    tokio::time::sleep(PROBE_DIM_HOLD).await;
    println!("\nUndoing DIM...");
    send_counted(
        &transport,
        OscMessage::float(MixerAddress::MainDim.to_string(), 0.0),
        &mut report,
    )
    .await;

    if report.listening {
        println!(
            "\nListening for {} more seconds for any feedback from TotalMix...",
            PROBE_LISTEN_WINDOW.as_secs()
        );
        println!("{}", "(Move a fader in TotalMix to see if we receive its value)".dimmed());
        tokio::time::sleep(PROBE_LISTEN_WINDOW).await;
    }

    stop_receiver(receiver).await;
    report.received = printer.await.unwrap_or_else(|e| {
        warn!("Probe printer ended abnormally: {}", e);
        0
    });

    print_summary(endpoint, &report);
    info!(sent = report.sent, received = report.received, "Probe finished");
    Ok(report)
}

fn event_channel() -> (FeedbackCallback, mpsc::Receiver<SnifferEvent>) {
    let (event_tx, event_rx) = mpsc::channel(1000);
    let callback: FeedbackCallback = Arc::new(move |message| {
        let _ = event_tx.try_send(SnifferEvent::now(Direction::Received, message));
    });
    (callback, event_rx)
}

/// Print events until the listener is gone; returns how many arrived
async fn print_events(mut event_rx: mpsc::Receiver<SnifferEvent>) -> usize {
    let mut count = 0;
    while let Some(event) = event_rx.recv().await {
        count += 1;
        println!("  {}", event.format());
    }
    count
}

async fn send_counted(transport: &Transport, message: OscMessage, report: &mut ProbeReport) {
    let event = SnifferEvent::now(Direction::Sent, message);
    match transport.send(&event.message).await {
        Ok(()) => {
            report.sent += 1;
            println!("  {}", event.format());
        }
        Err(e) => {
            report.failed += 1;
            println!("  {} {}", "✗".red(), e);
        }
    }
}

async fn stop_receiver(receiver: Option<ReceiverHandle>) {
    if let Some(handle) = receiver {
        handle.stop().await;
    }
}

fn print_settings_hint(endpoint: &EndpointConfig) {
    println!(
        "\nCheck TotalMix OSC settings (Options → Settings → OSC tab):\n  \
         - 'Enable OSC Control' must be checked\n  \
         - 'Remote Controller Select': 1, 'In Use' checked\n  \
         - 'Port incoming' is where TotalMix LISTENS (send port: {})\n  \
         - 'Port outgoing' is where TotalMix SENDS feedback (receive port: {})\n  \
         - 'IP or Host name' must point back at this machine\n",
        endpoint.send_port, endpoint.receive_port
    );
}

fn print_summary(endpoint: &EndpointConfig, report: &ProbeReport) {
    println!("\n{}", "─".repeat(60).dimmed());
    println!(
        "Sent {} command(s), {} failed, received {} feedback message(s)",
        report.sent, report.failed, report.received
    );

    if report.received > 0 {
        println!("{}", "✓ TotalMix is answering - OSC is working".green().bold());
        return;
    }

    println!("{}", "No feedback received.".yellow().bold());
    println!("- If DIM turned on and off, commands are getting through");
    println!("- If nothing happened, check:");
    println!(
        "  1. Firewall on the TotalMix PC (allow UDP port {})",
        endpoint.send_port
    );
    println!("  2. OSC settings in TotalMix");
    println!("  3. That the ports aren't swapped (incoming vs outgoing)");
    if !report.listening {
        println!(
            "  4. Whether another program holds UDP port {}",
            endpoint.receive_port
        );
    }
}
