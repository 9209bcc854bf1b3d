//! Interactive command REPL
//!
//! Reads commands on a plain OS thread (readline blocks) and forwards them
//! to the async main loop over a channel. The main loop runs each command
//! to completion before taking the next.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::{Controller, StatusLine};

/// A command issued by the operator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    VolumeUp,
    VolumeDown,
    ToggleMute,
    ToggleDim,
    UnityGain,
    SetVolume(f32),
    Status,
    Help,
    Quit,
}

impl ControlCommand {
    /// Parse one REPL line; `None` for blank or unknown input
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let cmd = match words.next()?.to_lowercase().as_str() {
            "up" | "+" | "u" => ControlCommand::VolumeUp,
            "down" | "-" => ControlCommand::VolumeDown,
            "mute" | "m" => ControlCommand::ToggleMute,
            "dim" | "d" => ControlCommand::ToggleDim,
            "unity" | "0" | "0db" => ControlCommand::UnityGain,
            "set" => ControlCommand::SetVolume(words.next()?.parse().ok()?),
            "status" | "s" => ControlCommand::Status,
            "help" | "h" | "?" => ControlCommand::Help,
            "quit" | "q" | "exit" => ControlCommand::Quit,
            _ => return None,
        };
        if words.next().is_some() {
            return None;
        }
        Some(cmd)
    }
}

const HELP: &str = "\
  up, +        Volume up one step
  down, -      Volume down one step
  mute, m      Mute / unmute
  dim, d       Dim on / off
  unity, 0     Set to 0 dB (unity gain)
  set <0..1>   Set an exact fader value
  status, s    Show current state
  quit, q      Exit";

/// Blocking REPL loop; returns once the operator quits or input closes
pub fn run_repl(tx: mpsc::Sender<ControlCommand>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        let cmd = match rl.readline("totalmix> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                match ControlCommand::parse(&line) {
                    Some(cmd) => cmd,
                    None => {
                        println!("Unknown command: {} (type 'help')", line.trim());
                        continue;
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => ControlCommand::Quit,
            Err(e) => {
                warn!("Input error: {}", e);
                ControlCommand::Quit
            }
        };

        let quit = cmd == ControlCommand::Quit;
        if tx.blocking_send(cmd).is_err() || quit {
            break;
        }
    }

    debug!("REPL finished");
    Ok(())
}

/// Run one command against the controller and print the outcome
///
/// Transport errors are shown to the operator; they never end the session.
pub async fn dispatch(controller: &Controller, cmd: ControlCommand) {
    let outcome = match cmd {
        ControlCommand::VolumeUp => controller.volume_up().await.map(|_| None),
        ControlCommand::VolumeDown => controller.volume_down().await.map(|_| None),
        ControlCommand::SetVolume(v) => controller.set_volume(v).await.map(|_| None),
        ControlCommand::UnityGain => controller.set_unity_gain().await.map(|_| Some(" [0dB]")),
        ControlCommand::ToggleMute => controller.toggle_mute().await.map(|_| None),
        ControlCommand::ToggleDim => controller.toggle_dim().await.map(|_| None),
        ControlCommand::Status => Ok(None),
        ControlCommand::Help => {
            println!("{}", HELP);
            return;
        }
        ControlCommand::Quit => {
            controller.stop();
            return;
        }
    };

    match outcome {
        Ok(suffix) => println!("{}{}", render_status(&controller.status()), suffix.unwrap_or("")),
        Err(e) => println!("{} {}", "✗".red(), e),
    }
}

/// Colour the status line for a terminal
pub fn render_status(status: &StatusLine) -> String {
    let icon = if status.muted { "🔇" } else { "🔊" };
    let mut line = format!(
        "{} Volume: [{}] {} (~{})",
        icon,
        status.bar().green(),
        status.percent().bold(),
        status.db
    );
    if status.muted {
        line.push_str(&format!("  {}", "MUTED".red().bold()));
    }
    if status.dimmed {
        line.push_str(&format!("  {}", "DIM".yellow()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ControlCommand::parse("up"), Some(ControlCommand::VolumeUp));
        assert_eq!(ControlCommand::parse(" + "), Some(ControlCommand::VolumeUp));
        assert_eq!(ControlCommand::parse("DOWN"), Some(ControlCommand::VolumeDown));
        assert_eq!(ControlCommand::parse("m"), Some(ControlCommand::ToggleMute));
        assert_eq!(ControlCommand::parse("dim"), Some(ControlCommand::ToggleDim));
        assert_eq!(ControlCommand::parse("0"), Some(ControlCommand::UnityGain));
        assert_eq!(ControlCommand::parse("set 0.25"), Some(ControlCommand::SetVolume(0.25)));
        assert_eq!(ControlCommand::parse("q"), Some(ControlCommand::Quit));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(ControlCommand::parse(""), None);
        assert_eq!(ControlCommand::parse("louder"), None);
        assert_eq!(ControlCommand::parse("set"), None);
        assert_eq!(ControlCommand::parse("set loud"), None);
        assert_eq!(ControlCommand::parse("up up"), None);
    }

    #[test]
    fn test_render_status_mentions_flags() {
        colored::control::set_override(false);
        let status = StatusLine {
            level: 0.25,
            db: crate::controller::ApproxDb::from_level(0.25, 0.7197),
            muted: true,
            dimmed: true,
            connection: crate::controller::ConnectionStatus::Confirmed,
        };
        let line = render_status(&status);
        assert!(line.contains("25.0%"));
        assert!(line.contains("MUTED"));
        assert!(line.contains("DIM"));
    }
}
