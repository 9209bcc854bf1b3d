//! TotalMix volume controller
//!
//! Mirrors the mixer's main output level, mute and dim state and drives it
//! over OSC. Local operations write state optimistically before sending;
//! feedback from the mixer overwrites it. There are no sequence numbers in
//! the protocol, so whichever write is applied last wins.
//!
//! ```text
//!  REPL / hotkeys ──► Controller ──► CommandSink (Transport) ──► mixer
//!                        ▲                                        │
//!                        └──── on_feedback ◄── receive loop ◄─────┘
//! ```
//!
//! All state lives behind one mutex that is never held across a send.

mod address;
mod status;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::EndpointConfig;
use crate::error::TransportError;
use crate::osc::{OscArg, OscMessage};
use crate::transport::CommandSink;

pub use address::{MixerAddress, BUS_OUTPUT, MAIN_DIM, MAIN_MUTE, MASTER_VOLUME};
pub use status::{ApproxDb, ConnectionStatus, StatusLine};

/// Level the controller assumes until the mixer reports otherwise
pub const INITIAL_LEVEL: f32 = 0.5;

const MIN_LEVEL: f32 = 0.0;
const MAX_LEVEL: f32 = 1.0;

/// Mutable controller state
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    /// Always within [0.0, 1.0]
    pub volume: f32,
    pub muted: bool,
    pub dimmed: bool,
    /// Flips to true on the first decoded feedback message, never back
    pub feedback_received: bool,
    /// Advisory: a bus-select command has been sent this session
    pub bus_selected: bool,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            volume: INITIAL_LEVEL,
            muted: false,
            dimmed: false,
            feedback_received: false,
            bus_selected: false,
        }
    }
}

/// Result of a volume operation, for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeChange {
    pub level: f32,
    pub db: ApproxDb,
}

/// Remote controller for one TotalMix instance
///
/// Construct once and share through `Arc`; every method takes `&self`.
pub struct Controller {
    endpoint: EndpointConfig,
    sink: Arc<dyn CommandSink>,
    state: Mutex<ControllerState>,
    running: AtomicBool,
    connection_tx: watch::Sender<ConnectionStatus>,
}

impl Controller {
    pub fn new(endpoint: EndpointConfig, sink: Arc<dyn CommandSink>) -> Self {
        let (connection_tx, _) = watch::channel(ConnectionStatus::AwaitingFeedback);
        Self {
            endpoint,
            sink,
            state: Mutex::new(ControllerState::default()),
            running: AtomicBool::new(true),
            connection_tx,
        }
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    /// Copy of the current state
    pub fn state(&self) -> ControllerState {
        self.state.lock().clone()
    }

    /// Select the output bus so fader commands act on hardware outputs
    pub async fn select_output_bus(&self) -> Result<(), TransportError> {
        self.sink.send(&OscMessage::float(BUS_OUTPUT, 1.0)).await?;
        self.state.lock().bus_selected = true;
        debug!("Sent bus selection command");
        Ok(())
    }

    /// Set every configured fader and the master to `value`, clamped to [0, 1]
    ///
    /// The bus-select command is resent each time. Every datagram is
    /// attempted even if an earlier one fails; the first failure is returned.
    pub async fn set_volume(&self, value: f32) -> Result<VolumeChange, TransportError> {
        let level = {
            let mut state = self.state.lock();
            let level = if value.is_nan() {
                state.volume
            } else {
                value.clamp(MIN_LEVEL, MAX_LEVEL)
            };
            state.volume = level;
            level
        };

        let mut messages = Vec::with_capacity(self.endpoint.faders.len() + 2);
        messages.push(OscMessage::float(BUS_OUTPUT, 1.0));
        messages.extend(
            self.endpoint
                .faders
                .iter()
                .map(|&n| OscMessage::float(MixerAddress::Volume(n).to_string(), level)),
        );
        messages.push(OscMessage::float(MASTER_VOLUME, level));

        let mut first_error = None;
        for (idx, message) in messages.iter().enumerate() {
            match self.sink.send(message).await {
                Ok(()) if idx == 0 => self.state.lock().bus_selected = true,
                Ok(()) => {}
                Err(e) => {
                    warn!("Failed to send {}: {}", message.address(), e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        let change = VolumeChange {
            level,
            db: ApproxDb::from_level(level, self.endpoint.unity_gain),
        };
        debug!(level, db = %change.db, "Volume set");

        match first_error {
            Some(e) => Err(e),
            None => Ok(change),
        }
    }

    /// One step louder
    pub async fn volume_up(&self) -> Result<VolumeChange, TransportError> {
        let current = self.state.lock().volume;
        self.set_volume(current + self.endpoint.step).await
    }

    /// One step quieter
    pub async fn volume_down(&self) -> Result<VolumeChange, TransportError> {
        let current = self.state.lock().volume;
        self.set_volume(current - self.endpoint.step).await
    }

    /// Jump to the configured 0 dB level
    pub async fn set_unity_gain(&self) -> Result<VolumeChange, TransportError> {
        self.set_volume(self.endpoint.unity_gain).await
    }

    /// Flip main mute; returns the new mute state
    pub async fn toggle_mute(&self) -> Result<bool, TransportError> {
        let muted = {
            let mut state = self.state.lock();
            state.muted = !state.muted;
            state.muted
        };
        self.sink
            .send(&OscMessage::float(MAIN_MUTE, switch_value(muted)))
            .await?;
        debug!(muted, "Mute toggled");
        Ok(muted)
    }

    /// Flip main dim; returns the new dim state
    pub async fn toggle_dim(&self) -> Result<bool, TransportError> {
        let dimmed = {
            let mut state = self.state.lock();
            state.dimmed = !state.dimmed;
            state.dimmed
        };
        self.sink
            .send(&OscMessage::float(MAIN_DIM, switch_value(dimmed)))
            .await?;
        debug!(dimmed, "Dim toggled");
        Ok(dimmed)
    }

    /// Apply one decoded feedback message from the mixer
    pub fn on_feedback(&self, message: &OscMessage) {
        let first = {
            let mut state = self.state.lock();
            let first = !state.feedback_received;
            state.feedback_received = true;

            match MixerAddress::parse(message.address()) {
                Some(MixerAddress::Volume(n)) if self.endpoint.faders.contains(&n) => {
                    match message.args().first().and_then(OscArg::as_f32) {
                        Some(v) if !v.is_nan() => {
                            state.volume = v.clamp(MIN_LEVEL, MAX_LEVEL);
                            trace!(fader = n, level = state.volume, "Level corrected from feedback");
                        }
                        _ => trace!("Fader feedback without a numeric argument: {}", message),
                    }
                }
                Some(other) => trace!("Feedback for {} not mirrored", other),
                None => trace!("Ignoring feedback for {}", message.address()),
            }

            first
        };

        if first {
            info!("✅ Received feedback from TotalMix - connection verified");
            self.connection_tx.send_replace(ConnectionStatus::Confirmed);
        }
    }

    /// Current connection state
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.connection_tx.borrow()
    }

    /// Watch for the one-time "connection verified" transition
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection_tx.subscribe()
    }

    /// Status for the display sink
    pub fn status(&self) -> StatusLine {
        let state = self.state.lock();
        StatusLine {
            level: state.volume,
            db: ApproxDb::from_level(state.volume, self.endpoint.unity_gain),
            muted: state.muted,
            dimmed: state.dimmed,
            connection: if state.feedback_received {
                ConnectionStatus::Confirmed
            } else {
                ConnectionStatus::AwaitingFeedback
            },
        }
    }

    /// Ask the command loop to exit at its next check
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// TotalMix switches take 1.0 for on and 0.0 for off
fn switch_value(on: bool) -> f32 {
    if on {
        1.0
    } else {
        0.0
    }
}
