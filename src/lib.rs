//! TotalMix Remote
//!
//! Remote volume, mute and dim control for RME TotalMix FX over OSC/UDP.

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod osc;
pub mod sniffer;
pub mod transport;

pub use error::{Error, Result};
