//! Error types for the TotalMix remote controller

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Wire-format decode failures (a malformed control message)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("String at offset {0} is not NUL-terminated")]
    Unterminated(usize),

    #[error("Bad padding after string at offset {0}")]
    BadPadding(usize),

    #[error("Missing type tag string")]
    MissingTypeTags,

    #[error("Type tag string must start with ',' (got {0:?})")]
    BadTypeTags(String),

    #[error("Unsupported type tag '{0}'")]
    UnsupportedTag(char),

    #[error("Truncated message: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("String is not valid UTF-8")]
    InvalidUtf8,
}

/// Network transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Cannot bind receive socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Send to {target} failed: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot open outbound socket: {0}")]
    Outbound(#[source] std::io::Error),
}

/// Invalid startup configuration (fatal, raised before any socket is opened)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing target IP address")]
    MissingTarget,

    #[error("Invalid target IP address '{0}'")]
    InvalidTarget(String),

    #[error("{name} port must be between 1 and 65535")]
    InvalidPort { name: &'static str },

    #[error("Fader list is empty")]
    NoFaders,

    #[error("Invalid fader index '{0}' (faders are numbered from 1)")]
    InvalidFader(String),

    #[error("Step size {0} is outside (0, 1]")]
    InvalidStep(f32),

    #[error("Unity gain {0} is outside (0, 1]")]
    InvalidUnityGain(f32),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
