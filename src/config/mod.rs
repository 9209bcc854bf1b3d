//! Configuration management for the TotalMix remote
//!
//! Settings come from an optional YAML file, then command-line flags
//! override individual values. The merged `MixerConfig` is validated into
//! an immutable `EndpointConfig` before any socket is opened.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use tokio::fs;

use crate::error::ConfigError;

/// TotalMix "Port incoming": where the mixer listens for commands
pub const DEFAULT_SEND_PORT: u16 = 7001;
/// TotalMix "Port outgoing": where the mixer sends feedback
pub const DEFAULT_RECEIVE_PORT: u16 = 9001;
/// Roughly 1 dB per step
pub const DEFAULT_STEP: f32 = 0.02;
/// Fader value TotalMix shows as 0 dB (varies slightly per interface)
pub const DEFAULT_UNITY_GAIN: f32 = 0.7197;
/// All six analog stereo outputs
pub const DEFAULT_FADERS: &str = "1,2,3,4,5,6";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mixer: MixerConfig,
}

/// Mixer endpoint settings as written by the user
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MixerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default = "default_send_port")]
    pub send_port: u16,
    #[serde(default = "default_receive_port")]
    pub receive_port: u16,
    #[serde(default = "default_step")]
    pub step: f32,
    #[serde(default = "default_unity_gain")]
    pub unity_gain: f32,
    #[serde(default = "default_faders")]
    pub faders: FaderSpec,
}

/// Fader list, either a YAML sequence or a comma-separated string
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FaderSpec {
    List(Vec<u32>),
    Csv(String),
}

/// Validated, immutable endpoint configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointConfig {
    pub ip: IpAddr,
    pub send_port: u16,
    pub receive_port: u16,
    pub step: f32,
    pub unity_gain: f32,
    /// Non-empty, every index >= 1
    pub faders: BTreeSet<u32>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            ip: None,
            send_port: DEFAULT_SEND_PORT,
            receive_port: DEFAULT_RECEIVE_PORT,
            step: DEFAULT_STEP,
            unity_gain: DEFAULT_UNITY_GAIN,
            faders: default_faders(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }
}

impl MixerConfig {
    /// Validate into an `EndpointConfig`
    pub fn validate(&self) -> std::result::Result<EndpointConfig, ConfigError> {
        let ip_str = self
            .ip
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingTarget)?;
        let ip: IpAddr = ip_str
            .parse()
            .map_err(|_| ConfigError::InvalidTarget(ip_str.to_string()))?;

        if self.send_port == 0 {
            return Err(ConfigError::InvalidPort { name: "Send" });
        }
        if self.receive_port == 0 {
            return Err(ConfigError::InvalidPort { name: "Receive" });
        }
        // Written so NaN fails too
        if !(self.step > 0.0 && self.step <= 1.0) {
            return Err(ConfigError::InvalidStep(self.step));
        }
        if !(self.unity_gain > 0.0 && self.unity_gain <= 1.0) {
            return Err(ConfigError::InvalidUnityGain(self.unity_gain));
        }

        let faders = match &self.faders {
            FaderSpec::Csv(s) => parse_fader_list(s)?,
            FaderSpec::List(list) => {
                if let Some(bad) = list.iter().find(|&&n| n == 0) {
                    return Err(ConfigError::InvalidFader(bad.to_string()));
                }
                list.iter().copied().collect()
            }
        };
        if faders.is_empty() {
            return Err(ConfigError::NoFaders);
        }

        Ok(EndpointConfig {
            ip,
            send_port: self.send_port,
            receive_port: self.receive_port,
            step: self.step,
            unity_gain: self.unity_gain,
            faders,
        })
    }
}

impl EndpointConfig {
    /// Endpoint with default ports, step, unity gain and faders
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            send_port: DEFAULT_SEND_PORT,
            receive_port: DEFAULT_RECEIVE_PORT,
            step: DEFAULT_STEP,
            unity_gain: DEFAULT_UNITY_GAIN,
            faders: (1..=6).collect(),
        }
    }

    pub fn with_faders(mut self, faders: impl IntoIterator<Item = u32>) -> Self {
        self.faders = faders.into_iter().collect();
        self
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    /// Where commands are sent
    pub fn target(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.send_port)
    }
}

/// Parse `"1, 2,3"` into a fader set; blank entries are skipped
pub fn parse_fader_list(s: &str) -> std::result::Result<BTreeSet<u32>, ConfigError> {
    let mut faders = BTreeSet::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<u32>() {
            Ok(n) if n > 0 => {
                faders.insert(n);
            }
            _ => return Err(ConfigError::InvalidFader(part.to_string())),
        }
    }
    Ok(faders)
}

// Default value functions
fn default_send_port() -> u16 { DEFAULT_SEND_PORT }
fn default_receive_port() -> u16 { DEFAULT_RECEIVE_PORT }
fn default_step() -> f32 { DEFAULT_STEP }
fn default_unity_gain() -> f32 { DEFAULT_UNITY_GAIN }
fn default_faders() -> FaderSpec { FaderSpec::Csv(DEFAULT_FADERS.to_string()) }

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn mixer(ip: &str) -> MixerConfig {
        MixerConfig {
            ip: Some(ip.to_string()),
            ..MixerConfig::default()
        }
    }

    #[test]
    fn test_defaults_validate() {
        let endpoint = mixer("192.168.1.100").validate().unwrap();

        assert_eq!(endpoint.ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)));
        assert_eq!(endpoint.send_port, 7001);
        assert_eq!(endpoint.receive_port, 9001);
        assert_eq!(endpoint.step, 0.02);
        assert_eq!(endpoint.unity_gain, 0.7197);
        assert_eq!(endpoint.faders, (1..=6).collect::<BTreeSet<u32>>());
        assert_eq!(endpoint, EndpointConfig::new(endpoint.ip));
        assert_eq!(endpoint.target().to_string(), "192.168.1.100:7001");
    }

    #[test]
    fn test_missing_and_invalid_target() {
        assert_eq!(MixerConfig::default().validate(), Err(ConfigError::MissingTarget));
        assert_eq!(mixer("  ").validate(), Err(ConfigError::MissingTarget));
        assert_eq!(
            mixer("totalmix.local").validate(),
            Err(ConfigError::InvalidTarget("totalmix.local".into()))
        );
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut cfg = mixer("10.0.0.2");
        cfg.receive_port = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidPort { name: "Receive" }));
    }

    #[test]
    fn test_step_and_unity_bounds() {
        let mut cfg = mixer("10.0.0.2");
        cfg.step = 0.0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidStep(0.0)));
        cfg.step = f32::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidStep(_))));

        let mut cfg = mixer("10.0.0.2");
        cfg.unity_gain = 1.5;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidUnityGain(1.5)));
    }

    #[test]
    fn test_fader_list_parsing() {
        assert_eq!(parse_fader_list("1, 2,3").unwrap(), BTreeSet::from([1, 2, 3]));
        assert_eq!(parse_fader_list("2,2,1,").unwrap(), BTreeSet::from([1, 2]));
        assert_eq!(parse_fader_list("").unwrap(), BTreeSet::new());
        assert_eq!(parse_fader_list("1,x"), Err(ConfigError::InvalidFader("x".into())));
        assert_eq!(parse_fader_list("0"), Err(ConfigError::InvalidFader("0".into())));
    }

    #[test]
    fn test_empty_fader_set_rejected() {
        let mut cfg = mixer("10.0.0.2");
        cfg.faders = FaderSpec::Csv(" , ".into());
        assert_eq!(cfg.validate(), Err(ConfigError::NoFaders));

        cfg.faders = FaderSpec::List(vec![]);
        assert_eq!(cfg.validate(), Err(ConfigError::NoFaders));

        cfg.faders = FaderSpec::List(vec![1, 0]);
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidFader("0".into())));
    }

    #[tokio::test]
    async fn test_load_yaml() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("totalmix.yaml");

        let yaml = r#"
mixer:
  ip: "192.168.1.50"
  send_port: 7009
  receive_port: 9009
  faders: [1, 2]
"#;
        std::fs::write(&path, yaml)?;

        let config = AppConfig::load(&path.to_string_lossy()).await?;
        assert_eq!(config.mixer.faders, FaderSpec::List(vec![1, 2]));
        assert_eq!(config.mixer.step, DEFAULT_STEP);

        let endpoint = config.mixer.validate()?;
        assert_eq!(endpoint.send_port, 7009);
        assert_eq!(endpoint.receive_port, 9009);
        assert_eq!(endpoint.faders, BTreeSet::from([1, 2]));

        Ok(())
    }

    #[tokio::test]
    async fn test_load_yaml_with_csv_faders() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("totalmix.yaml");
        std::fs::write(&path, "mixer:\n  ip: \"10.0.0.7\"\n  faders: \"3,4\"\n")?;

        let config = AppConfig::load(&path.to_string_lossy()).await?;
        assert_eq!(config.mixer.validate()?.faders, BTreeSet::from([3, 4]));

        Ok(())
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        assert!(AppConfig::load("/nonexistent/totalmix.yaml").await.is_err());
    }
}
