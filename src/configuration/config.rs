use super::types::*;
use crate::error_handling::types::ConfigError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

/// Complete runtime configuration of the honeypot.
///
/// Loaded once at startup from a TOML file (see [`Config::from_file`]); every
/// field has a default, so an empty file or no file at all yields a working
/// deployment with the SSH emulator on 2222 and the RDP emulator on 3389.
///
/// # Fields Overview
///
/// - `bind_address`: interface the decoy services listen on
/// - `services`: the `(name, emulator, port)` list handed to the network listener
/// - `ssh` / `rdp`: per-emulator banners, budgets and timeouts
/// - `storage`: persistence backend selection
/// - `web`: ingestion / live monitoring / query HTTP surface
/// - `session_timeout_ms`: hard cap on a single session's lifetime, `0` disables it
/// - `shutdown_grace_ms`: how long shutdown waits for in-flight sessions
///
/// # Examples
///
/// ```
/// use snare::configuration::config::Config;
///
/// let config = Config::from_toml_str("[[services]]\nname = \"ssh\"\nemulator = \"ssh\"\nport = 2022\n").unwrap();
/// assert_eq!(config.services[0].port, 2022);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: IpAddr,
    pub services: Vec<ServiceConfig>,
    pub ssh: SshConfig,
    pub rdp: RdpConfig,
    pub storage: StorageConfig,
    pub web: WebConfig,
    pub session_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            services: vec![
                ServiceConfig::new("ssh", EmulatorKind::Ssh, 2222),
                ServiceConfig::new("rdp", EmulatorKind::Rdp, 3389),
            ],
            ssh: SshConfig::default(),
            rdp: RdpConfig::default(),
            storage: StorageConfig::default(),
            web: WebConfig::default(),
            session_timeout_ms: 3_600_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::IoError`] if the file cannot be read
    /// - [`ConfigError::TomlError`] if it is not valid TOML for this structure
    /// - any error returned by [`Config::validate`]
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        debug!("Parsed configuration: {:?}", config);
        Ok(config)
    }

    /// Checks the invariants the rest of the system relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let enabled: Vec<&ServiceConfig> = self.enabled_services().collect();
        if enabled.is_empty() {
            return Err(ConfigError::ServicesEmpty(
                "at least one enabled service is required".to_string(),
            ));
        }

        let mut ports = HashSet::new();
        for service in &enabled {
            if !ports.insert(service.port) {
                return Err(ConfigError::BadPortsRange(format!(
                    "port {} is used by more than one enabled service",
                    service.port
                )));
            }
        }

        if self.ssh.capture_bytes == 0 || self.rdp.capture_bytes == 0 {
            return Err(ConfigError::NotInRange(
                "capture_bytes must be greater than 0".to_string(),
            ));
        }
        if self.ssh.auth_timeout_ms == 0
            || self.ssh.command_timeout_ms == 0
            || self.rdp.read_timeout_ms == 0
        {
            return Err(ConfigError::NotInRange(
                "read timeouts must be greater than 0".to_string(),
            ));
        }
        if self.ssh.write_timeout_ms == 0 || self.rdp.write_timeout_ms == 0 {
            return Err(ConfigError::NotInRange(
                "write timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn enabled_services(&self) -> impl Iterator<Item = &ServiceConfig> {
        self.services.iter().filter(|s| s.enabled)
    }

    /// Keeps only the services whose port appears in `ports` enabled.
    pub fn restrict_to_ports(&mut self, ports: &[u16]) {
        for service in self.services.iter_mut() {
            if !ports.contains(&service.port) {
                debug!("Disabling service {} (port {} not requested)", service.name, service.port);
                service.enabled = false;
            }
        }
    }

    /// Applies the same capture byte budget to every emulator.
    pub fn set_capture_bytes(&mut self, bytes: usize) {
        self.ssh.capture_bytes = bytes;
        self.rdp.capture_bytes = bytes;
    }

    /// Points the sqlite backend at a database file, creating it if missing.
    pub fn set_database_path(&mut self, path: &Path) {
        self.storage.backend = StorageBackend::Sqlite;
        self.storage.database_url = format!("sqlite://{}?mode=rwc", path.display());
    }

    /// `None` when sessions may run until their peers go quiet.
    pub fn session_timeout(&self) -> Option<Duration> {
        match self.session_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Parses a comma separated port list such as `"2222, 3389"`.
pub fn parse_port_list(list: &str) -> Result<Vec<u16>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| ConfigError::BadPortsRange(format!("invalid port `{}`", p)))
        })
        .collect()
}
