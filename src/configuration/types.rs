use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

/// Which protocol emulator drives the connections accepted on a service port.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmulatorKind {
    Ssh,
    Rdp,
}

/// One exposed decoy endpoint.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name used in logs and stored on every session (e.g. `ssh`)
    pub name: String,
    pub emulator: EmulatorKind,
    pub port: u16,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ServiceConfig {
    pub fn new(name: &str, emulator: EmulatorKind, port: u16) -> Self {
        Self {
            name: name.to_string(),
            emulator,
            port,
            enabled: true,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new("ssh", EmulatorKind::Ssh, 2222)
    }
}

/// Tunables of the SSH-like emulator.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Identification line written right after accept (sent with CRLF)
    pub banner: String,
    /// Pause between the banner and the first read
    pub greeting_pause_ms: u64,
    /// Bounded wait for the credential chunk
    pub auth_timeout_ms: u64,
    /// Bounded wait for each command line
    pub command_timeout_ms: u64,
    /// Bounded wait for each reply to be written and flushed
    pub write_timeout_ms: u64,
    /// Byte budget of the credential read
    pub capture_bytes: usize,
    pub success_message: String,
    pub prompt: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            banner: "SSH-2.0-OpenSSH_8.2p1 Ubuntu-4ubuntu0.5".to_string(),
            greeting_pause_ms: 500,
            auth_timeout_ms: 10_000,
            command_timeout_ms: 30_000,
            write_timeout_ms: 10_000,
            capture_bytes: 1024,
            success_message: "Authentication successful".to_string(),
            prompt: "root@honeypot:~# ".to_string(),
        }
    }
}

/// Tunables of the RDP-like emulator.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RdpConfig {
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub capture_bytes: usize,
}

impl Default for RdpConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            capture_bytes: 1024,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SeaORM connection string, only read by the sqlite backend
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_url: "sqlite://honeypot_events.db?mode=rwc".to_string(),
        }
    }
}

/// HTTP surface: ingestion, live event stream and the read-only query API.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
        }
    }
}
