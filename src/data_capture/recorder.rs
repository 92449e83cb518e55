//! Per-session observation recorder.
//!
//! A `SessionRecorder` is the only path from an emulator to the rest of the
//! system. The emulator reports what it saw; the recorder stamps each
//! observation with the session identity, publishes it on the
//! [`EventBus`] and tallies it. The recorder is owned by the session task and
//! lent to the emulator as `&mut`, so its counters are never shared and need
//! no lock.
//!
//! Minimal usage
//! ```
//! use chrono::Utc;
//! use snare::data_capture::credentials::Credentials;
//! use snare::data_capture::SessionRecorder;
//! use snare::events::EventBus;
//! use snare::session_management::session::Session;
//!
//! let bus = EventBus::new();
//! let mut monitor = bus.subscribe();
//! let session = Session::open("203.0.113.9:40000".parse().unwrap(), "ssh", Utc::now());
//! let mut recorder = SessionRecorder::new(&session, 2222, bus);
//!
//! recorder.record_auth(&Credentials::new("admin", "toor"), "SSH");
//! assert_eq!(recorder.auth_attempts(), 1);
//! assert!(monitor.try_recv().is_some());
//! ```

use chrono::Utc;
use log::{debug, trace, warn};
use std::net::SocketAddr;

use crate::events::types::{AuthAttempt, CommandRecord, Event, NetworkEvent};
use crate::events::EventBus;
use crate::session_management::session::{Session, SessionId};

use super::credentials::{payload_preview, truncate, Credentials, MAX_COMMAND_LEN};

const PREVIEW_LOG_BYTES: usize = 64;

/// Stamps, publishes and counts the observations of one session.
///
/// # Fields Overview
///
/// - `session_id` / `client_addr` / `service` / `local_port`: identity copied
///   from the supervisor's [`Session`] record at open time
/// - `bus`: where every observation is published
/// - `auth_attempts` / `commands_count`: number of events actually published
/// - `authenticated`: set once the emulator granted its fake shell
pub struct SessionRecorder {
    session_id: SessionId,
    client_addr: SocketAddr,
    service: String,
    local_port: u16,
    bus: EventBus,
    auth_attempts: u32,
    commands_count: u32,
    authenticated: bool,
}

impl SessionRecorder {
    pub fn new(session: &Session, local_port: u16, bus: EventBus) -> Self {
        let client_addr = SocketAddr::new(session.src_ip, session.src_port.unwrap_or(0));
        debug!("[{}] Recorder attached for {}", session.session_id, client_addr);
        Self {
            session_id: session.session_id.clone(),
            client_addr,
            service: session.service.clone(),
            local_port,
            bus,
            auth_attempts: 0,
            commands_count: 0,
            authenticated: false,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    /// Publishes one credential submission. `success` is always `false`.
    pub fn record_auth(&mut self, credentials: &Credentials, service: &str) {
        warn!(
            "[{}] {} auth attempt from {}: {}:{}",
            self.session_id, service, self.client_addr, credentials.username, credentials.password
        );
        self.auth_attempts += 1;
        self.bus.publish(Event::Auth(AuthAttempt {
            session_id: Some(self.session_id.clone()),
            ts: Utc::now(),
            src_ip: self.client_addr.ip(),
            src_port: Some(self.client_addr.port()),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            service: service.to_string(),
            success: false,
        }));
    }

    /// Publishes one executed command with the answer the peer was sent.
    pub fn record_command(&mut self, command: &str, response: &str) {
        let command = truncate(command, MAX_COMMAND_LEN);
        debug!("[{}] {} executed: {}", self.session_id, self.client_addr, command);
        self.commands_count += 1;
        self.bus.publish(Event::Command(CommandRecord {
            session_id: self.session_id.clone(),
            ts: Utc::now(),
            src_ip: self.client_addr.ip(),
            src_port: Some(self.client_addr.port()),
            command,
            response: response.to_string(),
        }));
    }

    /// Publishes the raw bytes a peer sent as a generic network event.
    pub fn record_payload(&mut self, data: &[u8]) {
        trace!(
            "[{}] payload preview ({} bytes): {:?}",
            self.session_id,
            data.len(),
            payload_preview(&data[..data.len().min(PREVIEW_LOG_BYTES)])
        );
        self.bus.publish(Event::Generic(NetworkEvent {
            session_id: Some(self.session_id.clone()),
            ts: Utc::now(),
            src_ip: self.client_addr.ip(),
            src_port: Some(self.client_addr.port()),
            dest_port: Some(self.local_port),
            protocol: Some("tcp".to_string()),
            service: Some(self.service.clone()),
            payload_preview: Some(payload_preview(data)),
        }));
    }

    pub fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }

    pub fn auth_attempts(&self) -> u32 {
        self.auth_attempts
    }

    pub fn commands_count(&self) -> u32 {
        self.commands_count
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated
    }
}
