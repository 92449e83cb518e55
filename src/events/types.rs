//! Observation records and the envelope they travel in.
//!
//! Every record is immutable once built. Serialised through [`Event`] they
//! produce the envelope live monitors receive:
//!
//! ```text
//! {"type": "auth" | "command" | "session" | "generic",
//!  "session_id": ..., "src_ip": ..., "src_port": ..., "ts": ..., <type specific fields>}
//! ```

use crate::session_management::session::{Session, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One captured credential submission. `success` is always `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthAttempt {
    pub session_id: Option<SessionId>,
    pub ts: DateTime<Utc>,
    pub src_ip: IpAddr,
    pub src_port: Option<u16>,
    pub username: String,
    pub password: String,
    pub service: String,
    pub success: bool,
}

/// One command line typed into an emulated shell, with the canned answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub session_id: SessionId,
    pub ts: DateTime<Utc>,
    pub src_ip: IpAddr,
    pub src_port: Option<u16>,
    pub command: String,
    pub response: String,
}

/// Low-level connection observation (first bytes a peer sent, forwarded hits).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub session_id: Option<SessionId>,
    pub ts: DateTime<Utc>,
    pub src_ip: IpAddr,
    pub src_port: Option<u16>,
    pub dest_port: Option<u16>,
    pub protocol: Option<String>,
    pub service: Option<String>,
    pub payload_preview: Option<String>,
}

/// Session lifecycle update: published once when a session opens
/// (`status = active`) and once when it closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub session: Session,
}

/// Transport envelope published on the [`EventBus`](super::event_bus::EventBus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Generic(NetworkEvent),
    Auth(AuthAttempt),
    Command(CommandRecord),
    Session(SessionEvent),
}

/// The four event categories, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Auth,
    Command,
    Session,
    Generic,
}

impl EventKind {
    /// Maps a wire tag to a kind; anything unrecognised is `Generic`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "auth" => EventKind::Auth,
            "command" => EventKind::Command,
            "session" => EventKind::Session,
            _ => EventKind::Generic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Auth => "auth",
            EventKind::Command => "command",
            EventKind::Session => "session",
            EventKind::Generic => "generic",
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Generic(_) => EventKind::Generic,
            Event::Auth(_) => EventKind::Auth,
            Event::Command(_) => EventKind::Command,
            Event::Session(_) => EventKind::Session,
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            Event::Generic(e) => e.ts,
            Event::Auth(a) => a.ts,
            Event::Command(c) => c.ts,
            Event::Session(s) => s.ts,
        }
    }

    pub fn src_ip(&self) -> IpAddr {
        match self {
            Event::Generic(e) => e.src_ip,
            Event::Auth(a) => a.src_ip,
            Event::Command(c) => c.src_ip,
            Event::Session(s) => s.session.src_ip,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Event::Generic(e) => e.session_id.as_ref(),
            Event::Auth(a) => a.session_id.as_ref(),
            Event::Command(c) => Some(&c.session_id),
            Event::Session(s) => Some(&s.session.session_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn command() -> CommandRecord {
        CommandRecord {
            session_id: SessionId::from("4b0c-test"),
            ts: Utc::now(),
            src_ip: "198.51.100.7".parse().unwrap(),
            src_port: Some(40022),
            command: "whoami".to_string(),
            response: "root".to_string(),
        }
    }

    #[test]
    fn test_envelope_is_tagged_and_flat() {
        let json = serde_json::to_value(Event::Command(command())).unwrap();

        assert_eq!(json["type"], "command");
        assert_eq!(json["session_id"], "4b0c-test");
        assert_eq!(json["src_ip"], "198.51.100.7");
        assert_eq!(json["src_port"], 40022);
        assert_eq!(json["command"], "whoami");
        assert!(json["ts"].is_string());
    }

    #[test]
    fn test_session_envelope_flattens_record() {
        let start = Utc::now();
        let session = Session::open("192.0.2.10:5555".parse().unwrap(), "ssh", start);
        let event = Event::Session(SessionEvent {
            ts: start,
            session: session.clone(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "session");
        assert_eq!(json["session_id"], session.session_id.as_str());
        assert_eq!(json["status"], "active");
        assert_eq!(json["end_time"], Value::Null);

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_accessors() {
        let event = Event::Command(command());
        assert_eq!(event.kind(), EventKind::Command);
        assert_eq!(event.session_id().map(SessionId::as_str), Some("4b0c-test"));
        assert_eq!(event.src_ip().to_string(), "198.51.100.7");
    }

    #[test]
    fn test_unknown_tags_are_generic() {
        assert_eq!(EventKind::from_tag("auth"), EventKind::Auth);
        assert_eq!(EventKind::from_tag("event"), EventKind::Generic);
        assert_eq!(EventKind::from_tag(""), EventKind::Generic);
        assert_eq!(EventKind::Session.as_str(), "session");
    }
}
