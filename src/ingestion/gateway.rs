//! Entry point for observations captured outside this process.
//!
//! External decoys (the web login simulator, for instance) post
//! `{"type": ..., "payload": {...}}` documents. The gateway validates them,
//! applies the same truncation and defaults as native captures, and
//! publishes the resulting [`Event`] on the bus. Subscribers cannot tell an
//! ingested event from a native one.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::net::{IpAddr, Ipv4Addr};

use crate::data_capture::credentials::{truncate, Credentials, MAX_COMMAND_LEN};
use crate::error_handling::types::IngestError;
use crate::events::types::{AuthAttempt, CommandRecord, Event, EventKind, NetworkEvent, SessionEvent};
use crate::events::EventBus;
use crate::session_management::session::{Session, SessionId};
use crate::SessionStatus;

/// Service recorded on ingested auth attempts and sessions that name none.
pub const DEFAULT_INGEST_SERVICE: &str = "web";

/// Raw ingestion document.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AuthPayload {
    session_id: Option<String>,
    ts: Option<DateTime<Utc>>,
    src_ip: Option<IpAddr>,
    src_port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommandPayload {
    session_id: String,
    command: String,
    ts: Option<DateTime<Utc>>,
    src_ip: Option<IpAddr>,
    src_port: Option<u16>,
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    session_id: String,
    ts: Option<DateTime<Utc>>,
    src_ip: Option<IpAddr>,
    src_port: Option<u16>,
    service: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
    auth_attempts: Option<u32>,
    commands_count: Option<u32>,
    success_login: Option<bool>,
    status: Option<SessionStatus>,
}

#[derive(Debug, Deserialize)]
struct GenericPayload {
    session_id: Option<String>,
    ts: Option<DateTime<Utc>>,
    src_ip: Option<IpAddr>,
    src_port: Option<u16>,
    dest_port: Option<u16>,
    protocol: Option<String>,
    service: Option<String>,
    payload_preview: Option<String>,
}

fn unspecified() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn parse_payload<T: DeserializeOwned>(payload: Map<String, Value>) -> Result<T, IngestError> {
    serde_json::from_value(Value::Object(payload)).map_err(|e| IngestError::InvalidPayload(e.to_string()))
}

/// Turns an ingestion document into the event it describes.
///
/// `now` stamps payloads without a `ts`.
///
/// # Errors
///
/// [`IngestError::InvalidPayload`] when the payload is not a JSON object or
/// misses a field its type requires.
pub fn to_event(request: IngestRequest, now: DateTime<Utc>) -> Result<Event, IngestError> {
    let payload = match request.payload {
        None => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(IngestError::InvalidPayload(format!(
                "payload must be an object, got {}",
                other
            )))
        }
    };
    let kind = EventKind::from_tag(request.kind.as_deref().unwrap_or_default());

    let event = match kind {
        EventKind::Auth => {
            let p: AuthPayload = parse_payload(payload)?;
            let credentials = Credentials::new(
                p.username.as_deref().unwrap_or_default(),
                p.password.as_deref().unwrap_or_default(),
            );
            Event::Auth(AuthAttempt {
                session_id: p.session_id.map(SessionId::from),
                ts: p.ts.unwrap_or(now),
                src_ip: p.src_ip.unwrap_or_else(unspecified),
                src_port: p.src_port,
                username: credentials.username,
                password: credentials.password,
                service: p.service.unwrap_or_else(|| DEFAULT_INGEST_SERVICE.to_string()),
                success: false,
            })
        }
        EventKind::Command => {
            let p: CommandPayload = parse_payload(payload)?;
            Event::Command(CommandRecord {
                session_id: SessionId::from(p.session_id),
                ts: p.ts.unwrap_or(now),
                src_ip: p.src_ip.unwrap_or_else(unspecified),
                src_port: p.src_port,
                command: truncate(&p.command, MAX_COMMAND_LEN),
                response: p.response.unwrap_or_default(),
            })
        }
        EventKind::Session => {
            let p: SessionPayload = parse_payload(payload)?;
            let ts = p.ts.unwrap_or(now);
            let status = p.status.unwrap_or(match p.end_time {
                Some(_) => SessionStatus::Completed,
                None => SessionStatus::Active,
            });
            Event::Session(SessionEvent {
                ts,
                session: Session {
                    session_id: SessionId::from(p.session_id),
                    src_ip: p.src_ip.unwrap_or_else(unspecified),
                    src_port: p.src_port,
                    service: p.service.unwrap_or_else(|| DEFAULT_INGEST_SERVICE.to_string()),
                    start_time: p.start_time.unwrap_or(ts),
                    end_time: p.end_time,
                    duration_seconds: p.duration_seconds.map(|d| d.max(0)),
                    auth_attempts: p.auth_attempts.unwrap_or(0),
                    commands_count: p.commands_count.unwrap_or(0),
                    success_login: p.success_login.unwrap_or(false),
                    status,
                },
            })
        }
        EventKind::Generic => {
            let p: GenericPayload = parse_payload(payload)?;
            Event::Generic(NetworkEvent {
                session_id: p.session_id.map(SessionId::from),
                ts: p.ts.unwrap_or(now),
                src_ip: p.src_ip.unwrap_or_else(unspecified),
                src_port: p.src_port,
                dest_port: p.dest_port,
                protocol: p.protocol,
                service: p.service,
                payload_preview: p.payload_preview,
            })
        }
    };
    Ok(event)
}

/// Validates external observations and republishes them on the bus.
#[derive(Debug, Clone)]
pub struct IngestionGateway {
    bus: EventBus,
}

impl IngestionGateway {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Parses a raw request body and ingests it.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidJson`] for a body that is not a JSON ingestion
    /// document, plus anything [`IngestionGateway::ingest`] rejects. Nothing
    /// is published on error.
    pub fn ingest_json(&self, body: &[u8]) -> Result<Event, IngestError> {
        let request: IngestRequest =
            serde_json::from_slice(body).map_err(|e| IngestError::InvalidJson(e.to_string()))?;
        self.ingest(request)
    }

    /// Publishes the event `request` describes and returns it.
    pub fn ingest(&self, request: IngestRequest) -> Result<Event, IngestError> {
        let declared = request.kind.clone();
        let event = to_event(request, Utc::now())?;
        if declared.as_deref() != Some(event.kind().as_str()) {
            debug!("Ingested type {:?} treated as {}", declared, event.kind().as_str());
        }
        info!(
            "[+] Ingested {} event from {}",
            event.kind().as_str(),
            event.src_ip()
        );
        self.bus.publish(event.clone());
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::credentials::{MAX_PASSWORD_LEN, MAX_USERNAME_LEN};
    use serde_json::json;

    fn gateway() -> (IngestionGateway, crate::events::EventSubscription) {
        let bus = EventBus::new();
        let monitor = bus.subscribe();
        (IngestionGateway::new(bus), monitor)
    }

    #[test]
    fn test_command_without_ts_is_stamped() {
        let (gateway, mut monitor) = gateway();
        let before = Utc::now();

        let event = gateway
            .ingest_json(br#"{"type":"command","payload":{"session_id":"x","command":"whoami"}}"#)
            .unwrap();

        match &event {
            Event::Command(record) => {
                assert_eq!(record.session_id.as_str(), "x");
                assert_eq!(record.command, "whoami");
                assert!(record.ts >= before && record.ts <= Utc::now());
                assert_eq!(record.src_ip, unspecified());
            }
            other => panic!("expected command, got {:?}", other),
        }
        assert_eq!(monitor.try_recv(), Some(event.clone()));

        let envelope = serde_json::to_value(&event).unwrap();
        assert_eq!(envelope["type"], "command");
        assert!(envelope["ts"].is_string());
    }

    #[test]
    fn test_supplied_ts_is_kept() {
        let event = to_event(
            serde_json::from_value(json!({
                "type": "generic",
                "payload": {"ts": "2024-05-01T10:00:00Z", "src_ip": "198.51.100.4", "dest_port": 80}
            }))
            .unwrap(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(event.ts().to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(event.src_ip().to_string(), "198.51.100.4");
    }

    #[test]
    fn test_unknown_type_is_generic() {
        let (gateway, _monitor) = gateway();
        for body in [
            r#"{"type":"event","payload":{"src_ip":"192.0.2.1"}}"#,
            r#"{"payload":{}}"#,
            r#"{"type":"AUTH"}"#,
        ] {
            let event = gateway.ingest_json(body.as_bytes()).unwrap();
            assert_eq!(event.kind(), EventKind::Generic, "{}", body);
        }
    }

    #[test]
    fn test_auth_is_forced_unsuccessful_and_truncated() {
        let (gateway, _monitor) = gateway();
        let body = json!({
            "type": "auth",
            "payload": {
                "username": "a".repeat(70),
                "password": "b".repeat(150),
                "success": true,
                "src_ip": "203.0.113.200"
            }
        })
        .to_string();

        match gateway.ingest_json(body.as_bytes()).unwrap() {
            Event::Auth(attempt) => {
                assert!(!attempt.success);
                assert_eq!(attempt.username.len(), MAX_USERNAME_LEN);
                assert_eq!(attempt.password.len(), MAX_PASSWORD_LEN);
                assert_eq!(attempt.service, DEFAULT_INGEST_SERVICE);
                assert_eq!(attempt.session_id, None);
            }
            other => panic!("expected auth, got {:?}", other),
        }
    }

    #[test]
    fn test_session_defaults() {
        let (gateway, _monitor) = gateway();
        let open = gateway
            .ingest_json(br#"{"type":"session","payload":{"session_id":"web-1","src_ip":"192.0.2.8"}}"#)
            .unwrap();
        match open {
            Event::Session(update) => {
                assert_eq!(update.session.status, SessionStatus::Active);
                assert_eq!(update.session.start_time, update.ts);
                assert!(!update.session.is_closed());
            }
            other => panic!("expected session, got {:?}", other),
        }

        let closed = gateway
            .ingest_json(
                br#"{"type":"session","payload":{"session_id":"web-1","end_time":"2024-05-01T10:00:05Z","auth_attempts":3}}"#,
            )
            .unwrap();
        match closed {
            Event::Session(update) => {
                assert_eq!(update.session.status, SessionStatus::Completed);
                assert_eq!(update.session.auth_attempts, 3);
            }
            other => panic!("expected session, got {:?}", other),
        }
    }

    #[test]
    fn test_rejections_publish_nothing() {
        let (gateway, mut monitor) = gateway();

        assert!(matches!(
            gateway.ingest_json(b"{not json"),
            Err(IngestError::InvalidJson(_))
        ));
        assert!(matches!(
            gateway.ingest_json(br#"{"type":"auth","payload":[1,2]}"#),
            Err(IngestError::InvalidPayload(_))
        ));
        assert!(matches!(
            gateway.ingest_json(br#"{"type":"command","payload":{"session_id":"x"}}"#),
            Err(IngestError::InvalidPayload(_))
        ));
        assert!(matches!(
            gateway.ingest_json(br#"{"type":"session","payload":{"src_ip":"192.0.2.1"}}"#),
            Err(IngestError::InvalidPayload(_))
        ));
        assert!(matches!(
            gateway.ingest_json(br#"{"type":"auth","payload":{"src_ip":"not-an-ip"}}"#),
            Err(IngestError::InvalidPayload(_))
        ));
        assert!(monitor.try_recv().is_none());
    }
}
