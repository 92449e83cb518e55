use crate::SessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

/// Opaque session token.
///
/// Native sessions get a fresh UUIDv4 at accept time; ingested observations
/// may carry whatever identifier the external decoy chose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifetime record of one accepted connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub src_ip: IpAddr,
    pub src_port: Option<u16>,
    pub service: String,
    pub start_time: DateTime<Utc>,
    /// `None` while the connection is open
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub auth_attempts: u32,
    pub commands_count: u32,
    pub success_login: bool,
    pub status: SessionStatus,
}

impl Session {
    /// Starts a session record with a freshly generated identifier.
    pub fn open(client_addr: SocketAddr, service: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId::generate(),
            src_ip: client_addr.ip(),
            src_port: Some(client_addr.port()),
            service: service.to_string(),
            start_time,
            end_time: None,
            duration_seconds: None,
            auth_attempts: 0,
            commands_count: 0,
            success_login: false,
            status: SessionStatus::Active,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// Seals the record with its final counters.
    ///
    /// Returns `false` and leaves the record untouched if it was already
    /// closed: `end_time` is written at most once. The duration is clamped at
    /// zero when the wall clock stepped backwards during the session.
    pub fn close(
        &mut self,
        end_time: DateTime<Utc>,
        auth_attempts: u32,
        commands_count: u32,
        success_login: bool,
        status: SessionStatus,
    ) -> bool {
        if self.is_closed() {
            return false;
        }
        self.end_time = Some(end_time);
        self.duration_seconds = Some((end_time - self.start_time).num_seconds().max(0));
        self.auth_attempts = auth_attempts;
        self.commands_count = commands_count;
        self.success_login = success_login;
        self.status = status;
        true
    }

    /// Partial field map sent to storage when the session closes.
    pub fn closing_update(&self) -> SessionUpdate {
        SessionUpdate {
            end_time: self.end_time,
            duration_seconds: self.duration_seconds,
            auth_attempts: Some(self.auth_attempts),
            commands_count: Some(self.commands_count),
            success_login: Some(self.success_login),
            status: Some(self.status),
        }
    }
}

/// Partial update of a stored session; `None` leaves a column unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub auth_attempts: Option<u32>,
    pub commands_count: Option<u32>,
    pub success_login: Option<bool>,
    pub status: Option<SessionStatus>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        *self == SessionUpdate::default()
    }

    pub fn apply_to(&self, session: &mut Session) {
        if let Some(end_time) = self.end_time {
            session.end_time = Some(end_time);
        }
        if let Some(duration) = self.duration_seconds {
            session.duration_seconds = Some(duration);
        }
        if let Some(count) = self.auth_attempts {
            session.auth_attempts = count;
        }
        if let Some(count) = self.commands_count {
            session.commands_count = count;
        }
        if let Some(success) = self.success_login {
            session.success_login = success;
        }
        if let Some(status) = self.status {
            session.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn addr() -> SocketAddr {
        "203.0.113.45:51234".parse().unwrap()
    }

    #[test]
    fn test_open_generates_distinct_ids() {
        let now = Utc::now();
        let a = Session::open(addr(), "ssh", now);
        let b = Session::open(addr(), "ssh", now);

        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.src_port, Some(51234));
        assert_eq!(a.status, SessionStatus::Active);
        assert!(!a.is_closed());
    }

    #[test]
    fn test_close_only_once() {
        let start = Utc::now();
        let mut session = Session::open(addr(), "ssh", start);

        assert!(session.close(start + Duration::seconds(7), 1, 2, true, SessionStatus::Completed));
        assert!(!session.close(start + Duration::seconds(60), 9, 9, false, SessionStatus::Error));

        assert_eq!(session.duration_seconds, Some(7));
        assert_eq!(session.auth_attempts, 1);
        assert_eq!(session.commands_count, 2);
        assert_eq!(session.status, SessionStatus::Completed);
    }

    #[test]
    fn test_duration_is_clamped() {
        let start = Utc::now();
        let mut session = Session::open(addr(), "rdp", start);
        session.close(start - Duration::seconds(3), 0, 0, false, SessionStatus::Completed);

        assert_eq!(session.duration_seconds, Some(0));
    }

    #[test]
    fn test_closing_update_applies_back() {
        let start = Utc::now();
        let mut closed = Session::open(addr(), "ssh", start);
        let mut stored = closed.clone();
        closed.close(start + Duration::seconds(2), 3, 4, true, SessionStatus::Completed);

        let update = closed.closing_update();
        assert!(!update.is_empty());
        update.apply_to(&mut stored);
        assert_eq!(stored, closed);
        assert!(SessionUpdate::default().is_empty());
    }
}
