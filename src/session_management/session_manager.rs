use crate::data_capture::SessionRecorder;
use crate::emulation::Emulator;
use crate::events::types::{Event, SessionEvent};
use crate::events::EventBus;
use crate::network::session_request::SessionRequest;
use crate::session_management::session::Session;
use crate::SessionStatus;
use chrono::Utc;
use log::{info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

/// The structure related to session management
///
/// Wraps every emulator run with the lifecycle bookkeeping that does not
/// depend on the protocol: identity, timing, counters and the two session
/// events (open and close) published on the bus.
///
/// # Fields Overview
///
/// - `bus`: where session events go, and what each session's recorder publishes to
/// - `active_sessions`: number of sessions currently inside [`SessionManager::handle_session`]
/// - `session_timeout`: optional cap on the lifetime of one session
pub struct SessionManager {
    bus: EventBus,
    active_sessions: AtomicUsize,
    session_timeout: Option<Duration>,
}

// Keeps the active count right even if the session future is dropped midway.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionManager {
    pub fn new(bus: EventBus, session_timeout: Option<Duration>) -> Self {
        Self {
            bus,
            active_sessions: AtomicUsize::new(0),
            session_timeout,
        }
    }

    /// Runs one accepted connection through `emulator` and returns the
    /// closed session record.
    ///
    /// The closing session event is published whatever the emulator did:
    /// normal close and lifetime cap give `completed`, an I/O error gives
    /// `error`. Errors never leave this function.
    pub async fn handle_session<S>(&self, request: SessionRequest<S>, emulator: &Emulator) -> Session
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let _active = ActiveGuard::enter(&self.active_sessions);
        let mut session = Session::open(request.client_addr, &request.service_name, request.timestamp);
        info!(
            "[{}] New {} session from {} on port {}",
            session.session_id, session.service, request.client_addr, request.local_port
        );
        self.publish(&session, session.start_time);

        let mut recorder = SessionRecorder::new(&session, request.local_port, self.bus.clone());
        let outcome = match self.session_timeout {
            Some(limit) => match timeout(limit, emulator.run(request.stream, &mut recorder)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    info!("[{}] Session reached its {:?} lifetime cap", session.session_id, limit);
                    Ok(())
                }
            },
            None => emulator.run(request.stream, &mut recorder).await,
        };

        let status = match outcome {
            Ok(()) => SessionStatus::Completed,
            Err(e) => {
                warn!("[{}] Session from {} failed: {}", session.session_id, request.client_addr, e);
                SessionStatus::Error
            }
        };

        let end_time = Utc::now();
        session.close(
            end_time,
            recorder.auth_attempts(),
            recorder.commands_count(),
            recorder.authenticated(),
            status,
        );
        self.publish(&session, end_time);

        info!(
            "[{}] Closed {} | auth: {} | cmds: {} | duration: {}s | {}",
            session.session_id,
            request.client_addr,
            session.auth_attempts,
            session.commands_count,
            session.duration_seconds.unwrap_or(0),
            session.status.as_str()
        );
        session
    }

    pub fn get_active_session_count(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    fn publish(&self, session: &Session, ts: chrono::DateTime<Utc>) {
        self.bus.publish(Event::Session(SessionEvent {
            ts,
            session: session.clone(),
        }));
    }
}
