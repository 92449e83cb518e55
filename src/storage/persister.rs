//! Bus-driven persistence.
//!
//! A single `Persister` subscribes to the event bus and writes every event to
//! the storage backend in bus order. Native and ingested observations reach
//! storage the same way. Storage failures are logged and skipped: the
//! sessions that produced the events never see them.

use std::sync::Arc;

use log::{debug, error, info};
use tokio::task::JoinHandle;

use crate::error_handling::types::StorageError;
use crate::events::types::{Event, SessionEvent};
use crate::events::EventSubscription;
use crate::storage::storage_trait::Storage;
use crate::SessionStatus;

pub struct Persister {
    storage: Arc<dyn Storage>,
}

impl Persister {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Starts draining `events` on a background task.
    ///
    /// The task ends once every bus clone is dropped and the backlog is
    /// written; it returns how many events were stored successfully.
    pub fn spawn(self, events: EventSubscription) -> JoinHandle<u64> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(self, mut events: EventSubscription) -> u64 {
        let mut stored = 0;
        while let Some(event) = events.recv().await {
            match self.apply(&event).await {
                Ok(()) => stored += 1,
                Err(e) => error!(
                    "[!] Failed to persist {} event from {}: {}",
                    event.kind().as_str(),
                    event.src_ip(),
                    e
                ),
            }
        }
        info!("[-] Persister drained, {} events stored", stored);
        stored
    }

    /// Writes one event to storage.
    pub async fn apply(&self, event: &Event) -> Result<(), StorageError> {
        match event {
            Event::Session(update) => self.apply_session(update).await,
            Event::Auth(attempt) => self.storage.insert_auth_attempt(attempt).await,
            Event::Command(command) => self.storage.insert_command(command).await,
            Event::Generic(network) => self.storage.insert_event(network).await,
        }
    }

    // An open session is created. A closing update for a session storage
    // never heard of (e.g. ingested) is stored as a full record instead.
    async fn apply_session(&self, update: &SessionEvent) -> Result<(), StorageError> {
        let session = &update.session;
        if session.status == SessionStatus::Active && !session.is_closed() {
            return self.storage.create_session(session).await;
        }

        let matched = self
            .storage
            .update_session(&session.session_id, &session.closing_update())
            .await?;
        if !matched {
            debug!("[{}] Closing update for unknown session, storing it whole", session.session_id);
            self.storage.create_session(session).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::StorageError;
    use crate::events::types::{AuthAttempt, CommandRecord, NetworkEvent};
    use crate::events::EventBus;
    use crate::session_management::session::{Session, SessionId, SessionUpdate};
    use crate::storage::memory_storage::MemoryStorage;
    use crate::storage::types::Statistics;
    use async_trait::async_trait;
    use chrono::Utc;

    fn session_event(session: &Session) -> Event {
        Event::Session(SessionEvent {
            ts: Utc::now(),
            session: session.clone(),
        })
    }

    fn command(session: &Session, text: &str) -> Event {
        Event::Command(CommandRecord {
            session_id: session.session_id.clone(),
            ts: Utc::now(),
            src_ip: session.src_ip,
            src_port: session.src_port,
            command: text.to_string(),
            response: String::new(),
        })
    }

    #[tokio::test]
    async fn test_lifecycle_reaches_storage_in_order() {
        let storage = Arc::new(MemoryStorage::new());
        let bus = EventBus::new();
        let persister = Persister::new(storage.clone()).spawn(bus.subscribe());

        let mut session = Session::open("192.0.2.50:5050".parse().unwrap(), "ssh", Utc::now());
        bus.publish(session_event(&session));
        bus.publish(command(&session, "uname -a"));
        session.close(Utc::now(), 0, 1, true, SessionStatus::Completed);
        bus.publish(session_event(&session));
        drop(bus);

        assert_eq!(persister.await.unwrap(), 3);
        let stored = storage.get_sessions(10).await.unwrap();
        assert_eq!(stored, vec![session]);
        assert_eq!(storage.get_commands(10).await.unwrap()[0].command, "uname -a");
    }

    #[tokio::test]
    async fn test_closing_update_without_create_is_stored_whole() {
        let storage = Arc::new(MemoryStorage::new());
        let persister = Persister::new(storage.clone());

        let mut session = Session::open("192.0.2.51:1".parse().unwrap(), "web", Utc::now());
        session.close(Utc::now(), 2, 0, false, SessionStatus::Completed);
        persister.apply(&session_event(&session)).await.unwrap();

        assert_eq!(storage.get_sessions(10).await.unwrap(), vec![session]);
    }

    struct FailingStorage;

    #[async_trait]
    impl Storage for FailingStorage {
        async fn create_session(&self, _: &Session) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed("disk full".into()))
        }
        async fn update_session(&self, _: &SessionId, _: &SessionUpdate) -> Result<bool, StorageError> {
            Err(StorageError::WriteFailed("disk full".into()))
        }
        async fn insert_auth_attempt(&self, _: &AuthAttempt) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed("disk full".into()))
        }
        async fn insert_command(&self, _: &CommandRecord) -> Result<(), StorageError> {
            Ok(())
        }
        async fn insert_event(&self, _: &NetworkEvent) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed("disk full".into()))
        }
        async fn get_sessions(&self, _: u64) -> Result<Vec<Session>, StorageError> {
            Ok(Vec::new())
        }
        async fn get_auth_attempts(&self, _: u64) -> Result<Vec<AuthAttempt>, StorageError> {
            Ok(Vec::new())
        }
        async fn get_commands(&self, _: u64) -> Result<Vec<CommandRecord>, StorageError> {
            Ok(Vec::new())
        }
        async fn get_events(&self, _: u64) -> Result<Vec<NetworkEvent>, StorageError> {
            Ok(Vec::new())
        }
        async fn get_statistics(&self) -> Result<Statistics, StorageError> {
            Ok(Statistics::default())
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_drain() {
        let bus = EventBus::new();
        let persister = Persister::new(Arc::new(FailingStorage)).spawn(bus.subscribe());

        let session = Session::open("192.0.2.52:2".parse().unwrap(), "ssh", Utc::now());
        bus.publish(session_event(&session));
        bus.publish(command(&session, "id"));
        bus.publish(command(&session, "pwd"));
        drop(bus);

        assert_eq!(persister.await.unwrap(), 2);
    }
}
