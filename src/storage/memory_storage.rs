//! Process-local storage backend.
//!
//! Same semantics as the database backend, nothing survives a restart. Used
//! when `storage.backend = "memory"` and by tests that need a `Storage`.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error_handling::types::StorageError;
use crate::events::types::{AuthAttempt, CommandRecord, NetworkEvent};
use crate::session_management::session::{Session, SessionId, SessionUpdate};
use crate::storage::storage_trait::Storage;
use crate::storage::types::{rank, Statistics};

#[derive(Default)]
struct Tables {
    sessions: Vec<Session>,
    auth_attempts: Vec<AuthAttempt>,
    commands: Vec<CommandRecord>,
    events: Vec<NetworkEvent>,
}

#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

fn newest<T: Clone>(rows: &[T], limit: u64) -> Vec<T> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    rows.iter().rev().take(limit).cloned().collect()
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|_| StorageError::WriteFailed("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut tables = self.tables()?;
        if tables.sessions.iter().any(|s| s.session_id == session.session_id) {
            return Err(StorageError::WriteFailed(format!(
                "session {} already exists",
                session.session_id
            )));
        }
        tables.sessions.push(session.clone());
        Ok(())
    }

    async fn update_session(
        &self,
        session_id: &SessionId,
        update: &SessionUpdate,
    ) -> Result<bool, StorageError> {
        let mut tables = self.tables()?;
        match tables.sessions.iter_mut().find(|s| &s.session_id == session_id) {
            Some(session) => {
                update.apply_to(session);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_auth_attempt(&self, attempt: &AuthAttempt) -> Result<(), StorageError> {
        self.tables()?.auth_attempts.push(attempt.clone());
        Ok(())
    }

    async fn insert_command(&self, command: &CommandRecord) -> Result<(), StorageError> {
        self.tables()?.commands.push(command.clone());
        Ok(())
    }

    async fn insert_event(&self, event: &NetworkEvent) -> Result<(), StorageError> {
        self.tables()?.events.push(event.clone());
        Ok(())
    }

    async fn get_sessions(&self, limit: u64) -> Result<Vec<Session>, StorageError> {
        Ok(newest(&self.tables()?.sessions, limit))
    }

    async fn get_auth_attempts(&self, limit: u64) -> Result<Vec<AuthAttempt>, StorageError> {
        Ok(newest(&self.tables()?.auth_attempts, limit))
    }

    async fn get_commands(&self, limit: u64) -> Result<Vec<CommandRecord>, StorageError> {
        Ok(newest(&self.tables()?.commands, limit))
    }

    async fn get_events(&self, limit: u64) -> Result<Vec<NetworkEvent>, StorageError> {
        Ok(newest(&self.tables()?.events, limit))
    }

    async fn get_statistics(&self) -> Result<Statistics, StorageError> {
        let tables = self.tables()?;
        Ok(Statistics {
            total_events: tables.events.len() as u64,
            total_auth_attempts: tables.auth_attempts.len() as u64,
            total_commands: tables.commands.len() as u64,
            total_sessions: tables.sessions.len() as u64,
            top_passwords: rank(tables.auth_attempts.iter().map(|a| a.password.clone())),
            top_usernames: rank(tables.auth_attempts.iter().map(|a| a.username.clone())),
            top_commands: rank(tables.commands.iter().map(|c| c.command.clone())),
            top_attacker_ips: rank(tables.events.iter().map(|e| e.src_ip.to_string())),
        })
    }
}
