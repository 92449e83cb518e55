//! Storage Trait
//!
//! This module defines the `Storage` trait, the persistence interface every
//! backend implements.
//!
//! Implementors of this trait are responsible for:
//! - Recording session lifecycles (create at open, partial update at close)
//! - Appending auth attempts, commands and generic network events
//! - Serving newest-first listings and aggregate statistics
//!
//! Every call must be safe to run concurrently; all of them return a
//! `Result` so the caller can log and carry on.

use crate::error_handling::types::StorageError;
use crate::events::types::{AuthAttempt, CommandRecord, NetworkEvent};
use crate::session_management::session::{Session, SessionId, SessionUpdate};
use crate::storage::types::Statistics;
use async_trait::async_trait;

/// The `Storage` trait defines the interface for persistence backends.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores a new session record.
    async fn create_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Applies a partial update to a stored session.
    ///
    /// Returns `false` when no session with this identifier exists.
    async fn update_session(
        &self,
        session_id: &SessionId,
        update: &SessionUpdate,
    ) -> Result<bool, StorageError>;

    async fn insert_auth_attempt(&self, attempt: &AuthAttempt) -> Result<(), StorageError>;

    async fn insert_command(&self, command: &CommandRecord) -> Result<(), StorageError>;

    /// Stores a generic network observation.
    async fn insert_event(&self, event: &NetworkEvent) -> Result<(), StorageError>;

    /// Most recently created sessions first, at most `limit`.
    async fn get_sessions(&self, limit: u64) -> Result<Vec<Session>, StorageError>;

    async fn get_auth_attempts(&self, limit: u64) -> Result<Vec<AuthAttempt>, StorageError>;

    async fn get_commands(&self, limit: u64) -> Result<Vec<CommandRecord>, StorageError>;

    async fn get_events(&self, limit: u64) -> Result<Vec<NetworkEvent>, StorageError>;

    async fn get_statistics(&self) -> Result<Statistics, StorageError>;
}
