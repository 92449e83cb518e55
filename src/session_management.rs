//! Session management core module.
//!
//! This module provides the session record, its status, and the session
//! manager that wraps every emulator run with lifecycle bookkeeping.

use serde::{Deserialize, Serialize};

/// Submodule for session data structures and utilities.
pub mod session;
/// Submodule for session manager implementation.
pub mod session_manager;

/// Represents the current status of a session.
///
/// Variants:
/// - `Active`: the connection is still open.
/// - `Completed`: the session ended normally (peer closed or went quiet).
/// - `Error`: the emulator stopped on an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }

    /// Lenient reverse of [`SessionStatus::as_str`]; unknown text maps to `Error`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "active" => SessionStatus::Active,
            "completed" => SessionStatus::Completed,
            _ => SessionStatus::Error,
        }
    }
}
