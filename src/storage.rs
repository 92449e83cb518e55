//! Storage subsystem
//!
//! This module provides the persistence side of the honeypot: where sessions,
//! credentials, commands and raw network observations end up.
//!
//! Components:
//! - `storage_trait`: the Storage trait defining a uniform async API.
//! - `types`: statistics returned by the query side.
//! - `database_storage`: ORM-based SQLite implementation using SeaORM.
//! - `memory_storage`: in-process implementation with the same semantics.
//! - `db_entities`: SeaORM entity models for the database backend.
//! - `persister`: the event bus subscriber feeding a backend.

pub mod database_storage;
pub mod db_entities;
pub mod memory_storage;
pub mod persister;
pub mod storage_trait;
pub mod types;

pub use storage_trait::Storage;
