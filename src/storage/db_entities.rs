//! SeaORM entity models used by the database storage backend.
//!
//! These structs map to the SQLite tables created by `database_storage`:
//! - `sessions`: one row per connection lifetime
//! - `auth_attempts`: captured credential submissions
//! - `commands`: fake shell commands with their canned answers
//! - `events`: generic network observations
//!
//! Timestamps are stored as RFC3339 strings and addresses as text. Rows carry
//! an auto-increment id so listings can be served newest first. Session
//! identifiers are plain columns, not foreign keys: ingested records may
//! reference sessions this process never saw.

use sea_orm::entity::prelude::*;

/// Sessions table entity model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    /// Auto-increment row id
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Opaque session identifier
    #[sea_orm(unique)]
    pub session_id: String,
    pub src_ip: String,
    pub src_port: Option<i32>,
    /// Service name (e.g. "ssh")
    pub service: String,
    /// RFC3339 start timestamp
    pub start_time: String,
    /// Optional RFC3339 end timestamp
    pub end_time: Option<String>,
    pub duration_seconds: Option<i64>,
    pub auth_attempts: i32,
    pub commands_count: i32,
    pub success_login: bool,
    /// Session status as lowercase label
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Auth attempts table entity models.
pub mod auth_attempts {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "auth_attempts")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub ts: String,
        pub src_ip: String,
        pub src_port: Option<i32>,
        pub username: String,
        pub password: String,
        pub success: bool,
        pub service: String,
        pub session_id: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Commands table entity models.
pub mod commands {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "commands")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub ts: String,
        pub session_id: String,
        pub src_ip: String,
        pub src_port: Option<i32>,
        pub command: String,
        pub response: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

/// Generic network events table entity models.
pub mod events {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "events")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub ts: String,
        pub session_id: Option<String>,
        pub src_ip: String,
        pub src_port: Option<i32>,
        pub dest_port: Option<i32>,
        pub protocol: Option<String>,
        pub service: Option<String>,
        pub payload_preview: Option<String>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
