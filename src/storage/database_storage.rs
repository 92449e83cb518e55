//! SQLite persistence through SeaORM.

use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Schema, Statement,
};

use crate::error_handling::types::StorageError;
use crate::events::types::{AuthAttempt, CommandRecord, NetworkEvent};
use crate::session_management::session::{Session, SessionId, SessionUpdate};
use crate::storage::db_entities::{self, auth_attempts, commands, events};
use crate::storage::storage_trait::Storage;
use crate::storage::types::{Statistics, TopEntry, TOP_N};
use crate::SessionStatus;

pub struct DatabaseStorage {
    db: DatabaseConnection,
}

fn write_failed(e: DbErr) -> StorageError {
    StorageError::WriteFailed(e.to_string())
}

fn read_failed(e: DbErr) -> StorageError {
    StorageError::ReadFailed(e.to_string())
}

// Fixed width so stored timestamps also sort as text.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::ReadFailed(format!("bad timestamp `{}`: {}", raw, e)))
}

fn parse_ip(raw: &str) -> Result<IpAddr, StorageError> {
    raw.parse()
        .map_err(|_| StorageError::ReadFailed(format!("bad address `{}`", raw)))
}

fn to_port(port: Option<i32>) -> Option<u16> {
    port.and_then(|p| u16::try_from(p).ok())
}

fn to_count(count: i32) -> u32 {
    u32::try_from(count).unwrap_or(0)
}

fn from_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

impl DatabaseStorage {
    /// Connects to `database_url` and creates the tables if missing.
    ///
    /// # Errors
    ///
    /// [`StorageError::ConnectionFailed`] if the database cannot be opened,
    /// [`StorageError::WriteFailed`] if the schema cannot be created.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let db = Database::connect(database_url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        let storage = Self { db };
        storage.create_schema().await?;
        info!("[+] Database ready at {}", database_url);
        Ok(storage)
    }

    /// Opens (or creates) a SQLite file, creating its parent directory too.
    pub async fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        }
        Self::connect(&format!("sqlite://{}?mode=rwc", path.display())).await
    }

    async fn create_schema(&self) -> Result<(), StorageError> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut tables = vec![
            schema.create_table_from_entity(db_entities::Entity),
            schema.create_table_from_entity(auth_attempts::Entity),
            schema.create_table_from_entity(commands::Entity),
            schema.create_table_from_entity(events::Entity),
        ];
        for table in tables.iter_mut() {
            table.if_not_exists();
            self.db
                .execute(backend.build(&*table))
                .await
                .map_err(write_failed)?;
        }
        debug!("Database schema checked");
        Ok(())
    }

    // `column` and `table` are compile-time names, never user input.
    async fn top(&self, column: &str, table: &str) -> Result<Vec<TopEntry>, StorageError> {
        let sql = format!(
            "SELECT {col} AS value, COUNT(*) AS count FROM {table} WHERE {col} IS NOT NULL \
             GROUP BY {col} ORDER BY count DESC, value ASC LIMIT {limit}",
            col = column,
            table = table,
            limit = TOP_N
        );
        let backend = self.db.get_database_backend();
        let rows = self
            .db
            .query_all(Statement::from_string(backend, sql))
            .await
            .map_err(read_failed)?;

        rows.iter()
            .map(|row| {
                let value: String = row.try_get("", "value").map_err(read_failed)?;
                let count: i64 = row.try_get("", "count").map_err(read_failed)?;
                Ok(TopEntry {
                    value,
                    count: u64::try_from(count).unwrap_or(0),
                })
            })
            .collect()
    }
}

fn session_from_row(row: db_entities::Model) -> Result<Session, StorageError> {
    Ok(Session {
        session_id: SessionId::from(row.session_id),
        src_ip: parse_ip(&row.src_ip)?,
        src_port: to_port(row.src_port),
        service: row.service,
        start_time: parse_ts(&row.start_time)?,
        end_time: row.end_time.as_deref().map(parse_ts).transpose()?,
        duration_seconds: row.duration_seconds,
        auth_attempts: to_count(row.auth_attempts),
        commands_count: to_count(row.commands_count),
        success_login: row.success_login,
        status: SessionStatus::from_label(&row.status),
    })
}

fn auth_from_row(row: auth_attempts::Model) -> Result<AuthAttempt, StorageError> {
    Ok(AuthAttempt {
        session_id: row.session_id.map(SessionId::from),
        ts: parse_ts(&row.ts)?,
        src_ip: parse_ip(&row.src_ip)?,
        src_port: to_port(row.src_port),
        username: row.username,
        password: row.password,
        service: row.service,
        success: row.success,
    })
}

fn command_from_row(row: commands::Model) -> Result<CommandRecord, StorageError> {
    Ok(CommandRecord {
        session_id: SessionId::from(row.session_id),
        ts: parse_ts(&row.ts)?,
        src_ip: parse_ip(&row.src_ip)?,
        src_port: to_port(row.src_port),
        command: row.command,
        response: row.response,
    })
}

fn event_from_row(row: events::Model) -> Result<NetworkEvent, StorageError> {
    Ok(NetworkEvent {
        session_id: row.session_id.map(SessionId::from),
        ts: parse_ts(&row.ts)?,
        src_ip: parse_ip(&row.src_ip)?,
        src_port: to_port(row.src_port),
        dest_port: to_port(row.dest_port),
        protocol: row.protocol,
        service: row.service,
        payload_preview: row.payload_preview,
    })
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn create_session(&self, session: &Session) -> Result<(), StorageError> {
        let row = db_entities::ActiveModel {
            id: NotSet,
            session_id: Set(session.session_id.to_string()),
            src_ip: Set(session.src_ip.to_string()),
            src_port: Set(session.src_port.map(i32::from)),
            service: Set(session.service.clone()),
            start_time: Set(format_ts(session.start_time)),
            end_time: Set(session.end_time.map(format_ts)),
            duration_seconds: Set(session.duration_seconds),
            auth_attempts: Set(from_count(session.auth_attempts)),
            commands_count: Set(from_count(session.commands_count)),
            success_login: Set(session.success_login),
            status: Set(session.status.as_str().to_string()),
        };
        db_entities::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await
            .map_err(write_failed)?;
        Ok(())
    }

    async fn update_session(
        &self,
        session_id: &SessionId,
        update: &SessionUpdate,
    ) -> Result<bool, StorageError> {
        let matching = db_entities::Column::SessionId.eq(session_id.as_str());
        if update.is_empty() {
            let found = db_entities::Entity::find()
                .filter(matching)
                .count(&self.db)
                .await
                .map_err(read_failed)?;
            return Ok(found > 0);
        }

        let mut query = db_entities::Entity::update_many().filter(matching);
        if let Some(end_time) = update.end_time {
            query = query.col_expr(db_entities::Column::EndTime, Expr::value(format_ts(end_time)));
        }
        if let Some(duration) = update.duration_seconds {
            query = query.col_expr(db_entities::Column::DurationSeconds, Expr::value(duration));
        }
        if let Some(count) = update.auth_attempts {
            query = query.col_expr(db_entities::Column::AuthAttempts, Expr::value(from_count(count)));
        }
        if let Some(count) = update.commands_count {
            query = query.col_expr(db_entities::Column::CommandsCount, Expr::value(from_count(count)));
        }
        if let Some(success) = update.success_login {
            query = query.col_expr(db_entities::Column::SuccessLogin, Expr::value(success));
        }
        if let Some(status) = update.status {
            query = query.col_expr(db_entities::Column::Status, Expr::value(status.as_str()));
        }

        let result = query.exec(&self.db).await.map_err(write_failed)?;
        Ok(result.rows_affected > 0)
    }

    async fn insert_auth_attempt(&self, attempt: &AuthAttempt) -> Result<(), StorageError> {
        let row = auth_attempts::ActiveModel {
            id: NotSet,
            ts: Set(format_ts(attempt.ts)),
            src_ip: Set(attempt.src_ip.to_string()),
            src_port: Set(attempt.src_port.map(i32::from)),
            username: Set(attempt.username.clone()),
            password: Set(attempt.password.clone()),
            success: Set(attempt.success),
            service: Set(attempt.service.clone()),
            session_id: Set(attempt.session_id.as_ref().map(SessionId::to_string)),
        };
        auth_attempts::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await
            .map_err(write_failed)?;
        Ok(())
    }

    async fn insert_command(&self, command: &CommandRecord) -> Result<(), StorageError> {
        let row = commands::ActiveModel {
            id: NotSet,
            ts: Set(format_ts(command.ts)),
            session_id: Set(command.session_id.to_string()),
            src_ip: Set(command.src_ip.to_string()),
            src_port: Set(command.src_port.map(i32::from)),
            command: Set(command.command.clone()),
            response: Set(command.response.clone()),
        };
        commands::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await
            .map_err(write_failed)?;
        Ok(())
    }

    async fn insert_event(&self, event: &NetworkEvent) -> Result<(), StorageError> {
        let row = events::ActiveModel {
            id: NotSet,
            ts: Set(format_ts(event.ts)),
            session_id: Set(event.session_id.as_ref().map(SessionId::to_string)),
            src_ip: Set(event.src_ip.to_string()),
            src_port: Set(event.src_port.map(i32::from)),
            dest_port: Set(event.dest_port.map(i32::from)),
            protocol: Set(event.protocol.clone()),
            service: Set(event.service.clone()),
            payload_preview: Set(event.payload_preview.clone()),
        };
        events::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await
            .map_err(write_failed)?;
        Ok(())
    }

    async fn get_sessions(&self, limit: u64) -> Result<Vec<Session>, StorageError> {
        db_entities::Entity::find()
            .order_by_desc(db_entities::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(read_failed)?
            .into_iter()
            .map(session_from_row)
            .collect()
    }

    async fn get_auth_attempts(&self, limit: u64) -> Result<Vec<AuthAttempt>, StorageError> {
        auth_attempts::Entity::find()
            .order_by_desc(auth_attempts::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(read_failed)?
            .into_iter()
            .map(auth_from_row)
            .collect()
    }

    async fn get_commands(&self, limit: u64) -> Result<Vec<CommandRecord>, StorageError> {
        commands::Entity::find()
            .order_by_desc(commands::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(read_failed)?
            .into_iter()
            .map(command_from_row)
            .collect()
    }

    async fn get_events(&self, limit: u64) -> Result<Vec<NetworkEvent>, StorageError> {
        events::Entity::find()
            .order_by_desc(events::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(read_failed)?
            .into_iter()
            .map(event_from_row)
            .collect()
    }

    async fn get_statistics(&self) -> Result<Statistics, StorageError> {
        Ok(Statistics {
            total_events: events::Entity::find().count(&self.db).await.map_err(read_failed)?,
            total_auth_attempts: auth_attempts::Entity::find()
                .count(&self.db)
                .await
                .map_err(read_failed)?,
            total_commands: commands::Entity::find().count(&self.db).await.map_err(read_failed)?,
            total_sessions: db_entities::Entity::find()
                .count(&self.db)
                .await
                .map_err(read_failed)?,
            top_passwords: self.top("password", "auth_attempts").await?,
            top_usernames: self.top("username", "auth_attempts").await?,
            top_commands: self.top("command", "commands").await?,
            top_attacker_ips: self.top("src_ip", "events").await?,
        })
    }
}
