use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use warp::ws::{Message, WebSocket, Ws};
use warp::{http::StatusCode, reply, Filter, Rejection, Reply};

use super::types::{ApiError, IngestResponse, LimitQuery};
use crate::error_handling::types::StorageError;
use crate::events::{EventBus, EventSubscription};
use crate::ingestion::IngestionGateway;
use crate::storage::storage_trait::Storage;

pub const DEFAULT_SESSION_LIMIT: u64 = 50;
pub const DEFAULT_AUTH_LIMIT: u64 = 100;
pub const DEFAULT_COMMAND_LIMIT: u64 = 100;
pub const DEFAULT_EVENT_LIMIT: u64 = 50;

/// Largest accepted ingestion body.
pub const MAX_INGEST_BYTES: u64 = 64 * 1024;

fn with_storage(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = (Arc<dyn Storage>,), Error = Infallible> + Clone {
    warp::any().map(move || storage.clone())
}

fn json_result<T: Serialize>(
    result: Result<T, StorageError>,
    what: &str,
) -> reply::WithStatus<reply::Json> {
    match result {
        Ok(rows) => reply::with_status(reply::json(&rows), StatusCode::OK),
        Err(e) => {
            warn!("[!] Failed to load {}: {}", what, e);
            reply::with_status(
                reply::json(&ApiError::new(format!("failed to load {}", what))),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

/// GET /sessions
pub fn list_sessions_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("sessions")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<LimitQuery>())
        .and(with_storage(storage))
        .and_then(|query: LimitQuery, storage: Arc<dyn Storage>| async move {
            let rows = storage
                .get_sessions(query.limit_or(DEFAULT_SESSION_LIMIT))
                .await;
            Ok::<_, Rejection>(json_result(rows, "sessions"))
        })
}

/// GET /auth_attempts
pub fn list_auth_attempts_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("auth_attempts")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<LimitQuery>())
        .and(with_storage(storage))
        .and_then(|query: LimitQuery, storage: Arc<dyn Storage>| async move {
            let rows = storage
                .get_auth_attempts(query.limit_or(DEFAULT_AUTH_LIMIT))
                .await;
            Ok::<_, Rejection>(json_result(rows, "auth attempts"))
        })
}

/// GET /commands
pub fn list_commands_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("commands")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<LimitQuery>())
        .and(with_storage(storage))
        .and_then(|query: LimitQuery, storage: Arc<dyn Storage>| async move {
            let rows = storage
                .get_commands(query.limit_or(DEFAULT_COMMAND_LIMIT))
                .await;
            Ok::<_, Rejection>(json_result(rows, "commands"))
        })
}

/// GET /events
pub fn list_events_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("events")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<LimitQuery>())
        .and(with_storage(storage))
        .and_then(|query: LimitQuery, storage: Arc<dyn Storage>| async move {
            let rows = storage
                .get_events(query.limit_or(DEFAULT_EVENT_LIMIT))
                .await;
            Ok::<_, Rejection>(json_result(rows, "events"))
        })
}

/// GET /statistics
pub fn statistics_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("statistics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_storage(storage))
        .and_then(|storage: Arc<dyn Storage>| async move {
            Ok::<_, Rejection>(json_result(storage.get_statistics().await, "statistics"))
        })
}

/// POST /ingest/web
pub fn ingest_route(
    gateway: IngestionGateway,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("ingest" / "web")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_INGEST_BYTES))
        .and(warp::body::bytes())
        .map(move |body: Bytes| match gateway.ingest_json(&body) {
            Ok(_) => reply::with_status(reply::json(&IngestResponse::ok()), StatusCode::OK),
            Err(e) => {
                warn!("[!] Rejected ingestion request: {}", e);
                reply::with_status(
                    reply::json(&ApiError::new(e.to_string())),
                    StatusCode::BAD_REQUEST,
                )
            }
        })
}

/// GET /ws/events
///
/// Each monitor gets its own bus subscription, taken when the upgrade
/// completes. Events published before that are not replayed.
pub fn live_events_route(
    bus: EventBus,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("ws" / "events")
        .and(warp::ws())
        .map(move |ws: Ws| {
            let bus = bus.clone();
            ws.on_upgrade(move |socket| forward_events(socket, bus.subscribe()))
        })
}

async fn forward_events(socket: WebSocket, mut events: EventSubscription) {
    let (mut tx, mut rx) = socket.split();
    info!("[+] Live monitor connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("[!] Could not encode {} event: {}", event.kind().as_str(), e);
                        continue;
                    }
                };
                if let Err(e) = tx.send(Message::text(text)).await {
                    debug!("Live monitor send failed: {}", e);
                    break;
                }
            }
            incoming = rx.next() => match incoming {
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Live monitor read failed: {}", e);
                    break;
                }
                None => break,
            },
        }
    }

    let _ = tx.close().await;
    info!("[-] Live monitor disconnected");
}
