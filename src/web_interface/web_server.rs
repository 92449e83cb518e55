use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use warp::{Filter, Rejection, Reply};

use super::routes::{
    ingest_route, list_auth_attempts_route, list_commands_route, list_events_route,
    list_sessions_route, live_events_route, statistics_route,
};
use crate::error_handling::types::WebError;
use crate::events::EventBus;
use crate::ingestion::IngestionGateway;
use crate::storage::storage_trait::Storage;

/// HTTP surface: read-only query API, ingestion endpoint and live feed.
pub struct WebServer {
    storage: Arc<dyn Storage>,
    bus: EventBus,
}

impl WebServer {
    pub fn new(storage: Arc<dyn Storage>, bus: EventBus) -> Self {
        Self { storage, bus }
    }

    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        list_sessions_route(self.storage.clone())
            .or(list_auth_attempts_route(self.storage.clone()))
            .or(list_commands_route(self.storage.clone()))
            .or(list_events_route(self.storage.clone()))
            .or(statistics_route(self.storage.clone()))
            .or(ingest_route(IngestionGateway::new(self.bus.clone())))
            .or(live_events_route(self.bus.clone()))
    }

    /// Binds `addr` and serves the routes from a background task.
    ///
    /// The socket is bound here, so a taken port surfaces as
    /// [`WebError::BindFailed`] and the server task only ever accepts.
    /// Aborting the returned handle stops the server.
    pub async fn start(self, addr: SocketAddr) -> Result<JoinHandle<()>, WebError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;
        let local = listener.local_addr().unwrap_or(addr);

        let routes = self.routes();
        info!("[+] Web interface listening on http://{}", local);
        Ok(tokio::spawn(async move {
            warp::serve(routes).incoming(listener).run().await;
        }))
    }
}
