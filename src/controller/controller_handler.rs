use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use crate::configuration::config::Config;
use crate::configuration::types::StorageBackend;
use crate::error_handling::types::*;
use crate::events::EventBus;
use crate::network::network_listener::NetworkListener;
use crate::session_management::session_manager::SessionManager;
use crate::storage::database_storage::DatabaseStorage;
use crate::storage::memory_storage::MemoryStorage;
use crate::storage::persister::Persister;
use crate::storage::storage_trait::Storage;
use crate::web_interface::WebServer;

const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Owns every long-lived component and their shutdown order.
pub struct Controller {
    pub config: Config,
    bus: EventBus,
    storage: Arc<dyn Storage>,
    session_manager: Arc<SessionManager>,
    listener: NetworkListener,
    persister: JoinHandle<u64>,
}

impl Controller {
    /// Opens storage, starts the persister and binds the service ports.
    ///
    /// # Errors
    ///
    /// An invalid configuration, an unreachable database, or no bindable
    /// service at all.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;

        let storage: Arc<dyn Storage> = match config.storage.backend {
            StorageBackend::Sqlite => {
                Arc::new(DatabaseStorage::connect(&config.storage.database_url).await?)
            }
            StorageBackend::Memory => {
                warn!("[!] Using in-memory storage, nothing survives a restart");
                Arc::new(MemoryStorage::new())
            }
        };

        let bus = EventBus::new();
        let persister = Persister::new(storage.clone()).spawn(bus.subscribe());

        let session_manager = Arc::new(SessionManager::new(bus.clone(), config.session_timeout()));
        let mut listener = NetworkListener::new(Arc::clone(&session_manager));
        listener.bind_services(&config)?;

        Ok(Self {
            config,
            bus,
            storage,
            session_manager,
            listener,
            persister,
        })
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// `(service name, address)` of every bound service.
    pub fn local_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.listener.local_addrs()
    }

    /// Runs until Ctrl-C.
    pub async fn run(self) -> Result<(), ControllerError> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Runs until `signal` resolves, then shuts down in order: accept loops,
    /// in-flight sessions (bounded by `shutdown_grace_ms`), web server, and
    /// finally the persister backlog.
    ///
    /// # Errors
    ///
    /// [`ControllerError::InitializationFailed`] when the signal itself could
    /// not be installed. The shutdown sequence still runs first.
    pub async fn run_until<F>(self, signal: F) -> Result<(), ControllerError>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let Controller {
            config,
            bus,
            storage,
            session_manager,
            listener,
            persister,
        } = self;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accepting = tokio::spawn(listener.start_listening(shutdown_rx));

        let web = if config.web.enabled {
            let addr = SocketAddr::new(config.web.bind_address, config.web.port);
            match WebServer::new(storage, bus.clone()).start(addr).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("[!] {}, continuing without the web interface", e);
                    None
                }
            }
        } else {
            debug!("Web interface disabled");
            None
        };

        info!("[+] Honeypot running, press Ctrl-C to stop");
        let outcome = match signal.await {
            Ok(()) => {
                info!("[-] Shutdown requested");
                Ok(())
            }
            Err(e) => {
                error!("[!] Unable to listen for the shutdown signal: {}", e);
                Err(ControllerError::InitializationFailed(format!(
                    "shutdown signal: {}",
                    e
                )))
            }
        };

        let _ = shutdown_tx.send(true);
        if let Err(e) = accepting.await {
            error!("[!] Listener task failed: {}", e);
        }

        let grace = config.shutdown_grace();
        let deadline = Instant::now() + grace;
        while session_manager.get_active_session_count() > 0 && Instant::now() < deadline {
            sleep(DRAIN_POLL).await;
        }
        let remaining = session_manager.get_active_session_count();
        if remaining > 0 {
            warn!("[!] {} sessions still running after the grace period", remaining);
        }

        if let Some(web) = web {
            web.abort();
            let _ = web.await;
        }

        // Clones may survive in lingering sessions or web connections, so the
        // bus is closed rather than dropped. The persister then drains.
        bus.close();
        drop(session_manager);
        match timeout(grace.max(Duration::from_secs(1)), persister).await {
            Ok(Ok(stored)) => info!("[-] Persisted {} events, bye", stored),
            Ok(Err(e)) => error!("[!] Persister task failed: {}", e),
            Err(_) => warn!("[!] Persister still busy, exiting with a backlog"),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::{EmulatorKind, ServiceConfig};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn memory_config() -> Config {
        let mut config = Config {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            services: vec![ServiceConfig::new("ssh", EmulatorKind::Ssh, 0)],
            ..Config::default()
        };
        config.ssh.greeting_pause_ms = 0;
        config.storage.backend = StorageBackend::Memory;
        config.web.enabled = false;
        config.shutdown_grace_ms = 2_000;
        config
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = memory_config();
        config.services.clear();
        assert!(matches!(
            Controller::new(config).await,
            Err(ControllerError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_session_is_persisted_before_run_returns() {
        let controller = Controller::new(memory_config()).await.unwrap();
        let storage = controller.storage();
        let addr = controller.local_addrs()[0].1;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(controller.run_until(async {
            let _ = stop_rx.await;
            Ok::<(), std::io::Error>(())
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut banner = [0u8; 64];
        let n = stream.read(&mut banner).await.unwrap();
        assert!(String::from_utf8_lossy(&banner[..n]).starts_with("SSH-2.0-"));
        stream.write_all(b"admin:toor\n").await.unwrap();
        let mut prompt = [0u8; 256];
        let _ = stream.read(&mut prompt).await.unwrap();
        stream.write_all(b"whoami\n").await.unwrap();
        let _ = stream.read(&mut prompt).await.unwrap();
        drop(stream);

        // Let the session observe the disconnect.
        sleep(Duration::from_millis(100)).await;
        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();

        let sessions = storage.get_sessions(10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].end_time.is_some());
        assert_eq!(sessions[0].auth_attempts, 1);
        assert_eq!(sessions[0].commands_count, 1);
        let attempts = storage.get_auth_attempts(10).await.unwrap();
        assert_eq!(attempts[0].username, "admin");
        assert_eq!(storage.get_commands(10).await.unwrap()[0].command, "whoami");
    }

    #[tokio::test]
    async fn test_shutdown_does_not_wait_on_live_bus_clones() {
        let mut config = memory_config();
        config.shutdown_grace_ms = 60_000;
        let controller = Controller::new(config).await.unwrap();
        let storage = controller.storage();
        let held = controller.bus();

        held.publish(crate::events::types::Event::Generic(
            crate::events::types::NetworkEvent {
                session_id: None,
                ts: chrono::Utc::now(),
                src_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                src_port: None,
                dest_port: None,
                protocol: None,
                service: None,
                payload_preview: None,
            },
        ));

        let finished = timeout(
            Duration::from_secs(10),
            controller.run_until(async { Ok::<(), std::io::Error>(()) }),
        )
        .await;
        assert!(matches!(finished, Ok(Ok(()))));
        assert_eq!(storage.get_events(10).await.unwrap().len(), 1);
        drop(held);
    }

    #[tokio::test]
    async fn test_failed_signal_is_reported_after_shutdown() {
        let controller = Controller::new(memory_config()).await.unwrap();

        let result = controller
            .run_until(async { Err::<(), _>(std::io::Error::other("no signal handler")) })
            .await;

        assert!(matches!(
            result,
            Err(ControllerError::InitializationFailed(_))
        ));
    }
}
