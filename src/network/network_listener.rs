//! # Network Listener Module
//!
//! This module accepts inbound TCP connections on every configured service
//! port and starts one independent session per connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌─────────────────┐
//! │ Incoming        │───▶│ NetworkListener  │───▶│ SessionManager  │
//! │ Connections     │    │ one accept loop  │    │ one task per    │
//! └─────────────────┘    │ per service port │    │ connection      │
//!                        └──────────────────┘    └─────────────────┘
//! ```
//!
//! A port that cannot be bound is logged and skipped. A failing connection
//! only ends its own task.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::watch;
//! use snare::configuration::Config;
//! use snare::events::EventBus;
//! use snare::network::network_listener::NetworkListener;
//! use snare::session_management::session_manager::SessionManager;
//! use snare::error_handling::types::NetworkError;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), NetworkError> {
//!     let config = Config::default();
//!     let manager = Arc::new(SessionManager::new(EventBus::new(), config.session_timeout()));
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     let mut listener = NetworkListener::new(manager);
//!     listener.bind_services(&config)?;
//!     listener.start_listening(shutdown_rx).await;
//!     Ok(())
//! }
//! ```

use super::session_request::SessionRequest;
use crate::configuration::types::ServiceConfig;
use crate::configuration::Config;
use crate::emulation::Emulator;
use crate::error_handling::types::NetworkError;
use crate::session_management::session_manager::SessionManager;
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tokio::task::JoinSet;

const LISTEN_BACKLOG: u32 = 1024;

/// Pause after a failed `accept` (e.g. descriptor exhaustion) before retrying.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

struct BoundService {
    service: ServiceConfig,
    listener: TcpListener,
    emulator: Arc<Emulator>,
}

/// A network listener that manages one TCP socket per enabled service.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use snare::configuration::Config;
/// use snare::events::EventBus;
/// use snare::network::network_listener::NetworkListener;
/// use snare::session_management::session_manager::SessionManager;
///
/// #[tokio::main]
/// async fn main() {
///     let manager = Arc::new(SessionManager::new(EventBus::new(), None));
///     let mut listener = NetworkListener::new(manager);
///     listener.bind_services(&Config::default()).unwrap();
///     println!("{:?}", listener.local_addrs());
/// }
/// ```
pub struct NetworkListener {
    /// Bound listening sockets with the emulator serving each
    services: Vec<BoundService>,

    /// Runs every accepted connection
    session_manager: Arc<SessionManager>,
}

impl NetworkListener {
    pub fn new(session_manager: Arc<SessionManager>) -> Self {
        Self {
            services: Vec::new(),
            session_manager,
        }
    }

    /// Binds a listening socket for every enabled service in `config`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Bind failures of single services are logged and skipped. Only when no
    /// service at all could be bound does this return
    /// [`NetworkError::NoServiceBound`].
    pub fn bind_services(&mut self, config: &Config) -> Result<(), NetworkError> {
        for service in config.enabled_services() {
            let addr = SocketAddr::new(config.bind_address, service.port);
            match bind_socket(addr) {
                Ok(listener) => {
                    let local = listener.local_addr().unwrap_or(addr);
                    info!("[+] {} honeypot listening on {}", service.name, local);
                    self.services.push(BoundService {
                        service: service.clone(),
                        listener,
                        emulator: Arc::new(Emulator::from_config(service.emulator, config)),
                    });
                }
                Err(err) => {
                    let err = NetworkError::BindError(service.port, err);
                    error!("[!] Skipping service {}: {}", service.name, err);
                }
            }
        }

        if self.services.is_empty() {
            return Err(NetworkError::NoServiceBound);
        }
        Ok(())
    }

    /// Actual addresses of the bound services, as `(service name, address)`.
    pub fn local_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.services
            .iter()
            .filter_map(|bound| {
                bound
                    .listener
                    .local_addr()
                    .ok()
                    .map(|addr| (bound.service.name.clone(), addr))
            })
            .collect()
    }

    /// Accepts connections on every bound service until `shutdown` turns
    /// `true` (or its sender is dropped).
    ///
    /// Each connection is handed to the session manager on its own task; the
    /// accept loops never wait for sessions. Listening sockets are closed when
    /// this returns, while sessions already running carry on.
    pub async fn start_listening(self, shutdown: watch::Receiver<bool>) {
        let mut loops = JoinSet::new();
        for bound in self.services {
            loops.spawn(accept_loop(
                bound,
                Arc::clone(&self.session_manager),
                shutdown.clone(),
            ));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!("[!] Accept loop aborted: {}", e);
            }
        }
        info!("[-] All listeners closed");
    }
}

fn bind_socket(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

async fn accept_loop(
    bound: BoundService,
    session_manager: Arc<SessionManager>,
    mut shutdown: watch::Receiver<bool>,
) {
    let port = bound.service.port;

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    debug!("Shutdown sender dropped, closing port {}", port);
                    break;
                }
            }
            accepted = bound.listener.accept() => match accepted {
                Ok((stream, client_addr)) => {
                    let local_port = stream.local_addr().map(|a| a.port()).unwrap_or(port);
                    let request = SessionRequest::new(stream, &bound.service.name, client_addr, local_port);
                    let manager = Arc::clone(&session_manager);
                    let emulator = Arc::clone(&bound.emulator);
                    tokio::spawn(async move {
                        manager.handle_session(request, &emulator).await;
                    });
                }
                Err(e) => {
                    warn!("[!] Accept failed on port {}: {}", port, NetworkError::SockError(e));
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    info!("[-] Stopped accepting {} connections on port {}", bound.service.name, port);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::EmulatorKind;
    use crate::emulation::rdp::RDP_ACK;
    use crate::events::types::Event;
    use crate::events::EventBus;
    use crate::SessionStatus;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn loopback_config(services: Vec<ServiceConfig>) -> Config {
        let mut config = Config {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            services,
            ..Config::default()
        };
        config.ssh.greeting_pause_ms = 0;
        config
    }

    fn addr_of(listener: &NetworkListener, name: &str) -> SocketAddr {
        listener
            .local_addrs()
            .into_iter()
            .find(|(service, _)| service == name)
            .map(|(_, addr)| addr)
            .unwrap()
    }

    async fn read_until(stream: &mut TcpStream, needle: &[u8]) -> Vec<u8> {
        let mut seen = Vec::new();
        let mut buf = [0u8; 512];
        while !seen.windows(needle.len()).any(|w| w == needle) {
            let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "connection closed before {:?}", String::from_utf8_lossy(needle));
            seen.extend_from_slice(&buf[..n]);
        }
        seen
    }

    async fn closed_session(monitor: &mut crate::events::EventSubscription) -> crate::session_management::session::Session {
        loop {
            let event = timeout(Duration::from_secs(5), monitor.recv()).await.unwrap().unwrap();
            if let Event::Session(update) = event {
                if update.session.is_closed() {
                    return update.session;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_taken_port_is_skipped() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken_port = taken.local_addr().unwrap().port();
        let config = loopback_config(vec![
            ServiceConfig::new("ssh", EmulatorKind::Ssh, taken_port),
            ServiceConfig::new("rdp", EmulatorKind::Rdp, 0),
        ]);

        let mut listener = NetworkListener::new(Arc::new(SessionManager::new(EventBus::new(), None)));
        listener.bind_services(&config).unwrap();

        let names: Vec<String> = listener.local_addrs().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["rdp".to_string()]);
    }

    #[tokio::test]
    async fn test_nothing_bound_is_an_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = loopback_config(vec![ServiceConfig::new(
            "ssh",
            EmulatorKind::Ssh,
            taken.local_addr().unwrap().port(),
        )]);

        let mut listener = NetworkListener::new(Arc::new(SessionManager::new(EventBus::new(), None)));
        assert!(matches!(
            listener.bind_services(&config),
            Err(NetworkError::NoServiceBound)
        ));
    }

    #[tokio::test]
    async fn test_ssh_and_rdp_over_loopback() {
        let bus = EventBus::new();
        let mut monitor = bus.subscribe();
        let manager = Arc::new(SessionManager::new(bus, None));
        let config = loopback_config(vec![
            ServiceConfig::new("ssh", EmulatorKind::Ssh, 0),
            ServiceConfig::new("rdp", EmulatorKind::Rdp, 0),
        ]);

        let mut listener = NetworkListener::new(Arc::clone(&manager));
        listener.bind_services(&config).unwrap();
        let ssh_addr = addr_of(&listener, "ssh");
        let rdp_addr = addr_of(&listener, "rdp");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listening = tokio::spawn(listener.start_listening(shutdown_rx));

        let mut ssh = TcpStream::connect(ssh_addr).await.unwrap();
        read_until(&mut ssh, b"OpenSSH_8.2p1").await;
        ssh.write_all(b"admin:toor\n").await.unwrap();
        read_until(&mut ssh, b"root@honeypot:~# ").await;
        ssh.write_all(b"whoami\n").await.unwrap();
        let reply = read_until(&mut ssh, b"root\r\n").await;
        assert!(String::from_utf8_lossy(&reply).contains("root"));
        drop(ssh);

        let session = closed_session(&mut monitor).await;
        assert_eq!(session.service, "ssh");
        assert_eq!(session.auth_attempts, 1);
        assert_eq!(session.commands_count, 1);
        assert!(session.success_login);
        assert_eq!(session.status, SessionStatus::Completed);

        let mut rdp = TcpStream::connect(rdp_addr).await.unwrap();
        rdp.write_all(b"\x03\x00\x00\x0b\x06\xe0").await.unwrap();
        let mut ack = Vec::new();
        timeout(Duration::from_secs(5), rdp.read_to_end(&mut ack))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ack, RDP_ACK);

        let session = closed_session(&mut monitor).await;
        assert_eq!(session.service, "rdp");
        assert_eq!(session.auth_attempts, 0);

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), listening).await.unwrap().unwrap();
        assert_eq!(manager.get_active_session_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let config = loopback_config(vec![ServiceConfig::new("rdp", EmulatorKind::Rdp, 0)]);
        let mut listener = NetworkListener::new(Arc::new(SessionManager::new(EventBus::new(), None)));
        listener.bind_services(&config).unwrap();
        let addr = addr_of(&listener, "rdp");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listening = tokio::spawn(listener.start_listening(shutdown_rx));
        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), listening).await.unwrap().unwrap();

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_sessions_do_not_block_accept() {
        let bus = EventBus::new();
        let manager = Arc::new(SessionManager::new(bus, None));
        let config = loopback_config(vec![ServiceConfig::new("ssh", EmulatorKind::Ssh, 0)]);
        let mut listener = NetworkListener::new(Arc::clone(&manager));
        listener.bind_services(&config).unwrap();
        let addr = addr_of(&listener, "ssh");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listening = tokio::spawn(listener.start_listening(shutdown_rx));

        // the first peer stays silent while a second one gets its banner
        let mut idle = TcpStream::connect(addr).await.unwrap();
        read_until(&mut idle, b"SSH-2.0").await;
        let mut second = TcpStream::connect(addr).await.unwrap();
        read_until(&mut second, b"SSH-2.0").await;
        assert_eq!(manager.get_active_session_count(), 2);

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(5), listening).await.unwrap().unwrap();
        drop(idle);
        drop(second);
    }
}
