use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use tokio::net::TcpStream;

/// An accepted connection handed from the listener to the session manager.
pub struct SessionRequest<S = TcpStream> {
    pub stream: S,
    /// Name of the configured service that accepted the connection
    pub service_name: String,
    pub client_addr: SocketAddr,
    /// Port the connection arrived on
    pub local_port: u16,
    /// Accept time
    pub timestamp: DateTime<Utc>,
}

impl<S> SessionRequest<S> {
    pub fn new(stream: S, service_name: &str, client_addr: SocketAddr, local_port: u16) -> Self {
        Self {
            stream,
            service_name: service_name.to_string(),
            client_addr,
            local_port,
            timestamp: Utc::now(),
        }
    }
}
