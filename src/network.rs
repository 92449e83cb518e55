//! Connection acceptance.
//!
//! - `network_listener`: one accept loop per configured service port.
//! - `session_request`: what an accepted connection looks like to the session manager.

pub mod network_listener;
pub mod session_request;

pub use network_listener::NetworkListener;
pub use session_request::SessionRequest;
