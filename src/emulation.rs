//! Protocol emulators.
//!
//! Each emulator drives exactly one connection and reports everything it sees
//! through the session's [`SessionRecorder`]. Emulators know nothing about
//! session bookkeeping or storage.

/// RDP-like single exchange.
pub mod rdp;
/// Canned shell answers.
pub mod responses;
/// SSH-like login plus fake shell.
pub mod ssh;

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::configuration::{Config, EmulatorKind};
use crate::data_capture::SessionRecorder;
use crate::error_handling::types::SessionError;

pub use rdp::RdpEmulator;
pub use ssh::SshEmulator;

/// Writes and flushes `data` within `wait`.
///
/// `Ok(false)` when the peer stopped reading and the write did not complete
/// in time.
pub(crate) async fn send_within<W>(conn: &mut W, data: &[u8], wait: Duration) -> Result<bool, SessionError>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        conn.write_all(data).await?;
        conn.flush().await
    };
    match timeout(wait, write).await {
        Ok(written) => {
            written?;
            Ok(true)
        }
        Err(_) => Ok(false),
    }
}

/// Best-effort close bounded by `wait`.
pub(crate) async fn close_within<W>(conn: &mut W, wait: Duration)
where
    W: AsyncWrite + Unpin,
{
    let _ = timeout(wait, conn.shutdown()).await;
}

/// The emulator bound to one service port.
#[derive(Debug, Clone)]
pub enum Emulator {
    Ssh(SshEmulator),
    Rdp(RdpEmulator),
}

impl Emulator {
    /// Builds the emulator of `kind` with its section of `config`.
    pub fn from_config(kind: EmulatorKind, config: &Config) -> Self {
        match kind {
            EmulatorKind::Ssh => Emulator::Ssh(SshEmulator::new(config.ssh.clone())),
            EmulatorKind::Rdp => Emulator::Rdp(RdpEmulator::new(config.rdp.clone())),
        }
    }

    pub fn kind(&self) -> EmulatorKind {
        match self {
            Emulator::Ssh(_) => EmulatorKind::Ssh,
            Emulator::Rdp(_) => EmulatorKind::Rdp,
        }
    }

    pub async fn run<S>(&self, stream: S, recorder: &mut SessionRecorder) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self {
            Emulator::Ssh(ssh) => ssh.run(stream, recorder).await,
            Emulator::Rdp(rdp) => rdp.run(stream, recorder).await,
        }
    }
}
