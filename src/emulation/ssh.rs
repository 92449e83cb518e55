//! SSH-looking login service.
//!
//! No real protocol is spoken. The emulator sends an OpenSSH identification
//! line, treats the first chunk it receives as a credential submission,
//! claims the login worked whatever was sent, then answers each command line
//! from a table of canned outputs.

use log::{debug, info};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::time::{sleep, timeout};

use crate::configuration::types::SshConfig;
use crate::data_capture::credentials::{extract_credentials, fallback_credentials, payload_preview};
use crate::data_capture::SessionRecorder;
use crate::error_handling::types::SessionError;

use super::responses::respond;
use super::{close_within, send_within};

/// Service tag stored on SSH auth attempts.
pub const SSH_SERVICE: &str = "SSH";

/// Upper bound on one interactive line read, in bytes. Anything past it up
/// to the next newline is discarded.
const MAX_LINE_BYTES: u64 = 4096;

/// Phases of one SSH-like connection.
///
/// `CapturingCredentials` moves to `Closed` when nothing arrives in time,
/// otherwise always to `Authenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshState {
    Greeting,
    CapturingCredentials,
    Authenticated,
    InteractiveLoop,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SshEmulator {
    config: SshConfig,
}

/// Reads one line of at most [`MAX_LINE_BYTES`] into `line`; `None` on timeout.
async fn read_line<S>(
    conn: &mut BufReader<S>,
    line: &mut Vec<u8>,
    wait: Duration,
) -> Result<Option<usize>, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut limited = (&mut *conn).take(MAX_LINE_BYTES);
    match timeout(wait, limited.read_until(b'\n', line)).await {
        Err(_) => Ok(None),
        Ok(read) => Ok(Some(read?)),
    }
}

/// Drops input up to and including the next newline. `false` when the peer
/// closed or went quiet first.
async fn discard_line<S>(conn: &mut BufReader<S>, wait: Duration) -> Result<bool, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut rest = Vec::new();
    loop {
        rest.clear();
        match read_line(conn, &mut rest, wait).await? {
            None | Some(0) => return Ok(false),
            Some(_) if rest.last() == Some(&b'\n') => return Ok(true),
            Some(_) => {}
        }
    }
}

impl SshEmulator {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn write_wait(&self) -> Duration {
        Duration::from_millis(self.config.write_timeout_ms)
    }

    /// Drives one connection from greeting to close.
    ///
    /// Returns once the peer disconnects, a read times out, or a reply cannot
    /// be written within `write_timeout_ms`. Every observation goes through
    /// `recorder`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Io`] on a read or write failure; the state machine
    /// stops where it was.
    pub async fn run<S>(&self, stream: S, recorder: &mut SessionRecorder) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut conn = BufReader::new(stream);
        let mut state = SshState::Greeting;

        while state != SshState::Closed {
            debug!("[{}] SSH state {:?}", recorder.session_id(), state);
            state = match state {
                SshState::Greeting => self.greet(&mut conn, recorder).await?,
                SshState::CapturingCredentials => self.capture_credentials(&mut conn, recorder).await?,
                SshState::Authenticated => self.grant_shell(&mut conn, recorder).await?,
                SshState::InteractiveLoop => self.interact(&mut conn, recorder).await?,
                SshState::Closed => SshState::Closed,
            };
        }

        // The peer may already be gone.
        close_within(&mut conn, self.write_wait()).await;
        Ok(())
    }

    async fn send<S>(
        &self,
        conn: &mut BufReader<S>,
        data: &[u8],
        recorder: &SessionRecorder,
    ) -> Result<bool, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let sent = send_within(conn, data, self.write_wait()).await?;
        if !sent {
            info!(
                "[{}] {} stopped reading, closing",
                recorder.session_id(),
                recorder.client_addr()
            );
        }
        Ok(sent)
    }

    async fn greet<S>(&self, conn: &mut BufReader<S>, recorder: &SessionRecorder) -> Result<SshState, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let banner = format!("{}\r\n", self.config.banner);
        if !self.send(conn, banner.as_bytes(), recorder).await? {
            return Ok(SshState::Closed);
        }
        if self.config.greeting_pause_ms > 0 {
            sleep(Duration::from_millis(self.config.greeting_pause_ms)).await;
        }
        Ok(SshState::CapturingCredentials)
    }

    async fn capture_credentials<S>(
        &self,
        conn: &mut BufReader<S>,
        recorder: &mut SessionRecorder,
    ) -> Result<SshState, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut buf = vec![0u8; self.config.capture_bytes];
        let wait = Duration::from_millis(self.config.auth_timeout_ms);

        let n = match timeout(wait, conn.read(&mut buf)).await {
            Err(_) => {
                info!(
                    "[{}] No credentials from {} within {:?}",
                    recorder.session_id(),
                    recorder.client_addr(),
                    wait
                );
                return Ok(SshState::Closed);
            }
            Ok(read) => read?,
        };
        if n == 0 {
            debug!("[{}] Peer closed before sending credentials", recorder.session_id());
            return Ok(SshState::Closed);
        }

        let data = &buf[..n];
        recorder.record_payload(data);

        let text = payload_preview(data);
        let found = extract_credentials(&text);
        if found.is_empty() {
            recorder.record_auth(&fallback_credentials(&text), SSH_SERVICE);
        }
        for credentials in &found {
            recorder.record_auth(credentials, SSH_SERVICE);
        }

        Ok(SshState::Authenticated)
    }

    async fn grant_shell<S>(
        &self,
        conn: &mut BufReader<S>,
        recorder: &mut SessionRecorder,
    ) -> Result<SshState, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let granted = format!("{}\r\n{}", self.config.success_message, self.config.prompt);
        if !self.send(conn, granted.as_bytes(), recorder).await? {
            return Ok(SshState::Closed);
        }
        recorder.mark_authenticated();
        Ok(SshState::InteractiveLoop)
    }

    async fn interact<S>(
        &self,
        conn: &mut BufReader<S>,
        recorder: &mut SessionRecorder,
    ) -> Result<SshState, SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let wait = Duration::from_millis(self.config.command_timeout_ms);
        let mut line = Vec::new();

        loop {
            line.clear();
            let n = match read_line(conn, &mut line, wait).await? {
                None => {
                    info!("[{}] Shell idle for {:?}, closing", recorder.session_id(), wait);
                    return Ok(SshState::Closed);
                }
                Some(n) => n,
            };
            if n == 0 {
                return Ok(SshState::Closed);
            }

            // A line cut at the budget still counts as one command.
            let cut = line.last() != Some(&b'\n') && n as u64 == MAX_LINE_BYTES;
            let line_ended = !cut || discard_line(conn, wait).await?;
            if cut {
                debug!("[{}] Over-long command line truncated", recorder.session_id());
            }

            let text = payload_preview(&line);
            let command = text.trim();
            if command.is_empty() {
                if line_ended {
                    continue;
                }
                return Ok(SshState::Closed);
            }

            let response = respond(command);
            recorder.record_command(command, &response);
            if !line_ended {
                return Ok(SshState::Closed);
            }

            let reply = format!("{}\r\n{}", response, self.config.prompt);
            if !self.send(conn, reply.as_bytes(), recorder).await? {
                return Ok(SshState::Closed);
            }
        }
    }
}
