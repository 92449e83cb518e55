use log::{debug, info};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::timeout;

use crate::configuration::types::RdpConfig;
use crate::data_capture::credentials::{payload_preview, split_credential_pair};
use crate::data_capture::SessionRecorder;
use crate::error_handling::types::SessionError;

use super::{close_within, send_within};

/// Service tag stored on RDP auth attempts.
pub const RDP_SERVICE: &str = "RDP";

/// Truncated X.224 connection confirm sent back to every client that spoke.
pub const RDP_ACK: &[u8] = b"\x03\x00\x00\x13\x0e\xd0";

/// Single-exchange RDP lookalike: read one chunk, answer, hang up.
#[derive(Debug, Clone)]
pub struct RdpEmulator {
    config: RdpConfig,
}

impl RdpEmulator {
    pub fn new(config: RdpConfig) -> Self {
        Self { config }
    }

    /// Reads one bounded chunk, records it, and writes [`RDP_ACK`].
    ///
    /// A timeout or an immediate close ends the session without a reply. A
    /// peer that does not take the acknowledgement within `write_timeout_ms`
    /// is dropped.
    pub async fn run<S>(&self, mut stream: S, recorder: &mut SessionRecorder) -> Result<(), SessionError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut buf = vec![0u8; self.config.capture_bytes];
        let wait = Duration::from_millis(self.config.read_timeout_ms);

        let n = match timeout(wait, stream.read(&mut buf)).await {
            Err(_) => {
                info!("[{}] RDP client silent for {:?}", recorder.session_id(), wait);
                return Ok(());
            }
            Ok(read) => read?,
        };
        if n == 0 {
            debug!("[{}] RDP client closed without data", recorder.session_id());
            return Ok(());
        }

        let data = &buf[..n];
        recorder.record_payload(data);
        if let Some(credentials) = split_credential_pair(&payload_preview(data)) {
            recorder.record_auth(&credentials, RDP_SERVICE);
        }

        let write_wait = Duration::from_millis(self.config.write_timeout_ms);
        if !send_within(&mut stream, RDP_ACK, write_wait).await? {
            info!("[{}] RDP client stopped reading, dropping it", recorder.session_id());
        }
        close_within(&mut stream, write_wait).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{Event, EventKind};
    use crate::events::{EventBus, EventSubscription};
    use crate::session_management::session::Session;
    use chrono::Utc;
    use tokio::io::AsyncWriteExt;
    use tokio_test::io::Builder;

    fn recorder() -> (SessionRecorder, EventSubscription) {
        let bus = EventBus::new();
        let monitor = bus.subscribe();
        let session = Session::open("203.0.113.80:49152".parse().unwrap(), "rdp", Utc::now());
        (SessionRecorder::new(&session, 3389, bus), monitor)
    }

    fn kinds(monitor: &mut EventSubscription) -> Vec<EventKind> {
        std::iter::from_fn(|| monitor.try_recv()).map(|e| e.kind()).collect()
    }

    #[tokio::test]
    async fn test_raw_bytes_get_ack_without_auth() {
        let stream = Builder::new()
            .read(b"\x03\x00\x00\x2b\x26\xe0\x00\x00\x00\x00\x00Cookie")
            .write(RDP_ACK)
            .build();
        let (mut recorder, mut monitor) = recorder();

        RdpEmulator::new(RdpConfig::default())
            .run(stream, &mut recorder)
            .await
            .unwrap();

        assert_eq!(kinds(&mut monitor), vec![EventKind::Generic]);
        assert_eq!(recorder.auth_attempts(), 0);
    }

    #[tokio::test]
    async fn test_separator_yields_rdp_auth() {
        let stream = Builder::new()
            .read(b"administrator:Winter2024!\r\n")
            .write(RDP_ACK)
            .build();
        let (mut recorder, mut monitor) = recorder();

        RdpEmulator::new(RdpConfig::default())
            .run(stream, &mut recorder)
            .await
            .unwrap();

        let auth = std::iter::from_fn(|| monitor.try_recv()).find_map(|e| match e {
            Event::Auth(a) => Some(a),
            _ => None,
        });
        let auth = auth.unwrap();
        assert_eq!(auth.username, "administrator");
        assert_eq!(auth.password, "Winter2024!");
        assert_eq!(auth.service, RDP_SERVICE);
        assert!(!auth.success);
        assert_eq!(recorder.auth_attempts(), 1);
    }

    #[tokio::test]
    async fn test_empty_read_closes_silently() {
        let stream = Builder::new().build();
        let (mut recorder, mut monitor) = recorder();

        RdpEmulator::new(RdpConfig::default())
            .run(stream, &mut recorder)
            .await
            .unwrap();

        assert!(kinds(&mut monitor).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_skips_ack() {
        let (mut client, server) = tokio::io::duplex(64);
        let (mut recorder, mut monitor) = recorder();

        RdpEmulator::new(RdpConfig::default())
            .run(server, &mut recorder)
            .await
            .unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());
        assert!(kinds(&mut monitor).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_that_never_reads_is_released() {
        // Smaller than the acknowledgement, so the write can never finish.
        let (mut client, server) = tokio::io::duplex(4);
        let peer = tokio::spawn(async move {
            let _ = client.write_all(b"user:pw").await;
            client
        });
        let (mut recorder, mut monitor) = recorder();

        let finished = timeout(
            Duration::from_secs(24 * 3600),
            RdpEmulator::new(RdpConfig::default()).run(server, &mut recorder),
        )
        .await;

        assert!(matches!(finished, Ok(Ok(()))));
        assert_eq!(kinds(&mut monitor).first(), Some(&EventKind::Generic));
        drop(peer);
    }
}
