//! Connection acceptor.
//!
//! Serves one viewer at a time: accept, stream until the session ends,
//! tear down, accept the next one. Connections that arrive while a
//! session is running wait in the listen backlog.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mirrorcast_core::{MediaBackend, MirrorError, SessionReport, SessionSlot, StreamSession};

use crate::config::ServerConfig;

// ── MirrorService ────────────────────────────────────────────────

/// The top-level mirroring server.
pub struct MirrorService {
    config: ServerConfig,
    backend: Arc<dyn MediaBackend>,
    slot: SessionSlot,
    shutdown: CancellationToken,
}

impl MirrorService {
    pub fn new(config: ServerConfig, backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            config,
            backend,
            slot: SessionSlot::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the acceptor and cancels the running session.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal the service to stop.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Whether a session currently owns the encoder.
    pub fn is_streaming(&self) -> bool {
        !self.slot.is_idle()
    }

    /// Bind the configured listen address (IP literal or host name).
    pub async fn bind(&self) -> Result<TcpListener, MirrorError> {
        let net = &self.config.network;
        Ok(TcpListener::bind((net.bind_address.as_str(), net.port)).await?)
    }

    /// Bind and serve until stopped.
    pub async fn run(&self) -> Result<(), MirrorError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept viewers on `listener` until stopped.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), MirrorError> {
        info!("mirrorcast listening on {}", listener.local_addr()?);
        let mut next_id = 0u64;

        loop {
            let accept = tokio::select! {
                result = listener.accept() => result,
                _ = self.shutdown.cancelled() => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            next_id += 1;
            info!("viewer connected from {peer} (session {next_id})");

            match self.stream_to(next_id, stream).await {
                Ok(report) => info!(
                    "session {} with {peer} finished: {:?}, {} frames",
                    report.id, report.exit, report.frames_written
                ),
                Err(e) => error!("session {next_id} with {peer} failed: {e}"),
            }

            if self.shutdown.is_cancelled() {
                break;
            }
            info!("ready for new connection");
        }

        info!("mirrorcast service stopped");
        Ok(())
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Run one session over `stream`. The stream is closed on return.
    async fn stream_to(&self, id: u64, stream: TcpStream) -> Result<SessionReport, MirrorError> {
        if self.config.network.nodelay {
            stream.set_nodelay(true)?;
        }

        let permit = self.slot.acquire().await?;
        let codec = self.backend.create_encoder()?;
        let mirror = self.backend.create_display_mirror()?;

        StreamSession::new(id, self.config.to_session_config(), permit)
            .run(codec, mirror, stream, self.shutdown.child_token())
            .await
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use mirrorcast_core::UnavailableBackend;

    use super::*;

    fn service() -> MirrorService {
        MirrorService::new(ServerConfig::default(), Arc::new(UnavailableBackend))
    }

    #[test]
    fn service_creates_idle() {
        let svc = service();
        assert!(!svc.is_streaming());
        assert!(!svc.shutdown_handle().is_cancelled());
    }

    #[test]
    fn stop_cancels_handle() {
        let svc = service();
        let handle = svc.shutdown_handle();
        svc.stop();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn invalid_bind_address_is_an_error() {
        let mut cfg = ServerConfig::default();
        cfg.network.bind_address = "not an address".into();
        let svc = MirrorService::new(cfg, Arc::new(UnavailableBackend));
        assert!(svc.bind().await.is_err());
    }

    #[tokio::test]
    async fn binds_host_names() {
        let mut cfg = ServerConfig::default();
        cfg.network.bind_address = "localhost".into();
        cfg.network.port = 0;
        let svc = MirrorService::new(cfg, Arc::new(UnavailableBackend));
        let listener = svc.bind().await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn serve_returns_once_stopped() {
        let svc = service();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        svc.stop();
        svc.serve(listener).await.unwrap();
    }
}
