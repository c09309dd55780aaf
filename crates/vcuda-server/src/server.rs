use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use vcuda_core::config::ServerConfig;
use vcuda_protocol::wire::{self, HEADER_SIZE};
use vcuda_protocol::Reply;

use crate::dispatch::Dispatcher;
use crate::runtime::NativeRuntime;
use crate::session::Session;

const METRICS_INTERVAL: Duration = Duration::from_secs(60);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Server-wide metrics tracked via atomic counters.
pub struct ServerMetrics {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU32,
    pub requests_total: AtomicU64,
    /// Requests answered with a non-success status
    pub errors_total: AtomicU64,
    /// Sessions closed because of a corrupt request stream
    pub protocol_errors: AtomicU64,
    pub start_time: std::time::Instant,
}

impl ServerMetrics {
    fn report(&self) {
        info!(
            sessions_opened = self.connections_total.load(Ordering::Relaxed),
            sessions_live = self.connections_active.load(Ordering::Relaxed),
            requests = self.requests_total.load(Ordering::Relaxed),
            failed_requests = self.errors_total.load(Ordering::Relaxed),
            protocol_errors = self.protocol_errors.load(Ordering::Relaxed),
            uptime_secs = self.start_time.elapsed().as_secs(),
            "server metrics"
        );
    }

    fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU32::new(0),
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            start_time: std::time::Instant::now(),
        }
    }
}

/// The backend daemon. Accepts guest stub connections and serves each one as
/// an independent session with its own registry.
pub struct VcudaServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<DashMap<u32, Arc<Session>>>,
    next_session_id: AtomicU32,
    metrics: Arc<ServerMetrics>,
}

impl VcudaServer {
    pub fn new(config: ServerConfig, runtime: Arc<dyn NativeRuntime>) -> Self {
        Self {
            config,
            dispatcher: Arc::new(Dispatcher::new(runtime)),
            sessions: Arc::new(DashMap::new()),
            next_session_id: AtomicU32::new(1),
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Bind the configured address and serve until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });

        let listener = TcpListener::bind(self.config.bind_address()).await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Serve connections from `listener` until `shutdown_rx` flips.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            "vcuda backend listening on {} ({})",
            listener.local_addr()?,
            vcuda_common::platform::platform_name()
        );

        let metrics = self.metrics.clone();
        let mut stop_reporting = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(METRICS_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => metrics.report(),
                    _ = stop_reporting.changed() => break,
                }
            }
        });

        let max_clients = self.config.max_clients as usize;
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer_addr) = result?;
                    debug!(peer = %peer_addr, "accepted connection");

                    if self.sessions.len() >= max_clients {
                        warn!(peer = %peer_addr, max_clients, "session limit reached, refusing connection");
                        drop(stream);
                        continue;
                    }

                    let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                    let session = Arc::new(Session::new(session_id, peer_addr.to_string()));
                    self.sessions.insert(session_id, session.clone());
                    info!(session_id, peer = %peer_addr, "session opened");

                    self.metrics.connections_total.fetch_add(1, Ordering::Relaxed);
                    self.metrics.connections_active.fetch_add(1, Ordering::Relaxed);

                    let dispatcher = self.dispatcher.clone();
                    let sessions = self.sessions.clone();
                    let metrics = self.metrics.clone();
                    let release_on_disconnect = self.config.release_on_disconnect;

                    tokio::spawn(async move {
                        Self::handle_client(stream, session.clone(), dispatcher.clone(), metrics.clone(), idle_timeout).await;

                        let leaked = session.registry().module_count();
                        if leaked > 0 {
                            if release_on_disconnect {
                                warn!(session_id, "{} module(s) left registered at disconnect, releasing", leaked);
                                let released = tokio::task::spawn_blocking(move || {
                                    dispatcher.release_session(&session)
                                })
                                .await
                                .unwrap_or(0);
                                debug!(session_id, released, "session modules released");
                            } else {
                                warn!(session_id, "{} module(s) left registered at disconnect", leaked);
                            }
                        }

                        sessions.remove(&session_id);
                        metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
                        info!(session_id, "session closed");
                    });
                }
                _ = shutdown_rx.changed() => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        if !self.sessions.is_empty() {
            info!(
                live = self.sessions.len(),
                "draining sessions for up to {}s",
                DRAIN_TIMEOUT.as_secs()
            );
            let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
                while !self.sessions.is_empty() {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            })
            .await;
            if drained.is_err() {
                warn!(live = self.sessions.len(), "sessions still open after drain timeout");
            }
        }

        info!("vcuda backend stopped");
        Ok(())
    }

    /// Serve one connection: read a request frame, dispatch it, write the
    /// response, repeat. Requests of a session are handled strictly in order.
    async fn handle_client(
        stream: TcpStream,
        session: Arc<Session>,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<ServerMetrics>,
        idle_timeout: Duration,
    ) {
        let session_id = session.session_id;
        let (mut reader, mut writer) = stream.into_split();
        let mut header_buf = [0u8; HEADER_SIZE];

        loop {
            match tokio::time::timeout(idle_timeout, reader.read_exact(&mut header_buf)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    debug!(session_id, "peer closed connection: {}", e);
                    break;
                }
                Err(_) => {
                    warn!(session_id, "client idle timeout ({}s), disconnecting", idle_timeout.as_secs());
                    break;
                }
            }

            let header = match wire::decode_header(&header_buf) {
                Ok(h) if !h.is_response() => h,
                Ok(_) => {
                    error!(session_id, "client sent a response frame");
                    metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(e) => {
                    error!(session_id, "rejecting frame: {}", e);
                    metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            };

            // Grows as bytes arrive; a header alone cannot reserve the full length.
            let expected = header.length as usize;
            let mut payload = Vec::new();
            let mut body = (&mut reader).take(header.length as u64);
            match tokio::time::timeout(idle_timeout, body.read_to_end(&mut payload)).await {
                Ok(Ok(n)) if n == expected => {}
                Ok(Ok(n)) => {
                    error!(session_id, expected, received = n, "truncated request payload");
                    break;
                }
                Ok(Err(e)) => {
                    error!(session_id, "payload read error: {}", e);
                    break;
                }
                Err(_) => {
                    warn!(session_id, expected, "client stalled mid-request, disconnecting");
                    break;
                }
            }
            let payload = match wire::decode_payload(payload, header.flags) {
                Ok(p) => p,
                Err(e) => {
                    error!(session_id, "payload decode error: {}", e);
                    metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            };

            metrics.requests_total.fetch_add(1, Ordering::Relaxed);
            session.record_request();

            // Native calls block; keep them off the reactor.
            let routine_id = header.code;
            let worker_session = session.clone();
            let worker_dispatcher = dispatcher.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                worker_dispatcher.dispatch(&worker_session, routine_id, &payload)
            })
            .await;

            let (reply, fatal) = match outcome {
                Ok(Ok(reply)) => {
                    if !reply.status().is_success() {
                        metrics.errors_total.fetch_add(1, Ordering::Relaxed);
                    }
                    (reply, false)
                }
                Ok(Err(e)) => {
                    error!(session_id, "protocol error, closing session: {}", e);
                    metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                    (Reply::failure(e.status()), true)
                }
                Err(e) => {
                    error!(session_id, "routine worker failed: {}", e);
                    break;
                }
            };

            match wire::encode_response(&reply) {
                Ok(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        error!(session_id, "failed to send reply: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    error!(session_id, "failed to frame reply: {}", e);
                    break;
                }
            }

            if fatal {
                break;
            }
        }

        debug!(session_id, requests = session.request_count(), "connection loop finished");
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Ctrl+C received, shutting down"),
                    _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                ctrl_c.await;
                info!("Ctrl+C received, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("Ctrl+C received, shutting down");
    }
}
