//! Listener, accept loop and per-connection workers.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::watch;

use parley_shared::constants::READ_BUFFER_SIZE;
use parley_shared::types::UserStatus;
use parley_shared::{Frame, FrameBuffer, ProtocolError};
use parley_store::Store;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::hub::Hub;
use crate::session::Session;
use crate::status::ServerHandle;

pub struct ChatServer {
    listener: tokio::net::TcpListener,
    hub: Arc<Hub>,
    store: Arc<Store>,
    config: ServerConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl ChatServer {
    /// Bind the listen socket. Address reuse is set so restarts do not trip
    /// over TIME_WAIT; the backlog is the configured client cap.
    pub async fn bind(config: ServerConfig, store: Arc<Store>) -> Result<Self, ServerError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.max_clients as u32)?;

        tracing::info!(addr = %listener.local_addr()?, "server listening");

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            listener,
            hub: Arc::new(Hub::new()),
            store,
            config,
            shutdown_tx,
        })
    }

    /// Actual bound address; differs from the configured port when it was 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Clonable in-process surface: status queries, operator messages and
    /// shutdown. Valid for the lifetime of the process.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle::new(
            Arc::clone(&self.hub),
            Arc::clone(&self.store),
            self.shutdown_tx.clone(),
        )
    }

    /// Accept loop. Returns after shutdown has been signalled and the hub
    /// has been drained; dropping `self` closes the listen socket.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut next_id: u64 = 0;

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = shutdown_rx.changed() => break,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            if self.hub.client_count().await >= self.config.max_clients {
                tracing::warn!(peer = %peer, "connection limit reached, rejecting");
                drop(stream);
                continue;
            }

            next_id += 1;
            tracing::info!(peer = %peer, id = next_id, "new connection");
            self.spawn_session(next_id, peer, stream).await;
        }

        tracing::info!("shutting down, closing sessions");
        self.hub.close_all().await;
        Ok(())
    }

    async fn spawn_session(&self, id: u64, peer: SocketAddr, stream: TcpStream) {
        let (reader, writer) = stream.into_split();
        let session = Arc::new(Session::new(id, peer, writer));

        // Install before spawning so the connection cap sees this socket.
        self.hub.insert(Arc::clone(&session)).await;

        let hub = Arc::clone(&self.hub);
        let store = Arc::clone(&self.store);
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(run_session(session, reader, hub, store, shutdown_rx));
    }
}

/// Per-connection worker: read, reassemble frames, dispatch; on exit unwind
/// the hub indexes and tell the room the user went offline.
async fn run_session(
    session: Arc<Session>,
    mut reader: OwnedReadHalf,
    hub: Arc<Hub>,
    store: Arc<Store>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut frames = FrameBuffer::new();

    while session.is_active() {
        let read = tokio::select! {
            read = reader.read(&mut buf) => read,
            _ = session.closed() => break,
            _ = shutdown_rx.changed() => break,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(peer = %session.addr(), error = %e, "read failed");
                break;
            }
        };

        frames.extend(&buf[..n]);
        drain_frames(&session, &mut frames, &hub, &store).await;
    }

    let username = session.username();
    if session.is_authenticated() {
        hub.broadcast(
            &Frame::user_status(&username, UserStatus::Offline),
            Some(session.id()),
        )
        .await;
        hub.unregister_user(&username).await;
    }
    hub.remove(session.id()).await;

    tracing::info!(peer = %session.addr(), username = %username, "client disconnected");
}

/// Process every complete frame currently buffered. Framing-level failures
/// produce an error reply but never kill the connection.
async fn drain_frames(session: &Arc<Session>, frames: &mut FrameBuffer, hub: &Hub, store: &Store) {
    loop {
        match frames.next_frame() {
            Ok(Some(frame)) => session.handle_frame(frame, hub, store).await,
            Ok(None) => break,
            Err(ProtocolError::FrameTooLarge(len)) => {
                tracing::warn!(peer = %session.addr(), len, "oversized frame, buffer cleared");
                session
                    .send(&Frame::error("Message too large or invalid"))
                    .await;
            }
            Err(ProtocolError::UnknownType(code)) => {
                tracing::debug!(peer = %session.addr(), code, "unknown frame type");
                session.send(&Frame::error("Unknown command")).await;
            }
            Err(e) => {
                tracing::debug!(peer = %session.addr(), error = %e, "malformed frame");
                session.send(&Frame::error("Invalid request format")).await;
            }
        }
    }
}
