//! Shared harness for the network tests: a real server on an ephemeral port
//! plus a minimal frame-speaking client.
#![allow(dead_code)] // each test binary uses a different subset

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use parley_server::{ChatServer, ServerConfig, ServerHandle};
use parley_shared::types::{Credentials, FrameKind};
use parley_shared::{encode, Frame, FrameBuffer};
use parley_store::Store;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub store: Arc<Store>,
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with_limit(16).await
}

pub async fn spawn_server_with_limit(max_clients: usize) -> TestServer {
    let store = Arc::new(Store::open_in_memory().expect("in-memory store should open"));
    let config = ServerConfig {
        port: 0,
        max_clients,
        ..ServerConfig::default()
    };

    let server = ChatServer::bind(config, Arc::clone(&store))
        .await
        .expect("server should bind an ephemeral port");
    let port = server
        .local_addr()
        .expect("bound address should be readable")
        .port();
    let handle = server.handle();
    tokio::spawn(server.run());

    TestServer {
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        handle,
        store,
    }
}

pub struct TestClient {
    stream: TcpStream,
    buffer: FrameBuffer,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("client should connect");
        Self {
            stream,
            buffer: FrameBuffer::new(),
        }
    }

    pub async fn send(&mut self, frame: &Frame) {
        let bytes = encode(frame).expect("test frame should encode");
        self.send_raw(&bytes).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream
            .write_all(bytes)
            .await
            .expect("write to server should succeed");
    }

    /// Next frame, failing the test if none arrives in time.
    pub async fn recv(&mut self) -> Frame {
        self.try_recv(RECV_TIMEOUT)
            .await
            .expect("expected a frame from the server")
    }

    /// Next frame, or `None` on timeout / connection close.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Frame> {
        loop {
            if let Some(frame) = self
                .buffer
                .next_frame()
                .expect("server frames should be well-formed")
            {
                return Some(frame);
            }

            let mut buf = [0u8; 4096];
            let n = match tokio::time::timeout(wait, self.stream.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(_)) | Err(_) => return None,
            };
            if n == 0 {
                return None;
            }
            self.buffer.extend(&buf[..n]);
        }
    }

    /// Skip frames until one of the given kind shows up. Broadcast traffic
    /// (USER_STATUS, ONLINE_LIST) interleaves with replies, so most
    /// assertions go through this.
    pub async fn recv_kind(&mut self, kind: FrameKind) -> Frame {
        for _ in 0..16 {
            let frame = self.recv().await;
            if frame.kind == kind {
                return frame;
            }
        }
        panic!("no {kind} frame within 16 frames");
    }

    pub async fn register(&mut self, username: &str, password: &str) -> Frame {
        self.send(&credentials_frame(FrameKind::Register, username, password))
            .await;
        self.recv().await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Frame {
        self.send(&credentials_frame(FrameKind::Login, username, password))
            .await;
        self.recv().await
    }

    /// Register + login and drain the post-login ONLINE_LIST so the
    /// connection starts each test at a quiet point.
    pub async fn join(&mut self, username: &str, password: &str) {
        let reply = self.register(username, password).await;
        assert_eq!(reply.kind, FrameKind::Ok, "register failed: {}", reply.content);
        let reply = self.login(username, password).await;
        assert_eq!(reply.kind, FrameKind::Ok, "login failed: {}", reply.content);
        self.recv_kind(FrameKind::OnlineList).await;
    }

    pub async fn global(&mut self, content: &str) {
        self.send(&Frame {
            content: content.into(),
            ..Frame::new(FrameKind::MsgGlobal)
        })
        .await;
    }

    pub async fn private(&mut self, receiver: &str, content: &str) {
        self.send(&Frame {
            receiver: receiver.into(),
            content: content.into(),
            ..Frame::new(FrameKind::MsgPrivate)
        })
        .await;
    }

    /// Moderation command with the target in `receiver`.
    pub async fn admin(&mut self, kind: FrameKind, target: &str) {
        self.send(&Frame {
            receiver: target.into(),
            ..Frame::new(kind)
        })
        .await;
    }
}

pub fn credentials_frame(kind: FrameKind, username: &str, password: &str) -> Frame {
    let creds = Credentials {
        username: username.into(),
        password: password.into(),
        display_name: None,
    };
    Frame {
        content: serde_json::to_string(&creds).expect("credentials should encode"),
        ..Frame::new(kind)
    }
}
