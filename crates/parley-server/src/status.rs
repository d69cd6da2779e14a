//! In-process surface for the operator console: non-blocking status
//! snapshots plus server-originated messages injected into the normal
//! fan-out paths.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use parley_shared::constants::{ROLE_MEMBER, SERVER_SENDER};
use parley_shared::Frame;
use parley_store::Store;

use crate::error::ServerError;
use crate::hub::Hub;

/// One connected socket as shown in the console, authenticated or not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub username: String,
    pub display_name: String,
    pub address: String,
    pub authenticated: bool,
    pub role: i64,
}

#[derive(Clone)]
pub struct ServerHandle {
    hub: Arc<Hub>,
    store: Arc<Store>,
    shutdown_tx: watch::Sender<bool>,
}

impl ServerHandle {
    pub(crate) fn new(hub: Arc<Hub>, store: Arc<Store>, shutdown_tx: watch::Sender<bool>) -> Self {
        Self {
            hub,
            store,
            shutdown_tx,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Snapshot of every connected session. Role is resolved from the store
    /// only for authenticated sessions.
    pub async fn connected_clients(&self) -> Result<Vec<ClientInfo>, ServerError> {
        let mut clients = Vec::new();
        for session in self.hub.client_snapshot().await {
            let username = session.username();
            let authenticated = session.is_authenticated();
            let role = if authenticated && !username.is_empty() {
                self.store.role(&username)?.unwrap_or(ROLE_MEMBER)
            } else {
                ROLE_MEMBER
            };

            clients.push(ClientInfo {
                username,
                display_name: session.display_name(),
                address: session.addr().to_string(),
                authenticated,
                role,
            });
        }
        Ok(clients)
    }

    pub async fn client_count(&self) -> usize {
        self.hub.client_count().await
    }

    pub async fn online_users(&self) -> Vec<String> {
        self.hub.online_users().await
    }

    /// Push a fresh online list to every authenticated session.
    pub async fn broadcast_online_list(&self) -> Result<(), ServerError> {
        self.hub.broadcast_online_list().await?;
        Ok(())
    }

    /// Operator announcement to every authenticated session.
    pub async fn broadcast_server_message(&self, text: &str) {
        tracing::info!(text, "server broadcast");
        self.hub
            .broadcast(&Frame::global(SERVER_SENDER, text), None)
            .await;
    }

    /// Operator whisper; false when the user is not online.
    pub async fn send_server_message_to_user(&self, username: &str, text: &str) -> bool {
        let sent = self
            .hub
            .send_to_user(username, &Frame::private(SERVER_SENDER, username, text))
            .await;
        if sent {
            tracing::info!(username, text, "server message delivered");
        }
        sent
    }

    /// Signal the accept loop to stop and every session to close.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
