//! Process-wide routing hub.
//!
//! Two indexes: socket-id -> session (owning) and username -> socket-id
//! (lookup only). Every entry in the username index refers to a live,
//! authenticated session; at most one session per username. Lock order is
//! clients before users, never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use parley_shared::{Frame, ProtocolError};

use crate::session::Session;

#[derive(Default)]
pub struct Hub {
    clients: Mutex<HashMap<u64, Arc<Session>>>,
    users: Mutex<HashMap<String, u64>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<Session>) {
        self.clients.lock().await.insert(session.id(), session);
    }

    pub async fn remove(&self, id: u64) -> Option<Arc<Session>> {
        self.clients.lock().await.remove(&id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn client_snapshot(&self) -> Vec<Arc<Session>> {
        self.clients.lock().await.values().cloned().collect()
    }

    /// Claim a username for a socket. Fails when the name is already online,
    /// which is what makes the one-session-per-username invariant atomic.
    pub async fn register_user(&self, username: &str, id: u64) -> bool {
        match self.users.lock().await.entry(username.to_owned()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(id);
                true
            }
        }
    }

    pub async fn unregister_user(&self, username: &str) {
        self.users.lock().await.remove(username);
    }

    pub async fn is_user_online(&self, username: &str) -> bool {
        self.users.lock().await.contains_key(username)
    }

    pub async fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.lock().await.keys().cloned().collect();
        users.sort();
        users
    }

    /// Fan a frame out to every authenticated session except `exclude`.
    ///
    /// The recipient set is the snapshot taken under the clients lock; sends
    /// happen after the lock is released so one slow receiver cannot block
    /// the maps. Failed sends are absorbed: the receiver's own read loop
    /// notices the dead socket.
    pub async fn broadcast(&self, frame: &Frame, exclude: Option<u64>) {
        let targets: Vec<Arc<Session>> = {
            let clients = self.clients.lock().await;
            clients
                .values()
                .filter(|session| Some(session.id()) != exclude)
                .cloned()
                .collect()
        };

        for session in targets {
            if session.is_authenticated() {
                session.send(frame).await;
            }
        }
    }

    /// Push the current online list to every authenticated session.
    pub async fn broadcast_online_list(&self) -> Result<(), ProtocolError> {
        let frame = Frame::online_list(&self.online_users().await)?;
        self.broadcast(&frame, None).await;
        Ok(())
    }

    /// Deliver a frame to whoever is authenticated under `username`.
    /// Returns false if nobody is.
    pub async fn send_to_user(&self, username: &str, frame: &Frame) -> bool {
        let id = match self.users.lock().await.get(username) {
            Some(id) => *id,
            None => return false,
        };

        let session = match self.clients.lock().await.get(&id) {
            Some(session) => Arc::clone(session),
            None => return false,
        };

        session.send(frame).await
    }

    /// Force a user out: drop the username claim, clear the session's
    /// authentication and wake its read loop so the connection closes.
    pub async fn kick_user(&self, username: &str) -> bool {
        let id = match self.users.lock().await.remove(username) {
            Some(id) => id,
            None => return false,
        };

        let session = match self.clients.lock().await.get(&id) {
            Some(session) => Arc::clone(session),
            None => return false,
        };

        session.clear_authentication();
        session.close();
        true
    }

    /// Shutdown path: mark every session inactive and drop both indexes.
    pub async fn close_all(&self) {
        let mut clients = self.clients.lock().await;
        for session in clients.values() {
            session.close();
        }
        clients.clear();
        drop(clients);

        self.users.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn username_claims_are_exclusive() {
        let hub = Hub::new();
        assert!(hub.register_user("alice", 1).await);
        assert!(!hub.register_user("alice", 2).await);

        hub.unregister_user("alice").await;
        assert!(hub.register_user("alice", 2).await);
    }

    #[tokio::test]
    async fn online_users_reports_registered_names_sorted() {
        let hub = Hub::new();
        hub.register_user("zoe", 1).await;
        hub.register_user("alice", 2).await;

        assert!(hub.is_user_online("zoe").await);
        assert!(!hub.is_user_online("bob").await);
        assert_eq!(hub.online_users().await, vec!["alice", "zoe"]);
    }

    #[tokio::test]
    async fn send_to_unknown_user_returns_false() {
        let hub = Hub::new();
        assert!(!hub.send_to_user("ghost", &Frame::ok("hi")).await);
    }

    #[tokio::test]
    async fn kick_unknown_user_returns_false() {
        let hub = Hub::new();
        assert!(!hub.kick_user("ghost").await);
    }
}
