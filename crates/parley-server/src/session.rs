//! Per-connection session: authentication state, the send half of the
//! socket, and the dispatch table for every inbound frame.
//!
//! A session is Anonymous until LOGIN succeeds, Authenticated until LOGOUT,
//! kick or disconnect. The hub owns sessions by socket id; handlers receive
//! the hub and store by reference so the session itself stays cycle-free.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, Notify};

use parley_shared::constants::{
    PASSWORD_MIN_LEN, RATE_LIMIT_MAX_MESSAGES, RATE_LIMIT_WINDOW_SECS, ROLE_ADMIN, ROLE_MEMBER,
    USERNAME_MAX_LEN, USERNAME_MIN_LEN,
};
use parley_shared::types::{
    Credentials, FrameKind, LoginAck, PasswordChange, UserStatus, UserSummary,
};
use parley_shared::{encode, Frame, ProtocolError};
use parley_store::{MessageKind, Store, StoreError, UserRecord};

use crate::error::ServerError;
use crate::hub::Hub;
use crate::rate_limit::RateWindow;

#[derive(Default)]
struct Identity {
    username: String,
    display_name: String,
    authenticated: bool,
}

pub struct Session {
    id: u64,
    addr: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    identity: StdMutex<Identity>,
    active: AtomicBool,
    closed: Notify,
    rate: StdMutex<RateWindow>,
}

impl Session {
    pub fn new(id: u64, addr: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id,
            addr,
            writer: Mutex::new(writer),
            identity: StdMutex::new(Identity::default()),
            active: AtomicBool::new(true),
            closed: Notify::new(),
            rate: StdMutex::new(RateWindow::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn username(&self) -> String {
        self.identity().username.clone()
    }

    pub fn display_name(&self) -> String {
        self.identity().display_name.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity().authenticated
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn set_authenticated(&self, username: &str, display_name: &str) {
        let mut identity = self.identity();
        identity.username = username.to_owned();
        identity.display_name = display_name.to_owned();
        identity.authenticated = true;
    }

    pub fn clear_authentication(&self) {
        let mut identity = self.identity();
        identity.username.clear();
        identity.display_name.clear();
        identity.authenticated = false;
    }

    /// Mark the session dead and wake its read loop. The permit semantics of
    /// [`Notify::notify_one`] cover the case where the loop is mid-dispatch
    /// rather than parked on the socket.
    pub fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.closed.notify_one();
    }

    pub async fn closed(&self) {
        self.closed.notified().await;
    }

    fn identity(&self) -> std::sync::MutexGuard<'_, Identity> {
        self.identity.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write one complete frame. The writer lock guarantees frames from
    /// concurrent tasks never interleave on the wire. Returns false on any
    /// failure; a dead peer is discovered by the read loop, not here.
    pub async fn send(&self, frame: &Frame) -> bool {
        if !self.is_active() {
            return false;
        }

        let bytes = match encode(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(peer = %self.addr, error = %e, "frame encode failed");
                return false;
            }
        };

        let mut writer = self.writer.lock().await;
        match writer.write_all(&bytes).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(peer = %self.addr, error = %e, "send failed");
                false
            }
        }
    }

    fn within_rate_limit(&self) -> bool {
        self.rate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .allow(
                RATE_LIMIT_MAX_MESSAGES,
                Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            )
    }

    /// Dispatch one inbound frame. Never lets a handler failure escape: the
    /// originator gets a generic error and the session keeps running.
    pub async fn handle_frame(&self, frame: Frame, hub: &Hub, store: &Store) {
        tracing::debug!(peer = %self.addr, kind = %frame.kind, "frame received");

        if let Err(e) = self.dispatch(frame, hub, store).await {
            tracing::error!(peer = %self.addr, error = %e, "handler failed");
            self.send(&Frame::error("Internal server error")).await;
        }
    }

    async fn dispatch(&self, frame: Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        match frame.kind {
            FrameKind::Register => self.handle_register(&frame, store).await,
            FrameKind::Login => self.handle_login(&frame, hub, store).await,
            FrameKind::Logout => self.handle_logout(hub).await,
            FrameKind::ChangePassword => self.handle_change_password(&frame, store).await,
            FrameKind::MsgGlobal => self.handle_global(&frame, hub, store).await,
            FrameKind::MsgPrivate => self.handle_private(&frame, hub, store).await,
            FrameKind::Ping => {
                self.send(&Frame::new(FrameKind::Pong)).await;
                Ok(())
            }
            FrameKind::KickUser => self.handle_kick(&frame, hub, store).await,
            FrameKind::BanUser => self.handle_ban(&frame, hub, store).await,
            FrameKind::UnbanUser => self.handle_unban(&frame, store).await,
            FrameKind::MuteUser => self.handle_mute(&frame, hub, store).await,
            FrameKind::UnmuteUser => self.handle_unmute(&frame, hub, store).await,
            FrameKind::PromoteUser => self.handle_promote(&frame, store).await,
            FrameKind::DemoteUser => self.handle_demote(&frame, store).await,
            FrameKind::GetAllUsers => self.handle_get_all_users(hub, store).await,
            FrameKind::GetBannedList => self.handle_get_banned_list(store).await,
            FrameKind::GetMutedList => self.handle_get_muted_list(store).await,
            FrameKind::UserInfo => self.handle_user_info(&frame, hub, store).await,
            // Server-originated kinds arriving inbound are client bugs.
            FrameKind::OnlineList
            | FrameKind::UserStatus
            | FrameKind::Kicked
            | FrameKind::Banned
            | FrameKind::Muted
            | FrameKind::Unmuted
            | FrameKind::Ok
            | FrameKind::Error
            | FrameKind::Pong => {
                self.send(&Frame::error("Unknown command")).await;
                Ok(())
            }
        }
    }

    async fn handle_register(&self, frame: &Frame, store: &Store) -> Result<(), ServerError> {
        let Some(creds) = self.parse_payload::<Credentials>(&frame.content).await else {
            return Ok(());
        };

        if creds.username.is_empty() || creds.password.is_empty() {
            self.send(&Frame::error("Username and password are required"))
                .await;
            return Ok(());
        }

        let len = creds.username.chars().count();
        if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
            self.send(&Frame::error("Username must be 3-20 characters"))
                .await;
            return Ok(());
        }

        if creds.password.chars().count() < PASSWORD_MIN_LEN {
            self.send(&Frame::error("Password must be at least 4 characters"))
                .await;
            return Ok(());
        }

        match store.register(
            &creds.username,
            &creds.password,
            creds.display_name.as_deref(),
        ) {
            Ok(()) => {
                tracing::info!(username = %creds.username, peer = %self.addr, "user registered");
                self.send(&Frame::ok("Registration successful")).await;
            }
            Err(StoreError::AlreadyExists) => {
                self.send(&Frame::error("Username already exists")).await;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn handle_login(&self, frame: &Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        if self.is_authenticated() {
            self.send(&Frame::error("Already logged in")).await;
            return Ok(());
        }

        let Some(creds) = self.parse_payload::<Credentials>(&frame.content).await else {
            return Ok(());
        };

        if hub.is_user_online(&creds.username).await {
            self.send(&Frame::error(
                "User already logged in from another location",
            ))
            .await;
            return Ok(());
        }

        if store.is_banned(&creds.username)? {
            self.send(&Frame::error("Your account has been banned"))
                .await;
            return Ok(());
        }

        if !store.authenticate(&creds.username, &creds.password)? {
            self.send(&Frame::error("Invalid username or password"))
                .await;
            return Ok(());
        }

        let display_name = store
            .display_name(&creds.username)?
            .unwrap_or_else(|| creds.username.clone());
        self.set_authenticated(&creds.username, &display_name);

        // The index insert is the atomic claim; two racing logins for the
        // same name cannot both get here and win.
        if !hub.register_user(&creds.username, self.id).await {
            self.clear_authentication();
            self.send(&Frame::error(
                "User already logged in from another location",
            ))
            .await;
            return Ok(());
        }

        tracing::info!(username = %creds.username, peer = %self.addr, "user logged in");

        let ack = LoginAck {
            username: creds.username.clone(),
            display_name,
            role: store.role(&creds.username)?.unwrap_or(ROLE_MEMBER),
            is_muted: store.is_muted(&creds.username)?,
        };
        let extra = serde_json::to_string(&ack).map_err(ProtocolError::Encode)?;
        self.send(&Frame::ok_with_extra("Login successful", extra))
            .await;

        hub.broadcast(
            &Frame::user_status(&creds.username, UserStatus::Online),
            None,
        )
        .await;

        let online = hub.online_users().await;
        self.send(&Frame::online_list(&online)?).await;
        Ok(())
    }

    async fn handle_logout(&self, hub: &Hub) -> Result<(), ServerError> {
        if !self.is_authenticated() {
            self.send(&Frame::error("Not logged in")).await;
            return Ok(());
        }

        let username = self.username();
        tracing::info!(username = %username, peer = %self.addr, "user logged out");

        hub.broadcast(
            &Frame::user_status(&username, UserStatus::Offline),
            Some(self.id),
        )
        .await;
        hub.unregister_user(&username).await;
        self.clear_authentication();

        self.send(&Frame::ok("Logged out successfully")).await;
        Ok(())
    }

    async fn handle_change_password(
        &self,
        frame: &Frame,
        store: &Store,
    ) -> Result<(), ServerError> {
        if !self.is_authenticated() {
            self.send(&Frame::error("Must be logged in to change password"))
                .await;
            return Ok(());
        }

        let Some(change) = self.parse_payload::<PasswordChange>(&frame.content).await else {
            return Ok(());
        };

        if change.new_password.chars().count() < PASSWORD_MIN_LEN {
            self.send(&Frame::error("New password must be at least 4 characters"))
                .await;
            return Ok(());
        }

        let username = self.username();
        match store.change_password(&username, &change.old_password, &change.new_password) {
            Ok(()) => {
                self.send(&Frame::ok("Password changed successfully")).await;
            }
            Err(StoreError::WrongCredentials) => {
                self.send(&Frame::error("Incorrect old password")).await;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn handle_global(&self, frame: &Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        let Some(username) = self.chat_sender(store).await? else {
            return Ok(());
        };

        if frame.content.is_empty() {
            return Ok(());
        }

        store.log_message(&username, "", &frame.content, MessageKind::Global)?;
        hub.broadcast(&Frame::global(&username, &frame.content), None)
            .await;
        Ok(())
    }

    async fn handle_private(&self, frame: &Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        let Some(sender) = self.chat_sender(store).await? else {
            return Ok(());
        };

        if frame.receiver.is_empty() {
            self.send(&Frame::error("Receiver not specified")).await;
            return Ok(());
        }

        if frame.content.is_empty() {
            return Ok(());
        }

        if frame.receiver == sender {
            self.send(&Frame::error("Cannot send message to yourself"))
                .await;
            return Ok(());
        }

        let message = Frame::private(&sender, &frame.receiver, &frame.content);

        // Deliver before logging, so an undeliverable message leaves no
        // audit row the sender was told did not go through.
        if !hub.send_to_user(&frame.receiver, &message).await {
            self.send(&Frame::error(format!("User not online: {}", frame.receiver)))
                .await;
            return Ok(());
        }

        store.log_message(&sender, &frame.receiver, &frame.content, MessageKind::Private)?;

        // Echo copy, so sender and receiver render the same history.
        self.send(&message).await;
        Ok(())
    }

    /// Common preconditions for chat frames: authenticated, not muted,
    /// within the rate window. Emits the error reply itself and returns
    /// `None` when the frame must be dropped.
    async fn chat_sender(&self, store: &Store) -> Result<Option<String>, ServerError> {
        if !self.is_authenticated() {
            self.send(&Frame::error("Must be logged in to send messages"))
                .await;
            return Ok(None);
        }

        let username = self.username();
        if store.is_muted(&username)? {
            self.send(&Frame::error("You are muted and cannot send messages"))
                .await;
            return Ok(None);
        }

        if !self.within_rate_limit() {
            self.send(&Frame::error(
                "Rate limit exceeded. Please wait before sending more messages.",
            ))
            .await;
            return Ok(None);
        }

        Ok(Some(username))
    }

    // ---- Admin commands --------------------------------------------------

    /// Authentication + role check shared by every moderation command.
    /// Emits the error reply itself; `None` means stop.
    async fn admin_caller(&self, store: &Store) -> Result<Option<String>, ServerError> {
        if !self.is_authenticated() {
            self.send(&Frame::error("Must be logged in")).await;
            return Ok(None);
        }

        let username = self.username();
        if !store.is_admin(&username)? {
            self.send(&Frame::error("Admin privileges required")).await;
            return Ok(None);
        }

        Ok(Some(username))
    }

    /// Admin target is carried in `receiver`.
    async fn admin_target(&self, frame: &Frame) -> Option<String> {
        if frame.receiver.is_empty() {
            self.send(&Frame::error("Target user not specified")).await;
            return None;
        }
        Some(frame.receiver.clone())
    }

    async fn handle_kick(&self, frame: &Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        let Some(admin) = self.admin_caller(store).await? else {
            return Ok(());
        };
        let Some(target) = self.admin_target(frame).await else {
            return Ok(());
        };

        if target == admin {
            self.send(&Frame::error("Cannot kick yourself")).await;
            return Ok(());
        }

        if !hub.is_user_online(&target).await {
            self.send(&Frame::error(format!("User not online: {target}")))
                .await;
            return Ok(());
        }

        let notice = Frame {
            content: format!("You have been kicked by {admin}"),
            ..Frame::new(FrameKind::Kicked)
        };
        hub.send_to_user(&target, &notice).await;
        hub.kick_user(&target).await;

        tracing::info!(target = %target, admin = %admin, "user kicked");
        self.send(&Frame::ok(format!("User kicked: {target}"))).await;

        hub.broadcast(&Frame::user_status(&target, UserStatus::Offline), None)
            .await;
        Ok(())
    }

    async fn handle_ban(&self, frame: &Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        let Some(admin) = self.admin_caller(store).await? else {
            return Ok(());
        };
        let Some(target) = self.admin_target(frame).await else {
            return Ok(());
        };

        if target == admin {
            self.send(&Frame::error("Cannot ban yourself")).await;
            return Ok(());
        }

        if store.is_admin(&target)? {
            self.send(&Frame::error("Cannot ban an admin")).await;
            return Ok(());
        }

        if !store.user_exists(&target)? {
            self.send(&Frame::error(format!("User not found: {target}")))
                .await;
            return Ok(());
        }

        if !store.ban(&target)? {
            self.send(&Frame::error("Failed to ban user")).await;
            return Ok(());
        }

        tracing::info!(target = %target, admin = %admin, "user banned");

        // A live session is forced out immediately.
        if hub.is_user_online(&target).await {
            let notice = Frame {
                content: format!("You have been banned by {admin}"),
                ..Frame::new(FrameKind::Banned)
            };
            hub.send_to_user(&target, &notice).await;
            hub.kick_user(&target).await;
            hub.broadcast(&Frame::user_status(&target, UserStatus::Offline), None)
                .await;
        }

        self.send(&Frame::ok(format!("User banned: {target}"))).await;
        Ok(())
    }

    async fn handle_unban(&self, frame: &Frame, store: &Store) -> Result<(), ServerError> {
        let Some(admin) = self.admin_caller(store).await? else {
            return Ok(());
        };
        let Some(target) = self.admin_target(frame).await else {
            return Ok(());
        };

        if !store.user_exists(&target)? {
            self.send(&Frame::error(format!("User not found: {target}")))
                .await;
            return Ok(());
        }

        if store.unban(&target)? {
            tracing::info!(target = %target, admin = %admin, "user unbanned");
            self.send(&Frame::ok(format!("User unbanned: {target}")))
                .await;
        } else {
            self.send(&Frame::error("Failed to unban user")).await;
        }
        Ok(())
    }

    async fn handle_mute(&self, frame: &Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        let Some(admin) = self.admin_caller(store).await? else {
            return Ok(());
        };
        let Some(target) = self.admin_target(frame).await else {
            return Ok(());
        };

        if target == admin {
            self.send(&Frame::error("Cannot mute yourself")).await;
            return Ok(());
        }

        if store.is_admin(&target)? {
            self.send(&Frame::error("Cannot mute an admin")).await;
            return Ok(());
        }

        if !store.user_exists(&target)? {
            self.send(&Frame::error(format!("User not found: {target}")))
                .await;
            return Ok(());
        }

        if !store.mute(&target)? {
            self.send(&Frame::error("Failed to mute user")).await;
            return Ok(());
        }

        tracing::info!(target = %target, admin = %admin, "user muted");

        if hub.is_user_online(&target).await {
            let notice = Frame {
                content: format!("You have been muted by {admin}"),
                ..Frame::new(FrameKind::Muted)
            };
            hub.send_to_user(&target, &notice).await;
        }

        self.send(&Frame::ok(format!("User muted: {target}"))).await;
        Ok(())
    }

    async fn handle_unmute(&self, frame: &Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        let Some(admin) = self.admin_caller(store).await? else {
            return Ok(());
        };
        let Some(target) = self.admin_target(frame).await else {
            return Ok(());
        };

        if !store.user_exists(&target)? {
            self.send(&Frame::error(format!("User not found: {target}")))
                .await;
            return Ok(());
        }

        if !store.unmute(&target)? {
            self.send(&Frame::error("Failed to unmute user")).await;
            return Ok(());
        }

        tracing::info!(target = %target, admin = %admin, "user unmuted");

        if hub.is_user_online(&target).await {
            let notice = Frame {
                content: format!("You have been unmuted by {admin}"),
                ..Frame::new(FrameKind::Unmuted)
            };
            hub.send_to_user(&target, &notice).await;
        }

        self.send(&Frame::ok(format!("User unmuted: {target}")))
            .await;
        Ok(())
    }

    async fn handle_promote(&self, frame: &Frame, store: &Store) -> Result<(), ServerError> {
        let Some(admin) = self.admin_caller(store).await? else {
            return Ok(());
        };
        let Some(target) = self.admin_target(frame).await else {
            return Ok(());
        };

        if !store.user_exists(&target)? {
            self.send(&Frame::error(format!("User not found: {target}")))
                .await;
            return Ok(());
        }

        if store.is_admin(&target)? {
            self.send(&Frame::error("User is already an admin")).await;
            return Ok(());
        }

        if store.set_role(&target, ROLE_ADMIN)? {
            tracing::info!(target = %target, admin = %admin, "user promoted to admin");
            self.send(&Frame::ok(format!("User promoted to admin: {target}")))
                .await;
        } else {
            self.send(&Frame::error("Failed to promote user")).await;
        }
        Ok(())
    }

    async fn handle_demote(&self, frame: &Frame, store: &Store) -> Result<(), ServerError> {
        let Some(admin) = self.admin_caller(store).await? else {
            return Ok(());
        };
        let Some(target) = self.admin_target(frame).await else {
            return Ok(());
        };

        if target == admin {
            self.send(&Frame::error("Cannot demote yourself")).await;
            return Ok(());
        }

        if !store.user_exists(&target)? {
            self.send(&Frame::error(format!("User not found: {target}")))
                .await;
            return Ok(());
        }

        if !store.is_admin(&target)? {
            self.send(&Frame::error("User is not an admin")).await;
            return Ok(());
        }

        if store.set_role(&target, ROLE_MEMBER)? {
            tracing::info!(target = %target, admin = %admin, "user demoted from admin");
            self.send(&Frame::ok(format!("User demoted from admin: {target}")))
                .await;
        } else {
            self.send(&Frame::error("Failed to demote user")).await;
        }
        Ok(())
    }

    async fn handle_get_all_users(&self, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        if self.admin_caller(store).await?.is_none() {
            return Ok(());
        }

        let mut summaries = Vec::new();
        for record in store.all_users()? {
            let online = hub.is_user_online(&record.username).await;
            summaries.push(summarize(&record, online));
        }

        let extra = serde_json::to_string(&summaries).map_err(ProtocolError::Encode)?;
        self.send(&Frame {
            extra,
            ..Frame::new(FrameKind::GetAllUsers)
        })
        .await;
        Ok(())
    }

    async fn handle_get_banned_list(&self, store: &Store) -> Result<(), ServerError> {
        if self.admin_caller(store).await?.is_none() {
            return Ok(());
        }

        let extra =
            serde_json::to_string(&store.banned_users()?).map_err(ProtocolError::Encode)?;
        self.send(&Frame {
            extra,
            ..Frame::new(FrameKind::GetBannedList)
        })
        .await;
        Ok(())
    }

    async fn handle_get_muted_list(&self, store: &Store) -> Result<(), ServerError> {
        if self.admin_caller(store).await?.is_none() {
            return Ok(());
        }

        let extra = serde_json::to_string(&store.muted_users()?).map_err(ProtocolError::Encode)?;
        self.send(&Frame {
            extra,
            ..Frame::new(FrameKind::GetMutedList)
        })
        .await;
        Ok(())
    }

    async fn handle_user_info(&self, frame: &Frame, hub: &Hub, store: &Store) -> Result<(), ServerError> {
        if !self.is_authenticated() {
            self.send(&Frame::error("Must be logged in")).await;
            return Ok(());
        }

        // Empty target means "my own record".
        let target = if frame.receiver.is_empty() {
            self.username()
        } else {
            frame.receiver.clone()
        };

        let Some(record) = store.user_info(&target)? else {
            self.send(&Frame::error(format!("User not found: {target}")))
                .await;
            return Ok(());
        };

        let online = hub.is_user_online(&record.username).await;
        let extra =
            serde_json::to_string(&summarize(&record, online)).map_err(ProtocolError::Encode)?;
        self.send(&Frame {
            extra,
            ..Frame::new(FrameKind::UserInfo)
        })
        .await;
        Ok(())
    }

    /// Parse a JSON sub-document out of `content`, replying with a format
    /// error on failure.
    async fn parse_payload<T: serde::de::DeserializeOwned>(&self, content: &str) -> Option<T> {
        match serde_json::from_str(content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(peer = %self.addr, error = %e, "bad request payload");
                self.send(&Frame::error("Invalid request format")).await;
                None
            }
        }
    }
}

fn summarize(record: &UserRecord, is_online: bool) -> UserSummary {
    UserSummary {
        username: record.username.clone(),
        display_name: record.display_name.clone(),
        role: record.role,
        is_banned: record.is_banned,
        is_muted: record.is_muted,
        created_at: record.created_at.to_rfc3339(),
        is_online,
    }
}
