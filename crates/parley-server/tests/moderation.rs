//! Moderation semantics over the wire: kick, ban, mute, role changes, the
//! admin list queries and the operator console surface.

mod common;

use std::time::Duration;

use parley_shared::constants::SERVER_SENDER;
use parley_shared::types::FrameKind;
use parley_shared::Frame;

use common::{spawn_server, TestClient, TestServer};

/// root registers first (and is therefore admin), then alice.
async fn root_and_alice(server: &TestServer) -> (TestClient, TestClient) {
    let mut root = TestClient::connect(server.addr).await;
    root.join("root", "pw12").await;
    let mut alice = TestClient::connect(server.addr).await;
    alice.join("alice", "pw12").await;
    // Drain alice's online broadcast from root's stream.
    root.recv_kind(FrameKind::UserStatus).await;
    (root, alice)
}

#[tokio::test]
async fn ban_kicks_the_target_and_bars_future_logins() {
    let server = spawn_server().await;
    let (mut root, mut alice) = root_and_alice(&server).await;

    root.admin(FrameKind::BanUser, "alice").await;

    let notice = alice.recv_kind(FrameKind::Banned).await;
    assert!(notice.content.contains("banned by root"));
    assert!(
        alice.try_recv(Duration::from_secs(2)).await.is_none(),
        "banned session should be closed"
    );

    let status = root.recv_kind(FrameKind::UserStatus).await;
    assert_eq!(status.sender, "alice");
    assert_eq!(status.content, "offline");
    let reply = root.recv_kind(FrameKind::Ok).await;
    assert_eq!(reply.content, "User banned: alice");

    assert!(server.store.is_banned("alice").unwrap());
    assert!(!server.handle.online_users().await.contains(&"alice".into()));

    let mut again = TestClient::connect(server.addr).await;
    let reply = again.login("alice", "pw12").await;
    assert_eq!(reply.kind, FrameKind::Error);
    assert!(reply.content.to_lowercase().contains("banned"));
}

#[tokio::test]
async fn unban_restores_login() {
    let server = spawn_server().await;
    let (mut root, _alice) = root_and_alice(&server).await;

    root.admin(FrameKind::BanUser, "alice").await;
    root.recv_kind(FrameKind::Ok).await;
    root.admin(FrameKind::UnbanUser, "alice").await;
    let reply = root.recv_kind(FrameKind::Ok).await;
    assert_eq!(reply.content, "User unbanned: alice");

    let mut again = TestClient::connect(server.addr).await;
    let reply = again.login("alice", "pw12").await;
    assert_eq!(reply.kind, FrameKind::Ok, "unbanned user should log in");
}

#[tokio::test]
async fn mute_blocks_chat_but_not_control_frames() {
    let server = spawn_server().await;
    let (mut root, mut alice) = root_and_alice(&server).await;

    root.admin(FrameKind::MuteUser, "alice").await;
    let reply = root.recv_kind(FrameKind::Ok).await;
    assert_eq!(reply.content, "User muted: alice");

    let notice = alice.recv_kind(FrameKind::Muted).await;
    assert!(notice.content.contains("muted by root"));

    alice.global("x").await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, FrameKind::Error);
    assert!(reply.content.contains("muted"));

    alice.private("root", "x").await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, FrameKind::Error);
    assert!(reply.content.contains("muted"));

    // Muted messages never reach the log.
    assert_eq!(server.store.message_count().unwrap(), 0);

    alice.send(&Frame::new(FrameKind::Ping)).await;
    assert_eq!(alice.recv().await.kind, FrameKind::Pong);

    root.admin(FrameKind::UnmuteUser, "alice").await;
    root.recv_kind(FrameKind::Ok).await;
    let notice = alice.recv_kind(FrameKind::Unmuted).await;
    assert!(notice.content.contains("unmuted by root"));

    alice.global("free again").await;
    let frame = alice.recv_kind(FrameKind::MsgGlobal).await;
    assert_eq!(frame.content, "free again");
}

#[tokio::test]
async fn kick_removes_the_user_and_closes_the_session() {
    let server = spawn_server().await;
    let (mut root, mut alice) = root_and_alice(&server).await;

    root.admin(FrameKind::KickUser, "alice").await;

    let notice = alice.recv_kind(FrameKind::Kicked).await;
    assert!(notice.content.contains("kicked by root"));
    assert!(
        alice.try_recv(Duration::from_secs(2)).await.is_none(),
        "kicked session should be closed"
    );

    let reply = root.recv_kind(FrameKind::Ok).await;
    assert_eq!(reply.content, "User kicked: alice");
    let status = root.recv_kind(FrameKind::UserStatus).await;
    assert_eq!(status.sender, "alice");
    assert_eq!(status.content, "offline");

    assert_eq!(server.handle.online_users().await, vec!["root"]);
    // Kick is session-level only; the account itself is untouched.
    assert!(!server.store.is_banned("alice").unwrap());
}

#[tokio::test]
async fn moderation_requires_admin_and_authentication() {
    let server = spawn_server().await;
    let (_root, mut alice) = root_and_alice(&server).await;

    alice.admin(FrameKind::KickUser, "root").await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, FrameKind::Error);
    assert!(reply.content.contains("Admin privileges required"));

    let mut anon = TestClient::connect(server.addr).await;
    anon.admin(FrameKind::BanUser, "alice").await;
    let reply = anon.recv().await;
    assert_eq!(reply.kind, FrameKind::Error);
    assert!(reply.content.contains("Must be logged in"));
}

#[tokio::test]
async fn admins_cannot_target_themselves_or_other_admins() {
    let server = spawn_server().await;
    let (mut root, _alice) = root_and_alice(&server).await;

    root.admin(FrameKind::KickUser, "root").await;
    assert!(root.recv().await.content.contains("Cannot kick yourself"));
    root.admin(FrameKind::BanUser, "root").await;
    assert!(root.recv().await.content.contains("Cannot ban yourself"));
    root.admin(FrameKind::MuteUser, "root").await;
    assert!(root.recv().await.content.contains("Cannot mute yourself"));
    root.admin(FrameKind::DemoteUser, "root").await;
    assert!(root.recv().await.content.contains("Cannot demote yourself"));

    root.admin(FrameKind::PromoteUser, "alice").await;
    root.recv_kind(FrameKind::Ok).await;

    root.admin(FrameKind::BanUser, "alice").await;
    assert!(root.recv().await.content.contains("Cannot ban an admin"));
    root.admin(FrameKind::MuteUser, "alice").await;
    assert!(root.recv().await.content.contains("Cannot mute an admin"));
}

#[tokio::test]
async fn promote_and_demote_validate_the_target_role() {
    let server = spawn_server().await;
    let (mut root, _alice) = root_and_alice(&server).await;

    root.admin(FrameKind::DemoteUser, "alice").await;
    assert!(root.recv().await.content.contains("User is not an admin"));

    root.admin(FrameKind::PromoteUser, "alice").await;
    let reply = root.recv_kind(FrameKind::Ok).await;
    assert_eq!(reply.content, "User promoted to admin: alice");
    assert!(server.store.is_admin("alice").unwrap());

    root.admin(FrameKind::PromoteUser, "alice").await;
    assert!(root.recv().await.content.contains("already an admin"));

    root.admin(FrameKind::DemoteUser, "alice").await;
    let reply = root.recv_kind(FrameKind::Ok).await;
    assert_eq!(reply.content, "User demoted from admin: alice");
    assert!(!server.store.is_admin("alice").unwrap());

    root.admin(FrameKind::PromoteUser, "ghost").await;
    assert!(root.recv().await.content.contains("User not found"));
}

#[tokio::test]
async fn admin_list_queries_report_flags_and_presence() {
    let server = spawn_server().await;
    let (mut root, mut alice) = root_and_alice(&server).await;

    root.admin(FrameKind::MuteUser, "alice").await;
    root.recv_kind(FrameKind::Ok).await;
    alice.recv_kind(FrameKind::Muted).await;

    root.send(&Frame::new(FrameKind::GetAllUsers)).await;
    let reply = root.recv_kind(FrameKind::GetAllUsers).await;
    let users: Vec<serde_json::Value> = serde_json::from_str(&reply.extra).unwrap();
    assert_eq!(users.len(), 2);
    let alice_row = users
        .iter()
        .find(|u| u["username"] == "alice")
        .expect("alice should be listed");
    assert_eq!(alice_row["isMuted"], true);
    assert_eq!(alice_row["isOnline"], true);
    assert_eq!(alice_row["role"], 0);

    root.send(&Frame::new(FrameKind::GetMutedList)).await;
    let reply = root.recv_kind(FrameKind::GetMutedList).await;
    let muted: Vec<String> = serde_json::from_str(&reply.extra).unwrap();
    assert_eq!(muted, vec!["alice"]);

    root.send(&Frame::new(FrameKind::GetBannedList)).await;
    let reply = root.recv_kind(FrameKind::GetBannedList).await;
    let banned: Vec<String> = serde_json::from_str(&reply.extra).unwrap();
    assert!(banned.is_empty());

    // Non-admins get refused.
    alice.send(&Frame::new(FrameKind::GetAllUsers)).await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, FrameKind::Error);
    assert!(reply.content.contains("Admin privileges required"));
}

#[tokio::test]
async fn user_info_is_available_to_any_authenticated_user() {
    let server = spawn_server().await;
    let (_root, mut alice) = root_and_alice(&server).await;

    // Empty receiver means "my own record".
    alice.send(&Frame::new(FrameKind::UserInfo)).await;
    let reply = alice.recv_kind(FrameKind::UserInfo).await;
    let info: serde_json::Value = serde_json::from_str(&reply.extra).unwrap();
    assert_eq!(info["username"], "alice");
    assert_eq!(info["isOnline"], true);

    alice.admin(FrameKind::UserInfo, "root").await;
    let reply = alice.recv_kind(FrameKind::UserInfo).await;
    let info: serde_json::Value = serde_json::from_str(&reply.extra).unwrap();
    assert_eq!(info["username"], "root");
    assert_eq!(info["role"], 1);

    alice.admin(FrameKind::UserInfo, "ghost").await;
    let reply = alice.recv().await;
    assert_eq!(reply.kind, FrameKind::Error);
    assert!(reply.content.contains("User not found"));
}

#[tokio::test]
async fn status_snapshot_reports_sessions_and_roles() {
    let server = spawn_server().await;
    let (_root, _alice) = root_and_alice(&server).await;
    let _anon = TestClient::connect(server.addr).await;
    // Let the accept loop install the anonymous session.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let clients = server.handle.connected_clients().await.unwrap();
    assert_eq!(clients.len(), 3);

    let root_info = clients
        .iter()
        .find(|c| c.username == "root")
        .expect("root should be listed");
    assert!(root_info.authenticated);
    assert_eq!(root_info.role, 1);

    let anon_info = clients
        .iter()
        .find(|c| c.username.is_empty())
        .expect("anonymous session should be listed");
    assert!(!anon_info.authenticated);
    assert_eq!(anon_info.role, 0);
}

#[tokio::test]
async fn operator_online_list_push_reaches_authenticated_sessions() {
    let server = spawn_server().await;
    let (mut root, mut alice) = root_and_alice(&server).await;

    server.handle.broadcast_online_list().await.unwrap();

    for client in [&mut root, &mut alice] {
        let list = client.recv_kind(FrameKind::OnlineList).await;
        let users: Vec<String> = serde_json::from_str(&list.extra).unwrap();
        assert_eq!(users, vec!["alice", "root"]);
    }
}

#[tokio::test]
async fn operator_messages_route_through_normal_fan_out() {
    let server = spawn_server().await;
    let (mut root, mut alice) = root_and_alice(&server).await;

    server.handle.broadcast_server_message("maintenance soon").await;

    let at_root = root.recv_kind(FrameKind::MsgGlobal).await;
    assert_eq!(at_root.sender, SERVER_SENDER);
    assert_eq!(at_root.content, "maintenance soon");
    let at_alice = alice.recv_kind(FrameKind::MsgGlobal).await;
    assert_eq!(at_alice.sender, SERVER_SENDER);

    assert!(
        server
            .handle
            .send_server_message_to_user("alice", "hello you")
            .await
    );
    let whisper = alice.recv_kind(FrameKind::MsgPrivate).await;
    assert_eq!(whisper.sender, SERVER_SENDER);
    assert_eq!(whisper.receiver, "alice");
    assert_eq!(whisper.content, "hello you");

    assert!(
        !server
            .handle
            .send_server_message_to_user("ghost", "nobody home")
            .await
    );

    // Operator traffic is transient; the audit log only records user chat.
    assert_eq!(server.handle.store().message_count().unwrap(), 0);
}
