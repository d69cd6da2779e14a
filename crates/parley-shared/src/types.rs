use serde::{Deserialize, Serialize};

/// Frame type codes. The integer values are part of the wire contract and
/// must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    Register = 1,
    Login = 2,
    Logout = 3,
    ChangePassword = 4,
    MsgGlobal = 10,
    MsgPrivate = 11,
    OnlineList = 20,
    UserStatus = 21,
    UserInfo = 22,
    KickUser = 30,
    BanUser = 31,
    UnbanUser = 32,
    MuteUser = 33,
    UnmuteUser = 34,
    PromoteUser = 35,
    DemoteUser = 36,
    GetAllUsers = 37,
    GetBannedList = 38,
    GetMutedList = 39,
    Kicked = 40,
    Banned = 41,
    Muted = 42,
    Unmuted = 43,
    Ok = 100,
    Error = 101,
    Ping = 200,
    Pong = 201,
}

impl FrameKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Register),
            2 => Some(Self::Login),
            3 => Some(Self::Logout),
            4 => Some(Self::ChangePassword),
            10 => Some(Self::MsgGlobal),
            11 => Some(Self::MsgPrivate),
            20 => Some(Self::OnlineList),
            21 => Some(Self::UserStatus),
            22 => Some(Self::UserInfo),
            30 => Some(Self::KickUser),
            31 => Some(Self::BanUser),
            32 => Some(Self::UnbanUser),
            33 => Some(Self::MuteUser),
            34 => Some(Self::UnmuteUser),
            35 => Some(Self::PromoteUser),
            36 => Some(Self::DemoteUser),
            37 => Some(Self::GetAllUsers),
            38 => Some(Self::GetBannedList),
            39 => Some(Self::GetMutedList),
            40 => Some(Self::Kicked),
            41 => Some(Self::Banned),
            42 => Some(Self::Muted),
            43 => Some(Self::Unmuted),
            100 => Some(Self::Ok),
            101 => Some(Self::Error),
            200 => Some(Self::Ping),
            201 => Some(Self::Pong),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Register => "REGISTER",
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::ChangePassword => "CHANGE_PASSWORD",
            Self::MsgGlobal => "MSG_GLOBAL",
            Self::MsgPrivate => "MSG_PRIVATE",
            Self::OnlineList => "ONLINE_LIST",
            Self::UserStatus => "USER_STATUS",
            Self::UserInfo => "USER_INFO",
            Self::KickUser => "KICK_USER",
            Self::BanUser => "BAN_USER",
            Self::UnbanUser => "UNBAN_USER",
            Self::MuteUser => "MUTE_USER",
            Self::UnmuteUser => "UNMUTE_USER",
            Self::PromoteUser => "PROMOTE_USER",
            Self::DemoteUser => "DEMOTE_USER",
            Self::GetAllUsers => "GET_ALL_USERS",
            Self::GetBannedList => "GET_BANNED_LIST",
            Self::GetMutedList => "GET_MUTED_LIST",
            Self::Kicked => "KICKED",
            Self::Banned => "BANNED",
            Self::Muted => "MUTED",
            Self::Unmuted => "UNMUTED",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Ping => "PING",
            Self::Pong => "PONG",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Online/offline marker carried in USER_STATUS frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Online,
    Offline,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// LOGIN / REGISTER credentials, carried as JSON in `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// CHANGE_PASSWORD payload, carried as JSON in `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

/// Structured payload in the `extra` field of a successful LOGIN reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAck {
    pub username: String,
    pub display_name: String,
    pub role: i64,
    pub is_muted: bool,
}

/// One user row as reported by GET_ALL_USERS and USER_INFO replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub display_name: String,
    pub role: i64,
    pub is_banned: bool,
    pub is_muted: bool,
    pub created_at: String,
    pub is_online: bool,
}
