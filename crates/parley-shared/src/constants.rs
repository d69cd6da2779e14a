/// Maximum frame payload size in bytes (1 MiB). Larger length prefixes are
/// treated as stream corruption: the receive buffer is cleared.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Default listening port
pub const DEFAULT_PORT: u16 = 9000;

/// Default cap on simultaneous connections; also used as the listen backlog
pub const DEFAULT_MAX_CLIENTS: usize = 100;

/// Size of the per-connection read buffer in bytes
pub const READ_BUFFER_SIZE: usize = 4096;

/// Chat frames allowed per rolling rate-limit window
pub const RATE_LIMIT_MAX_MESSAGES: u32 = 10;

/// Length of the rate-limit window in seconds
pub const RATE_LIMIT_WINDOW_SECS: u64 = 1;

/// Username length bounds, enforced on REGISTER
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;

/// Minimum password length, enforced on REGISTER and CHANGE_PASSWORD
pub const PASSWORD_MIN_LEN: usize = 4;

/// Sender name on operator-originated frames
pub const SERVER_SENDER: &str = "[SERVER]";

/// Role codes stored in the account table and carried on the wire
pub const ROLE_MEMBER: i64 = 0;
pub const ROLE_ADMIN: i64 = 1;

/// Key derivation context for the reference password hasher (BLAKE3)
pub const KDF_CONTEXT_PASSWORD: &str = "parley-password-hash-v1";
