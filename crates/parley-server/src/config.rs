use std::path::PathBuf;

use parley_shared::constants::{DEFAULT_MAX_CLIENTS, DEFAULT_PORT};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub max_clients: usize,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            db_path: PathBuf::from("chat_server.db"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("PARLEY_PORT") {
            match port_from_arg(&port) {
                Some(parsed) => config.port = parsed,
                None => tracing::warn!(value = %port, "Invalid PARLEY_PORT, using default"),
            }
        }

        if let Ok(max) = std::env::var("PARLEY_MAX_CLIENTS") {
            if let Ok(n) = max.parse::<usize>() {
                config.max_clients = n;
            } else {
                tracing::warn!(value = %max, "Invalid PARLEY_MAX_CLIENTS, using default");
            }
        }

        if let Ok(path) = std::env::var("PARLEY_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        config
    }
}

/// Parse the positional port argument. Zero and out-of-range values are
/// rejected so the caller can fall back to the default.
pub fn port_from_arg(arg: &str) -> Option<u16> {
    arg.trim().parse::<u16>().ok().filter(|port| *port != 0)
}
