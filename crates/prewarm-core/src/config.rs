//! Launcher settings, read from environment overrides.

use std::ffi::OsString;
use std::path::PathBuf;

pub const SOCKET_VAR: &str = "PREWARM_SOCKET";
pub const INTERPRETER_VAR: &str = "PREWARM_PYTHON";
pub const DEBUG_VAR: &str = "PREWARM_DEBUG";
pub const ENV_ALLOW_VAR: &str = "PREWARM_ENV_ALLOW";

pub const DEFAULT_INTERPRETER: &str = "/usr/bin/python3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Explicit socket path; when unset the path is derived per user.
    pub socket_override: Option<PathBuf>,
    pub interpreter: PathBuf,
    /// Verbose tracing, and the bootstrap helper's output goes to our stderr.
    pub debug: bool,
    /// When set, only these variables are sent, newline-joined.
    pub env_allow: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_override: None,
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            debug: false,
            env_allow: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Config {
            socket_override: non_empty(SOCKET_VAR).map(PathBuf::from),
            interpreter: non_empty(INTERPRETER_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INTERPRETER)),
            // presence alone switches it on, like `PREWARM_DEBUG=`
            debug: lookup(DEBUG_VAR).is_some(),
            env_allow: lookup(ENV_ALLOW_VAR).map(|v| parse_allow_list(&v.to_string_lossy())),
        }
    }
}

fn parse_allow_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
