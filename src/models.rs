// Domain models

use chrono::{DateTime, Utc};

/// One point-in-time observation of a unit's state and resource usage.
///
/// A snapshot is fully formed or not created at all: the base states are
/// mandatory, while `main_pid`, `restart_count`, `memory_current`,
/// `cpu_usage_nsec` and `unit_file_state` default to `0` / `"unknown"` when
/// the manager cannot supply them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSnapshot {
    pub name: String,
    pub active_state: String,
    pub sub_state: String,
    pub load_state: String,
    pub unit_file_state: String,
    /// 0 for units without a main process (mounts, timers, stopped services).
    pub main_pid: u32,
    pub restart_count: u32,
    /// Bytes; 0 when memory accounting is unavailable.
    pub memory_current: u64,
    /// Accumulated CPU time in nanoseconds; 0 when unavailable.
    pub cpu_usage_nsec: u64,
    pub timestamp: DateTime<Utc>,
}

/// Identity of the invoking user, captured once at startup and tagged onto
/// every emitted metric line.
#[derive(Debug, Clone)]
pub struct ProcessIdentity {
    pub username: String,
    pub uid: u32,
}

impl ProcessIdentity {
    pub fn capture() -> Self {
        let uid = nix::unistd::getuid();
        let username = nix::unistd::User::from_uid(uid)
            .ok()
            .flatten()
            .map(|u| u.name)
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            username,
            uid: uid.as_raw(),
        }
    }
}
