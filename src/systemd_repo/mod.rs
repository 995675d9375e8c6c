// systemd manager access behind a capability trait, so the monitor can be
// driven by an in-memory bus in tests.

pub mod dbus;

pub use dbus::SystemdRepo;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Capacity of the lifecycle event channel fed by the bus implementation.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Establishing or using the bus connection failed.
    #[error("bus connection error: {0}")]
    Connection(String),

    /// The manager could not resolve the unit (unknown name, bus error).
    #[error("unit lookup failed: {0}")]
    UnitLookup(String),

    /// A property fetch failed.
    #[error("property fetch failed: {0}")]
    Property(String),

    /// Subscribing to lifecycle signals failed.
    #[error("subscription failed: {0}")]
    Subscribe(String),
}

/// Asynchronous unit lifecycle notification from the service manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEvent {
    /// A unit was loaded into the manager's view.
    New(String),
    /// A unit was dropped from the manager's view.
    Removed(String),
    /// Some unit's properties changed. Carries the D-Bus interface the
    /// change was reported for; state refresh is deferred to the poll tick.
    PropertiesChanged { interface: String },
}

/// The mandatory state trio every unit exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseState {
    pub active_state: String,
    pub sub_state: String,
    pub load_state: String,
}

/// Service-specific counters, only meaningful for `.service` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceProps {
    pub main_pid: u32,
    pub restart_count: u32,
}

/// Connection to the service manager.
///
/// One method per operation the monitor needs; transport details stay in the
/// implementation.
#[async_trait]
pub trait UnitBus: Send + Sync + 'static {
    type Unit: UnitProps + Send + Sync;

    /// Names of all units currently loaded by the manager.
    async fn list_unit_names(&self) -> Result<Vec<String>, BusError>;

    /// Subscribe to lifecycle notifications. The implementation keeps the
    /// returned channel fed until the connection drops.
    async fn subscribe_events(&self) -> Result<mpsc::Receiver<UnitEvent>, BusError>;

    /// Resolve a unit's bus handle for property queries.
    async fn unit(&self, name: &str) -> Result<Self::Unit, BusError>;
}

/// Property access on a resolved unit, grouped so each group fails
/// independently.
#[async_trait]
pub trait UnitProps: Send + Sync {
    /// Mandatory: active/sub/load states. Failure aborts the snapshot.
    async fn base_state(&self) -> Result<BaseState, BusError>;

    /// MainPID and NRestarts; callers degrade to zeros on failure.
    async fn service_props(&self) -> Result<ServiceProps, BusError>;

    async fn memory_current(&self) -> Result<u64, BusError>;

    async fn cpu_usage_nsec(&self) -> Result<u64, BusError>;

    async fn unit_file_state(&self) -> Result<String, BusError>;
}
