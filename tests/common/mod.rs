// Shared test helpers: in-memory bus double and a Telegraf socket sink.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::mpsc;

use unitmon::models::{ProcessIdentity, UnitSnapshot};
use unitmon::systemd_repo::{BaseState, BusError, ServiceProps, UnitBus, UnitEvent, UnitProps};

/// Scripted unit the fake bus hands out; `fail_*` toggles make individual
/// property groups error.
#[derive(Debug, Clone)]
pub struct FakeUnit {
    pub active_state: String,
    pub sub_state: String,
    pub load_state: String,
    pub unit_file_state: String,
    pub main_pid: u32,
    pub restart_count: u32,
    pub memory_current: u64,
    pub cpu_usage_nsec: u64,
    pub fail_base: bool,
    pub fail_service: bool,
    pub fail_memory: bool,
    pub fail_cpu: bool,
    pub fail_unit_file_state: bool,
}

impl Default for FakeUnit {
    fn default() -> Self {
        Self {
            active_state: "active".to_string(),
            sub_state: "running".to_string(),
            load_state: "loaded".to_string(),
            unit_file_state: "enabled".to_string(),
            main_pid: 0,
            restart_count: 0,
            memory_current: 0,
            cpu_usage_nsec: 0,
            fail_base: false,
            fail_service: false,
            fail_memory: false,
            fail_cpu: false,
            fail_unit_file_state: false,
        }
    }
}

/// In-memory `UnitBus` for driving the monitor without a session bus.
#[derive(Default)]
pub struct FakeBus {
    units: Mutex<HashMap<String, FakeUnit>>,
    events_tx: Mutex<Option<mpsc::Sender<UnitEvent>>>,
}

impl FakeBus {
    pub fn insert(&self, name: &str, unit: FakeUnit) {
        self.units.lock().unwrap().insert(name.to_string(), unit);
    }

    pub fn remove(&self, name: &str) {
        self.units.lock().unwrap().remove(name);
    }

    /// Push a lifecycle event into the channel handed out by
    /// `subscribe_events`. Panics if nobody subscribed yet.
    pub async fn send_event(&self, event: UnitEvent) {
        let tx = self
            .events_tx
            .lock()
            .unwrap()
            .clone()
            .expect("subscribe_events not called");
        tx.send(event).await.expect("event channel closed");
    }
}

#[async_trait]
impl UnitBus for FakeBus {
    type Unit = FakeUnit;

    async fn list_unit_names(&self) -> Result<Vec<String>, BusError> {
        Ok(self.units.lock().unwrap().keys().cloned().collect())
    }

    async fn subscribe_events(&self) -> Result<mpsc::Receiver<UnitEvent>, BusError> {
        let (tx, rx) = mpsc::channel(16);
        *self.events_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn unit(&self, name: &str) -> Result<FakeUnit, BusError> {
        self.units
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::UnitLookup(format!("{name}: no such unit")))
    }
}

#[async_trait]
impl UnitProps for FakeUnit {
    async fn base_state(&self) -> Result<BaseState, BusError> {
        if self.fail_base {
            return Err(BusError::Property("ActiveState: fetch failed".to_string()));
        }
        Ok(BaseState {
            active_state: self.active_state.clone(),
            sub_state: self.sub_state.clone(),
            load_state: self.load_state.clone(),
        })
    }

    async fn service_props(&self) -> Result<ServiceProps, BusError> {
        if self.fail_service {
            return Err(BusError::Property("MainPID: fetch failed".to_string()));
        }
        Ok(ServiceProps {
            main_pid: self.main_pid,
            restart_count: self.restart_count,
        })
    }

    async fn memory_current(&self) -> Result<u64, BusError> {
        if self.fail_memory {
            return Err(BusError::Property("MemoryCurrent: fetch failed".to_string()));
        }
        Ok(self.memory_current)
    }

    async fn cpu_usage_nsec(&self) -> Result<u64, BusError> {
        if self.fail_cpu {
            return Err(BusError::Property("CPUUsageNSec: fetch failed".to_string()));
        }
        Ok(self.cpu_usage_nsec)
    }

    async fn unit_file_state(&self) -> Result<String, BusError> {
        if self.fail_unit_file_state {
            return Err(BusError::Property("UnitFileState: fetch failed".to_string()));
        }
        Ok(self.unit_file_state.clone())
    }
}

pub fn test_identity() -> ProcessIdentity {
    ProcessIdentity {
        username: "testuser".to_string(),
        uid: 1000,
    }
}

/// The canonical sample observation used across emitter tests.
pub fn sample_snapshot() -> UnitSnapshot {
    UnitSnapshot {
        name: "nginx.service".to_string(),
        active_state: "active".to_string(),
        sub_state: "running".to_string(),
        load_state: "loaded".to_string(),
        unit_file_state: "enabled".to_string(),
        main_pid: 1234,
        restart_count: 0,
        memory_current: 52428800,
        cpu_usage_nsec: 1234567890,
        timestamp: Utc.timestamp_opt(1639123456, 789_000_000).unwrap(),
    }
}

/// Unix-socket listener that collects every line written to it.
pub struct LineSink {
    _dir: tempfile::TempDir,
    pub path: PathBuf,
    rx: mpsc::UnboundedReceiver<String>,
}

impl LineSink {
    pub async fn bind() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("telegraf.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stream).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        Self {
            _dir: dir,
            path,
            rx,
        }
    }

    /// Wait up to two seconds for the next received line.
    pub async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drain everything received so far without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }
}
