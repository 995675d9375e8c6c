// systemd user manager over the session bus via zbus

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, MatchRule, MessageStream, Proxy};

use super::{BaseState, BusError, EVENT_CHANNEL_CAPACITY, ServiceProps, UnitBus, UnitEvent, UnitProps};

const DESTINATION: &str = "org.freedesktop.systemd1";
const MANAGER_PATH: &str = "/org/freedesktop/systemd1";
const MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
const UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";
const SERVICE_INTERFACE: &str = "org.freedesktop.systemd1.Service";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Row shape of the Manager.ListUnits reply.
type UnitListItem = (
    String,          // name
    String,          // description
    String,          // load state
    String,          // active state
    String,          // sub state
    String,          // followed unit
    OwnedObjectPath, // object path
    u32,             // queued job id
    String,          // job type
    OwnedObjectPath, // job path
);

/// Session-bus connection to the systemd user manager.
pub struct SystemdRepo {
    conn: Connection,
    manager: Proxy<'static>,
}

impl SystemdRepo {
    pub async fn connect() -> Result<Self, BusError> {
        let conn = Connection::session()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        let manager = Proxy::new(&conn, DESTINATION, MANAGER_PATH, MANAGER_INTERFACE)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        tracing::info!("Connected to systemd user manager");
        Ok(Self { conn, manager })
    }
}

#[async_trait]
impl UnitBus for SystemdRepo {
    type Unit = SystemdUnit;

    async fn list_unit_names(&self) -> Result<Vec<String>, BusError> {
        let units: Vec<UnitListItem> = self
            .manager
            .call("ListUnits", &())
            .await
            .map_err(|e| BusError::UnitLookup(format!("ListUnits: {e}")))?;
        Ok(units.into_iter().map(|u| u.0).collect())
    }

    async fn subscribe_events(&self) -> Result<mpsc::Receiver<UnitEvent>, BusError> {
        // Without Subscribe the manager does not broadcast UnitNew/UnitRemoved.
        let () = self
            .manager
            .call("Subscribe", &())
            .await
            .map_err(|e| BusError::Subscribe(format!("Subscribe: {e}")))?;

        let unit_new = self
            .manager
            .receive_signal("UnitNew")
            .await
            .map_err(|e| BusError::Subscribe(format!("UnitNew: {e}")))?;
        let unit_removed = self
            .manager
            .receive_signal("UnitRemoved")
            .await
            .map_err(|e| BusError::Subscribe(format!("UnitRemoved: {e}")))?;

        // PropertiesChanged arrives from individual unit paths, not the
        // manager object, so it needs its own match rule.
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .interface(PROPERTIES_INTERFACE)
            .map_err(|e| BusError::Subscribe(e.to_string()))?
            .member("PropertiesChanged")
            .map_err(|e| BusError::Subscribe(e.to_string()))?
            .build();
        let mut props_changed = MessageStream::for_match_rule(rule, &self.conn, Some(64))
            .await
            .map_err(|e| BusError::Subscribe(format!("PropertiesChanged: {e}")))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        spawn_lifecycle_forwarder(unit_new, tx.clone(), UnitEvent::New);
        spawn_lifecycle_forwarder(unit_removed, tx.clone(), UnitEvent::Removed);

        tokio::spawn(async move {
            while let Some(msg) = props_changed.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!(error = %e, "properties-changed stream error");
                        break;
                    }
                };
                let Ok((interface, _changed, _invalidated)) = msg
                    .body()
                    .deserialize::<(String, HashMap<String, OwnedValue>, Vec<String>)>()
                else {
                    continue;
                };
                if tx.send(UnitEvent::PropertiesChanged { interface }).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn unit(&self, name: &str) -> Result<SystemdUnit, BusError> {
        let path: OwnedObjectPath = self
            .manager
            .call("GetUnit", &name)
            .await
            .map_err(|e| BusError::UnitLookup(format!("{name}: {e}")))?;
        let props = Proxy::new(&self.conn, DESTINATION, path, PROPERTIES_INTERFACE)
            .await
            .map_err(|e| BusError::UnitLookup(format!("{name}: {e}")))?;
        Ok(SystemdUnit { props })
    }
}

fn spawn_lifecycle_forwarder(
    mut stream: zbus::proxy::SignalStream<'static>,
    tx: mpsc::Sender<UnitEvent>,
    make: fn(String) -> UnitEvent,
) {
    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let (name, _path): (String, OwnedObjectPath) = match msg.body().deserialize() {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(error = %e, "undecodable lifecycle signal");
                    continue;
                }
            };
            if tx.send(make(name)).await.is_err() {
                break;
            }
        }
        tracing::debug!("lifecycle signal stream ended");
    });
}

/// A resolved unit object; property fetches go through Properties.Get so
/// every read observes the manager's current value.
pub struct SystemdUnit {
    props: Proxy<'static>,
}

impl SystemdUnit {
    async fn get(&self, interface: &str, property: &str) -> Result<OwnedValue, BusError> {
        self.props
            .call("Get", &(interface, property))
            .await
            .map_err(|e| BusError::Property(format!("{interface}.{property}: {e}")))
    }

    async fn get_string(&self, interface: &str, property: &str) -> Result<String, BusError> {
        let value = self.get(interface, property).await?;
        String::try_from(value)
            .map_err(|e| BusError::Property(format!("{interface}.{property}: {e}")))
    }

    async fn get_u32(&self, interface: &str, property: &str) -> Result<u32, BusError> {
        let value = self.get(interface, property).await?;
        u32::try_from(value)
            .map_err(|e| BusError::Property(format!("{interface}.{property}: {e}")))
    }

    async fn get_u64(&self, interface: &str, property: &str) -> Result<u64, BusError> {
        let value = self.get(interface, property).await?;
        u64::try_from(value)
            .map_err(|e| BusError::Property(format!("{interface}.{property}: {e}")))
    }
}

#[async_trait]
impl UnitProps for SystemdUnit {
    async fn base_state(&self) -> Result<BaseState, BusError> {
        Ok(BaseState {
            active_state: self.get_string(UNIT_INTERFACE, "ActiveState").await?,
            sub_state: self.get_string(UNIT_INTERFACE, "SubState").await?,
            load_state: self.get_string(UNIT_INTERFACE, "LoadState").await?,
        })
    }

    async fn service_props(&self) -> Result<ServiceProps, BusError> {
        Ok(ServiceProps {
            main_pid: self.get_u32(SERVICE_INTERFACE, "MainPID").await?,
            restart_count: self.get_u32(SERVICE_INTERFACE, "NRestarts").await?,
        })
    }

    async fn memory_current(&self) -> Result<u64, BusError> {
        self.get_u64(UNIT_INTERFACE, "MemoryCurrent").await
    }

    async fn cpu_usage_nsec(&self) -> Result<u64, BusError> {
        self.get_u64(UNIT_INTERFACE, "CPUUsageNSec").await
    }

    async fn unit_file_state(&self) -> Result<String, BusError> {
        self.get_string(UNIT_INTERFACE, "UnitFileState").await
    }
}
