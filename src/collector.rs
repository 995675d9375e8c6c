// Per-unit snapshot collection

use chrono::Utc;

use crate::models::UnitSnapshot;
use crate::systemd_repo::{BusError, UnitBus, UnitProps};

/// Collect a single snapshot for `name`.
///
/// Handle resolution and the active/sub/load trio are mandatory; a failure
/// there fails the whole collection. The remaining properties degrade
/// independently to `0` / `"unknown"`. One attempt, no retries — the poll
/// cadence is the retry.
pub async fn collect_unit_stats<B: UnitBus>(
    bus: &B,
    name: &str,
) -> Result<UnitSnapshot, BusError> {
    let unit = bus.unit(name).await?;
    let base = unit.base_state().await?;

    let (main_pid, restart_count) = if name.ends_with(".service") {
        match unit.service_props().await {
            Ok(props) => (props.main_pid, props.restart_count),
            Err(e) => {
                tracing::debug!(unit = name, error = %e, "service properties unavailable");
                (0, 0)
            }
        }
    } else {
        (0, 0)
    };

    let memory_current = match unit.memory_current().await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(unit = name, error = %e, "MemoryCurrent unavailable");
            0
        }
    };
    let cpu_usage_nsec = match unit.cpu_usage_nsec().await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(unit = name, error = %e, "CPUUsageNSec unavailable");
            0
        }
    };
    let unit_file_state = match unit.unit_file_state().await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(unit = name, error = %e, "UnitFileState unavailable");
            "unknown".to_string()
        }
    };

    Ok(UnitSnapshot {
        name: name.to_string(),
        active_state: base.active_state,
        sub_state: base.sub_state,
        load_state: base.load_state,
        unit_file_state,
        main_pid,
        restart_count,
        memory_current,
        cpu_usage_nsec,
        timestamp: Utc::now(),
    })
}
