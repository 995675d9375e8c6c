// Telegraf line-protocol emission over a Unix domain socket

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use crate::models::{ProcessIdentity, UnitSnapshot};

/// Publishes unit snapshots to a Telegraf socket listener.
///
/// Delivery is fire-and-forget: one fresh connection per line, failures are
/// logged and the metric is dropped. A slow or absent collector never stalls
/// the monitoring loop.
pub struct TelegrafEmitter {
    socket_path: PathBuf,
    measurement: String,
    identity: ProcessIdentity,
}

impl TelegrafEmitter {
    pub fn new(socket_path: impl Into<PathBuf>, measurement: String, identity: ProcessIdentity) -> Self {
        Self {
            socket_path: socket_path.into(),
            measurement,
            identity,
        }
    }

    /// Render one InfluxDB line-protocol record: measurement, tags in fixed
    /// order, integer fields in fixed order, nanosecond epoch timestamp.
    ///
    /// Tag values are wrapped in double quotes and not otherwise escaped; a
    /// unit name containing `"` or `,` yields a malformed line. Known
    /// limitation, kept for wire compatibility with existing consumers.
    pub fn format_line(&self, stats: &UnitSnapshot) -> String {
        let timestamp_ns = stats.timestamp.timestamp_nanos_opt().unwrap_or_default();
        format!(
            "{measurement},unit=\"{unit}\",active_state=\"{active}\",sub_state=\"{sub}\",\
             load_state=\"{load}\",unit_file_state=\"{file}\",username=\"{user}\",uid=\"{uid}\" \
             main_pid={pid}i,restart_count={restarts}i,memory_current={mem}i,\
             cpu_usage_nsec={cpu}i {ts}\n",
            measurement = self.measurement,
            unit = stats.name,
            active = stats.active_state,
            sub = stats.sub_state,
            load = stats.load_state,
            file = stats.unit_file_state,
            user = self.identity.username,
            uid = self.identity.uid,
            pid = stats.main_pid,
            restarts = stats.restart_count,
            mem = stats.memory_current,
            cpu = stats.cpu_usage_nsec,
            ts = timestamp_ns,
        )
    }

    /// Send one snapshot. Never fails; connect/write errors are logged as a
    /// warning and the line is dropped. The socket is closed on every path.
    pub async fn emit(&self, stats: &UnitSnapshot) {
        let line = self.format_line(stats);
        match UnixStream::connect(&self.socket_path).await {
            Ok(mut stream) => match stream.write_all(line.as_bytes()).await {
                Ok(()) => {
                    tracing::debug!(unit = %stats.name, "Sent stats");
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        socket = %self.socket_path.display(),
                        "Failed to send to Telegraf socket"
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    socket = %self.socket_path.display(),
                    "Failed to send to Telegraf socket"
                );
            }
        }
    }
}
