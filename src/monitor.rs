// Unit monitoring loop: discovery, lifecycle events, periodic polling.
// All scope/state mutation happens on this single task; the select! arms
// are mutually exclusive in time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use crate::collector::collect_unit_stats;
use crate::emitter::TelegrafEmitter;
use crate::filter::UnitFilter;
use crate::models::UnitSnapshot;
use crate::systemd_repo::{UnitBus, UnitEvent};

pub struct Monitor<B: UnitBus> {
    bus: Arc<B>,
    filter: UnitFilter,
    emitter: TelegrafEmitter,
    poll_interval: Duration,
    /// Units currently in scope for monitoring.
    watched: HashSet<String>,
    /// Last successful snapshot per watched unit.
    units: HashMap<String, UnitSnapshot>,
}

impl<B: UnitBus> Monitor<B> {
    pub fn new(
        bus: Arc<B>,
        filter: UnitFilter,
        emitter: TelegrafEmitter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            bus,
            filter,
            emitter,
            poll_interval,
            watched: HashSet::new(),
            units: HashMap::new(),
        }
    }

    pub fn watched(&self) -> &HashSet<String> {
        &self.watched
    }

    pub fn stats_for(&self, name: &str) -> Option<&UnitSnapshot> {
        self.units.get(name)
    }

    /// Run until the shutdown channel fires. Subscribing to lifecycle
    /// signals is part of startup and therefore fatal on failure.
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) -> anyhow::Result<()> {
        let mut events = self
            .bus
            .subscribe_events()
            .await
            .context("subscribing to unit lifecycle signals")?;

        self.bootstrap().await;

        let mut tick = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut events_open = true;

        tracing::info!("Starting monitoring loop");
        loop {
            tokio::select! {
                maybe_event = events.recv(), if events_open => {
                    match maybe_event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            tracing::error!("lifecycle signal stream closed; polling only");
                            events_open = false;
                        }
                    }
                }
                _ = tick.tick() => {
                    self.poll_units().await;
                }
                _ = &mut shutdown_rx => {
                    tracing::info!("Shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Initial full discovery plus one synchronous collection pass over
    /// every in-scope unit.
    pub async fn bootstrap(&mut self) {
        match self.bus.list_unit_names().await {
            Ok(names) => {
                for name in names {
                    if self.filter.should_monitor(&name) {
                        self.watched.insert(name);
                    }
                }
                tracing::info!("Found {} units to monitor", self.watched.len());
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to get unit list");
            }
        }

        tracing::info!("Collecting initial unit statistics");
        self.poll_units().await;
    }

    pub async fn handle_event(&mut self, event: UnitEvent) {
        match event {
            UnitEvent::New(name) => {
                if self.filter.should_monitor(&name) {
                    tracing::info!("New unit detected: {}", name);
                    self.watched.insert(name.clone());
                    self.collect_and_publish(&name).await;
                }
            }
            UnitEvent::Removed(name) => {
                if self.watched.remove(&name) {
                    tracing::info!("Unit removed: {}", name);
                    self.units.remove(&name);
                }
            }
            UnitEvent::PropertiesChanged { interface } => {
                // Deferred to the next poll tick.
                tracing::debug!(interface = %interface, "properties changed");
            }
        }
    }

    /// Re-collect every watched unit. Per-unit failures skip that unit for
    /// this cycle.
    pub async fn poll_units(&mut self) {
        let names: Vec<String> = self.watched.iter().cloned().collect();
        for name in names {
            self.collect_and_publish(&name).await;
        }
    }

    async fn collect_and_publish(&mut self, name: &str) {
        let stats = match collect_unit_stats(self.bus.as_ref(), name).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!(unit = name, error = %e, "Failed to get stats");
                return;
            }
        };

        if let Some(old) = active_state_change(self.units.get(name), &stats) {
            tracing::info!(
                "Unit {} state changed: {} -> {}",
                name,
                old,
                stats.active_state
            );
        }
        self.units.insert(name.to_string(), stats.clone());
        self.emitter.emit(&stats).await;
    }
}

/// The transition an incoming snapshot represents relative to the stored
/// one: `Some(previous_active_state)` when the active state differs.
fn active_state_change(prev: Option<&UnitSnapshot>, next: &UnitSnapshot) -> Option<String> {
    prev.filter(|p| p.active_state != next.active_state)
        .map(|p| p.active_state.clone())
}
