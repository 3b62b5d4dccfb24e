//! The background scheduler: a single loop with a fixed tick that triggers
//! due indexer runs. It never blocks on a run; a tick that finds an indexer
//! already in progress skips it.

use std::sync::Arc;
use std::time::Duration;

use searchdock_types::indexer::{parse_iso8601_duration, IndexerDefinition};
use searchdock_types::ResourceKind;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::Error;
use crate::runtime::IndexerRuntime;

pub const DEFAULT_TICK: Duration = Duration::from_secs(10);

pub struct Scheduler {
    shutdown: tokio::sync::watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl Scheduler {
    pub fn start(runtime: Arc<IndexerRuntime>, tick: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => tick_once(&runtime),
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("scheduler loop stopped");
        });
        Self { shutdown, handle }
    }

    /// Signal the loop and wait a bounded period for it to wind down.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(Duration::from_secs(10), self.handle).await.is_err() {
            warn!("scheduler did not stop within the shutdown budget");
        }
    }
}

fn tick_once(runtime: &Arc<IndexerRuntime>) {
    let entries = match runtime.store().list(ResourceKind::Indexer.as_str()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("scheduler could not list indexers: {e}");
            return;
        }
    };

    let now = OffsetDateTime::now_utc();
    for entry in entries {
        let indexer: IndexerDefinition = match serde_json::from_slice(&entry.data) {
            Ok(indexer) => indexer,
            Err(e) => {
                warn!(indexer = %entry.name, "skipping undecodable indexer definition: {e}");
                continue;
            }
        };
        if indexer.disabled {
            continue;
        }
        let Some(schedule) = &indexer.schedule else { continue };
        let interval = match parse_iso8601_duration(&schedule.interval) {
            Ok(interval) => interval,
            Err(e) => {
                warn!(indexer = %indexer.name, "invalid schedule: {e}");
                continue;
            }
        };
        if runtime.is_running(&indexer.name) {
            continue;
        }

        let last_end = runtime
            .last_end_time(&indexer.name)
            .unwrap_or(None);
        let mut next_run = match last_end {
            Some(end) => end + interval,
            None => schedule.start_time.unwrap_or(OffsetDateTime::UNIX_EPOCH),
        };
        if let Some(start) = schedule.start_time {
            next_run = next_run.max(start);
        }
        if now < next_run {
            continue;
        }

        debug!(indexer = %indexer.name, "scheduler triggering run");
        match runtime.trigger(&indexer.name) {
            Ok(()) => {}
            // a run slipped in between the check and the trigger
            Err(Error::AlreadyRunning(_)) => {}
            Err(e) => warn!(indexer = %indexer.name, "scheduled trigger failed: {e}"),
        }
    }
}
