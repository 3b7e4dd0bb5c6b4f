use std::sync::Arc;

use tokio::sync::watch;

use super::feed::FeedReader;
use super::permission::PermissionGate;
use super::platform::{self, HostCounters};
use super::sampler::{PendingStop, SamplerSupervisor};
use super::snapshot::SystemSnapshot;
use super::updater;
use crate::config::Config;
use crate::error::{CollectorError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Ticking,
}

/// Owns the snapshot and every piece of the collection pipeline.
///
/// All mutation happens through `&mut self` on the loop task; consumers
/// only ever see clones published through the watch channels.
pub struct Collector {
    snapshot: SystemSnapshot,
    host: Box<dyn HostCounters + Send>,
    feed: FeedReader,
    gate: Arc<PermissionGate>,
    sampler: SamplerSupervisor,
    snapshot_tx: watch::Sender<SystemSnapshot>,
    permission_tx: watch::Sender<bool>,
    state: LoopState,
}

impl Collector {
    pub fn new(config: &Config) -> Self {
        Self::from_parts(
            config,
            platform::host_counters(),
            SamplerSupervisor::new(&config.sampler),
        )
    }

    /// Build with an explicit host and supervisor.
    pub fn from_parts(
        config: &Config,
        host: Box<dyn HostCounters + Send>,
        sampler: SamplerSupervisor,
    ) -> Self {
        let snapshot = SystemSnapshot::default();
        let (snapshot_tx, _) = watch::channel(snapshot.clone());
        let (permission_tx, _) = watch::channel(false);
        Collector {
            snapshot,
            host,
            feed: FeedReader::new(&config.sampler.output_file),
            gate: Arc::new(PermissionGate::new(&config.sampler, &config.permission)),
            sampler,
            snapshot_tx,
            permission_tx,
            state: LoopState::Idle,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SystemSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn permission(&self) -> watch::Receiver<bool> {
        self.permission_tx.subscribe()
    }

    pub fn has_permission(&self) -> bool {
        *self.permission_tx.borrow()
    }

    pub fn snapshot(&self) -> &SystemSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn permission_gate(&self) -> Arc<PermissionGate> {
        Arc::clone(&self.gate)
    }

    /// Identify the CPU, check permission, reset the feed and launch the
    /// sampler. A sampler that fails to launch leaves host metrics running.
    pub fn start(&mut self) {
        if let Some(name) = self.host.cpu_brand() {
            self.snapshot.cpu_name = name;
        }
        self.check_permission();

        // Strays are swept before the feed is truncated.
        self.sampler.stop();
        if let Err(e) = self.feed.reset() {
            tracing::warn!("{e}");
        }
        let _ = self.launch_sampler();
        self.state = LoopState::Ticking;
    }

    pub fn stop(&mut self) {
        self.state = LoopState::Idle;
        self.sampler.stop();
    }

    /// One poll: host counters, then the newest complete sampler record.
    pub fn tick(&mut self) {
        if self.state != LoopState::Ticking {
            return;
        }
        let _span = tracing::debug_span!("collector.tick").entered();

        updater::apply_self_metrics(&mut self.snapshot, self.host.as_mut());

        if let Some(record) = self.feed.read_next_record()
            && let Err(e) = updater::apply_record(&mut self.snapshot, &record)
        {
            tracing::debug!("dropping sampler record: {e}");
        }

        self.snapshot_tx.send_replace(self.snapshot.clone());
    }

    /// Run the blocking `sudo -n` check in place and publish the result.
    pub fn check_permission(&mut self) -> bool {
        let granted = self.gate.check();
        self.publish_permission(granted);
        granted
    }

    /// Publish the outcome of a check that ran off the loop.
    pub fn publish_permission(&mut self, granted: bool) {
        if !granted {
            tracing::info!("{}; host metrics only until setup", CollectorError::PermissionDenied);
        }
        self.permission_tx.send_replace(granted);
    }

    /// First half of a restart. The old child is gone once the returned
    /// stop has finished.
    pub fn take_sampler_stop(&mut self) -> PendingStop {
        self.sampler.take_stop()
    }

    /// Launch failures are logged here and returned so a restart can retry.
    pub fn launch_sampler(&mut self) -> Result<()> {
        match self.sampler.launch() {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("{e}; continuing with host metrics only");
                Err(e)
            }
        }
    }
}
