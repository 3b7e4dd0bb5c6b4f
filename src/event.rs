use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::action::Action;

#[derive(Clone, Debug)]
pub enum Event {
    Tick,
    Action(Action),
    /// The privilege dialog returned; `Err` carries the reason it failed.
    SetupFinished(Result<(), String>),
    /// A permission check finished on the blocking pool.
    PermissionChecked(bool),
    /// The old sampler is gone and permission was re-checked.
    SamplerStopped { granted: bool },
    /// Post-grant delay elapsed; relaunch the sampler.
    RestartSampler,
}

/// Single event queue for the poll loop: ticks, consumer actions and
/// completions of work that ran off the loop.
pub struct EventHandler {
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    task: tokio::task::JoinHandle<()>,
}

impl EventHandler {
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Event>();

        let tick_tx = tx.clone();
        let task = tokio::spawn(async move {
            let mut tick_interval = tokio::time::interval(tick_rate);
            // A slow tick must not be followed by a burst of catch-up ticks.
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tick_interval.tick().await;
                if tick_tx.send(Event::Tick).is_err() {
                    break;
                }
            }
        });

        Self { tx, rx, task }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
        self.tx.clone()
    }

    pub fn handle(&self) -> CollectorHandle {
        CollectorHandle { tx: self.sender() }
    }

    /// Deliver `event` after `delay` without blocking the loop.
    pub fn schedule(&self, delay: Duration, event: Event) {
        let tx = self.sender();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        });
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Drop for EventHandler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Cloneable entry point for consumers of a running collector.
#[derive(Clone)]
pub struct CollectorHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl CollectorHandle {
    pub fn request_setup(&self) -> bool {
        self.send(Action::RequestSetup)
    }

    pub fn check_permission(&self) -> bool {
        self.send(Action::CheckPermission)
    }

    pub fn stop(&self) -> bool {
        self.send(Action::Stop)
    }

    /// False once the loop has exited.
    fn send(&self, action: Action) -> bool {
        self.tx.send(Event::Action(action)).is_ok()
    }
}
