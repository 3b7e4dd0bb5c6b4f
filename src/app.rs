use std::time::Duration;

use crate::action::Action;
use crate::config::Config;
use crate::error::CollectorError;
use crate::event::{Event, EventHandler};
use crate::system::collector::Collector;

/// Relaunch attempts while a stray sampler refuses to die.
const MAX_RESTART_ATTEMPTS: u32 = 5;

/// Drives the collector from the event queue. The loop task is the only
/// code that touches the collector once [`App::run`] starts. Anything that
/// blocks on a subprocess runs on the blocking pool and reports back as an
/// event.
pub struct App {
    pub running: bool,
    pub collector: Collector,
    setup_in_flight: bool,
    restart_attempts: u32,
    grant_settle: Duration,
    restart_delay: Duration,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self::with_collector(config, Collector::new(config))
    }

    pub fn with_collector(config: &Config, collector: Collector) -> Self {
        App {
            running: false,
            collector,
            setup_in_flight: false,
            restart_attempts: 0,
            grant_settle: Duration::from_millis(config.permission.grant_settle_ms),
            restart_delay: Duration::from_millis(config.permission.restart_delay_ms),
        }
    }

    pub fn setup_in_flight(&self) -> bool {
        self.setup_in_flight
    }

    /// Start the collector and process events until a stop is requested.
    pub async fn run(&mut self, mut events: EventHandler) {
        self.collector.start();
        self.running = true;

        while self.running {
            let Some(event) = events.next().await else {
                break;
            };
            self.handle_event(event, &events);
        }

        self.collector.stop();
        self.running = false;
    }

    pub fn handle_event(&mut self, event: Event, events: &EventHandler) {
        match event {
            Event::Tick => self.collector.tick(),
            Event::Action(action) => self.dispatch(action, events),
            Event::SetupFinished(Ok(())) => {
                self.setup_in_flight = false;
                self.restart_attempts = 0;
                self.stop_sampler_off_loop(events);
            }
            Event::SetupFinished(Err(reason)) => {
                self.setup_in_flight = false;
                tracing::warn!("permission setup did not complete: {reason}");
            }
            Event::PermissionChecked(granted) => self.collector.publish_permission(granted),
            Event::SamplerStopped { granted } => {
                self.collector.publish_permission(granted);
                events.schedule(self.restart_delay, Event::RestartSampler);
            }
            Event::RestartSampler => self.restart_sampler(events),
        }
    }

    pub fn dispatch(&mut self, action: Action, events: &EventHandler) {
        match action {
            Action::Stop => self.running = false,
            Action::CheckPermission => {
                let gate = self.collector.permission_gate();
                let tx = events.sender();
                tokio::task::spawn_blocking(move || {
                    let _ = tx.send(Event::PermissionChecked(gate.check()));
                });
            }
            Action::RequestSetup => self.begin_setup(events),
        }
    }

    /// Run the privilege dialog on the blocking pool; its outcome comes back
    /// as [`Event::SetupFinished`].
    fn begin_setup(&mut self, events: &EventHandler) {
        if self.setup_in_flight {
            tracing::debug!("setup already in progress");
            return;
        }
        self.setup_in_flight = true;

        let gate = self.collector.permission_gate();
        let settle = self.grant_settle;
        let tx = events.sender();
        tokio::task::spawn_blocking(move || {
            let outcome = gate.request_setup().map_err(|e| e.to_string());
            if outcome.is_ok() {
                // Give sudo a moment to pick up the new policy file.
                std::thread::sleep(settle);
            }
            let _ = tx.send(Event::SetupFinished(outcome));
        });
    }

    /// Terminate the old sampler, sweep strays and re-check permission on
    /// the blocking pool. [`Event::SamplerStopped`] only arrives once the
    /// old writer is gone, and only then is the relaunch scheduled.
    fn stop_sampler_off_loop(&mut self, events: &EventHandler) {
        let pending = self.collector.take_sampler_stop();
        let gate = self.collector.permission_gate();
        let tx = events.sender();
        tokio::task::spawn_blocking(move || {
            pending.finish();
            let granted = gate.check();
            let _ = tx.send(Event::SamplerStopped { granted });
        });
    }

    fn restart_sampler(&mut self, events: &EventHandler) {
        if !self.running {
            return;
        }
        match self.collector.launch_sampler() {
            Err(CollectorError::StraySampler { .. })
                if self.restart_attempts < MAX_RESTART_ATTEMPTS =>
            {
                self.restart_attempts += 1;
                self.stop_sampler_off_loop(events);
            }
            _ => self.restart_attempts = 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::system::collector::LoopState;
    use crate::system::platform::HostCounters;
    use crate::system::sampler::{LaunchSpec, SamplerSupervisor};

    struct NullHost;

    impl HostCounters for NullHost {
        fn cpu_brand(&mut self) -> Option<String> {
            None
        }
        fn cpu_base_freq_mhz(&mut self) -> Option<f64> {
            None
        }
        fn physical_memory(&mut self) -> Option<u64> {
            None
        }
        fn used_memory(&mut self) -> Option<u64> {
            None
        }
    }

    fn test_app(name: &str) -> App {
        let mut config = Config::default();
        config.sampler.output_file =
            std::env::temp_dir().join(format!("asistat_app_{name}_{}.plist", std::process::id()));
        config.sampler.sudo = PathBuf::from("/nonexistent/sudo");
        let sampler = SamplerSupervisor::with_spec(
            LaunchSpec {
                program: PathBuf::from("/nonexistent/powermetrics"),
                args: Vec::new(),
            },
            Duration::from_millis(100),
        );
        let collector = Collector::from_parts(&config, Box::new(NullHost), sampler);
        App::with_collector(&config, collector)
    }

    #[tokio::test(start_paused = true)]
    async fn stop_action_ends_the_loop() {
        let mut app = test_app("stop");
        let events = EventHandler::new(Duration::from_secs(1));
        let handle = events.handle();
        let mut snapshots = app.collector.subscribe();

        let stopper = tokio::spawn(async move {
            // Wait for two published ticks before stopping.
            snapshots.changed().await.unwrap();
            snapshots.changed().await.unwrap();
            handle.stop();
        });

        app.run(events).await;
        stopper.await.unwrap();
        assert!(!app.running);
        assert_eq!(app.collector.state(), LoopState::Idle);
        // Host counters failed: RAM falls back to the half-used placeholder.
        assert_eq!(app.collector.snapshot().ram.free_percent, 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_setup_keeps_permission_false() {
        let mut app = test_app("setup_failed");
        let events = EventHandler::new(Duration::from_secs(1));
        app.collector.start();
        app.running = true;
        app.setup_in_flight = true;

        app.handle_event(Event::SetupFinished(Err("User canceled.".to_string())), &events);
        assert!(!app.setup_in_flight());
        assert!(!app.collector.has_permission());
        app.collector.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn successful_setup_stops_off_loop_then_schedules_a_restart() {
        let mut app = test_app("setup_ok");
        let mut events = EventHandler::new(Duration::from_secs(3600));
        assert!(matches!(events.next().await, Some(Event::Tick)));
        app.collector.start();
        app.running = true;

        app.handle_event(Event::SetupFinished(Ok(())), &events);
        let stopped = events.next().await.unwrap();
        assert!(matches!(stopped, Event::SamplerStopped { granted: false }));

        app.handle_event(stopped, &events);
        let before = tokio::time::Instant::now();
        assert!(matches!(events.next().await, Some(Event::RestartSampler)));
        assert!(before.elapsed() >= Duration::from_millis(1000));
        app.collector.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn permission_check_runs_off_loop_and_publishes() {
        let mut app = test_app("check");
        let mut events = EventHandler::new(Duration::from_secs(3600));
        assert!(matches!(events.next().await, Some(Event::Tick)));
        let permission = app.collector.permission();
        app.collector.publish_permission(true);

        app.dispatch(Action::CheckPermission, &events);
        let checked = events.next().await.unwrap();
        assert!(matches!(checked, Event::PermissionChecked(false)));
        app.handle_event(checked, &events);
        assert!(!*permission.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_is_skipped() {
        let mut app = test_app("restart_stopped");
        let events = EventHandler::new(Duration::from_secs(3600));
        app.running = false;
        app.handle_event(Event::RestartSampler, &events);
        assert_eq!(app.restart_attempts, 0);
    }
}
