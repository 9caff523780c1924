//! Adaptive polling loop
//!
//! The engine owns one background task that reads device state on a cadence
//! that tightens after commands. Shutdown is cooperative: [`PollingEngine::stop`]
//! signals the task through a watch channel and awaits its handle, so no
//! observer runs after `stop` returns.

use crate::observer::ObserverRegistry;
use crate::{PollObserver, PollingConfig, PollingError, StateSource};
use chrono::{DateTime, Utc};
use maxsmart_api::DeviceState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Polling state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollingMode {
    Stopped,
    Normal,
    Burst,
}

impl fmt::Display for PollingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollingMode::Stopped => write!(f, "stopped"),
            PollingMode::Normal => write!(f, "normal"),
            PollingMode::Burst => write!(f, "burst"),
        }
    }
}

/// One poll result, as handed to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Mode the loop was in when the poll was taken
    pub mode: PollingMode,
    /// 1-based count of successful polls since the engine was created
    pub sequence_number: u64,
    pub switch_states: Vec<u8>,
    /// Watts
    pub watt_values: Vec<f64>,
}

impl PollSnapshot {
    pub fn device_state(&self) -> DeviceState {
        DeviceState {
            switch_states: self.switch_states.clone(),
            watt_values: self.watt_values.clone(),
        }
    }
}

/// Mode plus remaining burst cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cadence {
    pub mode: PollingMode,
    pub burst_remaining: u32,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            mode: PollingMode::Stopped,
            burst_remaining: 0,
        }
    }
}

impl Cadence {
    /// Enter burst mode; only from `Normal`, an active burst is not extended
    pub fn trigger_burst(&mut self, cycles: u32) -> bool {
        if self.mode != PollingMode::Normal || cycles == 0 {
            return false;
        }
        self.mode = PollingMode::Burst;
        self.burst_remaining = cycles;
        true
    }

    /// Interval to wait after the cycle that just ran, consuming a burst cycle
    pub fn finish_cycle(&mut self, config: &PollingConfig) -> Duration {
        if self.mode != PollingMode::Burst {
            return config.normal_interval;
        }

        self.burst_remaining = self.burst_remaining.saturating_sub(1);
        if self.burst_remaining == 0 {
            self.mode = PollingMode::Normal;
        }
        config.burst_interval
    }
}

#[derive(Debug, Default)]
struct Counters {
    cadence: Cadence,
    poll_count: u64,
    error_count: u64,
    consecutive_errors: u32,
    last_poll: Option<DateTime<Utc>>,
    latest: Option<PollSnapshot>,
}

struct Shared {
    source: Arc<dyn StateSource>,
    config: PollingConfig,
    counters: Mutex<Counters>,
    observers: ObserverRegistry,
}

struct RunningTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Statistics for the polling engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingStats {
    pub running: bool,
    pub mode: PollingMode,
    pub poll_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u32,
    pub burst_cycles_remaining: u32,
    pub observer_count: usize,
    pub last_poll: Option<DateTime<Utc>>,
    pub normal_interval: Duration,
    pub burst_interval: Duration,
}

impl fmt::Display for PollingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Polling Stats:")?;
        writeln!(f, "  Mode: {}", self.mode)?;
        writeln!(f, "  Polls: {} ({} failed)", self.poll_count, self.error_count)?;
        writeln!(f, "  Burst cycles remaining: {}", self.burst_cycles_remaining)?;
        writeln!(f, "  Observers: {}", self.observer_count)?;
        match self.last_poll {
            Some(at) => write!(f, "  Last poll: {}", at.to_rfc3339()),
            None => write!(f, "  Last poll: never"),
        }
    }
}

/// Adaptive polling engine for one device
pub struct PollingEngine {
    shared: Arc<Shared>,
    task: Mutex<Option<RunningTask>>,
}

impl PollingEngine {
    pub fn new(source: Arc<dyn StateSource>, config: PollingConfig) -> Result<Self, PollingError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                source,
                config,
                counters: Mutex::new(Counters::default()),
                observers: ObserverRegistry::default(),
            }),
            task: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PollingConfig {
        &self.shared.config
    }

    /// Start the loop in `Normal` mode; no-op while running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                debug!("polling already running");
                return;
            }
        }

        {
            let mut counters = self.shared.counters.lock();
            counters.cadence = Cadence {
                mode: PollingMode::Normal,
                burst_remaining: 0,
            };
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            polling_loop(shared, shutdown_rx).await;
        });

        *task = Some(RunningTask { handle, shutdown });
        info!(
            normal_ms = self.shared.config.normal_interval.as_millis() as u64,
            burst_ms = self.shared.config.burst_interval.as_millis() as u64,
            "polling started"
        );
    }

    /// Stop the loop and wait for it to finish; no-op when stopped
    pub async fn stop(&self) -> Result<(), PollingError> {
        let running = self.task.lock().take();
        self.shared.counters.lock().cadence = Cadence::default();

        let Some(running) = running else {
            return Ok(());
        };

        let _ = running.shutdown.send(true);
        let result = running.handle.await;
        // A trigger may have raced the shutdown
        self.shared.counters.lock().cadence = Cadence::default();
        info!("polling stopped");

        result.map_err(|e| PollingError::TaskJoin(e.to_string()))
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn mode(&self) -> PollingMode {
        self.shared.counters.lock().cadence.mode
    }

    /// Switch to burst cadence after a command; only acts in `Normal` mode
    pub fn trigger_burst(&self) -> bool {
        if !self.shared.config.enable_burst {
            return false;
        }
        let triggered = self
            .shared
            .counters
            .lock()
            .cadence
            .trigger_burst(self.shared.config.burst_cycles);
        if triggered {
            debug!(cycles = self.shared.config.burst_cycles, "burst mode triggered");
        }
        triggered
    }

    /// Register an observer, replacing any observer with the same name
    pub fn register_observer(&self, name: impl Into<String>, observer: Arc<dyn PollObserver>) {
        let name = name.into();
        if self.shared.observers.register(name.clone(), observer) {
            debug!(observer = %name, "replaced poll observer");
        }
    }

    pub fn unregister_observer(&self, name: &str) -> bool {
        self.shared.observers.unregister(name)
    }

    pub fn observer_names(&self) -> Vec<String> {
        self.shared.observers.names()
    }

    /// Run one poll immediately, outside the cadence, and notify observers
    pub async fn force_poll(&self) -> Result<PollSnapshot, PollingError> {
        let snapshot = poll_once(&self.shared).await?;
        self.shared.observers.notify(&snapshot);
        Ok(snapshot)
    }

    /// The most recent successful snapshot
    pub fn latest_snapshot(&self) -> Option<PollSnapshot> {
        self.shared.counters.lock().latest.clone()
    }

    pub fn stats(&self) -> PollingStats {
        let running = self.is_running();
        let counters = self.shared.counters.lock();
        PollingStats {
            running,
            mode: counters.cadence.mode,
            poll_count: counters.poll_count,
            error_count: counters.error_count,
            consecutive_errors: counters.consecutive_errors,
            burst_cycles_remaining: counters.cadence.burst_remaining,
            observer_count: self.shared.observers.len(),
            last_poll: counters.last_poll,
            normal_interval: self.shared.config.normal_interval,
            burst_interval: self.shared.config.burst_interval,
        }
    }
}

impl Drop for PollingEngine {
    fn drop(&mut self) {
        if let Some(running) = self.task.get_mut().take() {
            let _ = running.shutdown.send(true);
            running.handle.abort();
        }
    }
}

/// Read state once and record the snapshot
async fn poll_once(shared: &Shared) -> Result<PollSnapshot, PollingError> {
    let mode = shared.counters.lock().cadence.mode;
    let result = shared.source.read_state().await;

    let mut counters = shared.counters.lock();
    match result {
        Ok(state) => {
            counters.poll_count += 1;
            counters.consecutive_errors = 0;
            let snapshot = PollSnapshot {
                timestamp: Utc::now(),
                mode,
                sequence_number: counters.poll_count,
                switch_states: state.switch_states,
                watt_values: state.watt_values,
            };
            counters.last_poll = Some(snapshot.timestamp);
            counters.latest = Some(snapshot.clone());
            Ok(snapshot)
        }
        Err(e) => {
            counters.error_count += 1;
            counters.consecutive_errors += 1;
            Err(PollingError::Source(e))
        }
    }
}

async fn polling_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    debug!("polling loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = shutdown.changed() => break,
            outcome = poll_once(&shared) => outcome,
        };

        match outcome {
            Ok(snapshot) => {
                debug!(
                    sequence = snapshot.sequence_number,
                    mode = %snapshot.mode,
                    "poll completed"
                );
                shared.observers.notify(&snapshot);
            }
            Err(e) => warn!(error = %e, "poll failed"),
        }

        let interval = shared.counters.lock().cadence.finish_cycle(&shared.config);
        let remaining = interval.saturating_sub(started.elapsed());

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(remaining) => {}
        }
    }

    debug!("polling loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_only_from_normal() {
        let mut cadence = Cadence::default();
        assert!(!cadence.trigger_burst(4));
        assert_eq!(cadence.mode, PollingMode::Stopped);

        cadence.mode = PollingMode::Normal;
        assert!(cadence.trigger_burst(4));
        assert_eq!(cadence.burst_remaining, 4);
    }

    #[test]
    fn test_retrigger_does_not_extend() {
        let config = PollingConfig::default();
        let mut cadence = Cadence {
            mode: PollingMode::Normal,
            burst_remaining: 0,
        };
        cadence.trigger_burst(config.burst_cycles);
        cadence.finish_cycle(&config);
        assert_eq!(cadence.burst_remaining, 3);

        assert!(!cadence.trigger_burst(config.burst_cycles));
        assert_eq!(cadence.burst_remaining, 3);
        assert_eq!(cadence.mode, PollingMode::Burst);
    }

    #[test]
    fn test_burst_runs_out() {
        let config = PollingConfig::default();
        let mut cadence = Cadence {
            mode: PollingMode::Normal,
            burst_remaining: 0,
        };
        cadence.trigger_burst(config.burst_cycles);

        let intervals: Vec<Duration> = (0..5).map(|_| cadence.finish_cycle(&config)).collect();
        assert_eq!(
            intervals,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(2),
                Duration::from_secs(5),
            ]
        );
        assert_eq!(cadence.mode, PollingMode::Normal);
    }

    #[test]
    fn test_stats_display() {
        let stats = PollingStats {
            running: true,
            mode: PollingMode::Burst,
            poll_count: 12,
            error_count: 1,
            consecutive_errors: 0,
            burst_cycles_remaining: 2,
            observer_count: 3,
            last_poll: None,
            normal_interval: Duration::from_secs(5),
            burst_interval: Duration::from_secs(2),
        };
        let text = stats.to_string();
        assert!(text.contains("Mode: burst"));
        assert!(text.contains("Polls: 12 (1 failed)"));
        assert!(text.contains("Last poll: never"));
    }
}
