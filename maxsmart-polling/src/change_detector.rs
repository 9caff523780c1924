//! Consumption and switch state change detection
//!
//! [`ChangeDetector`] is a [`PollObserver`] that compares every snapshot
//! against the last reading it accepted and emits [`ChangeEvent`]s on an
//! unbounded channel. It starts from an explicit baseline so the first poll
//! does not report every port as changed. Attach a [`PortNames`] source to
//! have each event carry the port's current label.

use crate::{ObserverError, PollObserver, PollSnapshot};
use chrono::{DateTime, Utc};
use maxsmart_api::DeviceState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Smallest wattage swing, in watts, that counts as a change
pub const DEFAULT_WATT_THRESHOLD: f64 = 1.0;

/// Lookup of human readable port labels, consulted for every event
pub trait PortNames: Send + Sync {
    /// Label for a 1-based port, `None` when unknown
    fn port_name(&self, port: u8) -> Option<String>;
}

impl PortNames for Vec<String> {
    fn port_name(&self, port: u8) -> Option<String> {
        self.get(usize::from(port).checked_sub(1)?).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    Consumption {
        /// 1-based port number
        port: u8,
        #[serde(default)]
        port_name: Option<String>,
        previous_watt: f64,
        current_watt: f64,
        delta: f64,
        timestamp: DateTime<Utc>,
    },
    State {
        /// 1-based port number
        port: u8,
        #[serde(default)]
        port_name: Option<String>,
        previous_state: u8,
        current_state: u8,
        timestamp: DateTime<Utc>,
    },
}

impl ChangeEvent {
    pub fn port(&self) -> u8 {
        match self {
            ChangeEvent::Consumption { port, .. } | ChangeEvent::State { port, .. } => *port,
        }
    }

    pub fn port_name(&self) -> Option<&str> {
        match self {
            ChangeEvent::Consumption { port_name, .. } | ChangeEvent::State { port_name, .. } => {
                port_name.as_deref()
            }
        }
    }
}

pub struct ChangeDetector {
    baseline: Mutex<DeviceState>,
    threshold: f64,
    names: Option<Arc<dyn PortNames>>,
    events: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangeDetector {
    /// Create a detector seeded with `baseline` and the receiving end of its events
    pub fn new(baseline: DeviceState) -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                baseline: Mutex::new(baseline),
                threshold: DEFAULT_WATT_THRESHOLD,
                names: None,
                events,
            },
            receiver,
        )
    }

    pub fn with_threshold(mut self, watts: f64) -> Self {
        self.threshold = watts;
        self
    }

    pub fn with_port_names(mut self, names: Arc<dyn PortNames>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn baseline(&self) -> DeviceState {
        self.baseline.lock().clone()
    }

    /// Compare a snapshot with the baseline, advance it and return the changes
    ///
    /// Each baseline field advances only when the snapshot carries a reading
    /// of the same length; a short reading is compared port by port but
    /// never replaces the baseline.
    pub fn detect(&self, snapshot: &PollSnapshot) -> Vec<ChangeEvent> {
        let mut baseline = self.baseline.lock();
        let mut events = Vec::new();

        let ports = baseline
            .watt_values
            .len()
            .max(baseline.switch_states.len());

        for index in 0..ports {
            let port = u8::try_from(index + 1).unwrap_or(u8::MAX);
            let port_name = || self.names.as_ref().and_then(|names| names.port_name(port));

            if let (Some(&previous), Some(&current)) = (
                baseline.watt_values.get(index),
                snapshot.watt_values.get(index),
            ) {
                let delta = current - previous;
                if delta.abs() > self.threshold {
                    events.push(ChangeEvent::Consumption {
                        port,
                        port_name: port_name(),
                        previous_watt: previous,
                        current_watt: current,
                        delta,
                        timestamp: snapshot.timestamp,
                    });
                }
            }

            if let (Some(&previous), Some(&current)) = (
                baseline.switch_states.get(index),
                snapshot.switch_states.get(index),
            ) {
                if previous != current {
                    events.push(ChangeEvent::State {
                        port,
                        port_name: port_name(),
                        previous_state: previous,
                        current_state: current,
                        timestamp: snapshot.timestamp,
                    });
                }
            }
        }

        if snapshot.watt_values.len() >= baseline.watt_values.len() {
            baseline.watt_values = snapshot.watt_values.clone();
        }
        if snapshot.switch_states.len() >= baseline.switch_states.len() {
            baseline.switch_states = snapshot.switch_states.clone();
        }

        events
    }
}

impl PollObserver for ChangeDetector {
    fn on_poll(&self, snapshot: &PollSnapshot) -> Result<(), ObserverError> {
        for event in self.detect(snapshot) {
            self.events
                .send(event)
                .map_err(|_| "change event receiver dropped")?;
        }
        Ok(())
    }
}
