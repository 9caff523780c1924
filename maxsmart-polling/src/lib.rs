//! Adaptive polling for MaxSmart power strips
//!
//! The vendor control app reads the full device state every five seconds and
//! speeds up to every two seconds for a few cycles after each command. This
//! crate reproduces that cadence with a single tokio task per device:
//!
//! ```text
//! Stopped --start()--> Normal --trigger_burst()--> Burst(n)
//!    ^                   ^                            |
//!    |                   +------ n cycles elapsed ----+
//!    +------------------- stop() ---------------------+
//! ```
//!
//! Every successful read becomes a [`PollSnapshot`] that is handed to each
//! registered [`PollObserver`] in name order. [`ChangeDetector`] is the stock
//! observer that turns snapshots into [`ChangeEvent`]s.
//!
//! # Example
//!
//! ```rust,no_run
//! use maxsmart_polling::{ChangeDetector, DispatchStateSource, PollingConfig, PollingEngine};
//! use maxsmart_api::{DeviceState, Dispatcher, Protocol, WattUnit};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Arc::new(Dispatcher::new("192.168.1.20".parse()?, Protocol::Http, "SWP6023002003697"));
//! let source = Arc::new(DispatchStateSource::new(dispatcher, WattUnit::Milliwatts));
//! let engine = PollingEngine::new(source, PollingConfig::default())?;
//!
//! let baseline = engine.force_poll().await?.device_state();
//! let (detector, mut changes) = ChangeDetector::new(baseline);
//! engine.register_observer("changes", Arc::new(detector));
//! engine.start();
//!
//! while let Some(change) = changes.recv().await {
//!     println!("{:?}", change);
//! }
//! engine.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod change_detector;
pub mod config;
pub mod engine;
pub mod error;
mod observer;
mod source;

pub use change_detector::{ChangeDetector, ChangeEvent, PortNames, DEFAULT_WATT_THRESHOLD};
pub use config::PollingConfig;
pub use engine::{PollSnapshot, PollingEngine, PollingMode, PollingStats};
pub use error::{ObserverError, PollingError};
pub use observer::PollObserver;
pub use source::{DispatchStateSource, StateSource};
