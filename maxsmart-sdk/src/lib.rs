//! # MaxSmart SDK
//!
//! Control and monitor MaxSmart / Revogi power strips on the local network.
//!
//! ```rust,no_run
//! use maxsmart_sdk::{DeviceSession, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), maxsmart_sdk::SdkError> {
//!     maxsmart_sdk::logging::init_logging_from_env().ok();
//!
//!     let mut session = DeviceSession::new("192.168.1.20".parse().unwrap(), SessionConfig::from_env()?);
//!     session.initialize().await?;
//!
//!     // Switch port 2 on; returns once the device reports it on
//!     session.turn_on(2).await?;
//!
//!     // Live monitoring
//!     let mut changes = session.watch_changes("changes").await?;
//!     session.start_polling()?;
//!     while let Some(event) = changes.recv().await {
//!         println!("{:?}", event);
//!     }
//!
//!     session.close().await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! maxsmart-sdk (DeviceSession, configuration, logging)
//!     ↓
//! maxsmart-discovery (UDP handshake)   maxsmart-polling (adaptive polling, change detection)
//!     ↓                                    ↓
//! maxsmart-api (commands, dispatcher, retries, error taxonomy)
//!     ↓
//! maxsmart-transport (HTTP and UDP V3 links, wire codec)
//! ```

pub use config::{ConfigError, SessionConfig};
pub use error::SdkError;
pub use session::{DeviceSession, HealthReport, MAX_PORT, MAX_PORT_NAME_LENGTH};
pub use units::detect_unit;

// Re-export the types callers touch through a session
pub use maxsmart_api::{
    Command, CommandError, DeviceState, DispatchConfig, ErrorFormatter, ErrorKind, HardwareIds,
    PlainFormatter, Protocol, ResponseRecord, RetryPolicy, WattUnit,
};
pub use maxsmart_discovery::{discover, find_device, DeviceDescriptor, DiscoveryOptions};
pub use maxsmart_polling::{
    ChangeDetector, ChangeEvent, ObserverError, PollObserver, PollSnapshot, PollingConfig,
    PollingMode, PollingStats,
};

pub mod config;
pub mod logging;
mod error;
mod session;
mod units;
