//! Typed command dispatch for MaxSmart / Revogi power strips
//!
//! A strip speaks one of two protocols. Firmware `1.30` and `2.11` answer
//! HTTP GET requests (`/?cmd={id}&json={...}`); newer firmware only answers
//! tagged `V3{...}` datagrams on UDP port 8888 and supports a much smaller
//! command set. This crate hides that split behind:
//!
//! - [`Command`] and [`Protocol`]: logical operations and the capability table
//!   mapping them to wire ids
//! - [`Dispatcher`]: one device, one protocol, retries and timeouts
//! - [`ResponseRecord`]: the normalized reply both protocols produce
//! - [`ErrorKind`]: the failure taxonomy callers branch on
//!
//! # Example
//!
//! ```rust,no_run
//! use maxsmart_api::{CallOptions, Command, DeviceState, Dispatcher, Protocol, WattUnit};
//! use serde_json::Map;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let ip = "192.168.1.20".parse()?;
//! let dispatcher = Dispatcher::new(ip, Protocol::UdpV3, "SWP6023002003697");
//! let record = dispatcher
//!     .dispatch(Command::ReadState, Map::new(), CallOptions::default())
//!     .await?;
//! let state = DeviceState::from_record(&record, WattUnit::Watts, ip)?;
//! println!("port 1 is {}", state.port_state(1).unwrap_or(0));
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod formatter;
pub mod response;
pub mod retry;

pub use command::{Command, Protocol};
pub use dispatcher::{CallOptions, DispatchConfig, Dispatcher};
pub use error::{CommandError, ErrorKind, Result};
pub use formatter::{ErrorFormatter, PlainFormatter};
pub use response::{DeviceState, HardwareIds, ResponseRecord, WattUnit};
pub use retry::{Backoff, RetryPolicy};

/// Re-exported so callers can supply their own links
pub use transport::{DatagramTransport, HttpTransport, Transport, TransportError};
