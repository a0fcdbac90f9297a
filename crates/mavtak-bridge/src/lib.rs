//! MAVLink to CoT pipeline.
//!
//! The [`Listener`] decodes MAVLink datagrams into the [`StateTracker`]; an
//! [`Emitter`] turns tracked vehicles into CoT events on a fixed interval and
//! fans them out through the [`Dispatcher`]. Every stage reports into the
//! shared [`StatusStore`]. A [`BridgeController`] restarts the pipeline with
//! new settings at runtime.
//!
//! # Example
//!
//! ```rust,no_run
//! use mavtak_bridge::Bridge;
//! use mavtak_core::BridgeSettings;
//! use std::time::Duration;
//!
//! # async fn run() -> mavtak_core::Result<()> {
//! let settings = BridgeSettings::default();
//! let handle = Bridge::start(&settings)?;
//! println!("listening on {}", handle.local_addr());
//!
//! handle.shutdown(Duration::from_secs(5)).await;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod controller;
pub mod dispatcher;
pub mod encoder;
pub mod listener;
pub mod status;
pub mod tracker;

pub use bridge::{Bridge, BridgeContext, BridgeHandle, EmitReport, Emitter};
pub use controller::BridgeController;
pub use dispatcher::{CotSink, DispatchError, DispatchReport, Dispatcher, UdpDestination};
pub use encoder::{CotEncoder, EncodeError};
pub use listener::{handle_datagram, DatagramOutcome, Listener};
pub use status::{Counters, LogEntry, LogLevel, StatusSnapshot, StatusStore, VehiclePosition};
pub use tracker::{FixState, StateTracker, TelemetryField, TelemetryUpdate, VehicleState};
