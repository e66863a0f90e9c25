//! kiosk-bridge - RPC bridge client for the kiosk front-end
//!
//! The UI process talks to its native host through a single shared
//! connection. This crate owns that connection: it establishes it lazily,
//! exposes the host's slots as typed async methods, bounds every call with a
//! timeout, recovers the channel with exponential backoff when it breaks,
//! and keeps bounded success/error logs plus per-slot metrics.
//!
//! ```no_run
//! use std::sync::Arc;
//! use kiosk_bridge::{BridgeClient, BridgeConfig, Feature, StdioTransport, Transport};
//!
//! # async fn run() -> kiosk_bridge::Result<()> {
//! let config = BridgeConfig::default();
//! let transport: Arc<dyn Transport> = Arc::new(StdioTransport::new(config.clone()));
//! let bridge = BridgeClient::with_config(Some(transport), config);
//!
//! bridge.initialize().await?;
//! bridge.open_feature(Feature::Agenda).await?;
//! bridge.update_progress(57).await?;
//!
//! bridge.dispose();
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod metrics;

mod error;

pub use bridge::{
    BridgeClient, ConnectionInfo, ConnectionState, Feature, ObjectRegistry, PerformanceReport,
    RemoteHandle, RemoteObject, StdioTransport, Transport,
};
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use metrics::{CallLog, CallOutcome, CallRecord, MethodMetrics};
