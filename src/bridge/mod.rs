//! Host bridge
//!
//! The RPC client side of the kiosk: connection lifecycle, slot dispatch,
//! health monitoring, and the stdio transport to the native host process.

pub mod client;
pub mod slots;
pub mod stdio;
pub mod transport;

pub use client::{BridgeClient, ConnectionInfo, ConnectionState, PerformanceReport};
pub use slots::Feature;
pub use stdio::StdioTransport;
pub use transport::{ObjectRegistry, RemoteHandle, RemoteObject, Transport, BACKEND_OBJECT};
