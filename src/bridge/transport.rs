//! Transport seam between the bridge client and the host process
//!
//! The hosting environment supplies a [`Transport`]; opening it performs the
//! handshake and yields an [`ObjectRegistry`] of named remote objects. The
//! bridge only ever uses the single `backend` entry.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value as JsonValue;

use crate::{Error, Result};

/// Name of the one registry entry the bridge expects.
pub const BACKEND_OBJECT: &str = "backend";

/// Proxy for a named remote object exposed by the host process.
pub trait RemoteObject: Send + Sync {
    /// Whether the object advertises the named slot. Answered locally from
    /// handshake metadata, without a remote round-trip.
    fn has_slot(&self, slot: &str) -> bool;

    /// Invoke a slot with the given arguments.
    fn call(&self, slot: &str, args: Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue>>;
}

/// Shared handle to a remote object, obtained from a completed handshake.
pub type RemoteHandle = Arc<dyn RemoteObject>;

/// Result of a completed handshake: the named remote objects the host exposes.
#[derive(Clone, Default)]
pub struct ObjectRegistry {
    objects: HashMap<String, RemoteHandle>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, object: RemoteHandle) {
        self.objects.insert(name.into(), object);
    }

    pub fn object(&self, name: &str) -> Option<RemoteHandle> {
        self.objects.get(name).cloned()
    }

    /// The `backend` object, or a handshake error if the host did not
    /// advertise one.
    pub fn backend(&self) -> Result<RemoteHandle> {
        self.object(BACKEND_OBJECT).ok_or_else(|| {
            Error::Handshake(format!("host registry has no '{}' object", BACKEND_OBJECT))
        })
    }
}

impl std::fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("objects", &self.objects.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Channel to the host process, supplied by the hosting environment.
///
/// `open` runs the handshake and resolves with the registry of remote
/// objects. The client bounds it with the connect timeout and may call it
/// again after a reset; implementations must tolerate repeated opens.
pub trait Transport: Send + Sync {
    fn open(&self) -> BoxFuture<'_, Result<ObjectRegistry>>;
}
