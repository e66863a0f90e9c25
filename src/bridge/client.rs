//! Bridge client
//!
//! Owns the single shared connection to the host process: establishes it
//! lazily, keeps it healthy with a periodic probe, tears it down and
//! re-establishes it with exponential backoff on failure, and accounts for
//! every remote call in the bounded call log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::metrics::{CallLog, CallRecord, MethodMetrics};
use crate::{Error, Result};

use super::slots;
use super::transport::{RemoteHandle, Transport};

/// Connection lifecycle state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Snapshot of the connection lifecycle, for status surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub is_connected: bool,
    pub retry_count: u32,
    pub connection_attempts: u64,
    pub last_connection_attempt: Option<DateTime<Utc>>,
}

/// Bundled observability snapshot: connection status, per-slot metrics, and
/// log counts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub connection: ConnectionInfo,
    pub metrics: HashMap<String, MethodMetrics>,
    pub success_count: usize,
    pub error_count: usize,
    pub timestamp: DateTime<Utc>,
}

type ConnectFuture = Shared<BoxFuture<'static, Result<RemoteHandle>>>;

struct Inner {
    config: BridgeConfig,
    transport: Option<Arc<dyn Transport>>,

    state: Mutex<ConnectionState>,
    handle: Mutex<Option<RemoteHandle>>,

    /// The single in-flight connection attempt. Concurrent `initialize()`
    /// callers await clones of this future and share its outcome.
    connecting: Mutex<Option<ConnectFuture>>,

    retry_count: AtomicU32,
    connection_attempts: AtomicU64,
    last_attempt: Mutex<Option<DateTime<Utc>>>,

    log: Mutex<CallLog>,

    health_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    report_task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl Inner {
    /// Tear down the handle, any pending connect future, and the health loop.
    fn reset(&self) {
        *self.handle.lock() = None;
        self.connecting.lock().take();
        *self.state.lock() = ConnectionState::Disconnected;
        if let Some(task) = self.health_task.lock().take() {
            task.abort();
        }
        tracing::debug!("bridge connection reset");
    }
}

/// Client side of the kiosk host bridge.
///
/// Cheaply cloneable; all clones share one connection and one call log.
/// Lifecycle: `new` → [`initialize`](Self::initialize) → typed slot calls →
/// [`dispose`](Self::dispose). Dispose stops the background health,
/// reconnect, and report tasks; without it they keep the shared state alive.
#[derive(Clone)]
pub struct BridgeClient {
    inner: Arc<Inner>,
}

impl BridgeClient {
    /// Create a client over the transport supplied by the hosting
    /// environment. `None` models an environment that never provided one;
    /// every connection attempt then fails with
    /// [`Error::TransportUnavailable`].
    pub fn new(transport: Option<Arc<dyn Transport>>) -> Self {
        Self::with_config(transport, BridgeConfig::default())
    }

    pub fn with_config(transport: Option<Arc<dyn Transport>>, config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                state: Mutex::new(ConnectionState::Disconnected),
                handle: Mutex::new(None),
                connecting: Mutex::new(None),
                retry_count: AtomicU32::new(0),
                connection_attempts: AtomicU64::new(0),
                last_attempt: Mutex::new(None),
                log: Mutex::new(CallLog::default()),
                health_task: Mutex::new(None),
                reconnect_task: Mutex::new(None),
                report_task: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    // === Connection management ===

    /// Establish the connection to the host, or return the already
    /// established handle.
    ///
    /// Concurrent calls issued while a handshake is in flight all await the
    /// same attempt and receive the same handle or the same error. An
    /// explicit call also restarts a failure episode: the retry counter goes
    /// back to zero before the attempt.
    pub async fn initialize(&self) -> Result<RemoteHandle> {
        self.inner.retry_count.store(0, Ordering::SeqCst);
        self.arm_report_loop();
        self.connect().await
    }

    /// True iff the state is `Connected` and a remote handle is held.
    pub fn is_ready(&self) -> bool {
        *self.inner.state.lock() == ConnectionState::Connected
            && self.inner.handle.lock().is_some()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Drop the connection unconditionally. Never fails; safe in any state.
    /// The next call or `initialize()` performs a fresh handshake.
    pub fn reset(&self) {
        self.inner.reset();
    }

    /// Terminal teardown: stops the reconnect, health, and report tasks and
    /// resets.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.reconnect_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.inner.report_task.lock().take() {
            task.abort();
        }
        self.inner.reset();
    }

    fn ready_handle(&self) -> Option<RemoteHandle> {
        if *self.inner.state.lock() != ConnectionState::Connected {
            return None;
        }
        self.inner.handle.lock().clone()
    }

    /// Internal connect path: join the in-flight attempt or start one.
    /// Unlike [`initialize`](Self::initialize) this leaves the retry counter
    /// alone, so reconnection episodes keep their attempt count.
    async fn connect(&self) -> Result<RemoteHandle> {
        if let Some(handle) = self.ready_handle() {
            return Ok(handle);
        }

        let attempt = {
            let mut connecting = self.inner.connecting.lock();
            match connecting.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let fut = Self::establish(self.inner.clone()).boxed().shared();
                    *connecting = Some(fut.clone());
                    fut
                }
            }
        };

        attempt.await
    }

    /// The single handshake attempt behind the shared connect future.
    async fn establish(inner: Arc<Inner>) -> Result<RemoteHandle> {
        *inner.state.lock() = ConnectionState::Connecting;
        *inner.last_attempt.lock() = Some(Utc::now());
        inner.connection_attempts.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        match Self::handshake(&inner).await {
            Ok(handle) => {
                *inner.handle.lock() = Some(handle.clone());
                *inner.state.lock() = ConnectionState::Connected;
                inner.retry_count.store(0, Ordering::SeqCst);
                inner.connecting.lock().take();
                inner
                    .log
                    .lock()
                    .record_success(slots::INITIALIZE, Vec::new(), started.elapsed());

                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "bridge connected to host"
                );

                Self::arm_health_loop(&inner);
                Ok(handle)
            }
            Err(err) => {
                *inner.state.lock() = ConnectionState::Failed;
                inner.connecting.lock().take();
                inner
                    .log
                    .lock()
                    .record_error(slots::INITIALIZE, Vec::new(), started.elapsed(), &err);

                tracing::warn!(error = %err, "bridge connection failed");

                // Transport absence is permanent; everything else goes
                // through the backoff procedure.
                if !matches!(err, Error::TransportUnavailable) {
                    BridgeClient {
                        inner: inner.clone(),
                    }
                    .schedule_reconnect();
                }
                Err(err)
            }
        }
    }

    async fn handshake(inner: &Arc<Inner>) -> Result<RemoteHandle> {
        let transport = inner
            .transport
            .clone()
            .ok_or(Error::TransportUnavailable)?;

        let timeout = inner.config.connect_timeout();
        let registry = tokio::time::timeout(timeout, transport.open())
            .await
            .map_err(|_| Error::ConnectionTimeout(timeout))??;

        registry.backend()
    }

    // === Health monitoring ===

    fn arm_health_loop(inner: &Arc<Inner>) {
        let client = BridgeClient {
            inner: inner.clone(),
        };
        let interval = inner.config.health_interval();

        let mut guard = inner.health_task.lock();
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if !client.is_ready() {
                    tracing::warn!("health check: connection no longer ready");
                    client.schedule_reconnect();
                    break;
                }

                match client.call_slot(slots::PING, Vec::new()).await {
                    Ok(_) => tracing::debug!("health check passed"),
                    Err(err) => {
                        // call_slot already reset the connection and
                        // scheduled reconnection.
                        tracing::warn!(error = %err, "health check failed");
                        break;
                    }
                }
            }
        }));
    }

    // === Reconnection ===

    /// Schedule one backoff-delayed reconnection attempt, if the retry cap
    /// allows it and none is already pending. At the cap the state becomes
    /// `Failed` and stays there until an external `initialize()`.
    fn schedule_reconnect(&self) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        let mut guard = self.inner.reconnect_task.lock();
        if guard.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let retries = self.inner.retry_count.load(Ordering::SeqCst);
        if retries >= self.inner.config.max_retries {
            tracing::error!(retries, "max reconnection attempts reached");
            *self.inner.state.lock() = ConnectionState::Failed;
            return;
        }

        let attempt = self.inner.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.inner.config.backoff_delay(attempt);
        tracing::warn!(
            attempt,
            max = self.inner.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnection"
        );

        let client = self.clone();
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let outcome = client.connect().await;
            // Clear our own slot so a follow-up can be scheduled.
            client.inner.reconnect_task.lock().take();

            match outcome {
                Ok(_) => tracing::info!(attempt, "reconnection succeeded"),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "reconnection failed");
                    client.schedule_reconnect();
                }
            }
        }));
    }

    // === Slot dispatch ===

    /// Invoke a named slot on the host's backend object.
    ///
    /// The primitive behind the typed wrappers in [`super::slots`]; UI layers
    /// never call it directly. Exactly one call record is written per
    /// invocation. Any failure tears the connection down and schedules
    /// reconnection, so the next call starts from a fresh handshake.
    pub(crate) async fn call_slot(&self, slot: &str, args: Vec<JsonValue>) -> Result<JsonValue> {
        let started = Instant::now();

        match self.dispatch(slot, args.clone()).await {
            Ok(value) => {
                self.inner
                    .log
                    .lock()
                    .record_success(slot, args, started.elapsed());
                Ok(value)
            }
            Err(err) => {
                self.inner
                    .log
                    .lock()
                    .record_error(slot, args, started.elapsed(), &err);

                // Fail fast: no partial connection state survives an error.
                if !matches!(err, Error::TransportUnavailable) {
                    self.inner.reset();
                    self.schedule_reconnect();
                }
                Err(err)
            }
        }
    }

    async fn dispatch(&self, slot: &str, args: Vec<JsonValue>) -> Result<JsonValue> {
        let handle = match self.ready_handle() {
            Some(handle) => handle,
            None => self.connect().await?,
        };

        if !handle.has_slot(slot) {
            return Err(Error::SlotNotFound(slot.to_string()));
        }

        tracing::debug!(slot, "calling slot");

        let timeout = self.inner.config.call_timeout();
        match tokio::time::timeout(timeout, handle.call(slot, args)).await {
            Ok(result) => result,
            Err(_) => Err(Error::OperationTimedOut {
                slot: slot.to_string(),
                timeout,
            }),
        }
    }

    // === Observability ===

    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            state: self.state(),
            is_connected: self.is_ready(),
            retry_count: self.inner.retry_count.load(Ordering::SeqCst),
            connection_attempts: self.inner.connection_attempts.load(Ordering::Relaxed),
            last_connection_attempt: *self.inner.last_attempt.lock(),
        }
    }

    /// Bundle connection status, per-slot metrics, and log counts, warning
    /// about degraded slots along the way.
    pub fn performance_report(&self) -> PerformanceReport {
        let connection = self.connection_info();
        let log = self.inner.log.lock();
        log.warn_degraded();

        PerformanceReport {
            connection,
            metrics: log.metrics(),
            success_count: log.success_log().len(),
            error_count: log.error_log().len(),
            timestamp: Utc::now(),
        }
    }

    /// Start the periodic report emitter. It runs for the client's lifetime
    /// (a reset does not stop it) until `dispose`; re-arming a live loop is
    /// a no-op.
    fn arm_report_loop(&self) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }

        let mut guard = self.inner.report_task.lock();
        if guard.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let client = self.clone();
        let interval = self.inner.config.report_interval();
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let report = client.performance_report();
                tracing::info!(
                    state = ?report.connection.state,
                    slots = report.metrics.len(),
                    successes = report.success_count,
                    errors = report.error_count,
                    "periodic bridge report"
                );
            }
        }));
    }

    pub fn success_log(&self) -> Vec<CallRecord> {
        self.inner.log.lock().success_log()
    }

    pub fn error_log(&self) -> Vec<CallRecord> {
        self.inner.log.lock().error_log()
    }

    pub fn metrics(&self) -> HashMap<String, MethodMetrics> {
        self.inner.log.lock().metrics()
    }

    pub fn clear_logs(&self) {
        self.inner.log.lock().clear();
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient")
            .field("state", &self.state())
            .field("retry_count", &self.inner.retry_count.load(Ordering::SeqCst))
            .finish()
    }
}
