//! [`TelemetryManager`] – cached, reference-counted telemetry channels.
//!
//! A channel is created the first time a property path is subscribed and
//! torn down when its last handle is released.  Values arrive through an
//! [`UpdateSink`] (fed either by a native transport stream or by the
//! [`TelemetryPoller`][crate::poller::TelemetryPoller]) and are applied to
//! the cache by [`TelemetryManager::drain`] at the start of each control
//! cycle.
//!
//! # Health
//!
//! | Condition | Effect |
//! |---|---|
//! | 3 consecutive fetch failures | channel marked unhealthy, `read` returns `None` |
//! | no update for the staleness window (if configured) | channel marked unhealthy |
//! | a good value on an unhealthy channel | channel healthy again |
//!
//! Each transition is logged exactly once; individual failures are not.
//!
//! # Example
//!
//! ```rust
//! use ascent_link::telemetry::TelemetryManager;
//! use ascent_types::TelemetryValue;
//!
//! let mut telemetry = TelemetryManager::new();
//! let altitude = telemetry.subscribe("flight.mean_altitude");
//! assert_eq!(telemetry.read(&altitude), None);
//!
//! telemetry.sink().push("flight.mean_altitude", TelemetryValue::Scalar(1200.0));
//! telemetry.drain();
//! assert_eq!(telemetry.read_scalar(&altitude), Some(1200.0));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use ascent_types::{AscentError, TelemetryValue, TelemetryView};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Consecutive failed fetches after which a channel reports unhealthy.
pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;

// ─────────────────────────────────────────────────────────────────────────────
// Push path
// ─────────────────────────────────────────────────────────────────────────────

/// One fetch outcome for a property path.
#[derive(Debug, Clone)]
pub struct ChannelUpdate {
    pub path: String,
    pub result: Result<TelemetryValue, AscentError>,
    pub received_at: Instant,
}

/// Cloneable sender used by transports to push channel updates.
///
/// Pushing never blocks.  Updates for paths that are no longer subscribed
/// are discarded on drain.
#[derive(Debug, Clone)]
pub struct UpdateSink {
    tx: mpsc::UnboundedSender<ChannelUpdate>,
}

impl UpdateSink {
    /// Push a fresh value.  Returns `false` once the manager is gone.
    pub fn push(&self, path: impl Into<String>, value: TelemetryValue) -> bool {
        self.send(ChannelUpdate {
            path: path.into(),
            result: Ok(value),
            received_at: Instant::now(),
        })
    }

    /// Record a failed fetch.  Returns `false` once the manager is gone.
    pub fn push_failure(&self, path: impl Into<String>, error: AscentError) -> bool {
        self.send(ChannelUpdate {
            path: path.into(),
            result: Err(error),
            received_at: Instant::now(),
        })
    }

    /// Push a prepared update.
    pub fn send(&self, update: ChannelUpdate) -> bool {
        self.tx.send(update).is_ok()
    }

    /// `true` when the owning manager has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The set of property paths with at least one live subscriber.
///
/// Shared between the manager (writer) and the poller (reader).
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSet {
    inner: Arc<RwLock<BTreeSet<String>>>,
}

impl SubscriptionSet {
    /// Snapshot of the subscribed paths, in lexical order.
    pub fn paths(&self) -> Vec<String> {
        match self.inner.read() {
            Ok(guard) => guard.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        match self.inner.read() {
            Ok(guard) => guard.contains(path),
            Err(poisoned) => poisoned.into_inner().contains(path),
        }
    }

    fn insert(&self, path: &str) {
        match self.inner.write() {
            Ok(mut guard) => guard.insert(path.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(path.to_string()),
        };
    }

    fn remove(&self, path: &str) {
        match self.inner.write() {
            Ok(mut guard) => guard.remove(path),
            Err(poisoned) => poisoned.into_inner().remove(path),
        };
    }

    fn clear(&self) {
        match self.inner.write() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Reader handle for one subscribed channel.
///
/// Handles are deliberately not `Clone`: every [`TelemetryManager::subscribe`]
/// yields exactly one handle, and giving it back through
/// [`TelemetryManager::unsubscribe`] releases exactly one reference.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    path: Arc<str>,
}

impl ChannelHandle {
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A channel's health changed during [`TelemetryManager::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTransition {
    pub path: String,
    pub healthy: bool,
}

struct Channel {
    last_value: Option<TelemetryValue>,
    last_update: Option<Instant>,
    subscribed_at: Instant,
    healthy: bool,
    consecutive_failures: u32,
    ref_count: usize,
}

impl Channel {
    fn new(now: Instant) -> Self {
        Self {
            last_value: None,
            last_update: None,
            subscribed_at: now,
            healthy: true,
            consecutive_failures: 0,
            ref_count: 0,
        }
    }

    fn value(&self) -> Option<TelemetryValue> {
        if self.healthy { self.last_value } else { None }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TelemetryManager
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every telemetry channel of the control cycle.
pub struct TelemetryManager {
    channels: HashMap<String, Channel>,
    subscriptions: SubscriptionSet,
    tx: mpsc::UnboundedSender<ChannelUpdate>,
    rx: mpsc::UnboundedReceiver<ChannelUpdate>,
    stale_after: Option<Duration>,
}

impl Default for TelemetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryManager {
    /// Create a manager with no channels and no staleness window.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            channels: HashMap::new(),
            subscriptions: SubscriptionSet::default(),
            tx,
            rx,
            stale_after: None,
        }
    }

    /// Mark channels unhealthy when no update arrived within `window`.
    pub fn with_stale_after(mut self, window: Duration) -> Self {
        self.stale_after = Some(window);
        self
    }

    /// Subscribe to `path`.  Idempotent per path: repeated calls share one
    /// remote subscription and bump its reference count.
    pub fn subscribe(&mut self, path: &str) -> ChannelHandle {
        let channel = self.channels.entry(path.to_string()).or_insert_with(|| {
            debug!(path, "telemetry channel opened");
            Channel::new(Instant::now())
        });
        channel.ref_count += 1;
        self.subscriptions.insert(path);
        ChannelHandle { path: Arc::from(path) }
    }

    /// Release `handle`.  The remote subscription is torn down when the last
    /// reader for the path lets go.
    pub fn unsubscribe(&mut self, handle: ChannelHandle) {
        let path = handle.path();
        let Some(channel) = self.channels.get_mut(path) else {
            return;
        };
        channel.ref_count = channel.ref_count.saturating_sub(1);
        if channel.ref_count == 0 {
            self.channels.remove(path);
            self.subscriptions.remove(path);
            debug!(path, "telemetry channel closed");
        }
    }

    /// Latest value of the channel, or `None` when it has never received one
    /// or is unhealthy.
    pub fn read(&self, handle: &ChannelHandle) -> Option<TelemetryValue> {
        self.read_path(handle.path())
    }

    /// Scalar shortcut for [`read`][Self::read].
    pub fn read_scalar(&self, handle: &ChannelHandle) -> Option<f64> {
        self.read(handle).and_then(|v| v.as_scalar())
    }

    /// Read by path.  Unsubscribed paths yield `None`.
    pub fn read_path(&self, path: &str) -> Option<TelemetryValue> {
        self.channels.get(path).and_then(Channel::value)
    }

    pub fn is_healthy(&self, handle: &ChannelHandle) -> bool {
        self.channels.get(handle.path()).is_some_and(|c| c.healthy)
    }

    /// When the channel last received a good value.
    pub fn last_update(&self, handle: &ChannelHandle) -> Option<Instant> {
        self.channels.get(handle.path()).and_then(|c| c.last_update)
    }

    /// Number of distinct open channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// A sender for the push path.
    pub fn sink(&self) -> UpdateSink {
        UpdateSink {
            tx: self.tx.clone(),
        }
    }

    /// The shared subscription set consumed by the poller.
    pub fn subscriptions(&self) -> SubscriptionSet {
        self.subscriptions.clone()
    }

    /// Apply every queued update and run the staleness check.
    pub fn drain(&mut self) -> Vec<HealthTransition> {
        self.drain_at(Instant::now())
    }

    /// [`drain`][Self::drain] against an explicit clock reading.
    pub fn drain_at(&mut self, now: Instant) -> Vec<HealthTransition> {
        let mut transitions = Vec::new();

        while let Ok(update) = self.rx.try_recv() {
            let Some(channel) = self.channels.get_mut(&update.path) else {
                continue;
            };
            match update.result {
                Ok(value) => {
                    channel.last_value = Some(value);
                    channel.last_update = Some(update.received_at);
                    channel.consecutive_failures = 0;
                    if !channel.healthy {
                        channel.healthy = true;
                        info!(path = %update.path, "telemetry channel recovered");
                        transitions.push(HealthTransition {
                            path: update.path,
                            healthy: true,
                        });
                    }
                }
                Err(error) => {
                    channel.consecutive_failures = channel.consecutive_failures.saturating_add(1);
                    if channel.healthy && channel.consecutive_failures >= UNHEALTHY_AFTER_FAILURES {
                        channel.healthy = false;
                        warn!(
                            path = %update.path,
                            failures = channel.consecutive_failures,
                            error = %error,
                            "telemetry channel unhealthy"
                        );
                        transitions.push(HealthTransition {
                            path: update.path,
                            healthy: false,
                        });
                    }
                }
            }
        }

        if let Some(window) = self.stale_after {
            for (path, channel) in &mut self.channels {
                let since = channel.last_update.unwrap_or(channel.subscribed_at);
                if channel.healthy && now.saturating_duration_since(since) > window {
                    channel.healthy = false;
                    warn!(
                        path = %path,
                        window_ms = window.as_millis() as u64,
                        "telemetry channel stale"
                    );
                    transitions.push(HealthTransition {
                        path: path.clone(),
                        healthy: false,
                    });
                }
            }
        }

        transitions
    }

    /// Drop every channel and stop all remote subscriptions.
    pub fn shutdown(&mut self) {
        self.channels.clear();
        self.subscriptions.clear();
        while self.rx.try_recv().is_ok() {}
        info!("telemetry manager shut down");
    }
}

impl TelemetryView for TelemetryManager {
    fn scalar(&self, path: &str) -> Option<f64> {
        self.read_path(path).and_then(|v| v.as_scalar())
    }
}
