//! Background push path for transports without native property streams.
//!
//! The poller reads every subscribed path through [`VesselLink::read_property`]
//! at a fixed period and pushes each outcome into the manager's
//! [`UpdateSink`].  It runs on its own tokio task, and each pass runs on the
//! blocking pool, so remote latency never lands inside the control cycle or
//! stalls the runtime's worker threads.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::link::VesselLink;
use crate::telemetry::{SubscriptionSet, TelemetryManager, UpdateSink};

pub struct TelemetryPoller {
    link: Arc<dyn VesselLink>,
    subscriptions: SubscriptionSet,
    sink: UpdateSink,
}

impl TelemetryPoller {
    /// Bind a poller to `manager`'s subscription set and sink.
    pub fn new(link: Arc<dyn VesselLink>, manager: &TelemetryManager) -> Self {
        Self {
            link,
            subscriptions: manager.subscriptions(),
            sink: manager.sink(),
        }
    }

    /// Read every subscribed path once.  Returns the number of paths read.
    pub fn poll_once(&self) -> usize {
        let paths = self.subscriptions.paths();
        for path in &paths {
            match self.link.read_property(path) {
                Ok(value) => {
                    trace!(path = %path, ?value, "polled");
                    self.sink.push(path.as_str(), value);
                }
                Err(error) => {
                    self.sink.push_failure(path.as_str(), error);
                }
            }
        }
        paths.len()
    }

    /// Poll every `period` until the owning manager is dropped.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        let poller = Arc::new(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(period_ms = period.as_millis() as u64, "telemetry poller started");
            loop {
                ticker.tick().await;
                if poller.sink.is_closed() {
                    break;
                }
                let pass = Arc::clone(&poller);
                if let Err(error) = tokio::task::spawn_blocking(move || pass.poll_once()).await {
                    warn!(%error, "telemetry poll pass failed");
                    break;
                }
            }
            debug!("telemetry poller stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use ascent_types::{
        ActionArg, ActionTarget, AscentError, ComponentId, RemoteComponent, TelemetryValue,
    };

    /// Link serving a fixed property map; everything else fails.
    #[derive(Default)]
    struct MapLink {
        values: Mutex<HashMap<String, f64>>,
    }

    impl MapLink {
        fn set(&self, path: &str, v: f64) {
            self.values.lock().unwrap().insert(path.to_string(), v);
        }
    }

    impl VesselLink for MapLink {
        fn read_property(&self, path: &str) -> Result<TelemetryValue, AscentError> {
            self.values
                .lock()
                .unwrap()
                .get(path)
                .map(|v| TelemetryValue::Scalar(*v))
                .ok_or_else(|| AscentError::TransientTelemetry {
                    path: path.to_string(),
                })
        }

        fn invoke_action(
            &self,
            _target: ActionTarget,
            _action: &str,
            _args: &[ActionArg],
        ) -> Result<(), AscentError> {
            Ok(())
        }

        fn enumerate_components(&self) -> Result<Vec<RemoteComponent>, AscentError> {
            Ok(Vec::new())
        }

        fn module_fields(
            &self,
            _id: ComponentId,
            _module: &str,
        ) -> Result<HashMap<String, String>, AscentError> {
            Ok(HashMap::new())
        }
    }

    #[test]
    fn poll_once_reads_only_subscribed_paths() {
        let link = Arc::new(MapLink::default());
        link.set("flight.mean_altitude", 250.0);
        link.set("flight.vertical_speed", 12.0);

        let mut tm = TelemetryManager::new();
        let alt = tm.subscribe("flight.mean_altitude");
        let poller = TelemetryPoller::new(link.clone(), &tm);

        assert_eq!(poller.poll_once(), 1);
        tm.drain();
        assert_eq!(tm.read_scalar(&alt), Some(250.0));
        assert_eq!(tm.read_path("flight.vertical_speed"), None);
    }

    #[test]
    fn repeated_read_failures_flow_into_health() {
        let link = Arc::new(MapLink::default());
        let mut tm = TelemetryManager::new();
        let missing = tm.subscribe("flight.orbital_speed");
        let poller = TelemetryPoller::new(link, &tm);

        for _ in 0..3 {
            poller.poll_once();
        }
        let transitions = tm.drain();
        assert_eq!(transitions.len(), 1);
        assert!(!tm.is_healthy(&missing));
    }

    /// Link whose every read blocks the calling thread.
    struct SlowLink {
        delay: Duration,
    }

    impl VesselLink for SlowLink {
        fn read_property(&self, _path: &str) -> Result<TelemetryValue, AscentError> {
            std::thread::sleep(self.delay);
            Ok(TelemetryValue::Scalar(7.0))
        }

        fn invoke_action(
            &self,
            _target: ActionTarget,
            _action: &str,
            _args: &[ActionArg],
        ) -> Result<(), AscentError> {
            Ok(())
        }

        fn enumerate_components(&self) -> Result<Vec<RemoteComponent>, AscentError> {
            Ok(Vec::new())
        }

        fn module_fields(
            &self,
            _id: ComponentId,
            _module: &str,
        ) -> Result<HashMap<String, String>, AscentError> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn slow_reads_do_not_stall_the_runtime() {
        let link = Arc::new(SlowLink {
            delay: Duration::from_millis(300),
        });
        let mut tm = TelemetryManager::new();
        let alt = tm.subscribe("flight.mean_altitude");
        let _task = TelemetryPoller::new(link, &tm).spawn(Duration::from_millis(5));

        // Single-threaded runtime: a read on the worker would hold this sleep
        // hostage for the full delay.
        let start = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(start.elapsed() < Duration::from_millis(150));

        tokio::time::sleep(Duration::from_millis(400)).await;
        tm.drain();
        assert_eq!(tm.read_scalar(&alt), Some(7.0));
    }

    #[tokio::test]
    async fn spawned_poller_stops_when_manager_drops() {
        let link = Arc::new(MapLink::default());
        link.set("flight.mean_altitude", 1.0);
        let mut tm = TelemetryManager::new();
        let alt = tm.subscribe("flight.mean_altitude");
        let task = TelemetryPoller::new(link, &tm).spawn(Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tm.drain();
        assert_eq!(tm.read_scalar(&alt), Some(1.0));

        drop(tm);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("poller should exit")
            .expect("poller task panicked");
    }
}
