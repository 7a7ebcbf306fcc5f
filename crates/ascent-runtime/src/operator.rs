//! [`OperatorHandle`] – thread-safe operator entry points.
//!
//! Requests are queued and picked up at the start of the next control cycle.
//! Within one cycle an abort always wins over a start.

use ascent_types::{Intent, OverrideChannel};
use tokio::sync::mpsc;
use tracing::debug;

/// Cloneable sender side of the flight computer's intent queue.
///
/// Every method returns `false` once the flight computer has been dropped.
#[derive(Debug, Clone)]
pub struct OperatorHandle {
    tx: mpsc::UnboundedSender<Intent>,
}

impl OperatorHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Intent>) -> Self {
        Self { tx }
    }

    pub fn start_sequence(&self) -> bool {
        self.send(Intent::StartSequence)
    }

    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.send(Intent::Abort {
            reason: reason.into(),
        })
    }

    /// Pin `channel` to `value`, or hand it back to the loops with `None`.
    pub fn set_manual_override(&self, channel: OverrideChannel, value: Option<f64>) -> bool {
        self.send(Intent::SetManualOverride { channel, value })
    }

    pub fn send(&self, intent: Intent) -> bool {
        debug!(?intent, "operator intent queued");
        self.tx.send(intent).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_arrive_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = OperatorHandle::new(tx);
        assert!(handle.start_sequence());
        assert!(handle.set_manual_override(OverrideChannel::Throttle, Some(0.4)));
        assert!(handle.abort("wobble"));

        assert_eq!(rx.try_recv().unwrap(), Intent::StartSequence);
        assert_eq!(
            rx.try_recv().unwrap(),
            Intent::SetManualOverride {
                channel: OverrideChannel::Throttle,
                value: Some(0.4)
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Intent::Abort {
                reason: "wobble".into()
            }
        );
    }

    #[test]
    fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = OperatorHandle::new(tx);
        drop(rx);
        assert!(!handle.abort("late"));
    }
}
