//! Topic-based publish/subscribe bus for flight events.
//!
//! Built on [`tokio::sync::broadcast`] so that every subscriber sees every
//! event on its topic and a slow dashboard never stalls the control cycle.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | loop outputs and errors, once per cycle |
//! | [`Topic::Sequence`] | step execution, completion, abort progress |
//! | [`Topic::Alerts`] | channel health changes, preflight failures, operator overrides |

use ascent_types::Event;
use tokio::sync::broadcast;
use tracing::trace;

/// Events buffered per topic before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Telemetry,
    Sequence,
    Alerts,
}

/// Shared event bus.  Clones share the same underlying channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    telemetry: broadcast::Sender<Event>,
    sequence: broadcast::Sender<Event>,
    alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus; `capacity` applies to each topic independently.
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity);
        let (sequence, _) = broadcast::channel(capacity);
        let (alerts, _) = broadcast::channel(capacity);
        Self {
            telemetry,
            sequence,
            alerts,
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of receivers handed the event.  Publishing with
    /// nobody listening is normal during flight and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                trace!(?topic, source = %event.source, "event dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.sender(topic).subscribe(),
        }
    }

    /// Number of live receivers on `topic`.
    pub fn receiver_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::Sequence => &self.sequence,
            Topic::Alerts => &self.alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiver bound to a single [`Topic`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event.
    ///
    /// `Err(Lagged(n))` means `n` events were dropped because this receiver
    /// fell behind; `Err(Closed)` means every sender is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, for consumers that poll from a synchronous loop.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}
