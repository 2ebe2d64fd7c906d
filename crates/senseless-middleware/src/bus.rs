//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Direction | Payload |
//! |---|---|---|
//! | [`Topic::RendezvousRequests`] | senseless robot → partner | `RendezvousRequest` |
//! | [`Topic::Measurements`] | partner → senseless robot | `Measurement` |
//! | [`Topic::Acknowledgements`] | senseless robot → partner | `Acknowledgement` |

use senseless_types::Event;
use thiserror::Error;
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RendezvousRequests,
    Measurements,
    Acknowledgements,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Nobody is subscribed to the topic, so the event went nowhere.
    #[error("no subscribers for topic {0:?}")]
    NoSubscribers(Topic),
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    requests: broadcast::Sender<Event>,
    measurements: broadcast::Sender<Event>,
    acknowledgements: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus.  `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (requests, _) = broadcast::channel(capacity);
        let (measurements, _) = broadcast::channel(capacity);
        let (acknowledgements, _) = broadcast::channel(capacity);
        Self {
            requests,
            measurements,
            acknowledgements,
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of subscribers handed the event, or
    /// [`BusError::NoSubscribers`] when nobody is listening.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, BusError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| BusError::NoSubscribers(topic))
    }

    /// Subscribe to `topic`.  Only events published after this call are
    /// delivered.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::RendezvousRequests => &self.requests,
            Topic::Measurements => &self.measurements,
            Topic::Acknowledgements => &self.acknowledgements,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   events were dropped; the caller decides whether to continue.
    /// * `Err(RecvError::Closed)` – every bus handle has been dropped.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}
