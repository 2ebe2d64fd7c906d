//! [`RendezvousChannel`] over the in-process [`EventBus`].
//!
//! Requests go out on [`Topic::RendezvousRequests`], measurements come back
//! on [`Topic::Measurements`] and acknowledgements go out on
//! [`Topic::Acknowledgements`].  The measurement subscription is opened at
//! construction so nothing published after that is missed.

use std::time::Duration;

use async_trait::async_trait;
use senseless_types::{Event, EventPayload, LocError, RendezvousBelief, RendezvousId};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bus::{EventBus, Topic, TopicReceiver};
use crate::channel::{ReceiveOutcome, RendezvousChannel, SendOutcome};

const SOURCE: &str = "senseless-middleware::bus_channel";

pub struct BusChannel {
    bus: EventBus,
    robot_id: String,
    measurements: TopicReceiver,
}

impl BusChannel {
    pub fn new(bus: EventBus, robot_id: impl Into<String>) -> Self {
        let measurements = bus.subscribe_to(Topic::Measurements);
        Self {
            bus,
            robot_id: robot_id.into(),
            measurements,
        }
    }
}

#[async_trait]
impl RendezvousChannel for BusChannel {
    async fn send(
        &mut self,
        request: &RendezvousBelief,
        _timeout: Duration,
    ) -> Result<SendOutcome, LocError> {
        let event = Event::new(SOURCE, EventPayload::RendezvousRequest(request.clone()));
        match self.bus.publish_to(Topic::RendezvousRequests, event) {
            Ok(receivers) => {
                debug!(
                    rendezvous_id = %request.rendezvous_id,
                    receivers,
                    "rendezvous request published"
                );
                Ok(SendOutcome::Ack)
            }
            Err(e) => {
                debug!(rendezvous_id = %request.rendezvous_id, error = %e, "rendezvous request not delivered");
                Ok(SendOutcome::Failed)
            }
        }
    }

    async fn receive(
        &mut self,
        id: RendezvousId,
        timeout: Duration,
    ) -> Result<ReceiveOutcome, LocError> {
        let deadline = Instant::now() + timeout;
        loop {
            let next = match tokio::time::timeout_at(deadline, self.measurements.recv()).await {
                Err(_) => return Ok(ReceiveOutcome::TimedOut),
                Ok(next) => next,
            };
            match next {
                Ok(Event {
                    payload: EventPayload::Measurement(m),
                    ..
                }) => {
                    if m.robot_id != self.robot_id {
                        continue;
                    }
                    if m.rendezvous_id < id {
                        debug!(stale = %m.rendezvous_id, waiting_for = %id, "dropping stale measurement");
                        continue;
                    }
                    return Ok(ReceiveOutcome::Measurement(m));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "measurement subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => {
                    return Err(LocError::ChannelClosed("measurement topic closed".into()));
                }
            }
        }
    }

    async fn acknowledge(&mut self, id: RendezvousId) -> bool {
        let event = Event::new(
            SOURCE,
            EventPayload::Acknowledgement {
                rendezvous_id: id,
                robot_id: self.robot_id.clone(),
            },
        );
        match self.bus.publish_to(Topic::Acknowledgements, event) {
            Ok(_) => true,
            Err(e) => {
                debug!(rendezvous_id = %id, error = %e, "acknowledgement not delivered");
                false
            }
        }
    }
}
