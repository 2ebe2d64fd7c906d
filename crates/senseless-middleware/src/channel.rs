//! The `RendezvousChannel` contract.
//!
//! Everything the controller needs from a transport, expressed as bounded
//! operations that return outcome enums.  Only a transport that can never
//! deliver again (closed, torn down) reports an `Err`; a lost message, a
//! partner that is not listening yet or a silent partner are ordinary
//! outcomes.
//!
//! | Operation | Outcomes | Retry |
//! |---|---|---|
//! | [`send`][RendezvousChannel::send] | [`SendOutcome::Ack`] / [`SendOutcome::Failed`] | caller retries `Failed` |
//! | [`receive`][RendezvousChannel::receive] | [`ReceiveOutcome::Measurement`] / [`ReceiveOutcome::TimedOut`] | none |
//! | [`acknowledge`][RendezvousChannel::acknowledge] | delivered or not | best-effort |

use std::time::Duration;

use async_trait::async_trait;
use senseless_types::{LocError, Measurement, RendezvousBelief, RendezvousId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The transport confirmed delivery to the partner side.
    Ack,
    /// Not delivered; safe to try again.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    Measurement(Measurement),
    TimedOut,
}

/// Message transport between the senseless robot and its partner.
#[async_trait]
pub trait RendezvousChannel: Send {
    /// Push a rendezvous request.  `timeout` bounds the wait for delivery
    /// confirmation.
    ///
    /// # Errors
    ///
    /// [`LocError::ChannelClosed`] when the transport is gone,
    /// [`LocError::Serialization`] when the request cannot be encoded.
    async fn send(
        &mut self,
        request: &RendezvousBelief,
        timeout: Duration,
    ) -> Result<SendOutcome, LocError>;

    /// Wait up to `timeout` for a measurement answering rendezvous `id`.
    ///
    /// Measurements for older rendezvous are dropped by the transport;
    /// anything else is handed back for the caller to validate.
    ///
    /// # Errors
    ///
    /// [`LocError::ChannelClosed`] when the transport is gone.
    async fn receive(
        &mut self,
        id: RendezvousId,
        timeout: Duration,
    ) -> Result<ReceiveOutcome, LocError>;

    /// Tell the partner the measurement for `id` arrived.  Returns whether
    /// the acknowledgement was handed to the transport.
    async fn acknowledge(&mut self, id: RendezvousId) -> bool;
}
