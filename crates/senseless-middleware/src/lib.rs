//! `senseless-middleware` – the link between the senseless robot and its
//! sensing partner.
//!
//! # Modules
//!
//! - [`bus`] – headless, topic-based publish/subscribe [`EventBus`] built on
//!   Tokio broadcast channels.
//! - [`channel`] – the [`RendezvousChannel`] contract the controller talks to.
//! - [`bus_channel`] – [`BusChannel`], a `RendezvousChannel` over the bus.
//! - [`partner`] – [`SensingPartner`], a simulated partner robot answering
//!   rendezvous requests with noisy observations.

pub mod bus;
pub mod bus_channel;
pub mod channel;
pub mod partner;

pub use bus::{BusError, EventBus, Topic, TopicReceiver};
pub use bus_channel::BusChannel;
pub use channel::{ReceiveOutcome, RendezvousChannel, SendOutcome};
pub use partner::{ObservationMode, PartnerConfig, SensingPartner};
