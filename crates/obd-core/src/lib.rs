//! obd-core - Core types for the OBD telemetry gateway
//!
//! This crate holds the pieces shared by the protocol engine and the API layer:
//! the telemetry data model, the single-writer "latest value" slot used to hand
//! identity and map refreshes to the telemetry loop, and the snapshot
//! broadcaster that fans serialized snapshots out to subscribers.

pub mod broadcast;
pub mod error;
pub mod latest;
pub mod models;

pub use broadcast::{Broadcaster, ChannelSubscriber, Subscriber, SubscriberId};
pub use error::DeliveryError;
pub use latest::Latest;
pub use models::*;
