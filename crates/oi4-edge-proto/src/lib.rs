//! # OI4 Edge Protocol
//!
//! Wire protocol of the OI4 message bus.
//!
//! ## Topics
//!
//! Topic scheme:
//! `Oi4/{serviceType}/{publisher}/{method}/{resource}[/{source}[/{category}][/{filter}]]`
//! where `publisher` and `source` are four-segment identifiers.
//!
//! ## Messages
//!
//! - `NetworkMessage`: envelope with message id, publisher and class id
//! - `DataSetMessage`: one payload with writer id, timestamp and source

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod messages;
pub mod topics;

pub use envelope::{EnvelopeBuilder, PublicationContent, PublicationMessage};
pub use messages::{DataSetMessage, MessageError, NetworkMessage};
pub use topics::{Topic, TopicError};
