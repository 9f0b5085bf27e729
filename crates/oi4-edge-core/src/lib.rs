//! # OI4 Edge Core
//!
//! Value types shared by the OI4 edge publication engine.
//!
//! This crate provides:
//! - DNP escaping for identifier parts
//! - OI4 identifiers and their wire form
//! - Closed vocabularies (service, method, resource types, publication modes)
//! - Resource payloads (MAM, Health, License, Profile, ...)
//! - The writer-id registry and the message-id generator

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dnp;
pub mod identifier;
pub mod message_id;
pub mod model;
pub mod types;
pub mod writer_id;

pub use identifier::{IdentifierError, Oi4Identifier};
pub use message_id::MessageIdGenerator;
pub use types::{
    Addressing, Delivery, Filter, MethodType, PublicationMode, ResourceType, ServiceType,
    StatusCode,
};
pub use writer_id::{WriterIdError, WriterIdRegistry};
