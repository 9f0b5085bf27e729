//! # OI4 Edge Service
//!
//! Runtime of an OI4 edge application.
//!
//! ## Architecture
//!
//! - **Sources** hold resource state (MAM, health, data, licenses) and notify
//!   their owning application on change
//! - **Publications** bind a source resource to a delivery mode; interval
//!   publications are driven by one shared **scheduler** with a bounded
//!   worker pool
//! - The **application** owns sources, assets, publications and
//!   **subscriptions**, answers and sends Get requests and publishes
//!   envelopes through a **transport**

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod application;
pub mod asset;
pub mod config;
pub mod publication;
pub mod scheduler;
pub mod source;
pub mod subscription;
pub mod transport;

pub use application::{Application, ApplicationConfig, ApplicationError};
pub use asset::Asset;
pub use config::AgentConfig;
pub use publication::{Publication, PublicationConfig, PublicationError, PublicationSet, Trigger};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
pub use source::{ApplicationSource, AssetSource, Source, SourceOwner};
pub use subscription::{Subscription, SubscriptionHandler, SubscriptionSet};
pub use transport::{MessageHandler, MqttConfig, MqttTransport, Transport, TransportError};
