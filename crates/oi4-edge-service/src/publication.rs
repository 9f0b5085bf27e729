//! Publications bind a source resource to a delivery mode.
//!
//! A [`PublicationConfig`] is an immutable description assembled with
//! `with_*` setters. [`Publication::build`] validates it, resolves the
//! writer id and freezes it. Interval publications are driven by the
//! [`Scheduler`]; every publication answers on-request triggers.

use crate::scheduler::{ScheduledPublication, Scheduler};
use crate::source::Source;
use oi4_edge_core::model::PublicationListEntry;
use oi4_edge_core::{
    Addressing, Delivery, Filter, PublicationMode, ResourceType, StatusCode, WriterIdError,
    WriterIdRegistry,
};
use oi4_edge_proto::{PublicationContent, PublicationMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default interval of health publications.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// Why a publication is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A Get request or a source change
    OnRequest,
    /// The scheduler found the publication due
    ByInterval,
}

/// Send path of the owning application.
pub trait PublicationSink: Send + Sync {
    /// Deliver a triggered publication message.
    fn send(&self, message: PublicationMessage);
}

/// Immutable description of a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationConfig {
    resource: ResourceType,
    filter: Option<Filter>,
    delivery: Delivery,
    addressing: Option<Addressing>,
    status: Option<StatusCode>,
    publish_on_registration: bool,
    interval: Option<Duration>,
}

impl PublicationConfig {
    /// Publication of `resource`, actively delivered with application and
    /// source addressing.
    #[must_use]
    pub fn resource(resource: ResourceType) -> Self {
        Self {
            resource,
            filter: None,
            delivery: Delivery::Active,
            addressing: None,
            status: None,
            publish_on_registration: false,
            interval: None,
        }
    }

    /// Publication of one filtered instance of `resource`.
    #[must_use]
    pub fn resource_with_filter(resource: ResourceType, filter: impl Into<Filter>) -> Self {
        Self::resource(resource).with_filter(filter)
    }

    /// MAM publication, published once on registration.
    #[must_use]
    pub fn mam() -> Self {
        Self::resource(ResourceType::Mam).with_publish_on_registration(true)
    }

    /// Health publication repeated every `interval`.
    #[must_use]
    pub fn health(interval: Duration) -> Self {
        Self::resource(ResourceType::Health).with_interval(interval)
    }

    /// Profile publication with application addressing.
    #[must_use]
    pub fn profile() -> Self {
        Self::resource(ResourceType::Profile).with_addressing(Addressing::Application)
    }

    /// Set the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Set delivery and addressing from a wire mode.
    ///
    /// `OFF_0` and `ON_REQUEST_1` keep the current addressing.
    #[must_use]
    pub fn with_mode(mut self, mode: PublicationMode) -> Self {
        let (delivery, addressing) = mode.split();
        self.delivery = delivery;
        if addressing.is_some() {
            self.addressing = addressing;
        }
        self
    }

    /// Set the delivery.
    #[must_use]
    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the addressing.
    #[must_use]
    pub fn with_addressing(mut self, addressing: Addressing) -> Self {
        self.addressing = Some(addressing);
        self
    }

    /// Status code attached to every payload.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Publish once when the publication starts.
    #[must_use]
    pub fn with_publish_on_registration(mut self, publish: bool) -> Self {
        self.publish_on_registration = publish;
        self
    }

    /// Publish periodically.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Published resource.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource
    }

    /// Filter, if any.
    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    /// Delivery.
    #[must_use]
    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Effective addressing: explicit, or application and source plus the
    /// filter when one is set.
    #[must_use]
    pub fn addressing(&self) -> Addressing {
        match (self.addressing, &self.filter) {
            (Some(addressing), _) => addressing,
            (None, Some(_)) => Addressing::ApplicationSourceFilter,
            (None, None) => Addressing::ApplicationSource,
        }
    }

    /// Wire mode.
    #[must_use]
    pub fn mode(&self) -> PublicationMode {
        PublicationMode::compose(self.delivery, self.addressing())
    }

    /// Interval, if any.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    fn validate(&self) -> Result<(), PublicationError> {
        if self.interval.is_some_and(|interval| interval.is_zero()) {
            return Err(PublicationError::ZeroInterval);
        }

        let needs_filter = matches!(self.resource, ResourceType::Data | ResourceType::LicenseText);
        if needs_filter && self.filter.as_ref().is_some_and(|f| f.as_str().is_empty()) {
            return Err(PublicationError::EmptyFilter(self.resource));
        }

        Ok(())
    }
}

#[derive(Debug)]
struct IntervalSchedule {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

/// A built publication.
pub struct Publication {
    id: Uuid,
    config: PublicationConfig,
    source: Arc<dyn Source>,
    writer_id: u16,
    schedule: Option<IntervalSchedule>,
    started: AtomicBool,
    sink: RwLock<Option<Weak<dyn PublicationSink>>>,
}

impl Publication {
    /// Validate `config` and bind it to `source`.
    ///
    /// # Errors
    ///
    /// Returns error for a zero interval, an empty filter on Data or
    /// LicenseText, or when no writer id is left.
    pub fn build(
        config: PublicationConfig,
        source: Arc<dyn Source>,
        writer_ids: &WriterIdRegistry,
    ) -> Result<Arc<Self>, PublicationError> {
        config.validate()?;
        let writer_id = writer_ids.writer_id(config.resource, source.identifier())?;

        let schedule = config.interval.map(|interval| IntervalSchedule {
            interval,
            last: Mutex::new(None),
        });

        Ok(Arc::new(Self {
            id: Uuid::new_v4(),
            config,
            source,
            writer_id,
            schedule,
            started: AtomicBool::new(false),
            sink: RwLock::new(None),
        }))
    }

    /// Unique id of this publication.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Frozen configuration.
    #[must_use]
    pub fn config(&self) -> &PublicationConfig {
        &self.config
    }

    /// Published resource.
    #[must_use]
    pub fn resource(&self) -> ResourceType {
        self.config.resource
    }

    /// Filter, if any.
    #[must_use]
    pub fn filter(&self) -> Option<&Filter> {
        self.config.filter.as_ref()
    }

    /// Bound source.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    /// Writer id of this stream.
    #[must_use]
    pub fn writer_id(&self) -> u16 {
        self.writer_id
    }

    /// Whether the publication is started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Time of the last interval publication.
    #[must_use]
    pub fn last_publication(&self) -> Option<Instant> {
        self.schedule
            .as_ref()
            .and_then(|schedule| *schedule.last.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Start delivering through `sink`.
    ///
    /// Publishes once if configured to, and registers interval
    /// publications with `scheduler`. Starting twice is a no-op.
    pub fn start(self: &Arc<Self>, sink: Weak<dyn PublicationSink>, scheduler: &Scheduler) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::debug!(
            resource = %self.config.resource,
            source = %self.source.identifier(),
            writer_id = self.writer_id,
            "Publication started"
        );

        if self.config.publish_on_registration {
            self.trigger(Trigger::OnRequest, None);
        }
        if self.schedule.is_some() {
            let scheduled: Arc<dyn ScheduledPublication> = Arc::clone(self) as Arc<dyn ScheduledPublication>;
            scheduler.add(scheduled);
        }
    }

    /// Stop delivering. Stopping twice is a no-op.
    pub fn stop(&self, scheduler: &Scheduler) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.schedule.is_some() {
            scheduler.remove(self.id);
        }
        tracing::debug!(
            resource = %self.config.resource,
            source = %self.source.identifier(),
            "Publication stopped"
        );
    }

    /// Whether `trigger` leads to a message.
    #[must_use]
    pub fn should_publish(&self, trigger: Trigger) -> bool {
        if !self.is_started() {
            return false;
        }

        match trigger {
            Trigger::OnRequest => true,
            Trigger::ByInterval => {
                self.config.delivery == Delivery::Active && self.schedule.is_some()
            }
        }
    }

    /// Pull the current content from the source and hand it to the sink.
    ///
    /// Returns `false` without side effects when the trigger is not
    /// applicable or no sink is attached. Empty content is still handed over.
    pub fn trigger(&self, trigger: Trigger, correlation_id: Option<String>) -> bool {
        if !self.should_publish(trigger) {
            return false;
        }

        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        let Some(sink) = sink else {
            return false;
        };

        let content = self
            .source
            .get(self.config.resource, self.config.filter.as_ref())
            .into_iter()
            .map(|payload| PublicationContent {
                status: self.config.status,
                payload,
            })
            .collect();

        sink.send(PublicationMessage {
            resource: self.config.resource,
            source: self.source.identifier().clone(),
            filter: self.config.filter.clone(),
            correlation_id,
            addressing: self.config.addressing(),
            content,
        });
        true
    }

    /// Entry describing this publication in the `PublicationList` resource.
    #[must_use]
    pub fn list_entry(&self) -> PublicationListEntry {
        PublicationListEntry {
            resource: self.config.resource,
            source: self.source.identifier().to_wire_string(),
            filter: self.config.filter.as_ref().map(|f| f.as_str().to_string()),
            data_set_writer_id: self.writer_id,
            mode: self.config.mode(),
            interval: self
                .config
                .interval
                .map(|interval| u32::try_from(interval.as_millis()).unwrap_or(u32::MAX)),
            config: None,
        }
    }
}

impl ScheduledPublication for Publication {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_due(&self, now: Instant) -> bool {
        let Some(schedule) = &self.schedule else {
            return false;
        };
        match *schedule.last.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(last) => now.saturating_duration_since(last) >= schedule.interval,
            None => true,
        }
    }

    fn fire(&self) {
        self.trigger(Trigger::ByInterval, None);
        if let Some(schedule) = &self.schedule {
            *schedule.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        }
    }
}

impl std::fmt::Debug for Publication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publication")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("source", &self.source.identifier().to_wire_string())
            .field("writer_id", &self.writer_id)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

/// Publications of one owner keyed by resource and filter.
///
/// Inserting a publication with an existing resource and filter replaces
/// the old one; distinct filters coexist.
#[derive(Debug, Default)]
pub struct PublicationSet {
    by_resource: RwLock<HashMap<ResourceType, Vec<Arc<Publication>>>>,
}

impl PublicationSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `publication`, returning the one it replaces.
    pub fn insert(&self, publication: Arc<Publication>) -> Option<Arc<Publication>> {
        let mut by_resource = self.by_resource.write().unwrap_or_else(PoisonError::into_inner);
        let entries = by_resource.entry(publication.resource()).or_default();

        match entries
            .iter_mut()
            .find(|current| current.filter() == publication.filter())
        {
            Some(slot) => Some(std::mem::replace(slot, publication)),
            None => {
                entries.push(publication);
                None
            }
        }
    }

    /// Publication with exactly this resource and filter.
    #[must_use]
    pub fn get(&self, resource: ResourceType, filter: Option<&Filter>) -> Option<Arc<Publication>> {
        self.by_resource
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&resource)?
            .iter()
            .find(|p| p.filter() == filter)
            .cloned()
    }

    /// Publications of `resource` matching `filter`; all of them without a
    /// filter.
    #[must_use]
    pub fn find(&self, resource: ResourceType, filter: Option<&Filter>) -> Vec<Arc<Publication>> {
        let by_resource = self.by_resource.read().unwrap_or_else(PoisonError::into_inner);
        let Some(entries) = by_resource.get(&resource) else {
            return Vec::new();
        };
        match filter {
            None => entries.clone(),
            Some(filter) => entries
                .iter()
                .filter(|p| p.filter() == Some(filter))
                .cloned()
                .collect(),
        }
    }

    /// All publications.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Publication>> {
        self.by_resource
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    /// Remove and return all publications.
    pub fn drain(&self) -> Vec<Arc<Publication>> {
        self.by_resource
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .flat_map(|(_, entries)| entries)
            .collect()
    }
}

/// Errors that can occur building publications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublicationError {
    /// Interval of zero
    #[error("publication interval must not be zero")]
    ZeroInterval,
    /// Empty filter on a resource addressed by filter
    #[error("{0} publication requires a non-empty filter")]
    EmptyFilter(ResourceType),
    /// Writer id allocation failed
    #[error("writer id error: {0}")]
    WriterId(#[from] WriterIdError),
}
