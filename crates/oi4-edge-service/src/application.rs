//! The publishing application.
//!
//! An [`Application`] owns its source, its assets, every publication and
//! subscription, one scheduler and the envelope builder. It answers Get
//! requests from the bus, sends its own Get requests and publishes triggered
//! content through the [`Transport`].

use crate::asset::Asset;
use crate::publication::{
    Publication, PublicationConfig, PublicationError, PublicationSet, PublicationSink, Trigger,
    HEALTH_INTERVAL,
};
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerError};
use crate::source::{ApplicationSource, AssetSource, Source, SourceOwner};
use crate::subscription::{Subscription, SubscriptionSet};
use crate::transport::{MessageHandler, Transport, TransportError};
use oi4_edge_core::model::{Health, HealthState, PublicationListEntry, SubscriptionListEntry};
use oi4_edge_core::{
    Addressing, Filter, MessageIdGenerator, MethodType, Oi4Identifier, ResourceType, ServiceType,
    StatusCode, WriterIdRegistry,
};
use oi4_edge_proto::{
    EnvelopeBuilder, MessageError, NetworkMessage, PublicationContent, PublicationMessage, Topic,
};
use rumqttc::QoS;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Interval scheduler tuning
    pub scheduler: SchedulerConfig,
    /// Interval of the built-in health publications
    pub health_interval: Duration,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            health_interval: HEALTH_INTERVAL,
        }
    }
}

/// An OI4 application publishing its own resources and those of its assets.
pub struct Application {
    service_type: ServiceType,
    source: Arc<ApplicationSource>,
    config: ApplicationConfig,
    publications: PublicationSet,
    subscriptions: SubscriptionSet,
    assets: RwLock<HashMap<String, Arc<Asset>>>,
    scheduler: Scheduler,
    envelopes: EnvelopeBuilder,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    started: AtomicBool,
    this: Weak<Application>,
}

impl Application {
    /// Create an application over `source` and register its built-in
    /// publications.
    ///
    /// # Errors
    ///
    /// Returns error if a built-in publication fails validation, e.g. a
    /// license text registered under an empty filter.
    pub fn new(
        service_type: ServiceType,
        source: ApplicationSource,
        config: ApplicationConfig,
    ) -> Result<Arc<Self>, ApplicationError> {
        let source = Arc::new(source);
        let application = Arc::new_cyclic(|this: &Weak<Self>| Self {
            service_type,
            source: Arc::clone(&source),
            scheduler: Scheduler::new(config.scheduler.clone()),
            config,
            publications: PublicationSet::new(),
            subscriptions: SubscriptionSet::new(),
            assets: RwLock::new(HashMap::new()),
            envelopes: EnvelopeBuilder::new(
                Arc::new(WriterIdRegistry::new()),
                Arc::new(MessageIdGenerator::new()),
            ),
            transport: RwLock::new(None),
            started: AtomicBool::new(false),
            this: this.clone(),
        });

        let owner: Weak<dyn SourceOwner> = application.this.clone();
        source.attach(owner);

        let profile = source.profile();
        let mut builtins = vec![
            PublicationConfig::health(application.config.health_interval),
            PublicationConfig::mam(),
            PublicationConfig::resource(ResourceType::License),
        ];
        builtins.extend(
            source
                .license_text_filters()
                .into_iter()
                .map(|filter| PublicationConfig::resource_with_filter(ResourceType::LicenseText, filter)),
        );
        for optional in [ResourceType::RtLicense, ResourceType::Config] {
            if profile.supports(optional) {
                builtins.push(PublicationConfig::resource(optional));
            }
        }
        builtins.push(PublicationConfig::resource(ResourceType::PublicationList));
        builtins.push(PublicationConfig::resource(ResourceType::SubscriptionList));
        builtins.push(PublicationConfig::profile());

        for config in builtins {
            application.register_publication(config)?;
        }

        tracing::debug!(
            application = %application.identifier(),
            service_type = %service_type,
            "Application created"
        );
        Ok(application)
    }

    /// Identifier of the application.
    #[must_use]
    pub fn identifier(&self) -> &Oi4Identifier {
        self.source.identifier()
    }

    /// Service type of the application.
    #[must_use]
    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// Source of the application.
    #[must_use]
    pub fn source(&self) -> &Arc<ApplicationSource> {
        &self.source
    }

    /// `PublisherId` used in outbound envelopes.
    #[must_use]
    pub fn publisher_id(&self) -> String {
        EnvelopeBuilder::publisher_id(self.service_type, self.identifier())
    }

    /// Whether the application is started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Connect to the bus: subscribe to Get requests and every registered
    /// subscription, start the scheduler and all publications. Starting
    /// twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if a subscription fails or no tokio runtime is
    /// available. Subscriptions made so far are undone.
    pub fn start(&self, transport: Arc<dyn Transport>) -> Result<(), ApplicationError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        *self.transport.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&transport));

        let mut subscribed = Vec::new();
        if let Err(e) = self.connect(transport.as_ref(), &mut subscribed) {
            for filter in &subscribed {
                if let Err(e) = transport.unsubscribe(filter) {
                    tracing::warn!(error = %e, topic = %filter, "Failed to undo subscription");
                }
            }
            *self.transport.write().unwrap_or_else(PoisonError::into_inner) = None;
            self.started.store(false, Ordering::Release);
            return Err(e);
        }

        for publication in self.all_publications() {
            self.start_publication(&publication);
        }

        tracing::info!(
            application = %self.identifier(),
            service_type = %self.service_type,
            subscriptions = subscribed.len(),
            "Application started"
        );
        Ok(())
    }

    /// Stop all publications and the scheduler, announce a graceful
    /// shutdown with a final health message and drop all subscriptions.
    /// Stopping twice is a no-op.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }

        for publication in self.all_publications() {
            publication.stop(&self.scheduler);
        }
        self.scheduler.stop();

        let shutdown = Health::new(HealthState::Normal, 0);
        match serde_json::to_value(shutdown) {
            Ok(payload) => self.send(PublicationMessage {
                resource: ResourceType::Health,
                source: self.identifier().clone(),
                filter: None,
                correlation_id: None,
                addressing: Addressing::ApplicationSource,
                content: vec![PublicationContent {
                    status: Some(StatusCode::GOOD),
                    payload,
                }],
            }),
            Err(e) => tracing::warn!(error = %e, "Failed to encode shutdown health"),
        }

        if let Some(transport) = self.transport() {
            let filters = std::iter::once(self.get_request_filter()).chain(
                self.subscriptions
                    .all()
                    .into_iter()
                    .map(|subscription| subscription.topic().to_string()),
            );
            for filter in filters {
                if let Err(e) = transport.unsubscribe(&filter) {
                    tracing::warn!(error = %e, topic = %filter, "Failed to unsubscribe");
                }
            }
        }

        tracing::info!(application = %self.identifier(), "Application stopped");
    }

    /// Register a publication of the application's own source.
    ///
    /// A publication with the same resource and filter is replaced and
    /// stopped. The new one starts at once if the application is started.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn register_publication(
        &self,
        config: PublicationConfig,
    ) -> Result<Arc<Publication>, ApplicationError> {
        let source: Arc<dyn Source> = Arc::clone(&self.source) as Arc<dyn Source>;
        self.register_into(&self.publications, source, config)
    }

    /// Register a publication of an asset.
    ///
    /// # Errors
    ///
    /// Returns error if the asset is unknown or the configuration is invalid.
    pub fn register_asset_publication(
        &self,
        asset: &Oi4Identifier,
        config: PublicationConfig,
    ) -> Result<Arc<Publication>, ApplicationError> {
        let asset = self
            .asset(asset)
            .ok_or_else(|| ApplicationError::UnknownAsset(asset.to_wire_string()))?;
        let source: Arc<dyn Source> = Arc::clone(asset.source()) as Arc<dyn Source>;
        self.register_into(asset.publications(), source, config)
    }

    /// Publications of the application's own source.
    #[must_use]
    pub fn publications(&self) -> Vec<Arc<Publication>> {
        self.publications.all()
    }

    /// Publication of the application's own source with exactly this
    /// resource and filter.
    #[must_use]
    pub fn publication(&self, resource: ResourceType, filter: Option<&Filter>) -> Option<Arc<Publication>> {
        self.publications.get(resource, filter)
    }

    /// Register a subscription, replacing one with the same topic.
    ///
    /// While started, the topic is subscribed at once and the updated
    /// `SubscriptionList` is published.
    ///
    /// # Errors
    ///
    /// Returns error if the transport rejects the subscription; it is then
    /// not registered.
    pub fn register_subscription(
        &self,
        subscription: Subscription,
    ) -> Result<Arc<Subscription>, ApplicationError> {
        let subscription = Arc::new(subscription);
        let replaced = self.subscriptions.insert(Arc::clone(&subscription));

        if let Some(transport) = self.started_transport() {
            if replaced.is_some() {
                if let Err(e) = transport.unsubscribe(subscription.topic()) {
                    tracing::warn!(error = %e, topic = subscription.topic(), "Failed to unsubscribe");
                }
            }
            if let Err(e) = transport.subscribe(
                subscription.topic(),
                subscription.qos(),
                self.subscription_handler(&subscription),
            ) {
                self.subscriptions.remove(subscription.topic());
                return Err(e.into());
            }
            self.subscriptions_changed();
        }

        tracing::debug!(topic = subscription.topic(), "Subscription registered");
        Ok(subscription)
    }

    /// Remove the subscription of `topic`.
    pub fn remove_subscription(&self, topic: &str) -> Option<Arc<Subscription>> {
        let removed = self.subscriptions.remove(topic)?;

        if let Some(transport) = self.started_transport() {
            if let Err(e) = transport.unsubscribe(topic) {
                tracing::warn!(error = %e, topic, "Failed to unsubscribe");
            }
            self.subscriptions_changed();
        }

        tracing::debug!(topic, "Subscription removed");
        Some(removed)
    }

    /// Registered subscriptions, ordered by topic.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Arc<Subscription>> {
        self.subscriptions.all()
    }

    /// Publish a Get request on `topic` and return its message id.
    ///
    /// Answers carry the id as `CorrelationId`; receive them with a
    /// [`Subscription`] to the Pub topics of the requested application.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a Get topic, the application is not
    /// started or the publish fails.
    pub fn send_get(&self, topic: &Topic, filter: Option<&Filter>) -> Result<String, ApplicationError> {
        if topic.method != MethodType::Get {
            return Err(ApplicationError::NotAGetRequest(topic.method));
        }
        let transport = self.started_transport().ok_or(ApplicationError::NotStarted)?;

        let request = self
            .envelopes
            .build_get(self.identifier(), self.service_type, topic, filter);
        let payload = request.to_json()?;
        let topic = topic.to_string();
        transport.publish(&topic, payload)?;

        tracing::debug!(topic = %topic, message_id = %request.message_id, "Sent Get request");
        Ok(request.message_id)
    }

    /// Add an asset with its built-in publications.
    ///
    /// An asset with the same identifier is replaced.
    ///
    /// # Errors
    ///
    /// Returns error if a built-in publication fails validation.
    pub fn register_asset(&self, source: AssetSource) -> Result<Arc<Asset>, ApplicationError> {
        let source = Arc::new(source);
        let asset = Arc::new(Asset::new(Arc::clone(&source)));

        for config in Asset::builtin_publications(&source, self.config.health_interval) {
            let publication = Publication::build(
                config,
                Arc::clone(&source) as Arc<dyn Source>,
                self.envelopes.writer_ids(),
            )?;
            asset.publications().insert(publication);
        }

        let owner: Weak<dyn SourceOwner> = self.this.clone();
        source.attach(owner);

        let replaced = self
            .assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset.identifier().to_wire_string(), Arc::clone(&asset));
        if let Some(replaced) = replaced {
            self.retire_asset(&replaced);
        }

        if self.is_started() {
            for publication in asset.publications().all() {
                self.start_publication(&publication);
            }
        }

        tracing::info!(asset = %asset.identifier(), "Asset registered");
        Ok(asset)
    }

    /// Remove an asset and stop its publications.
    pub fn remove_asset(&self, identifier: &Oi4Identifier) -> Option<Arc<Asset>> {
        let removed = self
            .assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&identifier.to_wire_string())?;
        self.retire_asset(&removed);

        tracing::info!(asset = %identifier, "Asset removed");
        Some(removed)
    }

    /// Asset with this identifier.
    #[must_use]
    pub fn asset(&self, identifier: &Oi4Identifier) -> Option<Arc<Asset>> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&identifier.to_wire_string())
            .cloned()
    }

    /// All registered assets.
    #[must_use]
    pub fn assets(&self) -> Vec<Arc<Asset>> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Update the application's health and publish it.
    pub fn update_health(&self, health: Health) {
        self.source.update_health(health);
    }

    /// Handle an inbound bus message.
    ///
    /// Malformed payloads and topics are logged and dropped. Only Get
    /// requests from other applications are answered.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) {
        let Some((parsed, message)) = self.decode_inbound(topic, payload, true) else {
            return;
        };
        if parsed.method != MethodType::Get {
            tracing::debug!(topic, method = %parsed.method, "Ignoring unsupported method");
            return;
        }

        let filter = message
            .first_filter()
            .filter(|f| !f.is_empty())
            .map(Filter::from)
            .or(parsed.filter);
        let correlation_id = Some(message.message_id).filter(|id| !id.is_empty());

        let sources = match parsed.source {
            Some(source) => vec![source],
            None => {
                let mut sources = vec![self.identifier().clone()];
                sources.extend(self.assets().iter().map(|asset| asset.identifier().clone()));
                sources
            }
        };

        tracing::debug!(
            topic,
            resource = %parsed.resource,
            sources = sources.len(),
            "Answering Get request"
        );

        for source in &sources {
            self.trigger_publications(
                source,
                parsed.resource,
                filter.as_ref(),
                Trigger::OnRequest,
                correlation_id.clone(),
            );
        }
    }

    /// Trigger the publications of `source` for `resource`, all of them
    /// without a filter. Returns how many produced a message.
    pub fn trigger_publications(
        &self,
        source: &Oi4Identifier,
        resource: ResourceType,
        filter: Option<&Filter>,
        trigger: Trigger,
        correlation_id: Option<String>,
    ) -> usize {
        let publications = if self.is_own_source(source) {
            self.publications.find(resource, filter)
        } else if let Some(asset) = self.asset(source) {
            asset.publications().find(resource, filter)
        } else {
            tracing::debug!(source = %source, "No such source");
            return 0;
        };

        publications
            .iter()
            .filter(|publication| publication.trigger(trigger, correlation_id.clone()))
            .count()
    }

    fn register_into(
        &self,
        set: &PublicationSet,
        source: Arc<dyn Source>,
        config: PublicationConfig,
    ) -> Result<Arc<Publication>, ApplicationError> {
        let publication = Publication::build(config, source, self.envelopes.writer_ids())?;

        if let Some(replaced) = set.insert(Arc::clone(&publication)) {
            replaced.stop(&self.scheduler);
        }
        if self.is_started() {
            self.start_publication(&publication);
        }

        tracing::debug!(
            resource = %publication.resource(),
            source = %publication.source().identifier(),
            writer_id = publication.writer_id(),
            "Publication registered"
        );
        Ok(publication)
    }

    /// Parse an inbound message, dropping malformed ones and, if
    /// `skip_own`, those of this application.
    fn decode_inbound(&self, topic: &str, payload: &[u8], skip_own: bool) -> Option<(Topic, NetworkMessage)> {
        let message = match NetworkMessage::from_json(payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, topic, "Dropping message with invalid payload");
                return None;
            }
        };
        let parsed = match Topic::parse(topic) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, topic, "Dropping message with invalid topic");
                return None;
            }
        };

        let own = message.publisher_id == self.publisher_id()
            || (parsed.method == MethodType::Pub
                && parsed.has_same_application(self.service_type, self.identifier()));
        if skip_own && own {
            tracing::trace!(topic, "Skipping own message");
            return None;
        }
        Some((parsed, message))
    }

    fn get_request_filter(&self) -> String {
        Topic::get_request_filter(self.service_type, self.identifier())
    }

    fn connect(&self, transport: &dyn Transport, subscribed: &mut Vec<String>) -> Result<(), ApplicationError> {
        let this = self.this.clone();
        let handler: MessageHandler = Arc::new(move |topic: &str, payload: &[u8]| {
            if let Some(application) = this.upgrade() {
                application.handle_message(topic, payload);
            }
        });
        let filter = self.get_request_filter();
        transport.subscribe(&filter, QoS::AtLeastOnce, handler)?;
        subscribed.push(filter);

        for subscription in self.subscriptions.all() {
            transport.subscribe(
                subscription.topic(),
                subscription.qos(),
                self.subscription_handler(&subscription),
            )?;
            subscribed.push(subscription.topic().to_string());
        }

        self.scheduler.start()?;
        Ok(())
    }

    fn subscription_handler(&self, subscription: &Arc<Subscription>) -> MessageHandler {
        let this = self.this.clone();
        let subscription = Arc::clone(subscription);
        Arc::new(move |topic: &str, payload: &[u8]| {
            let Some(application) = this.upgrade() else {
                return;
            };
            if let Some((topic, message)) =
                application.decode_inbound(topic, payload, subscription.skips_own_messages())
            {
                (subscription.handler())(&topic, &message);
            }
        })
    }

    fn subscriptions_changed(&self) {
        self.trigger_publications(
            self.identifier(),
            ResourceType::SubscriptionList,
            None,
            Trigger::OnRequest,
            None,
        );
    }

    fn is_own_source(&self, source: &Oi4Identifier) -> bool {
        source.to_wire_string() == self.identifier().to_wire_string()
    }

    fn started_transport(&self) -> Option<Arc<dyn Transport>> {
        if self.is_started() {
            self.transport()
        } else {
            None
        }
    }

    fn start_publication(&self, publication: &Arc<Publication>) {
        let sink: Weak<dyn PublicationSink> = self.this.clone();
        publication.start(sink, &self.scheduler);
    }

    fn retire_asset(&self, asset: &Asset) {
        for publication in asset.publications().drain() {
            publication.stop(&self.scheduler);
        }
        asset.source().detach();
    }

    fn all_publications(&self) -> Vec<Arc<Publication>> {
        let mut publications = self.publications.all();
        for asset in self.assets() {
            publications.extend(asset.publications().all());
        }
        publications
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PublicationSink for Application {
    fn send(&self, message: PublicationMessage) {
        let Some(transport) = self.transport() else {
            tracing::debug!(resource = %message.resource, "No transport, dropping publication");
            return;
        };

        let network = match self
            .envelopes
            .build(self.identifier(), self.service_type, &message)
        {
            Ok(Some(network)) => network,
            Ok(None) => {
                tracing::debug!(resource = %message.resource, "Nothing to publish");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, resource = %message.resource, "Failed to build message");
                return;
            }
        };

        let mut topic = Topic::new(
            self.service_type,
            self.identifier().clone(),
            MethodType::Pub,
            message.resource,
        );
        if message.addressing.includes_source() {
            topic = topic.with_source(message.source.clone());
        }
        if let Some(filter) = message.filter.as_ref().filter(|_| message.addressing.includes_filter()) {
            if message.addressing.includes_source() {
                topic = topic.with_filter(filter.clone());
            } else {
                tracing::debug!(
                    resource = %message.resource,
                    filter = %filter,
                    "Filter needs a source segment, sent in the payload only"
                );
            }
        }
        let topic = topic.to_string();

        let payload = match network.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, topic, "Failed to encode message");
                return;
            }
        };

        match transport.publish(&topic, payload) {
            Ok(()) => tracing::debug!(
                topic,
                resource = %message.resource,
                messages = network.messages.len(),
                "Published"
            ),
            Err(e) => tracing::warn!(error = %e, topic, "Failed to publish"),
        }
    }
}

impl SourceOwner for Application {
    fn resource_changed(&self, resource: ResourceType, source: &Oi4Identifier, filter: Option<&Filter>) {
        self.trigger_publications(source, resource, filter, Trigger::OnRequest, None);
    }

    fn publication_list(&self, source: &Oi4Identifier) -> Vec<PublicationListEntry> {
        let publications = if self.is_own_source(source) {
            self.publications.all()
        } else {
            self.asset(source)
                .map(|asset| asset.publications().all())
                .unwrap_or_default()
        };

        let mut entries: Vec<_> = publications.iter().map(|p| p.list_entry()).collect();
        entries.sort_by_key(|entry| (entry.data_set_writer_id, entry.filter.clone()));
        entries
    }

    fn subscription_list(&self, source: &Oi4Identifier) -> Vec<SubscriptionListEntry> {
        if !self.is_own_source(source) {
            return Vec::new();
        }
        self.subscriptions
            .all()
            .iter()
            .map(|subscription| subscription.list_entry())
            .collect()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("service_type", &self.service_type)
            .field("identifier", &self.identifier().to_wire_string())
            .field("started", &self.is_started())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Errors for application operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApplicationError {
    /// Publication configuration rejected
    #[error("publication error: {0}")]
    Publication(#[from] PublicationError),
    /// Transport call failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Scheduler could not start
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
    /// No asset with this identifier
    #[error("unknown asset: {0}")]
    UnknownAsset(String),
    /// Operation needs a started application
    #[error("application is not started")]
    NotStarted,
    /// Topic of a Get request has another method
    #[error("not a Get topic: {0}")]
    NotAGetRequest(MethodType),
    /// Envelope could not be encoded
    #[error("message error: {0}")]
    Message(#[from] MessageError),
}
