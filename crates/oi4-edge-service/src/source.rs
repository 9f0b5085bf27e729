//! Sources: the application itself and its assets.
//!
//! A source owns the current state of its resources and answers
//! [`Source::get`] for every [`ResourceType`]. Mutations notify the owning
//! application so matching publications are triggered.

use oi4_edge_core::model::{
    Health, License, LicenseText, MasterAssetModel, Profile, PublicationListEntry, PublishConfig,
    ReferenceDesignation, RtLicense, SubscriptionListEntry,
};
use oi4_edge_core::{Filter, Oi4Identifier, ResourceType};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Callback computing the current health on demand.
pub type HealthFn = Box<dyn Fn() -> Health + Send + Sync>;

/// Callback computing data payloads on demand.
pub type DataFn = Box<dyn Fn(Option<&Filter>) -> Vec<Value> + Send + Sync>;

/// Receiver of source notifications, implemented by the application.
pub trait SourceOwner: Send + Sync {
    /// A resource of `source` changed.
    fn resource_changed(&self, resource: ResourceType, source: &Oi4Identifier, filter: Option<&Filter>);

    /// Publication list entries registered for `source`.
    fn publication_list(&self, source: &Oi4Identifier) -> Vec<PublicationListEntry>;

    /// Subscription list entries held for `source`.
    fn subscription_list(&self, _source: &Oi4Identifier) -> Vec<SubscriptionListEntry> {
        Vec::new()
    }
}

/// Resource provider consumed by publications.
pub trait Source: Send + Sync {
    /// Identifier of this source.
    fn identifier(&self) -> &Oi4Identifier;

    /// Master asset model of this source.
    fn master_asset_model(&self) -> &MasterAssetModel;

    /// Resources this source supports.
    fn profile(&self) -> Profile;

    /// Current health.
    fn health(&self) -> Health;

    /// Replace the health and notify the owner.
    fn update_health(&self, health: Health);

    /// Data payloads, all tags when `filter` is `None`.
    fn data(&self, filter: Option<&Filter>) -> Vec<Value>;

    /// Store data under `tag` and notify the owner.
    fn update_data(&self, data: Value, tag: Filter);

    /// License text for one license.
    fn license_text(&self, _filter: &Filter) -> Option<LicenseText> {
        None
    }

    /// Filters of all available license texts.
    fn license_text_filters(&self) -> Vec<Filter> {
        Vec::new()
    }

    /// Current payloads of `resource`, possibly empty.
    fn get(&self, resource: ResourceType, filter: Option<&Filter>) -> Vec<Value>;

    /// Attach to an owner. Replaces any previous owner.
    fn attach(&self, owner: Weak<dyn SourceOwner>);

    /// Detach from the owner.
    fn detach(&self);

    /// Same identifier as `other`.
    fn equals(&self, other: &dyn Source) -> bool {
        self.identifier() == other.identifier()
    }
}

/// State shared by both source variants.
struct SourceBase {
    mam: MasterAssetModel,
    identifier: Oi4Identifier,
    health: RwLock<Health>,
    data: RwLock<BTreeMap<Filter, Value>>,
    config: Option<PublishConfig>,
    owner: RwLock<Option<Weak<dyn SourceOwner>>>,
    health_fn: Option<HealthFn>,
    data_fn: Option<DataFn>,
}

impl SourceBase {
    fn new(mam: MasterAssetModel) -> Self {
        Self {
            identifier: mam.identifier(),
            mam,
            health: RwLock::new(Health::normal()),
            data: RwLock::new(BTreeMap::new()),
            config: None,
            owner: RwLock::new(None),
            health_fn: None,
            data_fn: None,
        }
    }

    fn health(&self) -> Health {
        match &self.health_fn {
            Some(health_fn) => health_fn(),
            None => *self.health.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn update_health(&self, health: Health) {
        *self.health.write().unwrap_or_else(PoisonError::into_inner) = health;
        self.notify(ResourceType::Health, None);
    }

    fn data(&self, filter: Option<&Filter>) -> Vec<Value> {
        if let Some(data_fn) = &self.data_fn {
            return data_fn(filter);
        }

        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        match filter {
            Some(filter) => data.get(filter).cloned().into_iter().collect(),
            None => data.values().cloned().collect(),
        }
    }

    fn update_data(&self, value: Value, tag: Filter) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.clone(), value);
        self.notify(ResourceType::Data, Some(&tag));
    }

    fn owner(&self) -> Option<Arc<dyn SourceOwner>> {
        self.owner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn attach(&self, owner: Weak<dyn SourceOwner>) {
        *self.owner.write().unwrap_or_else(PoisonError::into_inner) = Some(owner);
    }

    fn detach(&self) {
        *self.owner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn notify(&self, resource: ResourceType, filter: Option<&Filter>) {
        match self.owner() {
            Some(owner) => owner.resource_changed(resource, &self.identifier, filter),
            None => tracing::trace!(resource = %resource, source = %self.identifier, "No owner attached"),
        }
    }

    /// Answers for resources every source provides the same way.
    ///
    /// `None` means the resource is variant specific.
    fn get_common(&self, resource: ResourceType, filter: Option<&Filter>, profile: Profile) -> Option<Vec<Value>> {
        let content = match resource {
            ResourceType::Mam => to_payload(&self.mam).into_iter().collect(),
            ResourceType::Health => to_payload(&self.health()).into_iter().collect(),
            ResourceType::Data => self.data(filter),
            ResourceType::Profile => to_payload(&profile).into_iter().collect(),
            ResourceType::Config => self.config.as_ref().and_then(to_payload).into_iter().collect(),
            ResourceType::PublicationList => self
                .owner()
                .map(|owner| owner.publication_list(&self.identifier))
                .unwrap_or_default()
                .iter()
                .filter_map(to_payload)
                .collect(),
            ResourceType::SubscriptionList => self
                .owner()
                .map(|owner| owner.subscription_list(&self.identifier))
                .unwrap_or_default()
                .iter()
                .filter_map(to_payload)
                .collect(),
            _ => return None,
        };
        Some(content)
    }
}

impl std::fmt::Debug for SourceBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBase")
            .field("identifier", &self.identifier.to_wire_string())
            .field("health", &self.health())
            .field("config", &self.config.is_some())
            .field("health_fn", &self.health_fn.is_some())
            .field("data_fn", &self.data_fn.is_some())
            .finish_non_exhaustive()
    }
}

fn to_payload<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value)
        .map_err(|e| tracing::warn!(error = %e, "Failed to serialize resource payload"))
        .ok()
}

/// Source describing the application itself.
///
/// Provides MAM, Health, License, LicenseText, PublicationList,
/// SubscriptionList and Profile in addition to Data. Config and RtLicense
/// are provided once set.
#[derive(Debug)]
pub struct ApplicationSource {
    base: SourceBase,
    license: License,
    license_texts: BTreeMap<Filter, LicenseText>,
    rt_license: Option<RtLicense>,
}

impl ApplicationSource {
    /// Create an application source from its master asset model.
    #[must_use]
    pub fn new(mam: MasterAssetModel) -> Self {
        Self {
            base: SourceBase::new(mam),
            license: License::default(),
            license_texts: BTreeMap::new(),
            rt_license: None,
        }
    }

    /// Set the license overview.
    #[must_use]
    pub fn with_license(mut self, license: License) -> Self {
        self.license = license;
        self
    }

    /// Add a license text under `filter` (e.g. a license id or language).
    #[must_use]
    pub fn with_license_text(mut self, filter: impl Into<Filter>, text: impl Into<String>) -> Self {
        self.license_texts
            .insert(filter.into(), LicenseText { text: text.into() });
        self
    }

    /// Set the runtime license.
    #[must_use]
    pub fn with_rt_license(mut self, rt_license: RtLicense) -> Self {
        self.rt_license = Some(rt_license);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PublishConfig) -> Self {
        self.base.config = Some(config);
        self
    }

    /// Compute health on demand instead of storing it.
    #[must_use]
    pub fn with_health_fn(mut self, health_fn: HealthFn) -> Self {
        self.base.health_fn = Some(health_fn);
        self
    }

    /// Compute data on demand instead of storing it.
    #[must_use]
    pub fn with_data_fn(mut self, data_fn: DataFn) -> Self {
        self.base.data_fn = Some(data_fn);
        self
    }

    /// License overview.
    #[must_use]
    pub fn license(&self) -> &License {
        &self.license
    }
}

impl Source for ApplicationSource {
    fn identifier(&self) -> &Oi4Identifier {
        &self.base.identifier
    }

    fn master_asset_model(&self) -> &MasterAssetModel {
        &self.base.mam
    }

    fn profile(&self) -> Profile {
        let mut profile = Profile::application();
        if self.base.config.is_some() {
            profile = profile.with(ResourceType::Config);
        }
        if self.rt_license.is_some() {
            profile = profile.with(ResourceType::RtLicense);
        }
        profile
    }

    fn health(&self) -> Health {
        self.base.health()
    }

    fn update_health(&self, health: Health) {
        self.base.update_health(health);
    }

    fn data(&self, filter: Option<&Filter>) -> Vec<Value> {
        self.base.data(filter)
    }

    fn update_data(&self, data: Value, tag: Filter) {
        self.base.update_data(data, tag);
    }

    fn license_text(&self, filter: &Filter) -> Option<LicenseText> {
        self.license_texts.get(filter).cloned()
    }

    fn license_text_filters(&self) -> Vec<Filter> {
        self.license_texts.keys().cloned().collect()
    }

    fn get(&self, resource: ResourceType, filter: Option<&Filter>) -> Vec<Value> {
        if let Some(content) = self.base.get_common(resource, filter, self.profile()) {
            return content;
        }

        match resource {
            ResourceType::License => to_payload(&self.license).into_iter().collect(),
            ResourceType::RtLicense => self.rt_license.as_ref().and_then(to_payload).into_iter().collect(),
            ResourceType::LicenseText => match filter {
                Some(filter) => self
                    .license_text(filter)
                    .as_ref()
                    .and_then(to_payload)
                    .into_iter()
                    .collect(),
                None => self.license_texts.values().filter_map(to_payload).collect(),
            },
            _ => Vec::new(),
        }
    }

    fn attach(&self, owner: Weak<dyn SourceOwner>) {
        self.base.attach(owner);
    }

    fn detach(&self) {
        self.base.detach();
    }
}

/// Source describing an asset (device) managed by the application.
#[derive(Debug)]
pub struct AssetSource {
    base: SourceBase,
    reference_designation: Option<ReferenceDesignation>,
}

impl AssetSource {
    /// Create an asset source from its master asset model.
    #[must_use]
    pub fn new(mam: MasterAssetModel) -> Self {
        Self {
            base: SourceBase::new(mam),
            reference_designation: None,
        }
    }

    /// Set the reference designation.
    #[must_use]
    pub fn with_reference_designation(mut self, designation: ReferenceDesignation) -> Self {
        self.reference_designation = Some(designation);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PublishConfig) -> Self {
        self.base.config = Some(config);
        self
    }

    /// Compute health on demand instead of storing it.
    #[must_use]
    pub fn with_health_fn(mut self, health_fn: HealthFn) -> Self {
        self.base.health_fn = Some(health_fn);
        self
    }

    /// Compute data on demand instead of storing it.
    #[must_use]
    pub fn with_data_fn(mut self, data_fn: DataFn) -> Self {
        self.base.data_fn = Some(data_fn);
        self
    }
}

impl Source for AssetSource {
    fn identifier(&self) -> &Oi4Identifier {
        &self.base.identifier
    }

    fn master_asset_model(&self) -> &MasterAssetModel {
        &self.base.mam
    }

    fn profile(&self) -> Profile {
        if self.base.config.is_some() {
            Profile::device().with(ResourceType::Config)
        } else {
            Profile::device()
        }
    }

    fn health(&self) -> Health {
        self.base.health()
    }

    fn update_health(&self, health: Health) {
        self.base.update_health(health);
    }

    fn data(&self, filter: Option<&Filter>) -> Vec<Value> {
        self.base.data(filter)
    }

    fn update_data(&self, data: Value, tag: Filter) {
        self.base.update_data(data, tag);
    }

    fn get(&self, resource: ResourceType, filter: Option<&Filter>) -> Vec<Value> {
        if let Some(content) = self.base.get_common(resource, filter, self.profile()) {
            return content;
        }

        match resource {
            ResourceType::ReferenceDesignation => self
                .reference_designation
                .as_ref()
                .and_then(to_payload)
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    fn attach(&self, owner: Weak<dyn SourceOwner>) {
        self.base.attach(owner);
    }

    fn detach(&self) {
        self.base.detach();
    }
}
