//! Assets managed by an application.

use crate::publication::{PublicationConfig, PublicationSet};
use crate::source::{AssetSource, Source};
use oi4_edge_core::{Oi4Identifier, ResourceType};
use std::sync::Arc;
use std::time::Duration;

/// A device or component published through its application.
#[derive(Debug)]
pub struct Asset {
    source: Arc<AssetSource>,
    publications: PublicationSet,
}

impl Asset {
    pub(crate) fn new(source: Arc<AssetSource>) -> Self {
        Self {
            source,
            publications: PublicationSet::new(),
        }
    }

    /// Identifier of the asset.
    #[must_use]
    pub fn identifier(&self) -> &Oi4Identifier {
        self.source.identifier()
    }

    /// Source backing the asset.
    #[must_use]
    pub fn source(&self) -> &Arc<AssetSource> {
        &self.source
    }

    /// Publications registered for the asset.
    #[must_use]
    pub fn publications(&self) -> &PublicationSet {
        &self.publications
    }

    /// Built-in publications of an asset, `Config` only when set.
    pub(crate) fn builtin_publications(source: &AssetSource, health_interval: Duration) -> Vec<PublicationConfig> {
        let mut builtins = vec![
            PublicationConfig::health(health_interval),
            PublicationConfig::mam(),
            PublicationConfig::resource(ResourceType::ReferenceDesignation),
        ];
        if source.profile().supports(ResourceType::Config) {
            builtins.push(PublicationConfig::resource(ResourceType::Config));
        }
        builtins.push(PublicationConfig::resource(ResourceType::PublicationList));
        builtins.push(PublicationConfig::profile());
        builtins
    }
}
