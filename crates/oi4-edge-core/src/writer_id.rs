//! Stable `DataSetWriterId` per publication stream.
//!
//! A stream is identified by `(resource, source)`. `PublicationList` and
//! `SubscriptionList` are application-wide streams and share one id per
//! resource regardless of the source. Ids are handed out in allocation order
//! starting at [`FIRST_WRITER_ID`]; `0..FIRST_WRITER_ID` is reserved.

use crate::identifier::Oi4Identifier;
use crate::types::ResourceType;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// First id handed out by a fresh registry.
pub const FIRST_WRITER_ID: u16 = 10;

/// Source key used for resources that ignore the source.
const SHARED_SOURCE: &str = "NA";

#[derive(Debug)]
struct Table {
    next: Option<u16>,
    ids: HashMap<(ResourceType, String), u16>,
}

/// Registry mapping streams to writer ids. Entries never expire.
#[derive(Debug)]
pub struct WriterIdRegistry {
    table: RwLock<Table>,
}

impl WriterIdRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table {
                next: Some(FIRST_WRITER_ID),
                ids: HashMap::new(),
            }),
        }
    }

    /// Writer id of the `(resource, source)` stream, allocating on first use.
    ///
    /// # Errors
    ///
    /// Returns [`WriterIdError::Exhausted`] once all `u16` ids are in use.
    pub fn writer_id(
        &self,
        resource: ResourceType,
        source: &Oi4Identifier,
    ) -> Result<u16, WriterIdError> {
        let key = stream_key(resource, source);

        {
            let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(id) = table.ids.get(&key) {
                return Ok(*id);
            }
        }

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have allocated between the two locks.
        if let Some(id) = table.ids.get(&key) {
            return Ok(*id);
        }

        let id = table.next.ok_or(WriterIdError::Exhausted)?;
        table.next = id.checked_add(1);
        tracing::debug!(resource = %resource, source = %key.1, writer_id = id, "Allocated writer id");
        table.ids.insert(key, id);
        Ok(id)
    }

    /// Number of allocated streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .len()
    }

    /// Whether no stream has been allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WriterIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn stream_key(resource: ResourceType, source: &Oi4Identifier) -> (ResourceType, String) {
    let source = match resource {
        ResourceType::PublicationList | ResourceType::SubscriptionList => SHARED_SOURCE.to_string(),
        _ => source.to_wire_string(),
    };
    (resource, source)
}

/// Errors that can occur allocating writer ids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriterIdError {
    /// No unused writer id left
    #[error("writer id space exhausted")]
    Exhausted,
}
