//! Bookkeeping shared by every decoder variant.

use orca_buffers::BufferLibrary;
use orca_core::{ChannelKey, ChannelSchema, SchemaError, SchemaMap, SchemaView};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Schema map plus per-instance skip counters.
#[derive(Debug, Clone)]
pub(crate) struct DecoderState {
    name: &'static str,
    schemas: Option<SchemaMap>,
    skipped: BTreeMap<ChannelKey, u64>,
}

impl DecoderState {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            schemas: None,
            skipped: BTreeMap::new(),
        }
    }

    /// Replace the schema map; skip counters from a previous run are dropped.
    pub(crate) fn install(&mut self, schemas: SchemaMap) -> usize {
        let count = schemas.len();
        self.schemas = Some(schemas);
        self.skipped.clear();
        count
    }

    pub(crate) fn schemas(&self) -> Result<&SchemaMap, SchemaError> {
        self.schemas
            .as_ref()
            .ok_or(SchemaError::SchemaNotBuilt { decoder: self.name })
    }

    pub(crate) fn key_list(&self) -> Result<Vec<ChannelKey>, SchemaError> {
        Ok(self.schemas()?.keys().copied().collect())
    }

    pub(crate) fn schema(&self, key: Option<ChannelKey>) -> Result<SchemaView<'_>, SchemaError> {
        let schemas = self.schemas()?;
        match key {
            None => Ok(SchemaView::All(schemas)),
            Some(key) => schemas
                .get(&key)
                .map(SchemaView::Channel)
                .ok_or(SchemaError::UnknownChannelKey {
                    decoder: self.name,
                    key,
                }),
        }
    }

    /// Schema for `key` if this run records it.
    ///
    /// A key counts as registered only when it is in the schema map and a
    /// buffer was allocated for it. Anything else is counted as skipped and
    /// logged the first time it is seen.
    pub(crate) fn registered(
        &mut self,
        key: ChannelKey,
        buffers: &BufferLibrary,
    ) -> Result<Option<Arc<ChannelSchema>>, SchemaError> {
        let name = self.name;
        let schemas = self
            .schemas
            .as_ref()
            .ok_or(SchemaError::SchemaNotBuilt { decoder: name })?;
        match schemas.get(&key) {
            Some(schema) if buffers.contains(key) => Ok(Some(Arc::clone(schema))),
            _ => {
                let count = self.skipped.entry(key).or_insert(0);
                if *count == 0 {
                    debug!(
                        decoder = name,
                        key = key.get(),
                        crate_id = key.crate_id(),
                        card = key.card(),
                        channel = key.channel(),
                        "Skipping channel not registered for this run"
                    );
                }
                *count += 1;
                Ok(None)
            }
        }
    }

    pub(crate) fn skipped(&self) -> &BTreeMap<ChannelKey, u64> {
        &self.skipped
    }
}
