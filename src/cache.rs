// Per-document cache of normalized events.
//
// Each entry holds an `Arc` of the full event list extracted from one
// document. A refresh builds a brand-new list and swaps the `Arc`; readers
// holding the previous `Arc` keep a consistent (stale) snapshot, never a
// half-updated one.
use crate::error::EngineError;
use crate::extractor::Extractor;
use crate::model::EventRecord;
use crate::store::DocumentStore;
use std::collections::HashMap;
use std::sync::Arc;

pub type EventList = Arc<Vec<EventRecord>>;

#[derive(Debug, Clone)]
struct SourceEntry {
    events: EventList,
    /// Bumped on every successful refresh.
    revision: u64,
}

#[derive(Debug, Default)]
pub struct SourceCache {
    entries: HashMap<String, SourceEntry>,
    empty: EventList,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-reads `source_id` and atomically replaces its list.
    ///
    /// When the store cannot produce the document the previous list stays in
    /// place and the error is returned.
    pub fn refresh(
        &mut self,
        source_id: &str,
        store: &dyn DocumentStore,
        extractor: &Extractor,
    ) -> Result<EventList, EngineError> {
        let text = store.read(source_id).map_err(|e| EngineError::Extraction {
            source_id: source_id.to_string(),
            message: format!("{:#}", e),
        })?;

        let events: EventList = Arc::new(extractor.extract(&text));
        let revision = self.revision(source_id).map_or(1, |r| r + 1);
        log::debug!(
            "Cached {} event(s) for '{}' (revision {})",
            events.len(),
            source_id,
            revision
        );

        self.entries.insert(
            source_id.to_string(),
            SourceEntry {
                events: events.clone(),
                revision,
            },
        );
        Ok(events)
    }

    /// The current list for `source_id`, empty if it was never loaded.
    /// Never triggers extraction.
    pub fn get(&self, source_id: &str) -> EventList {
        self.entries
            .get(source_id)
            .map(|e| e.events.clone())
            .unwrap_or_else(|| self.empty.clone())
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    pub fn revision(&self, source_id: &str) -> Option<u64> {
        self.entries.get(source_id).map(|e| e.revision)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
