//! Memoized handler construction.
//!
//! # Responsibilities
//! - Map winning pattern strings to their already-built handlers
//! - Run each pattern's constructor at most once, even under racing misses
//! - Surface construction errors without caching them
//!
//! # Design Decisions
//! - Sharded concurrent map; the entry guard holds the shard lock for the
//!   duration of construction, so racers on the same cold key serialize
//! - Append-only: entries live for the life of the router, no eviction
//! - Only patterns that actually won a resolution are ever inserted

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::routing::router::{BoxError, RequestHandler};

/// Concurrency-safe pattern → handler memo.
#[derive(Default)]
pub struct HandlerCache {
    inner: DashMap<String, Arc<dyn RequestHandler>>,
}

impl HandlerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a previously constructed handler.
    pub fn get(&self, pattern: &str) -> Option<Arc<dyn RequestHandler>> {
        self.inner.get(pattern).map(|entry| entry.value().clone())
    }

    /// Return the cached handler for `pattern`, or run `construct` and
    /// memoize its result. A failed construction inserts nothing, so the
    /// next request retries naturally.
    pub fn get_or_construct<F>(
        &self,
        pattern: &str,
        construct: F,
    ) -> Result<Arc<dyn RequestHandler>, BoxError>
    where
        F: FnOnce() -> Result<Arc<dyn RequestHandler>, BoxError>,
    {
        match self.inner.entry(pattern.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(slot) => {
                let handler = construct()?;
                slot.insert(handler.clone());
                Ok(handler)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
