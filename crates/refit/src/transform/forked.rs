//! Process-isolated transform execution.

use std::path::Path;
use std::sync::Arc;

use crate::cache::ContentCache;
use crate::channel;
use crate::error::Result;

use super::{
    RewriteEngine, TransformOutcome, TransformProcessor, outcome_from_cache, outcome_from_run,
    rewrite_through_cache,
};

/// Runs the rewrite engine inside a freshly forked worker.
///
/// Same contract as [`DirectProcessor`](super::DirectProcessor), at the
/// cost of one fork and IPC round trip per cache miss, and with a hard
/// guarantee in return: nothing the engine does can leak into the
/// caller's process. The cache is consulted here in the parent, so only
/// a miss pays for a worker; the worker writes the cache entry before
/// responding, which the parent sees through the shared filesystem.
pub struct ForkedProcessor {
    engine: Arc<dyn RewriteEngine>,
    cache: Arc<ContentCache>,
}

impl ForkedProcessor {
    pub fn new(engine: Arc<dyn RewriteEngine>, cache: Arc<ContentCache>) -> Self {
        Self { engine, cache }
    }
}

impl TransformProcessor for ForkedProcessor {
    fn transform(&self, path: &Path) -> Result<TransformOutcome> {
        let resolved = path.canonicalize()?;
        if let Some(hit) = self.cache.get(&resolved) {
            tracing::debug!("Cache hit for {:?}", resolved);
            return Ok(outcome_from_cache(hit));
        }
        let engine = Arc::clone(&self.engine);
        let cache = Arc::clone(&self.cache);
        let target = resolved.clone();
        channel::run_isolated(move || rewrite_through_cache(engine.as_ref(), &cache, &target))
            .map(outcome_from_run)
    }
}
