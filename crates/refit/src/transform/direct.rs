//! In-process transform execution.

use std::path::Path;
use std::sync::Arc;

use crate::cache::ContentCache;
use crate::error::Result;

use super::{
    RewriteEngine, TransformOutcome, TransformProcessor, outcome_from_cache, outcome_from_run,
    rewrite_through_cache,
};

/// Runs the rewrite engine in the caller's own process.
///
/// Fastest path, with a sharp edge: the engine shares memory and global
/// state with the caller, so a faulty transform can corrupt whatever the
/// caller does next. Use [`ForkedProcessor`](super::ForkedProcessor)
/// where that risk is unacceptable.
pub struct DirectProcessor {
    engine: Arc<dyn RewriteEngine>,
    cache: Arc<ContentCache>,
}

impl DirectProcessor {
    pub fn new(engine: Arc<dyn RewriteEngine>, cache: Arc<ContentCache>) -> Self {
        Self { engine, cache }
    }
}

impl TransformProcessor for DirectProcessor {
    fn transform(&self, path: &Path) -> Result<TransformOutcome> {
        let resolved = path.canonicalize()?;
        if let Some(hit) = self.cache.get(&resolved) {
            tracing::debug!("Cache hit for {:?}", resolved);
            return Ok(outcome_from_cache(hit));
        }
        rewrite_through_cache(self.engine.as_ref(), &self.cache, &resolved).map(outcome_from_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transform::RewriteReport;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct UppercasingEngine {
        runs: AtomicUsize,
    }

    impl RewriteEngine for UppercasingEngine {
        fn process_file(&self, path: &Path) -> Result<RewriteReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let source = fs::read_to_string(path)?;
            let content = source.to_uppercase();
            let changed = content != source;
            Ok(RewriteReport {
                content,
                changed,
                errors: vec![],
            })
        }
    }

    #[test]
    fn test_second_transform_is_served_from_cache() {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("widget.src");
        fs::write(&source_path, "lower body").unwrap();

        let engine = Arc::new(UppercasingEngine {
            runs: AtomicUsize::new(0),
        });
        let cache = Arc::new(ContentCache::at_dir(dir.path().join("cache")).unwrap());
        let processor = DirectProcessor::new(engine.clone(), cache);

        let first = processor.transform(&source_path).unwrap();
        assert_eq!(first, TransformOutcome::Replaced("LOWER BODY".to_string()));
        assert_eq!(engine.runs.load(Ordering::SeqCst), 1);

        let second = processor.transform(&source_path).unwrap();
        assert_eq!(second, TransformOutcome::Replaced("LOWER BODY".to_string()));
        assert_eq!(engine.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unchanged_file_is_checked_once() {
        let dir = tempdir().unwrap();
        let source_path = dir.path().join("stable.src");
        fs::write(&source_path, "ALREADY UPPER").unwrap();

        let engine = Arc::new(UppercasingEngine {
            runs: AtomicUsize::new(0),
        });
        let cache = Arc::new(ContentCache::at_dir(dir.path().join("cache")).unwrap());
        let processor = DirectProcessor::new(engine.clone(), cache);

        assert_eq!(
            processor.transform(&source_path).unwrap(),
            TransformOutcome::Unchanged
        );
        assert_eq!(
            processor.transform(&source_path).unwrap(),
            TransformOutcome::Unchanged
        );
        assert_eq!(engine.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(UppercasingEngine {
            runs: AtomicUsize::new(0),
        });
        let cache = Arc::new(ContentCache::disabled());
        let processor = DirectProcessor::new(engine, cache);

        let result = processor.transform(&dir.path().join("absent.src"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
