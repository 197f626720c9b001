//! The assembled shim: version gate, cache, processor, and the handler
//! it installs on a router.

use std::sync::Arc;

use crate::cache::ContentCache;
use crate::config::{IsolationMode, ShimConfig};
use crate::error::Result;
use crate::intercept::{LoadInterceptor, LoadRouter, LoadStrategy, Registration};
use crate::transform::{DirectProcessor, ForkedProcessor, RewriteEngine, TransformProcessor};
use crate::version::is_transform_needed;

/// One configured rewrite shim.
///
/// Construction wires the cache and the processor for the configured
/// isolation mode; [`Shim::enable`] then installs the same handler
/// object on a router as many times as asked, so repeated enables stack
/// registrations instead of piling up distinct handlers.
pub struct Shim {
    config: ShimConfig,
    strategy: Arc<dyn LoadStrategy>,
}

impl Shim {
    /// Build the shim for `config`, transforming through `engine`.
    ///
    /// Fails if the configured cache directory cannot be created.
    pub fn new(config: ShimConfig, engine: Arc<dyn RewriteEngine>) -> Result<Self> {
        let cache = Arc::new(match &config.cache_dir {
            Some(dir) => ContentCache::at_dir(dir)?,
            None => ContentCache::disabled(),
        });
        let processor: Arc<dyn TransformProcessor> = match config.isolation {
            IsolationMode::InProcess => Arc::new(DirectProcessor::new(engine, cache)),
            IsolationMode::Forked => Arc::new(ForkedProcessor::new(engine, cache)),
        };
        tracing::debug!(
            "Built shim for {} -> {} ({:?})",
            config.source(),
            config.target(),
            config.isolation
        );
        Ok(Self {
            config,
            strategy: Arc::new(LoadInterceptor::new(processor)),
        })
    }

    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// Whether the configured version pair needs rewriting at all.
    ///
    /// Versions sharing a feature level run each other's sources as
    /// written, so the shim stays out of the way.
    pub fn is_needed(&self) -> bool {
        is_transform_needed(self.config.source(), self.config.target())
    }

    /// Router resolving relative loads against the configured search
    /// locations.
    pub fn build_router(&self) -> LoadRouter {
        LoadRouter::with_search_paths(self.config.search_paths.clone())
    }

    /// Install the shim's handler on `router`.
    ///
    /// Returns `None` without touching the router when the version gate
    /// finds the sources already run on the target as written.
    pub fn enable(&self, router: &LoadRouter) -> Option<Registration> {
        if !self.is_needed() {
            tracing::debug!(
                "Versions {} and {} share a feature level; loads stay untouched",
                self.config.source(),
                self.config.target()
            );
            return None;
        }
        Some(router.register(Arc::clone(&self.strategy)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::OpenRequest;
    use crate::transform::RewriteReport;
    use std::fs;
    use std::io::Read as _;
    use std::path::Path;
    use tempfile::tempdir;

    struct Doubling;

    impl RewriteEngine for Doubling {
        fn process_file(&self, path: &Path) -> crate::error::Result<RewriteReport> {
            let content = fs::read_to_string(path)?;
            Ok(RewriteReport {
                content: content.repeat(2),
                changed: true,
                errors: Vec::new(),
            })
        }
    }

    fn in_process(source_id: u32, target_id: u32) -> ShimConfig {
        let mut config = ShimConfig::new(source_id, target_id);
        config.isolation = IsolationMode::InProcess;
        config
    }

    #[test]
    fn test_needed_tracks_the_feature_level_gate() {
        let compatible = Shim::new(in_process(80208, 80209), Arc::new(Doubling)).unwrap();
        assert!(!compatible.is_needed());
        assert_eq!(compatible.config().source_id, 80208);

        let incompatible = Shim::new(in_process(80208, 70408), Arc::new(Doubling)).unwrap();
        assert!(incompatible.is_needed());
    }

    #[test]
    fn test_enable_skips_compatible_versions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("widget.src");
        fs::write(&path, "as written").unwrap();

        let shim = Shim::new(in_process(80208, 80209), Arc::new(Doubling)).unwrap();
        let router = shim.build_router();
        assert!(shim.enable(&router).is_none());
        assert!(!router.has_handler());

        let mut load = router.open(&OpenRequest::execution(&path)).unwrap();
        let mut content = String::new();
        load.stream.read_to_string(&mut content).unwrap();
        assert_eq!(content, "as written");
    }

    #[test]
    fn test_enable_transforms_incompatible_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("widget.src");
        fs::write(&path, "once").unwrap();

        let shim = Shim::new(in_process(70400, 80200), Arc::new(Doubling)).unwrap();
        let router = shim.build_router();
        let _reg = shim.enable(&router).unwrap();

        let mut load = router.open(&OpenRequest::execution(&path)).unwrap();
        assert!(load.transformed());
        let mut content = String::new();
        load.stream.read_to_string(&mut content).unwrap();
        assert_eq!(content, "onceonce");
    }

    #[test]
    fn test_repeated_enable_stacks_registrations() {
        let shim = Shim::new(in_process(70400, 80200), Arc::new(Doubling)).unwrap();
        let router = shim.build_router();

        let first = shim.enable(&router).unwrap();
        let second = shim.enable(&router).unwrap();

        drop(first);
        assert!(router.has_handler());
        drop(second);
        assert!(!router.has_handler());
    }

    #[test]
    fn test_unusable_cache_dir_fails_construction() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, "a file, not a directory").unwrap();

        let mut config = in_process(70400, 80200);
        config.cache_dir = Some(blocker.join("cache"));
        let result = Shim::new(config, Arc::new(Doubling));
        assert!(matches!(result, Err(crate::error::Error::Config(_))));
    }
}
