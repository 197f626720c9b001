//! Shim configuration and the profile handed to rewrite engines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Where transforms run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationMode {
    /// Run the engine on the caller's thread. Fast, but engine state
    /// leaks between files and an engine panic unwinds into the host.
    InProcess,

    /// Fork a worker per file and marshal the result back over a
    /// socket pair. Engine crashes surface as errors in the parent.
    #[default]
    Forked,
}

/// Everything a [`Shim`](crate::Shim) needs to decide whether to
/// transform and how.
///
/// Fields are public; fill in what differs from the defaults after
/// [`ShimConfig::new`].
#[derive(Debug, Clone)]
pub struct ShimConfig {
    /// Version the sources were written for, as a version id.
    pub source_id: u32,

    /// Version the host actually runs, as a version id.
    pub target_id: u32,

    /// Where transformed content is kept between runs. `None` disables
    /// caching and every load transforms afresh.
    pub cache_dir: Option<PathBuf>,

    /// Locations consulted, in order, when resolving relative loads.
    pub search_paths: Vec<PathBuf>,

    pub isolation: IsolationMode,

    /// Engine-specific knobs, passed through opaquely in the profile.
    pub engine_options: serde_json::Value,
}

impl ShimConfig {
    pub fn new(source_id: u32, target_id: u32) -> Self {
        Self {
            source_id,
            target_id,
            cache_dir: None,
            search_paths: Vec::new(),
            isolation: IsolationMode::default(),
            engine_options: serde_json::Value::Null,
        }
    }

    pub fn source(&self) -> Version {
        Version::from_id(self.source_id)
    }

    pub fn target(&self) -> Version {
        Version::from_id(self.target_id)
    }

    /// Profile describing the rewrite this configuration asks for.
    pub fn engine_profile(&self) -> EngineProfile {
        EngineProfile {
            rule_set: format!("down_to_{}", self.target().major_minor()),
            target_id: self.target_id,
            cache_dir: self.cache_dir.clone(),
            options: self.engine_options.clone(),
        }
    }
}

/// Serialized description of a rewrite run, consumed by engines that
/// load their rule sets by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineProfile {
    /// Rule set identifier, derived from the target's feature level.
    pub rule_set: String,

    pub target_id: u32,

    pub cache_dir: Option<PathBuf>,

    /// Opaque engine options from the configuration.
    pub options: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_names_the_target_rule_set() {
        let config = ShimConfig::new(80400, 80200);
        let profile = config.engine_profile();
        assert_eq!(profile.rule_set, "down_to_82");
        assert_eq!(profile.target_id, 80200);
    }

    #[test]
    fn test_profile_serializes_round_trip() {
        let mut config = ShimConfig::new(80400, 70400);
        config.cache_dir = Some(PathBuf::from("/tmp/refit-cache"));
        config.engine_options = serde_json::json!({ "keep_comments": true });

        let profile = config.engine_profile();
        let encoded = serde_json::to_string(&profile).unwrap();
        let decoded: EngineProfile = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, profile);
        assert_eq!(decoded.rule_set, "down_to_74");
    }

    #[test]
    fn test_defaults_fork_and_disable_caching() {
        let config = ShimConfig::new(80208, 80209);
        assert_eq!(config.isolation, IsolationMode::Forked);
        assert!(config.cache_dir.is_none());
        assert_eq!(config.source().to_string(), "8.2.8");
        assert_eq!(config.target().to_string(), "8.2.9");
    }
}
