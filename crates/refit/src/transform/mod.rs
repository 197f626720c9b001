//! Transform processors.
//!
//! A [`TransformProcessor`] rewrites one file for the target version,
//! driving an external [`RewriteEngine`] behind the content cache. Two
//! interchangeable implementations exist: [`DirectProcessor`] runs the
//! engine in the caller's process, [`ForkedProcessor`] runs it in a
//! forked worker over the isolation channel.

mod direct;
mod forked;

pub use direct::DirectProcessor;
pub use forked::ForkedProcessor;

use std::path::Path;

use crate::cache::{CacheLookup, ContentCache};
use crate::error::{Error, Result};

/// Outcome of transforming one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The file already suits the target version; serve the original.
    Unchanged,

    /// The file was rewritten; serve this content instead.
    Replaced(String),
}

/// External rewrite engine, consumed through a single entry point.
///
/// The engine owns the actual rewrite rules; this crate only routes
/// files through it and never interprets its configuration.
pub trait RewriteEngine: Send + Sync {
    /// Rewrite the file at `path`, reporting content and per-file errors.
    fn process_file(&self, path: &Path) -> Result<RewriteReport>;
}

/// What the engine reports for one file.
#[derive(Debug, Clone)]
pub struct RewriteReport {
    /// Full rewritten source text.
    pub content: String,

    /// Whether the text differs from the input file.
    pub changed: bool,

    /// Unrecoverable per-file errors the engine collected.
    pub errors: Vec<String>,
}

/// A transform applied to a file before the host executes it.
pub trait TransformProcessor: Send + Sync {
    /// Rewrite `path` for the target version if needed.
    ///
    /// The path is canonicalized first so cache entries are keyed by the
    /// resolved path, wherever the request came from.
    fn transform(&self, path: &Path) -> Result<TransformOutcome>;
}

/// Run the engine on `resolved` and write the result through the cache.
///
/// Shared by both processors: the direct one calls it inline, the forked
/// one ships it through the isolation channel. Engine-reported errors are
/// aggregated into one transform error.
pub(crate) fn rewrite_through_cache(
    engine: &dyn RewriteEngine,
    cache: &ContentCache,
    resolved: &Path,
) -> Result<Option<String>> {
    let report = engine.process_file(resolved)?;
    if !report.errors.is_empty() {
        return Err(Error::Transform(format!(
            "rewrite of {} failed: {}",
            resolved.display(),
            report.errors.join("; ")
        )));
    }
    if report.changed {
        cache.put(resolved, &report.content);
        Ok(Some(report.content))
    } else {
        cache.mark_unchanged(resolved);
        Ok(None)
    }
}

pub(crate) fn outcome_from_cache(hit: CacheLookup) -> TransformOutcome {
    match hit {
        CacheLookup::Unchanged => TransformOutcome::Unchanged,
        CacheLookup::Content(content) => TransformOutcome::Replaced(content),
    }
}

pub(crate) fn outcome_from_run(produced: Option<String>) -> TransformOutcome {
    match produced {
        Some(content) => TransformOutcome::Replaced(content),
        None => TransformOutcome::Unchanged,
    }
}
