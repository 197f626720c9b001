//! The load dispatch point and its handler machinery.
//!
//! [`LoadRouter`] is the explicit object a host routes every load
//! through; registration state lives in it, not in process-wide statics.
//! Handlers stack: registering the active strategy again bumps a
//! reference count, registering a different one pushes a level, and
//! releasing a registration restores the exact prior handler once its
//! count reaches zero. While a strategy runs, the router suspends itself
//! so the strategy's own loads (including recursive execution loads)
//! reach the real file system instead of recursing into the handler.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::transform::{TransformOutcome, TransformProcessor};

use super::request::{OpenMode, OpenRequest};
use super::stream::{OpenedLoad, SourceStream};

/// Handler invoked for execution loads.
pub trait LoadStrategy: Send + Sync {
    /// Produce replacement content for `path`, or `None` to serve the
    /// original file. `path` arrives already resolved.
    fn on_load(&self, path: &Path, request: &OpenRequest) -> Result<Option<String>>;
}

/// One registered handler and its registration count.
struct Level {
    strategy: Arc<dyn LoadStrategy>,
    refs: usize,
}

#[derive(Default)]
struct RouterState {
    /// Handler stack; the top entry is active.
    levels: Vec<Level>,

    /// While nonzero, loads bypass handlers entirely.
    suspended: usize,
}

struct RouterInner {
    state: Mutex<RouterState>,
    search_paths: Vec<PathBuf>,
}

/// The host's load dispatch point.
///
/// Cheap to clone; clones share registration state.
#[derive(Clone)]
pub struct LoadRouter {
    inner: Arc<RouterInner>,
}

impl LoadRouter {
    /// Router with no search locations.
    pub fn new() -> Self {
        Self::with_search_paths(Vec::new())
    }

    /// Router resolving relative loads against `search_paths`, in order.
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                state: Mutex::new(RouterState::default()),
                search_paths,
            }),
        }
    }

    /// Install `strategy` as the active handler.
    ///
    /// The returned guard undoes exactly one registration when released
    /// or dropped. Balanced register/release pairs always restore the
    /// handler that was active before the first of them.
    pub fn register(&self, strategy: Arc<dyn LoadStrategy>) -> Registration {
        let mut state = self.lock_state();
        let level = match state.levels.last_mut() {
            Some(top) if Arc::ptr_eq(&top.strategy, &strategy) => {
                top.refs += 1;
                state.levels.len() - 1
            }
            _ => {
                state.levels.push(Level { strategy, refs: 1 });
                state.levels.len() - 1
            }
        };
        tracing::debug!("Registered load handler at level {}", level);
        Registration {
            router: self.clone(),
            level,
            released: false,
        }
    }

    /// Whether any handler is currently registered.
    pub fn has_handler(&self) -> bool {
        !self.lock_state().levels.is_empty()
    }

    /// Route loads around handlers until the guard drops.
    ///
    /// The router uses this itself while a strategy runs; hosts can use
    /// it to read files with interception off.
    pub fn suspend(&self) -> Suspension<'_> {
        self.lock_state().suspended += 1;
        Suspension { router: self }
    }

    /// Open `request`, consulting the active handler for execution loads.
    ///
    /// Path resolution happens before any handler runs, and the resolved
    /// path is reported identically whether or not the content was
    /// transformed. A handler failure falls back to the default open
    /// (logged unless the request asked for silence) so one bad file
    /// never halts the host; a channel failure aborts the load instead.
    /// Non-execution opens skip handlers entirely.
    pub fn open(&self, request: &OpenRequest) -> Result<OpenedLoad> {
        let resolved = self.resolve(request)?;
        let strategy = if request.execution_load && request.mode == OpenMode::Read {
            let state = self.lock_state();
            if state.suspended == 0 {
                state.levels.last().map(|level| Arc::clone(&level.strategy))
            } else {
                None
            }
        } else {
            None
        };
        let Some(strategy) = strategy else {
            return self.default_open(request, resolved);
        };

        // No router lock is held while the handler runs; the suspension
        // guard re-enables interception on every exit path, unwinding
        // included.
        let _bypass = self.suspend();
        match strategy.on_load(&resolved, request) {
            Ok(Some(content)) => Ok(OpenedLoad {
                stream: SourceStream::from_content(content),
                resolved,
            }),
            Ok(None) => self.default_open(request, resolved),
            Err(e @ Error::Channel(_)) => Err(e),
            Err(e) => {
                if request.report_errors {
                    tracing::warn!(
                        "Transform of {:?} failed, serving the original file: {}",
                        resolved,
                        e
                    );
                }
                self.default_open(request, resolved)
            }
        }
    }

    /// Resolve a request's path before any handler sees it.
    ///
    /// Read opens resolve to a canonical existing file, consulting the
    /// search locations in order for relative paths when the request
    /// allows it. A path that resolves nowhere fails here with the
    /// genuine not-found error. Write opens keep the requested path,
    /// since the file may not exist yet.
    fn resolve(&self, request: &OpenRequest) -> Result<PathBuf> {
        if request.mode != OpenMode::Read {
            return Ok(request.path.clone());
        }
        if request.path.is_relative() && request.use_search_path {
            for base in &self.inner.search_paths {
                let candidate = base.join(&request.path);
                if candidate.exists() {
                    return Ok(candidate.canonicalize()?);
                }
            }
        }
        Ok(request.path.canonicalize()?)
    }

    /// The untransformed open every load bottoms out in.
    fn default_open(&self, request: &OpenRequest, resolved: PathBuf) -> Result<OpenedLoad> {
        let file = match request.mode {
            OpenMode::Read => File::open(&resolved)?,
            OpenMode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&resolved)?,
            OpenMode::Append => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)?,
        };
        Ok(OpenedLoad {
            stream: SourceStream::File(file),
            resolved,
        })
    }

    fn release_level(&self, level: usize) {
        let mut state = self.lock_state();
        if let Some(entry) = state.levels.get_mut(level) {
            entry.refs = entry.refs.saturating_sub(1);
        }
        while state.levels.last().is_some_and(|top| top.refs == 0) {
            state.levels.pop();
            tracing::debug!("Load handler level released; {} remain", state.levels.len());
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RouterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LoadRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for one [`LoadRouter::register`] call.
#[must_use = "dropping the registration immediately unregisters the handler"]
pub struct Registration {
    router: LoadRouter,
    level: usize,
    released: bool,
}

impl Registration {
    /// Release explicitly instead of on drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.router.release_level(self.level);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Guard holding interception suspended. See [`LoadRouter::suspend`].
pub struct Suspension<'a> {
    router: &'a LoadRouter,
}

impl Drop for Suspension<'_> {
    fn drop(&mut self) {
        self.router.lock_state().suspended -= 1;
    }
}

/// Processor-backed load handler: the bridge between a
/// [`TransformProcessor`] and a [`LoadRouter`].
pub struct LoadInterceptor {
    processor: Arc<dyn TransformProcessor>,
}

impl LoadInterceptor {
    pub fn new(processor: Arc<dyn TransformProcessor>) -> Self {
        Self { processor }
    }
}

impl LoadStrategy for LoadInterceptor {
    fn on_load(&self, path: &Path, _request: &OpenRequest) -> Result<Option<String>> {
        match self.processor.transform(path)? {
            TransformOutcome::Replaced(content) => Ok(Some(content)),
            TransformOutcome::Unchanged => Ok(None),
        }
    }
}
