//! Run sources written for one language version on another by rewriting
//! them at load time.
//!
//! This crate provides:
//! - Version ids with feature-level compatibility gating
//! - A load router with stackable, restorable interception handlers
//! - In-process and fork-isolated transform processors
//! - A content cache keyed by source path
//! - The socket-pair channel workers report results over
//!
//! Forked isolation relies on `fork(2)` and Unix domain sockets, so the
//! crate targets Unix platforms.

pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod intercept;
pub mod shim;
pub mod transform;
pub mod version;

pub use cache::{CacheLookup, ContentCache};
pub use channel::{ChannelMessage, WorkerHandle, run_isolated};
pub use config::{EngineProfile, IsolationMode, ShimConfig};
pub use error::{Error, Result};
pub use intercept::{
    LoadInterceptor, LoadRouter, LoadStrategy, OpenMode, OpenRequest, OpenedLoad, Registration,
    SourceStream, Suspension,
};
pub use shim::Shim;
pub use transform::{
    DirectProcessor, ForkedProcessor, RewriteEngine, RewriteReport, TransformOutcome,
    TransformProcessor,
};
pub use version::{Version, is_transform_needed};
