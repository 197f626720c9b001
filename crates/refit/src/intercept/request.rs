//! Per-call load request descriptors.

use std::path::{Path, PathBuf};

/// How a load wants the file opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read existing content.
    #[default]
    Read,

    /// Truncate and write.
    Write,

    /// Append to existing content.
    Append,
}

/// One intercepted load request. Immutable once created; one per call.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Requested path, absolute or relative.
    pub path: PathBuf,

    /// Open mode. Only read opens are ever transformed.
    pub mode: OpenMode,

    /// Whether relative paths consult the configured search locations.
    pub use_search_path: bool,

    /// Whether transform fallbacks are logged.
    pub report_errors: bool,

    /// Whether the loaded text is about to be executed as code.
    pub execution_load: bool,
}

impl OpenRequest {
    /// A load whose text the host will execute. These are the requests
    /// the interceptor rewrites.
    pub fn execution(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: OpenMode::Read,
            use_search_path: true,
            report_errors: true,
            execution_load: true,
        }
    }

    /// A plain content read, never transformed.
    pub fn read(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: OpenMode::Read,
            use_search_path: false,
            report_errors: true,
            execution_load: false,
        }
    }

    /// A truncating write open.
    pub fn write(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: OpenMode::Write,
            use_search_path: false,
            report_errors: true,
            execution_load: false,
        }
    }

    /// Silence the fallback warning for this request.
    pub fn quiet(mut self) -> Self {
        self.report_errors = false;
        self
    }
}
