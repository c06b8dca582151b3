use crate::catalogue::EffectLabel;
use crate::export::ExportFile;
use std::path::Path;
use std::time::Duration;

/// Result type for capability operations.
pub type CapResult<T> = Result<T, CapError>;

#[derive(Debug, thiserror::Error)]
pub enum CapError {
    #[error("target not found: {0}")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Interactive surface
// ---------------------------------------------------------------------------

/// The interactive coverage calculator the collector drives.
///
/// One mutable selection and one result area are shared by every call, so
/// callers must never interleave two combinations.
#[async_trait::async_trait]
pub trait SelectorSurface: Send + Sync {
    /// Deselect every currently selected item. Idempotent.
    async fn clear_all(&self) -> CapResult<()>;

    /// Mark one item (1-based) active.
    async fn select(&self, item: usize) -> CapResult<()>;

    /// Trigger the aggregate computation over the current selection.
    async fn compute(&self) -> CapResult<()>;

    /// Current text of one effectiveness readout.
    async fn read_effectiveness(&self, effect: &EffectLabel) -> CapResult<String>;

    async fn is_item_disabled(&self, item: usize) -> CapResult<bool>;

    /// Release whatever backs the surface. Nothing to do by default.
    async fn close(&self) -> CapResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

// ---------------------------------------------------------------------------
// Export host
// ---------------------------------------------------------------------------

/// Host capability that offers a finished file to the user.
pub trait FileHost: Send + Sync {
    fn offer_file(&self, file: &ExportFile) -> CapResult<()>;
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

pub trait FilesystemOps: Send + Sync {
    fn read_file(&self, path: &Path) -> CapResult<Vec<u8>>;
    fn write_file(&self, path: &Path, data: &[u8]) -> CapResult<()>;
}
