//! Application context – holds capability trait objects and the catalogue.

use crate::catalogue::Catalogue;
use crate::collector::{CancelToken, CollectOptions, CoverageCollector};
use crate::error::{CoverageError, Result};
use crate::platform::{DirectoryHost, StdFilesystem, TokioClock};
use crate::traits::*;
use std::path::{Path, PathBuf};

/// Central context passed to all engine operations.
///
/// Holds trait-object capabilities so callers can swap implementations
/// (e.g. a browser surface vs the in-memory one).
pub struct AppContext {
    surface: Box<dyn SelectorSurface>,
    clock: Box<dyn Clock>,
    host: Box<dyn FileHost>,
    fs: Box<dyn FilesystemOps>,
    catalogue: Catalogue,
}

impl AppContext {
    pub fn new(
        surface: Box<dyn SelectorSurface>,
        clock: Box<dyn Clock>,
        host: Box<dyn FileHost>,
        fs: Box<dyn FilesystemOps>,
        catalogue: Catalogue,
    ) -> Self {
        Self {
            surface,
            clock,
            host,
            fs,
            catalogue,
        }
    }

    /// Real clock and filesystem; exports land in `out_dir`.
    pub fn default_platform(
        surface: Box<dyn SelectorSurface>,
        catalogue: Catalogue,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            surface,
            clock: Box::new(TokioClock),
            host: Box::new(DirectoryHost::new(out_dir, Box::new(StdFilesystem))),
            fs: Box::new(StdFilesystem),
            catalogue,
        }
    }

    pub fn surface(&self) -> &dyn SelectorSurface {
        self.surface.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn host(&self) -> &dyn FileHost {
        self.host.as_ref()
    }

    pub fn fs(&self) -> &dyn FilesystemOps {
        self.fs.as_ref()
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn collector(&self, options: CollectOptions, cancel: CancelToken) -> CoverageCollector<'_> {
        CoverageCollector::new(&self.catalogue, self.surface(), self.clock())
            .with_options(options)
            .with_cancel(cancel)
    }
}

/// Read a catalogue YAML file through `fs`.
pub fn load_catalogue(fs: &dyn FilesystemOps, path: &Path) -> Result<Catalogue> {
    let bytes = fs
        .read_file(path)
        .map_err(|e| CoverageError::Catalogue(format!("cannot read {}: {}", path.display(), e)))?;
    Catalogue::from_yaml(&String::from_utf8_lossy(&bytes))
}
