//! Engine crate – headless type-coverage collection.
//!
//! Enumerates item combinations, drives an interactive coverage surface
//! through clear/select/compute/read for each one, and exports the rows as
//! delimited text. The surface, clock and save host sit behind traits so the
//! same collector runs against a browser or the in-memory doubles.

pub mod catalogue;
pub mod collector;
pub mod combination;
pub mod context;
pub mod error;
pub mod export;
pub mod memory;
pub mod platform;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use catalogue::{Catalogue, EffectLabel, Effectiveness};
pub use collector::{
    estimated_duration, CancelToken, CollectOptions, CoverageCollector, Phase, SurfaceStep,
};
pub use combination::{
    combination_count, factorial, generate_all_sizes, generate_combinations, Combination,
};
pub use context::AppContext;
pub use error::{CoverageError, Result};
pub use export::{export_as, format, FormatDescriptor, CSV, JSON, TSV};
pub use types::{CommandResult, Dataset, ErrorCode, ErrorInfo, Row, Status};
