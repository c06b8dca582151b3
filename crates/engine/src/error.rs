use crate::collector::SurfaceStep;
use crate::types::ErrorCode;
use crate::traits::CapError;

pub type Result<T> = std::result::Result<T, CoverageError>;

#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    #[error("invalid arity n={n} r={r}: {reason}")]
    InvalidArity {
        n: usize,
        r: usize,
        reason: &'static str,
    },

    #[error("factorial is undefined for negative input {0}")]
    ArithmeticDomain(i64),

    #[error("{0} does not fit in 128 bits")]
    ArithmeticOverflow(String),

    #[error("item {0} is not in the catalogue")]
    UnknownItem(usize),

    #[error("surface unavailable during {step} of {target}: {source}")]
    SurfaceUnavailable {
        step: SurfaceStep,
        target: String,
        #[source]
        source: CapError,
    },

    #[error("collection cancelled after {completed} of {} combinations", count_or_unknown(.total))]
    Cancelled {
        completed: usize,
        /// `None` when the count does not fit in 128 bits.
        total: Option<u128>,
    },

    #[error("export failed: {0}")]
    Export(#[source] CapError),

    #[error("invalid catalogue: {0}")]
    Catalogue(String),
}

impl CoverageError {
    pub(crate) fn arity(n: usize, r: usize, reason: &'static str) -> Self {
        CoverageError::InvalidArity { n, r, reason }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            CoverageError::InvalidArity { .. } | CoverageError::UnknownItem(_) => {
                ErrorCode::InvalidInput
            }
            CoverageError::ArithmeticDomain(_) | CoverageError::ArithmeticOverflow(_) => {
                ErrorCode::ArithmeticDomain
            }
            CoverageError::SurfaceUnavailable { source, .. } => match source {
                CapError::Timeout => ErrorCode::Timeout,
                CapError::Network(_) => ErrorCode::NetworkError,
                _ => ErrorCode::SurfaceUnavailable,
            },
            CoverageError::Cancelled { .. } => ErrorCode::Cancelled,
            CoverageError::Export(CapError::Io(_)) => ErrorCode::IoError,
            CoverageError::Export(_) => ErrorCode::InternalError,
            CoverageError::Catalogue(_) => ErrorCode::InvalidInput,
        }
    }
}

fn count_or_unknown(total: &Option<u128>) -> String {
    total.map_or_else(|| "more than 2^128".to_string(), |t| t.to_string())
}
