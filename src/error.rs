use thiserror::Error;

use crate::parse::ParseError;
use crate::AnalysisError;

/// Unified error type covering parsing, loading, and analysis.
///
/// Returned by convenience methods like [`Network::from_dsl()`](crate::Network::from_dsl)
/// and [`Network::from_json_file()`](crate::Network::from_json_file).
#[derive(Debug, Error)]
pub enum AclReachError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
