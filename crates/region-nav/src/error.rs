use thiserror::Error;

#[derive(Error, Debug)]
pub enum NavError {
    #[error("malformed index: {0}")]
    MalformedIndex(String),

    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("no data for this selection: {0}")]
    EmptyResultSet(String),

    #[error("ambiguous match for {name:?}: {candidates:?}")]
    AmbiguousMatch {
        name: String,
        candidates: Vec<String>,
    },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl NavError {
    /// Soft outcomes are shown as an empty state, not reported as failures.
    pub fn is_soft(&self) -> bool {
        matches!(self, NavError::EmptyResultSet(_))
    }

    /// Errors that leave the previously rendered state intact and can be
    /// retried by navigating again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NavError::SourceUnavailable(_) | NavError::EmptyResultSet(_) | NavError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
