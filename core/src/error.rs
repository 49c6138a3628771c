use thiserror::Error;

use crate::point_store::PointId;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine.
///
/// Collection-level variants abort a whole call; point-level variants are
/// reported per item inside batch results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),
    #[error("point {0} not found")]
    PointNotFound(PointId),
    #[error("collection '{0}' already exists")]
    AlreadyExists(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("collection '{0}' was dropped")]
    CollectionDropped(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("vector contains non-finite value at index {index}")]
    NonFiniteValue { index: usize },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("collection name must not be empty")]
    InvalidName,
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// True for both collection and point lookups that found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CollectionNotFound(_) | Self::PointNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_groups_collection_and_point_lookups() {
        assert!(Error::CollectionNotFound("demo".to_string()).is_not_found());
        assert!(Error::PointNotFound(7).is_not_found());
        assert!(!Error::AlreadyExists("demo".to_string()).is_not_found());
        assert!(!Error::CollectionDropped("demo".to_string()).is_not_found());
    }

    #[test]
    fn messages_carry_context() {
        let error = Error::DimensionMismatch {
            expected: 4,
            got: 3,
        };
        assert_eq!(error.to_string(), "dimension mismatch: expected 4, got 3");
        assert_eq!(
            Error::CollectionNotFound("cities".to_string()).to_string(),
            "collection 'cities' not found"
        );
    }
}
