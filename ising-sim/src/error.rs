//! Error type shared by every fallible engine operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Malformed input detected at the boundary of the call that received it.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Reconstructed data disagrees with its metadata.
    #[error("data integrity error{}: {detail}", .index.map(|i| format!(" at index {i}")).unwrap_or_default())]
    DataIntegrity { index: Option<usize>, detail: String },

    /// The operation needs recorded state that does not exist yet.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The interruption flag was raised between sweeps.
    #[error("interrupted after {completed} of {requested} sweeps")]
    Interrupted { completed: usize, requested: usize },
}

pub type Result<T> = std::result::Result<T, SimError>;

impl SimError {
    #[must_use]
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    #[must_use]
    pub fn missing<S: Into<String>>(msg: S) -> Self {
        Self::MissingDependency(msg.into())
    }

    /// Shape disagreement between what the metadata promises and what was found.
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::DataIntegrity {
            index: None,
            detail: format!("expected shape {expected:?}, found {actual:?}"),
        }
    }
}

impl From<validator::ValidationErrors> for SimError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::InvalidParameter(format!("{e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_display() {
        let err = SimError::shape_mismatch(&[3, 2, 4, 4], &[96]);
        let msg = err.to_string();
        assert!(!msg.contains("at index"));
        assert!(msg.contains("[3, 2, 4, 4]"));
        assert!(msg.contains("[96]"));
    }

    #[test]
    fn test_value_error_reports_index() {
        let err = SimError::DataIntegrity {
            index: Some(13),
            detail: "spin value 0 is not +1/-1".into(),
        };
        assert!(err.to_string().contains("at index 13"));
    }
}
