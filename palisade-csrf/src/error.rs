use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsrfError {
    /// The audit log directory is missing or not writable
    #[error("Log directory not found or not writable: {}", .0.display())]
    LogDirectoryNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Malformed URL pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },

    #[error("Client script generation failed: {0}")]
    AssetGeneration(String),

    #[error("Configuration file could not be parsed: {0}")]
    ConfigParse(String),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CsrfError {
    /// Errors caused by the deployment rather than by the request.
    /// These abort authorization; they never degrade to "allow".
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CsrfError::LogDirectoryNotFound(_)
                | CsrfError::Configuration(_)
                | CsrfError::MalformedPattern { .. }
                | CsrfError::ConfigParse(_)
        )
    }
}

impl From<CsrfError> for palisade_core::Error {
    fn from(err: CsrfError) -> Self {
        palisade_core::Error::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CsrfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(CsrfError::LogDirectoryNotFound(PathBuf::from("/nope")).is_configuration_error());
        assert!(
            CsrfError::MalformedPattern {
                pattern: "".into(),
                reason: "empty".into()
            }
            .is_configuration_error()
        );
        assert!(!CsrfError::AssetGeneration("disk full".into()).is_configuration_error());
    }

    #[test]
    fn test_maps_to_internal_error() {
        let err: palisade_core::Error = CsrfError::Configuration("bad".into()).into();
        assert_eq!(err.status_code(), 500);
    }
}
