use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Priced version {priced_id} is finalized and cannot be modified")]
    VersionFinalized { priced_id: String },

    #[error("Priced version {priced_id} has already been finalized")]
    AlreadyFinalized { priced_id: String },

    #[error("Integrity mismatch for priced version {priced_id}: {detail}")]
    IntegrityMismatch { priced_id: String, detail: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DomainError {
    /// Whether this error is likely transient and the operation may succeed
    /// if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            DomainError::Storage(err) => err.is_transient(),
            _ => false,
        }
    }

    pub fn not_found(entity: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        DomainError::NotFound {
            entity,
            field,
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage used before initialize()")]
    NotInitialized,

    #[error("Storage timeout during {operation} on key {key:?}")]
    Timeout {
        operation: &'static str,
        key: Option<String>,
    },

    #[error("Legacy key migration failed for {key}: {reason}")]
    MigrationFailure { key: String, reason: String },

    #[error("Storage adapter error: {0}")]
    Adapter(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Timeout { .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_transient() {
        let timeout = DomainError::from(StorageError::Timeout {
            operation: "set",
            key: Some("k".into()),
        });
        assert!(timeout.is_transient());

        let finalized = DomainError::VersionFinalized {
            priced_id: "p1".into(),
        };
        assert!(!finalized.is_transient());
        assert!(!DomainError::from(StorageError::NotInitialized).is_transient());
    }

    #[test]
    fn not_found_message() {
        let err = DomainError::not_found("Base", "id", "b-1");
        assert_eq!(err.to_string(), "Not found: Base with id=b-1");
    }
}
