//! Error types for every fallible seam in the crate.
//!
//! Only [`TrackerError::MissingCustomerId`] ever reaches callers of the public
//! cache, engine and tracker operations. Everything else is logged and
//! degraded at the boundary where it occurs.

use thiserror::Error;

/// Failures of the durable cache mirror.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("mirror storage failed: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("mirror quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: usize, available: usize },
    #[error("mirror unavailable: {0}")]
    Unavailable(String),
}

/// Failures while loading or validating catalog data.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog TOML is malformed: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("catalog JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{context} references unknown resource '{id}'")]
    UnknownResource { context: String, id: String },
    #[error("duplicate resource id '{0}'")]
    DuplicateResource(String),
}

/// Failures of the outbound catalog collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("catalog source unavailable: {0}")]
    Unavailable(String),
    #[error("catalog source returned an invalid payload: {0}")]
    InvalidPayload(String),
}

/// Failures of the outbound completion sink.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("record store rejected completion: {0}")]
    Rejected(String),
    #[error("record store unreachable: {0}")]
    Unreachable(String),
}

/// Caller bugs detected by the completion tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    #[error("completion event for task '{task_id}' has no customer id")]
    MissingCustomerId { task_id: String },
}

/// Failures while loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config TOML is malformed: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_customer_display_names_task() {
        let e = TrackerError::MissingCustomerId { task_id: "t-1".into() };
        assert!(e.to_string().contains("t-1"));
    }

    #[test]
    fn test_quota_display_includes_sizes() {
        let e = MirrorError::QuotaExceeded { needed: 10, available: 4 };
        let s = e.to_string();
        assert!(s.contains("10") && s.contains('4'));
    }

    #[test]
    fn test_unknown_resource_display() {
        let e = CatalogError::UnknownResource { context: "activity 'x'".into(), id: "r9".into() };
        assert_eq!(e.to_string(), "activity 'x' references unknown resource 'r9'");
    }
}
