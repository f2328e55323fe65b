//! Provider contract for persistent identifier registries

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::core::store::StoreError;
use crate::entities::record::Record;
use crate::pids::pid::{Pid, PidActionError};
use crate::pids::transport::TransportError;

static DOI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());

/// Failure of a provider operation
///
/// Providers never panic on registry failures; everything the registry or the
/// network can do wrong ends up here.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Registry unreachable during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Registry rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },

    #[error("Registry accepted the reservation but returned no DOI")]
    MissingIdentifier,

    #[error(transparent)]
    InvalidAction(#[from] PidActionError),

    #[error("Provider misconfigured: {0}")]
    Misconfigured(String),

    #[error("Could not persist registry outcome: {0}")]
    Store(#[from] StoreError),
}

impl ProviderError {
    /// Whether repeating the same call may succeed
    ///
    /// Network failures, timeouts and server errors are retryable; registry
    /// rejections and local state errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport { source, .. } => match source {
                TransportError::Http { status, .. } => *status >= 500 || *status == 429,
                TransportError::Decode(_) => false,
                TransportError::Timeout | TransportError::Connection(_) => true,
            },
            ProviderError::Store(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Short label used in metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            ProviderError::Transport { .. } => "transport_error",
            ProviderError::Rejected { .. } => "rejected",
            ProviderError::MissingIdentifier => "missing_identifier",
            ProviderError::InvalidAction(_) => "invalid_action",
            ProviderError::Misconfigured(_) => "misconfigured",
            ProviderError::Store(_) => "store_error",
        }
    }
}

/// What `delete` actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The identifier never left this system and was removed
    Removed,
    /// Removed locally; the registry still holds the identifier
    LocalOnly,
}

/// Capability set of a PID registry
pub trait PidProvider: Send + Sync {
    /// Provider name stored on the PIDs it manages
    fn name(&self) -> &str;

    /// Reserve a new identifier for the record
    fn generate_id(&self, record: &Record) -> Result<Pid, ProviderError>;

    /// Whether the identifier can still be changed locally
    fn can_modify(&self, pid: &Pid) -> bool {
        !pid.is_registered() && !pid.is_reserved()
    }

    /// Mark the identifier registered and publish the record's metadata
    fn register(&self, pid: &mut Pid, record: &Record, url: Option<&str>)
        -> Result<(), ProviderError>;

    /// Refresh the registry's metadata for an identifier
    fn update(&self, pid: &Pid, record: &Record, url: Option<&str>) -> Result<(), ProviderError>;

    /// Remove the identifier
    fn delete(&self, pid: &Pid) -> Result<DeleteOutcome, ProviderError>;

    /// Check the record's identifier; returns `(passed, errors)`
    fn validate(&self, record: &Record) -> (bool, Vec<String>) {
        let errors = validate_doi_shape(record);
        (errors.is_empty(), errors)
    }
}

/// Generic identifier shape checks shared by providers
pub fn validate_doi_shape(record: &Record) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(pid) = &record.pids.doi {
        if pid.pid_type != "doi" {
            errors.push(format!("Unexpected identifier type '{}'", pid.pid_type));
        }
        if !DOI_RE.is_match(&pid.pid_value) {
            errors.push(format!("'{}' is not a valid DOI", pid.pid_value));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = ProviderError::Transport {
            operation: "register",
            source: TransportError::Timeout,
        };
        assert!(timeout.is_retryable());

        let bad_request = ProviderError::Transport {
            operation: "register",
            source: TransportError::Http {
                status: 400,
                body: String::new(),
            },
        };
        assert!(!bad_request.is_retryable());

        let unavailable = ProviderError::Transport {
            operation: "register",
            source: TransportError::Http {
                status: 503,
                body: String::new(),
            },
        };
        assert!(unavailable.is_retryable());

        let rejected = ProviderError::Rejected {
            operation: "reserve",
            message: "bad metadata".to_string(),
        };
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.outcome(), "rejected");
    }

    #[test]
    fn test_doi_shape() {
        use crate::core::identity::{EntityId, EntityPrefix};
        use crate::entities::metadata::Metadata;

        let mut record = Record::new_draft(EntityId::new(EntityPrefix::Usr), Metadata::new("A"));
        assert!(validate_doi_shape(&record).is_empty());

        record.pids.doi = Some(Pid::reserved_doi("10.11578/1529383", "osti"));
        assert!(validate_doi_shape(&record).is_empty());

        record.pids.doi = Some(Pid::reserved_doi("not-a-doi", "osti"));
        assert_eq!(validate_doi_shape(&record).len(), 1);
    }
}
