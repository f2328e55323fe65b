//! Persistent identifier record and its local state transitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Local status of a persistent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PidStatus {
    #[default]
    #[serde(rename = "N")]
    New,
    #[serde(rename = "K")]
    Reserved,
    #[serde(rename = "R")]
    Registered,
}

impl std::fmt::Display for PidStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PidStatus::New => write!(f, "new"),
            PidStatus::Reserved => write!(f, "reserved"),
            PidStatus::Registered => write!(f, "registered"),
        }
    }
}

/// Rejected local PID transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PidActionError {
    #[error("Persistent identifier {0} has already been registered")]
    AlreadyRegistered(String),

    #[error("Persistent identifier has no value")]
    Empty,
}

/// A persistent identifier attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pid {
    pub pid_type: String,
    pub pid_value: String,
    pub status: PidStatus,

    /// Name of the provider that manages the identifier
    pub provider: String,
}

impl Pid {
    /// A DOI handed out by the registry, in reserved state
    pub fn reserved_doi(value: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            pid_type: "doi".to_string(),
            pid_value: value.into(),
            status: PidStatus::Reserved,
            provider: provider.into(),
        }
    }

    pub fn is_registered(&self) -> bool {
        self.status == PidStatus::Registered
    }

    pub fn is_reserved(&self) -> bool {
        self.status == PidStatus::Reserved
    }

    /// Mark as registered locally
    pub fn register(&mut self) -> Result<(), PidActionError> {
        if self.pid_value.is_empty() {
            return Err(PidActionError::Empty);
        }
        if self.is_registered() {
            return Err(PidActionError::AlreadyRegistered(self.pid_value.clone()));
        }
        self.status = PidStatus::Registered;
        Ok(())
    }
}
