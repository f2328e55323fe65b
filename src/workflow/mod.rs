//! Review request workflow: actions, authorization, handlers and the engine

pub mod actions;
pub mod engine;
pub mod handlers;
pub mod policy;

use miette::Diagnostic;
use thiserror::Error;

use crate::core::identity::EntityId;
use crate::core::store::StoreError;
use crate::entities::request::RequestStatus;
use crate::pids::ProviderError;
use crate::publish::PublishError;
use crate::schema::validate::ValidationError;

pub use actions::{allowed_actions, RequestAction};
pub use engine::WorkflowEngine;
pub use handlers::{handler_for, ActionContext, ActionHandler};
pub use policy::{AuthorizationPolicy, CommunityRolePolicy, PolicySubject};

/// Errors returned by workflow actions
///
/// Every variant except `Provider` means nothing was written.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    #[error("Cannot {action} a request in {status} status")]
    #[diagnostic(
        code(subdesk::invalid_transition),
        help("allowed actions from {status}: {allowed}")
    )]
    InvalidTransition {
        action: RequestAction,
        status: RequestStatus,
        allowed: String,
    },

    #[error("{identity} is not allowed to {action} request {request_id}")]
    #[diagnostic(code(subdesk::unauthorized))]
    Unauthorized {
        identity: String,
        action: RequestAction,
        request_id: EntityId,
    },

    #[error(transparent)]
    #[diagnostic(
        code(subdesk::validation),
        help("complete the draft metadata and try again")
    )]
    Validation(#[from] ValidationError),

    #[error("{kind} {id} was modified concurrently")]
    #[diagnostic(code(subdesk::conflict), help("reload and retry the whole action"))]
    Conflict { kind: &'static str, id: String },

    #[error("Publishing record {record_id} failed: {source}")]
    #[diagnostic(code(subdesk::publication))]
    Publication {
        record_id: EntityId,
        #[source]
        source: PublishError,
    },

    #[error(transparent)]
    #[diagnostic(code(subdesk::provider))]
    Provider(#[from] ProviderError),

    #[error("{kind} not found: {id}")]
    #[diagnostic(code(subdesk::not_found))]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid {role} reference {reference}: expected {expected}")]
    #[diagnostic(code(subdesk::invalid_reference))]
    InvalidReference {
        role: &'static str,
        reference: String,
        expected: String,
    },

    #[error("Record {record_id} already has an unresolved review request {request_id}")]
    #[diagnostic(
        code(subdesk::review_exists),
        help("cancel or delete the existing request first")
    )]
    ReviewExists {
        record_id: EntityId,
        request_id: EntityId,
    },

    #[error("Storage error: {0}")]
    #[diagnostic(code(subdesk::store))]
    Store(StoreError),
}

impl WorkflowError {
    pub(crate) fn invalid_transition(action: RequestAction, status: RequestStatus) -> Self {
        let allowed = allowed_actions(status)
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>();
        WorkflowError::InvalidTransition {
            action,
            status,
            allowed: if allowed.is_empty() {
                "none".to_string()
            } else {
                allowed.join(", ")
            },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, WorkflowError::Conflict { .. })
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { kind, id, .. } => WorkflowError::Conflict { kind, id },
            StoreError::NotFound { kind, id } => WorkflowError::NotFound { kind, id },
            other => WorkflowError::Store(other),
        }
    }
}
