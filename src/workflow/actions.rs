//! Request actions and the transition table

use serde::{Deserialize, Serialize};

use crate::entities::request::RequestStatus;

/// Every action a request type may register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestAction {
    Create,
    Submit,
    Delete,
    Accept,
    Decline,
    Cancel,
    Expire,
}

impl RequestAction {
    pub fn all() -> &'static [RequestAction] {
        &[
            RequestAction::Create,
            RequestAction::Submit,
            RequestAction::Delete,
            RequestAction::Accept,
            RequestAction::Decline,
            RequestAction::Cancel,
            RequestAction::Expire,
        ]
    }

    /// Status the request must be in for this action to apply
    pub fn source_status(&self) -> RequestStatus {
        match self {
            RequestAction::Create | RequestAction::Submit | RequestAction::Delete => {
                RequestStatus::Draft
            }
            RequestAction::Accept
            | RequestAction::Decline
            | RequestAction::Cancel
            | RequestAction::Expire => RequestStatus::Open,
        }
    }

    /// Status after the action, or `None` for `create`/`delete` which make or
    /// destroy the request rather than transition it
    pub fn target_status(&self) -> Option<RequestStatus> {
        match self {
            RequestAction::Create | RequestAction::Delete => None,
            RequestAction::Submit => Some(RequestStatus::Open),
            RequestAction::Accept => Some(RequestStatus::Accepted),
            RequestAction::Decline => Some(RequestStatus::Declined),
            RequestAction::Cancel => Some(RequestStatus::Cancelled),
            RequestAction::Expire => Some(RequestStatus::Expired),
        }
    }

    /// Check whether the action may run from `from`
    pub fn is_allowed_from(&self, from: RequestStatus) -> bool {
        self.source_status() == from
    }
}

impl std::fmt::Display for RequestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestAction::Create => write!(f, "create"),
            RequestAction::Submit => write!(f, "submit"),
            RequestAction::Delete => write!(f, "delete"),
            RequestAction::Accept => write!(f, "accept"),
            RequestAction::Decline => write!(f, "decline"),
            RequestAction::Cancel => write!(f, "cancel"),
            RequestAction::Expire => write!(f, "expire"),
        }
    }
}

impl std::str::FromStr for RequestAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(RequestAction::Create),
            "submit" => Ok(RequestAction::Submit),
            "delete" => Ok(RequestAction::Delete),
            "accept" => Ok(RequestAction::Accept),
            "decline" => Ok(RequestAction::Decline),
            "cancel" => Ok(RequestAction::Cancel),
            "expire" => Ok(RequestAction::Expire),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

/// Actions that can be executed from the given status
pub fn allowed_actions(current: RequestStatus) -> Vec<RequestAction> {
    RequestAction::all()
        .iter()
        .copied()
        .filter(|a| *a != RequestAction::Create && a.is_allowed_from(current))
        .collect()
}
