//! Review request entity - a submission of a record to a community

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::community::CommunityRole;
use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix, EntityRef, RefKind};
use crate::workflow::actions::RequestAction;

/// Lifecycle status of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Draft,
    Open,
    Accepted,
    Declined,
    Cancelled,
    Expired,
}

impl RequestStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Accepted
                | RequestStatus::Declined
                | RequestStatus::Cancelled
                | RequestStatus::Expired
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, RequestStatus::Open)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Draft => write!(f, "draft"),
            RequestStatus::Open => write!(f, "open"),
            RequestStatus::Accepted => write!(f, "accepted"),
            RequestStatus::Declined => write!(f, "declined"),
            RequestStatus::Cancelled => write!(f, "cancelled"),
            RequestStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(RequestStatus::Draft),
            "open" => Ok(RequestStatus::Open),
            "accepted" => Ok(RequestStatus::Accepted),
            "declined" => Ok(RequestStatus::Declined),
            "cancelled" => Ok(RequestStatus::Cancelled),
            "expired" => Ok(RequestStatus::Expired),
            _ => Err(format!("Unknown request status: {}", s)),
        }
    }
}

/// Static description of a request type
#[derive(Debug)]
pub struct RequestType {
    pub type_id: &'static str,
    pub name: &'static str,

    /// Records under an unresolved review of this type may not be published directly
    pub block_publish: bool,

    /// Accepted records make the receiver their default community
    pub set_as_default: bool,

    pub creator_can_be_none: bool,
    pub topic_can_be_none: bool,

    pub allowed_creator_ref_types: &'static [RefKind],
    pub allowed_receiver_ref_types: &'static [RefKind],
    pub allowed_topic_ref_types: &'static [RefKind],

    /// Receiver roles allowed to accept or decline
    pub curator_roles: &'static [CommunityRole],

    /// Actions registered for this type; anything else is rejected
    pub available_actions: &'static [RequestAction],
}

impl RequestType {
    pub fn has_action(&self, action: RequestAction) -> bool {
        self.available_actions.contains(&action)
    }
}

/// Review request for submitting a record to a community
pub const COMMUNITY_SUBMISSION: RequestType = RequestType {
    type_id: "community-submission",
    name: "Community submission",
    block_publish: true,
    set_as_default: true,
    creator_can_be_none: false,
    topic_can_be_none: false,
    allowed_creator_ref_types: &[RefKind::User],
    allowed_receiver_ref_types: &[RefKind::Community],
    allowed_topic_ref_types: &[RefKind::Record],
    curator_roles: &[
        CommunityRole::Owner,
        CommunityRole::Manager,
        CommunityRole::Curator,
    ],
    available_actions: &[
        RequestAction::Create,
        RequestAction::Submit,
        RequestAction::Delete,
        RequestAction::Accept,
        RequestAction::Cancel,
        RequestAction::Decline,
        RequestAction::Expire,
    ],
};

/// One submission-to-community workflow instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: EntityId,

    #[serde(rename = "type")]
    pub request_type: String,

    pub status: RequestStatus,

    pub created_by: EntityRef,

    pub receiver: EntityRef,

    pub topic: EntityRef,

    /// Copy of the topic's title, taken at submission
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub revision: u32,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Request {
    /// Create a request in `draft` status
    pub fn new(
        request_type: &RequestType,
        created_by: EntityRef,
        receiver: EntityRef,
        topic: EntityRef,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(EntityPrefix::Req),
            request_type: request_type.type_id.to_string(),
            status: RequestStatus::Draft,
            created_by,
            receiver,
            topic,
            title: String::new(),
            revision: 0,
            created: now,
            updated: now,
            submitted_at: None,
            closed_at: None,
            expires_at: None,
        }
    }

    /// ID of the creating user
    pub fn creator_id(&self) -> &EntityId {
        self.created_by.id()
    }
}

impl Entity for Request {
    fn revision(&self) -> u32 {
        self.revision
    }

    fn set_revision(&mut self, revision: u32) {
        self.revision = revision;
    }
}

/// Audit entry written for every executed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub id: EntityId,
    pub request_id: EntityId,
    pub action: RequestAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<RequestStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<RequestStatus>,

    /// `system` or the acting user ID
    pub actor: String,

    pub timestamp: DateTime<Utc>,
}

impl RequestEvent {
    pub fn new(
        request_id: EntityId,
        action: RequestAction,
        from: Option<RequestStatus>,
        to: Option<RequestStatus>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Evt),
            request_id,
            action,
            from,
            to,
            actor: actor.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!RequestStatus::Draft.is_terminal());
        assert!(!RequestStatus::Open.is_terminal());
        for status in [
            RequestStatus::Accepted,
            RequestStatus::Declined,
            RequestStatus::Cancelled,
            RequestStatus::Expired,
        ] {
            assert!(status.is_terminal(), "{} should be terminal", status);
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("OPEN".parse::<RequestStatus>(), Ok(RequestStatus::Open));
        assert!("closed".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_community_submission_type() {
        assert_eq!(COMMUNITY_SUBMISSION.type_id, "community-submission");
        assert!(COMMUNITY_SUBMISSION.block_publish);
        assert!(COMMUNITY_SUBMISSION.set_as_default);
        assert!(COMMUNITY_SUBMISSION.has_action(RequestAction::Expire));
        assert_eq!(COMMUNITY_SUBMISSION.allowed_receiver_ref_types, &[RefKind::Community]);
    }

    #[test]
    fn test_new_request_is_draft() {
        let request = Request::new(
            &COMMUNITY_SUBMISSION,
            EntityRef::User(EntityId::new(EntityPrefix::Usr)),
            EntityRef::Community(EntityId::new(EntityPrefix::Com)),
            EntityRef::Record(EntityId::new(EntityPrefix::Rec)),
        );
        assert_eq!(request.status, RequestStatus::Draft);
        assert_eq!(request.request_type, "community-submission");
        assert!(request.title.is_empty());
    }
}
