//! Notification payloads

use serde::Serialize;

use crate::core::community::Community;
use crate::core::config::Config;
use crate::core::identity::EntityId;
use crate::entities::request::{Request, RequestType};

/// Which outcome a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Accepted,
    Declined,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Accepted => "accepted",
            NotificationKind::Declined => "declined",
        }
    }

    /// Embedded template holding the body
    pub fn template(&self) -> &'static str {
        match self {
            NotificationKind::Accepted => "submission_accepted.tera",
            NotificationKind::Declined => "submission_declined.tera",
        }
    }
}

/// A queued notification about a closed submission
///
/// Carries everything needed to render the message, so the worker never
/// reads the store.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub request_id: EntityId,
    pub record_title: String,
    pub community_title: String,
    pub request_link: String,
    pub actor: String,
    pub recipients: Vec<String>,
}

impl Notification {
    /// Notification to the receiving community's curators
    ///
    /// Recipients are members holding a curator role of the request type
    /// who have an e-mail address.
    pub fn for_curators(
        kind: NotificationKind,
        request_type: &RequestType,
        request: &Request,
        community: &Community,
        actor: impl Into<String>,
        config: &Config,
    ) -> Self {
        let recipients = community
            .members_with_roles(request_type.curator_roles)
            .filter_map(|m| m.email.clone())
            .filter(|e| !e.trim().is_empty())
            .collect();

        Self {
            kind,
            request_id: request.id,
            record_title: request.title.clone(),
            community_title: community.title.clone(),
            request_link: config.request_url(&community.slug, &request.id.to_string()),
            actor: actor.into(),
            recipients,
        }
    }
}

/// A rendered e-mail ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub sender: String,
    pub cc: Vec<String>,
}
