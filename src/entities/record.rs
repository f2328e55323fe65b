//! Record aggregate - a draft or published work and its parent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::entities::metadata::Metadata;
use crate::entities::request::{Request, RequestStatus};
use crate::pids::Pid;

/// Snapshot of the review request attached to a draft
///
/// Holds the request status as of the last commit so the draft's review
/// badge can be indexed without resolving the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRef {
    pub id: EntityId,
    pub status: RequestStatus,
}

impl From<&Request> for ReviewRef {
    fn from(request: &Request) -> Self {
        Self {
            id: request.id,
            status: request.status,
        }
    }
}

/// Membership of a record in one community
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityMembership {
    pub id: EntityId,

    /// Request that granted the membership, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<EntityId>,
}

/// The set of communities a record belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunitySet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    entries: Vec<CommunityMembership>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<EntityId>,
}

impl CommunitySet {
    /// Add a community; re-adding keeps a single entry
    ///
    /// When `default` is true the community becomes the record's default.
    pub fn add(&mut self, community: EntityId, request: Option<EntityId>, default: bool) {
        match self.entries.iter_mut().find(|m| m.id == community) {
            Some(existing) => {
                if existing.request.is_none() {
                    existing.request = request;
                }
            }
            None => self.entries.push(CommunityMembership {
                id: community,
                request,
            }),
        }
        if default {
            self.default = Some(community);
        }
    }

    /// Remove a community, clearing the default if it pointed there
    pub fn remove(&mut self, community: &EntityId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|m| &m.id != community);
        if self.default.as_ref() == Some(community) {
            self.default = None;
        }
        self.entries.len() != before
    }

    pub fn contains(&self, community: &EntityId) -> bool {
        self.entries.iter().any(|m| &m.id == community)
    }

    pub fn default(&self) -> Option<&EntityId> {
        self.default.as_ref()
    }

    pub fn is_default(&self, community: &EntityId) -> bool {
        self.default.as_ref() == Some(community)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.iter().map(|m| &m.id)
    }

    pub fn get(&self, community: &EntityId) -> Option<&CommunityMembership> {
        self.entries.iter().find(|m| &m.id == community)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parent of all versions of a record: owns communities and the review link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRecord {
    #[serde(default)]
    pub communities: CommunitySet,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewRef>,
}

/// Persistent identifiers attached to a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pids {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<Pid>,
}

/// A draft or published record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: EntityId,

    /// Uploader; keeps access regardless of review outcome
    pub owner: EntityId,

    #[serde(default)]
    pub revision: u32,

    #[serde(default)]
    pub is_published: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,

    pub metadata: Metadata,

    #[serde(default)]
    pub parent: ParentRecord,

    #[serde(default)]
    pub pids: Pids,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,
}

impl Record {
    /// Create a new, never committed draft
    pub fn new_draft(owner: EntityId, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(EntityPrefix::Rec),
            owner,
            revision: 0,
            is_published: false,
            published_at: None,
            metadata,
            parent: ParentRecord::default(),
            pids: Pids::default(),
            created: now,
            updated: now,
        }
    }

    /// Whether the draft currently has an unresolved review
    pub fn has_open_review(&self) -> bool {
        self.parent
            .review
            .is_some_and(|r| !r.status.is_terminal())
    }
}

impl Entity for Record {
    fn revision(&self) -> u32 {
        self.revision
    }

    fn set_revision(&mut self, revision: u32) {
        self.revision = revision;
    }
}
