//! Communities and their membership roster
//!
//! Communities are managed elsewhere; this crate only reads membership to
//! authorize curators and to address notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, EntityPrefix};

/// Role a member holds within a community
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunityRole {
    Owner,
    Manager,
    Curator,
    Reader,
}

impl std::fmt::Display for CommunityRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommunityRole::Owner => write!(f, "owner"),
            CommunityRole::Manager => write!(f, "manager"),
            CommunityRole::Curator => write!(f, "curator"),
            CommunityRole::Reader => write!(f, "reader"),
        }
    }
}

impl std::str::FromStr for CommunityRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(CommunityRole::Owner),
            "manager" => Ok(CommunityRole::Manager),
            "curator" => Ok(CommunityRole::Curator),
            "reader" => Ok(CommunityRole::Reader),
            _ => Err(format!("Unknown community role: {}", s)),
        }
    }
}

/// A member of a community
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// User account of the member
    pub user: EntityId,

    /// Contact address used for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub role: CommunityRole,
}

/// A curated community that receives submissions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub id: EntityId,

    /// URL slug, used when building request links
    pub slug: String,

    pub title: String,

    #[serde(default)]
    pub members: Vec<Member>,

    #[serde(default)]
    pub revision: u32,

    pub created: DateTime<Utc>,
}

impl Community {
    /// Create an empty community
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Com),
            slug: slug.into(),
            title: title.into(),
            members: Vec::new(),
            revision: 0,
            created: Utc::now(),
        }
    }

    /// Builder-style helper to add a member
    pub fn with_member(mut self, user: EntityId, email: Option<&str>, role: CommunityRole) -> Self {
        self.members.push(Member {
            user,
            email: email.map(|e| e.to_string()),
            role,
        });
        self
    }

    /// Find the membership of a user
    pub fn member(&self, user: &EntityId) -> Option<&Member> {
        self.members.iter().find(|m| &m.user == user)
    }

    /// Check whether the user holds one of the given roles
    pub fn has_role(&self, user: &EntityId, roles: &[CommunityRole]) -> bool {
        self.member(user).is_some_and(|m| roles.contains(&m.role))
    }

    /// Members holding one of the given roles
    pub fn members_with_roles<'a>(
        &'a self,
        roles: &'a [CommunityRole],
    ) -> impl Iterator<Item = &'a Member> + 'a {
        self.members.iter().filter(move |m| roles.contains(&m.role))
    }
}
