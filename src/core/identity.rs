//! Entity identifiers, typed references and acting identities

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Prefix identifying the kind of aggregate an ID belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityPrefix {
    /// Draft or published record
    Rec,
    /// Review request
    Req,
    /// Community
    Com,
    /// User account
    Usr,
    /// Request lifecycle event
    Evt,
}

impl EntityPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityPrefix::Rec => "REC",
            EntityPrefix::Req => "REQ",
            EntityPrefix::Com => "COM",
            EntityPrefix::Usr => "USR",
            EntityPrefix::Evt => "EVT",
        }
    }

    pub fn all() -> &'static [EntityPrefix] {
        &[
            EntityPrefix::Rec,
            EntityPrefix::Req,
            EntityPrefix::Com,
            EntityPrefix::Usr,
            EntityPrefix::Evt,
        ]
    }
}

impl fmt::Display for EntityPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityPrefix {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "REC" => Ok(EntityPrefix::Rec),
            "REQ" => Ok(EntityPrefix::Req),
            "COM" => Ok(EntityPrefix::Com),
            "USR" => Ok(EntityPrefix::Usr),
            "EVT" => Ok(EntityPrefix::Evt),
            _ => Err(IdParseError::UnknownPrefix(s.to_string())),
        }
    }
}

/// Errors produced while parsing an [`EntityId`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("Missing '-' separator in ID: {0}")]
    MissingSeparator(String),

    #[error("Unknown entity prefix: {0}")]
    UnknownPrefix(String),

    #[error("Invalid ULID '{value}': {message}")]
    InvalidUlid { value: String, message: String },
}

/// Unique identifier of an aggregate: `PREFIX-ULID` (e.g. `REC-01HZX...`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    prefix: EntityPrefix,
    ulid: Ulid,
}

impl EntityId {
    /// Generate a fresh ID for the given prefix
    pub fn new(prefix: EntityPrefix) -> Self {
        Self {
            prefix,
            ulid: Ulid::new(),
        }
    }

    pub fn prefix(&self) -> EntityPrefix {
        self.prefix
    }

    pub fn ulid(&self) -> Ulid {
        self.ulid
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.prefix, self.ulid)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, ulid) = s
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingSeparator(s.to_string()))?;
        let prefix: EntityPrefix = prefix.parse()?;
        let ulid = Ulid::from_string(ulid).map_err(|e| IdParseError::InvalidUlid {
            value: ulid.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { prefix, ulid })
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Kinds of aggregates a request may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    User,
    Community,
    Record,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefKind::User => write!(f, "user"),
            RefKind::Community => write!(f, "community"),
            RefKind::Record => write!(f, "record"),
        }
    }
}

/// Typed reference from a request to another aggregate
///
/// Serialized as a single-key map, e.g. `{"community": "COM-01H..."}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityRef {
    User(EntityId),
    Community(EntityId),
    Record(EntityId),
}

impl EntityRef {
    pub fn kind(&self) -> RefKind {
        match self {
            EntityRef::User(_) => RefKind::User,
            EntityRef::Community(_) => RefKind::Community,
            EntityRef::Record(_) => RefKind::Record,
        }
    }

    pub fn id(&self) -> &EntityId {
        match self {
            EntityRef::User(id) | EntityRef::Community(id) | EntityRef::Record(id) => id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// The party performing an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// An authenticated user
    User(EntityId),
    /// Scheduler and other automatic processes
    System,
}

impl Identity {
    pub fn user_id(&self) -> Option<&EntityId> {
        match self {
            Identity::User(id) => Some(id),
            Identity::System => None,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Identity::System)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => write!(f, "{}", id),
            Identity::System => write!(f, "system"),
        }
    }
}
