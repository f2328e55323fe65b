//! Descriptive record metadata
//!
//! Only the fields this crate reads are typed; anything else is kept in
//! `extra` so that round-tripping through the store never loses data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference into a controlled vocabulary (e.g. `{"id": "dataset"}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyRef {
    pub id: String,
}

impl VocabularyRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Person or organisation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonOrOrgKind {
    Personal,
    Organizational,
}

/// Creator name block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonOrOrg {
    #[serde(rename = "type")]
    pub kind: PersonOrOrgKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

/// A creator of the work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub person_or_org: PersonOrOrg,
}

impl Creator {
    /// Convenience constructor for a person
    pub fn person(given_name: &str, family_name: &str) -> Self {
        Self {
            person_or_org: PersonOrOrg {
                kind: PersonOrOrgKind::Personal,
                name: Some(format!("{}, {}", family_name, given_name)),
                given_name: Some(given_name.to_string()),
                family_name: Some(family_name.to_string()),
            },
        }
    }

    /// Convenience constructor for an organisation
    pub fn organization(name: &str) -> Self {
        Self {
            person_or_org: PersonOrOrg {
                kind: PersonOrOrgKind::Organizational,
                name: Some(name.to_string()),
                given_name: None,
                family_name: None,
            },
        }
    }
}

/// Extra description with a type (abstract, methods, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalDescription {
    pub description: String,

    #[serde(rename = "type")]
    pub kind: VocabularyRef,
}

/// Subject keyword
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub subject: String,
}

/// Additional project community a record should also belong to on acceptance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Record metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_descriptions: Vec<AdditionalDescription>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creators: Vec<Creator>,

    /// ISO date (`YYYY-MM-DD`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<VocabularyRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub msdlive_projects: Vec<ProjectRef>,

    /// Reason the last DOI registration failed, shown to the uploader
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msdlive_doi_minting_error: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// The text the registry should receive as the abstract
    ///
    /// An additional description typed `abstract` wins over the main
    /// description; with several, the last one is used.
    pub fn abstract_text(&self) -> Option<&str> {
        self.additional_descriptions
            .iter()
            .rev()
            .find(|d| d.kind.id == "abstract")
            .map(|d| d.description.as_str())
            .or(self.description.as_deref())
    }
}
