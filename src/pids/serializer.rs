//! Registry document built from record metadata

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::core::config::RegistryConfig;
use crate::core::identity::EntityId;
use crate::entities::metadata::{Metadata, PersonOrOrgKind};
use crate::entities::record::Record;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Title sent when a draft has none yet
pub const PLACEHOLDER_TITLE: &str = "Placeholder Title";

/// Key under which the registry files a record
///
/// Derived only from configuration and the record ID so every reserve,
/// register and update call addresses the same registry entry.
pub fn accession_key(prefix: &str, record_id: &EntityId) -> String {
    format!("{}-{}", prefix, record_id)
}

/// Remove markup and collapse whitespace
pub fn strip_html(text: &str) -> String {
    let without_tags = TAG_RE.replace_all(text, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    SPACE_RE.replace_all(decoded.trim(), " ").into_owned()
}

/// First `max_chars` characters of `text`
///
/// Counts characters, not bytes, so multi-byte text is never split mid-char.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Registry dataset type code for a resource type
fn dataset_type(resource_type: &str) -> &'static str {
    match resource_type.split('-').next().unwrap_or_default() {
        "dataset" => "ND",
        "image" => "IP",
        "video" | "audio" => "MM",
        "model" => "AS",
        _ => "SM",
    }
}

/// Registry author entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    pub last_name: String,
}

/// Document posted to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_type: Option<String>,

    /// Subjects joined with `;`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    /// `MM/DD/YYYY`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,

    pub accession_num: String,

    pub contract_nos: String,

    pub sponsor_org: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
}

impl RegistryDocument {
    /// Minimal document used to reserve a DOI
    ///
    /// Works for incomplete drafts: only the title is read, and a placeholder
    /// is used when it is blank.
    pub fn reservation(record: &Record, config: &RegistryConfig) -> Self {
        let title = record.metadata.title.trim();
        Self {
            title: if title.is_empty() {
                PLACEHOLDER_TITLE.to_string()
            } else {
                title.to_string()
            },
            description: None,
            dataset_type: None,
            keywords: None,
            publication_date: None,
            authors: Vec::new(),
            accession_num: accession_key(&config.accession_number_prefix, &record.id),
            contract_nos: config.contract_nos.clone(),
            sponsor_org: config.sponsor_org.clone(),
            site_url: None,
        }
    }

    /// Full document used to register or update a DOI
    pub fn from_record(record: &Record, config: &RegistryConfig, url: Option<&str>) -> Self {
        let metadata = &record.metadata;
        Self {
            title: metadata.title.clone(),
            description: description(metadata, config.abstract_max_len),
            dataset_type: metadata
                .resource_type
                .as_ref()
                .map(|rt| dataset_type(&rt.id).to_string()),
            keywords: keywords(metadata),
            publication_date: metadata.publication_date.as_deref().and_then(us_date),
            authors: authors(metadata),
            accession_num: accession_key(&config.accession_number_prefix, &record.id),
            contract_nos: config.contract_nos.clone(),
            sponsor_org: config.sponsor_org.clone(),
            site_url: url.map(str::to_string),
        }
    }

    /// Canonical JSON payload
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// SHA-256 of the canonical payload, hex encoded
    pub fn digest(&self) -> Result<String, serde_json::Error> {
        let hash = Sha256::digest(self.to_json()?.as_bytes());
        Ok(hash.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

fn description(metadata: &Metadata, max_len: usize) -> Option<String> {
    let text = strip_html(metadata.abstract_text()?);
    if text.is_empty() {
        return None;
    }
    Some(truncate_chars(&text, max_len).to_string())
}

fn keywords(metadata: &Metadata) -> Option<String> {
    if metadata.subjects.is_empty() {
        return None;
    }
    Some(
        metadata
            .subjects
            .iter()
            .map(|s| format!("{};", s.subject))
            .collect(),
    )
}

fn us_date(iso: &str) -> Option<String> {
    // Accept full dates and the year-month / year-only forms metadata allows
    let date = NaiveDate::parse_from_str(iso, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", iso), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01-01", iso), "%Y-%m-%d"))
        .ok()?;
    Some(date.format("%m/%d/%Y").to_string())
}

fn authors(metadata: &Metadata) -> Vec<Author> {
    metadata
        .creators
        .iter()
        .filter_map(|c| {
            let p = &c.person_or_org;
            match p.kind {
                PersonOrOrgKind::Personal => {
                    let last_name = p
                        .family_name
                        .clone()
                        .or_else(|| p.name.clone())?;
                    Some(Author {
                        first_name: p.given_name.clone(),
                        last_name,
                    })
                }
                PersonOrOrgKind::Organizational => p.name.clone().map(|name| Author {
                    first_name: None,
                    last_name: name,
                }),
            }
        })
        .collect()
}
