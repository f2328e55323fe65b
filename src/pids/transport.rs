//! Wire access to the DOI registry
//!
//! The registry answers every call with a JSON envelope
//! `{"status": "SUCCESS" | "FAILURE", "status_message": ..., "record": {"doi": ...}}`.
//! Transports only move documents; interpreting the status is the provider's job.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::core::config::RegistryConfig;
use crate::pids::serializer::RegistryDocument;

/// Status value the registry uses to report a rejected document
pub const STATUS_FAILURE: &str = "FAILURE";

/// Registry account
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Record part of a registry response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

/// Registry response envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryResponse {
    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,

    #[serde(default)]
    pub record: RegistryRecord,
}

impl RegistryResponse {
    pub fn success(doi: Option<&str>) -> Self {
        Self {
            status: "SUCCESS".to_string(),
            status_message: None,
            record: RegistryRecord {
                doi: doi.map(str::to_string),
            },
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_FAILURE.to_string(),
            status_message: Some(message.into()),
            record: RegistryRecord::default(),
        }
    }

    /// The failure reason if the registry rejected the document
    pub fn error(&self) -> Option<&str> {
        if self.status == STATUS_FAILURE {
            Some(self.status_message.as_deref().unwrap_or("registry reported FAILURE"))
        } else {
            None
        }
    }
}

/// Failure to get any answer from the registry
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Registry request timed out")]
    Timeout,

    #[error("Could not reach registry: {0}")]
    Connection(String),

    #[error("Registry answered HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Unreadable registry response: {0}")]
    Decode(String),
}

/// Blocking access to the registry API
pub trait RegistryTransport: Send + Sync {
    /// Ask the registry to reserve a DOI for the document
    fn reserve(
        &self,
        doc: &RegistryDocument,
        credentials: &Credentials,
    ) -> Result<RegistryResponse, TransportError>;

    /// Create or update the registry entry keyed by the document's accession number
    fn post(
        &self,
        doc: &RegistryDocument,
        credentials: &Credentials,
    ) -> Result<RegistryResponse, TransportError>;
}

/// HTTP transport using `reqwest`'s blocking client
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &RegistryConfig) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("subdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint().trim_end_matches('/').to_string(),
        })
    }

    fn send(
        &self,
        path: &str,
        doc: &RegistryDocument,
        credentials: &Credentials,
    ) -> Result<RegistryResponse, TransportError> {
        let url = format!("{}/{}", self.endpoint, path);
        tracing::debug!(url = %url, accession = %doc.accession_num, "posting to registry");

        let response = self
            .client
            .post(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .json(doc)
            .send()
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<RegistryResponse>()
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(err.to_string())
    }
}

impl RegistryTransport for HttpTransport {
    fn reserve(
        &self,
        doc: &RegistryDocument,
        credentials: &Credentials,
    ) -> Result<RegistryResponse, TransportError> {
        self.send("reserve", doc, credentials)
    }

    fn post(
        &self,
        doc: &RegistryDocument,
        credentials: &Credentials,
    ) -> Result<RegistryResponse, TransportError> {
        self.send("records", doc, credentials)
    }
}

/// Which transport call was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Reserve,
    Post,
}

/// A call recorded by [`MockTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub doc: RegistryDocument,
}

#[derive(Default)]
struct MockState {
    reserve: VecDeque<Result<RegistryResponse, TransportError>>,
    post: VecDeque<Result<RegistryResponse, TransportError>>,
    calls: Vec<RecordedCall>,
}

/// In-process transport with scripted answers, for tests and dry runs
///
/// Unscripted calls succeed; `reserve` then hands out a DOI derived from the
/// accession key.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reserve(&self, response: Result<RegistryResponse, TransportError>) {
        if let Ok(mut state) = self.state.lock() {
            state.reserve.push_back(response);
        }
    }

    pub fn push_post(&self, response: Result<RegistryResponse, TransportError>) {
        if let Ok(mut state) = self.state.lock() {
            state.post.push_back(response);
        }
    }

    /// All calls made so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    fn answer(
        &self,
        kind: CallKind,
        doc: &RegistryDocument,
    ) -> Result<RegistryResponse, TransportError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TransportError::Connection("mock transport poisoned".to_string()))?;
        state.calls.push(RecordedCall {
            kind,
            doc: doc.clone(),
        });
        let scripted = match kind {
            CallKind::Reserve => state.reserve.pop_front(),
            CallKind::Post => state.post.pop_front(),
        };
        scripted.unwrap_or_else(|| {
            Ok(match kind {
                CallKind::Reserve => {
                    RegistryResponse::success(Some(&format!("10.80000/{}", doc.accession_num)))
                }
                CallKind::Post => RegistryResponse::success(None),
            })
        })
    }
}

impl RegistryTransport for MockTransport {
    fn reserve(
        &self,
        doc: &RegistryDocument,
        _credentials: &Credentials,
    ) -> Result<RegistryResponse, TransportError> {
        self.answer(CallKind::Reserve, doc)
    }

    fn post(
        &self,
        doc: &RegistryDocument,
        _credentials: &Credentials,
    ) -> Result<RegistryResponse, TransportError> {
        self.answer(CallKind::Post, doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_error_detection() {
        assert_eq!(RegistryResponse::success(Some("10.1/x")).error(), None);
        assert_eq!(
            RegistryResponse::failure("bad metadata").error(),
            Some("bad metadata")
        );

        let bare: RegistryResponse = serde_json::from_str(r#"{"status":"FAILURE"}"#).unwrap();
        assert_eq!(bare.error(), Some("registry reported FAILURE"));
    }

    #[test]
    fn test_response_parses_registry_envelope() {
        let json = r#"{"status":"SUCCESS","record":{"doi":"10.11578/1529383","osti_id":"1529383"}}"#;
        let response: RegistryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.record.doi.as_deref(), Some("10.11578/1529383"));
        assert!(response.error().is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[test]
    fn test_http_transport_honours_test_mode() {
        let mut config = RegistryConfig::with_defaults();
        config.test_mode = true;
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.endpoint, config.test_base_url);
    }
}
