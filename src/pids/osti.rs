//! OSTI E-Link DOI provider
//!
//! DOIs are reserved at the registry rather than minted locally. Each record
//! is filed under an accession key built from the configured prefix and the
//! record ID, so reservation, registration and later updates all address the
//! same registry entry no matter how often they are retried.

use metrics::counter;
use std::sync::Arc;

use crate::core::config::RegistryConfig;
use crate::core::identity::EntityId;
use crate::core::store::Store;
use crate::core::uow::UnitOfWork;
use crate::entities::record::Record;
use crate::pids::pid::Pid;
use crate::pids::provider::{validate_doi_shape, DeleteOutcome, PidProvider, ProviderError};
use crate::pids::serializer::RegistryDocument;
use crate::pids::transport::{Credentials, RegistryResponse, RegistryTransport, TransportError};

/// Provider name stored on managed PIDs
pub const OSTI_PROVIDER: &str = "osti";

pub struct OstiProvider {
    config: RegistryConfig,
    transport: Arc<dyn RegistryTransport>,
    store: Store,
}

impl OstiProvider {
    pub fn new(config: RegistryConfig, transport: Arc<dyn RegistryTransport>, store: Store) -> Self {
        let missing = config.missing_credentials();
        if !missing.is_empty() {
            tracing::warn!(
                missing = %missing.join(", "),
                "OSTI provider is misconfigured; registry calls will likely fail"
            );
        }
        Self {
            config,
            transport,
            store,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn credentials(&self) -> Credentials {
        Credentials::from_config(&self.config)
    }

    /// Run one registry call and turn its outcome into a provider result
    fn call(
        &self,
        operation: &'static str,
        doc: &RegistryDocument,
        send: impl FnOnce(&RegistryDocument, &Credentials) -> Result<RegistryResponse, TransportError>,
    ) -> Result<RegistryResponse, ProviderError> {
        tracing::debug!(operation, doc = ?doc, "document sent to registry");

        let result = match send(doc, &self.credentials()) {
            Err(source) => Err(ProviderError::Transport { operation, source }),
            Ok(response) => match response.error() {
                Some(message) => Err(ProviderError::Rejected {
                    operation,
                    message: message.to_string(),
                }),
                None => Ok(response),
            },
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        counter!(
            "subdesk_registry_calls_total",
            "operation" => operation,
            "outcome" => outcome
        )
        .increment(1);

        if let Err(e) = &result {
            tracing::error!(
                operation,
                accession = %doc.accession_num,
                error = %e,
                "registry call failed"
            );
        }
        result
    }

    /// Store the failure reason on the record so the uploader can see it
    ///
    /// Runs in its own unit of work against the latest committed record.
    fn persist_minting_error(&self, record_id: &EntityId, reason: &str) -> Result<(), ProviderError> {
        let mut record = self.store.require_record(record_id)?;
        record.metadata.msdlive_doi_minting_error = Some(reason.to_string());

        let mut uow = UnitOfWork::new();
        uow.commit_record(record);
        uow.index_record(*record_id);
        uow.commit(&self.store)?;
        Ok(())
    }
}

impl PidProvider for OstiProvider {
    fn name(&self) -> &str {
        OSTI_PROVIDER
    }

    fn generate_id(&self, record: &Record) -> Result<Pid, ProviderError> {
        let doc = RegistryDocument::reservation(record, &self.config);
        let response = self.call("reserve", &doc, |d, c| self.transport.reserve(d, c))?;

        let doi = response
            .record
            .doi
            .filter(|doi| !doi.trim().is_empty())
            .ok_or(ProviderError::MissingIdentifier)?;

        tracing::info!(record_id = %record.id, doi = %doi, "DOI reserved");
        Ok(Pid::reserved_doi(doi, OSTI_PROVIDER))
    }

    fn register(
        &self,
        pid: &mut Pid,
        record: &Record,
        url: Option<&str>,
    ) -> Result<(), ProviderError> {
        // Local intent first; nothing is sent if it cannot be recorded
        pid.register()?;

        let doc = RegistryDocument::from_record(record, &self.config, url);
        match self.call("register", &doc, |d, c| self.transport.post(d, c)) {
            Ok(_) => {
                tracing::info!(record_id = %record.id, doi = %pid.pid_value, "DOI registered");
                Ok(())
            }
            Err(err) => {
                let reason = match &err {
                    ProviderError::Rejected { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                if let Err(persist) = self.persist_minting_error(&record.id, &reason) {
                    tracing::error!(
                        record_id = %record.id,
                        error = %persist,
                        "could not record DOI minting error"
                    );
                }
                Err(err)
            }
        }
    }

    fn update(&self, pid: &Pid, record: &Record, url: Option<&str>) -> Result<(), ProviderError> {
        let doc = RegistryDocument::from_record(record, &self.config, url);
        self.call("update", &doc, |d, c| self.transport.post(d, c))?;
        tracing::info!(record_id = %record.id, doi = %pid.pid_value, "DOI metadata updated");
        Ok(())
    }

    fn delete(&self, pid: &Pid) -> Result<DeleteOutcome, ProviderError> {
        if self.can_modify(pid) {
            return Ok(DeleteOutcome::Removed);
        }
        // The registry has no delete API for reserved or registered DOIs
        tracing::warn!(
            doi = %pid.pid_value,
            status = %pid.status,
            "registry cannot retract DOI; removing it locally only"
        );
        Ok(DeleteOutcome::LocalOnly)
    }

    fn validate(&self, record: &Record) -> (bool, Vec<String>) {
        let errors = validate_doi_shape(record);
        if !errors.is_empty() {
            tracing::debug!(record_id = %record.id, ?errors, "ignoring DOI validation errors");
        }
        (true, Vec::new())
    }
}
