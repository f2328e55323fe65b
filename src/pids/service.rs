//! Record-level DOI operations on top of a provider
//!
//! The service owns the retry policy: retryable provider errors are repeated
//! up to `registry.max_attempts` times. Each attempt reloads the record, so a
//! retry sends the same accession key with the latest committed metadata.

use std::sync::Arc;

use crate::core::config::Config;
use crate::core::identity::EntityId;
use crate::core::store::Store;
use crate::core::uow::UnitOfWork;
use crate::entities::record::Record;
use crate::pids::pid::Pid;
use crate::pids::provider::{DeleteOutcome, PidProvider, ProviderError};

/// What `register_or_update` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Updated,
}

#[derive(Clone)]
pub struct PidService {
    provider: Arc<dyn PidProvider>,
    store: Store,
    config: Config,
}

impl PidService {
    pub fn new(provider: Arc<dyn PidProvider>, store: Store, config: Config) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    pub fn provider(&self) -> &dyn PidProvider {
        self.provider.as_ref()
    }

    fn max_attempts(&self) -> u32 {
        self.config.registry.max_attempts.max(1)
    }

    fn with_retries<T>(
        &self,
        operation: &str,
        record_id: &EntityId,
        mut call: impl FnMut() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        operation,
                        record_id = %record_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "retrying registry operation"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn check_provider(&self, pid: &Pid) -> Result<(), ProviderError> {
        if pid.provider != self.provider.name() {
            return Err(ProviderError::Misconfigured(format!(
                "DOI {} is managed by '{}', not '{}'",
                pid.pid_value,
                pid.provider,
                self.provider.name()
            )));
        }
        Ok(())
    }

    fn save_pid(&self, record_id: &EntityId, pid: Option<Pid>) -> Result<Record, ProviderError> {
        self.update_record(record_id, |record| record.pids.doi = pid)
    }

    /// Attach a registered DOI and drop any failure left by earlier attempts
    fn save_registered(&self, record_id: &EntityId, pid: Pid) -> Result<Record, ProviderError> {
        self.update_record(record_id, |record| {
            record.pids.doi = Some(pid);
            record.metadata.msdlive_doi_minting_error = None;
        })
    }

    /// Apply `change` to the latest committed record in its own unit of work
    fn update_record(
        &self,
        record_id: &EntityId,
        change: impl FnOnce(&mut Record),
    ) -> Result<Record, ProviderError> {
        let mut record = self.store.require_record(record_id)?;
        change(&mut record);

        let mut uow = UnitOfWork::new();
        uow.commit_record(record);
        uow.index_record(*record_id);
        let committed = uow.commit(&self.store)?;
        committed
            .record(record_id)
            .cloned()
            .ok_or_else(|| ProviderError::Misconfigured("record vanished during commit".to_string()))
    }

    /// Reserve a DOI for a draft and attach it
    ///
    /// Returns the existing identifier when one is already reserved or
    /// registered. A failed reservation leaves the record untouched.
    pub fn reserve(&self, record_id: &EntityId) -> Result<Pid, ProviderError> {
        let record = self.store.require_record(record_id)?;
        if let Some(pid) = &record.pids.doi {
            if pid.is_reserved() || pid.is_registered() {
                return Ok(pid.clone());
            }
        }

        let pid = self.with_retries("reserve", record_id, || self.provider.generate_id(&record))?;
        self.with_retries("attach", record_id, || {
            self.save_pid(record_id, Some(pid.clone()))
        })?;
        Ok(pid)
    }

    /// Register the record's DOI, or refresh its metadata if already registered
    pub fn register_or_update(
        &self,
        record_id: &EntityId,
    ) -> Result<RegistrationOutcome, ProviderError> {
        let url = self.config.record_url(&record_id.to_string());

        self.with_retries("register", record_id, || {
            let record = self.store.require_record(record_id)?;
            let pid = record
                .pids
                .doi
                .clone()
                .ok_or(ProviderError::MissingIdentifier)?;
            self.check_provider(&pid)?;

            if pid.is_registered() {
                self.provider.update(&pid, &record, Some(&url))?;
                return Ok(RegistrationOutcome::Updated);
            }

            let mut registered = pid;
            self.provider.register(&mut registered, &record, Some(&url))?;
            self.save_registered(record_id, registered)?;
            Ok(RegistrationOutcome::Registered)
        })
    }

    /// Remove the record's DOI
    pub fn delete(&self, record_id: &EntityId) -> Result<DeleteOutcome, ProviderError> {
        let record = self.store.require_record(record_id)?;
        let pid = record.pids.doi.ok_or(ProviderError::MissingIdentifier)?;
        self.check_provider(&pid)?;

        let outcome = self.provider.delete(&pid)?;
        self.with_retries("delete", record_id, || self.save_pid(record_id, None))?;
        Ok(outcome)
    }

    /// Provider validation of the record's identifier
    pub fn validate(&self, record_id: &EntityId) -> Result<(bool, Vec<String>), ProviderError> {
        let record = self.store.require_record(record_id)?;
        Ok(self.provider.validate(&record))
    }
}
