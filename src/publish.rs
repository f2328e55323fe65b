//! Record publication collaborator

use chrono::Utc;
use thiserror::Error;

use crate::core::identity::{EntityId, Identity};
use crate::core::store::{Store, StoreError};
use crate::core::uow::{PostCommit, UnitOfWork};
use crate::entities::record::Record;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Record {0} not found")]
    NotFound(EntityId),

    #[error("Record {record_id} is under review in request {request_id} and cannot be published directly")]
    UnderReview {
        record_id: EntityId,
        request_id: EntityId,
    },

    #[error("Publication rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Turns a draft into a published record
///
/// Implementations stage their writes on the given unit of work; nothing is
/// visible until the caller commits it.
pub trait Publisher: Send + Sync {
    fn publish(
        &self,
        identity: &Identity,
        record_id: &EntityId,
        store: &Store,
        uow: &mut UnitOfWork,
    ) -> Result<Record, PublishError>;
}

/// Default publisher backed by the store
#[derive(Debug, Clone, Copy)]
pub struct RecordPublisher {
    block_publish: bool,
}

impl RecordPublisher {
    /// `block_publish` refuses records that still have an unresolved review
    pub fn new(block_publish: bool) -> Self {
        Self { block_publish }
    }
}

impl Publisher for RecordPublisher {
    fn publish(
        &self,
        identity: &Identity,
        record_id: &EntityId,
        store: &Store,
        uow: &mut UnitOfWork,
    ) -> Result<Record, PublishError> {
        let mut record = match uow.staged_record(record_id) {
            Some(staged) => staged.clone(),
            None => store
                .get_record(record_id)?
                .ok_or(PublishError::NotFound(*record_id))?,
        };

        if self.block_publish {
            if let Some(review) = record.parent.review.filter(|r| !r.status.is_terminal()) {
                return Err(PublishError::UnderReview {
                    record_id: *record_id,
                    request_id: review.id,
                });
            }
        }

        let republish = record.is_published;
        record.is_published = true;
        if record.published_at.is_none() {
            record.published_at = Some(Utc::now());
        }

        uow.commit_record(record.clone());
        uow.index_record(record.id);
        if record.pids.doi.is_some() {
            uow.after_commit(PostCommit::RegisterPid(record.id));
        }

        tracing::info!(
            record_id = %record.id,
            identity = %identity,
            republish,
            "record published"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;
    use crate::entities::metadata::Metadata;
    use crate::entities::record::ReviewRef;
    use crate::entities::request::RequestStatus;
    use crate::pids::Pid;

    fn saved_draft(store: &Store) -> Record {
        store
            .save_record(&Record::new_draft(
                EntityId::new(EntityPrefix::Usr),
                Metadata::new("Dataset A"),
            ))
            .unwrap()
    }

    #[test]
    fn test_publish_stages_commit_and_index() {
        let store = Store::open_in_memory().unwrap();
        let record = saved_draft(&store);
        let mut uow = UnitOfWork::new();

        let published = RecordPublisher::new(true)
            .publish(&Identity::System, &record.id, &store, &mut uow)
            .unwrap();
        assert!(published.is_published);
        assert!(published.published_at.is_some());
        assert_eq!(uow.operations().len(), 2);
        assert!(uow.pending_tasks().is_empty());

        // Not visible before commit
        assert!(!store.require_record(&record.id).unwrap().is_published);
        uow.commit(&store).unwrap();
        assert!(store.require_record(&record.id).unwrap().is_published);
    }

    #[test]
    fn test_open_review_blocks_publication() {
        let store = Store::open_in_memory().unwrap();
        let mut record = saved_draft(&store);
        let request_id = EntityId::new(EntityPrefix::Req);
        record.parent.review = Some(ReviewRef {
            id: request_id,
            status: RequestStatus::Open,
        });
        let record = store.save_record(&record).unwrap();

        let mut uow = UnitOfWork::new();
        let err = RecordPublisher::new(true)
            .publish(&Identity::System, &record.id, &store, &mut uow)
            .unwrap_err();
        assert!(matches!(err, PublishError::UnderReview { request_id: r, .. } if r == request_id));
        assert!(uow.is_empty());

        // Without blocking the same record publishes
        RecordPublisher::new(false)
            .publish(&Identity::System, &record.id, &store, &mut uow)
            .unwrap();
    }

    #[test]
    fn test_record_with_doi_queues_registration() {
        let store = Store::open_in_memory().unwrap();
        let mut record = saved_draft(&store);
        record.pids.doi = Some(Pid::reserved_doi("10.1/x", "osti"));
        let record = store.save_record(&record).unwrap();

        let mut uow = UnitOfWork::new();
        RecordPublisher::new(true)
            .publish(&Identity::System, &record.id, &store, &mut uow)
            .unwrap();
        assert!(matches!(
            uow.pending_tasks(),
            [PostCommit::RegisterPid(id)] if *id == record.id
        ));
    }

    #[test]
    fn test_missing_record() {
        let store = Store::open_in_memory().unwrap();
        let mut uow = UnitOfWork::new();
        let id = EntityId::new(EntityPrefix::Rec);
        assert!(matches!(
            RecordPublisher::new(true).publish(&Identity::System, &id, &store, &mut uow),
            Err(PublishError::NotFound(missing)) if missing == id
        ));
    }
}
