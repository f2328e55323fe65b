//! Unit of work - staged writes applied atomically
//!
//! Handlers stage record and request mutations, index rebuilds and audit
//! events here. Nothing touches the store until [`UnitOfWork::commit`], which
//! hands the whole batch to [`Store::apply`] as one transaction. Tasks that
//! must only happen once the batch is durable (notifications, registry calls)
//! are queued with [`UnitOfWork::after_commit`] and returned by `commit`.

use crate::core::identity::EntityId;
use crate::core::store::{Operation, Store, StoreError};
use crate::entities::record::Record;
use crate::entities::request::{Request, RequestEvent};
use crate::notify::Notification;

/// Work to run after a successful commit
#[derive(Debug, Clone)]
pub enum PostCommit {
    /// Queue a notification for delivery
    Notify(Notification),
    /// Register (or update) the DOI of a freshly published record
    RegisterPid(EntityId),
}

/// Result of a successful commit
#[derive(Debug, Default)]
pub struct Committed {
    /// Records as written, carrying their new revisions
    pub records: Vec<Record>,
    /// Requests as written, carrying their new revisions
    pub requests: Vec<Request>,
    pub post_commit: Vec<PostCommit>,
}

impl Committed {
    pub fn record(&self, id: &EntityId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn request(&self, id: &EntityId) -> Option<&Request> {
        self.requests.iter().find(|r| &r.id == id)
    }
}

/// Staging area for one action invocation
#[derive(Debug, Default)]
pub struct UnitOfWork {
    ops: Vec<Operation>,
    post_commit: Vec<PostCommit>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a record write
    ///
    /// A record staged twice is written once, with the latest state, at the
    /// position of the first staging.
    pub fn commit_record(&mut self, record: Record) {
        let staged = self
            .ops
            .iter()
            .position(|op| matches!(op, Operation::CommitRecord(r) if r.id == record.id));
        match staged {
            Some(idx) => self.ops[idx] = Operation::CommitRecord(record),
            None => self.ops.push(Operation::CommitRecord(record)),
        }
    }

    /// Stage a request write; same replacement rule as records
    pub fn commit_request(&mut self, request: Request) {
        let staged = self
            .ops
            .iter()
            .position(|op| matches!(op, Operation::CommitRequest(r) if r.id == request.id));
        match staged {
            Some(idx) => self.ops[idx] = Operation::CommitRequest(request),
            None => self.ops.push(Operation::CommitRequest(request)),
        }
    }

    /// Stage removal of a request at its current revision
    pub fn delete_request(&mut self, request: &Request) {
        self.ops
            .retain(|op| !matches!(op, Operation::CommitRequest(r) if r.id == request.id));
        self.ops.push(Operation::DeleteRequest {
            id: request.id,
            revision: request.revision,
        });
    }

    /// Stage a search index rebuild for a record
    pub fn index_record(&mut self, id: EntityId) {
        let already = self
            .ops
            .iter()
            .any(|op| matches!(op, Operation::IndexRecord(staged) if *staged == id));
        if !already {
            self.ops.push(Operation::IndexRecord(id));
        }
    }

    pub fn append_event(&mut self, event: RequestEvent) {
        self.ops.push(Operation::AppendEvent(event));
    }

    /// Queue a task for after a successful commit
    pub fn after_commit(&mut self, task: PostCommit) {
        self.post_commit.push(task);
    }

    /// The latest staged state of a record, if any
    pub fn staged_record(&self, id: &EntityId) -> Option<&Record> {
        self.ops.iter().find_map(|op| match op {
            Operation::CommitRecord(r) if &r.id == id => Some(r),
            _ => None,
        })
    }

    /// The latest staged state of a request, if any
    pub fn staged_request(&self, id: &EntityId) -> Option<&Request> {
        self.ops.iter().find_map(|op| match op {
            Operation::CommitRequest(r) if &r.id == id => Some(r),
            _ => None,
        })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    pub fn pending_tasks(&self) -> &[PostCommit] {
        &self.post_commit
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.post_commit.is_empty()
    }

    /// Apply every staged operation in one transaction
    ///
    /// On error nothing is written and the queued post-commit tasks are
    /// dropped with the unit of work.
    pub fn commit(self, store: &Store) -> Result<Committed, StoreError> {
        if self.ops.is_empty() {
            return Ok(Committed {
                post_commit: self.post_commit,
                ..Committed::default()
            });
        }
        let applied = store.apply(&self.ops)?;
        tracing::debug!(
            operations = self.ops.len(),
            tasks = self.post_commit.len(),
            "unit of work committed"
        );
        Ok(Committed {
            records: applied.records,
            requests: applied.requests,
            post_commit: self.post_commit,
        })
    }
}
