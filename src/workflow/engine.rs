//! Workflow engine - runs request actions end to end

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core::community::Community;
use crate::core::config::Config;
use crate::core::identity::{EntityId, EntityRef, Identity, RefKind};
use crate::core::store::{Resolved, Store};
use crate::core::uow::{PostCommit, UnitOfWork};
use crate::entities::record::Record;
use crate::entities::request::{Request, RequestType, COMMUNITY_SUBMISSION};
use crate::notify::NotificationOutbox;
use crate::pids::PidService;
use crate::publish::{Publisher, RecordPublisher};
use crate::schema::validate::{DraftValidator, SchemaValidator};
use crate::workflow::actions::RequestAction;
use crate::workflow::handlers::{handler_for, ActionContext};
use crate::workflow::policy::{AuthorizationPolicy, CommunityRolePolicy, PolicySubject};
use crate::workflow::WorkflowError;

/// Runs actions on community submission requests
///
/// `execute` is the usual entry point: it stages the action on a fresh unit
/// of work, commits it and then runs the queued post-commit tasks.
/// `execute_in` only stages, for callers composing several actions into one
/// transaction.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Store,
    config: Config,
    request_type: &'static RequestType,
    validator: Arc<dyn DraftValidator>,
    publisher: Arc<dyn Publisher>,
    policy: Arc<dyn AuthorizationPolicy>,
    outbox: Option<NotificationOutbox>,
    pids: Option<PidService>,
}

impl WorkflowEngine {
    /// Engine with the default validator, publisher and policy
    pub fn new(store: Store, config: Config) -> Result<Self, WorkflowError> {
        let request_type = &COMMUNITY_SUBMISSION;
        Ok(Self {
            store,
            config,
            request_type,
            validator: Arc::new(SchemaValidator::new()?),
            publisher: Arc::new(RecordPublisher::new(request_type.block_publish)),
            policy: Arc::new(CommunityRolePolicy),
            outbox: None,
            pids: None,
        })
    }

    pub fn with_validator(mut self, validator: Arc<dyn DraftValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn AuthorizationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Deliver curator notifications through this outbox
    pub fn with_outbox(mut self, outbox: NotificationOutbox) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Register DOIs of published records through this service
    pub fn with_pids(mut self, pids: PidService) -> Self {
        self.pids = Some(pids);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn request_type(&self) -> &'static RequestType {
        self.request_type
    }

    /// Create a draft request submitting `topic` to `receiver`
    pub fn create(
        &self,
        identity: &Identity,
        topic: EntityRef,
        receiver: EntityRef,
    ) -> Result<Request, WorkflowError> {
        let creator = match identity {
            Identity::User(id) => EntityRef::User(*id),
            Identity::System => {
                return Err(WorkflowError::InvalidReference {
                    role: "creator",
                    reference: identity.to_string(),
                    expected: kinds(self.request_type.allowed_creator_ref_types),
                })
            }
        };
        self.check_ref("creator", &creator, self.request_type.allowed_creator_ref_types)?;
        self.check_ref("topic", &topic, self.request_type.allowed_topic_ref_types)?;
        self.check_ref(
            "receiver",
            &receiver,
            self.request_type.allowed_receiver_ref_types,
        )?;

        let request = Request::new(self.request_type, creator, receiver, topic);
        let id = request.id;
        let mut uow = UnitOfWork::new();
        let staged = self.run(request, RequestAction::Create, identity, &mut uow)?;
        let committed = uow.commit(&self.store)?;
        let created = committed.request(&id).cloned().unwrap_or(staged);
        self.run_post_commit(committed.post_commit);
        Ok(created)
    }

    /// Run `action` on a stored request and commit the result
    ///
    /// Returns the request as written. For `delete` this is the last state
    /// before removal.
    pub fn execute(
        &self,
        request_id: &EntityId,
        action: RequestAction,
        identity: &Identity,
    ) -> Result<Request, WorkflowError> {
        let mut uow = UnitOfWork::new();
        let staged = self.execute_in(request_id, action, identity, &mut uow)?;
        let committed = uow.commit(&self.store)?;
        let request = committed.request(request_id).cloned().unwrap_or(staged);

        tracing::info!(
            request_id = %request_id,
            action = %action,
            identity = %identity,
            status = %request.status,
            "request action executed"
        );
        self.run_post_commit(committed.post_commit);
        Ok(request)
    }

    /// Stage `action` on `uow` without committing
    pub fn execute_in(
        &self,
        request_id: &EntityId,
        action: RequestAction,
        identity: &Identity,
        uow: &mut UnitOfWork,
    ) -> Result<Request, WorkflowError> {
        let request = self.load_request(request_id, uow)?;
        // Existing requests cannot be created again
        if action == RequestAction::Create {
            return Err(WorkflowError::invalid_transition(action, request.status));
        }
        self.run(request, action, identity, uow)
    }

    /// Expire every open request whose deadline passed before `now`
    ///
    /// Requests that fail to expire are logged and skipped.
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Request>, WorkflowError> {
        let overdue = self.store.open_requests_expiring_before(now)?;
        let mut expired = Vec::with_capacity(overdue.len());
        for request in overdue {
            match self.execute(&request.id, RequestAction::Expire, &Identity::System) {
                Ok(request) => expired.push(request),
                Err(e) => {
                    tracing::warn!(
                        request_id = %request.id,
                        error = %e,
                        "failed to expire request; skipped"
                    );
                }
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired overdue requests");
        }
        Ok(expired)
    }

    fn load_request(&self, id: &EntityId, uow: &UnitOfWork) -> Result<Request, WorkflowError> {
        match uow.staged_request(id) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.store.require_request(id)?),
        }
    }

    fn run(
        &self,
        request: Request,
        action: RequestAction,
        identity: &Identity,
        uow: &mut UnitOfWork,
    ) -> Result<Request, WorkflowError> {
        if !self.request_type.has_action(action) || !action.is_allowed_from(request.status) {
            return Err(WorkflowError::invalid_transition(action, request.status));
        }

        let topic = self.resolve_topic(&request, uow)?;
        let receiver = self.resolve_receiver(&request)?;

        let subject = PolicySubject {
            request_type: self.request_type,
            request: &request,
            topic: &topic,
            receiver: &receiver,
        };
        if !self.policy.can_execute(identity, action, &subject) {
            return Err(WorkflowError::Unauthorized {
                identity: identity.to_string(),
                action,
                request_id: request.id,
            });
        }

        let mut ctx = ActionContext::new(
            action,
            identity,
            self.request_type,
            request,
            topic,
            receiver,
            &self.store,
            uow,
            &self.config,
            self.validator.as_ref(),
            self.publisher.as_ref(),
        );
        handler_for(action).execute(&mut ctx)?;
        Ok(ctx.request)
    }

    fn resolve_topic(&self, request: &Request, uow: &UnitOfWork) -> Result<Record, WorkflowError> {
        if let Some(staged) = uow.staged_record(request.topic.id()) {
            return Ok(staged.clone());
        }
        match self.store.resolve(&request.topic)? {
            Resolved::Record(record) => Ok(record),
            _ => Err(WorkflowError::InvalidReference {
                role: "topic",
                reference: request.topic.to_string(),
                expected: kinds(self.request_type.allowed_topic_ref_types),
            }),
        }
    }

    fn resolve_receiver(&self, request: &Request) -> Result<Community, WorkflowError> {
        match self.store.resolve(&request.receiver)? {
            Resolved::Community(community) => Ok(community),
            _ => Err(WorkflowError::InvalidReference {
                role: "receiver",
                reference: request.receiver.to_string(),
                expected: kinds(self.request_type.allowed_receiver_ref_types),
            }),
        }
    }

    fn check_ref(
        &self,
        role: &'static str,
        reference: &EntityRef,
        allowed: &[RefKind],
    ) -> Result<(), WorkflowError> {
        if allowed.contains(&reference.kind()) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidReference {
                role,
                reference: reference.to_string(),
                expected: kinds(allowed),
            })
        }
    }

    /// Run tasks queued during a committed action
    ///
    /// Failures here never undo the commit; they are logged.
    fn run_post_commit(&self, tasks: Vec<PostCommit>) {
        for task in tasks {
            match task {
                PostCommit::Notify(notification) => match &self.outbox {
                    Some(outbox) => outbox.enqueue(notification),
                    None => tracing::debug!(
                        request_id = %notification.request_id,
                        "no notification outbox configured; skipped"
                    ),
                },
                PostCommit::RegisterPid(record_id) => {
                    let Some(pids) = &self.pids else {
                        tracing::debug!(
                            record_id = %record_id,
                            "no PID service configured; registration skipped"
                        );
                        continue;
                    };
                    match pids.register_or_update(&record_id) {
                        Ok(outcome) => tracing::info!(
                            record_id = %record_id,
                            outcome = ?outcome,
                            "DOI registration finished"
                        ),
                        Err(e) => tracing::error!(
                            record_id = %record_id,
                            error = %e,
                            "DOI registration failed"
                        ),
                    }
                }
            }
        }
    }
}

fn kinds(allowed: &[RefKind]) -> String {
    allowed
        .iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(" or ")
}
