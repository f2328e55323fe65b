//! Action handlers
//!
//! Each handler runs its own steps and then calls [`ActionContext::finalize`],
//! the shared bookkeeping step that moves the request to its target status,
//! stages the request write and appends an audit event. Handlers only stage
//! work; the caller commits the unit of work.

use chrono::{Duration, Utc};
use metrics::counter;

use crate::core::community::Community;
use crate::core::config::Config;
use crate::core::identity::{EntityId, EntityPrefix, Identity};
use crate::core::store::Store;
use crate::core::uow::{PostCommit, UnitOfWork};
use crate::entities::record::{Record, ReviewRef};
use crate::entities::request::{Request, RequestEvent, RequestStatus, RequestType};
use crate::notify::{Notification, NotificationKind};
use crate::publish::Publisher;
use crate::schema::validate::DraftValidator;
use crate::workflow::actions::RequestAction;
use crate::workflow::WorkflowError;

/// Everything a handler may read or stage
pub struct ActionContext<'a> {
    pub action: RequestAction,
    pub identity: &'a Identity,
    pub request_type: &'static RequestType,

    /// Working copy of the request
    pub request: Request,

    /// Working copy of the topic record
    pub topic: Record,

    pub receiver: Community,

    pub store: &'a Store,
    pub uow: &'a mut UnitOfWork,
    pub config: &'a Config,
    pub validator: &'a dyn DraftValidator,
    pub publisher: &'a dyn Publisher,

    /// Status before the action, `None` for a request being created
    from: Option<RequestStatus>,
}

impl<'a> ActionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action: RequestAction,
        identity: &'a Identity,
        request_type: &'static RequestType,
        request: Request,
        topic: Record,
        receiver: Community,
        store: &'a Store,
        uow: &'a mut UnitOfWork,
        config: &'a Config,
        validator: &'a dyn DraftValidator,
        publisher: &'a dyn Publisher,
    ) -> Self {
        let from = match action {
            RequestAction::Create => None,
            _ => Some(request.status),
        };
        Self {
            action,
            identity,
            request_type,
            request,
            topic,
            receiver,
            store,
            uow,
            config,
            validator,
            publisher,
            from,
        }
    }

    /// Shared final step of every action
    ///
    /// Moves the request to the action's target status (or removes it for
    /// `delete`), stages the request write and records the transition.
    pub fn finalize(&mut self) -> Result<(), WorkflowError> {
        let now = Utc::now();
        let to = match self.action {
            RequestAction::Create => Some(RequestStatus::Draft),
            RequestAction::Delete => None,
            action => Some(
                action
                    .target_status()
                    .ok_or_else(|| WorkflowError::invalid_transition(action, self.request.status))?,
            ),
        };

        match to {
            Some(status) => {
                self.request.status = status;
                self.request.updated = now;
                if status == RequestStatus::Open {
                    self.request.submitted_at = Some(now);
                    self.request.expires_at = self
                        .config
                        .workflow
                        .request_ttl_days
                        .map(|days| now + Duration::days(i64::from(days)));
                } else if status.is_terminal() {
                    self.request.closed_at = Some(now);
                }
                self.uow.commit_request(self.request.clone());
            }
            None => self.uow.delete_request(&self.request),
        }

        self.uow.append_event(RequestEvent::new(
            self.request.id,
            self.action,
            self.from,
            to,
            self.identity.to_string(),
        ));
        counter!("subdesk_transitions_total", "action" => self.action.to_string()).increment(1);
        Ok(())
    }

    /// Stage the topic record and a rebuild of its search document
    pub fn stage_topic(&mut self) {
        self.uow.commit_record(self.topic.clone());
        self.uow.index_record(self.topic.id);
    }

    /// Drop the topic's review link if it points at this request
    pub fn clear_review(&mut self) {
        if self.topic.parent.review.is_some_and(|r| r.id == self.request.id) {
            self.topic.parent.review = None;
        }
    }

    /// Point the topic's review link at the current state of this request
    pub fn point_review_here(&mut self) {
        self.topic.parent.review = Some(ReviewRef::from(&self.request));
    }

    /// Queue a curator notification for after the commit
    pub fn notify_curators(&mut self, kind: NotificationKind) {
        if !self.config.notifications.enabled {
            return;
        }
        let notification = Notification::for_curators(
            kind,
            self.request_type,
            &self.request,
            &self.receiver,
            self.identity.to_string(),
            self.config,
        );
        self.uow.after_commit(PostCommit::Notify(notification));
    }
}

/// One request action
pub trait ActionHandler: Sync {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), WorkflowError>;
}

/// Handler registered for an action
pub fn handler_for(action: RequestAction) -> &'static dyn ActionHandler {
    match action {
        RequestAction::Create => &CreateHandler,
        RequestAction::Submit => &SubmitHandler,
        RequestAction::Delete => &DeleteHandler,
        RequestAction::Accept => &AcceptHandler,
        RequestAction::Decline => &DeclineHandler,
        RequestAction::Cancel => &CancelHandler,
        RequestAction::Expire => &ExpireHandler,
    }
}

/// Attach a new draft request to its record
pub struct CreateHandler;

impl ActionHandler for CreateHandler {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), WorkflowError> {
        if let Some(review) = ctx.topic.parent.review {
            if !review.status.is_terminal() {
                return Err(WorkflowError::ReviewExists {
                    record_id: ctx.topic.id,
                    request_id: review.id,
                });
            }
        }

        ctx.finalize()?;
        ctx.point_review_here();
        ctx.stage_topic();
        Ok(())
    }
}

/// `draft -> open`
pub struct SubmitHandler;

impl ActionHandler for SubmitHandler {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), WorkflowError> {
        ctx.validator.validate_draft(ctx.identity, &ctx.topic)?;

        ctx.request.title = ctx.topic.metadata.title.clone();

        ctx.finalize()?;
        ctx.point_review_here();
        ctx.stage_topic();
        Ok(())
    }
}

/// Remove a draft request
pub struct DeleteHandler;

impl ActionHandler for DeleteHandler {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), WorkflowError> {
        ctx.clear_review();
        ctx.stage_topic();
        ctx.finalize()
    }
}

/// `open -> accepted`: add to the community and publish
pub struct AcceptHandler;

impl AcceptHandler {
    /// Extra project communities the record should also join
    fn project_communities(ctx: &ActionContext<'_>) -> Result<Vec<EntityId>, WorkflowError> {
        let mut ids = Vec::new();
        for project in &ctx.topic.metadata.msdlive_projects {
            let id = match project.id.parse::<EntityId>() {
                Ok(id) if id.prefix() == EntityPrefix::Com => id,
                _ => {
                    tracing::warn!(
                        record_id = %ctx.topic.id,
                        project = %project.id,
                        "project reference is not a community ID; skipped"
                    );
                    continue;
                }
            };
            if id == ctx.receiver.id || ids.contains(&id) {
                continue;
            }
            if ctx.store.get_community(&id)?.is_none() {
                tracing::warn!(
                    record_id = %ctx.topic.id,
                    community_id = %id,
                    "project community does not exist; skipped"
                );
                continue;
            }
            ids.push(id);
        }
        Ok(ids)
    }
}

impl ActionHandler for AcceptHandler {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), WorkflowError> {
        // The draft may have changed since it was submitted
        ctx.validator.validate_draft(ctx.identity, &ctx.topic)?;

        ctx.clear_review();

        let request_id = ctx.request.id;
        ctx.topic.parent.communities.add(
            ctx.receiver.id,
            Some(request_id),
            ctx.request_type.set_as_default,
        );
        for community in Self::project_communities(ctx)? {
            ctx.topic
                .parent
                .communities
                .add(community, None, false);
        }
        ctx.stage_topic();

        let record_id = ctx.topic.id;
        ctx.topic = ctx
            .publisher
            .publish(ctx.identity, &record_id, ctx.store, ctx.uow)
            .map_err(|source| WorkflowError::Publication { record_id, source })?;

        ctx.finalize()?;
        ctx.notify_curators(NotificationKind::Accepted);
        Ok(())
    }
}

/// `open -> declined`
pub struct DeclineHandler;

impl ActionHandler for DeclineHandler {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), WorkflowError> {
        ctx.finalize()?;
        ctx.point_review_here();
        ctx.stage_topic();
        ctx.notify_curators(NotificationKind::Declined);
        Ok(())
    }
}

/// `open -> cancelled`
pub struct CancelHandler;

impl ActionHandler for CancelHandler {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), WorkflowError> {
        ctx.clear_review();
        ctx.stage_topic();
        ctx.finalize()
    }
}

/// `open -> expired`, run by the scheduler
pub struct ExpireHandler;

impl ActionHandler for ExpireHandler {
    fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<(), WorkflowError> {
        ctx.finalize()?;
        ctx.point_review_here();
        ctx.stage_topic();
        Ok(())
    }
}
