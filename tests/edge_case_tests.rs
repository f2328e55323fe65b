//! Edge cases: references, terminal states, notifications and persistence

mod common;

use common::Fixture;
use subdesk::core::config::Config;
use subdesk::core::identity::{EntityId, EntityPrefix, EntityRef, Identity};
use subdesk::core::store::Store;
use subdesk::entities::request::RequestStatus;
use subdesk::workflow::{RequestAction, WorkflowEngine, WorkflowError};
use tempfile::TempDir;

// ============================================================================
// Request creation
// ============================================================================

#[test]
fn test_second_request_for_same_draft_is_refused() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");
    let first = f.create_request(&engine, &record);

    let err = engine
        .create(
            &f.owner_identity(),
            EntityRef::Record(record.id),
            EntityRef::Community(f.community.id),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::ReviewExists { request_id, .. } if request_id == first.id
    ));
    assert_eq!(f.store.requests_for_topic(&record.id).unwrap().len(), 1);
}

#[test]
fn test_new_request_after_decline() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");
    let first = f.open_request(&engine, &record);
    engine
        .execute(&first.id, RequestAction::Decline, &f.curator_identity())
        .unwrap();

    let second = f.create_request(&engine, &record);
    assert_ne!(second.id, first.id);
    assert_eq!(
        f.record(&record.id).parent.review.map(|r| r.id),
        Some(second.id)
    );
}

#[test]
fn test_create_checks_reference_kinds() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");

    let swapped = engine
        .create(
            &f.owner_identity(),
            EntityRef::Community(f.community.id),
            EntityRef::Record(record.id),
        )
        .unwrap_err();
    assert!(matches!(
        swapped,
        WorkflowError::InvalidReference { role: "topic", .. }
    ));

    let system = engine
        .create(
            &Identity::System,
            EntityRef::Record(record.id),
            EntityRef::Community(f.community.id),
        )
        .unwrap_err();
    assert!(matches!(
        system,
        WorkflowError::InvalidReference { role: "creator", .. }
    ));
}

#[test]
fn test_only_the_owner_creates_requests() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");

    let err = engine
        .create(
            &f.curator_identity(),
            EntityRef::Record(record.id),
            EntityRef::Community(f.community.id),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Unauthorized {
            action: RequestAction::Create,
            ..
        }
    ));
    assert!(f.record(&record.id).parent.review.is_none());
}

#[test]
fn test_missing_references_are_not_found() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");

    let no_community = engine
        .create(
            &f.owner_identity(),
            EntityRef::Record(record.id),
            EntityRef::Community(EntityId::new(EntityPrefix::Com)),
        )
        .unwrap_err();
    assert!(matches!(
        no_community,
        WorkflowError::NotFound {
            kind: "community",
            ..
        }
    ));

    let no_request = engine
        .execute(
            &EntityId::new(EntityPrefix::Req),
            RequestAction::Submit,
            &f.owner_identity(),
        )
        .unwrap_err();
    assert!(matches!(
        no_request,
        WorkflowError::NotFound {
            kind: "request",
            ..
        }
    ));
}

// ============================================================================
// Terminal states
// ============================================================================

#[test]
fn test_terminal_requests_reject_every_action() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");
    let request = f.open_request(&engine, &record);
    engine
        .execute(&request.id, RequestAction::Cancel, &f.owner_identity())
        .unwrap();

    for action in RequestAction::all() {
        let err = engine
            .execute(&request.id, *action, &Identity::System)
            .unwrap_err();
        match err {
            WorkflowError::InvalidTransition {
                status, allowed, ..
            } => {
                assert_eq!(status, RequestStatus::Cancelled);
                assert_eq!(allowed, "none");
            }
            other => panic!("{action}: unexpected error {other:?}"),
        }
    }
    assert_eq!(f.request(&request.id).status, RequestStatus::Cancelled);
}

#[test]
fn test_open_request_cannot_be_deleted() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");
    let request = f.open_request(&engine, &record);

    let err = engine
        .execute(&request.id, RequestAction::Delete, &f.owner_identity())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    assert!(f.store.get_request(&request.id).unwrap().is_some());
}

#[test]
fn test_expire_is_reserved_to_the_system() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");
    let request = f.open_request(&engine, &record);

    let err = engine
        .execute(&request.id, RequestAction::Expire, &f.curator_identity())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Unauthorized { .. }));
}

#[test]
fn test_review_blocks_direct_publish_until_resolved() {
    let f = Fixture::new();
    let engine = f.engine();
    let record = f.draft("Dataset A");
    f.open_request(&engine, &record);

    let mut uow = subdesk::core::uow::UnitOfWork::new();
    let publisher = subdesk::publish::RecordPublisher::new(true);
    let err = subdesk::publish::Publisher::publish(
        &publisher,
        &f.owner_identity(),
        &record.id,
        &f.store,
        &mut uow,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        subdesk::publish::PublishError::UnderReview { .. }
    ));
}

// ============================================================================
// Notifications
// ============================================================================

#[test]
fn test_full_notification_queue_does_not_fail_actions() {
    let f = Fixture::new();
    let (engine, outbox, receiver) = f.engine_with_outbox(1);

    let first = f.draft("Dataset A");
    let second = f.draft("Dataset B");
    let a = f.open_request(&engine, &first);
    let b = f.open_request(&engine, &second);

    engine
        .execute(&a.id, RequestAction::Decline, &f.curator_identity())
        .unwrap();
    let declined = engine
        .execute(&b.id, RequestAction::Decline, &f.curator_identity())
        .unwrap();
    assert_eq!(declined.status, RequestStatus::Declined);

    let stats = outbox.stats();
    assert_eq!(stats.enqueued, 1);
    assert_eq!(stats.dropped, 1);
    assert_eq!(receiver.drain().len(), 1);
}

#[test]
fn test_disabled_notifications_are_not_queued() {
    let mut config = common::test_config();
    config.notifications.enabled = false;
    let f = Fixture::with_config(config);
    let (engine, outbox, receiver) = f.engine_with_outbox(8);

    let record = f.draft("Dataset A");
    let request = f.open_request(&engine, &record);
    engine
        .execute(&request.id, RequestAction::Accept, &f.curator_identity())
        .unwrap();

    assert!(receiver.is_empty());
    assert_eq!(outbox.stats().enqueued, 0);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_workflow_state_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("subdesk.db");
    let config = common::test_config();

    let (record_id, request_id) = {
        let store = Store::open(&path).unwrap();
        let owner = EntityId::new(EntityPrefix::Usr);
        let community = subdesk::core::community::Community::new("hydro", "Hydrology");
        store.save_community(&community).unwrap();
        let record = store
            .save_record(&subdesk::entities::record::Record::new_draft(
                owner,
                common::ready_metadata("Dataset A"),
            ))
            .unwrap();

        let engine = WorkflowEngine::new(store, config.clone()).unwrap();
        let request = engine
            .create(
                &Identity::User(owner),
                EntityRef::Record(record.id),
                EntityRef::Community(community.id),
            )
            .unwrap();
        engine
            .execute(&request.id, RequestAction::Submit, &Identity::User(owner))
            .unwrap();
        (record.id, request.id)
    };

    let store = Store::open(&path).unwrap();
    assert_eq!(
        store.require_request(&request_id).unwrap().status,
        RequestStatus::Open
    );
    assert_eq!(
        store
            .require_record(&record_id)
            .unwrap()
            .parent
            .review
            .map(|r| r.id),
        Some(request_id)
    );

    // Scheduler picks up where the previous process left off
    let engine = WorkflowEngine::new(store, config).unwrap();
    let accepted = engine
        .execute(&request_id, RequestAction::Accept, &Identity::System)
        .unwrap();
    assert_eq!(accepted.status, RequestStatus::Accepted);
}

#[test]
fn test_config_file_drives_workflow_settings() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.yaml");
    std::fs::write(
        &path,
        "site_url: https://data.example.org\nworkflow:\n  request_ttl_days: 14\nnotifications:\n  enabled: false\n",
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.workflow.request_ttl_days, Some(14));
    assert!(!config.notifications.enabled);

    let f = Fixture::with_config(config);
    let engine = f.engine();
    let record = f.draft("Dataset A");
    let request = f.open_request(&engine, &record);
    let ttl = request.expires_at.unwrap() - request.submitted_at.unwrap();
    assert_eq!(ttl.num_days(), 14);
}
