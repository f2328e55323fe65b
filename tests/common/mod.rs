//! Shared test helpers for integration tests
//!
//! This module provides common fixtures used across all test files.

#![allow(dead_code)]

use std::sync::Arc;

use subdesk::core::community::{Community, CommunityRole};
use subdesk::core::config::{Config, RegistryConfig};
use subdesk::core::identity::{EntityId, EntityPrefix, EntityRef, Identity};
use subdesk::core::store::Store;
use subdesk::core::uow::UnitOfWork;
use subdesk::entities::metadata::{Creator, Metadata, VocabularyRef};
use subdesk::entities::record::Record;
use subdesk::entities::request::Request;
use subdesk::notify::{NotificationOutbox, NotificationReceiver};
use subdesk::pids::{MockTransport, OstiProvider, PidService};
use subdesk::publish::{PublishError, Publisher};
use subdesk::workflow::WorkflowEngine;

pub const CURATOR_EMAIL: &str = "curator@example.org";

/// An in-memory store with one community, an uploader and a curator
pub struct Fixture {
    pub store: Store,
    pub config: Config,
    pub owner: EntityId,
    pub curator: EntityId,
    pub community: Community,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Store::open_in_memory().unwrap();
        let owner = EntityId::new(EntityPrefix::Usr);
        let curator = EntityId::new(EntityPrefix::Usr);
        let community = Community::new("hydro", "Hydrology").with_member(
            curator,
            Some(CURATOR_EMAIL),
            CommunityRole::Curator,
        );
        store.save_community(&community).unwrap();
        Self {
            store,
            config,
            owner,
            curator,
            community,
        }
    }

    pub fn owner_identity(&self) -> Identity {
        Identity::User(self.owner)
    }

    pub fn curator_identity(&self) -> Identity {
        Identity::User(self.curator)
    }

    pub fn engine(&self) -> WorkflowEngine {
        WorkflowEngine::new(self.store.clone(), self.config.clone()).unwrap()
    }

    /// Engine wired to a notification outbox; the receiver sees what was queued
    pub fn engine_with_outbox(&self, capacity: usize) -> (WorkflowEngine, NotificationOutbox, NotificationReceiver) {
        let (outbox, receiver) = NotificationOutbox::new(capacity);
        let engine = self.engine().with_outbox(outbox.clone());
        (engine, outbox, receiver)
    }

    /// Store a publish-ready draft owned by the uploader
    pub fn draft(&self, title: &str) -> Record {
        self.store
            .save_record(&Record::new_draft(self.owner, ready_metadata(title)))
            .unwrap()
    }

    /// Store a draft with the given metadata
    pub fn draft_with(&self, metadata: Metadata) -> Record {
        self.store
            .save_record(&Record::new_draft(self.owner, metadata))
            .unwrap()
    }

    /// Create a draft request for `record` to the fixture community
    pub fn create_request(&self, engine: &WorkflowEngine, record: &Record) -> Request {
        engine
            .create(
                &self.owner_identity(),
                EntityRef::Record(record.id),
                EntityRef::Community(self.community.id),
            )
            .unwrap()
    }

    /// Create and submit a request for `record`
    pub fn open_request(&self, engine: &WorkflowEngine, record: &Record) -> Request {
        let request = self.create_request(engine, record);
        engine
            .execute(
                &request.id,
                subdesk::workflow::RequestAction::Submit,
                &self.owner_identity(),
            )
            .unwrap()
    }

    pub fn record(&self, id: &EntityId) -> Record {
        self.store.require_record(id).unwrap()
    }

    pub fn request(&self, id: &EntityId) -> Request {
        self.store.require_request(id).unwrap()
    }

    /// Save a second community, for project memberships
    pub fn add_community(&self, slug: &str, title: &str) -> Community {
        let community = Community::new(slug, title);
        self.store.save_community(&community).unwrap();
        community
    }
}

/// Metadata that passes the draft schema
pub fn ready_metadata(title: &str) -> Metadata {
    let mut metadata = Metadata::new(title);
    metadata.creators.push(Creator::person("Ada", "Lovelace"));
    metadata.publication_date = Some("2024-03-05".to_string());
    metadata.resource_type = Some(VocabularyRef::new("dataset"));
    metadata
}

pub fn registry_config() -> RegistryConfig {
    RegistryConfig {
        accession_number_prefix: "MSDL".to_string(),
        username: "user".to_string(),
        password: "secret".to_string(),
        contract_nos: "AC05-76RL01830".to_string(),
        sponsor_org: "USDOE".to_string(),
        ..RegistryConfig::with_defaults()
    }
}

pub fn test_config() -> Config {
    let mut config = Config::with_defaults();
    config.site_url = "https://data.example.org".to_string();
    config.site_name = "MSD-LIVE".to_string();
    config.registry = registry_config();
    config
}

/// OSTI-backed PID service over a scripted transport
pub fn pid_service(fixture: &Fixture) -> (PidService, MockTransport) {
    let transport = MockTransport::new();
    let provider = OstiProvider::new(
        fixture.config.registry.clone(),
        Arc::new(transport.clone()),
        fixture.store.clone(),
    );
    let service = PidService::new(
        Arc::new(provider),
        fixture.store.clone(),
        fixture.config.clone(),
    );
    (service, transport)
}

/// Publisher that always refuses
pub struct FailingPublisher;

impl Publisher for FailingPublisher {
    fn publish(
        &self,
        _identity: &Identity,
        _record_id: &EntityId,
        _store: &Store,
        _uow: &mut UnitOfWork,
    ) -> Result<Record, PublishError> {
        Err(PublishError::Rejected("publication backend unavailable".to_string()))
    }
}
