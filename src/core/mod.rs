//! Core module - identity, configuration, communities and persistence

pub mod community;
pub mod config;
pub mod entity;
pub mod identity;
pub mod store;
pub mod uow;

pub use community::{Community, CommunityRole, Member};
pub use config::{Config, ConfigError, NotificationConfig, RegistryConfig, WorkflowConfig};
pub use entity::Entity;
pub use identity::{EntityId, EntityPrefix, EntityRef, IdParseError, Identity, RefKind};
pub use store::{IndexDocument, Operation, Resolved, Store, StoreError};
pub use uow::{Committed, PostCommit, UnitOfWork};
