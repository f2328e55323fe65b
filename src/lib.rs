//! Subdesk: community submission review with DOI registration
//!
//! Draft records are submitted to a community through a review request.
//! Curators accept or decline; acceptance publishes the record and adds it
//! to the community. Published records get their DOI registered with an
//! external registry.

pub mod core;
pub mod entities;
pub mod notify;
pub mod pids;
pub mod publish;
pub mod schema;
pub mod workflow;

pub use crate::core::{Config, EntityId, EntityRef, Identity, Store, UnitOfWork};
pub use entities::{Record, Request, RequestStatus};
pub use workflow::{RequestAction, WorkflowEngine, WorkflowError};
