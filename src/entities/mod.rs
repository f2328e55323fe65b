//! Aggregates handled by the submission workflow

pub mod metadata;
pub mod record;
pub mod request;

pub use metadata::Metadata;
pub use record::{CommunitySet, ParentRecord, Pids, Record, ReviewRef};
pub use request::{Request, RequestEvent, RequestStatus, RequestType, COMMUNITY_SUBMISSION};
