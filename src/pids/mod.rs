//! Persistent identifiers (DOIs) and their external registry

pub mod osti;
pub mod pid;
pub mod provider;
pub mod serializer;
pub mod service;
pub mod transport;

pub use osti::{OstiProvider, OSTI_PROVIDER};
pub use pid::{Pid, PidActionError, PidStatus};
pub use provider::{DeleteOutcome, PidProvider, ProviderError};
pub use serializer::{accession_key, strip_html, truncate_chars, RegistryDocument};
pub use service::{PidService, RegistrationOutcome};
pub use transport::{
    Credentials, HttpTransport, MockTransport, RegistryResponse, RegistryTransport, TransportError,
};
