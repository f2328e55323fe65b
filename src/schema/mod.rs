//! Embedded schemas, templates and draft validation

pub mod registry;
pub mod template;
pub mod validate;

pub use registry::SchemaRegistry;
pub use template::{NotificationTemplates, RenderedNotification, TemplateError};
pub use validate::{DraftValidator, SchemaValidator, ValidationError};
