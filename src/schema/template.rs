//! Notification templates rendered with Tera

use rust_embed::Embed;
use tera::Tera;
use thiserror::Error;

use crate::notify::message::Notification;

#[derive(Embed)]
#[folder = "templates/"]
struct EmbeddedTemplates;

const SUBJECT_TEMPLATE: &str = "subject.tera";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template rendering error: {0}")]
    RenderError(String),
}

/// Rendered subject and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub subject: String,
    pub body: String,
}

/// Notification renderer using the embedded templates
pub struct NotificationTemplates {
    tera: Tera,
    site_name: String,
}

impl NotificationTemplates {
    /// Load every embedded template
    pub fn new(site_name: impl Into<String>) -> Result<Self, TemplateError> {
        let mut tera = Tera::default();

        for file in EmbeddedTemplates::iter() {
            let filename = file.as_ref();
            if let Some(content) = EmbeddedTemplates::get(filename) {
                if let Ok(template_str) = std::str::from_utf8(&content.data) {
                    tera.add_raw_template(filename, template_str)
                        .map_err(|e| TemplateError::RenderError(e.to_string()))?;
                }
            }
        }

        Ok(Self {
            tera,
            site_name: site_name.into(),
        })
    }

    fn render_one(&self, name: &str, context: &tera::Context) -> Result<String, TemplateError> {
        if !self.tera.get_template_names().any(|n| n == name) {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        self.tera
            .render(name, context)
            .map_err(|e| TemplateError::RenderError(e.to_string()))
    }

    /// Render subject and body for a notification
    pub fn render(&self, notification: &Notification) -> Result<RenderedNotification, TemplateError> {
        let mut context = tera::Context::new();
        context.insert("site_name", &self.site_name);
        context.insert("kind", notification.kind.as_str());
        context.insert("record_title", &notification.record_title);
        context.insert("community_title", &notification.community_title);
        context.insert("request_link", &notification.request_link);
        context.insert("request_id", &notification.request_id.to_string());
        context.insert("actor", &notification.actor);

        let subject = self.render_one(SUBJECT_TEMPLATE, &context)?;
        let body = self.render_one(notification.kind.template(), &context)?;

        Ok(RenderedNotification {
            subject: subject.trim().to_string(),
            body,
        })
    }
}
