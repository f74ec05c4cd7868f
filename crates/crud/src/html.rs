//! HTML responses rendered from named templates.
//!
//! Templates are looked up by name in a [`TemplateRegistry`]. An [`Html`] writer either carries its
//! own registry or falls back to the process wide one installed with
//! [`register_html_templates_once`].

use crate::error::{BoxError, Error};
use crate::request::RequestContext;
use crate::response::ResponseSink;
use crate::writer::BodyWriter;
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";

static GLOBAL_TEMPLATES: OnceCell<Arc<TemplateRegistry>> = OnceCell::new();

/// Renders data into an output stream.
pub trait Template: Send + Sync {
    fn render(&self, data: &Value, out: &mut dyn io::Write) -> Result<(), BoxError>;
}

impl<F> Template for F
where
    F: Fn(&Value, &mut dyn io::Write) -> Result<(), BoxError> + Send + Sync,
{
    fn render(&self, data: &Value, out: &mut dyn io::Write) -> Result<(), BoxError> {
        (self)(data, out)
    }
}

/// Templates by name.
#[derive(Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<dyn Template>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<T: Template + 'static>(mut self, name: impl Into<String>, template: T) -> Self {
        self.register(name, template);
        self
    }

    pub fn register<T: Template + 'static>(&mut self, name: impl Into<String>, template: T) {
        self.templates.insert(name.into(), Arc::new(template));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Template>> {
        self.templates.get(name).map(Arc::clone)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.templates.keys()).finish()
    }
}

/// Installs the process wide registry used by [`Html`] writers without their own.
///
/// Only the first call has an effect; it returns `false` once a registry is installed.
pub fn register_html_templates_once(registry: TemplateRegistry) -> bool {
    GLOBAL_TEMPLATES.set(Arc::new(registry)).is_ok()
}

/// The process wide registry, if one has been installed.
pub fn global_templates() -> Option<&'static Arc<TemplateRegistry>> {
    GLOBAL_TEMPLATES.get()
}

/// Renders the template `name` with `data` as a `text/html` body.
///
/// A missing template fails with [`Error::NoTemplate`] before anything is written.
#[derive(Debug, Clone)]
pub struct Html {
    pub name: String,
    pub data: Value,
    pub registry: Option<Arc<TemplateRegistry>>,
}

impl Html {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self { name: name.into(), data, registry: None }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<TemplateRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

#[async_trait]
impl BodyWriter for Html {
    async fn write_body(&mut self, sink: &ResponseSink, _req: &RequestContext, status: StatusCode) -> Result<(), BoxError> {
        let registry = match &self.registry {
            Some(registry) => Some(registry),
            None => global_templates(),
        };
        let template = registry
            .and_then(|registry| registry.get(&self.name))
            .ok_or_else(|| Error::no_template(&self.name))?;

        sink.set_header(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_HTML));
        sink.write_header(status);
        template.render(&self.data, &mut sink.writer()).map_err(Error::write)?;
        Ok(())
    }
}
