//! Template engine for dynamic responses.
//!
//! Uses Handlebars with the helper set from [`crate::helpers`]. Helpers that do
//! not depend on the request are registered once; request helpers and the
//! per-render scope are bound to a fresh copy of the registry on every call,
//! so concurrent renders never share state.

use crate::config::Environment;
use crate::helpers::{self, generic, request::RequestData, scope::RenderScope};
use crate::request::MockRequest;
use handlebars::{Handlebars, RenderError};
use serde_json::json;
use std::sync::Arc;

/// Template engine for rendering response bodies and header values.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        helpers::register_builtin(&mut handlebars);

        // Responses are not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render `template` against a request and its environment.
    ///
    /// Any helper error aborts the whole render; the error carries the line
    /// and column of the failing expression.
    pub fn render(
        &self,
        template: &str,
        request: &MockRequest,
        environment: &Environment,
    ) -> Result<String, RenderError> {
        let mut handlebars = self.handlebars.clone();

        let scope = Arc::new(RenderScope::new());
        generic::register_scoped(&mut handlebars, &scope);

        let data = Arc::new(RequestData::new(request, environment));
        helpers::request::register(&mut handlebars, &data);

        handlebars.render_template(template, &json!({}))
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}
