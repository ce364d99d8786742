//! Responder: turns a request against a route into a rendered response.

use crate::config::{Environment, Header, Route, RouteResponse};
use crate::error::{Error, Result};
use crate::matcher::choose_response;
use crate::request::MockRequest;
use crate::template::TemplateEngine;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A fully rendered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
    /// Route that handled the request
    pub route_uuid: String,
    /// Chosen response, empty for diagnostic responses
    pub response_uuid: String,
}

impl MockResponse {
    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn diagnostic(route: &Route, message: String) -> Self {
        Self {
            status: 500,
            headers: vec![Header {
                key: "Content-Type".to_string(),
                value: "text/plain".to_string(),
            }],
            body: message,
            route_uuid: route.uuid.clone(),
            response_uuid: String::new(),
        }
    }
}

/// Serves the routes of one environment.
///
/// Holds one request counter per route; sequential routes cycle through their
/// responses based on it.
pub struct Responder {
    environment: Environment,
    template_engine: TemplateEngine,
    /// Request counts per route uuid
    request_counts: HashMap<String, AtomicU32>,
    /// Total requests received.
    requests_total: AtomicU64,
    /// Responses rendered without error.
    responses_rendered: AtomicU64,
    /// Renders that failed and produced a diagnostic response.
    render_failures: AtomicU64,
}

impl Responder {
    /// Create a responder for the given environment.
    pub fn new(environment: Environment) -> Self {
        let request_counts = environment
            .routes
            .iter()
            .map(|route| (route.uuid.clone(), AtomicU32::new(0)))
            .collect();

        info!(
            environment = %environment.name,
            routes = environment.routes.len(),
            "Responder initialized"
        );

        Self {
            environment,
            template_engine: TemplateEngine::new(),
            request_counts,
            requests_total: AtomicU64::new(0),
            responses_rendered: AtomicU64::new(0),
            render_failures: AtomicU64::new(0),
        }
    }

    /// The environment being served.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Get total requests received.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total responses rendered.
    pub fn total_rendered(&self) -> u64 {
        self.responses_rendered.load(Ordering::Relaxed)
    }

    /// Get total render failures.
    pub fn total_render_failures(&self) -> u64 {
        self.render_failures.load(Ordering::Relaxed)
    }

    /// Requests received so far by a route.
    pub fn request_count(&self, route_uuid: &str) -> u32 {
        self.request_counts
            .get(route_uuid)
            .map_or(0, |count| count.load(Ordering::Relaxed))
    }

    /// Answer a request sent to the route identified by `route_id` (uuid or endpoint).
    ///
    /// Template errors do not fail the call: they produce a 500 response whose
    /// body is the error message.
    pub async fn respond(&self, route_id: &str, request: &MockRequest) -> Result<MockResponse> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let route = self
            .environment
            .find_route(route_id)
            .ok_or_else(|| Error::RouteNotFound(route_id.to_string()))?;

        let request_number = self
            .request_counts
            .get(&route.uuid)
            .map_or(1, |count| count.fetch_add(1, Ordering::Relaxed) + 1);

        let response = choose_response(
            &route.responses,
            request,
            route.random_response,
            route.sequential_response,
            request_number,
        )
        .inspect_err(|e| warn!(route = %route.uuid, error = %e, "Response selection failed"))?;

        debug!(
            route = %route.uuid,
            response = %response.uuid,
            request_number,
            random = route.random_response,
            sequential = route.sequential_response,
            "Response chosen"
        );

        let latency = if response.latency > 0 {
            response.latency
        } else {
            self.environment.latency
        };
        if latency > 0 {
            debug!(route = %route.uuid, latency_ms = latency, "Applying latency");
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        match self.build_response(route, response, request) {
            Ok(built) => {
                self.responses_rendered.fetch_add(1, Ordering::Relaxed);
                Ok(built)
            }
            Err(Error::Render(e)) => {
                self.render_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    route = %route.uuid,
                    response = %response.uuid,
                    error = %e,
                    "Template rendering failed"
                );
                Ok(MockResponse::diagnostic(route, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    fn build_response(
        &self,
        route: &Route,
        response: &RouteResponse,
        request: &MockRequest,
    ) -> Result<MockResponse> {
        let body = if response.disable_templating {
            response.body.clone()
        } else {
            self.render(&response.body, request)?
        };

        let headers = response
            .headers
            .iter()
            .map(|header| {
                Ok(Header {
                    key: header.key.clone(),
                    value: self.render(&header.value, request)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(MockResponse {
            status: response.status_code,
            headers,
            body,
            route_uuid: route.uuid.clone(),
            response_uuid: response.uuid.clone(),
        })
    }

    fn render(&self, template: &str, request: &MockRequest) -> Result<String> {
        // skip the engine for plain text
        if !template.contains("{{") {
            return Ok(template.to_string());
        }
        Ok(self
            .template_engine
            .render(template, request, &self.environment)?)
    }
}
