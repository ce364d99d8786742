//! Mock Responder
//!
//! The core of an HTTP mocking tool: given a route with several candidate
//! responses, choose the one that applies to an incoming request and render
//! its body from a Handlebars template.
//!
//! # Features
//!
//! - **Response Rules**: Match on body, query, path params, headers or request number
//! - **Selection Modes**: Rule-based, random or sequential
//! - **Dynamic Templates**: Handlebars helpers for request data, control flow,
//!   dates and fake data
//! - **Latency Simulation**: Per-response or environment-wide delays
//!
//! # Example Environment
//!
//! ```yaml
//! name: demo
//! port: 3000
//! routes:
//!   - uuid: users
//!     method: get
//!     endpoint: users/:id
//!     responses:
//!       - uuid: default
//!         statusCode: 200
//!         body: '{"id": "{{urlParam ''id''}}", "name": "{{faker ''name.firstName''}}"}'
//!       - uuid: admin
//!         statusCode: 403
//!         body: forbidden
//!         rules:
//!           - target: header
//!             modifier: X-Role
//!             value: guest
//! ```

pub mod config;
pub mod error;
pub mod helpers;
pub mod matcher;
pub mod request;
pub mod responder;
pub mod targets;
pub mod template;

pub use config::Environment;
pub use error::{Error, Result};
pub use matcher::choose_response;
pub use request::MockRequest;
pub use responder::{MockResponse, Responder};
pub use template::TemplateEngine;
