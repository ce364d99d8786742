//! Configuration for the mock responder.
//!
//! Defines environments, routes, candidate responses and their matching rules.
//! Field names follow the camelCase route export format, so JSON exports load
//! through the same YAML parser.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// An environment: listener settings shared by every route plus the routes themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Display name
    #[serde(default)]
    pub name: String,

    /// Listening port, used by `baseUrl`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Hostname used when a request does not carry one
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Whether the environment is served over TLS
    #[serde(default)]
    pub https: bool,

    /// Path prefix prepended to every endpoint (without slashes)
    #[serde(default)]
    pub endpoint_prefix: String,

    /// Environment-wide latency in milliseconds
    #[serde(default)]
    pub latency: u64,

    /// Route definitions
    #[serde(default)]
    pub routes: Vec<Route>,
}

fn default_port() -> u16 {
    3000
}

fn default_hostname() -> String {
    "localhost".to_string()
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            name: String::new(),
            port: default_port(),
            hostname: default_hostname(),
            https: false,
            endpoint_prefix: String::new(),
            latency: 0,
            routes: Vec::new(),
        }
    }
}

impl Environment {
    /// Load an environment from a YAML (or JSON) file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let environment = Self::from_yaml(&content)?;
        environment.validate()?;
        Ok(environment)
    }

    /// Parse an environment from YAML text without validating it.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the environment.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for (i, route) in self.routes.iter().enumerate() {
            route
                .validate()
                .map_err(|e| anyhow::anyhow!("Route {} ({}): {}", i, route.uuid, e))?;
            if !seen.insert(route.uuid.as_str()) {
                anyhow::bail!("Duplicate route uuid: {}", route.uuid);
            }
        }
        Ok(())
    }

    /// Find a route by uuid, falling back to its endpoint.
    pub fn find_route(&self, id: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.uuid == id)
            .or_else(|| self.routes.iter().find(|r| r.endpoint == id))
    }
}

/// A route and its ordered candidate responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Unique identifier
    pub uuid: String,

    /// HTTP method, informational only
    #[serde(default)]
    pub method: String,

    /// Endpoint path, informational only
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub documentation: String,

    /// Candidate responses; the first one is the default
    #[serde(default)]
    pub responses: Vec<RouteResponse>,

    /// Pick a response at random
    #[serde(default)]
    pub random_response: bool,

    /// Cycle through responses in order
    #[serde(default)]
    pub sequential_response: bool,
}

impl Route {
    /// Validate the route definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.uuid.is_empty() {
            anyhow::bail!("Route uuid cannot be empty");
        }
        if self.responses.is_empty() {
            anyhow::bail!("Route must define at least one response");
        }
        for response in &self.responses {
            response
                .validate()
                .map_err(|e| anyhow::anyhow!("Response {:?}: {}", response.label, e))?;
        }
        Ok(())
    }
}

/// One candidate response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    #[serde(default)]
    pub uuid: String,

    #[serde(default)]
    pub label: String,

    /// HTTP status code
    #[serde(default = "default_status")]
    pub status_code: u16,

    /// Response headers, values may contain templates
    #[serde(default)]
    pub headers: Vec<Header>,

    /// Body template
    #[serde(default)]
    pub body: String,

    /// Latency in milliseconds, overrides the environment latency when non-zero
    #[serde(default)]
    pub latency: u64,

    /// Matching rules
    #[serde(default)]
    pub rules: Vec<ResponseRule>,

    /// How rules are combined
    #[serde(default)]
    pub rules_operator: RulesOperator,

    /// Send the body as-is
    #[serde(default)]
    pub disable_templating: bool,
}

fn default_status() -> u16 {
    200
}

impl RouteResponse {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status_code < 100 || self.status_code > 599 {
            anyhow::bail!("Invalid status code: {}", self.status_code);
        }
        for rule in self.rules.iter().filter(|r| r.is_regex) {
            regex::Regex::new(&rule.value)
                .map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?;
        }
        Ok(())
    }
}

impl Default for RouteResponse {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            label: String::new(),
            status_code: default_status(),
            headers: Vec::new(),
            body: String::new(),
            latency: 0,
            rules: Vec::new(),
            rules_operator: RulesOperator::default(),
            disable_templating: false,
        }
    }
}

/// A response header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// A single comparison test deciding whether a response applies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRule {
    /// Where the compared value comes from
    #[serde(default)]
    pub target: RuleTarget,

    /// Object path inside the target, or header name
    #[serde(default)]
    pub modifier: String,

    /// Expected value or regex pattern; `null` loads as the empty string
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub value: String,

    #[serde(default)]
    pub is_regex: bool,
}

impl ResponseRule {
    pub fn new(target: RuleTarget, modifier: &str, value: &str) -> Self {
        Self {
            target,
            modifier: modifier.to_string(),
            value: value.to_string(),
            is_regex: false,
        }
    }

    /// Mark the value as a regex pattern.
    pub fn regex(mut self) -> Self {
        self.is_regex = true;
        self
    }
}

/// Rule targets. Anything unrecognized (including an empty string) loads as
/// `Unknown` and never matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    Body,
    Query,
    Params,
    Header,
    RequestNumber,
    #[default]
    #[serde(other)]
    Unknown,
}

/// How a response's rules are combined.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RulesOperator {
    And,
    #[default]
    Or,
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ENVIRONMENT: &str = r#"
name: demo
port: 3001
https: true
endpointPrefix: api
routes:
  - uuid: users
    method: get
    endpoint: users/:id
    responses:
      - uuid: default
        statusCode: 200
        body: '{"id": "{{urlParam ''id''}}"}'
      - uuid: admin
        statusCode: 403
        rulesOperator: AND
        rules:
          - target: header
            modifier: X-Role
            value: admin
          - target: request_number
            value: 2
          - target: body
            modifier: tags
            value: ^a
            isRegex: true
"#;

    #[test]
    fn test_parse_environment() {
        let env = Environment::from_yaml(ENVIRONMENT).unwrap();
        assert_eq!(env.port, 3001);
        assert!(env.https);
        assert_eq!(env.endpoint_prefix, "api");
        assert_eq!(env.hostname, "localhost");
        assert_eq!(env.routes.len(), 1);

        let route = &env.routes[0];
        assert!(!route.random_response);
        assert_eq!(route.responses.len(), 2);
        assert_eq!(route.responses[0].rules_operator, RulesOperator::Or);

        let admin = &route.responses[1];
        assert_eq!(admin.status_code, 403);
        assert_eq!(admin.rules_operator, RulesOperator::And);
        assert_eq!(admin.rules[0].target, RuleTarget::Header);
        assert_eq!(admin.rules[1].target, RuleTarget::RequestNumber);
        assert_eq!(admin.rules[1].value, "2");
        assert!(admin.rules[2].is_regex);
        env.validate().unwrap();
    }

    #[test]
    fn test_rule_value_null_and_unknown_target() {
        let yaml = r#"
target: cookie
value: null
"#;
        let rule: ResponseRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.target, RuleTarget::Unknown);
        assert_eq!(rule.value, "");

        let rule: ResponseRule = serde_yaml::from_str("target: ''").unwrap();
        assert_eq!(rule.target, RuleTarget::Unknown);
    }

    #[test]
    fn test_json_export_loads() {
        let json = r#"{"uuid": "r1", "responses": [{"statusCode": 201, "headers": [{"key": "Content-Type", "value": "application/json"}], "rules": [{"target": "query", "modifier": "page", "value": "1", "isRegex": false}]}]}"#;
        let route: Route = serde_yaml::from_str(json).unwrap();
        assert_eq!(route.responses[0].status_code, 201);
        assert_eq!(route.responses[0].headers[0].key, "Content-Type");
        assert_eq!(
            route.responses[0].rules[0],
            ResponseRule::new(RuleTarget::Query, "page", "1")
        );
    }

    #[test]
    fn test_validate_rejects_bad_definitions() {
        let mut env = Environment::from_yaml(ENVIRONMENT).unwrap();
        env.routes[0].responses[1].rules[2].value = "(unclosed".to_string();
        assert!(env.validate().is_err());

        let mut env = Environment::from_yaml(ENVIRONMENT).unwrap();
        env.routes[0].responses[0].status_code = 99;
        assert!(env.validate().is_err());

        let mut env = Environment::from_yaml(ENVIRONMENT).unwrap();
        env.routes[0].responses.clear();
        assert!(env.validate().is_err());

        let mut env = Environment::from_yaml(ENVIRONMENT).unwrap();
        let duplicate = env.routes[0].clone();
        env.routes.push(duplicate);
        assert!(env.validate().is_err());
    }

    #[test]
    fn test_find_route() {
        let env = Environment::from_yaml(ENVIRONMENT).unwrap();
        assert!(env.find_route("users").is_some());
        assert!(env.find_route("users/:id").is_some());
        assert!(env.find_route("missing").is_none());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ENVIRONMENT.as_bytes()).unwrap();

        let env = Environment::from_file(file.path()).unwrap();
        assert_eq!(env.name, "demo");

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        broken.write_all(b"routes:\n  - uuid: empty\n").unwrap();
        assert!(Environment::from_file(broken.path()).is_err());
    }

    #[test]
    fn test_bundled_demo_environment() {
        let env = Environment::from_yaml(include_str!("../demos/default-environment.yaml")).unwrap();
        env.validate().unwrap();
        assert_eq!(env.endpoint_prefix, "api");
        assert_eq!(env.routes.len(), 4);
        assert!(env.find_route("status-cycle").unwrap().sequential_response);
        assert_eq!(
            env.routes[1].responses[1].rules_operator,
            RulesOperator::And
        );
    }
}
