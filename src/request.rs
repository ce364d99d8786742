//! Request model seen by response selection and template helpers.

use crate::targets::parse_form;
use serde_json::{Map, Value};

/// An incoming request, already decoded by the transport.
#[derive(Debug, Clone)]
pub struct MockRequest {
    method: String,
    hostname: Option<String>,
    ip: String,
    headers: Vec<(String, String)>,
    params: Map<String, Value>,
    query: Value,
    body: String,
}

impl MockRequest {
    /// Create an empty request with the given method.
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            hostname: None,
            ip: String::new(),
            headers: Vec::new(),
            params: Map::new(),
            query: Value::Object(Map::new()),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a raw query string (`a=1&b[c]=2`) into the query object.
    pub fn with_query_string(mut self, query: &str) -> Self {
        self.query = parse_form(query.trim_start_matches('?'));
        self
    }

    /// Use an already-parsed query object.
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    /// Add a path parameter (`/users/:id`).
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params
            .insert(name.to_string(), Value::String(value.to_string()));
        self
    }

    pub fn with_hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = ip.to_string();
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Explicit hostname, else the `Host` header without its port.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname
            .as_deref()
            .or_else(|| self.header("host").map(strip_port))
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// First header value with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Cookie value from the `Cookie` header(s).
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .flat_map(|(_, v)| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| k.trim() == name)
            .map(|(_, v)| {
                let v = v.trim().trim_matches('"');
                urlencoding::decode(v)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| v.to_string())
            })
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn query(&self) -> &Value {
        &self.query
    }

    /// Raw, undecoded body text.
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Drop a trailing `:port`. Bare IPv6 literals are left alone; bracketed ones
/// keep their brackets.
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port))
            if !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit())
                && ((name.starts_with('[') && name.ends_with(']')) || !name.contains(':')) =>
        {
            name
        }
        _ => host,
    }
}

impl Default for MockRequest {
    fn default() -> Self {
        Self::new("GET")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers_are_case_insensitive() {
        let req = MockRequest::new("post")
            .with_header("Content-Type", "application/json")
            .with_header("X-Token", "first")
            .with_header("x-token", "second");

        assert_eq!(req.method(), "POST");
        assert_eq!(req.content_type(), Some("application/json"));
        assert_eq!(req.header("x-TOKEN"), Some("first"));
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn test_cookies() {
        let req = MockRequest::new("GET")
            .with_header("Cookie", "session=abc123; theme=dark%20mode")
            .with_header("cookie", "lang=\"en\"");

        assert_eq!(req.cookie("session").as_deref(), Some("abc123"));
        assert_eq!(req.cookie("theme").as_deref(), Some("dark mode"));
        assert_eq!(req.cookie("lang").as_deref(), Some("en"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn test_hostname_from_host_header() {
        let req = MockRequest::new("GET").with_header("Host", "example.org:8080");
        assert_eq!(req.hostname(), Some("example.org"));

        let req = req.with_hostname("localhost");
        assert_eq!(req.hostname(), Some("localhost"));

        assert_eq!(MockRequest::default().hostname(), None);
    }

    #[test]
    fn test_hostname_keeps_ipv6_literals() {
        let host = |value: &str| MockRequest::new("GET").with_header("Host", value);

        assert_eq!(host("[::1]").hostname(), Some("[::1]"));
        assert_eq!(host("[::1]:8080").hostname(), Some("[::1]"));
        assert_eq!(host("::1").hostname(), Some("::1"));
        assert_eq!(host("example.com:3000").hostname(), Some("example.com"));
        assert_eq!(host("example.com").hostname(), Some("example.com"));
        assert_eq!(host("example.com:").hostname(), Some("example.com:"));
    }

    #[test]
    fn test_query_string() {
        let req = MockRequest::new("GET").with_query_string("?page=2&filter[name]=john");
        assert_eq!(req.query(), &json!({"page": "2", "filter": {"name": "john"}}));
    }
}
