//! Helpers reading the request being answered.

use super::{arg, helper_error, is_truthy, value_helper};
use crate::config::Environment;
use crate::request::MockRequest;
use crate::targets::{lookup, parse_body, stringify};
use handlebars::{Handlebars, Helper, RenderError};
use serde_json::{Value, json};
use std::sync::Arc;

/// Request data shared by the request helpers of one render.
#[derive(Debug)]
pub struct RequestData {
    request: MockRequest,
    body: Option<Value>,
    hostname: String,
    base_url: String,
}

impl RequestData {
    pub fn new(request: &MockRequest, environment: &Environment) -> Self {
        let hostname = request
            .hostname()
            .unwrap_or(&environment.hostname)
            .to_string();
        let scheme = if environment.https { "https" } else { "http" };
        let prefix = match environment.endpoint_prefix.as_str() {
            "" => String::new(),
            prefix => format!("/{prefix}"),
        };
        let base_url = format!("{scheme}://{hostname}:{}{prefix}", environment.port);

        Self {
            body: parse_body(request),
            request: request.clone(),
            hostname,
            base_url,
        }
    }
}

pub(crate) fn register(handlebars: &mut Handlebars<'static>, data: &Arc<RequestData>) {
    let d = Arc::clone(data);
    handlebars.register_helper("body", value_helper(move |h| body(h, &d)));
    let d = Arc::clone(data);
    handlebars.register_helper("queryParam", value_helper(move |h| query_param(h, &d)));
    let d = Arc::clone(data);
    handlebars.register_helper(
        "urlParam",
        value_helper(move |h| {
            let name = arg(h, 0).map(stringify).unwrap_or_default();
            Ok(d.request.params().get(&name).cloned().unwrap_or(Value::Null))
        }),
    );
    let d = Arc::clone(data);
    handlebars.register_helper(
        "header",
        value_helper(move |h| {
            let name = arg(h, 0).map(stringify).unwrap_or_default();
            Ok(or_default(d.request.header(&name).map(str::to_string), h))
        }),
    );
    let d = Arc::clone(data);
    handlebars.register_helper(
        "cookie",
        value_helper(move |h| {
            let name = arg(h, 0).map(stringify).unwrap_or_default();
            Ok(or_default(d.request.cookie(&name), h))
        }),
    );
    let d = Arc::clone(data);
    handlebars.register_helper("hostname", value_helper(move |_| Ok(json!(d.hostname))));
    let d = Arc::clone(data);
    handlebars.register_helper("ip", value_helper(move |_| Ok(json!(d.request.ip()))));
    let d = Arc::clone(data);
    handlebars.register_helper("method", value_helper(move |_| Ok(json!(d.request.method()))));
    let d = Arc::clone(data);
    handlebars.register_helper("baseUrl", value_helper(move |_| Ok(json!(d.base_url))));
}

/// `{{body [path] [default] [stringify]}}`: a value from the parsed body, or
/// the raw body when no path is given.
fn body(h: &Helper<'_>, data: &RequestData) -> Result<Value, RenderError> {
    let Some(path) = path_arg(h) else {
        return Ok(Value::String(data.request.body().to_string()));
    };
    let default = default_arg(h);
    let stringify = flag_arg(h);

    match &data.body {
        Some(parsed) => select(parsed, &path, default, stringify),
        None if stringify => json_text(&default),
        None => Ok(default),
    }
}

/// `{{queryParam [path] [default] [stringify]}}`: a value from the parsed
/// query string, or the whole query as JSON when no path is given.
fn query_param(h: &Helper<'_>, data: &RequestData) -> Result<Value, RenderError> {
    let query = data.request.query();
    let Some(path) = path_arg(h) else {
        return json_text(query);
    };
    let default = match default_arg(h) {
        Value::Bool(false) | Value::Null => json!(""),
        Value::Number(n) if n.as_f64() == Some(0.0) => json!(""),
        other => other,
    };

    select(query, &path, default, flag_arg(h))
}

/// Look `path` up in `source`; compound values are always returned as JSON text.
fn select(source: &Value, path: &str, default: Value, stringify: bool) -> Result<Value, RenderError> {
    let value = lookup(source, path).cloned().unwrap_or(default);
    if stringify || matches!(value, Value::Null | Value::Array(_) | Value::Object(_)) {
        json_text(&value)
    } else {
        Ok(value)
    }
}

fn json_text(value: &Value) -> Result<Value, RenderError> {
    serde_json::to_string(value)
        .map(Value::String)
        .map_err(|e| helper_error(e.to_string()))
}

/// The lookup path, `None` when absent or empty.
fn path_arg(h: &Helper<'_>) -> Option<String> {
    match arg(h, 0)? {
        Value::String(path) if path.is_empty() => None,
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        path => Some(stringify(path)),
    }
}

/// The default value; missing and compound defaults are the empty string.
fn default_arg(h: &Helper<'_>) -> Value {
    match arg(h, 1) {
        Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => v.clone(),
        _ => json!(""),
    }
}

fn flag_arg(h: &Helper<'_>) -> bool {
    match arg(h, 2) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Null | Value::Array(_) | Value::Object(_)) | None => false,
        Some(other) => is_truthy(other),
    }
}

/// A header or cookie value, falling back to the default for missing or empty values.
fn or_default(value: Option<String>, h: &Helper<'_>) -> Value {
    match value {
        Some(value) if !value.is_empty() => Value::String(value),
        _ => default_arg(h),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Environment;
    use crate::request::MockRequest;
    use crate::template::TemplateEngine;

    fn render_with(template: &str, request: &MockRequest) -> String {
        TemplateEngine::new()
            .render(template, request, &Environment::default())
            .unwrap()
    }

    fn json_request(body: &str) -> MockRequest {
        MockRequest::new("POST")
            .with_header("Content-Type", "application/json")
            .with_body(body)
    }

    #[test]
    fn test_body_scalars() {
        let number = json_request(r#"{"prop1": 1}"#);
        assert_eq!(render_with("{{body 'prop1' undefined true}}", &number), "1");
        assert_eq!(render_with("{{body 'prop1'}}", &number), "1");

        let boolean = json_request(r#"{"prop1": true}"#);
        assert_eq!(render_with("{{body 'prop1' undefined true}}", &boolean), "true");

        let null = json_request(r#"{"prop1": null}"#);
        assert_eq!(render_with("{{body 'prop1' undefined true}}", &null), "null");

        let string = json_request(r#"{"prop1": "test"}"#);
        assert_eq!(render_with("{{body 'prop1' undefined true}}", &string), "\"test\"");
        assert_eq!(render_with("{{body 'prop1'}}", &string), "test");
        assert_eq!(render_with("{{body 'prop2' 'default' true}}", &string), "\"default\"");
        assert_eq!(render_with("{{body 'prop2' 'default'}}", &string), "default");
    }

    #[test]
    fn test_body_compound_values_are_json() {
        let req = json_request(r#"{"prop1": ["first", "second"], "prop2": {"key": "value"}}"#);
        assert_eq!(
            render_with("{{body 'prop1' undefined false}}", &req),
            r#"["first","second"]"#
        );
        assert_eq!(
            render_with("{{body 'prop2' undefined false}}", &req),
            r#"{"key":"value"}"#
        );
    }

    #[test]
    fn test_body_escapes_strings() {
        let req = json_request(r#"{"prop1": "This \n is a \"message\" with quotes."}"#);
        assert_eq!(
            render_with("{{body 'prop1' undefined true}}", &req),
            r#""This \n is a \"message\" with quotes.""#
        );
    }

    #[test]
    fn test_body_raw_and_paths() {
        let req = json_request(r#"{"a": [{"item": 10}, {"item": 20}]}"#);
        assert_eq!(render_with("{{body}}", &req), r#"{"a": [{"item": 10}, {"item": 20}]}"#);
        assert_eq!(
            render_with("{{#repeat 2 comma=false}}item_{{body (concat 'a.' @index '.item')}}{{/repeat}}", &req),
            "item_10item_20"
        );

        let form = MockRequest::new("POST")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("user[name]=john&tags[]=a&tags[]=b");
        assert_eq!(render_with("{{body 'user.name'}}", &form), "john");
        assert_eq!(render_with("{{body 'tags.1'}}", &form), "b");

        let text = MockRequest::new("POST").with_body("plain");
        assert_eq!(render_with("{{body 'x' 'fallback' true}}", &text), "\"fallback\"");
    }

    #[test]
    fn test_body_composes_with_other_helpers() {
        let req = json_request(r#"{"id": "123", "prop1": "123"}"#);
        assert_eq!(
            render_with("{{#repeat 1 comma=false}}{{concat 'test' (body 'id') 'test'}}{{/repeat}}", &req),
            "test123test"
        );
        assert_eq!(
            render_with("{{#base64}}value: {{body 'prop1'}}{{/base64}}", &req),
            "dmFsdWU6IDEyMw=="
        );
        assert_eq!(render_with("{{setVar 'v' (body 'id')}}{{v}}", &req), "123");
    }

    #[test]
    fn test_query_param() {
        let req = MockRequest::new("GET").with_query(serde_json::json!({
            "param1": "test",
            "num": 1,
            "flag": true,
            "none": null,
            "list": ["first", "second"],
            "obj": {"key": "value"},
            "quoted": "This is a \"message\" with quotes."
        }));
        assert_eq!(render_with("{{queryParam 'num' undefined true}}", &req), "1");
        assert_eq!(render_with("{{queryParam 'flag' undefined true}}", &req), "true");
        assert_eq!(render_with("{{queryParam 'none' undefined true}}", &req), "null");
        assert_eq!(render_with("{{queryParam 'list' undefined false}}", &req), r#"["first","second"]"#);
        assert_eq!(render_with("{{queryParam 'obj' undefined false}}", &req), r#"{"key":"value"}"#);
        assert_eq!(render_with("{{queryParam 'param1' 'default'}}", &req), "test");
        assert_eq!(render_with("{{queryParam 'param1' undefined true}}", &req), "\"test\"");
        assert_eq!(render_with("{{queryParam 'missing' 'default' true}}", &req), "\"default\"");
        assert_eq!(render_with("{{queryParam 'missing' 0}}", &req), "");
        assert_eq!(
            render_with("{{queryParam 'quoted' undefined true}}", &req),
            r#""This is a \"message\" with quotes.""#
        );

        let req = MockRequest::new("GET").with_query_string("a=1&b[]=2");
        assert_eq!(render_with("{{queryParam}}", &req), r#"{"a":"1","b":["2"]}"#);
    }

    #[test]
    fn test_url_param_header_cookie() {
        let req = MockRequest::new("GET")
            .with_param("id", "42")
            .with_header("X-Token", "abc")
            .with_header("X-Empty", "")
            .with_header("Cookie", "session=s1");

        assert_eq!(render_with("{{urlParam 'id'}}", &req), "42");
        assert_eq!(render_with("{{urlParam 'missing'}}", &req), "");
        assert_eq!(render_with("{{header 'x-token'}}", &req), "abc");
        assert_eq!(render_with("{{header 'X-Empty' 'fallback'}}", &req), "fallback");
        assert_eq!(render_with("{{header 'missing'}}", &req), "");
        assert_eq!(render_with("{{cookie 'session'}}", &req), "s1");
        assert_eq!(render_with("{{cookie 'missing' 'none'}}", &req), "none");
    }

    #[test]
    fn test_request_metadata_and_base_url() {
        let req = MockRequest::new("patch")
            .with_ip("127.0.0.1")
            .with_header("Host", "api.example.org:8443");
        assert_eq!(render_with("{{method}} {{ip}} {{hostname}}", &req), "PATCH 127.0.0.1 api.example.org");
        assert_eq!(render_with("{{baseUrl}}", &req), "http://api.example.org:3000");

        let env = Environment {
            https: true,
            port: 8443,
            endpoint_prefix: "api/v1".to_string(),
            ..Environment::default()
        };
        let out = TemplateEngine::new()
            .render("{{baseUrl}}", &MockRequest::default(), &env)
            .unwrap();
        assert_eq!(out, "https://localhost:8443/api/v1");
    }
}
