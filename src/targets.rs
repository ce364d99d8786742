//! Rule target extraction.
//!
//! Pulls the comparison values out of a request once per selection: the parsed
//! body (form or JSON, by content type), the query object, the path params and
//! the raw body text.

use crate::config::RuleTarget;
use crate::request::MockRequest;
use serde_json::{Map, Value};
use tracing::debug;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Highest bracket index that still builds an array (`a[20]=x`).
const ARRAY_INDEX_LIMIT: usize = 20;

/// Values rules are compared against, rebuilt for every selection.
#[derive(Debug, Clone)]
pub struct TargetBag {
    pub body: Value,
    pub query: Value,
    pub params: Value,
    pub body_raw: String,
}

impl TargetBag {
    /// The parsed container for a path-addressable target.
    pub fn get(&self, target: RuleTarget) -> Option<&Value> {
        match target {
            RuleTarget::Body => Some(&self.body),
            RuleTarget::Query => Some(&self.query),
            RuleTarget::Params => Some(&self.params),
            RuleTarget::Header | RuleTarget::RequestNumber | RuleTarget::Unknown => None,
        }
    }
}

/// Extract rule targets from a request. Never fails: an unparseable body
/// becomes an empty object.
pub fn extract_targets(request: &MockRequest) -> TargetBag {
    TargetBag {
        body: parse_body(request).unwrap_or_else(|| Value::Object(Map::new())),
        query: request.query().clone(),
        params: Value::Object(request.params().clone()),
        body_raw: request.body().to_string(),
    }
}

/// Parse the request body according to its content type.
///
/// Returns `None` when the content type is neither form nor JSON, or when the
/// JSON is malformed.
pub fn parse_body(request: &MockRequest) -> Option<Value> {
    let content_type = request.content_type()?;

    if content_type.contains(FORM_CONTENT_TYPE) {
        Some(parse_form(request.body()))
    } else if content_type.contains(JSON_CONTENT_TYPE) {
        match serde_json::from_str(request.body()) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "Request body is not valid JSON");
                None
            }
        }
    } else {
        None
    }
}

/// Look up a dot-separated path (`a.0.item`) inside a JSON value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// String form of a value, the way loose comparison sees it: integral numbers
/// drop their fraction, arrays join their items with commas and objects
/// collapse to `[object Object]`.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => stringify(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

/// Format a number without a trailing `.0` for integral values.
///
/// Magnitudes from `1e21` up, and non-zero ones below `1e-6`, use exponent
/// notation with an explicit sign (`1e+21`, `1.5e-7`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.abs() >= 1e21 || (n != 0.0 && n.abs() < 1e-6) {
        let formatted = format!("{n:e}");
        match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        }
    } else if n.fract() == 0.0 {
        format!("{}", n as i128)
    } else {
        n.to_string()
    }
}

enum KeySegment {
    Key(String),
    Push,
}

/// Parse an `application/x-www-form-urlencoded` string (or a query string)
/// into a nested object.
///
/// Supports `a[b][c]=v` nesting, `a[]=v` appends, indexed arrays `a[0]=v`
/// and repeated keys (`a=1&a=2` becomes an array).
pub fn parse_form(input: &str) -> Value {
    let mut root = Value::Object(Map::new());

    for pair in input.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(raw_key);
        if key.is_empty() {
            continue;
        }
        let segments = parse_key(&key);
        insert(&mut root, &segments, decode_component(raw_value));
    }

    if let Value::Object(map) = &mut root {
        for child in map.values_mut() {
            compact(child);
        }
    }
    root
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(|d| d.into_owned())
        .unwrap_or(s)
}

fn parse_key(key: &str) -> Vec<KeySegment> {
    let open = match key.find('[') {
        Some(i) if i > 0 => i,
        _ => return vec![KeySegment::Key(key.to_string())],
    };

    let mut segments = vec![KeySegment::Key(key[..open].to_string())];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            break;
        };
        let inner = &stripped[..close];
        segments.push(if inner.is_empty() {
            KeySegment::Push
        } else {
            KeySegment::Key(inner.to_string())
        });
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(KeySegment::Key(rest.to_string()));
    }
    segments
}

fn insert(target: &mut Value, segments: &[KeySegment], value: String) {
    let Some((first, rest)) = segments.split_first() else {
        match target {
            Value::Null => *target = Value::String(value),
            Value::Array(items) => items.push(Value::String(value)),
            Value::Object(_) => {}
            _ => {
                let previous = target.take();
                *target = Value::Array(vec![previous, Value::String(value)]);
            }
        }
        return;
    };

    match first {
        KeySegment::Push => {
            match target {
                Value::Array(_) => {}
                Value::Null => *target = Value::Array(Vec::new()),
                Value::Object(map) => {
                    let next = map.len().to_string();
                    let child = map.entry(next).or_insert(Value::Null);
                    insert(child, rest, value);
                    return;
                }
                _ => {
                    let previous = target.take();
                    *target = Value::Array(vec![previous]);
                }
            }
            if let Value::Array(items) = target {
                items.push(Value::Null);
                if let Some(child) = items.last_mut() {
                    insert(child, rest, value);
                }
            }
        }
        KeySegment::Key(key) => {
            match target {
                Value::Object(_) => {}
                Value::Array(items) => {
                    let map = items
                        .drain(..)
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect();
                    *target = Value::Object(map);
                }
                _ => *target = Value::Object(Map::new()),
            }
            if let Value::Object(map) = target {
                let child = map.entry(key.clone()).or_insert(Value::Null);
                insert(child, rest, value);
            }
        }
    }
}

/// Turn objects whose keys are all small indices into arrays, in index order.
fn compact(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(compact),
        Value::Object(map) => {
            map.values_mut().for_each(compact);

            let indices: Option<Vec<usize>> = map
                .keys()
                .map(|k| k.parse::<usize>().ok().filter(|i| *i <= ARRAY_INDEX_LIMIT))
                .collect();
            if let Some(mut indices) = indices.filter(|i| !i.is_empty()) {
                indices.sort_unstable();
                let items = indices
                    .iter()
                    .filter_map(|i| map.get(&i.to_string()).cloned())
                    .collect();
                *value = Value::Array(items);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_form_flat_and_nested() {
        assert_eq!(
            parse_form("param1=value1&name=John+Doe&email=a%40b.c"),
            json!({"param1": "value1", "name": "John Doe", "email": "a@b.c"})
        );
        assert_eq!(
            parse_form("params[prop]=v&params[deep][er]=w"),
            json!({"params": {"prop": "v", "deep": {"er": "w"}}})
        );
    }

    #[test]
    fn test_parse_form_arrays() {
        assert_eq!(
            parse_form("params[]=value1&params[]=value2"),
            json!({"params": ["value1", "value2"]})
        );
        assert_eq!(
            parse_form("a[1]=second&a[0]=first"),
            json!({"a": ["first", "second"]})
        );
        assert_eq!(parse_form("tag=x&tag=y"), json!({"tag": ["x", "y"]}));
        assert_eq!(
            parse_form("items[0][id]=1&items[1][id]=2"),
            json!({"items": [{"id": "1"}, {"id": "2"}]})
        );
        // indices above the limit stay object keys
        assert_eq!(parse_form("a[100]=x"), json!({"a": {"100": "x"}}));
    }

    #[test]
    fn test_parse_form_edge_cases() {
        assert_eq!(parse_form(""), json!({}));
        assert_eq!(parse_form("flag&=ignored"), json!({"flag": ""}));
        assert_eq!(parse_form("[x]=1"), json!({"[x]": "1"}));
    }

    #[test]
    fn test_lookup() {
        let value = json!({"a": [{"item": 10}, {"item": 20}], "b": {"c": null}});
        assert_eq!(lookup(&value, "a.1.item"), Some(&json!(20)));
        assert_eq!(lookup(&value, "b.c"), Some(&Value::Null));
        assert_eq!(lookup(&value, "a.x"), None);
        assert_eq!(lookup(&value, "missing"), None);
        assert_eq!(lookup(&json!("scalar"), "a"), None);
    }

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!(1.0)), "1");
        assert_eq!(stringify(&json!(1.5)), "1.5");
        assert_eq!(stringify(&json!(-3)), "-3");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!(null)), "null");
        assert_eq!(stringify(&json!(["a", 2, null])), "a,2,");
        assert_eq!(stringify(&json!({"a": 1})), "[object Object]");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_format_number_exponents() {
        assert_eq!(format_number(123.0), "123");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-2.5e30), "-2.5e+30");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(stringify(&json!(1e21)), "1e+21");
    }

    #[test]
    fn test_extract_json_body() {
        let req = MockRequest::new("POST")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(r#"{"name": "john"}"#)
            .with_query_string("page=1")
            .with_param("id", "42");

        let bag = extract_targets(&req);
        assert_eq!(bag.body, json!({"name": "john"}));
        assert_eq!(bag.query, json!({"page": "1"}));
        assert_eq!(bag.params, json!({"id": "42"}));
        assert_eq!(bag.body_raw, r#"{"name": "john"}"#);
    }

    #[test]
    fn test_extract_form_body() {
        let req = MockRequest::new("POST")
            .with_header("content-type", "application/x-www-form-urlencoded")
            .with_body("param1=value1");

        assert_eq!(extract_targets(&req).body, json!({"param1": "value1"}));
    }

    #[test]
    fn test_malformed_or_unknown_body_is_empty_object() {
        let req = MockRequest::new("POST")
            .with_header("Content-Type", "application/json")
            .with_body("{not json");
        let bag = extract_targets(&req);
        assert_eq!(bag.body, json!({}));
        assert_eq!(bag.body_raw, "{not json");

        let req = MockRequest::new("POST")
            .with_header("Content-Type", "text/plain")
            .with_body("a=b");
        assert_eq!(extract_targets(&req).body, json!({}));
        assert!(parse_body(&req).is_none());
    }
}
