//! Response selection.
//!
//! Evaluates response rules against a request and picks one response out of a
//! route's ordered candidates: at random, sequentially by request number, or
//! by the first candidate whose rules are fulfilled.

use crate::config::{ResponseRule, RouteResponse, RuleTarget, RulesOperator};
use crate::error::{Error, Result};
use crate::request::MockRequest;
use crate::targets::{extract_targets, lookup, stringify, TargetBag};
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Picks one response out of a route's candidates for a given request.
pub struct Matcher<'a> {
    responses: &'a [RouteResponse],
    request: &'a MockRequest,
    targets: TargetBag,
    random: bool,
    sequential: bool,
}

impl<'a> Matcher<'a> {
    /// Create a matcher, extracting the rule targets from the request once.
    pub fn new(
        responses: &'a [RouteResponse],
        request: &'a MockRequest,
        random: bool,
        sequential: bool,
    ) -> Self {
        Self {
            responses,
            request,
            targets: extract_targets(request),
            random,
            sequential,
        }
    }

    /// Choose the response for the `request_number`-th call (1-based).
    ///
    /// Random mode wins over sequential mode. In rule mode the first response
    /// whose rules are fulfilled is returned, else the first response.
    pub fn choose(&self, request_number: u32) -> Result<&'a RouteResponse> {
        let first = self.responses.first().ok_or(Error::EmptyResponses)?;

        if self.random {
            let index = rand::thread_rng().gen_range(0..self.responses.len());
            return Ok(&self.responses[index]);
        }

        if self.sequential {
            let index = request_number.saturating_sub(1) as usize % self.responses.len();
            return Ok(&self.responses[index]);
        }

        for response in self.responses {
            if self.is_fulfilled(response, request_number)? {
                return Ok(response);
            }
        }

        debug!(
            responses = self.responses.len(),
            "No response rules fulfilled, using default response"
        );
        Ok(first)
    }

    fn is_fulfilled(&self, response: &RouteResponse, request_number: u32) -> Result<bool> {
        match response.rules_operator {
            // an empty rule list is vacuously fulfilled
            RulesOperator::And => {
                for rule in &response.rules {
                    if !is_valid_rule(rule, request_number, &self.targets, self.request)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            RulesOperator::Or => {
                for rule in &response.rules {
                    if is_valid_rule(rule, request_number, &self.targets, self.request)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// Choose one response out of `responses`. See [`Matcher::choose`].
pub fn choose_response<'a>(
    responses: &'a [RouteResponse],
    request: &'a MockRequest,
    random: bool,
    sequential: bool,
    request_number: u32,
) -> Result<&'a RouteResponse> {
    Matcher::new(responses, request, random, sequential).choose(request_number)
}

/// Check a single rule against the request.
///
/// Fails only when the rule is a regex that does not compile.
pub fn is_valid_rule(
    rule: &ResponseRule,
    request_number: u32,
    targets: &TargetBag,
    request: &MockRequest,
) -> Result<bool> {
    let Some(value) = resolve_value(rule, request_number, targets, request) else {
        return Ok(false);
    };

    // explicit nulls compare as empty strings
    let value = if value.is_null() {
        Value::String(String::new())
    } else {
        value
    };

    if rule.is_regex {
        let regex = Regex::new(&rule.value).map_err(|source| Error::InvalidRegex {
            pattern: rule.value.clone(),
            source,
        })?;
        return Ok(match &value {
            Value::Array(items) => items.iter().any(|item| regex.is_match(&stringify(item))),
            other => regex.is_match(&stringify(other)),
        });
    }

    Ok(match &value {
        Value::Array(items) => items
            .iter()
            .any(|item| !item.is_object() && !item.is_array() && stringify(item) == rule.value),
        other => stringify(other) == rule.value,
    })
}

fn resolve_value(
    rule: &ResponseRule,
    request_number: u32,
    targets: &TargetBag,
    request: &MockRequest,
) -> Option<Value> {
    match rule.target {
        RuleTarget::Unknown => None,
        RuleTarget::RequestNumber => Some(Value::from(request_number)),
        RuleTarget::Header => request
            .header(&rule.modifier)
            .map(|v| Value::String(v.to_string())),
        RuleTarget::Body if rule.modifier.is_empty() => {
            Some(Value::String(targets.body_raw.clone()))
        }
        _ if rule.modifier.is_empty() => None,
        target => targets
            .get(target)
            .and_then(|bag| lookup(bag, &rule.modifier))
            .cloned(),
    }
}
