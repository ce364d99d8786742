//! Template helpers.
//!
//! Most helpers compute a single value from their arguments. Those are
//! written as plain functions over the [`Helper`] invocation (positional
//! params, hash params, block template) and wrapped by [`value_helper`], which
//! makes them usable both inline and as subexpressions. Block helpers that
//! need the render context (`repeat`, `switch`, `setVar`, ...) implement
//! [`HelperDef`] directly.

pub mod date;
pub mod faker;
pub mod generic;
pub mod request;
pub mod scope;

use crate::targets::{format_number, stringify};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason, ScopedJson,
};
use rand::Rng;
use serde_json::Value;

/// A helper that produces a value instead of writing output.
struct ValueHelper<F>(F);

impl<F> HelperDef for ValueHelper<F>
where
    F: for<'rc> Fn(&Helper<'rc>) -> Result<Value, RenderError> + Send + Sync,
{
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        (self.0)(h).map(ScopedJson::Derived)
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = (self.0)(h)?;
        out.write(&render_value(&value))?;
        Ok(())
    }
}

/// Wrap a value-producing function as a helper.
pub(crate) fn value_helper<F>(f: F) -> Box<dyn HelperDef + Send + Sync>
where
    F: for<'rc> Fn(&Helper<'rc>) -> Result<Value, RenderError> + Send + Sync + 'static,
{
    Box::new(ValueHelper(f))
}

/// Register every helper that does not depend on the request being rendered.
pub fn register_builtin(handlebars: &mut Handlebars<'static>) {
    generic::register(handlebars);
    date::register(handlebars);
    faker::register(handlebars);
}

/// Text written to the output for a helper result: `null` is empty, strings
/// are raw, everything else takes its loose string form.
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => stringify(other),
    }
}

/// Positional argument `index`, `None` when absent or bound to a missing variable.
pub(crate) fn arg<'a>(h: &'a Helper<'_>, index: usize) -> Option<&'a Value> {
    h.param(index)
        .filter(|p| !p.is_value_missing())
        .map(|p| p.value())
}

/// All positional arguments, missing variables included as `None`.
pub(crate) fn args<'a>(h: &'a Helper<'_>) -> Vec<Option<&'a Value>> {
    (0..h.params().len()).map(|i| arg(h, i)).collect()
}

/// Hash argument `name`, `None` when absent or bound to a missing variable.
pub(crate) fn hash_arg<'a>(h: &'a Helper<'_>, name: &str) -> Option<&'a Value> {
    h.hash_get(name)
        .filter(|p| !p.is_value_missing())
        .map(|p| p.value())
}

/// Loose numeric conversion: missing and objects are NaN, `null` and blank
/// strings are zero, booleans are 0 or 1.
pub(crate) fn to_number(value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Object(_)) => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_number(s),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => parse_number(&stringify(single)),
            _ => f64::NAN,
        },
    }
}

fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => s.parse().unwrap_or(f64::NAN),
    }
}

/// String input for the text helpers: scalars take their string form,
/// anything else (missing, `null`, arrays, objects) is empty.
pub(crate) fn text(value: Option<&Value>) -> String {
    match value {
        Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => stringify(v),
        _ => String::new(),
    }
}

/// Loose truthiness: `false`, `0`, `NaN`, `""` and `null` are falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// A number as a JSON value; NaN and infinities, which JSON cannot hold, keep
/// their text form.
pub(crate) fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(format_number(n)))
    }
}

/// Uniform random integer in `[min, max]`, truncating both bounds. A reversed
/// or empty range yields `min`, NaN counts as zero.
pub(crate) fn random_int(min: f64, max: f64) -> i64 {
    let bound = |n: f64| if n.is_nan() { 0 } else { n.trunc() as i64 };
    let (min, max) = (bound(min), bound(max));
    if max <= min {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    }
}

/// A user-facing render error raised by a helper.
pub(crate) fn helper_error(message: impl Into<String>) -> RenderError {
    RenderErrorReason::Other(message.into()).into()
}
