//! Generic and control-flow helpers.

use super::scope::RenderScope;
use super::{
    arg, args, hash_arg, helper_error, is_truthy, number_value, random_int, render_value, text,
    to_number, value_helper,
};
use crate::targets::stringify;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use handlebars::{
    BlockContext, Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
    RenderError, Renderable, StringOutput,
};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Register the helpers that keep no per-render state.
pub(crate) fn register(handlebars: &mut Handlebars<'static>) {
    handlebars.register_helper("array", value_helper(array));
    handlebars.register_helper("oneOf", value_helper(one_of));
    handlebars.register_helper("someOf", value_helper(some_of));
    handlebars.register_helper("concat", value_helper(concat));
    handlebars.register_helper("base64", Box::new(Base64));
    handlebars.register_helper("objectId", value_helper(object_id));
    handlebars.register_helper("newline", value_helper(|_| Ok(json!("\n"))));
    handlebars.register_helper("indexOf", value_helper(index_of));
    handlebars.register_helper("includes", value_helper(includes));
    handlebars.register_helper("substr", value_helper(substr));
    handlebars.register_helper("add", value_helper(|h| fold(h, Operator::Add)));
    handlebars.register_helper("subtract", value_helper(|h| fold(h, Operator::Subtract)));
    handlebars.register_helper("multiply", value_helper(|h| fold(h, Operator::Multiply)));
    handlebars.register_helper("divide", value_helper(|h| fold(h, Operator::Divide)));
    handlebars.register_helper("modulo", value_helper(modulo));
    handlebars.register_helper("ceil", value_helper(|h| round(h, f64::ceil)));
    handlebars.register_helper("floor", value_helper(|h| round(h, f64::floor)));
    handlebars.register_helper("helperMissing", value_helper(|_| Ok(Value::Null)));
    handlebars.register_helper("blockHelperMissing", value_helper(|_| Ok(Value::Null)));
}

/// Register the block helpers bound to one render's scope.
pub(crate) fn register_scoped(handlebars: &mut Handlebars<'static>, scope: &Arc<RenderScope>) {
    handlebars.register_helper("repeat", Box::new(Repeat::new(scope)));
    handlebars.register_helper("switch", Box::new(Switch::new(scope)));
    handlebars.register_helper("case", Box::new(Case::new(scope)));
    handlebars.register_helper("default", Box::new(DefaultCase::new(scope)));
    handlebars.register_helper("setVar", Box::new(SetVar::new(scope)));
}

fn array(h: &Helper<'_>) -> Result<Value, RenderError> {
    Ok(Value::Array(
        args(h)
            .into_iter()
            .map(|v| v.cloned().unwrap_or(Value::Null))
            .collect(),
    ))
}

fn one_of(h: &Helper<'_>) -> Result<Value, RenderError> {
    let picked = match arg(h, 0) {
        Some(Value::Array(items)) => items.choose(&mut rand::thread_rng()).cloned(),
        _ => None,
    };
    Ok(picked.unwrap_or(Value::Null))
}

fn some_of(h: &Helper<'_>) -> Result<Value, RenderError> {
    let Some(Value::Array(items)) = arg(h, 0) else {
        return Ok(Value::Null);
    };
    let mut items = items.clone();
    items.shuffle(&mut rand::thread_rng());

    let count = random_int(to_number(arg(h, 1)), to_number(arg(h, 2))).max(0) as usize;
    items.truncate(count);

    if arg(h, 3) == Some(&Value::Bool(true)) {
        let quoted: Vec<String> = items.iter().map(stringify).collect();
        Ok(Value::String(format!("[\"{}\"]", quoted.join("\",\""))))
    } else {
        Ok(Value::Array(items))
    }
}

fn concat(h: &Helper<'_>) -> Result<Value, RenderError> {
    Ok(Value::String(
        args(h)
            .into_iter()
            .map(|v| v.map(render_value).unwrap_or_default())
            .collect(),
    ))
}

/// Base64 of the first argument, or of the rendered block content.
struct Base64;

impl HelperDef for Base64 {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let content = match (h.params().is_empty(), h.template()) {
            (true, Some(template)) => {
                let mut buffer = StringOutput::new();
                template.render(r, ctx, rc, &mut buffer)?;
                buffer.into_string()?
            }
            _ => arg(h, 0).map(render_value).unwrap_or_default(),
        };
        out.write(&STANDARD.encode(content))?;
        Ok(())
    }
}

static OBJECT_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A 24 hex character identifier, derived from the seed when one is given.
fn object_id(h: &Helper<'_>) -> Result<Value, RenderError> {
    let id = match arg(h, 0) {
        None | Some(Value::Null) => random_object_id(),
        Some(Value::String(s)) if s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit()) => {
            s.to_ascii_lowercase()
        }
        Some(Value::String(s)) if s.len() == 12 => {
            s.bytes().map(|b| format!("{b:02x}")).collect()
        }
        Some(Value::Number(n)) => {
            let seconds = n.as_f64().unwrap_or_default() as u32;
            format!("{seconds:08x}{:016x}", fnv1a(&seconds.to_be_bytes()))
        }
        Some(other) => {
            let seed = stringify(other);
            let high = fnv1a(seed.as_bytes());
            let low = fnv1a(&high.to_be_bytes()) as u32;
            format!("{high:016x}{low:08x}")
        }
    };
    Ok(Value::String(id))
}

fn random_object_id() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default();
    let process: u64 = rand::thread_rng().gen::<u64>() & 0xff_ffff_ffff;
    let counter = OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xff_ffff;
    format!("{seconds:08x}{process:010x}{counter:06x}")
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn index_of(h: &Helper<'_>) -> Result<Value, RenderError> {
    let data: Vec<char> = text(arg(h, 0)).chars().collect();
    let search: Vec<char> = text(arg(h, 1)).chars().collect();
    let position = match arg(h, 2) {
        None | Some(Value::Array(_) | Value::Object(_)) => 0.0,
        position => to_number(position),
    };
    let start = if position.is_nan() {
        0
    } else {
        position.clamp(0.0, data.len() as f64) as usize
    };

    let found = (start..=data.len().saturating_sub(search.len()))
        .find(|&i| data[i..].starts_with(&search));
    Ok(number_value(found.map_or(-1.0, |i| i as f64)))
}

fn includes(h: &Helper<'_>) -> Result<Value, RenderError> {
    Ok(Value::Bool(text(arg(h, 0)).contains(&text(arg(h, 1)))))
}

fn substr(h: &Helper<'_>) -> Result<Value, RenderError> {
    let data: Vec<char> = text(arg(h, 0)).chars().collect();
    let len = data.len() as f64;

    let from = to_integer(arg(h, 1));
    let start = if from < 0.0 { (len + from).max(0.0) } else { from.min(len) };
    let length = match arg(h, 2) {
        None => len - start,
        length => to_integer(length).clamp(0.0, len - start),
    };

    let (start, end) = (start as usize, (start + length) as usize);
    Ok(Value::String(data[start..end].iter().collect()))
}

/// Integer conversion for string positions: NaN is zero, fractions truncate.
fn to_integer(value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Array(_) | Value::Object(_)) => 0.0,
        value => {
            let n = to_number(value);
            if n.is_nan() { 0.0 } else { n.trunc() }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Fold the arguments left to right, skipping operands that are not numbers
/// (and zero divisors).
fn fold(h: &Helper<'_>, operator: Operator) -> Result<Value, RenderError> {
    let operands = args(h);
    let Some((first, rest)) = operands.split_first() else {
        return Ok(json!(""));
    };

    let result = rest.iter().fold(to_number(*first), |acc, operand| {
        let n = to_number(*operand);
        if n.is_nan() || (operator == Operator::Divide && n == 0.0) {
            return acc;
        }
        match operator {
            Operator::Add => acc + n,
            Operator::Subtract => acc - n,
            Operator::Multiply => acc * n,
            Operator::Divide => acc / n,
        }
    });
    Ok(number_value(result))
}

fn modulo(h: &Helper<'_>) -> Result<Value, RenderError> {
    if h.params().len() < 2 {
        return Ok(json!(""));
    }
    let divisor = to_number(arg(h, 1));
    if divisor == 0.0 {
        return Ok(json!(""));
    }
    Ok(number_value(to_number(arg(h, 0)) % divisor))
}

fn round(h: &Helper<'_>, f: fn(f64) -> f64) -> Result<Value, RenderError> {
    if h.params().is_empty() {
        return Ok(json!(""));
    }
    Ok(number_value(f(to_number(arg(h, 0)))))
}

/// `{{#repeat count}}` or `{{#repeat min max}}`, with `@index`, `@total`,
/// `@first` and `@last` in each iteration's frame.
struct Repeat {
    scope: Arc<RenderScope>,
}

impl Repeat {
    fn new(scope: &Arc<RenderScope>) -> Self {
        Self {
            scope: Arc::clone(scope),
        }
    }
}

impl HelperDef for Repeat {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let count = match h.params().len() {
            0 => return Err(helper_error("The repeat helper requires a numeric param")),
            1 => to_number(arg(h, 0)),
            _ => random_int(to_number(arg(h, 0)), to_number(arg(h, 1))) as f64,
        };
        let count = if count > 0.0 { count.ceil() as u64 } else { 0 };
        let comma = hash_arg(h, "comma") != Some(&Value::Bool(false));

        let mut content = String::new();
        for index in 0..count {
            let last = index + 1 == count;

            if let Some(template) = h.template() {
                let mut block = BlockContext::new();
                if let Some(parent) = rc.block() {
                    *block.base_path_mut() = parent.base_path().clone();
                }
                block.set_local_var("index", json!(index));
                block.set_local_var("total", json!(count));
                block.set_local_var("first", json!(index == 0));
                block.set_local_var("last", json!(last));

                let mut buffer = StringOutput::new();
                rc.push_block(block);
                let rendered = {
                    let _frame = self.scope.enter_block();
                    template.render(r, ctx, rc, &mut buffer)
                };
                rc.pop_block();
                rendered?;
                content.push_str(&buffer.into_string()?);
            }

            if comma {
                content.truncate(content.trim_end().len());
                if !last && !content.ends_with(',') {
                    content.push(',');
                } else if last && content.ends_with(',') {
                    content.pop();
                }
                content.push('\n');
            }
        }

        out.write(&content)?;
        Ok(())
    }
}

struct Switch {
    scope: Arc<RenderScope>,
}

impl Switch {
    fn new(scope: &Arc<RenderScope>) -> Self {
        Self {
            scope: Arc::clone(scope),
        }
    }
}

impl HelperDef for Switch {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = arg(h, 0).map(stringify).unwrap_or_default();
        let _switch = self.scope.enter_switch(value);
        match h.template() {
            Some(template) => template.render(r, ctx, rc, out),
            None => Ok(()),
        }
    }
}

struct Case {
    scope: Arc<RenderScope>,
}

impl Case {
    fn new(scope: &Arc<RenderScope>) -> Self {
        Self {
            scope: Arc::clone(scope),
        }
    }
}

impl HelperDef for Case {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = arg(h, 0).map(stringify).unwrap_or_default();
        match h.template() {
            Some(template) if self.scope.try_case(&value) => template.render(r, ctx, rc, out),
            _ => Ok(()),
        }
    }
}

struct DefaultCase {
    scope: Arc<RenderScope>,
}

impl DefaultCase {
    fn new(scope: &Arc<RenderScope>) -> Self {
        Self {
            scope: Arc::clone(scope),
        }
    }
}

impl HelperDef for DefaultCase {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        match h.template() {
            Some(template) if self.scope.default_applies() => template.render(r, ctx, rc, out),
            _ => Ok(()),
        }
    }
}

/// `{{setVar name value}}`: a root-level call writes into the render's data
/// context, a call inside a `repeat` iteration writes an `@name` local.
struct SetVar {
    scope: Arc<RenderScope>,
}

impl SetVar {
    fn new(scope: &Arc<RenderScope>) -> Self {
        Self {
            scope: Arc::clone(scope),
        }
    }
}

impl HelperDef for SetVar {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        _: &mut dyn Output,
    ) -> HelperResult {
        let name = match arg(h, 0) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(n @ Value::Number(_)) => stringify(n),
            _ => return Ok(()),
        };
        let value = match arg(h, 1) {
            Some(v) if is_truthy(v) && !v.is_array() && !v.is_object() => v.clone(),
            _ => return Ok(()),
        };

        if self.scope.is_root() {
            let mut context = rc.context().map_or_else(|| ctx.clone(), |c| (*c).clone());
            if let Some(data) = context.data_mut().as_object_mut() {
                data.insert(name, value);
            }
            rc.set_context(context);
        } else if let Some(block) = rc.block_mut() {
            block.set_local_var(&name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Environment;
    use crate::request::MockRequest;
    use crate::template::TemplateEngine;

    fn render(template: &str) -> String {
        TemplateEngine::new()
            .render(template, &MockRequest::default(), &Environment::default())
            .unwrap()
    }

    #[test]
    fn test_repeat_count_and_separators() {
        assert_eq!(render("{{#repeat 3}}test{{/repeat}}"), "test,\ntest,\ntest\n");
        assert_eq!(
            render("{{#repeat 3 comma=false}}test{{/repeat}}"),
            "testtesttest"
        );
        assert_eq!(render("{{#repeat 0}}test{{/repeat}}"), "");
        // an explicit trailing comma is not doubled, and dropped on the last item
        assert_eq!(render("{{#repeat 2}}a, {{/repeat}}"), "a,\na\n");
    }

    #[test]
    fn test_repeat_frame_variables() {
        assert_eq!(
            render("{{#repeat 5 comma=false}}{{@index}}{{/repeat}}"),
            "01234"
        );
        assert_eq!(
            render("{{#repeat 3 comma=false}}{{@total}}{{#if @first}}F{{/if}}{{#if @last}}L{{/if}};{{/repeat}}"),
            "3F;3;3L;"
        );
    }

    #[test]
    fn test_repeat_range() {
        for _ in 0..20 {
            let out = render("{{#repeat 2 4 comma=false}}x{{/repeat}}");
            assert!((2..=4).contains(&out.len()), "{out}");
        }
    }

    #[test]
    fn test_repeat_without_count_fails() {
        let err = TemplateEngine::new()
            .render(
                "{{#repeat}}x{{/repeat}}",
                &MockRequest::default(),
                &Environment::default(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("The repeat helper requires a numeric param"));
    }

    #[test]
    fn test_switch() {
        let template = "{{#switch (body 'missing' 'b')}}{{#case 'a'}}A{{/case}}{{#case 'b'}}B{{/case}}{{#case 'b'}}again{{/case}}{{#default}}D{{/default}}{{/switch}}";
        assert_eq!(render(template), "B");
        assert_eq!(
            render("{{#switch 'z'}}{{#case 'a'}}A{{/case}}{{#default}}D{{/default}}{{/switch}}"),
            "D"
        );
        assert_eq!(
            render("{{#switch 1}}{{#case '1'}}one{{/case}}{{/switch}}"),
            "one"
        );
    }

    #[test]
    fn test_nested_switch() {
        let template = "{{#switch 'a'}}{{#case 'a'}}[{{#switch 'x'}}{{#case 'y'}}Y{{/case}}{{#default}}inner{{/default}}{{/switch}}]{{/case}}{{#default}}outer{{/default}}{{/switch}}";
        assert_eq!(render(template), "[inner]");
    }

    #[test]
    fn test_set_var_scopes() {
        assert_eq!(
            render("{{#repeat 5 comma=false}}{{setVar 'testvar' @index}}{{@testvar}}{{/repeat}}"),
            "1234"
        );
        assert_eq!(
            render("{{setVar 'outsidevar' 'test'}}{{#repeat 2 comma=false}}{{outsidevar}}{{/repeat}}"),
            "testtest"
        );
        assert_eq!(
            render("{{setVar 'testvar' 5}}{{#repeat testvar comma=false}}test{{/repeat}}"),
            "testtesttesttesttest"
        );
        // block variables do not leak into the next iteration or out of the block
        assert_eq!(
            render("{{#repeat 2 comma=false}}[{{@v}}]{{setVar 'v' 'x'}}{{/repeat}}{{@v}}"),
            "[][]"
        );
    }

    #[test]
    fn test_set_var_ignores_unusable_values() {
        assert_eq!(render("{{setVar ''}}{{setVar 'a'}}{{a}}"), "");
        assert_eq!(render("{{setVar 'a' 0}}{{a}}"), "");
        assert_eq!(render("{{setVar 'a' (array 1 2)}}{{a}}"), "");
        assert_eq!(render("{{setVar 'a' 'b'}}{{a}}"), "b");
    }

    #[test]
    fn test_array_one_of_some_of() {
        assert_eq!(render("{{array 'a' 'b' 'c'}}"), "a,b,c");
        for _ in 0..20 {
            let one = render("{{oneOf (array 'item1' 'item2' 'item3')}}");
            assert!(["item1", "item2", "item3"].contains(&one.as_str()));

            let some = render("{{someOf (array 'item1' 'item2' 'item3') 1 2}}");
            let picked: Vec<&str> = some.split(',').collect();
            assert!((1..=2).contains(&picked.len()));
            assert!(picked.iter().all(|p| p.starts_with("item")));
        }
        let as_array = render("{{someOf (array 'a' 'a') 2 2 true}}");
        assert_eq!(as_array, r#"["a","a"]"#);
    }

    #[test]
    fn test_concat_and_newline() {
        assert_eq!(render("{{concat 'a' 1 true}}"), "a1true");
        assert_eq!(render("{{concat 'a' missing 'b'}}"), "ab");
        assert_eq!(render("a{{newline}}b"), "a\nb");
    }

    #[test]
    fn test_base64() {
        assert_eq!(render("{{base64 'abc'}}"), "YWJj");
        assert_eq!(render("{{#base64}}abc{{/base64}}"), "YWJj");
    }

    #[test]
    fn test_object_id() {
        let random = render("{{objectId}}");
        assert_eq!(random.len(), 24);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(random, render("{{objectId}}"));

        assert_eq!(
            render("{{objectId '507F1F77BCF86CD799439011'}}"),
            "507f1f77bcf86cd799439011"
        );
        assert_eq!(render("{{objectId 'aaaaaaaaaaaa'}}"), "616161616161616161616161");
        let seeded = render("{{objectId 1234}}");
        assert!(seeded.starts_with("000004d2"));
        assert_eq!(seeded, render("{{objectId 1234}}"));
        assert_eq!(render("{{objectId 'seed'}}").len(), 24);
        assert_eq!(render("{{objectId 'seed'}}"), render("{{objectId 'seed'}}"));
    }

    #[test]
    fn test_index_of_includes_substr() {
        assert_eq!(render("{{indexOf 'testdata' 'data'}}"), "4");
        assert_eq!(render("{{indexOf 'testdata12345' 3}}"), "10");
        assert_eq!(render("{{indexOf 'testdatadata' 'data' 6}}"), "8");
        assert_eq!(render("{{indexOf 'test' 'x'}}"), "-1");
        assert_eq!(render("{{indexOf}}"), "0");
        assert_eq!(render("{{includes 'testdata' 'data'}}"), "true");
        assert_eq!(render("{{includes 'testdata' 'x'}}"), "false");
        assert_eq!(render("{{includes}}"), "true");
        assert_eq!(render("{{substr 'testdata' 4 4}}"), "data");
        assert_eq!(render("{{substr 'testdata' 4}}"), "data");
        assert_eq!(render("{{substr 'testdata' -4 2}}"), "da");
        assert_eq!(render("{{substr 'testdata' '2' '3'}}"), "std");
        assert_eq!(render("{{substr}}"), "");
    }

    #[test]
    fn test_math() {
        assert_eq!(render("{{add}}"), "");
        assert_eq!(render("{{add 1 2 3}}"), "6");
        assert_eq!(render("{{add '1' 'x' 2}}"), "3");
        assert_eq!(render("{{add 'x' 1}}"), "NaN");
        assert_eq!(render("{{subtract 10 2.5}}"), "7.5");
        assert_eq!(render("{{multiply 2 3 4}}"), "24");
        assert_eq!(render("{{divide 10 0}}"), "10");
        assert_eq!(render("{{divide 10 4}}"), "2.5");
        assert_eq!(render("{{modulo 10 3}}"), "1");
        assert_eq!(render("{{modulo 10 0}}"), "");
        assert_eq!(render("{{modulo 10}}"), "");
        assert_eq!(render("{{ceil 1.2}}"), "2");
        assert_eq!(render("{{floor '1.8'}}"), "1");
        assert_eq!(render("{{floor}}"), "");
        assert_eq!(render("{{add (multiply 2 3) 1}}"), "7");
    }

    #[test]
    fn test_missing_helpers_render_empty() {
        assert_eq!(render("a{{unknownHelper 'x'}}b{{unknownVar}}c"), "abc");
        assert_eq!(render("a{{#unknownBlock 'x'}}inner{{/unknownBlock}}b"), "ab");
        assert_eq!(render("a{{#unknownBlock}}inner{{/unknownBlock}}b"), "ab");
        assert_eq!(
            render("{{#repeat 2 comma=false}}[{{#nested @index}}x{{/nested}}]{{/repeat}}"),
            "[][]"
        );
    }
}
