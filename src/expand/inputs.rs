//! Input Binding & Substitution
//!
//! Maps an includable definition's declared inputs to the values a caller
//! supplied, then rewrites `inputs.<name>` references in the definition's
//! body. Substitution is purely textual: caller values may be runtime
//! expressions themselves and are carried through unevaluated.
//!
//! # Substitution Rules
//!
//! - A scalar that is exactly `${{ inputs.x }}` becomes the bound value,
//!   keeping its YAML type.
//! - A `${{ inputs.x }}` segment inside a longer string becomes the value's
//!   text.
//! - Inside a larger expression (any `${{ ... }}`, or an `if` value) the
//!   token becomes an expression operand: `'quoted'` strings, bare
//!   booleans and numbers, the inner expression of a `${{ X }}` value,
//!   `format(...)` for mixed text, `fromJSON(...)` for mappings and lists.
//! - Names that are not bound are left untouched, as are tokens inside
//!   string literals and tokens like `github.event.inputs.x`.

use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};

use crate::error::{IncludeError, Result};
use crate::workflow::model::{
    condition_text, IncludeScriptStep, IncludeStep, InputSpec, Job, JobEntry, JobInclude,
    PlainStep, Step,
};

static EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\{\{(.*?)\}\}").expect("expression pattern is valid"));

static WHOLE_INPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$\{\{\s*inputs\.([A-Za-z_][A-Za-z0-9_\-]*)\s*\}\}$")
        .expect("whole-input pattern is valid")
});

static BARE_INPUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^inputs\.([A-Za-z_][A-Za-z0-9_\-]*)$").expect("bare-input pattern is valid")
});

static INPUT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[^A-Za-z0-9_.\-])inputs\.([A-Za-z_][A-Za-z0-9_\-]*)")
        .expect("input token pattern is valid")
});

static SIMPLE_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("simple path pattern is valid")
});

/// Active input environment: input name to bound value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputBindings {
    values: HashMap<String, Value>,
}

impl InputBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Layers `own` on top of a copy of these bindings.
    pub fn fork(&self, own: InputBindings) -> InputBindings {
        let mut values = self.values.clone();
        values.extend(own.values);
        InputBindings { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Binds caller `with` values to a definition's declared inputs.
///
/// Undeclared `with` keys are rejected first, then required inputs with
/// neither a value nor a default. Optional inputs with neither bind to `""`.
pub fn bind_inputs(
    reference: &str,
    declared: &[(String, InputSpec)],
    with: &Mapping,
) -> Result<InputBindings> {
    let unknown: Vec<String> = with
        .keys()
        .map(value_text)
        .filter(|name| !declared.iter().any(|(declared, _)| declared == name))
        .collect();
    if !unknown.is_empty() {
        return Err(IncludeError::UnknownInput {
            reference: reference.to_string(),
            inputs: unknown,
        });
    }

    let mut bindings = InputBindings::new();
    for (name, spec) in declared {
        let value = match with.get(name.as_str()).or(spec.default.as_ref()) {
            Some(value) => value.clone(),
            None if spec.required => {
                return Err(IncludeError::MissingInput {
                    reference: reference.to_string(),
                    input: name.clone(),
                })
            }
            None => Value::String(String::new()),
        };
        debug!("{}: inputs.{} = {}", reference, name, value_text(&value));
        bindings.insert(name.clone(), value);
    }

    Ok(bindings)
}

/// Substitutes input references throughout a YAML value.
pub fn substitute_value(value: &Value, bindings: &InputBindings) -> Value {
    if bindings.is_empty() {
        return value.clone();
    }
    substitute(value, bindings)
}

/// Substitutes input references in text that must stay text.
pub fn substitute_text(text: &str, bindings: &InputBindings) -> String {
    if bindings.is_empty() {
        return text.to_string();
    }
    value_text(&substitute_string(text, bindings))
}

/// Substitutes input references in `if` expression text.
pub fn substitute_condition(condition: &str, bindings: &InputBindings) -> Option<String> {
    if bindings.is_empty() {
        return Some(condition.to_string());
    }
    condition_text(&substitute_condition_value(
        &Value::String(condition.to_string()),
        bindings,
    ))
}

/// Applies bindings to every field of a step.
pub fn bind_step(step: &Step, bindings: &InputBindings) -> Step {
    if bindings.is_empty() {
        return step.clone();
    }

    match step {
        Step::Plain(plain) => Step::Plain(PlainStep::new(substitute_fields(&plain.fields, bindings))),
        Step::Include(include) => Step::Include(IncludeStep {
            reference: substitute_text(&include.reference, bindings),
            with: substitute_fields(&include.with, bindings),
            condition: include
                .condition
                .as_deref()
                .and_then(|c| substitute_condition(c, bindings)),
            continue_on_error: include
                .continue_on_error
                .as_ref()
                .map(|v| substitute(v, bindings)),
            name: include.name.as_deref().map(|n| substitute_text(n, bindings)),
            overrides: substitute_fields(&include.overrides, bindings),
        }),
        Step::IncludeScript(script) => Step::IncludeScript(IncludeScriptStep {
            script: substitute_text(&script.script, bindings),
            shell: script.shell.as_deref().map(|s| substitute_text(s, bindings)),
            fields: substitute_fields(&script.fields, bindings),
        }),
    }
}

/// Applies bindings to a job entry and all of its steps.
pub fn bind_job(entry: &JobEntry, bindings: &InputBindings) -> JobEntry {
    if bindings.is_empty() {
        return entry.clone();
    }

    match entry {
        JobEntry::Job(job) => JobEntry::Job(Job {
            fields: substitute_fields(&job.fields, bindings),
            steps: job
                .steps
                .as_ref()
                .map(|steps| steps.iter().map(|s| bind_step(s, bindings)).collect()),
        }),
        JobEntry::Include(include) => JobEntry::Include(JobInclude {
            reference: substitute_text(&include.reference, bindings),
            with: substitute_fields(&include.with, bindings),
            condition: include
                .condition
                .as_deref()
                .and_then(|c| substitute_condition(c, bindings)),
            needs: include
                .needs
                .iter()
                .map(|n| substitute_text(n, bindings))
                .collect(),
            overrides: substitute_fields(&include.overrides, bindings),
        }),
    }
}

fn substitute(value: &Value, bindings: &InputBindings) -> Value {
    match value {
        Value::String(s) => substitute_string(s, bindings),
        Value::Sequence(items) => {
            Value::Sequence(items.iter().map(|v| substitute(v, bindings)).collect())
        }
        Value::Mapping(fields) => Value::Mapping(substitute_fields(fields, bindings)),
        Value::Tagged(tagged) => Value::Tagged(Box::new(TaggedValue {
            tag: tagged.tag.clone(),
            value: substitute(&tagged.value, bindings),
        })),
        other => other.clone(),
    }
}

fn substitute_fields(fields: &Mapping, bindings: &InputBindings) -> Mapping {
    fields
        .iter()
        .map(|(k, v)| {
            let v = if k.as_str() == Some("if") {
                substitute_condition_value(v, bindings)
            } else {
                substitute(v, bindings)
            };
            (k.clone(), v)
        })
        .collect()
}

/// An `if` value without `${{ }}` is an expression as a whole.
fn substitute_condition_value(value: &Value, bindings: &InputBindings) -> Value {
    match value {
        Value::String(s) if !s.contains("${{") => {
            Value::String(substitute_expression(s, bindings))
        }
        other => substitute(other, bindings),
    }
}

fn substitute_string(text: &str, bindings: &InputBindings) -> Value {
    if !text.contains("${{") {
        return Value::String(text.to_string());
    }

    if let Some(caps) = WHOLE_INPUT.captures(text) {
        if let Some(value) = bindings.get(&caps[1]) {
            return value.clone();
        }
    }

    let replaced = EXPRESSION.replace_all(text, |caps: &Captures| {
        let inner = &caps[1];
        if let Some(bare) = BARE_INPUT.captures(inner.trim()) {
            if let Some(value) = bindings.get(&bare[1]) {
                return value_text(value);
            }
        }
        let mut out = String::from("${{");
        out.push_str(&substitute_expression(inner, bindings));
        out.push_str("}}");
        out
    });
    Value::String(replaced.into_owned())
}

/// Replaces input tokens outside single-quoted string literals.
fn substitute_expression(expression: &str, bindings: &InputBindings) -> String {
    expression
        .split('\'')
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 0 {
                substitute_tokens(part, bindings)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("'")
}

fn substitute_tokens(text: &str, bindings: &InputBindings) -> String {
    INPUT_TOKEN
        .replace_all(text, |caps: &Captures| match bindings.get(&caps[2]) {
            Some(value) => format!("{}{}", &caps[1], render_operand(value)),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Renders a bound value as an operand of a larger expression.
fn render_operand(value: &Value) -> String {
    match value {
        Value::String(s) => render_string_operand(s),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        Value::Tagged(tagged) => render_operand(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => {
            format!("fromJSON({})", quote(&json_text(value)))
        }
    }
}

fn render_string_operand(text: &str) -> String {
    if !text.contains("${{") {
        return quote(text);
    }

    let trimmed = text.trim();
    if let Some(caps) = EXPRESSION.captures(trimmed) {
        let whole = caps.get(0).map_or(0, |m| m.len()) == trimmed.len();
        let inner = caps[1].trim();
        if whole && !inner.contains("}}") {
            return if SIMPLE_PATH.is_match(inner) {
                inner.to_string()
            } else {
                format!("({})", inner)
            };
        }
    }

    let mut template = String::new();
    let mut args = Vec::new();
    let mut last = 0;
    for caps in EXPRESSION.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        template.push_str(&escape_format(&text[last..whole.start()]));
        template.push_str(&format!("{{{}}}", args.len()));
        args.push(caps[1].trim().to_string());
        last = whole.end();
    }
    template.push_str(&escape_format(&text[last..]));

    let mut out = format!("format({}", quote(&template));
    for arg in args {
        out.push_str(", ");
        out.push_str(&arg);
    }
    out.push(')');
    out
}

fn escape_format(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn json_text(value: &Value) -> String {
    // Fails only for mapping keys with no JSON form.
    serde_json::to_string(value).unwrap_or_default()
}

/// Plain-text form of a value, as spliced into a longer string.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        Value::Tagged(tagged) => value_text(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => json_text(value),
    }
}
