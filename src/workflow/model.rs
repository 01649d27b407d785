//! Workflow Data Model
//!
//! In-memory form of workflow files and includable definitions.
//!
//! Only the parts the expander acts on are modelled as typed fields. Everything
//! else (runner, matrix, permissions, env, ...) is kept as an ordered YAML
//! mapping and written back verbatim.
//!
//! # Example YAML Format
//!
//! ```yaml
//! on: push
//! jobs:
//!   test:
//!     runs-on: ubuntu-latest
//!     steps:
//!       - uses: actions/checkout@v4
//!       - includes: /setup-toolchain
//!         with:
//!           toolchain: ${{ matrix.toolchain }}
//!       - includes-script: scripts/report.py
//! ```

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{IncludeError, Result};

/// Key of an include directive on a step or job.
pub const INCLUDES_KEY: &str = "includes";

/// Key of a script include directive on a step.
pub const INCLUDES_SCRIPT_KEY: &str = "includes-script";

/// Builds a mapping key.
pub(crate) fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

/// Reads an `if` value as expression text.
///
/// Conditions may be written as strings, booleans, or numbers.
pub fn condition_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Tagged(tagged) => condition_text(&tagged.value),
        _ => None,
    }
}

/// Reads a `needs` value: either a single job name or a list of names.
pub fn needs_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Sequence(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Writes a `needs` list back, collapsing a single entry to a scalar.
pub fn needs_value(needs: &[String]) -> Value {
    match needs {
        [single] => Value::String(single.clone()),
        _ => Value::Sequence(needs.iter().cloned().map(Value::String).collect()),
    }
}

/// Deserializes either a single string or array of strings into Vec<String>
fn single_or_vec<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Sequence(arr) => arr
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(de::Error::custom("Expected string in array")),
            })
            .collect(),
        _ => Err(de::Error::custom("Expected string or array of strings")),
    }
}

/// Deserializes a boolean written either as a YAML bool or as "true"/"false".
fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(de::Error::custom(format!("Expected boolean, got '{}'", other))),
        },
        _ => Err(de::Error::custom("Expected boolean")),
    }
}

/// Deserializes an optional `if` value into expression text.
fn optional_condition<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(condition_text(&val))
}

/// A step copied through the expander verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainStep {
    pub fields: Mapping,
}

impl PlainStep {
    pub fn new(fields: Mapping) -> Self {
        Self { fields }
    }

    /// Returns a string field.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Returns the step's display name, if any.
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// Returns the step's `if` condition as expression text.
    pub fn condition(&self) -> Option<String> {
        self.fields.get("if").and_then(condition_text)
    }

    /// Sets a field, keeping its position when it already exists.
    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(key(name), value);
    }
}

/// A step that splices in the steps of an includable definition.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeStep {
    /// Reference string as written (`./path`, `/name`, `owner/repo[/path]@ref`).
    pub reference: String,
    /// Caller-supplied input values.
    pub with: Mapping,
    /// `if` override conjoined with every produced step's condition.
    pub condition: Option<String>,
    /// `continue-on-error` override replacing every produced step's value.
    pub continue_on_error: Option<Value>,
    /// Display name; informational only.
    pub name: Option<String>,
    /// Any other fields, applied to every produced step as replacements.
    pub overrides: Mapping,
}

/// A step that inlines a script file as a `run` step.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeScriptStep {
    /// Script path, relative to the repository root.
    pub script: String,
    /// Explicit shell; inferred from the extension when absent.
    pub shell: Option<String>,
    /// Remaining fields, copied onto the produced step.
    pub fields: Mapping,
}

/// One entry of a step list.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Plain(PlainStep),
    Include(IncludeStep),
    IncludeScript(IncludeScriptStep),
}

impl Step {
    /// Classifies a YAML step mapping.
    pub fn from_value(value: &Value, origin: &str) -> Result<Self> {
        let fields = value.as_mapping().ok_or_else(|| IncludeError::Parse {
            origin: origin.to_string(),
            message: format!("step must be a mapping, got {}", describe(value)),
        })?;

        if fields.contains_key("run") || fields.contains_key("uses") {
            Ok(Step::Plain(PlainStep::new(fields.clone())))
        } else if fields.contains_key(INCLUDES_KEY) {
            parse_include_step(fields, origin).map(Step::Include)
        } else if fields.contains_key(INCLUDES_SCRIPT_KEY) {
            parse_include_script_step(fields, origin).map(Step::IncludeScript)
        } else {
            Err(IncludeError::Parse {
                origin: origin.to_string(),
                message: format!(
                    "unknown step type (expected one of run, uses, {}, {}): {}",
                    INCLUDES_KEY,
                    INCLUDES_SCRIPT_KEY,
                    serde_yaml::to_string(value).unwrap_or_default().trim()
                ),
            })
        }
    }

    /// Converts the step back to its YAML form.
    pub fn to_value(&self) -> Value {
        match self {
            Step::Plain(plain) => Value::Mapping(plain.fields.clone()),
            Step::Include(include) => {
                let mut fields = Mapping::new();
                if let Some(name) = &include.name {
                    fields.insert(key("name"), Value::String(name.clone()));
                }
                fields.insert(key(INCLUDES_KEY), Value::String(include.reference.clone()));
                if let Some(condition) = &include.condition {
                    fields.insert(key("if"), Value::String(condition.clone()));
                }
                if let Some(value) = &include.continue_on_error {
                    fields.insert(key("continue-on-error"), value.clone());
                }
                if !include.with.is_empty() {
                    fields.insert(key("with"), Value::Mapping(include.with.clone()));
                }
                for (k, v) in &include.overrides {
                    fields.insert(k.clone(), v.clone());
                }
                Value::Mapping(fields)
            }
            Step::IncludeScript(script) => {
                let mut fields = Mapping::new();
                fields.insert(key(INCLUDES_SCRIPT_KEY), Value::String(script.script.clone()));
                if let Some(shell) = &script.shell {
                    fields.insert(key("shell"), Value::String(shell.clone()));
                }
                for (k, v) in &script.fields {
                    fields.insert(k.clone(), v.clone());
                }
                Value::Mapping(fields)
            }
        }
    }

    /// Returns true if the step needs no expansion.
    pub fn is_plain(&self) -> bool {
        matches!(self, Step::Plain(_))
    }
}

fn parse_include_step(fields: &Mapping, origin: &str) -> Result<IncludeStep> {
    let mut step = IncludeStep {
        reference: String::new(),
        with: Mapping::new(),
        condition: None,
        continue_on_error: None,
        name: None,
        overrides: Mapping::new(),
    };

    for (k, v) in fields {
        let name = field_name(k, origin)?;
        match name {
            INCLUDES_KEY => step.reference = required_str(v, INCLUDES_KEY, origin)?.to_string(),
            "with" => step.with = optional_mapping(v, "with", origin)?,
            "if" => step.condition = condition_text(v),
            "continue-on-error" => step.continue_on_error = Some(v.clone()),
            "name" => step.name = v.as_str().map(str::to_string),
            _ => {
                step.overrides.insert(k.clone(), v.clone());
            }
        }
    }

    Ok(step)
}

fn parse_include_script_step(fields: &Mapping, origin: &str) -> Result<IncludeScriptStep> {
    let mut step = IncludeScriptStep {
        script: String::new(),
        shell: None,
        fields: Mapping::new(),
    };

    for (k, v) in fields {
        match field_name(k, origin)? {
            INCLUDES_SCRIPT_KEY => {
                step.script = required_str(v, INCLUDES_SCRIPT_KEY, origin)?.to_string()
            }
            "shell" => step.shell = Some(required_str(v, "shell", origin)?.to_string()),
            _ => {
                step.fields.insert(k.clone(), v.clone());
            }
        }
    }

    Ok(step)
}

/// A job whose steps are expanded in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// All job fields in source order; `steps` holds a placeholder.
    pub fields: Mapping,
    /// Step list; `None` for jobs without steps (reusable-workflow calls).
    pub steps: Option<Vec<Step>>,
}

impl Job {
    /// Returns the job's `needs` list.
    pub fn needs(&self) -> Vec<String> {
        self.fields.get("needs").map(needs_list).unwrap_or_default()
    }

    /// Returns the job's `if` condition as expression text.
    pub fn condition(&self) -> Option<String> {
        self.fields.get("if").and_then(condition_text)
    }

    /// Sets a field, keeping its position when it already exists.
    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(key(name), value);
    }

    pub fn to_value(&self) -> Value {
        let mut out = Mapping::new();
        for (k, v) in &self.fields {
            if k.as_str() == Some("steps") {
                if let Some(steps) = &self.steps {
                    out.insert(k.clone(), Value::Sequence(steps.iter().map(Step::to_value).collect()));
                }
            } else {
                out.insert(k.clone(), v.clone());
            }
        }
        if let Some(steps) = &self.steps {
            if !out.contains_key("steps") {
                out.insert(key("steps"), Value::Sequence(steps.iter().map(Step::to_value).collect()));
            }
        }
        Value::Mapping(out)
    }
}

/// A job replaced by the jobs of an includable workflow definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobInclude {
    #[serde(rename = "includes")]
    pub reference: String,

    #[serde(default)]
    pub with: Mapping,

    #[serde(rename = "if", default, deserialize_with = "optional_condition")]
    pub condition: Option<String>,

    #[serde(default, deserialize_with = "single_or_vec")]
    pub needs: Vec<String>,

    /// Any other fields, applied to every produced job as replacements.
    #[serde(flatten)]
    pub overrides: Mapping,
}

impl JobInclude {
    pub fn to_value(&self) -> Value {
        let mut fields = Mapping::new();
        fields.insert(key(INCLUDES_KEY), Value::String(self.reference.clone()));
        if !self.needs.is_empty() {
            fields.insert(key("needs"), needs_value(&self.needs));
        }
        if let Some(condition) = &self.condition {
            fields.insert(key("if"), Value::String(condition.clone()));
        }
        if !self.with.is_empty() {
            fields.insert(key("with"), Value::Mapping(self.with.clone()));
        }
        for (k, v) in &self.overrides {
            fields.insert(k.clone(), v.clone());
        }
        Value::Mapping(fields)
    }
}

/// One entry of a `jobs` mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEntry {
    Job(Job),
    Include(JobInclude),
}

impl JobEntry {
    /// Classifies a YAML job mapping.
    pub fn from_value(name: &str, value: &Value, origin: &str) -> Result<Self> {
        let context = format!("{} (job '{}')", origin, name);
        let fields = value.as_mapping().ok_or_else(|| IncludeError::Parse {
            origin: context.clone(),
            message: format!("job must be a mapping, got {}", describe(value)),
        })?;

        if fields.contains_key(INCLUDES_KEY) {
            let include: JobInclude =
                serde_yaml::from_value(value.clone()).map_err(|source| IncludeError::Yaml {
                    origin: context.clone(),
                    source,
                })?;
            return Ok(JobEntry::Include(include));
        }

        let mut kept = Mapping::new();
        let mut steps = None;
        for (k, v) in fields {
            if k.as_str() == Some("steps") {
                let items = v.as_sequence().ok_or_else(|| IncludeError::Parse {
                    origin: context.clone(),
                    message: "`steps` must be a list".to_string(),
                })?;
                steps = Some(
                    items
                        .iter()
                        .map(|item| Step::from_value(item, &context))
                        .collect::<Result<Vec<_>>>()?,
                );
                kept.insert(k.clone(), Value::Null);
            } else {
                kept.insert(k.clone(), v.clone());
            }
        }

        Ok(JobEntry::Job(Job {
            fields: kept,
            steps,
        }))
    }

    pub fn to_value(&self) -> Value {
        match self {
            JobEntry::Job(job) => job.to_value(),
            JobEntry::Include(include) => include.to_value(),
        }
    }

    /// Returns true if the entry and its steps need no expansion.
    pub fn is_expanded(&self) -> bool {
        match self {
            JobEntry::Job(job) => job
                .steps
                .as_ref()
                .map_or(true, |steps| steps.iter().all(Step::is_plain)),
            JobEntry::Include(_) => false,
        }
    }
}

/// A complete workflow file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkflowDocument {
    /// Top-level fields in source order; `jobs` holds a placeholder.
    pub fields: Mapping,
    /// Jobs in source order.
    pub jobs: Vec<(String, JobEntry)>,
}

impl WorkflowDocument {
    /// Gets a job by name.
    pub fn get_job(&self, name: &str) -> Option<&JobEntry> {
        self.jobs.iter().find(|(n, _)| n == name).map(|(_, job)| job)
    }

    /// Returns true when no job contains an include directive.
    pub fn is_expanded(&self) -> bool {
        self.jobs.iter().all(|(_, job)| job.is_expanded())
    }

    /// Returns the number of jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn to_value(&self) -> Value {
        let jobs: Mapping = self
            .jobs
            .iter()
            .map(|(name, job)| (key(name), job.to_value()))
            .collect();

        let mut out = Mapping::new();
        let mut placed = false;
        for (k, v) in &self.fields {
            if k.as_str() == Some("jobs") {
                out.insert(k.clone(), Value::Mapping(jobs.clone()));
                placed = true;
            } else {
                out.insert(k.clone(), v.clone());
            }
        }
        if !placed {
            out.insert(key("jobs"), Value::Mapping(jobs));
        }
        Value::Mapping(out)
    }
}

/// Declaration of one input of an includable definition.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct InputSpec {
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "flexible_bool")]
    pub required: bool,

    /// Default expression text, used verbatim when the caller gives no value.
    #[serde(default)]
    pub default: Option<Value>,
}

/// An includable step sequence (`runs.using: includes`).
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeDefinition {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Declared inputs in declaration order.
    pub inputs: Vec<(String, InputSpec)>,
    /// Body; may contain further includes.
    pub steps: Vec<Step>,
}

/// An includable set of jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub inputs: Vec<(String, InputSpec)>,
    pub jobs: Vec<(String, JobEntry)>,
}

fn field_name<'a>(key: &'a Value, origin: &str) -> Result<&'a str> {
    key.as_str().ok_or_else(|| IncludeError::Parse {
        origin: origin.to_string(),
        message: format!("expected a string key, got {}", describe(key)),
    })
}

fn required_str<'a>(value: &'a Value, field: &str, origin: &str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| IncludeError::Parse {
        origin: origin.to_string(),
        message: format!("`{}` must be a string, got {}", field, describe(value)),
    })
}

fn optional_mapping(value: &Value, field: &str, origin: &str) -> Result<Mapping> {
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(m) => Ok(m.clone()),
        other => Err(IncludeError::Parse {
            origin: origin.to_string(),
            message: format!("`{}` must be a mapping, got {}", field, describe(other)),
        }),
    }
}

/// Short name of a YAML value's kind, for error messages.
pub(crate) fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
