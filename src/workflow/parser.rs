//! Workflow Parser
//!
//! Loads workflow files and includable definitions from YAML, and writes
//! expanded workflows back out.
//!
//! Written output carries a header naming the source file, so readers know
//! not to edit the generated file directly.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde_yaml::{Mapping, Value};

use super::model::{
    describe, CompositeDefinition, InputSpec, JobEntry, Step, WorkflowDefinition,
    WorkflowDocument,
};
use crate::error::{IncludeError, Result};

/// Execution mode a definition must declare to be includable.
pub const INCLUDES_MODE: &str = "includes";

/// Prefix of the header line naming the source file.
pub const GENERATED_MARKER: &str = "It is generated from: ";

fn parse_yaml(text: &str, origin: &str) -> Result<Value> {
    debug!("Parsing {} ({} bytes)", origin, text.len());
    serde_yaml::from_str(text).map_err(|source| IncludeError::Yaml {
        origin: origin.to_string(),
        source,
    })
}

fn root_mapping<'a>(value: &'a Value, origin: &str) -> Result<&'a Mapping> {
    value.as_mapping().ok_or_else(|| IncludeError::Parse {
        origin: origin.to_string(),
        message: format!("document must be a mapping, got {}", describe(value)),
    })
}

fn parse_jobs(value: Option<&Value>, origin: &str) -> Result<Vec<(String, JobEntry)>> {
    let jobs = value
        .and_then(Value::as_mapping)
        .ok_or_else(|| IncludeError::Parse {
            origin: origin.to_string(),
            message: "missing `jobs` mapping".to_string(),
        })?;

    jobs.iter()
        .map(|(name, job)| {
            let name = name.as_str().ok_or_else(|| IncludeError::Parse {
                origin: origin.to_string(),
                message: format!("job names must be strings, got {}", describe(name)),
            })?;
            Ok((name.to_string(), JobEntry::from_value(name, job, origin)?))
        })
        .collect()
}

fn parse_inputs(value: Option<&Value>, origin: &str) -> Result<Vec<(String, InputSpec)>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }

    let inputs = value.as_mapping().ok_or_else(|| IncludeError::Parse {
        origin: origin.to_string(),
        message: "`inputs` must be a mapping".to_string(),
    })?;

    inputs
        .iter()
        .map(|(name, spec)| {
            let name = name.as_str().ok_or_else(|| IncludeError::Parse {
                origin: origin.to_string(),
                message: "input names must be strings".to_string(),
            })?;
            let spec = if spec.is_null() {
                InputSpec::default()
            } else {
                serde_yaml::from_value(spec.clone()).map_err(|source| IncludeError::Yaml {
                    origin: format!("{} (input '{}')", origin, name),
                    source,
                })?
            };
            Ok((name.to_string(), spec))
        })
        .collect()
}

/// Parses a workflow file.
pub fn parse_workflow(text: &str, origin: &str) -> Result<WorkflowDocument> {
    let value = parse_yaml(text, origin)?;
    let root = root_mapping(&value, origin)?;

    let jobs = parse_jobs(root.get("jobs"), origin)?;

    let mut fields = Mapping::new();
    for (k, v) in root {
        if k.as_str() == Some("jobs") {
            fields.insert(k.clone(), Value::Null);
        } else {
            fields.insert(k.clone(), v.clone());
        }
    }

    info!("Parsed {}: {} jobs", origin, jobs.len());
    Ok(WorkflowDocument { fields, jobs })
}

/// Parses an includable step-sequence definition.
///
/// The definition must declare `runs.using: includes`.
pub fn parse_composite(text: &str, origin: &str) -> Result<CompositeDefinition> {
    let value = parse_yaml(text, origin)?;
    let root = root_mapping(&value, origin)?;

    let runs = root
        .get("runs")
        .and_then(Value::as_mapping)
        .ok_or_else(|| IncludeError::Parse {
            origin: origin.to_string(),
            message: "missing `runs` mapping".to_string(),
        })?;

    let using = runs.get("using").and_then(Value::as_str).unwrap_or("<missing>");
    if using != INCLUDES_MODE {
        return Err(IncludeError::InvalidDefinitionKind {
            reference: origin.to_string(),
            kind: using.to_string(),
        });
    }

    let steps = runs
        .get("steps")
        .and_then(Value::as_sequence)
        .ok_or_else(|| IncludeError::Parse {
            origin: origin.to_string(),
            message: "missing `runs.steps` list".to_string(),
        })?
        .iter()
        .map(|step| Step::from_value(step, origin))
        .collect::<Result<Vec<_>>>()?;

    let text_field = |name: &str| root.get(name).and_then(Value::as_str).map(str::to_string);

    Ok(CompositeDefinition {
        name: text_field("name"),
        description: text_field("description"),
        inputs: parse_inputs(root.get("inputs"), origin)?,
        steps,
    })
}

/// Parses an includable set of jobs.
pub fn parse_workflow_definition(text: &str, origin: &str) -> Result<WorkflowDefinition> {
    let value = parse_yaml(text, origin)?;
    let root = root_mapping(&value, origin)?;

    Ok(WorkflowDefinition {
        inputs: parse_inputs(root.get("inputs"), origin)?,
        jobs: parse_jobs(root.get("jobs"), origin)?,
    })
}

/// Serializes a workflow to YAML.
pub fn to_yaml(document: &WorkflowDocument) -> Result<String> {
    serde_yaml::to_string(&document.to_value()).map_err(|source| IncludeError::Yaml {
        origin: "expanded workflow".to_string(),
        source,
    })
}

const BANNER_START: &str = "# !! WARNING !!";

/// Leading `#` comment lines of a source file, stopping at a previous banner.
fn leading_comments(source: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = source
        .lines()
        .take_while(|line| line.starts_with('#') || line.trim().is_empty())
        .take_while(|line| line.trim_end() != BANNER_START)
        .collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    lines
}

/// Renders the final output file.
///
/// With `header` set, the source's leading comments are kept and followed by
/// a banner naming `source_label`.
pub fn render_output(
    document: &WorkflowDocument,
    source_text: &str,
    source_label: &str,
    header: bool,
) -> Result<String> {
    let body = to_yaml(document)?;
    if !header {
        return Ok(body);
    }

    let mut out = String::new();
    let comments = leading_comments(source_text);
    for line in &comments {
        out.push_str(line);
        out.push('\n');
    }
    if !comments.is_empty() {
        out.push('\n');
    }
    out.push_str(BANNER_START);
    out.push('\n');
    out.push_str("# Do not modify this file directly!\n");
    out.push_str("# !! WARNING !!\n");
    out.push_str("#\n");
    out.push_str(&format!("# {}{}\n", GENERATED_MARKER, source_label));
    out.push_str(&format!("# using {}\n", crate::APP_NAME));
    out.push('\n');
    out.push_str(&body);
    Ok(out)
}

/// Writes rendered output to a file.
pub fn save_output(content: &str, path: &Path) -> Result<()> {
    fs::write(path, content).map_err(|source| IncludeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!("Workflow saved to: {}", path.display());
    Ok(())
}
