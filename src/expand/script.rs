//! Script Inclusion
//!
//! Inlines a script file as the body of a `run` step. The shell comes from
//! the step when given, otherwise from the script's extension.

use log::info;
use serde_yaml::{Mapping, Value};

use crate::error::{IncludeError, Result};
use crate::resolve::{ActionReference, Resolver};
use crate::workflow::model::{key, IncludeScriptStep, PlainStep};

/// Extension to shell. Entries with `{0}` are custom shells that receive the
/// script path.
const SHELLS: &[(&str, &str)] = &[
    ("py", "python"),
    ("sh", "bash"),
    ("ps1", "pwsh"),
    ("cmd", "cmd"),
    ("rb", "ruby {0}"),
    ("pl", "perl {0}"),
    ("cmake", "cmake -P {0}"),
];

/// Infers the shell for a script from its extension.
pub fn shell_for(script: &str) -> Option<&'static str> {
    let file_name = script.rsplit('/').next().unwrap_or(script);
    let (_, extension) = file_name.rsplit_once('.')?;
    SHELLS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, shell)| *shell)
}

/// Produces the `run` step for an `includes-script` step.
///
/// The script path is resolved against the root of the repository `origin`
/// belongs to.
pub fn include_script(
    step: &IncludeScriptStep,
    origin: &ActionReference,
    resolver: &Resolver<'_>,
) -> Result<PlainStep> {
    let shell = match &step.shell {
        Some(shell) => shell.clone(),
        None => shell_for(&step.script)
            .ok_or_else(|| IncludeError::UnknownShell {
                script: step.script.clone(),
            })?
            .to_string(),
    };

    let (target, content) = resolver.read_script(origin, &step.script)?;
    info!("Inlining script {} ({} bytes, shell: {})", target, content.len(), shell);

    let mut fields = Mapping::new();
    if !step.fields.contains_key("name") {
        fields.insert(key("name"), Value::String(target.file_name().to_string()));
    }
    for (k, v) in &step.fields {
        if k.as_str() != Some("run") {
            fields.insert(k.clone(), v.clone());
        }
    }
    fields.insert(key("shell"), Value::String(shell));
    fields.insert(key("run"), Value::String(content));

    Ok(PlainStep::new(fields))
}
