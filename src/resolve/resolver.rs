//! Reference Resolver
//!
//! Turns include references into loaded definitions. Local targets are read
//! through the [`FileSystem`] collaborator, remote ones through the
//! [`SourceFetcher`]; the resolver itself does no network I/O.

use log::{debug, info};

use super::reference::{normalize, ActionReference, IncludeKind};
use super::source::{FileSystem, SourceFetcher, Sources};
use crate::error::{IncludeError, Result};
use crate::workflow::model::{CompositeDefinition, WorkflowDefinition};
use crate::workflow::parser::{parse_composite, parse_workflow_definition};

/// A loaded include target.
#[derive(Debug, Clone)]
pub struct Resolved<D> {
    /// Canonical identity of the include target.
    pub reference: ActionReference,
    /// The definition file that was read.
    pub file: ActionReference,
    pub definition: D,
}

/// Locates and loads include targets.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    sources: Sources<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(files: &'a dyn FileSystem, fetcher: &'a dyn SourceFetcher) -> Self {
        Self {
            sources: Sources::new(files, fetcher),
        }
    }

    /// Resolves `text`, written in the document at `origin`, to a loaded
    /// step-sequence definition.
    pub fn resolve_action(
        &self,
        text: &str,
        origin: &ActionReference,
    ) -> Result<Resolved<CompositeDefinition>> {
        let reference = ActionReference::parse(text, IncludeKind::Action, origin)?;
        let (file, definition) = self.load_action(&reference)?;
        Ok(Resolved {
            reference,
            file,
            definition,
        })
    }

    /// Resolves `text`, written in the document at `origin`, to a loaded
    /// job-set definition.
    pub fn resolve_workflow(
        &self,
        text: &str,
        origin: &ActionReference,
    ) -> Result<Resolved<WorkflowDefinition>> {
        let reference = ActionReference::parse(text, IncludeKind::Workflow, origin)?;
        let (file, definition) = self.load_workflow(&reference)?;
        Ok(Resolved {
            reference,
            file,
            definition,
        })
    }

    /// Loads the step-sequence definition in the directory `reference`.
    pub fn load_action(
        &self,
        reference: &ActionReference,
    ) -> Result<(ActionReference, CompositeDefinition)> {
        let (file, text) = self.locate(reference, IncludeKind::Action)?;
        let definition = parse_composite(&text, &file.to_string())?;
        info!(
            "Including {} ({} steps, {} inputs)",
            file,
            definition.steps.len(),
            definition.inputs.len()
        );
        Ok((file, definition))
    }

    /// Loads the job-set definition in the directory `reference`.
    pub fn load_workflow(
        &self,
        reference: &ActionReference,
    ) -> Result<(ActionReference, WorkflowDefinition)> {
        let (file, text) = self.locate(reference, IncludeKind::Workflow)?;
        let definition = parse_workflow_definition(&text, &file.to_string())?;
        info!(
            "Including {} ({} jobs, {} inputs)",
            file,
            definition.jobs.len(),
            definition.inputs.len()
        );
        Ok((file, definition))
    }

    /// Reads a script by repository-root-relative path, in the repository
    /// `origin` belongs to.
    pub fn read_script(
        &self,
        origin: &ActionReference,
        script: &str,
    ) -> Result<(ActionReference, String)> {
        let relative = script.trim_start_matches("./").trim_start_matches('/');
        let path = normalize(relative).ok_or_else(|| IncludeError::ReferenceSyntax {
            reference: script.to_string(),
            reason: "script path escapes the repository root".to_string(),
        })?;
        let target = origin.with_path(path);
        debug!("Including script {}", target);
        let text = self.sources.read_text(&target)?;
        Ok((target, text))
    }

    /// Finds the first existing definition file inside `reference`.
    fn locate(
        &self,
        reference: &ActionReference,
        kind: IncludeKind,
    ) -> Result<(ActionReference, String)> {
        let mut tried = Vec::new();
        for name in kind.definition_files() {
            let file = reference.join(name);
            match self.sources.read_text(&file) {
                Ok(text) => return Ok((file, text)),
                Err(e) if e.is_not_found() => {
                    debug!("No {} at {}", name, reference);
                    tried.push(file.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Err(IncludeError::NotFound {
            path: format!("{} (tried {})", reference, tried.join(", ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::source::{MemoryFetcher, MemoryFileSystem};

    const GREET: &str = r#"
inputs:
  who:
    required: true
runs:
  using: includes
  steps:
    - run: echo hello ${{ inputs.who }}
"#;

    fn origin() -> ActionReference {
        ActionReference::local(".github/workflows_src/ci.yml").unwrap()
    }

    #[test]
    fn test_resolve_shorthand() {
        let files = MemoryFileSystem::new().with_file(".github/includes/actions/greet/action.yml", GREET);
        let fetcher = MemoryFetcher::new();
        let resolver = Resolver::new(&files, &fetcher);

        let Resolved {
            file, definition: def, ..
        } = resolver.resolve_action("/greet", &origin()).unwrap();
        assert_eq!(file.path(), ".github/includes/actions/greet/action.yml");
        assert_eq!(def.inputs[0].0, "who");
    }

    #[test]
    fn test_resolve_falls_back_to_yaml_extension() {
        let files = MemoryFileSystem::new().with_file("tools/greet/action.yaml", GREET);
        let fetcher = MemoryFetcher::new();
        let resolver = Resolver::new(&files, &fetcher);

        let Resolved { file, .. } = resolver.resolve_action("./tools/greet", &origin()).unwrap();
        assert_eq!(file.file_name(), "action.yaml");
    }

    #[test]
    fn test_resolve_remote_uses_fetcher() {
        let files = MemoryFileSystem::new();
        let fetcher = MemoryFetcher::new().with_file("octo/tools", "v1", "greet/action.yml", GREET);
        let resolver = Resolver::new(&files, &fetcher);

        let Resolved {
            file, definition: def, ..
        } = resolver.resolve_action("octo/tools/greet@v1", &origin()).unwrap();
        assert_eq!(file.to_string(), "octo/tools/greet/action.yml@v1");
        assert_eq!(def.steps.len(), 1);
    }

    #[test]
    fn test_resolve_missing_lists_tried_files() {
        let files = MemoryFileSystem::new();
        let fetcher = MemoryFetcher::new();
        let resolver = Resolver::new(&files, &fetcher);

        let err = resolver.resolve_action("./nowhere", &origin()).unwrap_err();
        match err {
            IncludeError::NotFound { path } => {
                assert!(path.contains("nowhere/action.yml"));
                assert!(path.contains("nowhere/action.yaml"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_resolve_rejects_non_includes_definition() {
        let files = MemoryFileSystem::new().with_file(
            "node/action.yml",
            "runs:\n  using: node20\n  main: index.js\n",
        );
        let fetcher = MemoryFetcher::new();
        let resolver = Resolver::new(&files, &fetcher);

        let err = resolver.resolve_action("./node", &origin()).unwrap_err();
        assert!(matches!(err, IncludeError::InvalidDefinitionKind { kind, .. } if kind == "node20"));
    }

    #[test]
    fn test_fetch_failure_is_not_masked() {
        let files = MemoryFileSystem::new();
        let fetcher = crate::resolve::source::OfflineFetcher;
        let resolver = Resolver::new(&files, &fetcher);

        let err = resolver.resolve_action("octo/tools@v1", &origin()).unwrap_err();
        assert!(matches!(err, IncludeError::Fetch { .. }));
    }

    #[test]
    fn test_read_script_from_repository_root() {
        let files = MemoryFileSystem::new().with_file("scripts/hello.py", "print('hi')");
        let fetcher = MemoryFetcher::new();
        let resolver = Resolver::new(&files, &fetcher);

        let (target, text) = resolver.read_script(&origin(), "./scripts/hello.py").unwrap();
        assert_eq!(target.path(), "scripts/hello.py");
        assert_eq!(text, "print('hi')");

        let err = resolver.read_script(&origin(), "../outside.sh").unwrap_err();
        assert!(matches!(err, IncludeError::ReferenceSyntax { .. }));
    }

    #[test]
    fn test_load_workflow_definition() {
        let files = MemoryFileSystem::new().with_file(
            ".github/includes/workflows/lint/workflow.yml",
            "jobs:\n  lint:\n    runs-on: ubuntu-latest\n    steps:\n      - run: make lint\n",
        );
        let fetcher = MemoryFetcher::new();
        let resolver = Resolver::new(&files, &fetcher);

        let resolved = resolver.resolve_workflow("/lint", &origin()).unwrap();
        assert_eq!(resolved.reference.path(), ".github/includes/workflows/lint");
        assert_eq!(resolved.file.file_name(), "workflow.yml");
        assert_eq!(resolved.definition.jobs[0].0, "lint");
    }
}
