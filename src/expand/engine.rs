//! Expansion Engine
//!
//! Recursively replaces include directives with the content they name:
//!
//! - `includes` steps are spliced in place by the steps of the definition
//! - `includes-script` steps become a single `run` step
//! - jobs written as `includes: <ref>` are replaced by the jobs of a
//!   workflow definition, with prefixed names
//!
//! # Cycle Detection
//!
//! The references currently being expanded form a stack that is threaded
//! through every recursive call. Entering a reference already on the stack
//! fails with the full chain; siblings never see each other's entries
//! because every frame pops on return.

use std::collections::HashSet;

use log::{debug, info, warn};
use serde_yaml::{Mapping, Value};

use super::conditions::merge_conditions;
use super::inputs::{bind_inputs, bind_job, bind_step, InputBindings};
use super::script::include_script;
use crate::error::{IncludeError, Result};
use crate::resolve::reference::ACTIONS_DIR;
use crate::resolve::{ActionReference, Resolved, Resolver};
use crate::workflow::model::{
    needs_value, CompositeDefinition, IncludeStep, Job, JobEntry, JobInclude, PlainStep, Step,
    WorkflowDefinition, WorkflowDocument,
};

/// State of one expansion call tree.
#[derive(Debug, Default)]
pub struct ExpansionContext {
    stack: Vec<ActionReference>,
    bindings: InputBindings,
}

impl ExpansionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters `reference`, failing if it is already being expanded.
    pub fn push(&mut self, reference: ActionReference) -> Result<()> {
        if self.stack.contains(&reference) {
            let chain = self
                .stack
                .iter()
                .skip_while(|r| **r != reference)
                .chain(std::iter::once(&reference))
                .map(ToString::to_string)
                .collect();
            return Err(IncludeError::CircularInclude { chain });
        }
        debug!("{}> {}", "  ".repeat(self.stack.len()), reference);
        self.stack.push(reference);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<ActionReference> {
        self.stack.pop()
    }

    pub fn bindings(&self) -> &InputBindings {
        &self.bindings
    }

    /// Installs `bindings`, returning the ones they replace.
    fn swap_bindings(&mut self, bindings: InputBindings) -> InputBindings {
        std::mem::replace(&mut self.bindings, bindings)
    }
}

/// Expands include directives using a [`Resolver`].
pub struct Engine<'a> {
    resolver: Resolver<'a>,
}

impl<'a> Engine<'a> {
    pub fn new(resolver: Resolver<'a>) -> Self {
        Self { resolver }
    }

    /// Expands every job of a workflow written at `origin`.
    ///
    /// Top-level fields are kept as they are. Fails if expansion produces two
    /// jobs with the same name.
    pub fn expand_document(
        &self,
        document: &WorkflowDocument,
        origin: &ActionReference,
    ) -> Result<WorkflowDocument> {
        info!("Expanding {} ({} jobs)", origin, document.len());
        let mut ctx = ExpansionContext::new();
        let jobs = self.expand_jobs(&document.jobs, origin, &mut ctx)?;

        let mut seen = HashSet::new();
        for (name, _) in &jobs {
            if !seen.insert(name.as_str()) {
                return Err(IncludeError::DuplicateJob {
                    origin: origin.to_string(),
                    job: name.clone(),
                });
            }
        }

        info!("Expanded {} into {} jobs", origin, jobs.len());
        Ok(WorkflowDocument {
            fields: document.fields.clone(),
            jobs: jobs
                .into_iter()
                .map(|(name, job)| (name, JobEntry::Job(job)))
                .collect(),
        })
    }

    /// Expands a list of job entries, replacing job includes in place.
    pub fn expand_jobs(
        &self,
        jobs: &[(String, JobEntry)],
        origin: &ActionReference,
        ctx: &mut ExpansionContext,
    ) -> Result<Vec<(String, Job)>> {
        let mut out = Vec::with_capacity(jobs.len());
        for (name, entry) in jobs {
            match entry {
                JobEntry::Job(job) => out.push((name.clone(), self.expand_job(job, origin, ctx)?)),
                JobEntry::Include(include) => {
                    out.extend(self.expand_job_include(name, include, origin, ctx)?)
                }
            }
        }
        Ok(out)
    }

    /// Expands the steps of one job. Jobs without steps pass through.
    pub fn expand_job(
        &self,
        job: &Job,
        origin: &ActionReference,
        ctx: &mut ExpansionContext,
    ) -> Result<Job> {
        let Some(steps) = &job.steps else {
            return Ok(job.clone());
        };

        let steps = self.expand_steps(steps, origin, ctx)?;
        Ok(Job {
            fields: job.fields.clone(),
            steps: Some(steps.into_iter().map(Step::Plain).collect()),
        })
    }

    /// Expands a step list, left to right, into plain steps.
    pub fn expand_steps(
        &self,
        steps: &[Step],
        origin: &ActionReference,
        ctx: &mut ExpansionContext,
    ) -> Result<Vec<PlainStep>> {
        let mut out = Vec::with_capacity(steps.len());
        for step in steps {
            match step {
                Step::Plain(plain) => out.push(rewrite_uses(plain)),
                Step::IncludeScript(script) => {
                    out.push(include_script(script, origin, &self.resolver)?)
                }
                Step::Include(include) => out.extend(self.expand_include(include, origin, ctx)?),
            }
        }
        Ok(out)
    }

    /// Expands one `includes` step into the steps it stands for.
    fn expand_include(
        &self,
        include: &IncludeStep,
        origin: &ActionReference,
        ctx: &mut ExpansionContext,
    ) -> Result<Vec<PlainStep>> {
        let resolved = self
            .resolver
            .resolve_action(&include.reference, origin)
            .map_err(|e| e.within(include.reference.clone()))?;
        let reference = resolved.reference.clone();
        if let Some(name) = &include.name {
            debug!("Ignoring name '{}' on include of {}", name, reference);
        }

        ctx.push(reference.clone())?;
        let result = self.expand_action_body(resolved, include, ctx);
        ctx.pop();
        let steps = result.map_err(|e| e.within(reference.to_string()))?;

        apply_overrides(steps, include, &reference)
    }

    fn expand_action_body(
        &self,
        resolved: Resolved<CompositeDefinition>,
        include: &IncludeStep,
        ctx: &mut ExpansionContext,
    ) -> Result<Vec<PlainStep>> {
        let Resolved {
            reference,
            file,
            definition,
        } = resolved;
        let own = bind_inputs(&reference.to_string(), &definition.inputs, &include.with)?;
        let bindings = ctx.bindings().fork(own);

        let body: Vec<Step> = definition
            .steps
            .iter()
            .map(|step| bind_step(step, &bindings))
            .collect();

        let previous = ctx.swap_bindings(bindings);
        let result = self.expand_steps(&body, &file, ctx);
        ctx.swap_bindings(previous);

        let steps = result?;
        info!("{} expanded to {} steps", reference, steps.len());
        Ok(steps)
    }

    /// Replaces a job include with the prefixed jobs of its definition.
    fn expand_job_include(
        &self,
        name: &str,
        include: &JobInclude,
        origin: &ActionReference,
        ctx: &mut ExpansionContext,
    ) -> Result<Vec<(String, Job)>> {
        let resolved = self
            .resolver
            .resolve_workflow(&include.reference, origin)
            .map_err(|e| e.within(include.reference.clone()))?;
        let reference = resolved.reference.clone();

        ctx.push(reference.clone())?;
        let result = self.expand_workflow_body(resolved, include, ctx);
        ctx.pop();
        let jobs = result.map_err(|e| e.within(reference.to_string()))?;

        let jobs: Vec<(String, Job)> = jobs
            .into_iter()
            .map(|(job_name, mut job)| {
                let mut needs = include.needs.clone();
                needs.extend(job.needs().into_iter().map(|n| format!("{}{}", name, n)));
                if !needs.is_empty() {
                    job.set("needs", needs_value(&needs));
                }

                if include.condition.is_some() {
                    let inner = job.condition();
                    if let Some(merged) =
                        merge_conditions(include.condition.as_deref(), inner.as_deref())
                    {
                        job.set("if", Value::String(merged));
                    }
                }

                (format!("{}{}", name, job_name), job)
            })
            .collect();

        let jobs = apply_job_overrides(jobs, include, &reference)?;
        info!("Job '{}' expanded to {} jobs from {}", name, jobs.len(), reference);
        Ok(jobs)
    }

    fn expand_workflow_body(
        &self,
        resolved: Resolved<WorkflowDefinition>,
        include: &JobInclude,
        ctx: &mut ExpansionContext,
    ) -> Result<Vec<(String, Job)>> {
        let Resolved {
            reference,
            file,
            definition,
        } = resolved;
        let own = bind_inputs(&reference.to_string(), &definition.inputs, &include.with)?;
        let bindings = ctx.bindings().fork(own);

        let body: Vec<(String, JobEntry)> = definition
            .jobs
            .iter()
            .map(|(name, entry)| (name.clone(), bind_job(entry, &bindings)))
            .collect();

        let previous = ctx.swap_bindings(bindings);
        let result = self.expand_jobs(&body, &file, ctx);
        ctx.swap_bindings(previous);
        result
    }
}

/// Rewrites `uses: /name` to the local shorthand directory.
fn rewrite_uses(step: &PlainStep) -> PlainStep {
    match step.get_str("uses") {
        Some(uses) if uses.starts_with('/') => {
            let mut step = step.clone();
            step.set("uses", Value::String(format!("./{}{}", ACTIONS_DIR, uses)));
            step
        }
        _ => step.clone(),
    }
}

fn field_names(fields: &Mapping) -> Vec<String> {
    fields
        .keys()
        .map(|k| k.as_str().unwrap_or("?").to_string())
        .collect()
}

/// Applies an include's own fields to every step it produced.
///
/// `if` is conjoined; `continue-on-error` and any other field replaces the
/// step's value. An `id` can only name a single produced step.
fn apply_overrides(
    steps: Vec<PlainStep>,
    include: &IncludeStep,
    reference: &ActionReference,
) -> Result<Vec<PlainStep>> {
    if include.overrides.contains_key("id") && steps.len() != 1 {
        return Err(IncludeError::InvalidOverride {
            reference: reference.to_string(),
            field: "id".to_string(),
            reason: format!("step ids must be unique but the include produced {} steps", steps.len()),
        });
    }

    if !include.overrides.is_empty() {
        warn!(
            "Include of {} sets {}; replacing the value on all {} included steps",
            reference,
            field_names(&include.overrides).join(", "),
            steps.len()
        );
    }

    Ok(steps
        .into_iter()
        .map(|mut step| {
            if include.condition.is_some() {
                let inner = step.condition();
                if let Some(merged) =
                    merge_conditions(include.condition.as_deref(), inner.as_deref())
                {
                    step.set("if", Value::String(merged));
                }
            }
            if let Some(value) = &include.continue_on_error {
                step.set("continue-on-error", value.clone());
            }
            for (k, v) in &include.overrides {
                step.fields.insert(k.clone(), v.clone());
            }
            step
        })
        .collect())
}

/// Applies a job include's extra fields to every job it produced.
fn apply_job_overrides(
    jobs: Vec<(String, Job)>,
    include: &JobInclude,
    reference: &ActionReference,
) -> Result<Vec<(String, Job)>> {
    if include.overrides.is_empty() {
        return Ok(jobs);
    }
    if include.overrides.contains_key("steps") {
        return Err(IncludeError::InvalidOverride {
            reference: reference.to_string(),
            field: "steps".to_string(),
            reason: "a job include takes its steps from the included jobs".to_string(),
        });
    }

    warn!(
        "Job include of {} sets {}; replacing the value on all {} included jobs",
        reference,
        field_names(&include.overrides).join(", "),
        jobs.len()
    );
    Ok(jobs
        .into_iter()
        .map(|(name, mut job)| {
            for (k, v) in &include.overrides {
                job.fields.insert(k.clone(), v.clone());
            }
            (name, job)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{MemoryFetcher, MemoryFileSystem};
    use crate::workflow::parser::{parse_workflow, to_yaml};

    fn origin() -> ActionReference {
        ActionReference::local(".github/workflows_src/ci.yml").unwrap()
    }

    fn action(path: &str, body: &str) -> (String, String) {
        (format!("{}/action.yml", path), body.to_string())
    }

    fn files(entries: &[(String, String)]) -> MemoryFileSystem {
        let mut fs = MemoryFileSystem::new();
        for (path, body) in entries {
            fs.insert(path, body.as_str());
        }
        fs
    }

    fn expand(fs: &MemoryFileSystem, workflow: &str) -> Result<WorkflowDocument> {
        expand_with(fs, &MemoryFetcher::new(), workflow)
    }

    fn expand_with(
        fs: &MemoryFileSystem,
        fetcher: &MemoryFetcher,
        workflow: &str,
    ) -> Result<WorkflowDocument> {
        let engine = Engine::new(Resolver::new(fs, fetcher));
        let doc = parse_workflow(workflow, "ci.yml")?;
        engine.expand_document(&doc, &origin())
    }

    fn steps_of(doc: &WorkflowDocument, job: &str) -> Vec<PlainStep> {
        match doc.get_job(job) {
            Some(JobEntry::Job(Job {
                steps: Some(steps), ..
            })) => steps
                .iter()
                .map(|s| match s {
                    Step::Plain(p) => p.clone(),
                    other => panic!("unexpanded step: {:?}", other),
                })
                .collect(),
            other => panic!("job {} not expanded: {:?}", job, other),
        }
    }

    fn runs(doc: &WorkflowDocument, job: &str) -> Vec<String> {
        steps_of(doc, job)
            .iter()
            .map(|s| s.get_str("run").unwrap_or_default().to_string())
            .collect()
    }

    const TWO_STEPS: &str = r#"
runs:
  using: includes
  steps:
    - run: X1
    - run: X2
"#;

    #[test]
    fn test_splice_preserves_order() {
        let fs = files(&[action(".github/includes/actions/x", TWO_STEPS)]);
        let doc = expand(
            &fs,
            "jobs:\n  build:\n    steps:\n      - run: A\n      - includes: /x\n      - run: B\n",
        )
        .unwrap();
        assert_eq!(runs(&doc, "build"), vec!["A", "X1", "X2", "B"]);
    }

    #[test]
    fn test_document_without_includes_is_unchanged() {
        let text = "name: CI\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n    steps:\n      - uses: actions/checkout@v4\n      - run: make\n        if: ${{ always() }}\n";
        let fs = MemoryFileSystem::new();
        let doc = parse_workflow(text, "ci.yml").unwrap();
        let expanded = expand(&fs, text).unwrap();
        assert_eq!(expanded, doc);
        assert_eq!(to_yaml(&expanded).unwrap(), to_yaml(&doc).unwrap());
    }

    #[test]
    fn test_re_expansion_is_noop() {
        let fs = files(&[action(".github/includes/actions/x", TWO_STEPS)]);
        let first = expand(&fs, "jobs:\n  a:\n    steps:\n      - includes: /x\n").unwrap();
        let text = to_yaml(&first).unwrap();
        let second = expand(&fs, &text).unwrap();
        assert_eq!(to_yaml(&second).unwrap(), text);
    }

    #[test]
    fn test_nested_includes() {
        let fs = files(&[
            action(
                ".github/includes/actions/outer",
                "runs:\n  using: includes\n  steps:\n    - run: O1\n    - includes: /inner\n    - run: O2\n",
            ),
            action(".github/includes/actions/inner", TWO_STEPS),
        ]);
        let doc = expand(&fs, "jobs:\n  a:\n    steps:\n      - includes: /outer\n").unwrap();
        assert_eq!(runs(&doc, "a"), vec!["O1", "X1", "X2", "O2"]);
    }

    #[test]
    fn test_cycle_is_detected() {
        let fs = files(&[
            action("a", "runs:\n  using: includes\n  steps:\n    - includes: ./b\n"),
            action("b", "runs:\n  using: includes\n  steps:\n    - includes: ./a\n"),
        ]);
        let err = expand(&fs, "jobs:\n  j:\n    steps:\n      - includes: ./a\n").unwrap_err();
        match err.root_cause() {
            IncludeError::CircularInclude { chain } => {
                assert_eq!(chain, &vec!["./a".to_string(), "./b".into(), "./a".into()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_siblings_do_not_trip_cycle_detection() {
        let fs = files(&[
            action(
                "pair",
                "runs:\n  using: includes\n  steps:\n    - includes: ./leaf\n    - includes: ./leaf\n",
            ),
            action("leaf", "runs:\n  using: includes\n  steps:\n    - run: leaf\n"),
        ]);
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: ./pair\n      - includes: ./leaf\n",
        )
        .unwrap();
        assert_eq!(runs(&doc, "j"), vec!["leaf", "leaf", "leaf"]);
    }

    #[test]
    fn test_context_stack_discipline() {
        let mut ctx = ExpansionContext::new();
        let a = ActionReference::local("a").unwrap();
        let b = ActionReference::local("b").unwrap();
        ctx.push(a.clone()).unwrap();
        ctx.push(b.clone()).unwrap();
        assert!(ctx.push(b.clone()).is_err());
        assert_eq!(ctx.pop(), Some(b.clone()));
        ctx.push(b).unwrap();
        assert!(matches!(
            ctx.push(a),
            Err(IncludeError::CircularInclude { ref chain }) if chain.len() == 3
        ));
    }

    const GREET: &str = r#"
inputs:
  message:
    required: true
  punctuation:
    default: "!"
runs:
  using: includes
  steps:
    - run: echo "${{ inputs.message }}${{ inputs.punctuation }}"
"#;

    #[test]
    fn test_input_default_is_substituted() {
        let fs = files(&[action(".github/includes/actions/greet", GREET)]);
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: /greet\n        with:\n          message: hi\n",
        )
        .unwrap();
        assert_eq!(runs(&doc, "j"), vec!["echo \"hi!\""]);
    }

    #[test]
    fn test_missing_required_input() {
        let fs = files(&[action(".github/includes/actions/greet", GREET)]);
        let err = expand(&fs, "jobs:\n  j:\n    steps:\n      - includes: /greet\n").unwrap_err();
        assert!(matches!(err, IncludeError::Included { .. }));
        assert!(
            matches!(err.root_cause(), IncludeError::MissingInput { input, .. } if input == "message")
        );
    }

    #[test]
    fn test_unknown_input() {
        let fs = files(&[action(".github/includes/actions/greet", GREET)]);
        let err = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: /greet\n        with:\n          message: a\n          colour: red\n",
        )
        .unwrap_err();
        assert!(matches!(err.root_cause(), IncludeError::UnknownInput { .. }));
    }

    #[test]
    fn test_runtime_expressions_pass_through() {
        let fs = files(&[action(".github/includes/actions/greet", GREET)]);
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: /greet\n        with:\n          message: ${{ matrix.os }}\n",
        )
        .unwrap();
        assert_eq!(runs(&doc, "j"), vec!["echo \"${{ matrix.os }}!\""]);
    }

    #[test]
    fn test_nested_with_values_are_bound() {
        let fs = files(&[
            action(
                ".github/includes/actions/wrap",
                "inputs:\n  text:\n    required: true\nruns:\n  using: includes\n  steps:\n    - includes: /greet\n      with:\n        message: ${{ inputs.text }}\n",
            ),
            action(".github/includes/actions/greet", GREET),
        ]);
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: /wrap\n        with:\n          text: nested\n",
        )
        .unwrap();
        assert_eq!(runs(&doc, "j"), vec!["echo \"nested!\""]);
    }

    #[test]
    fn test_if_merging() {
        let fs = files(&[action(
            "cond",
            "runs:\n  using: includes\n  steps:\n    - run: one\n      if: B\n    - run: two\n",
        )]);

        let doc = expand(&fs, "jobs:\n  j:\n    steps:\n      - includes: ./cond\n        if: A\n")
            .unwrap();
        let steps = steps_of(&doc, "j");
        assert_eq!(steps[0].condition().as_deref(), Some("(A) && (B)"));
        assert_eq!(steps[1].condition().as_deref(), Some("A"));

        let doc = expand(&fs, "jobs:\n  j:\n    steps:\n      - includes: ./cond\n").unwrap();
        let steps = steps_of(&doc, "j");
        assert_eq!(steps[0].condition().as_deref(), Some("B"));
        assert_eq!(steps[1].condition(), None);
    }

    #[test]
    fn test_optional_step_toggle() {
        let fs = files(&[action(
            "opt",
            "inputs:\n  lint:\n    default: false\nruns:\n  using: includes\n  steps:\n    - run: make lint\n      if: inputs.lint\n",
        )]);
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: ./opt\n        if: github.ref == 'main'\n        with:\n          lint: true\n",
        )
        .unwrap();
        assert_eq!(
            steps_of(&doc, "j")[0].condition().as_deref(),
            Some("(github.ref == 'main') && (true)")
        );
    }

    #[test]
    fn test_continue_on_error_and_overrides_replace() {
        let fs = files(&[action(
            "coe",
            "runs:\n  using: includes\n  steps:\n    - run: one\n      continue-on-error: false\n      timeout-minutes: 1\n    - run: two\n",
        )]);
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: ./coe\n        continue-on-error: true\n        timeout-minutes: 10\n",
        )
        .unwrap();
        let ten: Value = serde_yaml::from_str("10").unwrap();
        for step in steps_of(&doc, "j") {
            assert_eq!(step.fields.get("continue-on-error"), Some(&Value::Bool(true)));
            assert_eq!(step.fields.get("timeout-minutes"), Some(&ten));
        }
    }

    #[test]
    fn test_id_on_multi_step_include_is_rejected() {
        let fs = files(&[action("x", TWO_STEPS)]);
        let err = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: ./x\n        id: setup\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IncludeError::InvalidOverride { ref field, .. } if field == "id"
        ));
    }

    #[test]
    fn test_id_on_single_step_include_is_kept() {
        let fs = files(&[action(
            "one",
            "runs:\n  using: includes\n  steps:\n    - run: only\n",
        )]);
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes: ./one\n        id: setup\n",
        )
        .unwrap();
        let steps = steps_of(&doc, "j");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].get_str("id"), Some("setup"));
    }

    #[test]
    fn test_include_script_step() {
        let fs = MemoryFileSystem::new().with_file("scripts/hello.py", "print('Hello world')");
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    steps:\n      - includes-script: scripts/hello.py\n",
        )
        .unwrap();
        let step = &steps_of(&doc, "j")[0];
        assert_eq!(step.get_str("shell"), Some("python"));
        assert_eq!(step.get_str("run"), Some("print('Hello world')"));
    }

    #[test]
    fn test_uses_shorthand_rewritten() {
        let fs = MemoryFileSystem::new();
        let doc = expand(&fs, "jobs:\n  j:\n    steps:\n      - uses: /setup\n").unwrap();
        assert_eq!(
            steps_of(&doc, "j")[0].get_str("uses"),
            Some("./.github/includes/actions/setup")
        );
    }

    #[test]
    fn test_errors_carry_include_chain() {
        let fs = files(&[action(
            "outer",
            "runs:\n  using: includes\n  steps:\n    - includes: ./missing\n",
        )]);
        let err = expand(&fs, "jobs:\n  j:\n    steps:\n      - includes: ./outer\n").unwrap_err();
        assert_eq!(err.to_string(), "while expanding ./outer");
        assert!(err.root_cause().is_not_found());
    }

    #[test]
    fn test_remote_include_with_relative_references() {
        let fetcher = MemoryFetcher::new()
            .with_file(
                "octo/tools",
                "v1",
                "build/action.yml",
                "runs:\n  using: includes\n  steps:\n    - includes: /helper\n    - includes-script: scripts/post.sh\n",
            )
            .with_file(
                "octo/tools",
                "v1",
                ".github/includes/actions/helper/action.yml",
                "runs:\n  using: includes\n  steps:\n    - run: helped\n",
            )
            .with_file("octo/tools", "v1", "scripts/post.sh", "echo post");
        let fs = MemoryFileSystem::new();

        let doc = expand_with(
            &fs,
            &fetcher,
            "jobs:\n  j:\n    steps:\n      - includes: octo/tools/build@v1\n",
        )
        .unwrap();
        assert_eq!(runs(&doc, "j"), vec!["helped", "echo post"]);
    }

    #[test]
    fn test_job_include() {
        let fs = MemoryFileSystem::new()
            .with_file(
                ".github/includes/workflows/checks/workflow.yml",
                r#"
inputs:
  os:
    default: ubuntu-latest
jobs:
  -lint:
    runs-on: ${{ inputs.os }}
    steps:
      - run: make lint
  -test:
    needs: -lint
    if: success()
    runs-on: ${{ inputs.os }}
    steps:
      - includes: /x
"#,
            )
            .with_file(".github/includes/actions/x/action.yml", TWO_STEPS);

        let doc = expand(
            &fs,
            r#"
jobs:
  build:
    runs-on: ubuntu-latest
    steps:
      - run: make
  checks:
    includes: /checks
    needs: build
    if: github.event_name == 'push'
    with:
      os: macos-latest
"#,
        )
        .unwrap();

        let names: Vec<_> = doc.jobs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["build", "checks-lint", "checks-test"]);

        let Some(JobEntry::Job(lint)) = doc.get_job("checks-lint") else {
            panic!("missing checks-lint");
        };
        assert_eq!(lint.fields.get("runs-on"), Some(&Value::from("macos-latest")));
        assert_eq!(lint.needs(), vec!["build"]);
        assert_eq!(lint.condition().as_deref(), Some("github.event_name == 'push'"));

        let Some(JobEntry::Job(test)) = doc.get_job("checks-test") else {
            panic!("missing checks-test");
        };
        assert_eq!(test.needs(), vec!["build", "checks-lint"]);
        assert_eq!(
            test.condition().as_deref(),
            Some("(github.event_name == 'push') && (success())")
        );
        assert_eq!(runs(&doc, "checks-test"), vec!["X1", "X2"]);
    }

    #[test]
    fn test_job_include_fields_apply_to_every_job() {
        let fs = MemoryFileSystem::new().with_file(
            ".github/includes/workflows/c/workflow.yml",
            "jobs:\n  -a:\n    runs-on: x\n    steps:\n      - run: a\n  -b:\n    runs-on: x\n    env:\n      MODE: fast\n    steps:\n      - run: b\n",
        );
        let doc = expand(
            &fs,
            "jobs:\n  j:\n    includes: /c\n    permissions:\n      contents: write\n    env:\n      TOKEN: abc\n",
        )
        .unwrap();

        let write: Value = serde_yaml::from_str("contents: write").unwrap();
        let env: Value = serde_yaml::from_str("TOKEN: abc").unwrap();
        for name in ["j-a", "j-b"] {
            let Some(JobEntry::Job(job)) = doc.get_job(name) else {
                panic!("missing {}", name);
            };
            assert_eq!(job.fields.get("permissions"), Some(&write));
            assert_eq!(job.fields.get("env"), Some(&env));
            assert_eq!(job.fields.get("runs-on"), Some(&Value::from("x")));
        }
    }

    #[test]
    fn test_job_include_cannot_set_steps() {
        let fs = MemoryFileSystem::new().with_file(
            ".github/includes/workflows/c/workflow.yml",
            "jobs:\n  -a:\n    steps:\n      - run: a\n",
        );
        let err = expand(
            &fs,
            "jobs:\n  j:\n    includes: /c\n    steps:\n      - run: extra\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IncludeError::InvalidOverride { ref field, .. } if field == "steps"
        ));
    }

    #[test]
    fn test_duplicate_jobs_after_expansion() {
        let fs = MemoryFileSystem::new().with_file(
            ".github/includes/workflows/dup/workflow.yml",
            "jobs:\n  -a:\n    steps:\n      - run: x\n",
        );
        let err = expand(
            &fs,
            "jobs:\n  j-a:\n    steps:\n      - run: y\n  j:\n    includes: /dup\n",
        )
        .unwrap_err();
        assert!(matches!(err, IncludeError::DuplicateJob { ref job, .. } if job == "j-a"));
    }

    #[test]
    fn test_job_include_cycle() {
        let fs = MemoryFileSystem::new().with_file(
            ".github/includes/workflows/loop/workflow.yml",
            "jobs:\n  again:\n    includes: /loop\n",
        );
        let err = expand(&fs, "jobs:\n  j:\n    includes: /loop\n").unwrap_err();
        assert!(matches!(err.root_cause(), IncludeError::CircularInclude { .. }));
    }

    #[test]
    fn test_reusable_workflow_job_passes_through() {
        let fs = MemoryFileSystem::new();
        let doc = expand(
            &fs,
            "jobs:\n  call:\n    uses: octo/ci/.github/workflows/reuse.yml@main\n    with:\n      x: 1\n",
        )
        .unwrap();
        assert!(matches!(doc.get_job("call"), Some(JobEntry::Job(Job { steps: None, .. }))));
    }
}
