//! Include Expansion
//!
//! # Structure
//!
//! - [`engine`]: Recursive expansion and cycle detection
//! - [`inputs`]: Input binding and `inputs.<name>` substitution
//! - [`conditions`]: `if` composition
//! - [`script`]: Script inlining

pub mod conditions;
pub mod engine;
pub mod inputs;
pub mod script;

use std::fs;

use log::info;

use crate::config::ExpandConfig;
use crate::error::{IncludeError, Result};
use crate::resolve::{
    ActionReference, CachingFetcher, FileSystem, LocalFileSystem, MirrorFetcher, OfflineFetcher,
    Resolver, SourceFetcher,
};
use crate::workflow::model::WorkflowDocument;
use crate::workflow::parser::{parse_workflow, render_output};
use crate::workflow::validator::log_job_graph_warnings;

pub use engine::{Engine, ExpansionContext};
pub use inputs::InputBindings;

/// Expands a workflow written at `origin` (a repository-relative path).
pub fn expand_workflow(
    text: &str,
    origin: &str,
    files: &dyn FileSystem,
    fetcher: &dyn SourceFetcher,
) -> Result<WorkflowDocument> {
    let origin_ref = ActionReference::local(origin)?;
    let document = parse_workflow(text, origin)?;
    let engine = Engine::new(Resolver::new(files, fetcher));
    let expanded = engine.expand_document(&document, &origin_ref)?;
    log_job_graph_warnings(&expanded);
    Ok(expanded)
}

/// Expands the file a configuration names and renders the output text.
pub fn expand_workflow_file(config: &ExpandConfig) -> Result<String> {
    let label = config.relative_input()?;
    info!("Expanding workflow file from: {}", config.input.display());

    let text = fs::read_to_string(&config.input).map_err(|source| IncludeError::Io {
        path: config.input.display().to_string(),
        source,
    })?;

    let files = LocalFileSystem::new(&config.repo_root);
    let fetcher: Box<dyn SourceFetcher> = match &config.mirror {
        Some(dir) => {
            info!("Remote packages from mirror: {}", dir.display());
            Box::new(CachingFetcher::new(MirrorFetcher::new(dir)))
        }
        None => Box::new(OfflineFetcher),
    };

    let expanded = expand_workflow(&text, &label, &files, fetcher.as_ref())?;
    render_output(&expanded, &text, &label, config.header)
}
