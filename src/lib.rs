//! actions-includes - Workflow Include Preprocessor
//!
//! Expands `includes` directives in CI workflow files into plain,
//! schema-legal workflows. Included definitions may live in the same
//! repository or in a pinned remote package, may take inputs, and may
//! include further definitions.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`workflow`]: Document model, YAML loading and writing
//! - [`resolve`]: Include references and where their content comes from
//! - [`expand`]: Recursive expansion, input substitution, script inlining
//! - [`config`]: Settings for one run
//!
//! # Example
//!
//! ```rust,no_run
//! use actions_includes::config::ExpandConfig;
//! use actions_includes::expand::expand_workflow_file;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExpandConfig::new(".github/workflows_src/ci.yml")?;
//!     let output = expand_workflow_file(&config)?;
//!     std::fs::write(".github/workflows/ci.yml", output)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod expand;
pub mod resolve;
pub mod workflow;

// Re-export commonly used types
pub use config::ExpandConfig;
pub use error::{IncludeError, Result};
pub use expand::{expand_workflow, expand_workflow_file, Engine};
pub use resolve::{ActionReference, Resolver};
pub use workflow::model::{Step, WorkflowDocument};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "actions-includes";
