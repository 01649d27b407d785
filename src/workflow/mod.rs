//! Workflow Documents
//!
//! Data structures for workflow files and includable definitions, plus
//! loading, writing, and job-graph checks.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (WorkflowDocument, Job, Step)
//! - [`parser`]: YAML parsing, output rendering
//! - [`validator`]: `needs` graph diagnostics

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{Job, JobEntry, Step, WorkflowDocument};
pub use parser::{parse_workflow, render_output};
pub use validator::{check_job_graph, GraphWarning};
