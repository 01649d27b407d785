//! Error Types
//!
//! Every failure raised while loading, resolving, or expanding a workflow.
//! None of them are recoverable where they are raised: they propagate to the
//! invocation boundary and abort the whole expansion.

use thiserror::Error;

/// Errors produced by the include expander.
#[derive(Error, Debug)]
pub enum IncludeError {
    /// A document did not have the expected structure.
    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },

    /// A document was not valid YAML.
    #[error("failed to parse {origin} as YAML")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The include target is not an `includes` definition.
    #[error("{reference} uses '{kind}'; only definitions with `runs.using: includes` can be included")]
    InvalidDefinitionKind { reference: String, kind: String },

    /// The include string does not match the supported grammar.
    #[error("invalid include reference '{reference}': {reason}")]
    ReferenceSyntax { reference: String, reason: String },

    /// A local file is missing.
    #[error("{path} does not exist")]
    NotFound { path: String },

    /// A remote package could not be retrieved.
    #[error("failed to fetch {target}: {reason}")]
    Fetch { target: String, reason: String },

    /// A reference recurred on the active expansion stack.
    #[error("circular include: {}", chain.join(" -> "))]
    CircularInclude { chain: Vec<String> },

    /// A required input was neither supplied nor defaulted.
    #[error("{reference} requires input '{input}' but the include does not provide it")]
    MissingInput { reference: String, input: String },

    /// The caller supplied inputs the definition does not declare.
    #[error("{reference} does not declare input(s): {}", inputs.join(", "))]
    UnknownInput {
        reference: String,
        inputs: Vec<String>,
    },

    /// Expansion produced two jobs with the same name.
    #[error("{origin}: job '{job}' is defined more than once after expansion")]
    DuplicateJob { origin: String, job: String },

    /// A field on an include directive cannot be applied to what it produced.
    #[error("cannot apply '{field}' from the include of {reference}: {reason}")]
    InvalidOverride {
        reference: String,
        field: String,
        reason: String,
    },

    /// A script has no explicit shell and an unmapped extension.
    #[error("cannot infer a shell for script '{script}'; set `shell` explicitly")]
    UnknownShell { script: String },

    #[error("I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Frame added for every include an error passed through.
    #[error("while expanding {reference}")]
    Included {
        reference: String,
        #[source]
        source: Box<IncludeError>,
    },
}

impl IncludeError {
    /// Wraps `self` in an include frame naming `reference`.
    pub fn within(self, reference: impl Into<String>) -> Self {
        Self::Included {
            reference: reference.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping include frames.
    pub fn root_cause(&self) -> &IncludeError {
        let mut current = self;
        while let Self::Included { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns true for errors meaning "nothing at that location".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IncludeError>;
