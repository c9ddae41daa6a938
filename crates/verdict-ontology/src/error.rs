//! Loader and registry error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the ontology loader and registry.
///
/// `UnknownOntology` is a lookup miss; everything else is a load error that
/// makes the specific document unusable until it is fixed. Sibling documents
/// are unaffected either way.
#[derive(Debug, Error)]
pub enum OntologyError {
    #[error("ontology `{0}` not found")]
    UnknownOntology(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid ontology `{name}`: {}", .issues.join("; "))]
    Invalid { name: String, issues: Vec<String> },
}

impl OntologyError {
    /// True for document problems (as opposed to a lookup miss).
    pub fn is_load_error(&self) -> bool {
        !matches!(self, OntologyError::UnknownOntology(_))
    }
}
