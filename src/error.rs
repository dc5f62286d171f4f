//! Error types for call graph construction

use thiserror::Error;

use crate::ir::MethodId;

/// Structural failures that abort call graph construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallGraphError {
    #[error("failed to resolve call site {site}: unrecognised call kind")]
    MalformedCallKind { site: String },

    #[error("entry method {0:?} is not part of the program")]
    UnknownEntry(MethodId),
}
