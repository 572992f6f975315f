//! Error types for the reactive runtime.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by cells, derivations, the scheduler and the async helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A reaction body panicked. The reaction stays alive and runs again on
    /// the next change.
    #[error("[cascade] Encountered an uncaught exception that was thrown by a reaction '{name}': {message}")]
    Reaction {
        name: String,
        message: String,
        /// Set when the failure happened while an action that started the
        /// same transaction had already failed.
        suppressed: bool,
    },

    /// The pending queue did not settle within the iteration cap.
    #[error("[cascade] Reaction doesn't converge to a stable state after {iterations} iterations. Probably there is a cycle in the reactive function: {name}")]
    CircularReaction { name: String, iterations: usize },

    /// A computed read itself while computing.
    #[error("[cascade] Cycle detected in computation {name}")]
    ComputedCycle { name: String },

    /// A computed setter assigned to the same computed.
    #[error("[cascade] Cycle detected while running the setter of computed value '{name}'")]
    ComputedSetterCycle { name: String },

    /// An in-place mutating collection method was called from a derivation.
    #[error("[cascade] `{collection}.{method}()` mutates the collection in place, which is not allowed inside a derivation. Use `{alternative}()` instead")]
    MutationInDerivation {
        collection: &'static str,
        method: &'static str,
        alternative: &'static str,
    },

    #[error("WHEN_TIMEOUT")]
    WhenTimeout,

    #[error("WHEN_CANCELLED")]
    WhenCancelled,

    #[error("WHEN_ABORTED")]
    WhenAborted,

    #[error("FLOW_CANCELLED")]
    FlowCancelled,

    #[error("[cascade] invalid configuration: {0}")]
    InvalidConfig(String),

    /// `make_observable` was given an annotation it cannot apply.
    #[error("[cascade] Cannot apply annotation to '{key}': {message}")]
    Annotation { key: String, message: String },
}

impl Error {
    /// Whether this error was reported while an action failure was already
    /// propagating through the same transaction.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Error::Reaction { suppressed: true, .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidConfig(err.to_string())
    }
}
