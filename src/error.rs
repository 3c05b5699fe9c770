//! Error types (v0.1)
//!
//! One enum for every failure the crate can settle into a deferred value.
//! Causes are captured as strings so errors stay `Clone`: a settlement is
//! broadcast to every awaiter of a shared future, and each awaiter observes
//! the same error.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiggingError {
    /// A resolver was used after its eventual value had already settled.
    #[error("eventual value was already settled")]
    AlreadySettled,

    /// The write half of a pending pair was dropped without settling.
    #[error("resolver dropped before settling its eventual value")]
    ResolverDropped,

    #[error("no field '{field}' on {value_type} value")]
    FieldNotFound {
        field: String,
        value_type: &'static str,
    },

    #[error("no element {index} in {value_type} value")]
    IndexNotFound {
        index: usize,
        value_type: &'static str,
    },

    #[error("projection failed: {0}")]
    Projection(String),

    /// A component's setup routine failed. Forwarded to every pending
    /// output of that component.
    #[error("setup for '{urn}' failed: {cause}")]
    SetupFailed { urn: String, cause: String },

    /// A background unit of work was lost (worker panic, runtime teardown).
    #[error("background task failed: {0}")]
    Background(String),

    #[error("'{urn}' is already registered")]
    DuplicateEntity { urn: String },

    #[error("invalid {expected} token: '{token}'")]
    InvalidToken {
        token: String,
        expected: &'static str,
    },

    /// Region detection exhausted every source.
    #[error("unable to determine a region")]
    NoRegion,

    #[error("graph registration failed: {0}")]
    Graph(String),
}
