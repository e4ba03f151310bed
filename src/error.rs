use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while defining or evaluating a model.
///
/// Errors raised by formula bodies themselves are carried by [`Error::Formula`]
/// and travel through every enclosing evaluation unchanged. None of these are
/// ever memoized.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("name '{name}' is not defined in {scope}")]
    NameResolution { name: String, scope: String },

    #[error("circular reference: {}", .cycle.join(" -> "))]
    CircularReference { cycle: Vec<String> },

    #[error("maximum call depth of {max_depth} exceeded when calling {node}")]
    DeepReference { max_depth: usize, node: String },

    #[error("invalid name '{0}'")]
    InvalidName(String),

    #[error("name '{name}' is already used in {scope}")]
    DuplicateName { name: String, scope: String },

    #[error("{space} cannot inherit from {base}: inheritance would be circular")]
    InheritanceCycle { space: String, base: String },

    #[error("{space} cannot be deleted while {user} inherits from it")]
    SpaceInUse { space: String, user: String },

    #[error("{space} has no deriving rule")]
    NoDerivingRule { space: String },

    #[error("{callee} takes {expected} argument(s) but {found} were given")]
    ArgumentCount {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0} no longer exists")]
    Deleted(String),

    #[error("invalid graph snapshot: {0}")]
    Snapshot(String),

    #[error("{0}")]
    Formula(String),
}

impl Error {
    /// Convenience constructor for errors raised by formula bodies.
    pub fn formula(message: impl Into<String>) -> Self {
        Error::Formula(message.into())
    }
}
