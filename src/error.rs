//! Crate-wide error taxonomy.
//!
//! Every failure in the core is raised synchronously to the immediate
//! caller; nothing is retried, logged, or swallowed. The few deliberate
//! tolerances (clipping events that overrun a run boundary, the same-rate
//! resample short-circuit) are documented at their call sites.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Replacement or companion data whose row count does not match the
    /// existing data (e.g. `clone_with` data, filter masks, split labels).
    #[error("data has {actual} rows; must match existing {expected} rows")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Merging variables with differing names and no explicit override.
    #[error("variables with different names cannot be merged without an explicit name: {0:?}")]
    NameConflict(Vec<String>),

    /// An invalid option or argument to a variable/collection operation or
    /// transformation (weight arity, categorical data where numeric is
    /// required, mixed-class merges, ...).
    #[error("invalid parameter: {0}")]
    ParameterValidation(String),

    /// A referenced variable name is absent from the collection.
    #[error("no variable named '{0}' in the collection")]
    MissingVariable(String),

    /// Pattern expansion produced a name count incompatible with the
    /// declared output names.
    #[error("expansion produced {inputs} input(s) but {outputs} output name(s) were declared")]
    ExpansionArity { inputs: usize, outputs: usize },

    /// A variable cannot be converted to a dense representation.
    #[error("variable '{name}' cannot be densified: {reason}")]
    CannotDensify { name: String, reason: String },

    /// A malformed variable-name pattern.
    #[error("invalid variable-name pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A malformed input table (missing reserved columns, ragged rows).
    #[error("malformed table: {0}")]
    Table(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
