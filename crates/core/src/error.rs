use mfio_spec::SpecError;

/// All errors produced while loading, mutating, or writing package data.
///
/// Every variant carries enough context to locate and fix the offending
/// input without re-running the solver: file path, line, the token found,
/// the shape expected.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Malformed on-disk file content. Fatal to the current load.
    #[error("{file}:{line}:{column}: {message}")]
    Parse {
        file: String,
        line: u32,
        column: u32,
        message: String,
    },

    /// A value could not be coerced to the declared item kind.
    #[error("cannot coerce '{found}' to {wanted} for '{context}'")]
    TypeCoercion {
        wanted: &'static str,
        found: String,
        context: String,
    },

    /// A value was set with the wrong arity. The container keeps its
    /// prior value.
    #[error("shape mismatch for '{name}': expected {expected} values, found {found}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// `get` on a container that has never been set.
    #[error("no data has been set for '{name}'")]
    NoData { name: String },

    /// Transient operations require a positive stress period index.
    #[error("invalid stress period {period}: period must be a positive integer")]
    InvalidPeriod { period: i64 },

    /// A package name or singleton package type used twice in one model.
    #[error("package '{name}' conflicts with an existing '{package_type}' package")]
    DuplicatePackage { name: String, package_type: String },

    /// Raised at write time when a mandatory block was never populated.
    #[error("package '{package}': required block '{block}' was never populated")]
    MissingRequiredBlock { package: String, block: String },

    /// A populated block is missing one of its required data structures.
    #[error("block '{block}': required data '{name}' was never populated")]
    MissingRequiredData { block: String, name: String },

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DataError {
    pub fn parse(file: &str, line: u32, column: u32, message: impl Into<String>) -> Self {
        DataError::Parse {
            file: file.to_owned(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn coercion(wanted: &'static str, found: impl Into<String>, context: &str) -> Self {
        DataError::TypeCoercion {
            wanted,
            found: found.into(),
            context: context.to_owned(),
        }
    }
}
