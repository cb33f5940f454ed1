/// All errors produced while building or querying the specification registry.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SpecError {
    /// Malformed definition source. Fatal to registry construction; a bad
    /// declaration is never dropped silently.
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: u32,
        message: String,
    },

    /// A package type, block, or data structure that was never registered.
    #[error("unknown {kind} '{name}'")]
    Unknown { kind: &'static str, name: String },

    /// A shape expression referenced a dimension the resolver cannot supply.
    #[error("undefined dimension '{name}' in shape of '{item}'")]
    UndefinedDimension { name: String, item: String },
}

impl SpecError {
    pub fn parse(file: &str, line: u32, message: impl Into<String>) -> Self {
        SpecError::Parse {
            file: file.to_owned(),
            line,
            message: message.into(),
        }
    }

    pub fn unknown(kind: &'static str, name: impl Into<String>) -> Self {
        SpecError::Unknown {
            kind,
            name: name.into(),
        }
    }
}
