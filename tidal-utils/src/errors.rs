//! Error type shared by every crate in the workspace.
use thiserror::Error;

/// Convenience alias for results produced by the compiler.
pub type TidalResult<T> = Result<T, Error>;

/// Errors reported while lowering a dataflow program.
///
/// Each variant corresponds to a diagnostic the lowering attaches to the
/// offending operation; constructor helpers keep call sites short.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An edge type outside the accepted set reached the type bundler.
    #[error(
        "{0}: Unsupported data type. Supported data types: integer (signed, \
         unsigned, signless), index, none."
    )]
    UnsupportedType(String),

    /// Dispatch found no logic builder for the operation.
    #[error("{0}: Unsupported operation type.")]
    UnsupportedOperation(String),

    /// The operation's shape (arity, attributes, region structure) does not
    /// match what its builder requires.
    #[error("Malformed structure: {0}")]
    MalformedStructure(String),
}

impl Error {
    pub fn unsupported_type<S: ToString>(op: S) -> Self {
        Error::UnsupportedType(op.to_string())
    }

    pub fn unsupported_operation<S: ToString>(op: S) -> Self {
        Error::UnsupportedOperation(op.to_string())
    }

    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Error::MalformedStructure(msg.to_string())
    }
}
