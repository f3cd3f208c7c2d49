use crate::dsl::CompileError;
use crate::id::{ColumnId, JoinId, TableId};

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown table: {0}")]
    UnknownTable(TableId),
    #[error("Unknown column {column} on table {table}")]
    UnknownColumn { table: TableId, column: ColumnId },
    #[error("Unknown join: {0}")]
    UnknownJoin(JoinId),
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Cannot synthesize junction table: {0}")]
    SynthesisFailure(String),
    #[error("Compiler error: {0}")]
    Compiler(#[from] CompileError),
    #[error("Invalid document: {0}")]
    ImportFormat(String),
}

/// Coarse classification used to decide how an error reaches the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stale or meaningless intent; ignored without notice.
    InvalidIntent,
    InvariantViolation,
    SynthesisFailure,
    Compiler,
    ImportFormat,
}

impl SchemaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTable(_)
            | Self::UnknownColumn { .. }
            | Self::UnknownJoin(_)
            | Self::InvalidIntent(_) => ErrorKind::InvalidIntent,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::SynthesisFailure(_) => ErrorKind::SynthesisFailure,
            Self::Compiler(_) => ErrorKind::Compiler,
            Self::ImportFormat(_) => ErrorKind::ImportFormat,
        }
    }

    /// Whether the error should be shown to the user as a notice.
    pub fn is_user_visible(&self) -> bool {
        self.kind() != ErrorKind::InvalidIntent
    }
}
