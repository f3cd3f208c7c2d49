//! Declarative source language for schemas.
//!
//! ```text
//! entity Post {
//!     id     uuid pk
//!     title  string(120) not null
//!     userId uuid fk -> User.id [many_to_one, on_delete = cascade]
//! }
//! ```

pub mod ast;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod serializer;

use crate::model::Snapshot;
use parser::{ParseError, Parser};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Entity {entity}: {message}")]
    Lower { entity: String, message: String },
    #[error("Compiled schema is invalid: {0}")]
    Invalid(String),
    #[error("Compiler unavailable: {0}")]
    Unavailable(String),
}

pub fn parse_document(source: &str) -> Result<ast::Document, CompileError> {
    let mut parser = Parser::new(source)?;
    Ok(parser.parse()?)
}

/// Source text for a snapshot.
pub fn to_source(snapshot: &Snapshot) -> String {
    serializer::serialize(&lower::lift(snapshot))
}

/// Snapshot for source text, with fresh ids.
pub fn from_source(source: &str) -> Result<Snapshot, CompileError> {
    lower::lower(&parse_document(source)?)
}
