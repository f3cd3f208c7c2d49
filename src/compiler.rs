//! The compiler service: snapshot to source text and back.

use crate::dsl::{self, CompileError};
use crate::model::Snapshot;
use async_trait::async_trait;

/// Serializes snapshots to source text and parses edited text back.
///
/// Implementations must be callable from spawned tasks, hence `Send + Sync`.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn serialize(&self, snapshot: Snapshot) -> Result<String, CompileError>;

    /// Parse source text into a snapshot with fresh ids. Identity is re-attached by
    /// [`crate::reconcile`].
    async fn parse(&self, source: String) -> Result<Snapshot, CompileError>;
}

/// Compiler backed by the crate's own source language.
#[derive(Debug, Clone, Copy, Default)]
pub struct DslCompiler;

#[async_trait]
impl Compiler for DslCompiler {
    async fn serialize(&self, snapshot: Snapshot) -> Result<String, CompileError> {
        snapshot
            .validate()
            .map_err(|e| CompileError::Invalid(e.to_string()))?;
        Ok(dsl::to_source(&snapshot))
    }

    async fn parse(&self, source: String) -> Result<Snapshot, CompileError> {
        dsl::from_source(&source)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::model::{DataType, Table};

    #[tokio::test]
    async fn test_dsl_compiler_round_trip() {
        let compiler = DslCompiler;
        let snapshot = Snapshot::new(vec![Table::new("User", DataType::Uuid)]);
        let source = compiler.serialize(snapshot).await.unwrap();
        assert_eq!(source, "entity User {\n    id uuid pk\n}\n");

        let parsed = compiler.parse(source).await.unwrap();
        assert_eq!(parsed.tables[0].name, "User");
    }

    #[tokio::test]
    async fn test_invalid_snapshot_is_not_serialized() {
        let mut table = Table::new("User", DataType::Uuid);
        table.primary_key = None;
        let err = DslCompiler
            .serialize(Snapshot::new(vec![table]))
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::Invalid(_)));
    }
}
