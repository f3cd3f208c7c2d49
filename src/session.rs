//! Edit session: the column and join currently open in the editor, with their staged drafts.

use crate::error::{SchemaError, SchemaResult};
use crate::id::{ColumnId, JoinId, TableId};
use crate::model::{Column, Snapshot};
use crate::mutation::{self, Configured, JoinConfig};
use crate::projection::resolve_edge;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEdit {
    pub table: TableId,
    pub draft: Column,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinEdit {
    pub join: JoinId,
    pub draft: JoinConfig,
}

/// Both slots may be open at once: configuring a join opens the column it creates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditSession {
    column: Option<ColumnEdit>,
    join: Option<JoinEdit>,
    failure: Option<SchemaError>,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(&self) -> Option<&ColumnEdit> {
        self.column.as_ref()
    }

    pub fn column_mut(&mut self) -> Option<&mut ColumnEdit> {
        self.column.as_mut()
    }

    pub fn join(&self) -> Option<&JoinEdit> {
        self.join.as_ref()
    }

    pub fn join_mut(&mut self) -> Option<&mut JoinEdit> {
        self.join.as_mut()
    }

    /// Last failed commit, if the editor should still show it.
    pub fn failure(&self) -> Option<&SchemaError> {
        self.failure.as_ref()
    }

    pub fn open_column(
        &mut self,
        snapshot: &Snapshot,
        table: &TableId,
        column: &ColumnId,
    ) -> SchemaResult<()> {
        let draft = snapshot
            .require_table(table)?
            .column(column)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: table.clone(),
                column: column.clone(),
            })?;
        debug!(table = %table, column = %column, "editing column");
        self.column = Some(ColumnEdit {
            table: table.clone(),
            draft,
        });
        Ok(())
    }

    /// Open the join behind a selected edge.
    pub fn open_join(&mut self, snapshot: &Snapshot, join: &JoinId) -> SchemaResult<()> {
        let draft = resolve_edge(snapshot, join)
            .and_then(|owned| JoinConfig::from_join(owned.join))
            .ok_or_else(|| SchemaError::UnknownJoin(join.clone()))?;
        debug!(join = %join, "editing join");
        self.join = Some(JoinEdit {
            join: join.clone(),
            draft,
        });
        self.failure = None;
        Ok(())
    }

    pub fn close_column(&mut self) {
        self.column = None;
    }

    pub fn close_join(&mut self) {
        self.join = None;
        self.failure = None;
    }

    /// Drop drafts whose subject no longer exists.
    pub fn forget_missing(&mut self, snapshot: &Snapshot) {
        let column_gone = self.column.as_ref().is_some_and(|edit| {
            snapshot
                .table(&edit.table)
                .and_then(|t| t.column(&edit.draft.id))
                .is_none()
        });
        if column_gone {
            self.column = None;
        }
        if self
            .join
            .as_ref()
            .is_some_and(|edit| resolve_edge(snapshot, &edit.join).is_none())
        {
            self.join = None;
        }
    }

    /// Write the staged column back into its table.
    ///
    /// Turning the draft into the primary key clears the flag on every other column.
    pub fn commit_column(&mut self, snapshot: &Snapshot) -> SchemaResult<Snapshot> {
        let edit = self
            .column
            .as_ref()
            .ok_or_else(|| SchemaError::InvalidIntent("no column is being edited".to_string()))?;
        let table = snapshot.require_table(&edit.table)?;
        let current = table
            .column(&edit.draft.id)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: edit.table.clone(),
                column: edit.draft.id.clone(),
            })?;

        let mut draft = edit.draft.clone();
        // Relationships change through join edits only.
        draft.foreign_key = current.foreign_key.clone();
        let columns = table
            .columns
            .iter()
            .map(|c| {
                if c.id == draft.id {
                    draft.clone()
                } else {
                    let mut other = c.clone();
                    if draft.primary_key {
                        other.primary_key = false;
                    }
                    other
                }
            })
            .collect();

        let table_id = edit.table.clone();
        let next = mutation::replace_columns(snapshot, &table_id, columns)?;
        if let Some(saved) = next.table(&table_id).and_then(|t| t.column(&draft.id)) {
            self.column = Some(ColumnEdit {
                table: table_id,
                draft: saved.clone(),
            });
        }
        Ok(next)
    }

    /// Configure the staged join. A new foreign-key column is opened for editing; a failed
    /// commit keeps the draft open and records the failure.
    pub fn commit_join(&mut self, snapshot: &Snapshot) -> SchemaResult<(Snapshot, Configured)> {
        let edit = self
            .join
            .as_ref()
            .ok_or_else(|| SchemaError::InvalidIntent("no join is being edited".to_string()))?;

        let (next, configured) = match mutation::configure_join(snapshot, &edit.join, &edit.draft)
        {
            Ok(done) => done,
            Err(e) => {
                self.failure = Some(e.clone());
                return Err(e);
            }
        };
        self.failure = None;

        match &configured {
            Configured::ForeignKey { table, column } => {
                let join = edit.join.clone();
                self.open_join(&next, &join)?;
                self.open_column(&next, table, column)?;
            }
            Configured::Junction { .. } => self.join = None,
        }
        Ok((next, configured))
    }
}
