//! Mutation engine.
//!
//! Every operation takes the current snapshot by reference and returns a new one; the input
//! is never touched. Results are re-validated before they are handed back, so a caller either
//! gets a consistent snapshot or an error and keeps the one it had.

use crate::error::{SchemaError, SchemaResult};
use crate::id::{ColumnId, JoinId, TableId};
use crate::junction;
use crate::model::{
    Column, DataType, Join, JoinKind, JoinTarget, JunctionColumn, ReferentialAction, Snapshot,
    Table,
};
use std::collections::BTreeSet;
use tracing::{debug, error};

/// Fields of a table that can be replaced without touching its columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TablePatch {
    pub name: Option<String>,
    pub storage_name: Option<String>,
    pub description: Option<String>,
}

/// Everything the join editor lets the user choose.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinConfig {
    pub target: JoinTarget,
    pub kind: JoinKind,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    pub through: Option<String>,
    pub join_column: Option<JunctionColumn>,
    pub inverse_column: Option<JunctionColumn>,
}

impl JoinConfig {
    /// Current configuration of a join record. Mirrors have no target and yield `None`.
    pub fn from_join(join: &Join) -> Option<Self> {
        Some(Self {
            target: join.target.clone()?,
            kind: join.kind,
            on_delete: join.on_delete,
            on_update: join.on_update,
            through: join.through.clone(),
            join_column: join.join_column.clone(),
            inverse_column: join.inverse_column.clone(),
        })
    }
}

/// What a successful `configure_join` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Configured {
    /// The foreign-key column now carrying the join.
    ForeignKey { table: TableId, column: ColumnId },
    /// The junction table that replaced a many-to-many join.
    Junction { table: TableId },
}

/// One edit, as delivered by the graph or the editing session.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    CreateTable { name: String, key_type: DataType },
    DeleteTable { table: TableId },
    DuplicateTable { table: TableId },
    ReplaceColumns { table: TableId, columns: Vec<Column> },
    ReplaceTableFields { table: TableId, patch: TablePatch },
    AddColumn { table: TableId, name: String },
    DeleteColumn { table: TableId, column: ColumnId },
    Connect {
        source: TableId,
        target: TableId,
        target_column: Option<ColumnId>,
        on_delete: ReferentialAction,
        on_update: ReferentialAction,
    },
    ConfigureJoin { join: JoinId, config: JoinConfig },
    DeleteJoin { join: JoinId },
}

/// Side information about what an applied intent created.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    None,
    TableCreated(TableId),
    ColumnCreated { table: TableId, column: ColumnId },
    JoinCreated(JoinId),
    JoinConfigured(Configured),
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub snapshot: Snapshot,
    pub effect: Effect,
}

/// Apply one intent.
pub fn apply(snapshot: &Snapshot, intent: Intent) -> SchemaResult<Outcome> {
    let (snapshot, effect) = match intent {
        Intent::CreateTable { name, key_type } => {
            let (s, id) = create_table(snapshot, &name, key_type)?;
            (s, Effect::TableCreated(id))
        }
        Intent::DeleteTable { table } => (delete_table(snapshot, &table)?, Effect::None),
        Intent::DuplicateTable { table } => {
            let (s, id) = duplicate_table(snapshot, &table)?;
            (s, Effect::TableCreated(id))
        }
        Intent::ReplaceColumns { table, columns } => {
            (replace_columns(snapshot, &table, columns)?, Effect::None)
        }
        Intent::ReplaceTableFields { table, patch } => {
            (replace_table_fields(snapshot, &table, patch)?, Effect::None)
        }
        Intent::AddColumn { table, name } => {
            let (s, column) = add_column(snapshot, &table, &name)?;
            (s, Effect::ColumnCreated { table, column })
        }
        Intent::DeleteColumn { table, column } => {
            (delete_column(snapshot, &table, &column)?, Effect::None)
        }
        Intent::Connect {
            source,
            target,
            target_column,
            on_delete,
            on_update,
        } => {
            let (s, id) = connect(
                snapshot,
                &source,
                &target,
                target_column.as_ref(),
                on_delete,
                on_update,
            )?;
            (s, Effect::JoinCreated(id))
        }
        Intent::ConfigureJoin { join, config } => {
            let (s, configured) = configure_join(snapshot, &join, &config)?;
            (s, Effect::JoinConfigured(configured))
        }
        Intent::DeleteJoin { join } => (delete_join(snapshot, &join)?, Effect::None),
    };
    Ok(Outcome { snapshot, effect })
}

/// Validate a freshly built snapshot before it is handed out.
pub(crate) fn finish(next: Snapshot) -> SchemaResult<Snapshot> {
    if let Err(e) = next.validate() {
        error!(error = %e, "mutation produced an inconsistent snapshot");
        return Err(e);
    }
    Ok(next)
}

/// Add a table seeded with an `id` key. A taken name gets a numeric suffix.
pub fn create_table(
    snapshot: &Snapshot,
    name: &str,
    key_type: DataType,
) -> SchemaResult<(Snapshot, TableId)> {
    let table = Table::new(&snapshot.free_table_name(name), key_type);
    let id = table.id.clone();
    let mut next = snapshot.clone();
    next.tables.push(table);
    debug!(table = %id, name, "created table");
    Ok((finish(next)?, id))
}

/// Remove a table and every join it takes part in.
pub fn delete_table(snapshot: &Snapshot, table: &TableId) -> SchemaResult<Snapshot> {
    snapshot.require_table(table)?;
    let joins = snapshot.joins_touching(table);
    let mut next = snapshot.clone();
    for join in &joins {
        strip_join(&mut next, join);
    }
    next.tables.retain(|t| &t.id != table);
    debug!(table = %table, joins = joins.len(), "deleted table");
    finish(next)
}

/// Copy a table's plain columns into a new table. Relationships are not copied.
pub fn duplicate_table(snapshot: &Snapshot, table: &TableId) -> SchemaResult<(Snapshot, TableId)> {
    let original = snapshot.require_table(table)?;
    let id = TableId::generate();
    let mut primary_key = None;
    let columns = original
        .columns
        .iter()
        .map(|c| {
            let copy = Column {
                id: ColumnId::generate(),
                table_id: id.clone(),
                foreign_key: None,
                ..c.clone()
            };
            if copy.primary_key {
                primary_key = Some(copy.id.clone());
            }
            copy
        })
        .collect();
    let copy = Table {
        id: id.clone(),
        name: snapshot.free_table_name(&format!("{}_copy", original.name)),
        storage_name: String::new(),
        primary_key,
        description: original.description.clone(),
        columns,
        joins: Vec::new(),
    };
    let mut next = snapshot.clone();
    next.tables.push(copy);
    debug!(table = %table, copy = %id, "duplicated table");
    Ok((finish(next)?, id))
}

/// Replace a table's columns by value, re-establishing the column invariants.
pub fn replace_columns(
    snapshot: &Snapshot,
    table: &TableId,
    columns: Vec<Column>,
) -> SchemaResult<Snapshot> {
    let current = snapshot.require_table(table)?;
    let previous_key = current.primary_key.clone();
    let before = foreign_keys_of(current);

    let mut columns = columns;
    for column in &mut columns {
        column.table_id = table.clone();
    }
    let key = settle_primary_key(&mut columns, previous_key.as_ref())?;
    for column in &mut columns {
        column.normalize();
    }

    let mut next = snapshot.clone();
    let target = next
        .table_mut(table)
        .ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
    target.columns = columns;
    target.primary_key = key;
    let after = foreign_keys_of(target);

    for dropped in before.difference(&after) {
        strip_join(&mut next, dropped);
    }
    finish(next)
}

/// Keep exactly one primary key: the current one if still flagged, else the first flagged.
fn settle_primary_key(
    columns: &mut [Column],
    previous: Option<&ColumnId>,
) -> SchemaResult<Option<ColumnId>> {
    if columns.is_empty() {
        return Ok(None);
    }
    let flagged: Vec<ColumnId> = columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.id.clone())
        .collect();
    let key = match previous {
        Some(prev) if flagged.contains(prev) => prev.clone(),
        _ => match flagged.first() {
            Some(first) => first.clone(),
            None => match previous.filter(|p| columns.iter().any(|c| &c.id == *p)) {
                Some(prev) => prev.clone(),
                None => {
                    return Err(SchemaError::InvalidIntent(
                        "a table with columns needs a primary key".to_string(),
                    ));
                }
            },
        },
    };
    for column in columns.iter_mut() {
        column.primary_key = column.id == key;
    }
    Ok(Some(key))
}

fn foreign_keys_of(table: &Table) -> BTreeSet<JoinId> {
    table
        .columns
        .iter()
        .filter_map(|c| c.foreign_key.as_ref().map(|j| j.id.clone()))
        .collect()
}

pub fn replace_table_fields(
    snapshot: &Snapshot,
    table: &TableId,
    patch: TablePatch,
) -> SchemaResult<Snapshot> {
    let mut next = snapshot.clone();
    let target = next
        .table_mut(table)
        .ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
    if let Some(name) = patch.name {
        if snapshot.tables.iter().any(|t| &t.id != table && t.name == name) {
            return Err(SchemaError::InvalidIntent(format!(
                "a table named {} already exists",
                name
            )));
        }
        target.name = name;
    }
    if let Some(storage_name) = patch.storage_name {
        target.storage_name = storage_name;
    }
    if let Some(description) = patch.description {
        target.description = description;
    }
    finish(next)
}

pub fn add_column(
    snapshot: &Snapshot,
    table: &TableId,
    name: &str,
) -> SchemaResult<(Snapshot, ColumnId)> {
    let mut next = snapshot.clone();
    let target = next
        .table_mut(table)
        .ok_or_else(|| SchemaError::UnknownTable(table.clone()))?;
    let name = target.free_column_name(name);
    let column = Column::new(table, &name);
    let id = column.id.clone();
    target.columns.push(column);
    Ok((finish(next)?, id))
}

/// Remove a column. A foreign-key column takes its join (and the join's mirror) with it.
pub fn delete_column(
    snapshot: &Snapshot,
    table: &TableId,
    column: &ColumnId,
) -> SchemaResult<Snapshot> {
    let owner = snapshot.require_table(table)?;
    let target = owner
        .column(column)
        .ok_or_else(|| SchemaError::UnknownColumn {
            table: table.clone(),
            column: column.clone(),
        })?;
    if target.primary_key {
        return Err(SchemaError::InvalidIntent(format!(
            "cannot delete primary key column {}",
            target.name
        )));
    }
    let mut next = snapshot.clone();
    if let Some(join) = &target.foreign_key {
        strip_join(&mut next, &join.id);
    }
    if let Some(t) = next.table_mut(table) {
        t.columns.retain(|c| &c.id != column);
    }
    finish(next)
}

/// Start a relationship from `source` to `target`. The join is pending until configured.
///
/// Connecting a pair that already has a join returns that join unchanged.
pub fn connect(
    snapshot: &Snapshot,
    source: &TableId,
    target: &TableId,
    target_column: Option<&ColumnId>,
    on_delete: ReferentialAction,
    on_update: ReferentialAction,
) -> SchemaResult<(Snapshot, JoinId)> {
    snapshot.require_table(source)?;
    let peer = snapshot.require_table(target)?;
    let id = JoinId::between(source, target);
    if snapshot.contains_join(&id) {
        debug!(join = %id, "pair already connected");
        return Ok((snapshot.clone(), id));
    }

    let column = match target_column {
        Some(c) => {
            peer.column(c).ok_or_else(|| SchemaError::UnknownColumn {
                table: target.clone(),
                column: c.clone(),
            })?;
            Some(c.clone())
        }
        None => peer.key_column().map(|c| c.id.clone()),
    };

    let join = Join {
        id: id.clone(),
        kind: JoinKind::OneToOne,
        source: source.clone(),
        target: Some(JoinTarget {
            table: target.clone(),
            column,
        }),
        on_delete,
        on_update,
        through: None,
        join_column: None,
        inverse_column: None,
    };

    let mut next = snapshot.clone();
    if source != target {
        if let Some(t) = next.table_mut(target) {
            t.joins.push(join.mirror());
        }
    }
    if let Some(t) = next.table_mut(source) {
        t.joins.push(join);
    }
    debug!(join = %id, self_join = source == target, "connected tables");
    Ok((finish(next)?, id))
}

/// Configure a pending join, or retype a configured one.
///
/// A configured join keeps its foreign-key column and is updated in place. A pending join gets a
/// new foreign-key column; for one-to-many the column goes on the target table and references
/// the declaring table, otherwise it goes on the declaring table. Many-to-many joins are
/// replaced by a junction table.
pub fn configure_join(
    snapshot: &Snapshot,
    join: &JoinId,
    config: &JoinConfig,
) -> SchemaResult<(Snapshot, Configured)> {
    let chosen = snapshot.require_table(&config.target.table)?;
    if let Some(column) = &config.target.column {
        if chosen.column(column).is_none() {
            return Err(SchemaError::UnknownColumn {
                table: chosen.id.clone(),
                column: column.clone(),
            });
        }
    }

    let existing = snapshot
        .find_foreign_key(join)
        .map(|(t, c)| (t.id.clone(), c.id.clone()));
    let declaring = match (&existing, snapshot.find_pending(join)) {
        (Some((table, _)), _) => table.clone(),
        (None, Some((table, _))) => table.id.clone(),
        (None, None) => return Err(SchemaError::UnknownJoin(join.clone())),
    };

    if config.kind == JoinKind::ManyToMany {
        let (next, table) = junction::synthesize(snapshot, join, &declaring, config)?;
        return Ok((next, Configured::Junction { table }));
    }

    let (holder, referenced) = match (&existing, config.kind) {
        (None, JoinKind::OneToMany) => (config.target.table.clone(), declaring),
        _ => (declaring, config.target.table.clone()),
    };
    let referenced_table = snapshot.require_table(&referenced)?;
    let referenced_column = if referenced == config.target.table && config.target.column.is_some()
    {
        config
            .target
            .column
            .as_ref()
            .and_then(|c| referenced_table.column(c))
    } else {
        referenced_table.key_column()
    }
    .ok_or_else(|| {
        SchemaError::InvalidIntent(format!(
            "no column to reference on table {}",
            referenced_table.name
        ))
    })?;

    let record = Join {
        id: join.clone(),
        kind: config.kind,
        source: holder.clone(),
        target: Some(JoinTarget {
            table: referenced.clone(),
            column: Some(referenced_column.id.clone()),
        }),
        on_delete: config.on_delete,
        on_update: config.on_update,
        through: config.through.clone(),
        join_column: None,
        inverse_column: None,
    };
    let data_type = referenced_column.data_type.clone();
    let base_name = foreign_key_name(&referenced_table.name);

    let mut next = snapshot.clone();
    let column_id = match existing {
        Some((_, column_id)) => {
            for t in &mut next.tables {
                t.joins.retain(|j| &j.id != join);
            }
            let holder_table = next
                .table_mut(&holder)
                .ok_or_else(|| SchemaError::UnknownTable(holder.clone()))?;
            if let Some(column) = holder_table.columns.iter_mut().find(|c| c.id == column_id) {
                column.data_type = data_type;
                column.foreign_key = Some(record.clone());
            }
            debug!(join = %join, column = %column_id, "retyped foreign key");
            column_id
        }
        None => {
            strip_join(&mut next, join);
            let holder_table = next
                .table_mut(&holder)
                .ok_or_else(|| SchemaError::UnknownTable(holder.clone()))?;
            let name = holder_table.free_column_name(&base_name);
            let mut column = Column::new(&holder, &name);
            column.storage_name = snake_case(&name);
            column.data_type = data_type;
            column.foreign_key = Some(record.clone());
            let id = column.id.clone();
            holder_table.columns.push(column);
            debug!(join = %join, column = %id, table = %holder, "added foreign key");
            id
        }
    };

    if referenced != holder {
        if let Some(t) = next.table_mut(&referenced) {
            t.joins.push(record.mirror());
        }
    }

    let next = finish(next)?;
    Ok((
        next,
        Configured::ForeignKey {
            table: holder,
            column: column_id,
        },
    ))
}

/// Remove a join: its foreign-key column or pending record, and its mirror, in one step.
pub fn delete_join(snapshot: &Snapshot, join: &JoinId) -> SchemaResult<Snapshot> {
    if !snapshot.contains_join(join) && snapshot.mirrors(join).is_empty() {
        return Err(SchemaError::UnknownJoin(join.clone()));
    }
    let mut next = snapshot.clone();
    strip_join(&mut next, join);
    debug!(join = %join, "deleted join");
    finish(next)
}

/// Drop every trace of a join. A primary key column carrying it survives without the join.
pub(crate) fn strip_join(snapshot: &mut Snapshot, join: &JoinId) {
    let carries = |c: &Column| c.foreign_key.as_ref().is_some_and(|fk| &fk.id == join);
    for table in &mut snapshot.tables {
        table.joins.retain(|j| &j.id != join);
        table.columns.retain(|c| c.primary_key || !carries(c));
        for column in &mut table.columns {
            if carries(column) {
                column.foreign_key = None;
            }
        }
    }
}

/// `User` -> `userId`.
pub(crate) fn foreign_key_name(table_name: &str) -> String {
    let mut chars = table_name.chars();
    let mut name: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    };
    name.retain(|c| !c.is_whitespace());
    name.push_str("Id");
    name
}

/// `userId` -> `user_id`.
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == ' ' || c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}
