//! Re-attach identity to a snapshot parsed back from source text.
//!
//! Parsed snapshots carry fresh ids. Tables are matched to the previous snapshot by name, columns
//! by name within a matched table, and foreign keys by the (table, column) that carries them.

use crate::error::SchemaResult;
use crate::id::{ColumnId, JoinId, TableId};
use crate::model::{Join, JoinTarget, Snapshot};
use crate::mutation::finish;
use crate::projection::{Canvas, Position};
use std::collections::{HashMap, HashSet};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub snapshot: Snapshot,
    pub canvas: Canvas,
}

pub fn reconcile(
    previous: &Snapshot,
    canvas: &Canvas,
    parsed: Snapshot,
    step: f64,
) -> SchemaResult<Reconciled> {
    let mut tables: HashMap<TableId, TableId> = HashMap::new();
    let mut columns: HashMap<ColumnId, ColumnId> = HashMap::new();
    let mut matched = 0;

    for table in &parsed.tables {
        let Some(old) = previous.table_by_name(&table.name) else {
            continue;
        };
        matched += 1;
        tables.insert(table.id.clone(), old.id.clone());
        for column in &table.columns {
            if let Some(old_column) = old.column_by_name(&column.name) {
                columns.insert(column.id.clone(), old_column.id.clone());
            }
        }
    }

    let table_id = |id: &TableId| tables.get(id).cloned().unwrap_or_else(|| id.clone());
    let column_id = |id: &ColumnId| columns.get(id).cloned().unwrap_or_else(|| id.clone());

    let mut next = parsed;
    for table in &mut next.tables {
        table.id = table_id(&table.id);
        table.primary_key = table.primary_key.as_ref().map(column_id);
        for column in &mut table.columns {
            column.id = column_id(&column.id);
            column.table_id = table.id.clone();
            if let Some(join) = &mut column.foreign_key {
                remap_join(join, &table_id, &column_id);
            }
        }
        for join in &mut table.joins {
            remap_join(join, &table_id, &column_id);
        }
    }

    let joins = assign_join_ids(previous, &next);
    for table in &mut next.tables {
        for column in &mut table.columns {
            if let Some(join) = &mut column.foreign_key {
                if let Some(id) = joins.get(&join.id) {
                    join.id = id.clone();
                }
            }
        }
        for join in &mut table.joins {
            if let Some(id) = joins.get(&join.id) {
                join.id = id.clone();
            }
        }
    }

    carry_pending(previous, &mut next);
    let snapshot = finish(next)?;

    let mut placed = Canvas::default();
    for (i, table) in snapshot.tables.iter().enumerate() {
        let position = canvas
            .position(&table.id)
            .unwrap_or_else(|| Position::offset(i, step));
        placed.place(table.id.clone(), position);
    }

    info!(
        tables = snapshot.tables.len(),
        matched, "reconciled parsed schema"
    );
    Ok(Reconciled {
        snapshot,
        canvas: placed,
    })
}

fn remap_join(
    join: &mut Join,
    table_id: &impl Fn(&TableId) -> TableId,
    column_id: &impl Fn(&ColumnId) -> ColumnId,
) {
    join.source = table_id(&join.source);
    if let Some(target) = &mut join.target {
        target.table = table_id(&target.table);
        target.column = target.column.as_ref().map(column_id);
    }
}

/// Map parsed join ids to final ones. A foreign key carried by the same column towards the same
/// table as before keeps its old id; every other join gets the first free id for its endpoints.
fn assign_join_ids(previous: &Snapshot, next: &Snapshot) -> HashMap<JoinId, JoinId> {
    let mut assigned = HashMap::new();
    let mut used = HashSet::new();
    let mut fresh = Vec::new();

    for owned in next.owning_joins() {
        let join = owned.join;
        let Some(target) = owned.peer() else {
            continue;
        };
        let kept = owned.column.and_then(|column| {
            let old = previous
                .table(&owned.holder.id)?
                .column(&column.id)?
                .foreign_key
                .as_ref()?;
            let same_target = old.target.as_ref().is_some_and(|t| &t.table == target);
            same_target.then(|| old.id.clone())
        });
        match kept {
            Some(id) if used.insert(id.clone()) => {
                assigned.insert(join.id.clone(), id);
            }
            _ => fresh.push((join.id.clone(), owned.holder.id.clone(), target.clone())),
        }
    }

    for (parsed, source, target) in fresh {
        let id = (0..)
            .map(|n| JoinId::nth(&source, &target, n))
            .find(|id| !used.contains(id))
            .unwrap_or_else(|| JoinId::between(&source, &target));
        used.insert(id.clone());
        assigned.insert(parsed, id);
    }
    assigned
}

/// Pending joins have no source form; keep those whose endpoints survived.
fn carry_pending(previous: &Snapshot, next: &mut Snapshot) {
    let pending: Vec<Join> = previous
        .owning_joins()
        .into_iter()
        .filter(|owned| !owned.is_configured())
        .map(|owned| owned.join.clone())
        .collect();

    for mut join in pending {
        if next.contains_join(&join.id) {
            continue;
        }
        let Some(target) = join.target.clone() else {
            continue;
        };
        let Some(peer) = next.table(&target.table) else {
            continue;
        };
        if next.table(&join.source).is_none() {
            continue;
        }
        if let Some(column) = &target.column {
            if peer.column(column).is_none() {
                join.target = Some(JoinTarget {
                    table: target.table.clone(),
                    column: peer.key_column().map(|c| c.id.clone()),
                });
            }
        }
        if !join.is_self_join() {
            if let Some(t) = next.table_mut(&target.table) {
                t.joins.push(join.mirror());
            }
        }
        if let Some(t) = next.table_mut(&join.source) {
            t.joins.push(join);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl;
    use crate::model::{DataType, ReferentialAction};
    use crate::mutation::{connect, create_table};

    fn previous() -> (Snapshot, Canvas) {
        let s = dsl::from_source(
            r#"
            entity User { id uuid pk email string }
            entity Post {
                id uuid pk
                userId uuid fk -> User.id
            }
            "#,
        )
        .unwrap();
        let mut canvas = Canvas::default();
        for (i, table) in s.tables.iter().enumerate() {
            canvas.place(table.id.clone(), Position::new(100.0 * i as f64, 0.0));
        }
        (s, canvas)
    }

    #[test]
    fn test_matched_tables_keep_identity() {
        let (prev, canvas) = previous();
        let parsed = dsl::from_source(
            r#"
            entity User { id uuid pk email string name string }
            entity Post {
                id uuid pk
                userId uuid fk -> User.id [on_delete = restrict]
            }
            entity Tag { id uuid pk }
            "#,
        )
        .unwrap();
        let out = reconcile(&prev, &canvas, parsed, 10.0).unwrap();

        let old_user = prev.table_by_name("User").unwrap();
        let user = out.snapshot.table_by_name("User").unwrap();
        assert_eq!(user.id, old_user.id);
        assert_eq!(user.primary_key, old_user.primary_key);
        assert_eq!(
            user.column_by_name("email").unwrap().id,
            old_user.column_by_name("email").unwrap().id
        );
        assert!(old_user.column_by_name("name").is_none());

        let old_fk = prev
            .table_by_name("Post")
            .unwrap()
            .column_by_name("userId")
            .unwrap()
            .foreign_key
            .clone()
            .unwrap();
        let post = out.snapshot.table_by_name("Post").unwrap();
        let fk = post
            .column_by_name("userId")
            .unwrap()
            .foreign_key
            .clone()
            .unwrap();
        assert_eq!(fk.id, old_fk.id);
        assert_eq!(fk.on_delete, ReferentialAction::Restrict);
        assert_eq!(out.snapshot.mirrors(&fk.id)[0].0.id, user.id);

        assert_eq!(out.canvas.position(&user.id), canvas.position(&old_user.id));
        let tag = out.snapshot.table_by_name("Tag").unwrap();
        assert_eq!(out.canvas.position(&tag.id), Some(Position::new(30.0, 30.0)));
    }

    #[test]
    fn test_renamed_table_gets_new_identity() {
        let (prev, canvas) = previous();
        let parsed = dsl::from_source("entity Account { id uuid pk }").unwrap();
        let out = reconcile(&prev, &canvas, parsed, 10.0).unwrap();
        let account = &out.snapshot.tables[0];
        assert!(prev.table(&account.id).is_none());
        assert_eq!(out.canvas.position(&account.id), Some(Position::new(10.0, 10.0)));
        assert_eq!(out.canvas.len(), 1);
    }

    #[test]
    fn test_pending_join_is_carried_over() {
        let s = Snapshot::default();
        let (s, a) = create_table(&s, "A", DataType::Uuid).unwrap();
        let (s, b) = create_table(&s, "B", DataType::Uuid).unwrap();
        let (s, join) = connect(
            &s,
            &a,
            &b,
            None,
            ReferentialAction::Cascade,
            ReferentialAction::Cascade,
        )
        .unwrap();

        let parsed = dsl::from_source(&dsl::to_source(&s)).unwrap();
        let out = reconcile(&s, &Canvas::default(), parsed, 10.0).unwrap();
        assert!(out.snapshot.find_pending(&join).is_some());
        assert_eq!(out.snapshot.mirrors(&join).len(), 1);
        assert_eq!(out.snapshot, s);
    }
}
