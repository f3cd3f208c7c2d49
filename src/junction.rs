//! Junction synthesis: a many-to-many join between A and B becomes a new table holding two
//! foreign keys, joined one-to-many to each side.

use crate::error::{SchemaError, SchemaResult};
use crate::id::{JoinId, TableId};
use crate::model::{Column, DataType, Join, JoinKind, JoinTarget, JunctionColumn, Snapshot, Table};
use crate::mutation::{JoinConfig, finish, foreign_key_name, snake_case, strip_join};
use tracing::{info, warn};

/// Replace `join` (declared from `declaring` towards `config.target.table`) by a junction table.
///
/// On failure the input snapshot is the one to keep, so the join stays unconfigured.
pub fn synthesize(
    snapshot: &Snapshot,
    join: &JoinId,
    declaring: &TableId,
    config: &JoinConfig,
) -> SchemaResult<(Snapshot, TableId)> {
    let a = snapshot.require_table(declaring)?;
    let b = snapshot.require_table(&config.target.table)?;

    let a_key = referenced_column(a, config.join_column.as_ref()).ok_or_else(|| {
        warn!(join = %join, table = %a.name, "junction synthesis failed");
        SchemaError::SynthesisFailure(format!("no key column to reference on {}", a.name))
    })?;
    let b_key = referenced_column(b, config.inverse_column.as_ref()).ok_or_else(|| {
        warn!(join = %join, table = %b.name, "junction synthesis failed");
        SchemaError::SynthesisFailure(format!("no key column to reference on {}", b.name))
    })?;

    let name = match config.through.as_deref().map(str::trim) {
        Some(through) if !through.is_empty() => through.to_string(),
        _ => format!("{}{}", a.name, b.name),
    };
    if snapshot.table_by_name(&name).is_some() {
        return Err(SchemaError::SynthesisFailure(format!(
            "a table named {} already exists",
            name
        )));
    }

    let key_type = a
        .primary_key_column()
        .map(|c| c.data_type.clone())
        .filter(|t| matches!(t, DataType::Uuid | DataType::Number))
        .unwrap_or(DataType::Uuid);
    let mut junction = Table::new(&name, key_type);
    let junction_id = junction.id.clone();

    let to_a = Join {
        id: JoinId::between(&junction_id, &a.id),
        kind: JoinKind::OneToMany,
        source: junction_id.clone(),
        target: Some(JoinTarget {
            table: a.id.clone(),
            column: Some(a_key.id.clone()),
        }),
        on_delete: config.on_delete,
        on_update: config.on_update,
        through: None,
        join_column: None,
        inverse_column: None,
    };
    let to_b = Join {
        id: JoinId::nth(&junction_id, &b.id, usize::from(a.id == b.id)),
        target: Some(JoinTarget {
            table: b.id.clone(),
            column: Some(b_key.id.clone()),
        }),
        ..to_a.clone()
    };

    let a_name = column_name(config.join_column.as_ref(), &a.name);
    let a_column = foreign_key_column(&junction, &a_name, &a_key.data_type, &to_a);
    junction.columns.push(a_column);
    let b_name = column_name(config.inverse_column.as_ref(), &b.name);
    let b_column = foreign_key_column(&junction, &b_name, &b_key.data_type, &to_b);
    junction.columns.push(b_column);

    let (a_id, b_id) = (a.id.clone(), b.id.clone());
    let mut next = snapshot.clone();
    strip_join(&mut next, join);
    if let Some(t) = next.table_mut(&a_id) {
        t.joins.push(to_a.mirror());
    }
    if let Some(t) = next.table_mut(&b_id) {
        t.joins.push(to_b.mirror());
    }
    next.tables.push(junction);

    info!(join = %join, junction = %name, "synthesized junction table");
    Ok((finish(next)?, junction_id))
}

/// The named column if the user gave one and it exists, else the primary key.
fn referenced_column<'a>(table: &'a Table, named: Option<&JunctionColumn>) -> Option<&'a Column> {
    named
        .and_then(|jc| table.column_by_name(&jc.referenced_column_name))
        .or_else(|| table.primary_key_column())
}

fn column_name(named: Option<&JunctionColumn>, table_name: &str) -> String {
    match named.map(|jc| jc.name.trim()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => foreign_key_name(table_name),
    }
}

fn foreign_key_column(junction: &Table, name: &str, data_type: &DataType, join: &Join) -> Column {
    let name = junction.free_column_name(name);
    let mut column = Column::new(&junction.id, &name);
    column.storage_name = snake_case(&name);
    column.data_type = data_type.clone();
    column.foreign_key = Some(join.clone());
    column
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReferentialAction;
    use crate::mutation::{Configured, configure_join, connect, create_table};

    fn many_to_many(target: &Table, through: Option<&str>) -> JoinConfig {
        JoinConfig {
            target: JoinTarget {
                table: target.id.clone(),
                column: target.primary_key.clone(),
            },
            kind: JoinKind::ManyToMany,
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::Cascade,
            through: through.map(str::to_string),
            join_column: None,
            inverse_column: None,
        }
    }

    fn connected(a: &str, b: &str) -> (Snapshot, TableId, TableId, JoinId) {
        let s = Snapshot::default();
        let (s, a) = create_table(&s, a, DataType::Uuid).unwrap();
        let (s, b) = create_table(&s, b, DataType::Uuid).unwrap();
        let (s, join) = connect(
            &s,
            &a,
            &b,
            None,
            ReferentialAction::Cascade,
            ReferentialAction::Cascade,
        )
        .unwrap();
        (s, a, b, join)
    }

    #[test]
    fn test_junction_named_after_both_tables() {
        let (s, a, b, join) = connected("Student", "Course");
        let course = s.table(&b).unwrap().clone();
        let (s, configured) = configure_join(&s, &join, &many_to_many(&course, None)).unwrap();

        let Configured::Junction { table } = configured else {
            panic!("expected a junction");
        };
        let junction = s.table(&table).unwrap();
        assert_eq!(junction.name, "StudentCourse");
        assert_eq!(junction.columns.len(), 3);

        let student_key = s.table(&a).unwrap().primary_key.clone();
        let course_key = s.table(&b).unwrap().primary_key.clone();
        let referenced: Vec<_> = junction
            .columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref())
            .map(|j| {
                assert_eq!(j.kind, JoinKind::OneToMany);
                j.target.as_ref().unwrap().column.clone()
            })
            .collect();
        assert_eq!(referenced, vec![student_key, course_key]);

        assert!(!s.contains_join(&join));
        assert!(s.mirrors(&join).is_empty());
        assert_eq!(s.table(&a).unwrap().joins.len(), 1);
        assert_eq!(s.table(&b).unwrap().joins.len(), 1);
    }

    #[test]
    fn test_named_referenced_columns() {
        let (s, _a, b, join) = connected("Student", "Course");
        let (s, code) = crate::mutation::add_column(&s, &b, "code").unwrap();
        let course = s.table(&b).unwrap().clone();
        let mut config = many_to_many(&course, Some("enrollments"));
        config.inverse_column = Some(JunctionColumn {
            name: "courseCode".to_string(),
            referenced_column_name: "code".to_string(),
        });
        let (s, configured) = configure_join(&s, &join, &config).unwrap();
        let Configured::Junction { table } = configured else {
            panic!("expected a junction");
        };
        let junction = s.table(&table).unwrap();
        assert_eq!(junction.name, "enrollments");
        let column = junction.column_by_name("courseCode").unwrap();
        let target = column.foreign_key.as_ref().unwrap().target.as_ref().unwrap();
        assert_eq!(target.column.as_ref(), Some(&code));
        assert!(junction.column_by_name("studentId").is_some());
    }

    #[test]
    fn test_self_many_to_many() {
        let s = Snapshot::default();
        let (s, a) = create_table(&s, "Person", DataType::Uuid).unwrap();
        let (s, join) = connect(
            &s,
            &a,
            &a,
            None,
            ReferentialAction::Cascade,
            ReferentialAction::Cascade,
        )
        .unwrap();
        let person = s.table(&a).unwrap().clone();
        let (s, _) = configure_join(&s, &join, &many_to_many(&person, Some("friends"))).unwrap();
        let junction = s.table_by_name("friends").unwrap();
        assert!(junction.column_by_name("personId").is_some());
        assert!(junction.column_by_name("personId2").is_some());
        assert_eq!(s.table(&a).unwrap().joins.len(), 2);
    }

    #[test]
    fn test_failure_leaves_join_unconfigured() {
        let (s, _a, b, join) = connected("Student", "Course");
        let mut s = s;
        let course = s.table_mut(&b).unwrap();
        course.columns.clear();
        course.primary_key = None;
        let course = course.clone();

        let err = configure_join(&s, &join, &many_to_many(&course, None)).unwrap_err();
        assert!(matches!(err, SchemaError::SynthesisFailure(_)));
        assert!(s.find_pending(&join).is_some());
    }

    #[test]
    fn test_existing_name_fails() {
        let (s, _a, b, join) = connected("Student", "Course");
        let (s, _) = create_table(&s, "enrollments", DataType::Uuid).unwrap();
        let course = s.table(&b).unwrap().clone();
        let err = configure_join(&s, &join, &many_to_many(&course, Some("enrollments")))
            .unwrap_err();
        assert!(matches!(err, SchemaError::SynthesisFailure(_)));
    }
}
