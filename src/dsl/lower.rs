//! Lowering between source documents and schema snapshots.

use super::CompileError;
use super::ast::{
    self, ColumnModifier, Document, Entity, FkOption, ForeignKeyRef, Hint, HintValue, Literal,
    TypeRef,
};
use crate::id::{JoinId, TableId};
use crate::model::{
    Column, DEFAULT_STRING_LENGTH, DataType, DefaultValue, Join, JoinKind, JoinTarget,
    JunctionColumn, ReferentialAction, Snapshot, Table,
};
use crate::mutation::{self, JoinConfig};
use std::collections::HashMap;

/// A many-to-many foreign key, configured once every table exists.
struct DeferredJunction {
    entity: String,
    join: JoinId,
    config: JoinConfig,
}

/// Build a snapshot from a parsed document, with fresh ids.
pub fn lower(document: &Document) -> Result<Snapshot, CompileError> {
    let mut tables: Vec<Table> = document
        .entities
        .iter()
        .map(lower_entity)
        .collect::<Result<_, _>>()?;

    let ids: HashMap<String, TableId> = tables
        .iter()
        .map(|t| (t.name.clone(), t.id.clone()))
        .collect();
    let mut pair_counts: HashMap<(TableId, TableId), usize> = HashMap::new();
    let mut next_id = |source: &TableId, target: &TableId| {
        let n = pair_counts
            .entry((source.clone(), target.clone()))
            .or_insert(0);
        let id = JoinId::nth(source, target, *n);
        *n += 1;
        id
    };

    let mut mirrors: Vec<(TableId, Join)> = Vec::new();
    let mut deferred = Vec::new();

    for (table_index, entity) in document.entities.iter().enumerate() {
        let source = tables[table_index].id.clone();
        for column in &entity.columns {
            let Some(fk) = foreign_key_of(column) else {
                continue;
            };
            let err = |message: String| CompileError::Lower {
                entity: entity.name.clone(),
                message,
            };
            let target_id = ids
                .get(fk.target.as_str())
                .cloned()
                .ok_or_else(|| err(format!("unknown fk target table {}", fk.target)))?;
            let target_table = tables
                .iter()
                .find(|t| t.id == target_id)
                .ok_or_else(|| err(format!("unknown fk target table {}", fk.target)))?;
            let target_column = target_table
                .column_by_name(&fk.column)
                .map(|c| c.id.clone())
                .ok_or_else(|| {
                    err(format!("unknown fk target column {}.{}", fk.target, fk.column))
                })?;
            let options = lower_options(&fk.options).map_err(err)?;

            let join = Join {
                id: next_id(&source, &target_id),
                kind: options.kind,
                source: source.clone(),
                target: Some(JoinTarget {
                    table: target_id.clone(),
                    column: Some(target_column),
                }),
                on_delete: options.on_delete,
                on_update: options.on_update,
                through: options.through,
                join_column: options.join_column,
                inverse_column: options.inverse_column,
            };

            if join.kind == JoinKind::ManyToMany {
                let mut config = JoinConfig::from_join(&join)
                    .ok_or_else(|| err("many-to-many fk without a target".to_string()))?;
                if config.inverse_column.is_none() {
                    config.inverse_column = Some(JunctionColumn {
                        name: mutation::foreign_key_name(&fk.target),
                        referenced_column_name: fk.column.clone(),
                    });
                }
                let holder = &mut tables[table_index];
                holder.columns.retain(|c| c.name != column.name);
                if target_id != source {
                    mirrors.push((target_id, join.mirror()));
                }
                holder.joins.push(join.clone());
                deferred.push(DeferredJunction {
                    entity: entity.name.clone(),
                    join: join.id,
                    config,
                });
                continue;
            }

            if target_id != source {
                mirrors.push((target_id, join.mirror()));
            }
            if let Some(c) = tables[table_index]
                .columns
                .iter_mut()
                .find(|c| c.name == column.name)
            {
                c.foreign_key = Some(join);
            }
        }
    }

    for (table_id, mirror) in mirrors {
        if let Some(t) = tables.iter_mut().find(|t| t.id == table_id) {
            t.joins.push(mirror);
        }
    }

    let mut snapshot = Snapshot::new(tables);
    snapshot
        .validate()
        .map_err(|e| CompileError::Invalid(e.to_string()))?;

    for junction in deferred {
        let (next, _) = mutation::configure_join(&snapshot, &junction.join, &junction.config)
            .map_err(|e| CompileError::Lower {
                entity: junction.entity.clone(),
                message: e.to_string(),
            })?;
        snapshot = next;
    }

    Ok(snapshot)
}

fn foreign_key_of(column: &ast::Column) -> Option<&ForeignKeyRef> {
    column.modifiers.iter().find_map(|m| match m {
        ColumnModifier::Fk(fk) => Some(fk),
        _ => None,
    })
}

fn lower_entity(entity: &Entity) -> Result<Table, CompileError> {
    let err = |message: String| CompileError::Lower {
        entity: entity.name.clone(),
        message,
    };

    let id = TableId::generate();
    let mut columns = Vec::with_capacity(entity.columns.len());
    for source in &entity.columns {
        columns.push(lower_column(&id, source).map_err(err)?);
    }

    let keys: Vec<_> = columns.iter().filter(|c| c.primary_key).collect();
    let primary_key = match keys.as_slice() {
        [] if columns.is_empty() => None,
        [] => return Err(err("no pk column".to_string())),
        [key] => Some(key.id.clone()),
        _ => return Err(err(format!("{} pk columns", keys.len()))),
    };

    Ok(Table {
        id,
        name: entity.name.clone(),
        storage_name: entity.hint("map").map(HintValue::as_text).unwrap_or_default(),
        primary_key,
        description: entity.hint("doc").map(HintValue::as_text).unwrap_or_default(),
        columns,
        joins: Vec::new(),
    })
}

fn lower_column(table: &TableId, source: &ast::Column) -> Result<Column, String> {
    let mut column = Column::new(table, &source.name);
    let mut collation = None;

    for modifier in &source.modifiers {
        match modifier {
            ColumnModifier::Pk => column.primary_key = true,
            ColumnModifier::Unique => column.unique = true,
            ColumnModifier::Index => column.index = true,
            ColumnModifier::Null => column.nullable = true,
            ColumnModifier::NotNull => column.nullable = false,
            ColumnModifier::Increment => column.auto_increment = true,
            ColumnModifier::Default(value) => column.default_value = Some(lower_default(value)),
            ColumnModifier::Map(name) => column.storage_name = name.clone(),
            ColumnModifier::Collate(c) => collation = Some(c.clone()),
            ColumnModifier::Doc(text) => column.description = text.clone(),
            ColumnModifier::Fk(_) => {}
        }
    }

    column.data_type = lower_type(&source.typ, collation)?;
    column.normalize();
    Ok(column)
}

fn lower_type(typ: &TypeRef, collation: Option<String>) -> Result<DataType, String> {
    let arg = |i: usize| -> Result<Option<u32>, String> {
        typ.args
            .get(i)
            .map(|&n| u32::try_from(n).map_err(|_| format!("invalid {} argument {}", typ.name, n)))
            .transpose()
    };
    if collation.is_some() && typ.name != "string" {
        return Err(format!("collate only applies to string, not {}", typ.name));
    }

    Ok(match typ.name.as_str() {
        "string" => DataType::String {
            length: arg(0)?.unwrap_or(DEFAULT_STRING_LENGTH),
            collation,
        },
        "number" | "int" => DataType::Number,
        "date" => DataType::Date,
        "json" => DataType::Json,
        "float" => DataType::Float {
            precision: arg(0)?,
            scale: arg(1)?,
        },
        "uuid" => DataType::Uuid,
        "objectId" => DataType::ObjectId,
        other => return Err(format!("unknown type {}", other)),
    })
}

fn lower_default(value: &Literal) -> DefaultValue {
    match value {
        Literal::Int(n) => DefaultValue::Number(*n as f64),
        Literal::Decimal(n) => DefaultValue::Number(*n),
        Literal::Str(s) => DefaultValue::Text(s.clone()),
        Literal::Ident(s) => match s.as_str() {
            "true" => DefaultValue::Bool(true),
            "false" => DefaultValue::Bool(false),
            _ => DefaultValue::Text(s.clone()),
        },
    }
}

struct FkOptions {
    kind: JoinKind,
    on_delete: ReferentialAction,
    on_update: ReferentialAction,
    through: Option<String>,
    join_column: Option<JunctionColumn>,
    inverse_column: Option<JunctionColumn>,
}

fn lower_options(options: &[FkOption]) -> Result<FkOptions, String> {
    let mut out = FkOptions {
        kind: JoinKind::ManyToOne,
        on_delete: ReferentialAction::Cascade,
        on_update: ReferentialAction::Cascade,
        through: None,
        join_column: None,
        inverse_column: None,
    };
    for option in options {
        match option {
            FkOption::Kind(kind) => {
                out.kind = parse_kind(kind).ok_or_else(|| format!("unknown join kind {}", kind))?
            }
            FkOption::OnDelete(action) => out.on_delete = parse_action(action)?,
            FkOption::OnUpdate(action) => out.on_update = parse_action(action)?,
            FkOption::Through(name) => out.through = Some(name.clone()),
            FkOption::JoinColumn { name, referenced } => {
                out.join_column = Some(JunctionColumn {
                    name: name.clone(),
                    referenced_column_name: referenced.clone(),
                })
            }
            FkOption::InverseColumn { name, referenced } => {
                out.inverse_column = Some(JunctionColumn {
                    name: name.clone(),
                    referenced_column_name: referenced.clone(),
                })
            }
        }
    }
    Ok(out)
}

fn parse_kind(s: &str) -> Option<JoinKind> {
    match s {
        "one_to_one" => Some(JoinKind::OneToOne),
        "one_to_many" => Some(JoinKind::OneToMany),
        "many_to_one" => Some(JoinKind::ManyToOne),
        "many_to_many" => Some(JoinKind::ManyToMany),
        _ => None,
    }
}

fn kind_name(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::OneToOne => "one_to_one",
        JoinKind::OneToMany => "one_to_many",
        JoinKind::ManyToOne => "many_to_one",
        JoinKind::ManyToMany => "many_to_many",
    }
}

fn parse_action(s: &str) -> Result<ReferentialAction, String> {
    match s {
        "cascade" => Ok(ReferentialAction::Cascade),
        "set_null" => Ok(ReferentialAction::SetNull),
        "restrict" => Ok(ReferentialAction::Restrict),
        _ => Err(format!("unknown referential action {}", s)),
    }
}

fn action_name(action: ReferentialAction) -> &'static str {
    match action {
        ReferentialAction::Cascade => "cascade",
        ReferentialAction::SetNull => "set_null",
        ReferentialAction::Restrict => "restrict",
    }
}

/// Describe a snapshot as a source document. Pending joins have no source form and are left out.
pub fn lift(snapshot: &Snapshot) -> Document {
    let entities = snapshot
        .tables
        .iter()
        .map(|table| {
            let mut hints = Vec::new();
            if !table.storage_name.is_empty() && table.storage_name != table.name {
                hints.push(Hint {
                    key: "map".to_string(),
                    value: HintValue::Str(table.storage_name.clone()),
                });
            }
            if !table.description.is_empty() {
                hints.push(Hint {
                    key: "doc".to_string(),
                    value: HintValue::Str(table.description.clone()),
                });
            }
            Entity {
                name: table.name.clone(),
                columns: table
                    .columns
                    .iter()
                    .map(|c| lift_column(snapshot, c))
                    .collect(),
                hints,
            }
        })
        .collect();
    Document { entities }
}

fn lift_column(snapshot: &Snapshot, column: &Column) -> ast::Column {
    let mut modifiers = Vec::new();
    if column.primary_key {
        modifiers.push(ColumnModifier::Pk);
    }
    if column.unique {
        modifiers.push(ColumnModifier::Unique);
    }
    if column.index {
        modifiers.push(ColumnModifier::Index);
    }
    if column.nullable {
        modifiers.push(ColumnModifier::Null);
    }
    if column.auto_increment {
        modifiers.push(ColumnModifier::Increment);
    }
    if let Some(value) = &column.default_value {
        modifiers.push(ColumnModifier::Default(lift_default(value)));
    }
    if !column.storage_name.is_empty() && column.storage_name != column.name {
        modifiers.push(ColumnModifier::Map(column.storage_name.clone()));
    }
    if let DataType::String {
        collation: Some(c), ..
    } = &column.data_type
    {
        modifiers.push(ColumnModifier::Collate(c.clone()));
    }
    if !column.description.is_empty() {
        modifiers.push(ColumnModifier::Doc(column.description.clone()));
    }
    if let Some(fk) = column.foreign_key.as_ref().and_then(|j| lift_join(snapshot, j)) {
        modifiers.push(ColumnModifier::Fk(fk));
    }

    ast::Column {
        name: column.name.clone(),
        typ: lift_type(&column.data_type),
        modifiers,
    }
}

fn lift_type(data_type: &DataType) -> TypeRef {
    let args = match data_type {
        DataType::String { length, .. } if *length != DEFAULT_STRING_LENGTH => {
            vec![i64::from(*length)]
        }
        DataType::Float {
            precision: Some(p),
            scale,
        } => std::iter::once(*p)
            .chain(*scale)
            .map(i64::from)
            .collect(),
        _ => vec![],
    };
    TypeRef {
        name: data_type.name().to_string(),
        args,
    }
}

fn lift_default(value: &DefaultValue) -> Literal {
    match value {
        DefaultValue::Bool(b) => Literal::Ident(b.to_string()),
        DefaultValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Literal::Int(*n as i64),
        DefaultValue::Number(n) => Literal::Decimal(*n),
        // Calls such as now() stay bare
        DefaultValue::Text(s) if s.contains('(') && s.ends_with(')') => Literal::Ident(s.clone()),
        DefaultValue::Text(s) => Literal::Str(s.clone()),
    }
}

fn lift_join(snapshot: &Snapshot, join: &Join) -> Option<ForeignKeyRef> {
    let target = join.target.as_ref()?;
    let table = snapshot.table(&target.table)?;
    let column = table.column(target.column.as_ref()?)?;

    let mut options = vec![FkOption::Kind(kind_name(join.kind).to_string())];
    if join.on_delete != ReferentialAction::Cascade {
        options.push(FkOption::OnDelete(action_name(join.on_delete).to_string()));
    }
    if join.on_update != ReferentialAction::Cascade {
        options.push(FkOption::OnUpdate(action_name(join.on_update).to_string()));
    }
    if let Some(through) = &join.through {
        options.push(FkOption::Through(through.clone()));
    }

    Some(ForeignKeyRef {
        target: table.name.clone(),
        column: column.name.clone(),
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parser::Parser;

    fn lower_source(source: &str) -> Result<Snapshot, CompileError> {
        let document = Parser::new(source).unwrap().parse().unwrap();
        lower(&document)
    }

    #[test]
    fn test_lower_types_and_flags() {
        let snapshot = lower_source(
            r#"
            entity User {
                @map = "users"
                id number pk increment
                email string(120) unique null collate "C"
                score float(10, 2) default 1.5
                active string default true
            }
            "#,
        )
        .unwrap();
        let user = snapshot.table_by_name("User").unwrap();
        assert_eq!(user.storage_name, "users");
        assert_eq!(user.primary_key_column().unwrap().name, "id");
        let id = user.column_by_name("id").unwrap();
        assert!(id.auto_increment);
        let email = user.column_by_name("email").unwrap();
        assert!(email.unique);
        assert!(!email.nullable);
        assert_eq!(
            email.data_type,
            DataType::String {
                length: 120,
                collation: Some("C".to_string())
            }
        );
        let score = user.column_by_name("score").unwrap();
        assert_eq!(
            score.data_type,
            DataType::Float {
                precision: Some(10),
                scale: Some(2)
            }
        );
        assert_eq!(score.default_value, Some(DefaultValue::Number(1.5)));
        assert_eq!(
            user.column_by_name("active").unwrap().default_value,
            Some(DefaultValue::Bool(true))
        );
    }

    #[test]
    fn test_lower_foreign_key_and_mirror() {
        let snapshot = lower_source(
            r#"
            entity User { id uuid pk }
            entity Post {
                id uuid pk
                userId uuid fk -> User.id [on_delete = set_null]
            }
            "#,
        )
        .unwrap();
        let user = snapshot.table_by_name("User").unwrap();
        let post = snapshot.table_by_name("Post").unwrap();
        let fk = post
            .column_by_name("userId")
            .unwrap()
            .foreign_key
            .as_ref()
            .unwrap();
        assert_eq!(fk.id, JoinId::between(&post.id, &user.id));
        assert_eq!(fk.kind, JoinKind::ManyToOne);
        assert_eq!(fk.on_delete, ReferentialAction::SetNull);
        assert_eq!(fk.target.as_ref().unwrap().column, user.primary_key);
        assert_eq!(user.joins.len(), 1);
        assert!(user.joins[0].target.is_none());
    }

    #[test]
    fn test_lower_many_to_many_synthesizes_junction() {
        let snapshot = lower_source(
            r#"
            entity Student {
                id uuid pk
                courses uuid fk -> Course.id [many_to_many, through = enrollments]
            }
            entity Course { id uuid pk }
            "#,
        )
        .unwrap();
        let student = snapshot.table_by_name("Student").unwrap();
        assert!(student.column_by_name("courses").is_none());
        let junction = snapshot.table_by_name("enrollments").unwrap();
        assert!(junction.column_by_name("studentId").is_some());
        assert!(junction.column_by_name("courseId").is_some());
        assert_eq!(snapshot.tables.len(), 3);
    }

    #[test]
    fn test_lowering_errors() {
        let missing_pk = lower_source("entity User { name string }").unwrap_err();
        assert!(matches!(missing_pk, CompileError::Lower { .. }));

        let two_pks = lower_source("entity User { a uuid pk b uuid pk }").unwrap_err();
        assert!(matches!(two_pks, CompileError::Lower { .. }));

        let unknown = lower_source("entity Post { id uuid pk userId uuid fk -> User.id }")
            .unwrap_err();
        assert_eq!(
            unknown,
            CompileError::Lower {
                entity: "Post".to_string(),
                message: "unknown fk target table User".to_string()
            }
        );

        let bad_type = lower_source("entity User { id text pk }").unwrap_err();
        assert!(matches!(bad_type, CompileError::Lower { .. }));
    }

    #[test]
    fn test_lift_then_lower_preserves_names_and_types() {
        let source = r#"
            entity User {
                id uuid pk
                name string(64) doc "display name"
                createdAt date default now()
            }
            entity Post {
                id number pk increment
                userId uuid map "user_id" fk -> User.id [one_to_one, on_update = restrict]
            }
        "#;
        let first = lower_source(source).unwrap();
        let text = crate::dsl::serializer::serialize(&lift(&first));
        let second = lower_source(&text).unwrap();

        for (a, b) in first.tables.iter().zip(&second.tables) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.columns.len(), b.columns.len());
            for (x, y) in a.columns.iter().zip(&b.columns) {
                assert_eq!(x.name, y.name);
                assert_eq!(x.data_type, y.data_type);
                assert_eq!(x.default_value, y.default_value);
                assert_eq!(x.storage_name, y.storage_name);
            }
        }
        let fk = second
            .table_by_name("Post")
            .unwrap()
            .column_by_name("userId")
            .unwrap()
            .foreign_key
            .clone()
            .unwrap();
        assert_eq!(fk.kind, JoinKind::OneToOne);
        assert_eq!(fk.on_update, ReferentialAction::Restrict);
    }

    #[test]
    fn test_edited_defaults_and_floats_read_back() {
        use crate::mutation::{add_column, create_table, replace_columns};

        let s = Snapshot::default();
        let (s, item) = create_table(&s, "Item", DataType::Uuid).unwrap();
        let (s, _) = add_column(&s, &item, "stock").unwrap();
        let (s, _) = add_column(&s, &item, "price").unwrap();
        let (s, _) = add_column(&s, &item, "ratio").unwrap();
        let mut columns = s.table(&item).unwrap().columns.clone();
        columns[1].data_type = DataType::Number;
        columns[1].default_value = Some(DefaultValue::Number(1e20));
        columns[2].data_type = DataType::Float {
            precision: Some(10),
            scale: Some(2),
        };
        columns[2].default_value = Some(DefaultValue::Number(0.5));
        columns[3].data_type = DataType::Float {
            precision: None,
            scale: Some(2),
        };
        let s = replace_columns(&s, &item, columns).unwrap();

        let parsed = crate::dsl::from_source(&crate::dsl::to_source(&s)).unwrap();
        let before = s.table(&item).unwrap();
        let after = parsed.table_by_name("Item").unwrap();
        for (x, y) in before.columns.iter().zip(&after.columns) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.data_type, y.data_type);
            assert_eq!(x.default_value, y.default_value);
        }
        assert_eq!(
            after.column_by_name("ratio").unwrap().data_type,
            DataType::Float {
                precision: None,
                scale: None
            }
        );
    }
}
