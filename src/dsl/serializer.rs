//! Serializer for converting a source document back to text.

use super::ast::{
    Column, ColumnModifier, Document, Entity, FkOption, ForeignKeyRef, Hint, HintValue, Literal,
    TypeRef,
};
use unicode_width::UnicodeWidthStr;

/// Serialize a document to source text.
pub fn serialize(document: &Document) -> String {
    let mut output = String::new();

    for (i, entity) in document.entities.iter().enumerate() {
        if i > 0 {
            output.push('\n');
        }
        serialize_entity(&mut output, entity);
    }

    output
}

fn serialize_entity(output: &mut String, entity: &Entity) {
    output.push_str(&format!("entity {} {{\n", name(&entity.name)));

    for hint in &entity.hints {
        serialize_hint(output, hint);
    }

    // Align types on the widest column name
    let names: Vec<String> = entity.columns.iter().map(|c| name(&c.name)).collect();
    let width = names.iter().map(|n| n.width()).max().unwrap_or(0);

    for (column, column_name) in entity.columns.iter().zip(&names) {
        serialize_column(output, column, column_name, width);
    }

    output.push_str("}\n");
}

fn serialize_hint(output: &mut String, hint: &Hint) {
    let value = match &hint.value {
        HintValue::Int(n) => n.to_string(),
        HintValue::Str(s) => quote(s),
        HintValue::Ident(s) => s.clone(),
    };
    output.push_str(&format!("    @{} = {}\n", hint.key, value));
}

fn serialize_column(output: &mut String, column: &Column, column_name: &str, width: usize) {
    let padding = " ".repeat(width.saturating_sub(column_name.width()));
    output.push_str(&format!(
        "    {}{} {}",
        column_name,
        padding,
        serialize_type(&column.typ)
    ));

    // Modifiers in canonical order: flags, default, names, fk
    let mut modifiers: Vec<&ColumnModifier> = column.modifiers.iter().collect();
    modifiers.sort_by_key(|m| rank(m));

    for modifier in modifiers {
        output.push(' ');
        match modifier {
            ColumnModifier::Pk => output.push_str("pk"),
            ColumnModifier::Unique => output.push_str("unique"),
            ColumnModifier::Index => output.push_str("index"),
            ColumnModifier::Null => output.push_str("null"),
            ColumnModifier::NotNull => output.push_str("not null"),
            ColumnModifier::Increment => output.push_str("increment"),
            ColumnModifier::Default(val) => {
                output.push_str("default ");
                output.push_str(&serialize_literal(val));
            }
            ColumnModifier::Map(s) => output.push_str(&format!("map {}", quote(s))),
            ColumnModifier::Collate(s) => output.push_str(&format!("collate {}", quote(s))),
            ColumnModifier::Doc(s) => output.push_str(&format!("doc {}", quote(s))),
            ColumnModifier::Fk(fk) => serialize_foreign_key(output, fk),
        }
    }

    output.push('\n');
}

fn rank(modifier: &ColumnModifier) -> u8 {
    match modifier {
        ColumnModifier::Pk => 0,
        ColumnModifier::Unique => 1,
        ColumnModifier::Index => 2,
        ColumnModifier::Null | ColumnModifier::NotNull => 3,
        ColumnModifier::Increment => 4,
        ColumnModifier::Default(_) => 5,
        ColumnModifier::Map(_) => 6,
        ColumnModifier::Collate(_) => 7,
        ColumnModifier::Doc(_) => 8,
        ColumnModifier::Fk(_) => 9,
    }
}

fn serialize_type(typ: &TypeRef) -> String {
    if typ.args.is_empty() {
        typ.name.clone()
    } else {
        let args: Vec<String> = typ.args.iter().map(|a| a.to_string()).collect();
        format!("{}({})", typ.name, args.join(", "))
    }
}

fn serialize_literal(literal: &Literal) -> String {
    match literal {
        Literal::Int(n) => n.to_string(),
        Literal::Decimal(n) => decimal(*n),
        Literal::Str(s) => quote(s),
        Literal::Ident(s) => s.clone(),
    }
}

/// Decimals always carry a fraction so they read back as decimals.
fn decimal(n: f64) -> String {
    let text = n.to_string();
    if text.contains('.') || !n.is_finite() {
        text
    } else {
        format!("{}.0", text)
    }
}

fn serialize_foreign_key(output: &mut String, fk: &ForeignKeyRef) {
    output.push_str(&format!("fk -> {}.{}", name(&fk.target), name(&fk.column)));
    if fk.options.is_empty() {
        return;
    }
    let options: Vec<String> = fk
        .options
        .iter()
        .map(|option| match option {
            FkOption::Kind(kind) => kind.clone(),
            FkOption::OnDelete(action) => format!("on_delete = {}", action),
            FkOption::OnUpdate(action) => format!("on_update = {}", action),
            FkOption::Through(through) => format!("through = {}", name(through)),
            FkOption::JoinColumn {
                name: column,
                referenced,
            } => format!("join = {} -> {}", name(column), name(referenced)),
            FkOption::InverseColumn {
                name: column,
                referenced,
            } => format!("inverse = {} -> {}", name(column), name(referenced)),
        })
        .collect();
    output.push_str(&format!(" [{}]", options.join(", ")));
}

/// Words that would be read back as a column modifier.
const KEYWORDS: &[&str] = &[
    "entity", "pk", "unique", "index", "null", "not", "increment", "default", "map", "collate",
    "doc", "fk",
];

/// Bare identifier when the lexer would read it back as one, quoted otherwise.
fn name(s: &str) -> String {
    if KEYWORDS.contains(&s) {
        return quote(s);
    }
    let mut chars = s.chars();
    let is_ident = match chars.next() {
        Some(first) => {
            (first.is_alphabetic() || first == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        None => false,
    };
    if is_ident { s.to_string() } else { quote(s) }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parser::Parser;

    fn column(name: &str, typ: &str, modifiers: Vec<ColumnModifier>) -> Column {
        Column {
            name: name.to_string(),
            typ: TypeRef {
                name: typ.to_string(),
                args: vec![],
            },
            modifiers,
        }
    }

    #[test]
    fn test_serialize_simple_entity() {
        let document = Document {
            entities: vec![Entity {
                name: "User".to_string(),
                columns: vec![
                    column("id", "uuid", vec![ColumnModifier::Pk]),
                    column(
                        "email",
                        "string",
                        vec![ColumnModifier::Index, ColumnModifier::Unique],
                    ),
                ],
                hints: vec![],
            }],
        };

        let result = serialize(&document);
        assert!(result.contains("entity User {"));
        assert!(result.contains("    id    uuid pk\n"));
        assert!(result.contains("    email string unique index\n"));
    }

    #[test]
    fn test_serialize_with_fk() {
        let document = Document {
            entities: vec![Entity {
                name: "Post".to_string(),
                columns: vec![column(
                    "userId",
                    "uuid",
                    vec![ColumnModifier::Fk(ForeignKeyRef {
                        target: "User".to_string(),
                        column: "id".to_string(),
                        options: vec![
                            FkOption::Kind("many_to_one".to_string()),
                            FkOption::OnDelete("set_null".to_string()),
                        ],
                    })],
                )],
                hints: vec![],
            }],
        };

        let result = serialize(&document);
        assert!(result.contains("userId uuid fk -> User.id [many_to_one, on_delete = set_null]"));
    }

    #[test]
    fn test_decimals_keep_a_fraction() {
        assert_eq!(serialize_literal(&Literal::Decimal(1e20)), "100000000000000000000.0");
        assert_eq!(serialize_literal(&Literal::Decimal(2.0)), "2.0");
        assert_eq!(serialize_literal(&Literal::Decimal(-0.25)), "-0.25");
    }

    #[test]
    fn test_alignment_uses_display_width() {
        let document = Document {
            entities: vec![Entity {
                name: "ユーザー".to_string(),
                columns: vec![
                    column("名前", "string", vec![]),
                    column("id", "uuid", vec![ColumnModifier::Pk]),
                ],
                hints: vec![],
            }],
        };

        let result = serialize(&document);
        assert!(result.contains("    名前 string\n"));
        assert!(result.contains("    id   uuid pk\n"));
    }

    #[test]
    fn test_quoted_names_and_strings_read_back() {
        let document = Document {
            entities: vec![Entity {
                name: "Order Item".to_string(),
                columns: vec![column(
                    "note",
                    "string",
                    vec![
                        ColumnModifier::Doc("says \"hi\"".to_string()),
                        ColumnModifier::Pk,
                    ],
                )],
                hints: vec![Hint {
                    key: "map".to_string(),
                    value: HintValue::Str("order_items".to_string()),
                }],
            }],
        };

        let text = serialize(&document);
        assert!(text.starts_with("entity \"Order Item\" {"));
        let parsed = Parser::new(&text).unwrap().parse().unwrap();
        let entity = &parsed.entities[0];
        assert_eq!(entity.name, "Order Item");
        assert_eq!(
            entity.columns[0].modifiers,
            vec![
                ColumnModifier::Pk,
                ColumnModifier::Doc("says \"hi\"".to_string())
            ]
        );
    }
}
