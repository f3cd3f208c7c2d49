#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub columns: Vec<Column>,
    pub hints: Vec<Hint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub typ: TypeRef,
    pub modifiers: Vec<ColumnModifier>,
}

/// Type name with optional arguments: `string(64)`, `float(10, 2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnModifier {
    Pk,
    Unique,
    Index,
    Null,
    NotNull,
    Increment,
    Default(Literal),
    Map(String),
    Collate(String),
    Doc(String),
    Fk(ForeignKeyRef),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Decimal(f64),
    Str(String),
    /// Bare word or call, e.g. `true`, `now()`.
    Ident(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyRef {
    pub target: String,
    pub column: String,
    pub options: Vec<FkOption>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FkOption {
    Kind(String),
    OnDelete(String),
    OnUpdate(String),
    Through(String),
    /// `join = studentId -> id`
    JoinColumn { name: String, referenced: String },
    /// `inverse = courseId -> id`
    InverseColumn { name: String, referenced: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hint {
    pub key: String,
    pub value: HintValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HintValue {
    Int(i64),
    Str(String),
    Ident(String),
}

impl Entity {
    pub fn hint(&self, key: &str) -> Option<&HintValue> {
        self.hints.iter().find(|h| h.key == key).map(|h| &h.value)
    }
}

impl HintValue {
    pub fn as_text(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Str(s) | Self::Ident(s) => s.clone(),
        }
    }
}
