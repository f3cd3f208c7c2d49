//! Relational model: tables, columns and joins, plus the invariants every
//! snapshot has to satisfy.

use crate::error::{SchemaError, SchemaResult};
use crate::id::{ColumnId, JoinId, TableId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub const DEFAULT_STRING_LENGTH: u32 = 255;

fn default_length() -> u32 {
    DEFAULT_STRING_LENGTH
}

/// Column data type. Type-dependent attributes only exist on the variant they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataType", rename_all = "camelCase")]
pub enum DataType {
    String {
        #[serde(default = "default_length")]
        length: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collation: Option<String>,
    },
    Number,
    Date,
    Json,
    Float {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        precision: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scale: Option<u32>,
    },
    Uuid,
    ObjectId,
}

impl DataType {
    pub fn string() -> Self {
        Self::String {
            length: DEFAULT_STRING_LENGTH,
            collation: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String { .. } => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Json => "json",
            Self::Float { .. } => "float",
            Self::Uuid => "uuid",
            Self::ObjectId => "objectId",
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[serde(rename = "CASCADE")]
    Cascade,
    #[serde(rename = "SET NULL")]
    SetNull,
    #[serde(rename = "RESTRICT")]
    Restrict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl JoinKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTarget {
    pub table: TableId,
    /// Unset only while the join is pending.
    #[serde(default)]
    pub column: Option<ColumnId>,
}

/// Names one foreign key inside a junction table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JunctionColumn {
    pub name: String,
    pub referenced_column_name: String,
}

/// A relationship between two tables.
///
/// The record held by the referencing table (`source`) is the owning record: it sits on the
/// foreign-key column once configured, or in the table's `joins` while pending. The referenced
/// table may hold a mirror with the same id and no `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Join {
    pub id: JoinId,
    #[serde(rename = "type")]
    pub kind: JoinKind,
    pub source: TableId,
    #[serde(default)]
    pub target: Option<JoinTarget>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    #[serde(default)]
    pub through: Option<String>,
    #[serde(default)]
    pub join_column: Option<JunctionColumn>,
    #[serde(default)]
    pub inverse_column: Option<JunctionColumn>,
}

impl Join {
    pub fn is_self_join(&self) -> bool {
        self.target.as_ref().is_some_and(|t| t.table == self.source)
    }

    /// Mirror record for the referenced table.
    pub fn mirror(&self) -> Join {
        Join {
            target: None,
            join_column: None,
            inverse_column: None,
            ..self.clone()
        }
    }

    /// Whether a mirror agrees with this record on the shared metadata.
    pub fn agrees_with(&self, other: &Join) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.on_delete == other.on_delete
            && self.on_update == other.on_update
            && self.through == other.through
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: ColumnId,
    pub table_id: TableId,
    pub name: String,
    #[serde(default)]
    pub storage_name: String,
    #[serde(flatten)]
    pub data_type: DataType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub index: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default)]
    pub default_value: Option<DefaultValue>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub foreign_key: Option<Join>,
}

impl Column {
    pub fn new(table_id: &TableId, name: &str) -> Self {
        Self {
            id: ColumnId::generate(),
            table_id: table_id.clone(),
            name: name.to_string(),
            storage_name: name.to_string(),
            data_type: DataType::string(),
            primary_key: false,
            unique: false,
            index: false,
            nullable: false,
            auto_increment: false,
            default_value: None,
            description: String::new(),
            foreign_key: None,
        }
    }

    /// Clear flag combinations that cannot hold together.
    pub fn normalize(&mut self) {
        if self.auto_increment && !(self.primary_key && self.data_type.is_number()) {
            self.auto_increment = false;
        }
        if self.unique || self.primary_key {
            self.nullable = false;
        }
        // A scale is only meaningful next to a precision.
        if let DataType::Float {
            precision: None,
            scale,
        } = &mut self.data_type
        {
            *scale = None;
        }
    }

    fn check(&self) -> SchemaResult<()> {
        let fail = |what: &str| {
            Err(SchemaError::InvariantViolation(format!(
                "column {} ({}) {}",
                self.name, self.id, what
            )))
        };
        if self.auto_increment && !(self.primary_key && self.data_type.is_number()) {
            return fail("auto-increments without being a numeric primary key");
        }
        if self.unique && self.nullable {
            return fail("is unique and nullable");
        }
        if self.primary_key && self.nullable {
            return fail("is a nullable primary key");
        }
        if let DataType::Float {
            precision: None,
            scale: Some(_),
        } = self.data_type
        {
            return fail("has a float scale without a precision");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub id: TableId,
    pub name: String,
    #[serde(default)]
    pub storage_name: String,
    #[serde(rename = "primaryKeyColumnId", default)]
    pub primary_key: Option<ColumnId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub joins: Vec<Join>,
}

impl Table {
    /// A table seeded with a single `id` primary key column.
    pub fn new(name: &str, key_type: DataType) -> Self {
        let id = TableId::generate();
        let mut key = Column::new(&id, "id");
        key.data_type = key_type;
        key.primary_key = true;
        let key_id = key.id.clone();
        Self {
            id,
            name: name.to_string(),
            storage_name: String::new(),
            primary_key: Some(key_id),
            description: String::new(),
            columns: vec![key],
            joins: Vec::new(),
        }
    }

    pub fn column(&self, id: &ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Column a new foreign key should reference: the first column that is a primary key or
    /// unique.
    pub fn key_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key || c.unique)
    }

    /// `base`, or `base2`, `base3`, ... whichever is not yet a column name.
    pub fn free_column_name(&self, base: &str) -> String {
        if self.column_by_name(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}{}", base, n))
            .find(|name| self.column_by_name(name).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    fn check(&self) -> SchemaResult<()> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(&column.id) {
                return Err(SchemaError::InvariantViolation(format!(
                    "duplicate column id {} in table {}",
                    column.id, self.name
                )));
            }
            if column.table_id != self.id {
                return Err(SchemaError::InvariantViolation(format!(
                    "column {} claims table {} but lives in {}",
                    column.name, column.table_id, self.id
                )));
            }
            column.check()?;
        }

        if self.columns.is_empty() {
            return Ok(());
        }
        let keys: Vec<&Column> = self.columns.iter().filter(|c| c.primary_key).collect();
        match keys.as_slice() {
            [key] if self.primary_key.as_ref() == Some(&key.id) => Ok(()),
            [_] => Err(SchemaError::InvariantViolation(format!(
                "table {} primary key id does not match its key column",
                self.name
            ))),
            _ => Err(SchemaError::InvariantViolation(format!(
                "table {} has {} primary key columns",
                self.name,
                keys.len()
            ))),
        }
    }
}

/// An owning join record and where it lives.
#[derive(Debug, Clone, Copy)]
pub struct OwnedJoin<'a> {
    pub holder: &'a Table,
    /// Foreign-key column carrying the join; `None` while pending.
    pub column: Option<&'a Column>,
    pub join: &'a Join,
}

impl OwnedJoin<'_> {
    pub fn is_configured(&self) -> bool {
        self.column.is_some()
    }

    /// The other endpoint: the referenced table.
    pub fn peer(&self) -> Option<&TableId> {
        self.join.target.as_ref().map(|t| &t.table)
    }
}

/// The complete relational state at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tables: Vec<Table>,
}

impl Snapshot {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    pub fn table(&self, id: &TableId) -> Option<&Table> {
        self.tables.iter().find(|t| &t.id == id)
    }

    pub fn table_mut(&mut self, id: &TableId) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| &t.id == id)
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn require_table(&self, id: &TableId) -> SchemaResult<&Table> {
        self.table(id).ok_or_else(|| SchemaError::UnknownTable(id.clone()))
    }

    /// `base`, or `base2`, `base3`, ... whichever is not yet a table name.
    pub fn free_table_name(&self, base: &str) -> String {
        if self.table_by_name(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}{}", base, n))
            .find(|name| self.table_by_name(name).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// The foreign-key column carrying `join`, with its table.
    pub fn find_foreign_key(&self, join: &JoinId) -> Option<(&Table, &Column)> {
        self.tables.iter().find_map(|t| {
            t.columns
                .iter()
                .find(|c| c.foreign_key.as_ref().is_some_and(|fk| &fk.id == join))
                .map(|c| (t, c))
        })
    }

    /// The pending owning record of `join`, with the table holding it.
    pub fn find_pending(&self, join: &JoinId) -> Option<(&Table, &Join)> {
        self.tables.iter().find_map(|t| {
            t.joins
                .iter()
                .find(|j| &j.id == join && j.source == t.id)
                .map(|j| (t, j))
        })
    }

    /// Mirror records of `join`, with the tables holding them.
    pub fn mirrors(&self, join: &JoinId) -> Vec<(&Table, &Join)> {
        self.tables
            .iter()
            .flat_map(|t| {
                t.joins
                    .iter()
                    .filter(move |j| &j.id == join && j.source != t.id)
                    .map(move |j| (t, j))
            })
            .collect()
    }

    /// Every owning join record, configured ones first per table, in table order.
    pub fn owning_joins(&self) -> Vec<OwnedJoin<'_>> {
        let mut out = Vec::new();
        for table in &self.tables {
            for column in &table.columns {
                if let Some(join) = &column.foreign_key {
                    out.push(OwnedJoin {
                        holder: table,
                        column: Some(column),
                        join,
                    });
                }
            }
            for join in table.joins.iter().filter(|j| j.source == table.id) {
                out.push(OwnedJoin {
                    holder: table,
                    column: None,
                    join,
                });
            }
        }
        out
    }

    pub fn contains_join(&self, join: &JoinId) -> bool {
        self.owning_joins().iter().any(|o| &o.join.id == join)
    }

    /// Ids of all joins with `table` as an endpoint.
    pub fn joins_touching(&self, table: &TableId) -> BTreeSet<JoinId> {
        let mut ids = BTreeSet::new();
        for owned in self.owning_joins() {
            if &owned.holder.id == table || owned.peer() == Some(table) {
                ids.insert(owned.join.id.clone());
            }
        }
        if let Some(t) = self.table(table) {
            ids.extend(t.joins.iter().map(|j| j.id.clone()));
        }
        ids
    }

    /// Check every structural invariant.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut table_ids = HashSet::new();
        let mut table_names = HashSet::new();
        for table in &self.tables {
            if !table_ids.insert(&table.id) {
                return Err(SchemaError::InvariantViolation(format!(
                    "duplicate table id {}",
                    table.id
                )));
            }
            if !table_names.insert(table.name.as_str()) {
                return Err(SchemaError::InvariantViolation(format!(
                    "duplicate table name {}",
                    table.name
                )));
            }
            table.check()?;
        }

        let mut owners: BTreeMap<&JoinId, &Join> = BTreeMap::new();
        for owned in self.owning_joins() {
            let join = owned.join;
            if owners.insert(&join.id, join).is_some() {
                return Err(SchemaError::InvariantViolation(format!(
                    "join {} has more than one owning record",
                    join.id
                )));
            }
            if join.source != owned.holder.id {
                return Err(SchemaError::InvariantViolation(format!(
                    "join {} source does not match table {}",
                    join.id, owned.holder.name
                )));
            }
            if let Some(target) = &join.target {
                let peer = self.table(&target.table).ok_or_else(|| {
                    SchemaError::InvariantViolation(format!(
                        "join {} references missing table {}",
                        join.id, target.table
                    ))
                })?;
                if let Some(column) = &target.column {
                    if peer.column(column).is_none() {
                        return Err(SchemaError::InvariantViolation(format!(
                            "join {} references missing column {} on {}",
                            join.id, column, peer.name
                        )));
                    }
                }
            }
            if owned.is_configured() {
                let complete = join.target.as_ref().is_some_and(|t| t.column.is_some());
                if !complete || join.kind == JoinKind::ManyToMany {
                    return Err(SchemaError::InvariantViolation(format!(
                        "foreign key {} is not a configured non many-to-many join",
                        join.id
                    )));
                }
            }
        }

        let mut mirrored = HashSet::new();
        for table in &self.tables {
            for mirror in table.joins.iter().filter(|j| j.source != table.id) {
                let owner = owners.get(&mirror.id).ok_or_else(|| {
                    SchemaError::InvariantViolation(format!(
                        "mirror {} on {} has no owning record",
                        mirror.id, table.name
                    ))
                })?;
                if !mirrored.insert(&mirror.id) {
                    return Err(SchemaError::InvariantViolation(format!(
                        "join {} is mirrored more than once",
                        mirror.id
                    )));
                }
                if mirror.source != owner.source || !owner.agrees_with(mirror) {
                    return Err(SchemaError::InvariantViolation(format!(
                        "mirror {} on {} disagrees with its owning record",
                        mirror.id, table.name
                    )));
                }
            }
        }
        Ok(())
    }
}
