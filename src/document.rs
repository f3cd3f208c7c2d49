//! JSON documents for storage and file import/export.
//!
//! Two shapes are accepted: the relational `{ tables, joins }` and the graph
//! `{ nodes, edges }`. Joins and edges are derived data; they are written for readers but the
//! tables alone define the snapshot on import.

use crate::error::{SchemaError, SchemaResult};
use crate::id::TableId;
use crate::model::{Join, Snapshot, Table};
use crate::projection::{Canvas, DetailLevel, Edge, GraphIR, Position};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: TableId,
    pub position: Position,
    pub data: Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDocument {
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone)]
pub struct Imported {
    pub snapshot: Snapshot,
    pub canvas: Canvas,
}

impl SchemaDocument {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            tables: snapshot.tables.clone(),
            joins: snapshot
                .owning_joins()
                .iter()
                .map(|owned| owned.join.clone())
                .collect(),
        }
    }
}

impl FlowDocument {
    /// Tables without a canvas position are placed on the offset diagonal.
    pub fn from_snapshot(snapshot: &Snapshot, canvas: &Canvas, step: f64) -> Self {
        let nodes = snapshot
            .tables
            .iter()
            .enumerate()
            .map(|(i, table)| FlowNode {
                id: table.id.clone(),
                position: canvas
                    .position(&table.id)
                    .unwrap_or_else(|| Position::offset(i, step)),
                data: table.clone(),
            })
            .collect();
        let edges = GraphIR::from_snapshot(snapshot, Some(canvas), DetailLevel::Tables).edges;
        Self { nodes, edges }
    }
}

/// Read either document shape. Nothing is returned unless the whole document is valid.
pub fn import_document(json: &str) -> SchemaResult<Imported> {
    let value: Value = serde_json::from_str(json).map_err(|e| format_error(e.to_string()))?;
    let has = |key: &str| value.get(key).is_some();

    let imported = if has("tables") || has("joins") {
        let document: SchemaDocument =
            serde_json::from_value(value).map_err(|e| format_error(e.to_string()))?;
        let snapshot = Snapshot::new(document.tables);
        if let Some(stray) = document
            .joins
            .iter()
            .find(|j| !snapshot.contains_join(&j.id))
        {
            return Err(format_error(format!(
                "join {} is not carried by any table",
                stray.id
            )));
        }
        Imported {
            snapshot,
            canvas: Canvas::default(),
        }
    } else if has("nodes") || has("edges") {
        let document: FlowDocument =
            serde_json::from_value(value).map_err(|e| format_error(e.to_string()))?;
        let mut canvas = Canvas::default();
        let mut tables = Vec::with_capacity(document.nodes.len());
        for node in document.nodes {
            if node.id != node.data.id {
                return Err(format_error(format!(
                    "node {} holds table {}",
                    node.id, node.data.id
                )));
            }
            canvas.place(node.id, node.position);
            tables.push(node.data);
        }
        Imported {
            snapshot: Snapshot::new(tables),
            canvas,
        }
    } else {
        return Err(format_error(
            "expected either tables/joins or nodes/edges".to_string(),
        ));
    };

    imported
        .snapshot
        .validate()
        .map_err(|e| format_error(e.to_string()))?;
    info!(tables = imported.snapshot.tables.len(), "imported document");
    Ok(imported)
}

fn format_error(message: String) -> SchemaError {
    warn!(error = %message, "rejected document");
    SchemaError::ImportFormat(message)
}

pub fn export_schema(snapshot: &Snapshot) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&SchemaDocument::from_snapshot(snapshot))
}

pub fn export_flow(snapshot: &Snapshot, canvas: &Canvas, step: f64) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&FlowDocument::from_snapshot(snapshot, canvas, step))
}
