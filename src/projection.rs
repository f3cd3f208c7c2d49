//! Graph projection: the node/edge view of a snapshot, and graph gestures read back as intents.

use crate::config::EditorConfig;
use crate::id::{ColumnId, JoinId, TableId};
use crate::model::{JoinKind, OwnedJoin, Snapshot};
use crate::mutation::Intent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    Tables,
    Pk,
    PkFk,
    All,
}

impl DetailLevel {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tables" => Some(Self::Tables),
            "pk" => Some(Self::Pk),
            "pk_fk" => Some(Self::PkFk),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The `index`-th slot on the diagonal used for tables without a known position.
    pub fn offset(index: usize, step: f64) -> Self {
        let d = (index + 1) as f64 * step;
        Self::new(d, d)
    }
}

/// UI-only table positions, kept apart from the relational model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    positions: BTreeMap<TableId, Position>,
}

impl Canvas {
    pub fn position(&self, table: &TableId) -> Option<Position> {
        self.positions.get(table).copied()
    }

    pub fn place(&mut self, table: TableId, position: Position) {
        self.positions.insert(table, position);
    }

    /// Forget positions of tables that no longer exist.
    pub fn retain_tables(&mut self, snapshot: &Snapshot) {
        self.positions.retain(|id, _| snapshot.table(id).is_some());
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Arrowhead at one end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Marker {
    One,
    Many,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphIR {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: TableId,
    pub label: String,
    pub position: Option<Position>,
    pub columns: Vec<ColumnIR>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnIR {
    pub id: ColumnId,
    pub name: String,
    pub typ: String,
    pub is_pk: bool,
    pub is_fk: bool,
}

/// One edge per join. `source` is the referencing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: JoinId,
    pub source: TableId,
    pub target: TableId,
    pub label: String,
    pub source_marker: Marker,
    pub target_marker: Marker,
    pub is_loop: bool,
    pub pending: bool,
}

impl GraphIR {
    pub fn from_snapshot(
        snapshot: &Snapshot,
        canvas: Option<&Canvas>,
        detail: DetailLevel,
    ) -> Self {
        let nodes: Vec<Node> = snapshot
            .tables
            .iter()
            .map(|t| {
                let columns: Vec<ColumnIR> = t
                    .columns
                    .iter()
                    .filter_map(|c| {
                        let is_pk = c.primary_key;
                        let is_fk = c.foreign_key.is_some();

                        let include = match detail {
                            DetailLevel::Tables => false,
                            DetailLevel::Pk => is_pk,
                            DetailLevel::PkFk => is_pk || is_fk,
                            DetailLevel::All => true,
                        };

                        if include {
                            Some(ColumnIR {
                                id: c.id.clone(),
                                name: c.name.clone(),
                                typ: c.data_type.name().to_string(),
                                is_pk,
                                is_fk,
                            })
                        } else {
                            None
                        }
                    })
                    .collect();

                Node {
                    id: t.id.clone(),
                    label: t.name.clone(),
                    position: canvas.and_then(|c| c.position(&t.id)),
                    columns,
                }
            })
            .collect();

        let edges: Vec<Edge> = snapshot
            .owning_joins()
            .iter()
            .filter_map(Edge::from_owned)
            .collect();

        GraphIR { nodes, edges }
    }
}

impl Edge {
    fn from_owned(owned: &OwnedJoin<'_>) -> Option<Self> {
        let join = owned.join;
        let target = owned.peer()?.clone();
        let (source_marker, target_marker) = if owned.is_configured() {
            // The key holder is the "many" end unless the join is one-to-one.
            match join.kind {
                JoinKind::OneToOne => (Marker::One, Marker::One),
                _ => (Marker::Many, Marker::One),
            }
        } else {
            match join.kind {
                JoinKind::OneToOne => (Marker::One, Marker::One),
                JoinKind::OneToMany => (Marker::One, Marker::Many),
                JoinKind::ManyToOne => (Marker::Many, Marker::One),
                JoinKind::ManyToMany => (Marker::Many, Marker::Many),
            }
        };
        Some(Edge {
            id: join.id.clone(),
            source: owned.holder.id.clone(),
            is_loop: target == owned.holder.id,
            target,
            label: join.kind.label().to_string(),
            source_marker,
            target_marker,
            pending: !owned.is_configured(),
        })
    }
}

/// A gesture on the rendered graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    Connect {
        source: TableId,
        target: TableId,
        target_column: Option<ColumnId>,
    },
    Disconnect { edge: JoinId },
    SelectEdge { edge: JoinId },
    Move { table: TableId, position: Position },
}

/// What a graph gesture means for the model.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpreted {
    Intent(Intent),
    Select(JoinId),
    Move { table: TableId, position: Position },
}

pub fn interpret(event: GraphEvent, config: &EditorConfig) -> Interpreted {
    match event {
        GraphEvent::Connect {
            source,
            target,
            target_column,
        } => Interpreted::Intent(Intent::Connect {
            source,
            target,
            target_column,
            on_delete: config.on_delete,
            on_update: config.on_update,
        }),
        GraphEvent::Disconnect { edge } => Interpreted::Intent(Intent::DeleteJoin { join: edge }),
        GraphEvent::SelectEdge { edge } => Interpreted::Select(edge),
        GraphEvent::Move { table, position } => Interpreted::Move { table, position },
    }
}

/// The join record a selected edge stands for.
///
/// Tables are searched in order. A foreign-key column or a referencing-side entry matches first;
/// a self-join entry matches too. Mirrors never match.
pub fn resolve_edge<'a>(snapshot: &'a Snapshot, edge: &JoinId) -> Option<OwnedJoin<'a>> {
    snapshot.tables.iter().find_map(|table| {
        let column = table
            .columns
            .iter()
            .find(|c| c.foreign_key.as_ref().is_some_and(|j| &j.id == edge));
        if let Some(column) = column {
            return column.foreign_key.as_ref().map(|join| OwnedJoin {
                holder: table,
                column: Some(column),
                join,
            });
        }
        table
            .joins
            .iter()
            .find(|j| &j.id == edge && (j.source == table.id || j.is_self_join()))
            .map(|join| OwnedJoin {
                holder: table,
                column: None,
                join,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, ReferentialAction};
    use crate::mutation::{JoinConfig, configure_join, connect, create_table};

    fn user_post() -> (Snapshot, TableId, TableId, JoinId) {
        let s = Snapshot::default();
        let (s, user) = create_table(&s, "User", DataType::Uuid).unwrap();
        let (s, post) = create_table(&s, "Post", DataType::Uuid).unwrap();
        let (s, join) = connect(
            &s,
            &user,
            &post,
            None,
            ReferentialAction::Cascade,
            ReferentialAction::Cascade,
        )
        .unwrap();
        (s, user, post, join)
    }

    fn configure(s: &Snapshot, join: &JoinId, kind: JoinKind) -> Snapshot {
        let (_, pending) = s.find_pending(join).unwrap();
        let mut config = JoinConfig::from_join(pending).unwrap();
        config.kind = kind;
        configure_join(s, join, &config).unwrap().0
    }

    #[test]
    fn test_detail_levels() {
        let (s, _, post, join) = user_post();
        let s = configure(&s, &join, JoinKind::OneToMany);
        let (s, _) = crate::mutation::add_column(&s, &post, "title").unwrap();

        let all = GraphIR::from_snapshot(&s, None, DetailLevel::All);
        let post_node = all.nodes.iter().find(|n| n.id == post).unwrap();
        assert_eq!(post_node.columns.len(), 3);

        let keys = GraphIR::from_snapshot(&s, None, DetailLevel::PkFk);
        let post_node = keys.nodes.iter().find(|n| n.id == post).unwrap();
        assert_eq!(post_node.columns.len(), 2);

        let pk = GraphIR::from_snapshot(&s, None, DetailLevel::Pk);
        assert!(pk.nodes.iter().all(|n| n.columns.len() == 1));

        let tables = GraphIR::from_snapshot(&s, None, DetailLevel::Tables);
        assert!(tables.nodes.iter().all(|n| n.columns.is_empty()));
    }

    #[test]
    fn test_one_edge_per_join_with_markers() {
        let (s, user, post, join) = user_post();
        let pending = GraphIR::from_snapshot(&s, None, DetailLevel::All);
        assert_eq!(pending.edges.len(), 1);
        assert!(pending.edges[0].pending);
        assert_eq!(pending.edges[0].source, user);

        let s = configure(&s, &join, JoinKind::OneToMany);
        let ir = GraphIR::from_snapshot(&s, None, DetailLevel::All);
        assert_eq!(ir.edges.len(), 1);
        let edge = &ir.edges[0];
        assert_eq!(edge.id, join);
        assert_eq!(edge.source, post);
        assert_eq!(edge.target, user);
        assert_eq!(edge.source_marker, Marker::Many);
        assert_eq!(edge.target_marker, Marker::One);
        assert_eq!(edge.label, "one-to-many");
        assert!(!edge.pending);
    }

    #[test]
    fn test_self_join_is_a_loop() {
        let s = Snapshot::default();
        let (s, a) = create_table(&s, "Category", DataType::Uuid).unwrap();
        let (s, join) = connect(
            &s,
            &a,
            &a,
            None,
            ReferentialAction::Cascade,
            ReferentialAction::Cascade,
        )
        .unwrap();
        let s = configure(&s, &join, JoinKind::ManyToOne);
        let ir = GraphIR::from_snapshot(&s, None, DetailLevel::All);
        assert_eq!(ir.edges.len(), 1);
        assert!(ir.edges[0].is_loop);

        let resolved = resolve_edge(&s, &join).unwrap();
        assert_eq!(resolved.holder.id, a);
        assert!(resolved.is_configured());
    }

    #[test]
    fn test_resolve_edge_skips_mirror() {
        let (s, user, post, join) = user_post();
        let resolved = resolve_edge(&s, &join).unwrap();
        assert_eq!(resolved.holder.id, user);
        assert!(!resolved.is_configured());

        let s = configure(&s, &join, JoinKind::OneToMany);
        let resolved = resolve_edge(&s, &join).unwrap();
        assert_eq!(resolved.holder.id, post);
        assert_eq!(resolved.column.unwrap().name, "userId");
        assert!(resolve_edge(&s, &JoinId::from("nope")).is_none());
    }

    #[test]
    fn test_interpret_uses_configured_actions() {
        let config = EditorConfig {
            on_delete: ReferentialAction::Restrict,
            ..EditorConfig::default()
        };
        let event = GraphEvent::Connect {
            source: TableId::from("a"),
            target: TableId::from("b"),
            target_column: None,
        };
        match interpret(event, &config) {
            Interpreted::Intent(Intent::Connect { on_delete, .. }) => {
                assert_eq!(on_delete, ReferentialAction::Restrict)
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            interpret(
                GraphEvent::Disconnect {
                    edge: JoinId::from("a->b")
                },
                &config
            ),
            Interpreted::Intent(Intent::DeleteJoin {
                join: JoinId::from("a->b")
            })
        );
    }

    #[test]
    fn test_canvas_positions() {
        let (s, user, post, _) = user_post();
        let mut canvas = Canvas::default();
        canvas.place(user.clone(), Position::new(1.0, 2.0));
        canvas.place(TableId::from("gone"), Position::offset(0, 10.0));
        canvas.retain_tables(&s);
        assert_eq!(canvas.len(), 1);
        let ir = GraphIR::from_snapshot(&s, Some(&canvas), DetailLevel::Tables);
        assert_eq!(ir.nodes[0].position, Some(Position::new(1.0, 2.0)));
        assert!(ir.nodes.iter().find(|n| n.id == post).unwrap().position.is_none());
        assert_eq!(Position::offset(1, 10.0), Position::new(20.0, 20.0));
    }
}
