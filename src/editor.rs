//! Editor: the live snapshot and everything attached to it.
//!
//! Events come in one at a time; each either replaces the snapshot whole or leaves it as it
//! was. Errors never escape as failures of the editor itself: stale intents are dropped quietly
//! and everything else becomes a [`Notice`].

use crate::config::EditorConfig;
use crate::document::{self, Imported};
use crate::error::{ErrorKind, SchemaError};
use crate::id::TableId;
use crate::model::Snapshot;
use crate::mutation::{self, Effect, Intent};
use crate::projection::{self, Canvas, DetailLevel, GraphEvent, GraphIR, Interpreted, Position};
use crate::reconcile::reconcile;
use crate::session::EditSession;
use crate::worker::{CompileEvent, CompileRequest};
use tracing::{debug, info, warn};

#[cfg(not(target_arch = "wasm32"))]
use crate::dsl::CompileError;
#[cfg(not(target_arch = "wasm32"))]
use crate::worker::CompileWorker;

/// A user-visible, non-fatal message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Editor {
    config: EditorConfig,
    snapshot: Snapshot,
    canvas: Canvas,
    session: EditSession,
    source: Option<String>,
    /// Bumped whenever the snapshot is replaced.
    revision: u64,
    /// Revision last handed to the compiler for serialization.
    submitted: Option<u64>,
    applied_generation: u64,
    notices: Vec<Notice>,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn from_imported(config: EditorConfig, imported: Imported) -> Self {
        Self {
            config,
            snapshot: imported.snapshot,
            canvas: imported.canvas,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut EditSession {
        &mut self.session
    }

    /// Last successfully compiled source text.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Number of snapshot replacements so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn graph(&self, detail: DetailLevel) -> GraphIR {
        GraphIR::from_snapshot(&self.snapshot, Some(&self.canvas), detail)
    }

    /// Request for compiling the current snapshot.
    pub fn serialize_request(&self) -> CompileRequest {
        CompileRequest::Serialize {
            revision: self.revision,
            snapshot: self.snapshot.clone(),
        }
    }

    /// Request for parsing source text edited against the current snapshot.
    pub fn parse_request(&self, source: String) -> CompileRequest {
        CompileRequest::Parse {
            revision: self.revision,
            source,
        }
    }

    /// Create a table. Without a name it is called `{prefix}{n}`.
    pub fn create_table(&mut self, name: Option<&str>) -> Option<TableId> {
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.unused_table_name(),
        };
        let intent = Intent::CreateTable {
            name,
            key_type: self.config.primary_key_type.data_type(),
        };
        match self.apply(intent) {
            Some(Effect::TableCreated(id)) => Some(id),
            _ => None,
        }
    }

    fn unused_table_name(&self) -> String {
        (self.snapshot.tables.len() + 1..)
            .map(|n| format!("{}{}", self.config.table_name_prefix, n))
            .find(|name| self.snapshot.table_by_name(name).is_none())
            .unwrap_or_else(|| self.config.table_name_prefix.clone())
    }

    /// Apply one intent. Returns its effect, or `None` if it was rejected.
    pub fn apply(&mut self, intent: Intent) -> Option<Effect> {
        match mutation::apply(&self.snapshot, intent) {
            Ok(outcome) => {
                if let Effect::TableCreated(id) = &outcome.effect {
                    let step = self.config.position_step;
                    let position = Position::offset(self.snapshot.tables.len(), step);
                    self.canvas.place(id.clone(), position);
                }
                self.replace(outcome.snapshot);
                Some(outcome.effect)
            }
            Err(e) => {
                self.report(e);
                None
            }
        }
    }

    /// Handle a graph gesture. Returns whether the snapshot changed.
    pub fn handle(&mut self, event: GraphEvent) -> bool {
        match projection::interpret(event, &self.config) {
            Interpreted::Intent(intent) => {
                let before = self.snapshot.clone();
                match self.apply(intent) {
                    Some(Effect::JoinCreated(join)) => {
                        if let Err(e) = self.session.open_join(&self.snapshot, &join) {
                            self.report(e);
                        }
                    }
                    Some(_) => {}
                    None => return false,
                }
                self.snapshot != before
            }
            Interpreted::Select(join) => {
                if let Err(e) = self.session.open_join(&self.snapshot, &join) {
                    self.report(e);
                }
                false
            }
            Interpreted::Move { table, position } => {
                if self.snapshot.table(&table).is_some() {
                    self.canvas.place(table, position);
                }
                false
            }
        }
    }

    pub fn commit_column(&mut self) -> bool {
        match self.session.commit_column(&self.snapshot) {
            Ok(next) => {
                self.replace(next);
                true
            }
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    pub fn commit_join(&mut self) -> bool {
        match self.session.commit_join(&self.snapshot) {
            Ok((next, configured)) => {
                info!(?configured, "join configured");
                self.replace(next);
                true
            }
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    /// Apply a compiler result unless a newer one was already applied.
    ///
    /// Results computed against an older revision of the model are dropped, so an edit made
    /// while a parse was in flight is never overwritten. Returns whether the snapshot changed.
    pub fn apply_compile_event(&mut self, event: CompileEvent) -> bool {
        let generation = event.generation();
        if generation <= self.applied_generation {
            debug!(
                generation,
                applied = self.applied_generation,
                "ignored stale compile event"
            );
            return false;
        }
        self.applied_generation = generation;

        match event {
            CompileEvent::Source { revision, text, .. } => {
                if revision < self.revision {
                    debug!(revision, current = self.revision, "ignored outdated source");
                    return false;
                }
                self.source = Some(text);
                false
            }
            CompileEvent::Parsed {
                revision, snapshot, ..
            } => {
                if revision != self.revision {
                    debug!(
                        revision,
                        current = self.revision,
                        "dropped parse of an outdated model"
                    );
                    return false;
                }
                match reconcile(&self.snapshot, &self.canvas, snapshot, self.config.position_step) {
                    Ok(reconciled) => {
                        self.canvas = reconciled.canvas;
                        self.replace(reconciled.snapshot);
                        true
                    }
                    Err(e) => {
                        self.report(e);
                        false
                    }
                }
            }
            CompileEvent::Failed { error, .. } => {
                self.report(SchemaError::Compiler(error));
                false
            }
        }
    }

    /// Replace the live snapshot with an imported document. A bad document changes nothing.
    pub fn import(&mut self, json: &str) -> bool {
        match document::import_document(json) {
            Ok(imported) => {
                self.canvas = imported.canvas;
                self.replace(imported.snapshot);
                true
            }
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    pub fn export_schema(&self) -> serde_json::Result<String> {
        document::export_schema(&self.snapshot)
    }

    pub fn export_flow(&self) -> serde_json::Result<String> {
        document::export_flow(&self.snapshot, &self.canvas, self.config.position_step)
    }

    fn replace(&mut self, next: Snapshot) {
        self.snapshot = next;
        self.revision += 1;
        self.canvas.retain_tables(&self.snapshot);
        self.session.forget_missing(&self.snapshot);
    }

    fn report(&mut self, error: SchemaError) {
        if !error.is_user_visible() {
            debug!(error = %error, "ignored invalid intent");
            return;
        }
        warn!(error = %error, "edit rejected");
        self.notices.push(Notice {
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Editor {
    /// Hand the current snapshot to the worker unless this revision was already handed over.
    /// Returns the generation of the new request, if one was made.
    pub fn sync(&mut self, worker: &CompileWorker) -> Result<Option<u64>, CompileError> {
        if self.submitted == Some(self.revision) {
            return Ok(None);
        }
        let generation = worker.submit(self.serialize_request())?;
        self.submitted = Some(self.revision);
        Ok(Some(generation))
    }

    /// Send edited source text to the worker for parsing.
    pub fn submit_source(
        &self,
        worker: &CompileWorker,
        source: String,
    ) -> Result<u64, CompileError> {
        worker.submit(self.parse_request(source))
    }
}
