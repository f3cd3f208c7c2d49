pub mod compiler;
pub mod config;
pub mod document;
pub mod dsl;
pub mod editor;
pub mod error;
pub mod id;
pub mod junction;
pub mod model;
pub mod mutation;
pub mod projection;
pub mod reconcile;
pub mod session;
pub mod worker;

use wasm_bindgen::prelude::*;

use config::EditorConfig;
use error::SchemaError;
use model::Snapshot;
use projection::Canvas;

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Serialize a `{ tables, joins }` or `{ nodes, edges }` document to source text
#[wasm_bindgen(js_name = "schemaToSource")]
pub fn schema_to_source(document_json: &str) -> Result<String, JsValue> {
    let imported = document::import_document(document_json).map_err(to_js)?;
    Ok(dsl::to_source(&imported.snapshot))
}

/// Parse source text into a `{ nodes, edges }` document.
///
/// With a previous document, tables and columns matched by name keep their ids and positions.
#[wasm_bindgen(js_name = "sourceToSchema")]
pub fn source_to_schema(
    source: &str,
    previous_document_json: Option<String>,
) -> Result<String, JsValue> {
    let config = EditorConfig::default();
    let parsed = dsl::from_source(source)
        .map_err(SchemaError::from)
        .map_err(to_js)?;

    let (previous, canvas) = match previous_document_json.as_deref() {
        Some(json) if !json.trim().is_empty() => {
            let imported = document::import_document(json).map_err(to_js)?;
            (imported.snapshot, imported.canvas)
        }
        _ => (Snapshot::default(), Canvas::default()),
    };

    let reconciled = reconcile::reconcile(&previous, &canvas, parsed, config.position_step)
        .map_err(to_js)?;
    document::export_flow(&reconciled.snapshot, &reconciled.canvas, config.position_step)
        .map_err(|e| js_sys::Error::new(&e.to_string()).into())
}

fn to_js(error: SchemaError) -> JsValue {
    js_sys::Error::new(&error.to_string()).into()
}
