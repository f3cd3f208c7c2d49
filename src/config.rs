//! Editor configuration.
//!
//! Every field has a default; a JSON overlay only needs the keys it changes.

use crate::model::{DataType, ReferentialAction};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrimaryKeyType {
    Uuid,
    Number,
}

impl PrimaryKeyType {
    pub fn data_type(self) -> DataType {
        match self {
            Self::Uuid => DataType::Uuid,
            Self::Number => DataType::Number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Quiet period before a compile request is issued.
    pub debounce_ms: u64,
    pub primary_key_type: PrimaryKeyType,
    /// Offset between tables placed without a known position.
    pub position_step: f64,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
    pub table_name_prefix: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            primary_key_type: PrimaryKeyType::Uuid,
            position_step: 10.0,
            on_delete: ReferentialAction::Cascade,
            on_update: ReferentialAction::Cascade,
            table_name_prefix: "Entity_".to_string(),
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_keeps_defaults() {
        let config =
            EditorConfig::from_json_str(r#"{ "debounceMs": 50, "primaryKeyType": "number" }"#)
                .unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(50));
        assert_eq!(config.primary_key_type, PrimaryKeyType::Number);
        assert_eq!(config.position_step, 10.0);
        assert_eq!(config.on_delete, ReferentialAction::Cascade);
    }

    #[test]
    fn test_empty_overlay() {
        let config = EditorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EditorConfig::default());
    }
}
