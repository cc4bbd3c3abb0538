use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::{PgpipeError, Result};
use crate::core::models::operation::ContentKind;

/// A binary attachment descriptor, in the host's camelCase shape.
///
/// Either `data` (base64 bytes held in memory) or `id` (a handle the
/// attachment store can open as a stream) carries the content. When both
/// are present the stream handle wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// How an attachment's bytes are accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMode {
    /// Fully materialized in memory (`data`).
    Buffered,
    /// Read incrementally from a store handle (`id`).
    Streamed,
}

impl BinaryData {
    /// The access strategy declared by this descriptor.
    pub fn mode(&self) -> Result<PayloadMode> {
        match (&self.id, &self.data) {
            (Some(_), _) => Ok(PayloadMode::Streamed),
            (None, Some(_)) => Ok(PayloadMode::Buffered),
            (None, None) => Err(PgpipeError::InvalidItem {
                detail: "binary attachment has neither 'data' nor 'id'".into(),
            }),
        }
    }
}

/// Per-item parameter overrides. Unset fields fall back to batch defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemParams {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_property_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_binary_property_name: Option<String>,
}

/// One input item as read from the batch file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub json: Map<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub binary: BTreeMap<String, BinaryData>,
    #[serde(default, skip_serializing_if = "is_default_params")]
    pub params: ItemParams,
}

fn is_default_params(params: &ItemParams) -> bool {
    *params == ItemParams::default()
}
