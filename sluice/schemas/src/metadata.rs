//! Metadata entries attached to materializations and expectation results.

use bon::Builder;
use serde::{Deserialize, Serialize};

/// A labelled metadata value
///
/// # Examples
///
/// ```
/// use sluice_schemas::{MetadataEntry, MetadataValue};
///
/// let rows = MetadataEntry::builder()
///     .label("row_count".to_string())
///     .value(MetadataValue::Int { int_value: Some(1024), int_repr: "1024".to_string() })
///     .build();
///
/// assert!(rows.value.is_numeric());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "snake_case")]
pub struct MetadataEntry {
    /// Label of the entry, used as series name when the value is numeric
    pub label: String,

    /// Optional human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The typed value of the entry
    #[serde(flatten)]
    pub value: MetadataValue,
}

/// Typed metadata payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataValue {
    Text {
        text: String,
    },
    Url {
        url: String,
    },
    Path {
        path: String,
    },
    Json {
        json_string: String,
    },
    Markdown {
        md_str: String,
    },
    /// Integer value. Values outside the 53-bit range arrive with `int_value`
    /// unset and only the string representation filled in.
    Int {
        #[serde(default)]
        int_value: Option<i64>,
        int_repr: String,
    },
    Float {
        #[serde(default)]
        float_value: Option<f64>,
    },
}

impl MetadataValue {
    /// Whether this entry contributes to numeric series
    pub fn is_numeric(&self) -> bool {
        matches!(self, MetadataValue::Int { .. } | MetadataValue::Float { .. })
    }
}
