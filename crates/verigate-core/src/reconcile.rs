//! Field-level reconciliation of extracted document data against registry data.
//!
//! Both sides are free-form JSON objects. The extracted side uses canonical
//! field names; the registry side may use its own names, so each canonical
//! field carries an ordered list of registry keys to try.

use serde_json::{Map, Value};

use crate::model::ValidationReport;

/// Placeholder shown for a value missing on either side.
pub const NOT_AVAILABLE: &str = "N/A";

/// A canonical comparison field and its registry lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonField {
    pub name: &'static str,
    pub registry_keys: &'static [&'static str],
}

/// Comparison fields in display order.
pub const COMPARISON_FIELDS: [ComparisonField; 5] = [
    ComparisonField {
        name: "full_name",
        registry_keys: &["provider_name", "full_name"],
    },
    ComparisonField {
        name: "npi",
        registry_keys: &["npi_number", "npi"],
    },
    ComparisonField {
        name: "specialty",
        registry_keys: &["primary_specialty", "specialty"],
    },
    ComparisonField {
        name: "address",
        registry_keys: &["address"],
    },
    ComparisonField {
        name: "license",
        registry_keys: &["license"],
    },
];

/// One row of the source-vs-registry comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldComparison {
    pub field: &'static str,
    pub extracted: String,
    pub registry: String,
}

impl FieldComparison {
    /// Both sides known and textually different, ignoring case and
    /// surrounding whitespace.
    pub fn differs(&self) -> bool {
        self.extracted != NOT_AVAILABLE
            && self.registry != NOT_AVAILABLE
            && !self
                .extracted
                .trim()
                .eq_ignore_ascii_case(self.registry.trim())
    }
}

/// Map both payloads onto the canonical field list.
pub fn reconcile(extracted: &Map<String, Value>, registry: &Map<String, Value>) -> Vec<FieldComparison> {
    COMPARISON_FIELDS
        .iter()
        .map(|field| FieldComparison {
            field: field.name,
            extracted: lookup(extracted, &[field.name]),
            registry: lookup(registry, field.registry_keys),
        })
        .collect()
}

/// Reconcile a report, treating missing payloads as empty objects.
pub fn reconcile_report(report: &ValidationReport) -> Vec<FieldComparison> {
    let empty = Map::new();
    reconcile(
        report.extracted_data.as_ref().unwrap_or(&empty),
        report.registry_data.as_ref().unwrap_or(&empty),
    )
}

fn lookup(data: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| data.get(*key).and_then(display_value))
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Text for a JSON value, or `None` when the value counts as absent (null or
/// an empty string). Strings are returned without quotes; other values use
/// their JSON text.
pub(crate) fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
