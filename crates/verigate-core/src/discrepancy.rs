//! Discrepancy entries attached to a validation report.
//!
//! The backend emits three shapes for the same concept: a structured field
//! mismatch (`{field, penalty, extracted, registry}`), a free-form object
//! carrying `reason` or `message`, and a bare string. Entries are resolved into
//! [`Discrepancy`] once, when the payload is decoded, and nulls are dropped
//! there. Object variants keep their raw JSON so re-serialising a report
//! reproduces what the server sent.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::reconcile::{display_value, NOT_AVAILABLE};

/// A structured mismatch between extracted and registry data for one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMismatch {
    pub field: String,
    /// Score deduction in percentage points.
    pub penalty: f64,
    pub extracted: Option<String>,
    pub registry: Option<String>,
    raw: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Discrepancy {
    FieldMismatch(FieldMismatch),
    /// An object without the mismatch shape. `text` is its `reason`, else its
    /// `message`, else the object's JSON text.
    Described { text: String, raw: Map<String, Value> },
    Text(String),
}

/// Display form of a discrepancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDiscrepancy {
    pub headline: String,
    /// `(extracted, registry)` values, present for field mismatches only.
    pub values: Option<(String, String)>,
}

impl Discrepancy {
    /// Resolve one raw entry. Returns `None` for null entries.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(text) => Some(Self::Text(text)),
            Value::Object(map) => Some(Self::from_object(map)),
            other => Some(Self::Text(other.to_string())),
        }
    }

    fn from_object(map: Map<String, Value>) -> Self {
        let field = map
            .get("field")
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty());
        let penalty = map.get("penalty").and_then(penalty_of).filter(|p| *p != 0.0);

        if let (Some(field), Some(penalty)) = (field, penalty) {
            return Self::FieldMismatch(FieldMismatch {
                field: field.to_string(),
                penalty,
                extracted: map.get("extracted").and_then(display_value),
                registry: map.get("registry").and_then(display_value),
                raw: map,
            });
        }

        let text = ["reason", "message"]
            .iter()
            .find_map(|key| map.get(*key).and_then(display_value))
            .unwrap_or_else(|| Value::Object(map.clone()).to_string());
        Self::Described { text, raw: map }
    }

    pub fn render(&self) -> RenderedDiscrepancy {
        match self {
            Self::FieldMismatch(m) => RenderedDiscrepancy {
                headline: format!("{}: mismatch (-{}%)", m.field, format_number(m.penalty)),
                values: Some((
                    m.extracted.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                    m.registry.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                )),
            },
            Self::Described { text, .. } => RenderedDiscrepancy {
                headline: text.clone(),
                values: None,
            },
            Self::Text(text) => RenderedDiscrepancy {
                headline: text.clone(),
                values: None,
            },
        }
    }

    /// Score deduction, when the entry carries one.
    pub fn penalty(&self) -> Option<f64> {
        match self {
            Self::FieldMismatch(m) => Some(m.penalty),
            _ => None,
        }
    }
}

/// Resolve a list payload, skipping nulls. Anything other than an array
/// yields an empty list.
pub fn parse_list(value: Value) -> Vec<Discrepancy> {
    match value {
        Value::Array(items) => items.into_iter().filter_map(Discrepancy::from_value).collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<Discrepancy>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_list(value))
}

impl<'de> Deserialize<'de> for Discrepancy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let text = value.to_string();
        Ok(Self::from_value(value).unwrap_or(Self::Text(text)))
    }
}

impl Serialize for Discrepancy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::FieldMismatch(m) => m.raw.serialize(serializer),
            Self::Described { raw, .. } => raw.serialize(serializer),
            Self::Text(text) => serializer.serialize_str(text),
        }
    }
}

fn penalty_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
