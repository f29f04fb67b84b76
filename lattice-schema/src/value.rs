use serde::{Deserialize, Serialize};

/// Tagged union over every scalar (and homogeneous-list) value a field can
/// hold (§3 Field value). Nulls are represented by absence, never by a
/// variant of this type.
///
/// List-of-documents (attached children) is deliberately not a variant
/// here: child attachments are a per-request, per-join concern owned by the
/// in-flight `Document` type in `lattice-search`, not a stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Int64(i64),
    Double(f64),
    Boolean(bool),
    GeoPoint { lat: f64, lon: f64 },
    Vector(Vec<f32>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Double(v) => Some(*v),
            FieldValue::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_geo_point(&self) -> Option<(f64, f64)> {
        match self {
            FieldValue::GeoPoint { lat, lon } => Some((*lat, *lon)),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            FieldValue::Vector(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// The field type a `Namespace` declares, independent of any particular
/// document's value for that field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Int64,
    Double,
    Boolean,
    GeoPoint,
    Vector { dim: u32 },
    List(Box<FieldType>),
}

impl FieldType {
    /// Whether a given value could plausibly have come from a field of this
    /// type; used by the planner to reject type-mismatched filters (§4.1).
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldType::String, FieldValue::String(_)) => true,
            (FieldType::Int64, FieldValue::Int64(_)) => true,
            (FieldType::Double, FieldValue::Double(_) | FieldValue::Int64(_)) => true,
            (FieldType::Boolean, FieldValue::Boolean(_)) => true,
            (FieldType::GeoPoint, FieldValue::GeoPoint { .. }) => true,
            (FieldType::Vector { dim }, FieldValue::Vector(v)) => v.len() as u32 == *dim,
            (FieldType::List(inner), FieldValue::List(items)) => {
                items.iter().all(|item| inner.accepts(item))
            }
            _ => false,
        }
    }
}
