//! Tuple model shared by every engine.
//!
//! A tuple is the ordered list of match-relevant values read from one row:
//! coordinates, optionally followed by per-row error values. Missing values
//! are carried as `NaN` so that table readers never have to fail on them.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One row's match-relevant values.
pub type Tuple = Vec<f64>;

/// Semantic role of a single tuple field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Plain Cartesian coordinate.
    Coordinate,
    /// Per-row error radius; must be finite and non-negative.
    Error,
    /// Spherical longitude (right ascension) in degrees.
    Longitude,
    /// Spherical latitude (declination) in degrees, within [-90, 90].
    Latitude,
}

/// Description of one field an engine expects in its tuples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleField {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub description: String,
}

impl TupleField {
    /// Cartesian coordinate number `axis` (zero-based).
    pub fn coordinate(axis: usize) -> Self {
        Self {
            name: format!("x{}", axis + 1),
            kind: FieldKind::Coordinate,
            unit: None,
            description: format!("Cartesian coordinate #{}", axis + 1),
        }
    }

    pub fn error() -> Self {
        Self {
            name: "error".into(),
            kind: FieldKind::Error,
            unit: None,
            description: "Per-object error radius".into(),
        }
    }

    pub fn longitude() -> Self {
        Self {
            name: "lon".into(),
            kind: FieldKind::Longitude,
            unit: Some("deg".into()),
            description: "Longitude / right ascension".into(),
        }
    }

    pub fn latitude() -> Self {
        Self {
            name: "lat".into(),
            kind: FieldKind::Latitude,
            unit: Some("deg".into()),
            description: "Latitude / declination".into(),
        }
    }

    /// Whether `value` is acceptable for this field.
    pub fn accepts(&self, value: f64) -> bool {
        match self.kind {
            FieldKind::Coordinate | FieldKind::Longitude => value.is_finite(),
            FieldKind::Error => value.is_finite() && value >= 0.0,
            FieldKind::Latitude => value.is_finite() && (-90.0..=90.0).contains(&value),
        }
    }
}

/// Fail if `tuple` does not have one value per field.
pub fn check_arity(fields: &[TupleField], tuple: &[f64]) -> Result<(), EngineError> {
    check_width(fields, tuple.len())
}

/// Fail if tuples `width` values wide cannot fill `fields`.
pub fn check_width(fields: &[TupleField], width: usize) -> Result<(), EngineError> {
    if fields.len() == width {
        Ok(())
    } else {
        Err(EngineError::TupleArity {
            expected: fields.len(),
            actual: width,
        })
    }
}

/// Whether every value of `tuple` is acceptable for its field.
///
/// Rows failing this check are skipped by the matcher rather than aborting
/// the run.
pub fn is_usable(fields: &[TupleField], tuple: &[f64]) -> bool {
    fields.len() == tuple.len() && fields.iter().zip(tuple).all(|(f, &v)| f.accepts(v))
}
