//! Named, typed quantities that can be observed via [`MeasureDescriptor::measurement`].

use std::fmt;
use std::sync::Arc;

/// The numeric representation a [`MeasureDescriptor`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureKind {
    /// 64-bit signed integer measurements.
    Int64,
    /// 64-bit floating point measurements.
    Float64,
}

impl fmt::Display for MeasureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureKind::Int64 => f.write_str("int64"),
            MeasureKind::Float64 => f.write_str("float64"),
        }
    }
}

/// A named quantity that can be observed (bytes, milliseconds, counts); not
/// aggregated itself — that's a [`crate::ViewDescriptor`]'s job.
///
/// Descriptors are reference-counted so a [`Measurement`] can cheaply carry
/// a handle back to the measure it was recorded against.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureDescriptor {
    name: Arc<str>,
    description: Arc<str>,
    unit: Arc<str>,
    kind: MeasureKind,
}

impl MeasureDescriptor {
    /// Construct a new descriptor. This does not register it anywhere;
    /// registration (and uniqueness enforcement) is the engine's job.
    pub fn new(
        name: impl Into<Arc<str>>,
        description: impl Into<Arc<str>>,
        unit: impl Into<Arc<str>>,
        kind: MeasureKind,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            unit: unit.into(),
            kind,
        }
    }

    /// The measure's name. Globally unique within a process once registered.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The measure's unit string (e.g. `"By"`, `"ms"`, `"1"`).
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// The measure's value kind.
    pub fn kind(&self) -> MeasureKind {
        self.kind
    }

    /// Bind a numeric value to this measure, producing a [`Measurement`]
    /// ready to be passed to `record`.
    ///
    /// Returns [`MeasureError::TypeMismatch`] if `value`'s kind does not
    /// match this descriptor's [`MeasureKind`].
    pub fn measurement(
        self: &Arc<Self>,
        value: impl Into<MeasureValue>,
    ) -> Result<Measurement, MeasureError> {
        let value = value.into();
        let value_kind = value.kind();
        if value_kind != self.kind {
            return Err(MeasureError::TypeMismatch {
                measure_name: self.name.to_string(),
                measure_kind: self.kind,
                value_kind,
            });
        }
        Ok(Measurement {
            measure: self.clone(),
            value,
        })
    }
}

/// Error surfaced when a [`Measurement`]'s value does not match its
/// measure's [`MeasureKind`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("measure {measure_name:?} has kind {measure_kind} but value has kind {value_kind}")]
pub struct MeasureError {
    measure_name: String,
    measure_kind: MeasureKind,
    value_kind: MeasureKind,
}

/// The numeric value carried by a [`Measurement`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureValue {
    /// An integer sample.
    Int64(i64),
    /// A floating point sample.
    Float64(f64),
}

impl MeasureValue {
    fn kind(&self) -> MeasureKind {
        match self {
            MeasureValue::Int64(_) => MeasureKind::Int64,
            MeasureValue::Float64(_) => MeasureKind::Float64,
        }
    }

    /// The value widened to `f64`, for aggregators that operate on floats
    /// regardless of the measure's native representation (e.g. distributions).
    pub fn as_f64(&self) -> f64 {
        match self {
            MeasureValue::Int64(v) => *v as f64,
            MeasureValue::Float64(v) => *v,
        }
    }
}

impl From<i64> for MeasureValue {
    fn from(v: i64) -> Self {
        MeasureValue::Int64(v)
    }
}
impl From<f64> for MeasureValue {
    fn from(v: f64) -> Self {
        MeasureValue::Float64(v)
    }
}

/// A `(measure, value)` pair bound to a single `record` call; consumed and
/// discarded once admitted to the matching views' aggregators.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// The measure this value was recorded against.
    pub measure: Arc<MeasureDescriptor>,
    /// The recorded value.
    pub value: MeasureValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measurement_rejects_kind_mismatch() {
        let m = Arc::new(MeasureDescriptor::new(
            "test/measure/int",
            "a test measure",
            "1",
            MeasureKind::Int64,
        ));
        assert!(m.measurement(1.5_f64).is_err());
        assert!(m.measurement(1_i64).is_ok());
    }
}
