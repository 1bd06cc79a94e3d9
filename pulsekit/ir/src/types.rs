use pulsekit_utils::{Error, PulseResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The scalar types of the real-time language. `Int` is a 32-bit signed
/// integer and `Fixed` the controller's 4.28 fixed-point format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Int,
    Fixed,
    Bool,
}

impl ScalarType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Fixed)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Int => "int",
            ScalarType::Fixed => "fixed",
            ScalarType::Bool => "bool",
        }
    }

    /// Whether a value of type `from` may be stored in a slot of this type.
    /// Integers widen to fixed point; nothing else converts implicitly.
    pub fn accepts(&self, from: ScalarType) -> bool {
        *self == from || (*self == ScalarType::Fixed && from == ScalarType::Int)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compile-time constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Fixed(f64),
    Bool(bool),
}

impl Value {
    pub fn ty(&self) -> ScalarType {
        match self {
            Value::Int(_) => ScalarType::Int,
            Value::Fixed(_) => ScalarType::Fixed,
            Value::Bool(_) => ScalarType::Bool,
        }
    }

    /// The zero value of a type.
    pub fn zero(ty: ScalarType) -> Self {
        match ty {
            ScalarType::Int => Value::Int(0),
            ScalarType::Fixed => Value::Fixed(0.0),
            ScalarType::Bool => Value::Bool(false),
        }
    }

    /// Convert the value for storage in a slot of type `ty`, widening
    /// integers to fixed point.
    pub fn coerce(self, ty: ScalarType) -> PulseResult<Self> {
        match (self, ty) {
            (v, t) if v.ty() == t => Ok(v),
            (Value::Int(i), ScalarType::Fixed) => Ok(Value::Fixed(i as f64)),
            (v, t) => Err(Error::type_mismatch(format!(
                "cannot store {} value `{v}` as {t}",
                v.ty()
            ))),
        }
    }

    /// Fixed-point literals that cannot be written down in source form.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Fixed(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Fixed(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            // Always print a fractional part so the literal reads back as fixed.
            Value::Fixed(v) if v.is_finite() && v.fract() == 0.0 => {
                write!(f, "{v:.1}")
            }
            Value::Fixed(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}
