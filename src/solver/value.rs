//! Typed values held by solver variables.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic type of a solver variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    /// Real-valued scalar (lengths, times, rates)
    Float,
    /// Signed integer count
    Int,
    /// Boolean flag
    Bool,
    /// 2-D point or displacement in scan space
    Vector,
    /// 2-D integer extent (shape or stride)
    Shape,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Float => "float",
            Kind::Int => "int",
            Kind::Bool => "bool",
            Kind::Vector => "vector",
            Kind::Shape => "shape",
        };
        f.write_str(name)
    }
}

/// A resolved variable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Real-valued scalar
    Float(f64),
    /// Signed integer
    Int(i64),
    /// Boolean flag
    Bool(bool),
    /// 2-D vector
    Vector(Vector2<f64>),
    /// 2-D integer extent, `[x, y]`
    Shape([i64; 2]),
}

impl Value {
    /// The semantic type of this value.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Float(_) => Kind::Float,
            Value::Int(_) => Kind::Int,
            Value::Bool(_) => Kind::Bool,
            Value::Vector(_) => Kind::Vector,
            Value::Shape(_) => Kind::Shape,
        }
    }

    /// Compares two values with a relative tolerance on the real-valued kinds.
    ///
    /// Integer, boolean and shape values must match exactly.
    pub fn approx_eq(&self, other: &Value, rel_tol: f64) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => close(*a, *b, rel_tol),
            (Value::Vector(a), Value::Vector(b)) => {
                let scale = a.norm().max(b.norm());
                (a - b).norm() <= rel_tol * scale || (a - b).norm() <= f64::EPSILON
            }
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Shape(a), Value::Shape(b)) => a == b,
            _ => false,
        }
    }

    /// Returns true if every real component is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Float(v) => v.is_finite(),
            Value::Vector(v) => v.x.is_finite() && v.y.is_finite(),
            _ => true,
        }
    }
}

fn close(a: f64, b: f64, rel_tol: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Vector(v) => write!(f, "({}, {})", v.x, v.y),
            Value::Shape([x, y]) => write!(f, "({x}, {y})"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vector2<f64>> for Value {
    fn from(v: Vector2<f64>) -> Self {
        Value::Vector(v)
    }
}

impl From<[i64; 2]> for Value {
    fn from(v: [i64; 2]) -> Self {
        Value::Shape(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_eq_uses_relative_tolerance() {
        assert!(Value::Float(1.0e-5).approx_eq(&Value::Float(1.0e-5 * (1.0 + 1e-9)), 1e-6));
        assert!(!Value::Float(1.0e-5).approx_eq(&Value::Float(1.1e-5), 1e-6));
        assert!(Value::Float(0.0).approx_eq(&Value::Float(0.0), 1e-6));
    }

    #[test]
    fn approx_eq_is_exact_for_integers_and_shapes() {
        assert!(Value::Shape([3, 4]).approx_eq(&Value::Shape([3, 4]), 0.5));
        assert!(!Value::Shape([3, 4]).approx_eq(&Value::Shape([3, 5]), 0.5));
        assert!(!Value::Int(2).approx_eq(&Value::Float(2.0), 0.5));
    }

    #[test]
    fn vector_comparison() {
        let a = Value::Vector(Vector2::new(1.0e-5, 0.0));
        let b = Value::Vector(Vector2::new(1.0e-5, 1.0e-14));
        assert!(a.approx_eq(&b, 1e-6));
        assert_eq!(a.kind(), Kind::Vector);
    }
}
