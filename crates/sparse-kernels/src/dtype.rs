//! Element types and dynamically typed scalar values.

use std::fmt;

/// Element type of a sparse container.
///
/// Variants are ordered by promotion rank: combining two dtypes yields the
/// larger one (`Bool < Int64 < Fp64`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DType {
    Bool,
    Int64,
    Fp64,
}

impl DType {
    /// Common dtype of two operands.
    pub fn unify(self, other: DType) -> DType {
        self.max(other)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "BOOL",
            DType::Int64 => "INT64",
            DType::Fp64 => "FP64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single stored value together with its dtype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int64(i64),
    Fp64(f64),
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::Bool(_) => DType::Bool,
            Scalar::Int64(_) => DType::Int64,
            Scalar::Fp64(_) => DType::Fp64,
        }
    }

    /// Convert to another dtype.
    ///
    /// Floats are truncated toward zero when cast to `Int64`; any nonzero
    /// value casts to `true`.
    pub fn cast(self, dtype: DType) -> Scalar {
        match dtype {
            DType::Bool => Scalar::Bool(self.is_truthy()),
            DType::Int64 => Scalar::Int64(self.as_i64()),
            DType::Fp64 => Scalar::Fp64(self.as_f64()),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Scalar::Int64(i) => i as f64,
            Scalar::Fp64(x) => x,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            Scalar::Bool(b) => i64::from(b),
            Scalar::Int64(i) => i,
            Scalar::Fp64(x) => x as i64,
        }
    }

    /// Value-mask interpretation: nonzero / `true`.
    pub fn is_truthy(&self) -> bool {
        match *self {
            Scalar::Bool(b) => b,
            Scalar::Int64(i) => i != 0,
            Scalar::Fp64(x) => x != 0.0,
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Fp64(value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int64(i) => write!(f, "{i}"),
            Scalar::Fp64(x) => write!(f, "{x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unify_promotes() {
        assert_eq!(DType::Bool.unify(DType::Int64), DType::Int64);
        assert_eq!(DType::Fp64.unify(DType::Int64), DType::Fp64);
        assert_eq!(DType::Bool.unify(DType::Bool), DType::Bool);
    }

    #[test]
    fn test_cast() {
        assert_eq!(Scalar::Fp64(2.7).cast(DType::Int64), Scalar::Int64(2));
        assert_eq!(Scalar::Int64(0).cast(DType::Bool), Scalar::Bool(false));
        assert_eq!(Scalar::Bool(true).cast(DType::Fp64), Scalar::Fp64(1.0));
    }
}
