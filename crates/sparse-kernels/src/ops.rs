//! Operators: binary operators, monoids, semirings and unary/apply operators.

use std::fmt;

use crate::dtype::{DType, Scalar};
use crate::error::{KernelError, Result};

/// Binary operator applied pointwise to two stored values.
///
/// Operands are promoted to a common dtype before the operator runs. On
/// `Bool` operands the arithmetic operators take their logical meaning
/// (`Plus`/`Max` are `or`, `Times`/`Min` are `and`, `Minus` is `xor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    Div,
    Max,
    Min,
    First,
    Second,
    Lor,
    Land,
}

impl BinaryOp {
    /// Dtype produced when combining operands of the given dtypes.
    pub fn result_dtype(self, lhs: DType, rhs: DType) -> DType {
        match self {
            BinaryOp::Lor | BinaryOp::Land => DType::Bool,
            _ => lhs.unify(rhs),
        }
    }

    pub fn apply(self, lhs: Scalar, rhs: Scalar) -> Result<Scalar> {
        if let BinaryOp::Lor = self {
            return Ok(Scalar::Bool(lhs.is_truthy() || rhs.is_truthy()));
        }
        if let BinaryOp::Land = self {
            return Ok(Scalar::Bool(lhs.is_truthy() && rhs.is_truthy()));
        }
        let dtype = lhs.dtype().unify(rhs.dtype());
        let out = match (lhs.cast(dtype), rhs.cast(dtype)) {
            (Scalar::Bool(a), Scalar::Bool(b)) => Scalar::Bool(match self {
                BinaryOp::Plus | BinaryOp::Max => a || b,
                BinaryOp::Times | BinaryOp::Min => a && b,
                BinaryOp::Minus => a ^ b,
                BinaryOp::Div | BinaryOp::First => a,
                BinaryOp::Second => b,
                BinaryOp::Lor | BinaryOp::Land => unreachable!(),
            }),
            (Scalar::Int64(a), Scalar::Int64(b)) => Scalar::Int64(match self {
                BinaryOp::Plus => a.wrapping_add(b),
                BinaryOp::Minus => a.wrapping_sub(b),
                BinaryOp::Times => a.wrapping_mul(b),
                BinaryOp::Div => {
                    if b == 0 {
                        return Err(KernelError::DomainError(format!(
                            "integer division {a} / 0"
                        )));
                    }
                    a.wrapping_div(b)
                }
                BinaryOp::Max => a.max(b),
                BinaryOp::Min => a.min(b),
                BinaryOp::First => a,
                BinaryOp::Second => b,
                BinaryOp::Lor | BinaryOp::Land => unreachable!(),
            }),
            (Scalar::Fp64(a), Scalar::Fp64(b)) => Scalar::Fp64(match self {
                BinaryOp::Plus => a + b,
                BinaryOp::Minus => a - b,
                BinaryOp::Times => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Max => a.max(b),
                BinaryOp::Min => a.min(b),
                BinaryOp::First => a,
                BinaryOp::Second => b,
                BinaryOp::Lor | BinaryOp::Land => unreachable!(),
            }),
            _ => unreachable!("operands were cast to a common dtype"),
        };
        Ok(out)
    }

    /// The monoid built on this operator, if it forms one.
    pub fn monoid(self) -> Option<Monoid> {
        Monoid::new(self).ok()
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Plus => "plus",
            BinaryOp::Minus => "minus",
            BinaryOp::Times => "times",
            BinaryOp::Div => "div",
            BinaryOp::Max => "max",
            BinaryOp::Min => "min",
            BinaryOp::First => "first",
            BinaryOp::Second => "second",
            BinaryOp::Lor => "lor",
            BinaryOp::Land => "land",
        }
    }
}

/// An associative, commutative binary operator with an identity.
///
/// Block partials are folded with a monoid in no particular order, so only
/// operators that tolerate reordering are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Monoid {
    op: BinaryOp,
}

impl Monoid {
    pub const PLUS: Monoid = Monoid { op: BinaryOp::Plus };
    pub const TIMES: Monoid = Monoid { op: BinaryOp::Times };
    pub const MAX: Monoid = Monoid { op: BinaryOp::Max };
    pub const MIN: Monoid = Monoid { op: BinaryOp::Min };
    pub const LOR: Monoid = Monoid { op: BinaryOp::Lor };
    pub const LAND: Monoid = Monoid { op: BinaryOp::Land };

    /// Wrap `op` as a monoid.
    ///
    /// # Errors
    /// Returns [`KernelError::NotAMonoid`] for non-associative or
    /// non-commutative operators.
    pub fn new(op: BinaryOp) -> Result<Self> {
        match op {
            BinaryOp::Plus
            | BinaryOp::Times
            | BinaryOp::Max
            | BinaryOp::Min
            | BinaryOp::Lor
            | BinaryOp::Land => Ok(Self { op }),
            _ => Err(KernelError::NotAMonoid(op)),
        }
    }

    pub fn op(&self) -> BinaryOp {
        self.op
    }

    pub fn apply(&self, lhs: Scalar, rhs: Scalar) -> Result<Scalar> {
        self.op.apply(lhs, rhs)
    }
}

/// A (monoid, multiply) pair used by matrix products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Semiring {
    add: Monoid,
    mul: BinaryOp,
}

impl Semiring {
    /// Pair an additive operator with a multiplicative one.
    ///
    /// # Errors
    /// Returns [`KernelError::NotAMonoid`] if `add` is not a monoid.
    pub fn new(add: BinaryOp, mul: BinaryOp) -> Result<Self> {
        Ok(Self {
            add: Monoid::new(add)?,
            mul,
        })
    }

    pub fn plus_times() -> Self {
        Self {
            add: Monoid::PLUS,
            mul: BinaryOp::Times,
        }
    }

    pub fn min_plus() -> Self {
        Self {
            add: Monoid::MIN,
            mul: BinaryOp::Plus,
        }
    }

    pub fn max_plus() -> Self {
        Self {
            add: Monoid::MAX,
            mul: BinaryOp::Plus,
        }
    }

    pub fn max_times() -> Self {
        Self {
            add: Monoid::MAX,
            mul: BinaryOp::Times,
        }
    }

    pub fn lor_land() -> Self {
        Self {
            add: Monoid::LOR,
            mul: BinaryOp::Land,
        }
    }

    pub fn plus_first() -> Self {
        Self {
            add: Monoid::PLUS,
            mul: BinaryOp::First,
        }
    }

    pub fn plus_second() -> Self {
        Self {
            add: Monoid::PLUS,
            mul: BinaryOp::Second,
        }
    }

    pub fn monoid(&self) -> Monoid {
        self.add
    }

    pub fn mul(&self) -> BinaryOp {
        self.mul
    }

    /// Dtype of a product of operands with the given dtypes.
    pub fn result_dtype(&self, lhs: DType, rhs: DType) -> DType {
        let product = self.mul.result_dtype(lhs, rhs);
        self.add.op().result_dtype(product, product)
    }
}

impl fmt::Display for Semiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.add.op().name(), self.mul.name())
    }
}

/// Unary operator applied to each stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Identity,
    /// Additive inverse.
    AInv,
    Abs,
    /// Constant one of the input dtype.
    One,
    /// Logical not, producing `Bool`.
    Lnot,
}

impl UnaryOp {
    pub fn result_dtype(self, input: DType) -> DType {
        match self {
            UnaryOp::Lnot => DType::Bool,
            _ => input,
        }
    }

    pub fn apply(self, x: Scalar) -> Scalar {
        match (self, x) {
            (UnaryOp::Identity, x) => x,
            (UnaryOp::AInv, Scalar::Bool(b)) => Scalar::Bool(b),
            (UnaryOp::AInv, Scalar::Int64(i)) => Scalar::Int64(i.wrapping_neg()),
            (UnaryOp::AInv, Scalar::Fp64(v)) => Scalar::Fp64(-v),
            (UnaryOp::Abs, Scalar::Int64(i)) => Scalar::Int64(i.wrapping_abs()),
            (UnaryOp::Abs, Scalar::Fp64(v)) => Scalar::Fp64(v.abs()),
            (UnaryOp::Abs, x) => x,
            (UnaryOp::One, x) => Scalar::Int64(1).cast(x.dtype()),
            (UnaryOp::Lnot, x) => Scalar::Bool(!x.is_truthy()),
        }
    }
}

/// Operator accepted by `apply`: a unary operator or a binary operator with
/// one operand bound to a scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApplyOp {
    Unary(UnaryOp),
    /// `op(scalar, x)`
    BindFirst(Scalar, BinaryOp),
    /// `op(x, scalar)`
    BindSecond(BinaryOp, Scalar),
}

impl ApplyOp {
    pub fn identity() -> Self {
        ApplyOp::Unary(UnaryOp::Identity)
    }

    pub fn result_dtype(&self, input: DType) -> DType {
        match *self {
            ApplyOp::Unary(op) => op.result_dtype(input),
            ApplyOp::BindFirst(s, op) => op.result_dtype(s.dtype(), input),
            ApplyOp::BindSecond(op, s) => op.result_dtype(input, s.dtype()),
        }
    }

    pub fn apply(&self, x: Scalar) -> Result<Scalar> {
        match *self {
            ApplyOp::Unary(op) => Ok(op.apply(x)),
            ApplyOp::BindFirst(s, op) => op.apply(s, x),
            ApplyOp::BindSecond(op, s) => op.apply(x, s),
        }
    }
}

impl From<UnaryOp> for ApplyOp {
    fn from(op: UnaryOp) -> Self {
        ApplyOp::Unary(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monoid_rejects_minus() {
        assert_eq!(
            Monoid::new(BinaryOp::Minus),
            Err(KernelError::NotAMonoid(BinaryOp::Minus))
        );
        assert!(Semiring::new(BinaryOp::First, BinaryOp::Times).is_err());
    }

    #[test]
    fn test_identity_is_neutral() {
        let samples = [Scalar::Int64(-3), Scalar::Int64(7)];
        for monoid in [Monoid::PLUS, Monoid::TIMES, Monoid::MAX, Monoid::MIN] {
            let id = monoid.identity(DType::Int64);
            for &x in &samples {
                assert_eq!(monoid.apply(id, x).unwrap(), x);
            }
        }
    }

    #[test]
    fn test_bool_arithmetic_is_logical() {
        let t = Scalar::Bool(true);
        let f = Scalar::Bool(false);
        assert_eq!(BinaryOp::Plus.apply(t, f).unwrap(), t);
        assert_eq!(BinaryOp::Times.apply(t, f).unwrap(), f);
        assert_eq!(BinaryOp::Minus.apply(t, t).unwrap(), f);
    }

    #[test]
    fn test_integer_division_by_zero() {
        let err = BinaryOp::Div
            .apply(Scalar::Int64(1), Scalar::Int64(0))
            .unwrap_err();
        assert!(matches!(err, KernelError::DomainError(_)));
    }

    #[test]
    fn test_mixed_dtypes_promote() {
        let out = BinaryOp::Plus
            .apply(Scalar::Int64(2), Scalar::Fp64(0.5))
            .unwrap();
        assert_eq!(out, Scalar::Fp64(2.5));
    }

    #[test]
    fn test_semiring_display() {
        assert_eq!(Semiring::plus_times().to_string(), "plus_times");
        assert_eq!(Semiring::min_plus().to_string(), "min_plus");
    }
}
