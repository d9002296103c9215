//! Three-valued comparison of [`Value`]s.
//!
//! Comparing values of incomparable kinds, or involving NaN, yields
//! [`Ternary::Error`] instead of a boolean. The error state propagates
//! through the boolean operators and is folded to `false` only when a
//! predicate result leaves the evaluator via [`Ternary::collapse`]. It never
//! reaches the wire.
//!
//! ```
//! use graphwire::predicate::{CompareOp, Ternary};
//! use graphwire::structure::Value;
//!
//! let lt = CompareOp::Lt.test(&Value::Int(1), &Value::from("a"));
//! assert_eq!(lt, Ternary::Error);
//! assert_eq!(lt.not(), Ternary::Error);
//! assert!(!lt.collapse());
//! ```

use std::cmp::Ordering;

use crate::structure::Value;

/// Result of a comparison under three-valued logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ternary {
    True,
    False,
    /// Type error: the operands cannot be compared.
    Error,
}

impl Ternary {
    #[inline]
    pub fn from_bool(value: bool) -> Self {
        if value {
            Ternary::True
        } else {
            Ternary::False
        }
    }

    /// False wins over error, error wins over true.
    pub fn and(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::False, _) | (_, Ternary::False) => Ternary::False,
            (Ternary::Error, _) | (_, Ternary::Error) => Ternary::Error,
            _ => Ternary::True,
        }
    }

    /// True wins over error, error wins over false.
    pub fn or(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::True, _) | (_, Ternary::True) => Ternary::True,
            (Ternary::Error, _) | (_, Ternary::Error) => Ternary::Error,
            _ => Ternary::False,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Ternary {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Error => Ternary::Error,
        }
    }

    pub fn xor(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::Error, _) | (_, Ternary::Error) => Ternary::Error,
            (a, b) => Ternary::from_bool(a != b),
        }
    }

    /// Fold to a boolean at a predicate boundary; error becomes `false`.
    #[inline]
    pub fn collapse(self) -> bool {
        self == Ternary::True
    }

    #[inline]
    pub fn is_error(self) -> bool {
        self == Ternary::Error
    }
}

impl From<bool> for Ternary {
    fn from(value: bool) -> Self {
        Ternary::from_bool(value)
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    /// Apply the operator to `a` and `b`.
    pub fn test(self, a: &Value, b: &Value) -> Ternary {
        match self {
            CompareOp::Eq => equals(a, b),
            CompareOp::Neq => equals(a, b).not(),
            CompareOp::Lt => ordered(a, b, Ordering::is_lt),
            CompareOp::Lte => ordered(a, b, Ordering::is_le),
            CompareOp::Gt => ordered(a, b, Ordering::is_gt),
            CompareOp::Gte => ordered(a, b, Ordering::is_ge),
        }
    }
}

fn ordered(a: &Value, b: &Value, accept: fn(Ordering) -> bool) -> Ternary {
    compare(a, b).map_or(Ternary::Error, |ord| Ternary::from_bool(accept(ord)))
}

/// Equality under three-valued logic.
///
/// Numbers compare by value across widths. Values of different
/// non-numeric kinds, and NaN, give [`Ternary::Error`].
pub fn equals(a: &Value, b: &Value) -> Ternary {
    if is_numeric(a) && is_numeric(b) {
        return compare_numbers(a, b).map_or(Ternary::Error, |ord| Ternary::from_bool(ord.is_eq()));
    }
    if a.type_code() != b.type_code() {
        return Ternary::Error;
    }
    Ternary::from_bool(a == b)
}

/// Total order between comparable values; `None` marks a type error.
///
/// Nulls, collections and graph elements have no order.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if is_numeric(a) && is_numeric(b) {
        return compare_numbers(a, b);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Char(x), Value::Char(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::Uuid(x), Value::Uuid(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) | (Value::Timestamp(x), Value::Timestamp(y)) => {
            Some(x.cmp(y))
        }
        (
            Value::Duration {
                seconds: s1,
                nanos: n1,
            },
            Value::Duration {
                seconds: s2,
                nanos: n2,
            },
        ) => Some((s1, n1).cmp(&(s2, n2))),
        _ => None,
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::Byte(_)
            | Value::Short(_)
            | Value::Int(_)
            | Value::Long(_)
            | Value::Float(_)
            | Value::Double(_)
    )
}

fn compare_numbers(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    let (x, y) = (a.as_f64()?, b.as_f64()?);
    // partial_cmp is None exactly when either side is NaN
    x.partial_cmp(&y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Ternary::{Error as E, False as F, True as T};

    #[test]
    fn test_and_or_truth_tables() {
        assert_eq!(T.and(T), T);
        assert_eq!(T.and(E), E);
        assert_eq!(E.and(F), F);
        assert_eq!(E.and(E), E);

        assert_eq!(F.or(F), F);
        assert_eq!(F.or(E), E);
        assert_eq!(E.or(T), T);
    }

    #[test]
    fn test_not_xor() {
        assert_eq!(T.not(), F);
        assert_eq!(E.not(), E);
        assert_eq!(T.xor(F), T);
        assert_eq!(T.xor(T), F);
        assert_eq!(F.xor(E), E);
    }

    #[test]
    fn test_collapse() {
        assert!(T.collapse());
        assert!(!F.collapse());
        assert!(!E.collapse());
        assert!(E.is_error());
    }

    #[test]
    fn test_numeric_comparison_across_widths() {
        assert_eq!(CompareOp::Eq.test(&Value::Int(1), &Value::Long(1)), T);
        assert_eq!(CompareOp::Lt.test(&Value::Byte(1), &Value::Double(1.5)), T);
        assert_eq!(CompareOp::Gte.test(&Value::Float(2.0), &Value::Short(2)), T);
        assert_eq!(
            CompareOp::Gt.test(&Value::Long(i64::MAX), &Value::Long(i64::MAX - 1)),
            T
        );
    }

    #[test]
    fn test_nan_is_type_error() {
        let nan = Value::Double(f64::NAN);
        assert_eq!(CompareOp::Eq.test(&nan, &nan), E);
        assert_eq!(CompareOp::Lt.test(&nan, &Value::Int(1)), E);
        assert_eq!(CompareOp::Neq.test(&nan, &Value::Int(1)), E);
    }

    #[test]
    fn test_incomparable_kinds() {
        let s = Value::from("a");
        assert_eq!(CompareOp::Lt.test(&Value::Int(1), &s), E);
        assert_eq!(CompareOp::Eq.test(&Value::Int(1), &s), E);
        assert_eq!(CompareOp::Lt.test(&Value::Null, &Value::Null), E);
        assert_eq!(
            CompareOp::Lt.test(&Value::List(vec![]), &Value::List(vec![])),
            E
        );
    }

    #[test]
    fn test_same_kind_equality_and_order() {
        assert_eq!(CompareOp::Eq.test(&Value::Null, &Value::Null), T);
        assert_eq!(CompareOp::Lt.test(&Value::from("a"), &Value::from("b")), T);
        assert_eq!(
            CompareOp::Eq.test(&Value::from(vec![1i32]), &Value::from(vec![1i32])),
            T
        );
        assert_eq!(
            compare(
                &Value::Duration { seconds: 1, nanos: 5 },
                &Value::Duration { seconds: 1, nanos: 9 }
            ),
            Some(Ordering::Less)
        );
    }
}
