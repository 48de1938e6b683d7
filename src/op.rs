//! Comparison operators and the value lattice they act on.
//!
//! Every predicate and assertion in the engine reduces to a call of
//! [`apply_operator`]: the left-hand side is drawn from student data,
//! the right-hand side from the area document. Lifting rules cover
//! tuples and mixed scalar types, so the function is total; a
//! comparison that makes no sense simply answers `false`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A comparison operator, with the original `$`-prefixed wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "$lt")]
    LessThan,
    #[serde(rename = "$lte")]
    LessThanOrEqualTo,
    #[serde(rename = "$gt")]
    GreaterThan,
    #[serde(rename = "$gte")]
    GreaterThanOrEqualTo,
    #[serde(rename = "$eq")]
    EqualTo,
    #[serde(rename = "$neq")]
    NotEqualTo,
    #[serde(rename = "$in")]
    In,
    #[serde(rename = "$nin")]
    NotIn,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::LessThan => "<",
            Operator::LessThanOrEqualTo => "≤",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqualTo => "≥",
            Operator::EqualTo => "==",
            Operator::NotEqualTo => "!=",
            Operator::In => "∈",
            Operator::NotIn => "∉",
        };
        f.write_str(s)
    }
}

/// A comparable fact value.
///
/// Scalars compare by their native ordering; a tuple represents a
/// multi-valued fact (e.g. the attribute set of a course) and is only
/// meaningful under the membership operators after lifting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Decimal(Decimal),
    Bool(bool),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Tuple(items.into_iter().collect())
    }

    fn is_tuple(&self) -> bool {
        matches!(self, Value::Tuple(_))
    }

    fn is_textual(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    /// Stringified form used for coercion and set intersection.
    fn as_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Decimal(d) => d.normalize().to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Value::as_text).collect();
                format!("({})", inner.join(", "))
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Applies `op` to an optional pair of values.
///
/// Absence is meaningful: if either side is missing, the result is plain
/// equality of presence (both missing compares equal, one missing does
/// not). Tuple handling follows the lifting rules described on
/// [`apply_scalar`] and [`apply_half_tuple`].
pub fn apply_operator(lhs: Option<&Value>, op: Operator, rhs: Option<&Value>) -> bool {
    let (lhs, rhs) = match (lhs, rhs) {
        (Some(l), Some(r)) => (l, r),
        (None, None) => return true,
        _ => return false,
    };

    if lhs.is_tuple() && rhs.is_tuple() {
        return apply_both_tuples(lhs, op, rhs);
    }

    if lhs.is_tuple() || rhs.is_tuple() {
        return apply_half_tuple(lhs, op, rhs);
    }

    apply_scalar(lhs, op, rhs)
}

/// Both sides multi-valued: only `In` is legal, answered as a non-empty
/// string-set intersection. Any other operator is a specification error
/// caught at validation time, so here it simply answers `false`.
fn apply_both_tuples(lhs: &Value, op: Operator, rhs: &Value) -> bool {
    let (Value::Tuple(lhs), Value::Tuple(rhs)) = (lhs, rhs) else {
        unreachable!("callers check tuple-ness");
    };

    if op != Operator::In {
        return false;
    }

    if lhs.is_empty() || rhs.is_empty() {
        return false;
    }

    let rhs_set: std::collections::HashSet<String> = rhs.iter().map(Value::as_text).collect();
    lhs.iter().any(|v| rhs_set.contains(&v.as_text()))
}

/// Exactly one side multi-valued: `=`/`!=` on a single-element tuple
/// unwrap and recurse, on an empty tuple `=` answers `false`; otherwise
/// `=` lifts to `In` and `!=` to `NotIn`, which distribute element-wise
/// as `any`/`all`.
fn apply_half_tuple(lhs: &Value, op: Operator, rhs: &Value) -> bool {
    match op {
        Operator::EqualTo => {
            if let Value::Tuple(items) = lhs {
                match items.len() {
                    1 => return apply_operator(Some(&items[0]), Operator::EqualTo, Some(rhs)),
                    0 => return false,
                    _ => {}
                }
            } else if let Value::Tuple(items) = rhs {
                match items.len() {
                    1 => return apply_operator(Some(lhs), Operator::EqualTo, Some(&items[0])),
                    0 => return false,
                    _ => {}
                }
            }

            apply_half_tuple(lhs, Operator::In, rhs)
        }

        Operator::NotEqualTo => apply_half_tuple(lhs, Operator::NotIn, rhs),

        Operator::In => match (lhs, rhs) {
            (Value::Tuple(items), _) => items
                .iter()
                .any(|v| apply_operator(Some(v), Operator::EqualTo, Some(rhs))),
            (_, Value::Tuple(items)) => items
                .iter()
                .any(|v| apply_operator(Some(lhs), Operator::EqualTo, Some(v))),
            _ => unreachable!("callers check tuple-ness"),
        },

        Operator::NotIn => match (lhs, rhs) {
            (Value::Tuple(items), _) => items
                .iter()
                .all(|v| apply_operator(Some(v), Operator::NotEqualTo, Some(rhs))),
            (_, Value::Tuple(items)) => items
                .iter()
                .all(|v| apply_operator(Some(lhs), Operator::NotEqualTo, Some(v))),
            _ => unreachable!("callers check tuple-ness"),
        },

        // ordering operators over a tuple are a specification error
        _ => false,
    }
}

/// Scalar comparison. If exactly one side is textual, the other side is
/// coerced to its textual form first.
fn apply_scalar(lhs: &Value, op: Operator, rhs: &Value) -> bool {
    if lhs.is_textual() != rhs.is_textual() {
        let lhs = lhs.as_text();
        let rhs = rhs.as_text();
        return apply_scalar(&Value::Str(lhs), op, &Value::Str(rhs));
    }

    match op {
        Operator::EqualTo => scalar_cmp(lhs, rhs) == Some(std::cmp::Ordering::Equal),
        Operator::NotEqualTo => scalar_cmp(lhs, rhs) != Some(std::cmp::Ordering::Equal),
        Operator::LessThan => scalar_cmp(lhs, rhs) == Some(std::cmp::Ordering::Less),
        Operator::LessThanOrEqualTo => matches!(
            scalar_cmp(lhs, rhs),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        ),
        Operator::GreaterThan => scalar_cmp(lhs, rhs) == Some(std::cmp::Ordering::Greater),
        Operator::GreaterThanOrEqualTo => matches!(
            scalar_cmp(lhs, rhs),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        ),
        // membership over two scalars degrades to equality checks
        Operator::In => scalar_cmp(lhs, rhs) == Some(std::cmp::Ordering::Equal),
        Operator::NotIn => scalar_cmp(lhs, rhs) != Some(std::cmp::Ordering::Equal),
    }
}

fn scalar_cmp(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    use Value::*;

    match (lhs, rhs) {
        (Str(a), Str(b)) => Some(a.cmp(b)),
        (Int(a), Int(b)) => Some(a.cmp(b)),
        (Bool(a), Bool(b)) => Some(a.cmp(b)),
        (Decimal(a), Decimal(b)) => Some(a.cmp(b)),
        (Int(a), Decimal(b)) => Some(rust_decimal::Decimal::from(*a).cmp(b)),
        (Decimal(a), Int(b)) => Some(a.cmp(&rust_decimal::Decimal::from(*b))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn apply(lhs: &Value, op: Operator, rhs: &Value) -> bool {
        apply_operator(Some(lhs), op, Some(rhs))
    }

    #[test]
    fn test_scalar_equality() {
        assert!(apply(&Value::from("CSCI"), Operator::EqualTo, &Value::from("CSCI")));
        assert!(!apply(&Value::from("CSCI"), Operator::EqualTo, &Value::from("MATH")));
        assert!(apply(&Value::from(3), Operator::NotEqualTo, &Value::from(4)));
    }

    #[test]
    fn test_scalar_ordering() {
        assert!(apply(&Value::from(5), Operator::GreaterThanOrEqualTo, &Value::from(2)));
        assert!(apply(
            &Value::from(dec!(1.5)),
            Operator::LessThan,
            &Value::from(dec!(2.0))
        ));
        assert!(apply(&Value::from(2), Operator::LessThanOrEqualTo, &Value::from(dec!(2.0))));
    }

    #[test]
    fn test_absent_sides() {
        assert!(apply_operator(None, Operator::EqualTo, None));
        assert!(!apply_operator(Some(&Value::from(1)), Operator::EqualTo, None));
        assert!(!apply_operator(None, Operator::GreaterThan, Some(&Value::from(1))));
    }

    #[test]
    fn test_mixed_types_coerce_to_text() {
        // the area spec often writes numbers where the data has strings
        assert!(apply(&Value::from("201"), Operator::EqualTo, &Value::from(201)));
        assert!(apply(&Value::from(201), Operator::EqualTo, &Value::from("201")));
    }

    #[test]
    fn test_both_tuples_intersect() {
        let lhs = Value::tuple([Value::from("csci_elective"), Value::from("csci_systems")]);
        let rhs = Value::tuple([Value::from("csci_systems")]);
        assert!(apply(&lhs, Operator::In, &rhs));

        let rhs = Value::tuple([Value::from("math_proof")]);
        assert!(!apply(&lhs, Operator::In, &rhs));
    }

    #[test]
    fn test_both_tuples_empty_is_false() {
        let lhs = Value::tuple([]);
        let rhs = Value::tuple([Value::from("x")]);
        assert!(!apply(&lhs, Operator::In, &rhs));
    }

    #[test]
    fn test_half_tuple_eq_unwraps_single() {
        let lhs = Value::tuple([Value::from("CSCI")]);
        assert!(apply(&lhs, Operator::EqualTo, &Value::from("CSCI")));

        let rhs = Value::tuple([Value::from("CSCI")]);
        assert!(apply(&Value::from("CSCI"), Operator::EqualTo, &rhs));
    }

    #[test]
    fn test_half_tuple_eq_empty_is_false() {
        let lhs = Value::tuple([]);
        assert!(!apply(&lhs, Operator::EqualTo, &Value::from("CSCI")));
    }

    #[test]
    fn test_half_tuple_eq_lifts_to_in() {
        let lhs = Value::tuple([Value::from("csci_elective"), Value::from("csci_systems")]);
        assert!(apply(&lhs, Operator::EqualTo, &Value::from("csci_systems")));
        assert!(!apply(&lhs, Operator::EqualTo, &Value::from("math_proof")));
    }

    #[test]
    fn test_half_tuple_neq_lifts_to_nin() {
        let lhs = Value::tuple([Value::from("a"), Value::from("b")]);
        assert!(apply(&lhs, Operator::NotEqualTo, &Value::from("c")));
        assert!(!apply(&lhs, Operator::NotEqualTo, &Value::from("a")));
    }

    #[test]
    fn test_membership_against_list() {
        let rhs = Value::tuple([Value::from(100), Value::from(200)]);
        assert!(apply(&Value::from(100), Operator::In, &rhs));
        assert!(!apply(&Value::from(300), Operator::In, &rhs));
        assert!(apply(&Value::from(300), Operator::NotIn, &rhs));
    }

    #[test]
    fn test_operator_wire_names() {
        assert_eq!(serde_json::to_string(&Operator::GreaterThanOrEqualTo).unwrap(), "\"$gte\"");
        assert_eq!(serde_json::to_string(&Operator::NotIn).unwrap(), "\"$nin\"");
    }

    proptest! {
        #[test]
        fn prop_eq_is_reflexive_for_ints(n in -10_000i64..10_000) {
            prop_assert!(apply(&Value::from(n), Operator::EqualTo, &Value::from(n)));
        }

        #[test]
        fn prop_eq_and_neq_are_complements(a in -100i64..100, b in -100i64..100) {
            let eq = apply(&Value::from(a), Operator::EqualTo, &Value::from(b));
            let ne = apply(&Value::from(a), Operator::NotEqualTo, &Value::from(b));
            prop_assert_ne!(eq, ne);
        }

        #[test]
        fn prop_ordering_is_consistent(a in -100i64..100, b in -100i64..100) {
            let lt = apply(&Value::from(a), Operator::LessThan, &Value::from(b));
            let ge = apply(&Value::from(a), Operator::GreaterThanOrEqualTo, &Value::from(b));
            prop_assert_ne!(lt, ge);
        }
    }
}
