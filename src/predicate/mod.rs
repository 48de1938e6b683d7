//! Where-clause predicates over course, area, and performance facts.
//!
//! A [`Predicate`] is the filter attached to queries, limits, and
//! assertions. Leaves name a [`FactKey`] and compare the item's fact
//! against an expected [`Value`] with [`apply_operator`]; branches
//! compose with and/or/not and an if/then/else keyed on a
//! [`PredicateExpression`] evaluated once against the audit context.

mod expr;

pub use expr::{PredicateExpression, PredicateFunction};

use crate::data::{AreaPointer, CourseInstance, Performance};
use crate::op::{apply_operator, Operator, Value};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A fact that can be asked of a data item. Closed set; validation
/// rejects keys that do not belong to the queried data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FactKey {
    // course facts
    Course,
    Crsid,
    Subject,
    Number,
    Level,
    Credits,
    Attributes,
    Gereqs,
    Grade,
    Year,
    Term,
    Institution,
    IsInProgress,
    IsStolaf,
    Lab,
    // area facts
    Code,
    Kind,
    Degree,
    // performance facts
    Name,
}

impl FactKey {
    pub fn is_course_key(self) -> bool {
        use FactKey::*;
        matches!(
            self,
            Course
                | Crsid
                | Subject
                | Number
                | Level
                | Credits
                | Attributes
                | Gereqs
                | Grade
                | Year
                | Term
                | Institution
                | IsInProgress
                | IsStolaf
                | Lab
        )
    }

    pub fn is_area_key(self) -> bool {
        matches!(self, FactKey::Code | FactKey::Kind | FactKey::Degree)
    }

    pub fn is_performance_key(self) -> bool {
        matches!(self, FactKey::Name)
    }
}

impl std::fmt::Display for FactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(name)) => f.write_str(&name),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// Anything a predicate leaf can interrogate.
pub trait Facts {
    fn fact(&self, key: FactKey) -> Option<Value>;
}

impl Facts for CourseInstance {
    fn fact(&self, key: FactKey) -> Option<Value> {
        use FactKey::*;
        match key {
            Course => Some(Value::str(&self.identity)),
            Crsid => Some(Value::str(&self.crsid)),
            Subject => Some(Value::str(&self.subject)),
            Number => Some(Value::str(&self.number)),
            Level => Some(Value::Int(self.level)),
            Credits => Some(Value::Decimal(self.credits)),
            Attributes => Some(Value::tuple(self.attributes.iter().map(Value::str))),
            Gereqs => Some(Value::tuple(self.gereqs.iter().map(Value::str))),
            Grade => Some(Value::Decimal(self.grade_points)),
            Year => Some(Value::Int(self.year)),
            Term => Some(Value::Int(self.term)),
            Institution => Some(Value::str(&self.institution)),
            IsInProgress => Some(Value::Bool(self.is_in_progress)),
            IsStolaf => Some(Value::Bool(self.is_stolaf)),
            Lab => Some(Value::Bool(self.is_lab)),
            _ => None,
        }
    }
}

impl Facts for AreaPointer {
    fn fact(&self, key: FactKey) -> Option<Value> {
        match key {
            FactKey::Code => Some(Value::str(&self.code)),
            FactKey::Kind => {
                let kind = serde_json::to_value(self.kind).ok()?;
                kind.as_str().map(Value::str)
            }
            FactKey::Degree => Some(Value::str(&self.degree)),
            FactKey::Name => Some(Value::str(&self.name)),
            _ => None,
        }
    }
}

impl Facts for Performance {
    fn fact(&self, key: FactKey) -> Option<Value> {
        match key {
            FactKey::Name => Some(Value::str(&self.name)),
            FactKey::Year => Some(Value::Int(self.year)),
            FactKey::Term => Some(Value::Int(self.term)),
            _ => None,
        }
    }
}

/// A composable filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Single {
        key: FactKey,
        operator: Operator,
        expected: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// if/then/else keyed on a context-level boolean. The branch taken
    /// is fixed by [`Predicate::resolve_conditions`] before any item is
    /// tested; an unresolved conditional matches nothing.
    Conditional {
        condition: PredicateExpression,
        resolved: Option<bool>,
        when_true: Box<Predicate>,
        when_false: Option<Box<Predicate>>,
    },
}

impl Predicate {
    pub fn single(key: FactKey, operator: Operator, expected: impl Into<Value>) -> Predicate {
        Predicate::Single {
            key,
            operator,
            expected: expected.into(),
        }
    }

    pub fn conditional(
        condition: PredicateExpression,
        when_true: Predicate,
        when_false: Option<Predicate>,
    ) -> Predicate {
        Predicate::Conditional {
            condition,
            resolved: None,
            when_true: Box::new(when_true),
            when_false: when_false.map(Box::new),
        }
    }

    /// Tests one item against the predicate.
    pub fn apply(&self, item: &dyn Facts) -> bool {
        match self {
            Predicate::Single {
                key,
                operator,
                expected,
            } => apply_operator(item.fact(*key).as_ref(), *operator, Some(expected)),
            Predicate::And(preds) => preds.iter().all(|p| p.apply(item)),
            Predicate::Or(preds) => preds.iter().any(|p| p.apply(item)),
            Predicate::Not(pred) => !pred.apply(item),
            Predicate::Conditional {
                resolved,
                when_true,
                when_false,
                ..
            } => match resolved {
                Some(true) => when_true.apply(item),
                Some(false) => when_false.as_ref().is_some_and(|p| p.apply(item)),
                None => false,
            },
        }
    }

    /// Returns a copy with every conditional branch fixed by evaluating
    /// its condition against `eval`. Called once per audit attempt,
    /// outside the item loop.
    pub fn resolve_conditions(&self, eval: &dyn Fn(&PredicateExpression) -> bool) -> Predicate {
        match self {
            Predicate::Single { .. } => self.clone(),
            Predicate::And(preds) => {
                Predicate::And(preds.iter().map(|p| p.resolve_conditions(eval)).collect())
            }
            Predicate::Or(preds) => {
                Predicate::Or(preds.iter().map(|p| p.resolve_conditions(eval)).collect())
            }
            Predicate::Not(pred) => Predicate::Not(Box::new(pred.resolve_conditions(eval))),
            Predicate::Conditional {
                condition,
                when_true,
                when_false,
                ..
            } => Predicate::Conditional {
                condition: condition.clone(),
                resolved: Some(eval(condition)),
                when_true: Box::new(when_true.resolve_conditions(eval)),
                when_false: when_false
                    .as_ref()
                    .map(|p| Box::new(p.resolve_conditions(eval))),
            },
        }
    }

    /// Keys mentioned anywhere in the predicate, for validation.
    pub fn keys(&self) -> Vec<FactKey> {
        match self {
            Predicate::Single { key, .. } => vec![*key],
            Predicate::And(preds) | Predicate::Or(preds) => {
                preds.iter().flat_map(Predicate::keys).collect()
            }
            Predicate::Not(pred) => pred.keys(),
            Predicate::Conditional {
                when_true,
                when_false,
                ..
            } => {
                let mut keys = when_true.keys();
                if let Some(p) = when_false {
                    keys.extend(p.keys());
                }
                keys
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Predicate::Single {
                key,
                operator,
                expected,
            } => json!({
                "type": "predicate",
                "key": key,
                "operator": operator,
                "expected": expected,
            }),
            Predicate::And(preds) => json!({
                "type": "pred--and",
                "predicates": preds.iter().map(Predicate::to_json).collect::<Vec<_>>(),
            }),
            Predicate::Or(preds) => json!({
                "type": "pred--or",
                "predicates": preds.iter().map(Predicate::to_json).collect::<Vec<_>>(),
            }),
            Predicate::Not(pred) => json!({
                "type": "pred--not",
                "predicate": pred.to_json(),
            }),
            Predicate::Conditional {
                condition,
                resolved,
                when_true,
                when_false,
            } => json!({
                "type": "pred--if",
                "condition": condition.to_json(),
                "resolved": resolved,
                "when_true": when_true.to_json(),
                "when_false": when_false.as_ref().map(|p| p.to_json()),
            }),
        }
    }
}
