//! Context-level boolean expressions.
//!
//! These are the conditions behind conditional rules and conditional
//! predicates. They ask about the student as a whole rather than about
//! one item, so they are evaluated once per audit attempt and the
//! answer is frozen into the evaluated copy.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// A primitive question about the audit context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", content = "argument", rename_all = "kebab-case")]
pub enum PredicateFunction {
    /// Any course with this identity on the transcript.
    HasCourse(String),
    /// An in-progress course with this identity.
    HasIpCourse(String),
    /// A completed (not in-progress) course with this identity.
    HasCompletedCourse(String),
    /// The student has declared an area with this code.
    HasDeclaredAreaCode(String),
    /// The student has passed the named proficiency exam.
    PassedProficiencyExam(String),
}

/// A boolean combination of [`PredicateFunction`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateExpression {
    Function(PredicateFunction),
    And(Vec<PredicateExpression>),
    Or(Vec<PredicateExpression>),
    Not(Box<PredicateExpression>),
}

impl PredicateExpression {
    pub fn function(f: PredicateFunction) -> PredicateExpression {
        PredicateExpression::Function(f)
    }

    /// Evaluates the expression, answering each leaf with `lookup`.
    pub fn evaluate(&self, lookup: &dyn Fn(&PredicateFunction) -> bool) -> bool {
        match self {
            PredicateExpression::Function(f) => lookup(f),
            PredicateExpression::And(exprs) => exprs.iter().all(|e| e.evaluate(lookup)),
            PredicateExpression::Or(exprs) => exprs.iter().any(|e| e.evaluate(lookup)),
            PredicateExpression::Not(expr) => !expr.evaluate(lookup),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PredicateExpression::Function(f) => json!({
                "type": "predicate-expression",
                "expression": f,
            }),
            PredicateExpression::And(exprs) => json!({
                "type": "pred-expr--and",
                "expressions": exprs.iter().map(PredicateExpression::to_json).collect::<Vec<_>>(),
            }),
            PredicateExpression::Or(exprs) => json!({
                "type": "pred-expr--or",
                "expressions": exprs.iter().map(PredicateExpression::to_json).collect::<Vec<_>>(),
            }),
            PredicateExpression::Not(expr) => json!({
                "type": "pred-expr--not",
                "expression": expr.to_json(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_composition() {
        let has_121 = PredicateExpression::function(PredicateFunction::HasCourse("CSCI 121".into()));
        let has_125 = PredicateExpression::function(PredicateFunction::HasCourse("CSCI 125".into()));

        let lookup = |f: &PredicateFunction| match f {
            PredicateFunction::HasCourse(c) => c == "CSCI 121",
            _ => false,
        };

        assert!(has_121.evaluate(&lookup));
        assert!(!has_125.evaluate(&lookup));

        let either = PredicateExpression::Or(vec![has_121.clone(), has_125.clone()]);
        assert!(either.evaluate(&lookup));

        let both = PredicateExpression::And(vec![has_121.clone(), has_125]);
        assert!(!both.evaluate(&lookup));

        let negated = PredicateExpression::Not(Box::new(has_121));
        assert!(!negated.evaluate(&lookup));
    }

    #[test]
    fn test_function_wire_form() {
        let f = PredicateFunction::HasDeclaredAreaCode("710".into());
        assert_eq!(
            serde_json::to_string(&f).unwrap(),
            r#"{"function":"has-declared-area-code","argument":"710"}"#
        );
    }
}
