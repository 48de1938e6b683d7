//! Assertions: measured claims about a matched item set.
//!
//! An assertion reduces its input to a scalar and compares it against
//! an expected target, settling on a status that distinguishes "passed
//! with completed work" from "passes only if in-progress work lands"
//! and "can never pass no matter how many more items arrive".

mod reduce;

pub use reduce::{reduce, Reduced, ReduceInput, ReducerKey};

use crate::context::RequirementContext;
use crate::op::{apply_operator, Operator, Value};
use crate::path::Path;
use crate::predicate::{Predicate, PredicateExpression};
use crate::status::ResultStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

/// One measured requirement over a matched item set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub key: ReducerKey,
    pub operator: Operator,
    pub expected: Decimal,
    /// The expected value as written, before any Value exception.
    pub original: Option<Decimal>,
    pub predicate: Option<Predicate>,
    /// With `>=`, marks "exactly this many": the size pruning treats
    /// the expectation as an upper bound too.
    pub at_most: bool,
    pub treat_in_progress_as_pass: bool,
    pub message: Option<String>,
    pub path: Path,
}

impl Assertion {
    pub fn new(key: ReducerKey, operator: Operator, expected: Decimal) -> Assertion {
        Assertion {
            key,
            operator,
            expected,
            original: None,
            predicate: None,
            at_most: false,
            treat_in_progress_as_pass: false,
            message: None,
            path: Path::root(),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Assertion {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_at_most(mut self) -> Assertion {
        self.at_most = true;
        self
    }

    pub fn with_treat_in_progress_as_pass(mut self) -> Assertion {
        self.treat_in_progress_as_pass = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Assertion {
        self.message = Some(message.into());
        self
    }

    pub fn at_path(mut self, path: Path) -> Assertion {
        self.path = path;
        self
    }

    /// Largest count target among simple counting assertions, used by
    /// queries to prune candidate subset sizes.
    pub fn simple_count_target(&self) -> Option<usize> {
        use rust_decimal::prelude::ToPrimitive;
        if self.key.is_simple_count() && self.predicate.is_none() {
            self.expected.to_usize()
        } else {
            None
        }
    }

    /// Credit-sum target of a simple sum assertion, for the same purpose.
    pub fn simple_sum_target(&self) -> Option<Decimal> {
        if self.key.is_simple_sum() && self.predicate.is_none() {
            Some(self.expected)
        } else {
            None
        }
    }

    /// Evaluates against `input`, consulting the context's exceptions
    /// for waivers, replaced targets, and inserted courses.
    pub fn evaluate(&self, input: ReduceInput<'_>, ctx: &RequirementContext) -> AssertionResult {
        if ctx.exceptions.is_waived(&self.path) {
            return AssertionResult {
                assertion: self.clone(),
                status: ResultStatus::Waived,
                resolved_value: None,
                resolved_items: Vec::new(),
                resolved_clbids: BTreeSet::new(),
                inserted_clbids: Vec::new(),
            };
        }

        let mut assertion = self.clone();
        if let Some(value) = ctx.exceptions.value_override(&self.path) {
            assertion.original = Some(assertion.expected);
            assertion.expected = value;
        }

        let inserted: Vec<String> = ctx.exceptions.insertions(&self.path);
        let mut filtered;
        let input = match input {
            ReduceInput::Courses(courses) => {
                filtered = match &assertion.predicate {
                    Some(p) => courses.iter().filter(|c| p.apply(*c)).cloned().collect(),
                    None => courses.to_vec(),
                };
                for clbid in &inserted {
                    if let Some(c) = ctx.find_course_by_clbid(clbid) {
                        if !filtered.iter().any(|f| f.clbid == c.clbid) {
                            filtered.push(c.clone());
                        }
                    }
                }
                ReduceInput::Courses(&filtered)
            }
            other => other,
        };

        let reduced = reduce(assertion.key, input);
        let status = assertion.derive_status(&reduced, input);

        AssertionResult {
            status,
            resolved_value: Some(reduced.value),
            resolved_items: reduced.data,
            resolved_clbids: reduced.courses.iter().map(|c| c.clbid.clone()).collect(),
            inserted_clbids: inserted,
            assertion,
        }
    }

    fn passes(&self, value: Decimal) -> bool {
        apply_operator(
            Some(&Value::Decimal(value)),
            self.operator,
            Some(&Value::Decimal(self.expected)),
        )
    }

    fn derive_status(&self, reduced: &Reduced, input: ReduceInput<'_>) -> ResultStatus {
        if self.passes(reduced.value) {
            let in_progress: Vec<_> =
                reduced.courses.iter().filter(|c| c.is_in_progress).collect();

            if in_progress.is_empty() || self.treat_in_progress_as_pass {
                return ResultStatus::Done;
            }

            // does it still pass on completed work alone? re-reduce over
            // the whole input, not the contributing subset: the reducer
            // may settle on a different subset once IP courses are gone
            let completed: Vec<_> = input
                .courses()
                .iter()
                .filter(|c| !c.is_in_progress)
                .cloned()
                .collect();
            let re_reduced = reduce(self.key, ReduceInput::Courses(&completed));
            if self.passes(re_reduced.value) {
                return ResultStatus::Done;
            }

            // any registered future course keeps the whole assertion at
            // PendingRegistered, even alongside current-term work
            let registered = in_progress.iter().any(|c| c.is_in_progress_in_future);
            return if registered {
                ResultStatus::PendingRegistered
            } else {
                ResultStatus::PendingCurrent
            };
        }

        match self.operator {
            Operator::GreaterThan => {
                if reduced.value > Decimal::ZERO && reduced.value <= self.expected {
                    return ResultStatus::NeedsMoreItems;
                }
            }
            Operator::GreaterThanOrEqualTo | Operator::EqualTo => {
                if reduced.value > Decimal::ZERO && reduced.value < self.expected {
                    return ResultStatus::NeedsMoreItems;
                }
            }
            Operator::LessThan | Operator::LessThanOrEqualTo => {
                // over the cap already; more items can never fix it
                return ResultStatus::FailedInvariant;
            }
            _ => {}
        }

        ResultStatus::Empty
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "assertion",
            "path": self.path,
            "key": self.key,
            "operator": self.operator,
            "expected": self.expected.to_string(),
            "original": self.original.map(|d| d.to_string()),
            "where": self.predicate.as_ref().map(Predicate::to_json),
            "message": self.message,
        })
    }
}

/// An assertion, possibly guarded by a context-level condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyAssertion {
    Single(Assertion),
    Conditional {
        condition: PredicateExpression,
        when_true: Box<Assertion>,
        when_false: Option<Box<Assertion>>,
    },
}

impl AnyAssertion {
    /// Picks the live branch for this student, if any.
    pub fn resolve<'a>(&'a self, ctx: &RequirementContext) -> Option<&'a Assertion> {
        match self {
            AnyAssertion::Single(a) => Some(a),
            AnyAssertion::Conditional {
                condition,
                when_true,
                when_false,
            } => {
                if ctx.evaluate_expression(condition) {
                    Some(when_true)
                } else {
                    when_false.as_deref()
                }
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AnyAssertion::Single(a) => a.to_json(),
            AnyAssertion::Conditional {
                condition,
                when_true,
                when_false,
            } => json!({
                "type": "assertion--if",
                "condition": condition.to_json(),
                "when_true": when_true.to_json(),
                "when_false": when_false.as_ref().map(|a| a.to_json()),
            }),
        }
    }
}

/// The evaluated form of one assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionResult {
    pub assertion: Assertion,
    pub status: ResultStatus,
    pub resolved_value: Option<Decimal>,
    pub resolved_items: Vec<String>,
    pub resolved_clbids: BTreeSet<String>,
    pub inserted_clbids: Vec<String>,
}

impl AssertionResult {
    pub fn ok(&self) -> bool {
        self.status.is_passing()
    }

    /// Fractional progress: full marks for a pass, nothing for caps and
    /// unmeasured assertions, partial credit otherwise.
    pub fn rank(&self) -> (Decimal, Decimal) {
        if matches!(self.status, ResultStatus::Done | ResultStatus::Waived) {
            return (Decimal::ONE, Decimal::ONE);
        }

        if matches!(
            self.assertion.operator,
            Operator::LessThan | Operator::LessThanOrEqualTo
        ) {
            return (Decimal::ZERO, Decimal::ONE);
        }

        match self.resolved_value {
            Some(value) if self.assertion.expected > Decimal::ZERO => {
                let fraction = (value / self.assertion.expected).min(Decimal::ONE);
                (fraction, Decimal::ONE)
            }
            _ => (Decimal::ZERO, Decimal::ONE),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (rank, max_rank) = self.rank();
        json!({
            "type": "assertion-result",
            "assertion": self.assertion.to_json(),
            "status": self.status,
            "rank": rank.to_string(),
            "max_rank": max_rank.to_string(),
            "resolved": self.resolved_value.map(|d| d.to_string()),
            "resolved_items": self.resolved_items,
            "resolved_clbids": self.resolved_clbids,
            "inserted_clbids": self.inserted_clbids,
        })
    }
}

/// One assertion's place in an audited result: either evaluated against
/// the matched items, or deliberately left unevaluated (a cap clause
/// over an empty claim set stays open rather than counting as passed).
#[derive(Debug, Clone, PartialEq)]
pub enum AssertionOutcome {
    Evaluated(AssertionResult),
    Skipped(Assertion),
}

impl AssertionOutcome {
    pub fn status(&self) -> ResultStatus {
        match self {
            AssertionOutcome::Evaluated(r) => r.status,
            AssertionOutcome::Skipped(_) => ResultStatus::Empty,
        }
    }

    pub fn ok(&self) -> bool {
        self.status().is_passing()
    }

    pub fn rank(&self) -> (Decimal, Decimal) {
        match self {
            AssertionOutcome::Evaluated(r) => r.rank(),
            AssertionOutcome::Skipped(_) => (Decimal::ZERO, Decimal::ONE),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AssertionOutcome::Evaluated(r) => r.to_json(),
            AssertionOutcome::Skipped(a) => json!({
                "type": "assertion-result",
                "assertion": a.to_json(),
                "status": ResultStatus::Empty,
                "rank": "0",
                "max_rank": "1",
                "resolved": serde_json::Value::Null,
            }),
        }
    }
}

/// Subset sizes worth trying for an assertion over `operator` and
/// `expected`, given `maximum` available items. Callers enumerate only
/// these sizes instead of brute-forcing `1..n`.
pub fn input_size_range(
    operator: Operator,
    expected: usize,
    at_most: bool,
    maximum: usize,
) -> Vec<usize> {
    match operator {
        Operator::EqualTo => exactly(expected, maximum),
        Operator::GreaterThanOrEqualTo if at_most => exactly(expected, maximum),
        Operator::GreaterThanOrEqualTo => {
            if maximum < expected {
                vec![maximum]
            } else {
                (expected..(expected + 1).max(maximum + 1)).collect()
            }
        }
        Operator::GreaterThan => {
            if maximum < expected {
                vec![maximum]
            } else {
                ((expected + 1)..(expected + 2).max(maximum + 1)).collect()
            }
        }
        Operator::NotEqualTo => (0..expected)
            .chain((expected + 1)..(expected + 1).max(maximum + 1))
            .collect(),
        Operator::LessThan => (0..expected).collect(),
        Operator::LessThanOrEqualTo => (0..=expected).collect(),
        Operator::In | Operator::NotIn => (0..=maximum).collect(),
    }
}

fn exactly(expected: usize, maximum: usize) -> Vec<usize> {
    if maximum < expected {
        vec![maximum]
    } else {
        vec![expected]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CourseInstance;
    use rust_decimal_macros::dec;

    fn ctx_with(courses: Vec<CourseInstance>) -> RequirementContext {
        RequirementContext::new(courses)
    }

    fn completed(n: usize) -> Vec<CourseInstance> {
        (0..n)
            .map(|i| CourseInstance::builder(i.to_string(), format!("DEPT {}", 100 + i)).build())
            .collect()
    }

    #[test]
    fn test_count_pass_is_done() {
        let courses = completed(3);
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(3));
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::Done);
        assert!(r.ok());
        assert_eq!(r.rank(), (dec!(1), dec!(1)));
    }

    #[test]
    fn test_partial_count_needs_more_items() {
        let courses = completed(2);
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(4));
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::NeedsMoreItems);
        assert_eq!(r.rank(), (dec!(0.5), dec!(1)));
    }

    #[test]
    fn test_zero_count_is_empty() {
        let ctx = ctx_with(Vec::new());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(2));
        let r = a.evaluate(ReduceInput::Courses(&[]), &ctx);
        assert_eq!(r.status, ResultStatus::Empty);
    }

    #[test]
    fn test_cap_overflow_is_failed_invariant() {
        let courses = completed(3);
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::LessThanOrEqualTo, dec!(2));
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::FailedInvariant);
        assert_eq!(r.rank(), (dec!(0), dec!(1)));
    }

    #[test]
    fn test_all_future_in_progress_is_pending_registered() {
        let courses: Vec<CourseInstance> = (0..3)
            .map(|i| {
                CourseInstance::builder(i.to_string(), format!("DEPT {}", 100 + i))
                    .in_progress_in_future()
                    .build()
            })
            .collect();
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(3));
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::PendingRegistered);
    }

    #[test]
    fn test_current_term_in_progress_is_pending_current() {
        let mut courses = completed(2);
        courses.push(
            CourseInstance::builder("9", "DEPT 300").in_progress_this_term().build(),
        );
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(3));
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::PendingCurrent);
    }

    #[test]
    fn test_pass_on_completed_work_alone_is_done() {
        let mut courses = completed(3);
        courses.push(
            CourseInstance::builder("9", "DEPT 300").in_progress_this_term().build(),
        );
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(3));
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::Done);
    }

    #[test]
    fn test_completed_subject_satisfies_despite_in_progress_pick() {
        // the single-subject reducer picks AAAA first; stripping its IP
        // course must not hide that BBBB completes the target on its own
        let courses = vec![
            CourseInstance::builder("1", "AAAA 101")
                .credits(dec!(3))
                .in_progress_this_term()
                .build(),
            CourseInstance::builder("2", "BBBB 101").credits(dec!(3)).build(),
        ];
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(
            ReducerKey::SumCreditsFromSingleSubject,
            Operator::GreaterThanOrEqualTo,
            dec!(3),
        );
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::Done);
    }

    #[test]
    fn test_registered_contributor_wins_over_current_term() {
        let courses = vec![
            CourseInstance::builder("1", "DEPT 100").in_progress_this_term().build(),
            CourseInstance::builder("2", "DEPT 200").in_progress_in_future().build(),
        ];
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(2));
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::PendingRegistered);
    }

    #[test]
    fn test_treat_in_progress_as_pass() {
        let courses: Vec<CourseInstance> = (0..2)
            .map(|i| {
                CourseInstance::builder(i.to_string(), format!("DEPT {}", 100 + i))
                    .in_progress_in_future()
                    .build()
            })
            .collect();
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(2))
            .with_treat_in_progress_as_pass();
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::Done);
    }

    #[test]
    fn test_waive_exception() {
        use crate::exception::{ExceptionSet, RuleException};

        let path = Path::root().append("assertions").append_index(0);
        let ctx = ctx_with(Vec::new())
            .with_exceptions(ExceptionSet::new(vec![RuleException::waive(path.clone())]));
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(5))
            .at_path(path);
        let r = a.evaluate(ReduceInput::Courses(&[]), &ctx);
        assert_eq!(r.status, ResultStatus::Waived);
        assert_eq!(r.rank(), (dec!(1), dec!(1)));
    }

    #[test]
    fn test_value_exception_replaces_target() {
        use crate::exception::{ExceptionSet, RuleException};

        let path = Path::root().append("assertions").append_index(0);
        let courses = completed(2);
        let ctx = ctx_with(courses.clone())
            .with_exceptions(ExceptionSet::new(vec![RuleException::value(path.clone(), dec!(2))]));
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(4))
            .at_path(path);
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.status, ResultStatus::Done);
        assert_eq!(r.assertion.expected, dec!(2));
        assert_eq!(r.assertion.original, Some(dec!(4)));
    }

    #[test]
    fn test_where_filter() {
        use crate::op::Operator;
        use crate::predicate::{FactKey, Predicate};

        let courses = vec![
            CourseInstance::builder("1", "CSCI 121").build(),
            CourseInstance::builder("2", "MATH 230").build(),
        ];
        let ctx = ctx_with(courses.clone());
        let a = Assertion::new(ReducerKey::CountCourses, Operator::GreaterThanOrEqualTo, dec!(1))
            .with_predicate(Predicate::single(FactKey::Subject, Operator::EqualTo, "CSCI"));
        let r = a.evaluate(ReduceInput::Courses(&courses), &ctx);
        assert_eq!(r.resolved_value, Some(dec!(1)));
        assert_eq!(r.resolved_clbids, ["1".to_string()].into());
    }

    #[test]
    fn test_input_size_range_table() {
        use Operator::*;

        // maximum > expected
        assert_eq!(input_size_range(EqualTo, 2, false, 5), vec![2]);
        assert_eq!(input_size_range(GreaterThanOrEqualTo, 2, true, 5), vec![2]);
        assert_eq!(input_size_range(GreaterThanOrEqualTo, 2, false, 5), vec![2, 3, 4, 5]);
        assert_eq!(input_size_range(GreaterThan, 2, false, 5), vec![3, 4, 5]);
        assert_eq!(input_size_range(NotEqualTo, 2, false, 5), vec![0, 1, 3, 4, 5]);
        assert_eq!(input_size_range(LessThan, 2, false, 5), vec![0, 1]);
        assert_eq!(input_size_range(LessThanOrEqualTo, 2, false, 5), vec![0, 1, 2]);

        // maximum == expected
        assert_eq!(input_size_range(EqualTo, 3, false, 3), vec![3]);
        assert_eq!(input_size_range(GreaterThanOrEqualTo, 3, false, 3), vec![3]);
        assert_eq!(input_size_range(GreaterThan, 3, false, 3), vec![4]);

        // maximum < expected
        assert_eq!(input_size_range(EqualTo, 4, false, 2), vec![2]);
        assert_eq!(input_size_range(GreaterThanOrEqualTo, 4, false, 2), vec![2]);
        assert_eq!(input_size_range(GreaterThan, 4, false, 2), vec![2]);
    }

    #[test]
    fn test_conditional_assertion_resolution() {
        use crate::predicate::PredicateFunction;

        let courses = completed(1);
        let ctx = ctx_with(courses);

        let guarded = AnyAssertion::Conditional {
            condition: PredicateExpression::function(PredicateFunction::HasCourse(
                "DEPT 100".to_string(),
            )),
            when_true: Box::new(Assertion::new(
                ReducerKey::CountCourses,
                Operator::GreaterThanOrEqualTo,
                dec!(1),
            )),
            when_false: None,
        };

        assert!(guarded.resolve(&ctx).is_some());

        let no_branch = AnyAssertion::Conditional {
            condition: PredicateExpression::function(PredicateFunction::HasCourse(
                "DEPT 999".to_string(),
            )),
            when_true: Box::new(Assertion::new(
                ReducerKey::CountCourses,
                Operator::GreaterThanOrEqualTo,
                dec!(1),
            )),
            when_false: None,
        };

        assert!(no_branch.resolve(&ctx).is_none());
    }
}
