//! The query rule: filter a data source, choose a subset, assert over it.
//!
//! Queries are where the search space lives. The filtered pool is
//! partitioned by the rule's limits into candidate transcripts, and for
//! each one the rule enumerates candidate subsets. The subset sizes are
//! pruned by the rule's own assertions: a plain counting assertion pins
//! the sizes worth trying, a plain credit-sum assertion discards
//! subsets that cannot reach the target, and only assertion shapes with
//! no usable bound fall back to every size.

use crate::assertion::{
    input_size_range, AnyAssertion, Assertion, AssertionOutcome, ReduceInput,
};
use crate::claims::Claim;
use crate::context::RequirementContext;
use crate::data::{AreaPointer, CourseInstance, Performance};
use crate::error::RuleError;
use crate::limit::{ncr, AnyLimit, Limit, LimitSet};
use crate::op::{Operator, Value};
use crate::path::Path;
use crate::predicate::{FactKey, Predicate};
use crate::status::{tiers, ResultStatus};
use crate::stream::or_else;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::trace;

use super::Solution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuerySource {
    Courses,
    /// Courses already claimed elsewhere in the tree; resolved at audit
    /// time, after the claiming rules have run.
    Claimed,
    Areas,
    Performances,
}

#[derive(Debug, Clone)]
pub struct QueryRule {
    pub source: QuerySource,
    pub predicate: Option<Predicate>,
    pub limits: LimitSet,
    pub assertions: Vec<AnyAssertion>,
    pub allow_claimed: bool,
    /// Claim the chosen courses exclusively. Off for informational
    /// queries that must not contend with real requirements.
    pub attempt_claims: bool,
    /// When not attempting exclusive claims, still record shared claims
    /// so downstream from-claimed rules can see the courses.
    pub record_claims: bool,
    pub path: Path,
}

impl QueryRule {
    pub fn over(source: QuerySource) -> QueryRule {
        QueryRule {
            source,
            predicate: None,
            limits: LimitSet::default(),
            assertions: Vec::new(),
            allow_claimed: false,
            attempt_claims: source == QuerySource::Courses,
            record_claims: true,
            path: Path::root(),
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> QueryRule {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_limits(mut self, limits: Vec<Limit>) -> QueryRule {
        self.limits = LimitSet::new(limits);
        self
    }

    pub fn with_conditional_limit(mut self, limit: AnyLimit) -> QueryRule {
        self.limits.limits.push(limit);
        self
    }

    fn resolved_limits(&self, ctx: &RequirementContext) -> LimitSet {
        self.limits.resolve(&|expr| ctx.evaluate_expression(expr))
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> QueryRule {
        self.assertions.push(AnyAssertion::Single(assertion));
        self
    }

    pub fn with_conditional_assertion(mut self, assertion: AnyAssertion) -> QueryRule {
        self.assertions.push(assertion);
        self
    }

    pub fn with_allow_claimed(mut self) -> QueryRule {
        self.allow_claimed = true;
        self
    }

    pub fn without_attempt_claims(mut self) -> QueryRule {
        self.attempt_claims = false;
        self
    }

    pub fn without_record_claims(mut self) -> QueryRule {
        self.record_claims = false;
        self
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        let allowed = |key: FactKey| match self.source {
            QuerySource::Courses | QuerySource::Claimed => key.is_course_key(),
            QuerySource::Areas => key.is_area_key() || key == FactKey::Name,
            QuerySource::Performances => {
                key.is_performance_key() || matches!(key, FactKey::Year | FactKey::Term)
            }
        };

        let mut predicates: Vec<&Predicate> = self.predicate.iter().collect();
        for clause in &self.assertions {
            let (a, b) = match clause {
                AnyAssertion::Single(a) => (Some(a), None),
                AnyAssertion::Conditional {
                    when_true,
                    when_false,
                    ..
                } => (Some(when_true.as_ref()), when_false.as_deref()),
            };
            for assertion in a.into_iter().chain(b) {
                predicates.extend(assertion.predicate.iter());
            }
        }
        for limit in &self.limits.limits {
            match limit {
                AnyLimit::Single(l) => predicates.push(&l.predicate),
                AnyLimit::Conditional {
                    when_true,
                    when_false,
                    ..
                } => {
                    predicates.push(&when_true.predicate);
                    if let Some(l) = when_false {
                        predicates.push(&l.predicate);
                    }
                }
            }
        }

        for predicate in predicates {
            validate_predicate(predicate, &self.path, &allowed)?;
        }
        Ok(())
    }

    fn resolved_predicate(&self, ctx: &RequirementContext) -> Option<Predicate> {
        self.predicate
            .as_ref()
            .map(|p| p.resolve_conditions(&|expr| ctx.evaluate_expression(expr)))
    }

    /// The filtered course pool: where-clause matches plus inserted
    /// courses, minus blocked ones. Insertions bypass the where clause.
    pub fn filtered_courses(&self, ctx: &RequirementContext) -> Vec<CourseInstance> {
        let predicate = self.resolved_predicate(ctx);
        let blocked = ctx.exceptions.blocked_clbids(&self.path);

        let mut pool: Vec<CourseInstance> = ctx
            .transcript()
            .iter()
            .filter(|c| predicate.as_ref().is_none_or(|p| p.apply(*c)))
            .cloned()
            .collect();

        for clbid in ctx.exceptions.insertions(&self.path) {
            if let Some(c) = ctx.find_course_by_clbid(&clbid) {
                if !pool.iter().any(|p| p.clbid == c.clbid) {
                    pool.push(c.clone());
                }
            }
        }

        pool.retain(|c| !blocked.contains(&c.clbid));
        pool
    }

    fn filtered_areas(&self, ctx: &RequirementContext) -> Vec<AreaPointer> {
        let predicate = self.resolved_predicate(ctx);
        ctx.areas
            .iter()
            .filter(|a| predicate.as_ref().is_none_or(|p| p.apply(*a)))
            .cloned()
            .collect()
    }

    fn filtered_performances(&self, ctx: &RequirementContext) -> Vec<Performance> {
        let predicate = self.resolved_predicate(ctx);
        ctx.performances
            .iter()
            .filter(|p| predicate.as_ref().is_none_or(|pred| pred.apply(*p)))
            .cloned()
            .collect()
    }

    fn resolved_assertions(&self, ctx: &RequirementContext) -> Vec<Assertion> {
        self.assertions
            .iter()
            .filter_map(|a| a.resolve(ctx).cloned())
            .collect()
    }

    pub fn has_potential(&self, ctx: &RequirementContext) -> bool {
        match self.source {
            QuerySource::Claimed => true,
            QuerySource::Courses => !self.filtered_courses(ctx).is_empty(),
            QuerySource::Areas => !self.filtered_areas(ctx).is_empty(),
            QuerySource::Performances => !self.filtered_performances(ctx).is_empty(),
        }
    }

    pub fn all_matches(&self, ctx: &RequirementContext) -> Vec<CourseInstance> {
        match self.source {
            QuerySource::Courses => self.filtered_courses(ctx),
            _ => Vec::new(),
        }
    }

    pub fn is_always_disjoint(&self) -> bool {
        self.allow_claimed && !self.attempt_claims && self.source != QuerySource::Claimed
    }

    pub fn is_never_disjoint(&self) -> bool {
        self.source == QuerySource::Claimed
    }

    pub fn estimate(&self, ctx: &RequirementContext) -> u64 {
        match self.source {
            QuerySource::Claimed => 1,
            QuerySource::Courses => {
                let pool = self.filtered_courses(ctx);
                let transcripts = self.resolved_limits(ctx).estimate(&pool).max(1) as u64;
                transcripts.saturating_mul(subset_estimate(
                    pool.len(),
                    &self.resolved_assertions(ctx),
                ))
            }
            QuerySource::Areas => {
                subset_estimate(self.filtered_areas(ctx).len(), &self.resolved_assertions(ctx))
            }
            QuerySource::Performances => subset_estimate(
                self.filtered_performances(ctx).len(),
                &self.resolved_assertions(ctx),
            ),
        }
    }

    pub fn solutions<'a>(
        &'a self,
        ctx: &'a RequirementContext,
    ) -> Box<dyn Iterator<Item = Solution> + 'a> {
        if ctx.exceptions.is_waived(&self.path) {
            return Box::new(std::iter::once(self.solution(
                QueryOutput::Courses(Vec::new()),
                true,
            )));
        }

        match self.source {
            // resolved at audit time from the shared ledger
            QuerySource::Claimed => Box::new(std::iter::once(
                self.solution(QueryOutput::Courses(Vec::new()), false),
            )),

            QuerySource::Courses => {
                let pool = self.filtered_courses(ctx);
                let assertions = self.resolved_assertions(ctx);
                let forced = ctx.exceptions.all_forced_insertions();
                trace!(path = %self.path, pool = pool.len(), "enumerating query solutions");

                let fallback_pool = pool.clone();
                let inner = self
                    .resolved_limits(ctx)
                    .limited_transcripts(&pool, &forced)
                    .flat_map(move |transcript| -> Box<dyn Iterator<Item = Solution> + 'a> {
                        if !self.attempt_claims {
                            // completed-courses-only first, then everything
                            let completed: Vec<CourseInstance> = transcript
                                .iter()
                                .filter(|c| !c.is_in_progress)
                                .cloned()
                                .collect();
                            let both = vec![
                                self.solution(QueryOutput::Courses(completed), false),
                                self.solution(QueryOutput::Courses(transcript), false),
                            ];
                            Box::new(both.into_iter())
                        } else {
                            self.iterate_course_sets(transcript, &assertions)
                        }
                    });

                // a query always yields at least its whole pool
                Box::new(or_else(inner, move || {
                    std::iter::once(self.solution(QueryOutput::Courses(fallback_pool), false))
                }))
            }

            QuerySource::Areas => {
                let pool = self.filtered_areas(ctx);
                let assertions = self.resolved_assertions(ctx);
                let fallback = self.solution(QueryOutput::Areas(pool.clone()), false);
                let inner = self
                    .subset_sizes(pool.len(), &assertions)
                    .into_iter()
                    .flat_map(move |size| {
                        pool.clone().into_iter().combinations(size).map(move |set| {
                            self.solution(QueryOutput::Areas(set), false)
                        })
                    });
                Box::new(or_else(inner, move || std::iter::once(fallback)))
            }

            QuerySource::Performances => {
                let pool = self.filtered_performances(ctx);
                let assertions = self.resolved_assertions(ctx);
                let fallback = self.solution(QueryOutput::Performances(pool.clone()), false);
                let inner = self
                    .subset_sizes(pool.len(), &assertions)
                    .into_iter()
                    .flat_map(move |size| {
                        pool.clone().into_iter().combinations(size).map(move |set| {
                            self.solution(QueryOutput::Performances(set), false)
                        })
                    });
                Box::new(or_else(inner, move || std::iter::once(fallback)))
            }
        }
    }

    /// Candidate subsets of one limited transcript, sizes pruned by the
    /// rule's assertions.
    fn iterate_course_sets<'a>(
        &'a self,
        transcript: Vec<CourseInstance>,
        assertions: &[Assertion],
    ) -> Box<dyn Iterator<Item = Solution> + 'a> {
        let len = transcript.len();

        if let Some(count) = largest_simple_count(assertions) {
            let sizes = input_size_range(count.operator, count.target, count.at_most, len);
            return Box::new(sizes.into_iter().flat_map(move |size| {
                transcript
                    .clone()
                    .into_iter()
                    .combinations(size)
                    .map(move |set| self.solution(QueryOutput::Courses(set), false))
            }));
        }

        if let Some(expected) = largest_simple_sum(assertions) {
            let total: Decimal = transcript.iter().map(|c| c.credits).sum();
            if total < expected {
                // cannot reach the target; the whole set is the best try
                return Box::new(std::iter::once(
                    self.solution(QueryOutput::Courses(transcript), false),
                ));
            }
            return Box::new((1..=len).flat_map(move |size| {
                transcript
                    .clone()
                    .into_iter()
                    .combinations(size)
                    .filter(move |set| set.iter().map(|c| c.credits).sum::<Decimal>() >= expected)
                    .map(move |set| self.solution(QueryOutput::Courses(set), false))
            }));
        }

        Box::new((1..=len).flat_map(move |size| {
            transcript
                .clone()
                .into_iter()
                .combinations(size)
                .map(move |set| self.solution(QueryOutput::Courses(set), false))
        }))
    }

    fn subset_sizes(&self, len: usize, assertions: &[Assertion]) -> Vec<usize> {
        match largest_simple_count(assertions) {
            Some(count) => input_size_range(count.operator, count.target, count.at_most, len),
            None => (1..=len).collect(),
        }
    }

    fn solution(&self, output: QueryOutput, overridden: bool) -> Solution {
        Solution::Query(QuerySolution {
            rule: self.clone(),
            output,
            overridden,
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "query",
            "path": self.path,
            "source": self.source,
            "where": self.predicate.as_ref().map(Predicate::to_json),
            "limit": self.limits.to_json(),
            "assertions": self.assertions.iter().map(AnyAssertion::to_json).collect::<Vec<_>>(),
            "allow_claimed": self.allow_claimed,
            "attempt_claims": self.attempt_claims,
            "record_claims": self.record_claims,
        })
    }
}

struct SimpleCount {
    operator: Operator,
    target: usize,
    at_most: bool,
}

fn largest_simple_count(assertions: &[Assertion]) -> Option<SimpleCount> {
    assertions
        .iter()
        .filter_map(|a| {
            a.simple_count_target().map(|target| SimpleCount {
                operator: a.operator,
                target,
                at_most: a.at_most,
            })
        })
        .max_by_key(|c| c.target)
}

fn largest_simple_sum(assertions: &[Assertion]) -> Option<Decimal> {
    assertions.iter().filter_map(Assertion::simple_sum_target).max()
}

fn subset_estimate(len: usize, assertions: &[Assertion]) -> u64 {
    let sizes: Vec<usize> = match largest_simple_count(assertions) {
        Some(count) => input_size_range(count.operator, count.target, count.at_most, len),
        None => (1..=len).collect(),
    };
    sizes
        .into_iter()
        .fold(0u64, |acc, size| acc.saturating_add(ncr(len, size) as u64))
        .max(1)
}

fn validate_predicate(
    predicate: &Predicate,
    path: &Path,
    allowed: &impl Fn(FactKey) -> bool,
) -> Result<(), RuleError> {
    match predicate {
        Predicate::Single {
            key,
            operator,
            expected,
        } => {
            if !allowed(*key) {
                return Err(RuleError::KeyNotInSource {
                    path: path.clone(),
                    key: *key,
                });
            }
            let ordering = matches!(
                operator,
                Operator::LessThan
                    | Operator::LessThanOrEqualTo
                    | Operator::GreaterThan
                    | Operator::GreaterThanOrEqualTo
            );
            if ordering && matches!(expected, Value::Tuple(_)) {
                return Err(RuleError::MultiValuedComparison { op: *operator });
            }
            Ok(())
        }
        Predicate::And(preds) | Predicate::Or(preds) => {
            preds.iter().try_for_each(|p| validate_predicate(p, path, allowed))
        }
        Predicate::Not(pred) => validate_predicate(pred, path, allowed),
        Predicate::Conditional {
            when_true,
            when_false,
            ..
        } => {
            validate_predicate(when_true, path, allowed)?;
            if let Some(p) = when_false {
                validate_predicate(p, path, allowed)?;
            }
            Ok(())
        }
    }
}

/// The typed item set a query solution selected.
#[derive(Debug, Clone)]
pub enum QueryOutput {
    Courses(Vec<CourseInstance>),
    Areas(Vec<AreaPointer>),
    Performances(Vec<Performance>),
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Courses(v) => v.len(),
            QueryOutput::Areas(v) => v.len(),
            QueryOutput::Performances(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct QuerySolution {
    pub rule: QueryRule,
    pub output: QueryOutput,
    pub overridden: bool,
}

impl QuerySolution {
    pub fn audit(&self, ctx: &RequirementContext) -> QueryResult {
        if self.overridden {
            return QueryResult {
                rule: self.rule.clone(),
                output: QueryOutput::Courses(Vec::new()),
                successful_claims: Vec::new(),
                failed_claims: Vec::new(),
                assertions: Vec::new(),
                overridden: true,
            };
        }

        let (output, successful_claims, failed_claims) = self.collect(ctx);
        let assertions = self.evaluate_assertions(ctx, &output);

        QueryResult {
            rule: self.rule.clone(),
            output,
            successful_claims,
            failed_claims,
            assertions,
            overridden: false,
        }
    }

    fn collect(&self, ctx: &RequirementContext) -> (QueryOutput, Vec<Claim>, Vec<Claim>) {
        let rule = &self.rule;

        if rule.source == QuerySource::Claimed {
            let mut pool = ctx.claimed_courses();
            let predicate = rule.resolved_predicate(ctx);
            pool.retain(|c| predicate.as_ref().is_none_or(|p| p.apply(c)));
            for clbid in ctx.exceptions.insertions(&rule.path) {
                if let Some(c) = ctx.find_course_by_clbid(&clbid) {
                    if !pool.iter().any(|p| p.clbid == c.clbid) {
                        pool.push(c.clone());
                    }
                }
            }

            let claims = pool
                .iter()
                .map(|c| ctx.make_claim(c, &rule.path, true))
                .collect();
            return (QueryOutput::Courses(pool), claims, Vec::new());
        }

        let QueryOutput::Courses(chosen) = &self.output else {
            return (self.output.clone(), Vec::new(), Vec::new());
        };

        if rule.attempt_claims {
            let forced = ctx.exceptions.forced_insertions(&rule.path);
            let mut kept = Vec::new();
            let mut successful = Vec::new();
            let mut failed = Vec::new();
            for course in chosen {
                let allow = rule.allow_claimed || forced.contains(&course.clbid);
                let claim = ctx.make_claim(course, &rule.path, allow);
                if claim.failed {
                    failed.push(claim);
                } else {
                    successful.push(claim);
                    kept.push(course.clone());
                }
            }
            (QueryOutput::Courses(kept), successful, failed)
        } else if rule.record_claims {
            let claims = chosen
                .iter()
                .map(|c| ctx.make_claim(c, &rule.path, true))
                .collect();
            (self.output.clone(), claims, Vec::new())
        } else {
            (self.output.clone(), Vec::new(), Vec::new())
        }
    }

    fn evaluate_assertions(
        &self,
        ctx: &RequirementContext,
        output: &QueryOutput,
    ) -> Vec<AssertionOutcome> {
        let resolved = self.rule.resolved_assertions(ctx);

        // with nothing claimed, evaluating a secondary cap clause would
        // count it as passed; leave the whole set open instead
        if self.rule.source == QuerySource::Courses && output.is_empty() {
            let has_secondary_cap = resolved.iter().skip(1).any(|a| {
                matches!(a.operator, Operator::LessThan | Operator::LessThanOrEqualTo)
            });
            if has_secondary_cap {
                return resolved.into_iter().map(AssertionOutcome::Skipped).collect();
            }
        }

        let input = match output {
            QueryOutput::Courses(v) => ReduceInput::Courses(v),
            QueryOutput::Areas(v) => ReduceInput::Areas(v),
            QueryOutput::Performances(v) => ReduceInput::Performances(v),
        };

        resolved
            .into_iter()
            .map(|a| AssertionOutcome::Evaluated(a.evaluate(input, ctx)))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut value = self.rule.to_json();
        if let Some(map) = value.as_object_mut() {
            map.insert("overridden".into(), json!(self.overridden));
            map.insert("output_len".into(), json!(self.output.len()));
        }
        value
    }
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rule: QueryRule,
    /// The items that survived claiming.
    pub output: QueryOutput,
    pub successful_claims: Vec<Claim>,
    pub failed_claims: Vec<Claim>,
    pub assertions: Vec<AssertionOutcome>,
    pub overridden: bool,
}

impl QueryResult {
    pub fn status(&self) -> ResultStatus {
        if self.overridden {
            return ResultStatus::Waived;
        }
        if self.assertions.is_empty() {
            return ResultStatus::Empty;
        }

        let statuses: Vec<ResultStatus> =
            self.assertions.iter().map(AssertionOutcome::status).collect();

        if statuses.contains(&ResultStatus::FailedInvariant) {
            return ResultStatus::FailedInvariant;
        }
        if tiers::all_within(&statuses, tiers::WAIVED_ONLY) {
            return ResultStatus::Waived;
        }
        if tiers::all_within(&statuses, tiers::WAIVED_AND_DONE) {
            return ResultStatus::Done;
        }
        if tiers::all_within(&statuses, tiers::WAIVED_DONE_CURRENT) {
            return ResultStatus::PendingCurrent;
        }
        if tiers::all_within(&statuses, tiers::WAIVED_DONE_CURRENT_PENDING) {
            return ResultStatus::PendingRegistered;
        }
        if tiers::all_within(&statuses, tiers::WAIVED_DONE_CURRENT_PENDING_INCOMPLETE) {
            return ResultStatus::NeedsMoreItems;
        }
        if statuses.iter().any(|s| !s.is_empty_ish()) {
            return ResultStatus::NeedsMoreItems;
        }
        ResultStatus::Empty
    }

    pub fn rank(&self) -> (Decimal, Decimal) {
        if self.overridden {
            return (Decimal::ONE, Decimal::ONE);
        }
        if self.assertions.is_empty() {
            return (Decimal::ZERO, Decimal::ONE);
        }
        self.assertions.iter().map(AssertionOutcome::rank).fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(r, m), (ar, am)| (r + ar, m + am),
        )
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.successful_claims.clone()
    }

    pub fn matched(&self) -> Vec<CourseInstance> {
        match &self.output {
            QueryOutput::Courses(v) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (rank, max_rank) = self.rank();
        let mut value = self.rule.to_json();
        if let Some(map) = value.as_object_mut() {
            map.insert("status".into(), json!(self.status()));
            map.insert("rank".into(), json!(rank.to_string()));
            map.insert("max_rank".into(), json!(max_rank.to_string()));
            map.insert("ok".into(), json!(self.status().is_passing()));
            map.insert("overridden".into(), json!(self.overridden));
            map.insert(
                "claims".into(),
                json!(self.successful_claims.iter().map(Claim::to_json).collect::<Vec<_>>()),
            );
            map.insert(
                "failures".into(),
                json!(self.failed_claims.iter().map(Claim::to_json).collect::<Vec<_>>()),
            );
            map.insert(
                "assertions".into(),
                json!(self.assertions.iter().map(AssertionOutcome::to_json).collect::<Vec<_>>()),
            );
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::ReducerKey;
    use crate::rule::{Rule, RuleResult, RuleTree};
    use rust_decimal_macros::dec;

    fn csci(n: usize) -> CourseInstance {
        CourseInstance::builder(n.to_string(), format!("CSCI {}", 100 + n)).build()
    }

    fn csci_pool(n: usize) -> Vec<CourseInstance> {
        (1..=n).map(csci).collect()
    }

    fn count_at_least(n: u32) -> Assertion {
        Assertion::new(
            ReducerKey::CountCourses,
            Operator::GreaterThanOrEqualTo,
            Decimal::from(n),
        )
    }

    fn tree(rule: QueryRule) -> RuleTree {
        RuleTree::new(Rule::Query(rule), Vec::new()).unwrap()
    }

    fn subject_is(subject: &str) -> Predicate {
        Predicate::single(FactKey::Subject, Operator::EqualTo, subject)
    }

    #[test]
    fn test_count_assertion_prunes_sizes() {
        let tree = tree(QueryRule::over(QuerySource::Courses).with_assertion(count_at_least(2)));
        let ctx = RequirementContext::new(csci_pool(4));

        // sizes 2..=4 of 4 courses
        let solutions: Vec<Solution> = tree.root.solutions(&ctx, 1).collect();
        assert_eq!(solutions.len(), 6 + 4 + 1);
    }

    #[test]
    fn test_at_most_pins_the_size() {
        let tree = tree(
            QueryRule::over(QuerySource::Courses)
                .with_assertion(count_at_least(2).with_at_most()),
        );
        let ctx = RequirementContext::new(csci_pool(4));

        let solutions: Vec<Solution> = tree.root.solutions(&ctx, 1).collect();
        assert_eq!(solutions.len(), 6);
    }

    #[test]
    fn test_short_credit_total_yields_whole_pool() {
        let tree = tree(QueryRule::over(QuerySource::Courses).with_assertion(Assertion::new(
            ReducerKey::SumCredits,
            Operator::GreaterThanOrEqualTo,
            dec!(10),
        )));
        let ctx = RequirementContext::new(csci_pool(3));

        let solutions: Vec<Solution> = tree.root.solutions(&ctx, 1).collect();
        assert_eq!(solutions.len(), 1, "3 credits can never reach 10");

        let result = solutions[0].audit(&ctx);
        assert_eq!(result.status(), ResultStatus::NeedsMoreItems);
    }

    #[test]
    fn test_where_clause_filters_the_pool() {
        let tree = tree(
            QueryRule::over(QuerySource::Courses)
                .with_predicate(subject_is("CSCI"))
                .with_assertion(count_at_least(1)),
        );
        let mut pool = csci_pool(1);
        pool.push(CourseInstance::builder("9", "MATH 230").build());
        let ctx = RequirementContext::new(pool);

        let best = tree
            .root
            .solutions(&ctx, 1)
            .map(|s| {
                ctx.reset_claims();
                s.audit(&ctx)
            })
            .find(|r| r.status() == ResultStatus::Done)
            .unwrap();
        assert_eq!(best.matched().len(), 1);
        assert_eq!(best.matched()[0].subject, "CSCI");
    }

    #[test]
    fn test_attempt_claims_contends_for_courses() {
        let first = tree(
            QueryRule::over(QuerySource::Courses)
                .with_predicate(subject_is("CSCI"))
                .with_assertion(count_at_least(1)),
        );
        let ctx = RequirementContext::new(csci_pool(1));

        let r1 = first.root.solutions(&ctx, 1).next().unwrap().audit(&ctx);
        assert_eq!(r1.status(), ResultStatus::Done);

        // same rule shape at a different path now loses the contest
        let second = tree(
            QueryRule::over(QuerySource::Courses)
                .with_predicate(subject_is("CSCI"))
                .with_assertion(count_at_least(1)),
        );
        let Rule::Query(q) = second.root.as_ref() else { panic!() };
        let mut q = q.clone();
        q.path = Path::root().append("other").append(".query");
        let r2 = q
            .solutions(&ctx)
            .map(|s| s.audit(&ctx))
            .find(|r| r.status() == ResultStatus::Done);
        assert!(r2.is_none());
    }

    #[test]
    fn test_informational_query_passes_courses_through() {
        let tree = tree(
            QueryRule::over(QuerySource::Courses)
                .without_attempt_claims()
                .without_record_claims()
                .with_assertion(count_at_least(1)),
        );
        let ctx = RequirementContext::new(csci_pool(2));

        // completed-only variant, then the full set
        let results: Vec<RuleResult> =
            tree.root.solutions(&ctx, 1).map(|s| s.audit(&ctx)).collect();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.claims().is_empty()));
        assert!(!ctx.has_claims());
    }

    #[test]
    fn test_claimed_source_sees_prior_claims() {
        let tree = tree(
            QueryRule::over(QuerySource::Claimed).with_assertion(count_at_least(1)),
        );
        let ctx = RequirementContext::new(csci_pool(2));

        let empty = tree.root.solutions(&ctx, 1).next().unwrap().audit(&ctx);
        assert_eq!(empty.status(), ResultStatus::Empty);

        let course = ctx.find_course_by_clbid("1").cloned().unwrap();
        ctx.make_claim(&course, &Path::root().append("*CSCI 101"), false);

        let after = tree.root.solutions(&ctx, 1).next().unwrap().audit(&ctx);
        assert_eq!(after.status(), ResultStatus::Done);
        assert_eq!(after.matched().len(), 1);
    }

    #[test]
    fn test_secondary_cap_stays_open_on_empty_pool() {
        let rule = QueryRule::over(QuerySource::Courses)
            .with_predicate(subject_is("CSCI"))
            .with_assertion(count_at_least(1))
            .with_assertion(Assertion::new(
                ReducerKey::CountCourses,
                Operator::LessThanOrEqualTo,
                dec!(3),
            ));
        let tree = tree(rule);
        let ctx = RequirementContext::new(vec![CourseInstance::builder("9", "MATH 230").build()]);

        let result = tree.root.solutions(&ctx, 1).next().unwrap().audit(&ctx);
        let RuleResult::Query(q) = &result else { panic!() };
        assert!(q
            .assertions
            .iter()
            .all(|a| matches!(a, AssertionOutcome::Skipped(_))));
        assert_eq!(result.status(), ResultStatus::Empty);
    }

    #[test]
    fn test_limits_partition_the_pool() {
        let limit = Limit::at_most_courses(1, subject_is("CSCI"));
        let tree = tree(
            QueryRule::over(QuerySource::Courses)
                .with_limits(vec![limit])
                .with_assertion(count_at_least(1).with_at_most()),
        );
        let ctx = RequirementContext::new(csci_pool(2));

        // limit selections: {}, {1}, {2}; one pinned-size subset each
        let solutions: Vec<Solution> = tree.root.solutions(&ctx, 1).collect();
        assert_eq!(solutions.len(), 3);
    }

    #[test]
    fn test_conditional_limit_follows_the_transcript() {
        use crate::limit::AnyLimit;
        use crate::predicate::{PredicateExpression, PredicateFunction};

        let guarded = QueryRule::over(QuerySource::Courses)
            .with_conditional_limit(AnyLimit::Conditional {
                condition: PredicateExpression::function(PredicateFunction::HasCourse(
                    "CSCI 101".to_string(),
                )),
                when_true: Box::new(Limit::at_most_courses(1, subject_is("CSCI"))),
                when_false: None,
            })
            .with_assertion(count_at_least(1).with_at_most());

        // CSCI 101 is on the transcript, so the cap is live: selections
        // {}, {101}, {102}, one pinned-size subset each
        let live = tree(guarded.clone());
        let ctx = RequirementContext::new(csci_pool(2));
        let solutions: Vec<Solution> = live.root.solutions(&ctx, 1).collect();
        assert_eq!(solutions.len(), 3);

        // no CSCI 101: the guard fails and nothing constrains the pool
        let inert = tree(guarded);
        let ctx = RequirementContext::new(vec![
            CourseInstance::builder("1", "CSCI 251").build(),
            CourseInstance::builder("2", "CSCI 253").build(),
        ]);
        let solutions: Vec<Solution> = inert.root.solutions(&ctx, 1).collect();
        assert_eq!(solutions.len(), 2);
    }

    #[test]
    fn test_guaranteed_yield_on_empty_pool() {
        let tree = tree(QueryRule::over(QuerySource::Courses).with_assertion(count_at_least(2)));
        let ctx = RequirementContext::new(Vec::new());

        let solutions: Vec<Solution> = tree.root.solutions(&ctx, 1).collect();
        assert_eq!(solutions.len(), 1, "queries always yield something");
        assert_eq!(solutions[0].audit(&ctx).status(), ResultStatus::Empty);
    }
}
