//! Exhaustive single-rule solver: audit every candidate, keep the best.

use crate::context::RequirementContext;
use crate::rule::{Rule, RuleResult};
use crate::status::ResultStatus;
use rust_decimal::Decimal;
use tracing::debug;

/// Audits every candidate solution of `rule` against its own fresh
/// ledger and returns the highest-ranked result. Stops at the first
/// candidate that settles Done or Waived, since no later candidate can
/// beat a fully-satisfied one.
///
/// With `merge_claims`, the claims of the winning candidate are folded
/// back into the caller's ledger; otherwise the ledger is left exactly
/// as it was.
pub fn find_best_solution(
    rule: &Rule,
    ctx: &RequirementContext,
    merge_claims: bool,
) -> Option<RuleResult> {
    let mut audited = 0;
    find_best_solution_counting(rule, ctx, merge_claims, &mut audited)
}

pub(crate) fn find_best_solution_counting(
    rule: &Rule,
    ctx: &RequirementContext,
    merge_claims: bool,
    audited: &mut usize,
) -> Option<RuleResult> {
    debug!(path = %rule.path(), "solving rule");

    let scope = ctx.fresh_claims();

    let mut best: Option<(RuleResult, Decimal)> = None;

    for solution in rule.solutions(ctx, 0) {
        ctx.reset_claims();

        let result = solution.audit(ctx);
        *audited += 1;

        let (rank, _max_rank) = result.rank();
        let status = result.status();

        if matches!(status, ResultStatus::Done | ResultStatus::Waived) {
            best = Some((result, rank));
            break;
        }

        let improved = match &best {
            None => true,
            Some((_, best_rank)) => rank > *best_rank,
        };
        if improved {
            best = Some((result, rank));
        }
    }

    // the bracket's ledger holds the last-audited candidate's claims,
    // which is the winner whenever the loop broke early
    if merge_claims && scope.has_claims() {
        scope.merge_and_restore();
    }

    if let Some((result, rank)) = &best {
        debug!(path = %rule.path(), %rank, status = ?result.status(), "rule solved");
    }

    best.map(|(result, _)| result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CourseInstance;
    use crate::rule::{CountRule, CourseRule};
    use crate::status::ResultStatus;
    use rust_decimal_macros::dec;

    fn ctx_with(identities: &[&str]) -> RequirementContext {
        RequirementContext::new(
            identities
                .iter()
                .enumerate()
                .map(|(i, id)| CourseInstance::builder(i.to_string(), *id).build())
                .collect(),
        )
    }

    #[test]
    fn test_best_of_partial_candidates() {
        // 2-of-3 with only two courses on record: no candidate is Done,
        // so the full stream is walked and the highest rank wins
        let rule = crate::rule::RuleTree::new(
            crate::rule::Rule::Count(CountRule::n_of(
                2,
                vec![
                    crate::rule::Rule::Course(CourseRule::new("A 1")),
                    crate::rule::Rule::Course(CourseRule::new("B 2")),
                    crate::rule::Rule::Course(CourseRule::new("C 3")),
                ],
            )),
            Vec::new(),
        )
        .unwrap();
        let ctx = ctx_with(&["A 1", "B 2"]);

        let result = find_best_solution(&rule.root, &ctx, false).unwrap();
        assert_eq!(result.rank().0, dec!(2));
        assert_eq!(result.status(), ResultStatus::Done);
    }

    #[test]
    fn test_stops_at_first_done() {
        let rule = crate::rule::RuleTree::new(
            crate::rule::Rule::Count(CountRule::any_of(vec![
                crate::rule::Rule::Course(CourseRule::new("A 1")),
                crate::rule::Rule::Course(CourseRule::new("B 2")),
            ])),
            Vec::new(),
        )
        .unwrap();
        let ctx = ctx_with(&["A 1", "B 2"]);

        let mut audited = 0;
        let result = find_best_solution_counting(&rule.root, &ctx, false, &mut audited).unwrap();
        assert_eq!(result.status(), ResultStatus::Done);
        assert_eq!(audited, 1, "later candidates must not be audited");
    }

    #[test]
    fn test_claims_restored_without_merge() {
        let rule = crate::rule::Rule::Course(CourseRule::new("A 1"));
        let rule = crate::rule::RuleTree::new(rule, Vec::new()).unwrap();
        let ctx = ctx_with(&["A 1"]);

        let result = find_best_solution(&rule.root, &ctx, false).unwrap();
        assert!(result.ok());
        assert!(!ctx.has_claims());
    }

    #[test]
    fn test_claims_merged_back() {
        let rule = crate::rule::Rule::Course(CourseRule::new("A 1"));
        let rule = crate::rule::RuleTree::new(rule, Vec::new()).unwrap();
        let ctx = ctx_with(&["A 1"]);

        find_best_solution(&rule.root, &ctx, true).unwrap();
        assert_eq!(ctx.claimed_clbids().len(), 1);

        // the merged claim now blocks a second exclusive claim
        let other = crate::rule::RuleTree::new(
            crate::rule::Rule::Course(CourseRule::new("A 1")),
            Vec::new(),
        )
        .unwrap();
        let second = find_best_solution(&other.root, &ctx, false).unwrap();
        assert!(!second.ok());
    }

    #[test]
    fn test_no_merge_when_nothing_claimed() {
        let rule = crate::rule::RuleTree::new(
            crate::rule::Rule::Course(CourseRule::new("Z 9")),
            Vec::new(),
        )
        .unwrap();
        let ctx = ctx_with(&["A 1"]);

        let result = find_best_solution(&rule.root, &ctx, true);
        assert!(result.is_some());
        assert!(!ctx.has_claims());
    }
}
