//! The count rule: N of the child rules must be satisfied.
//!
//! The search walks selection sizes from the declared count upward,
//! crossing the selected children's solution streams. Children with no
//! potential for this student are never selected; at the top of the
//! tree, children whose claimable courses cannot overlap anyone else's
//! are solved once up front and carried as finished results instead of
//! multiplying the product.

use crate::assertion::{AnyAssertion, AssertionOutcome, ReduceInput};
use crate::claims::Claim;
use crate::context::RequirementContext;
use crate::data::CourseInstance;
use crate::error::RuleError;
use crate::limit::ncr;
use crate::path::Path;
use crate::status::{tiers, ResultStatus};
use crate::stream::or_else;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{RequirementBody, Rule, RuleResult, Solution, UnsolvedRule};

#[derive(Debug, Clone)]
pub struct CountRule {
    pub count: usize,
    /// Cap selections at exactly `count` children instead of walking
    /// larger sizes too.
    pub at_most: bool,
    pub of: Vec<Arc<Rule>>,
    pub audit_clauses: Vec<AnyAssertion>,
    pub path: Path,
}

impl CountRule {
    pub fn n_of(count: usize, of: Vec<Rule>) -> CountRule {
        CountRule {
            count,
            at_most: false,
            of: of.into_iter().map(Arc::new).collect(),
            audit_clauses: Vec::new(),
            path: Path::root(),
        }
    }

    pub fn all_of(of: Vec<Rule>) -> CountRule {
        let count = of.len();
        CountRule::n_of(count, of)
    }

    pub fn any_of(of: Vec<Rule>) -> CountRule {
        CountRule::n_of(1, of)
    }

    pub fn with_at_most(mut self) -> CountRule {
        self.at_most = true;
        self
    }

    pub fn with_audit(mut self, clause: AnyAssertion) -> CountRule {
        self.audit_clauses.push(clause);
        self
    }

    pub fn validate(&self, bodies: &[RequirementBody]) -> Result<(), RuleError> {
        if self.of.is_empty() {
            return Err(RuleError::CountWithoutChildren {
                path: self.path.clone(),
            });
        }
        if self.count > self.of.len() {
            return Err(RuleError::CountExceedsChildren {
                path: self.path.clone(),
                count: self.count,
                available: self.of.len(),
            });
        }
        for child in &self.of {
            child.validate(bodies)?;
        }
        Ok(())
    }

    /// Selection sizes to walk, inclusive lower and exclusive upper.
    fn size_range(&self) -> (usize, usize) {
        let lo = self.count;
        let hi = if self.at_most {
            self.count + 1
        } else {
            self.of.len() + 1
        };
        (lo, hi)
    }

    pub fn solutions<'a>(
        &'a self,
        ctx: &'a RequirementContext,
        depth: usize,
    ) -> Box<dyn Iterator<Item = Solution> + 'a> {
        if ctx.exceptions.is_waived(&self.path) {
            return Box::new(std::iter::once(Solution::Count(CountSolution {
                count: self.count,
                at_most: self.at_most,
                items: Vec::new(),
                audit_clauses: self.audit_clauses.clone(),
                overridden: true,
                path: self.path.clone(),
            })));
        }

        let all_potential: Vec<Arc<Rule>> =
            self.of.iter().filter(|r| r.has_potential(ctx)).cloned().collect();

        // top-level only: children that cannot contend for anyone
        // else's courses get solved once, outside the product
        let (solved_results, potential) =
            if depth == 1 && !all_potential.is_empty() && self.audit_clauses.is_empty() {
                let independent = find_independent_children(&all_potential, ctx);
                let independent_paths: BTreeSet<&Path> =
                    independent.iter().map(|r| r.path()).collect();
                let solved: Vec<RuleResult> = independent
                    .iter()
                    .filter_map(|rule| crate::solve::find_best_solution(rule, ctx, true))
                    .collect();
                // an independent child that failed to solve is left
                // unsolved rather than pulled back into the product
                let rest = all_potential
                    .iter()
                    .filter(|r| !independent_paths.contains(r.path()))
                    .cloned()
                    .collect();
                (solved, rest)
            } else {
                (Vec::new(), all_potential)
            };

        let mut potential = potential;
        potential.sort_by(|a, b| a.path().cmp(b.path()));
        let mut solved_results = solved_results;
        solved_results.sort_by(|a, b| a.path().cmp(b.path()));

        let potential_len = potential.len();
        let solved_paths: BTreeSet<Path> =
            solved_results.iter().map(|r| r.path().clone()).collect();
        // children available for deselection: everything not already solved
        let others: Vec<Arc<Rule>> = self
            .of
            .iter()
            .filter(|r| !solved_paths.contains(r.path()))
            .cloned()
            .collect();

        let (lo, hi) = self.size_range();

        let potential_for_sizes = potential.clone();
        let others_for_sizes = others.clone();
        let solved_for_sizes = solved_results.clone();
        let primary = (lo..hi).flat_map(move |size| {
            make_combinations(
                self,
                ctx,
                potential_for_sizes.clone(),
                others_for_sizes.clone(),
                solved_for_sizes.clone(),
                size,
            )
        });

        let potential_fb = potential.clone();
        let others_fb = others.clone();
        let solved_fb = solved_results.clone();
        let with_short_fallback = or_else(primary, move || {
            // not enough potential children to reach the usual sizes
            if potential_len > 0 {
                make_combinations(self, ctx, potential_fb, others_fb, solved_fb, potential_len)
            } else {
                Box::new(std::iter::empty())
            }
        });

        Box::new(or_else(with_short_fallback, move || {
            // always yield something: every child unsolved, plus any
            // precomputed results
            let mut items: Vec<CountItem> = others
                .iter()
                .map(|r| CountItem::Unsolved(UnsolvedRule { rule: Arc::clone(r) }))
                .chain(solved_results.iter().cloned().map(CountItem::Finished))
                .collect();
            items.sort_by(|a, b| a.path().cmp(b.path()));
            std::iter::once(Solution::Count(CountSolution {
                count: self.count,
                at_most: self.at_most,
                items,
                audit_clauses: self.audit_clauses.clone(),
                overridden: false,
                path: self.path.clone(),
            }))
        }))
    }

    pub fn estimate(&self, ctx: &RequirementContext) -> u64 {
        if ctx.exceptions.is_waived(&self.path) {
            return 1;
        }

        let potential: Vec<&Arc<Rule>> =
            self.of.iter().filter(|r| r.has_potential(ctx)).collect();
        let (lo, hi) = self.size_range();

        let mut acc: u64 = 0;
        for size in lo..hi {
            if size > potential.len() {
                continue;
            }
            let per_combo: u64 = potential
                .iter()
                .take(size)
                .map(|r| r.estimate(ctx))
                .fold(1u64, |a, b| a.saturating_mul(b));
            acc = acc.saturating_add((ncr(potential.len(), size) as u64).saturating_mul(per_combo));
        }
        acc.max(1)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "count",
            "path": self.path,
            "count": self.count,
            "at_most": self.at_most,
            "of": self.of.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
            "audit": self.audit_clauses.iter().map(AnyAssertion::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Crosses the solution streams of every `size`-sized selection of the
/// potential children. Per-selection child streams are materialized;
/// the cross product itself would hold them all anyway.
fn make_combinations<'a>(
    rule: &'a CountRule,
    ctx: &'a RequirementContext,
    potential: Vec<Arc<Rule>>,
    others: Vec<Arc<Rule>>,
    solved: Vec<RuleResult>,
    size: usize,
) -> Box<dyn Iterator<Item = Solution> + 'a> {
    if size > potential.len() {
        return Box::new(std::iter::empty());
    }

    Box::new(
        potential
            .into_iter()
            .combinations(size)
            .flat_map(move |selected| {
                let selected_paths: BTreeSet<Path> =
                    selected.iter().map(|r| r.path().clone()).collect();
                let deselected: Vec<Arc<Rule>> = others
                    .iter()
                    .filter(|r| !selected_paths.contains(r.path()))
                    .cloned()
                    .collect();

                let streams: Vec<Vec<Solution>> =
                    selected.iter().map(|r| r.solutions(ctx, 0).collect()).collect();

                let solved = solved.clone();
                let rows: Box<dyn Iterator<Item = Vec<Solution>>> = if streams.is_empty() {
                    Box::new(std::iter::once(Vec::new()))
                } else {
                    Box::new(streams.into_iter().multi_cartesian_product())
                };

                rows.map(move |row| {
                    let mut items: Vec<CountItem> = row
                        .into_iter()
                        .map(CountItem::Solved)
                        .chain(deselected.iter().map(|r| {
                            CountItem::Unsolved(UnsolvedRule { rule: Arc::clone(r) })
                        }))
                        .chain(solved.iter().cloned().map(CountItem::Finished))
                        .collect();
                    items.sort_by(|a, b| a.path().cmp(b.path()));

                    Solution::Count(CountSolution {
                        count: rule.count,
                        at_most: rule.at_most,
                        items,
                        audit_clauses: rule.audit_clauses.clone(),
                        overridden: false,
                        path: rule.path.clone(),
                    })
                })
            }),
    )
}

/// Children whose claimable courses cannot overlap any sibling's.
fn find_independent_children(
    children: &[Arc<Rule>],
    ctx: &RequirementContext,
) -> Vec<Arc<Rule>> {
    if children.len() == 1 {
        return children.to_vec();
    }

    let matches: Vec<BTreeSet<String>> = children
        .iter()
        .map(|r| r.all_matches(ctx).into_iter().map(|c| c.clbid).collect())
        .collect();

    let mut disjoint: BTreeSet<usize> = BTreeSet::new();
    let mut non_disjoint: BTreeSet<usize> = BTreeSet::new();

    for (i, rule) in children.iter().enumerate() {
        if rule.is_never_disjoint(ctx) {
            non_disjoint.insert(i);
        }
    }

    for (i, j) in (0..children.len()).tuple_combinations() {
        if children[i].is_always_disjoint(ctx) && children[j].is_always_disjoint(ctx) {
            disjoint.insert(i);
            disjoint.insert(j);
            continue;
        }
        if matches[i].is_disjoint(&matches[j]) {
            disjoint.insert(i);
            disjoint.insert(j);
        } else {
            non_disjoint.insert(i);
            non_disjoint.insert(j);
        }
    }

    children
        .iter()
        .enumerate()
        .filter(|(i, _)| disjoint.contains(i) && !non_disjoint.contains(i))
        .map(|(_, r)| Arc::clone(r))
        .collect()
}

/// One child slot in a count solution.
#[derive(Debug, Clone)]
pub enum CountItem {
    /// Deselected in this candidate; audits to its unsolved default.
    Unsolved(UnsolvedRule),
    /// Selected; carries one of the child's candidate solutions.
    Solved(Solution),
    /// Solved up front by the independent-subtree pass.
    Finished(RuleResult),
}

impl CountItem {
    pub fn path(&self) -> &Path {
        match self {
            CountItem::Unsolved(u) => u.rule.path(),
            CountItem::Solved(s) => s.path(),
            CountItem::Finished(r) => r.path(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CountSolution {
    pub count: usize,
    pub at_most: bool,
    pub items: Vec<CountItem>,
    pub audit_clauses: Vec<AnyAssertion>,
    pub overridden: bool,
    pub path: Path,
}

impl CountSolution {
    pub fn audit(&self, ctx: &RequirementContext) -> CountResult {
        if self.overridden {
            return CountResult {
                count: self.count,
                at_most: self.at_most,
                items: Vec::new(),
                audit_results: Vec::new(),
                overridden: true,
                path: self.path.clone(),
            };
        }

        let items: Vec<RuleResult> = self
            .items
            .iter()
            .map(|item| match item {
                CountItem::Unsolved(u) => RuleResult::Unsolved(u.clone()),
                CountItem::Solved(s) => s.audit(ctx),
                CountItem::Finished(r) => r.clone(),
            })
            .collect();

        let mut seen = BTreeSet::new();
        let matched: Vec<CourseInstance> = items
            .iter()
            .flat_map(RuleResult::matched)
            .filter(|c| seen.insert(c.clbid.clone()))
            .collect();

        let audit_results: Vec<AssertionOutcome> = self
            .audit_clauses
            .iter()
            .filter_map(|clause| clause.resolve(ctx).cloned())
            .map(|a| AssertionOutcome::Evaluated(a.evaluate(ReduceInput::Courses(&matched), ctx)))
            .collect();

        CountResult {
            count: self.count,
            at_most: self.at_most,
            items,
            audit_results,
            overridden: false,
            path: self.path.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "count",
            "path": self.path,
            "count": self.count,
            "at_most": self.at_most,
            "overridden": self.overridden,
            "items": self.items.iter().map(|item| match item {
                CountItem::Unsolved(u) => u.rule.to_json(),
                CountItem::Solved(s) => s.to_json(),
                CountItem::Finished(r) => r.to_json(),
            }).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CountResult {
    pub count: usize,
    pub at_most: bool,
    pub items: Vec<RuleResult>,
    pub audit_results: Vec<AssertionOutcome>,
    pub overridden: bool,
    pub path: Path,
}

impl CountResult {
    pub fn status(&self) -> ResultStatus {
        if self.overridden {
            return ResultStatus::Waived;
        }

        let child_statuses: Vec<ResultStatus> =
            self.items.iter().map(RuleResult::status).collect();
        let audit_statuses: Vec<ResultStatus> =
            self.audit_results.iter().map(AssertionOutcome::status).collect();

        if child_statuses.contains(&ResultStatus::FailedInvariant)
            || audit_statuses.contains(&ResultStatus::FailedInvariant)
        {
            return ResultStatus::FailedInvariant;
        }

        if child_statuses.iter().all(|s| s.is_empty_ish()) {
            return ResultStatus::Empty;
        }

        let passing_child_statuses: Vec<ResultStatus> = child_statuses
            .iter()
            .copied()
            .filter(|s| s.is_passing())
            .collect();

        if passing_child_statuses.len() < self.count {
            return ResultStatus::NeedsMoreItems;
        }

        let mut combined = passing_child_statuses;
        combined.extend(audit_statuses);

        if !combined.is_empty() && tiers::all_within(&combined, tiers::WAIVED_ONLY) {
            return ResultStatus::Waived;
        }
        if tiers::all_within(&combined, tiers::WAIVED_AND_DONE) {
            return ResultStatus::Done;
        }
        if tiers::all_within(&combined, tiers::WAIVED_DONE_CURRENT) {
            return ResultStatus::PendingCurrent;
        }
        if tiers::all_within(&combined, tiers::WAIVED_DONE_CURRENT_PENDING) {
            return ResultStatus::PendingRegistered;
        }

        ResultStatus::NeedsMoreItems
    }

    pub fn rank(&self) -> (Decimal, Decimal) {
        if self.overridden {
            return (Decimal::ONE, Decimal::ONE);
        }

        let child_ranks: Vec<(Decimal, Decimal)> = self
            .items
            .iter()
            .map(|item| {
                let (rank, max_rank) = item.rank();
                (rank, max_rank.max(rank))
            })
            .collect();

        let rank: Decimal = child_ranks.iter().map(|(r, _)| r).sum();

        let max_rank: Decimal = if self.count == 1 && self.at_most {
            child_ranks
                .iter()
                .map(|(_, m)| *m)
                .max()
                .unwrap_or(Decimal::ONE)
        } else if self.count == 2 && self.items.len() == 2 {
            let mut maxes: Vec<Decimal> = child_ranks.iter().map(|(_, m)| *m).collect();
            maxes.sort();
            maxes.iter().take(2).sum()
        } else {
            child_ranks.iter().map(|(_, m)| m).sum()
        };

        let (audit_rank, audit_max) = self.audit_results.iter().map(AssertionOutcome::rank).fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(r, m), (ar, am)| (r + ar, m + am),
        );

        (rank + audit_rank, max_rank + audit_max)
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.items.iter().flat_map(RuleResult::claims).collect()
    }

    pub fn claims_for_gpa(&self) -> Vec<Claim> {
        self.items.iter().flat_map(RuleResult::claims_for_gpa).collect()
    }

    pub fn matched(&self) -> Vec<CourseInstance> {
        let mut seen = BTreeSet::new();
        self.items
            .iter()
            .flat_map(RuleResult::matched)
            .filter(|c| seen.insert(c.clbid.clone()))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (rank, max_rank) = self.rank();
        json!({
            "type": "count",
            "path": self.path,
            "count": self.count,
            "at_most": self.at_most,
            "status": self.status(),
            "rank": rank.to_string(),
            "max_rank": max_rank.to_string(),
            "ok": self.status().is_passing(),
            "overridden": self.overridden,
            "items": self.items.iter().map(RuleResult::to_json).collect::<Vec<_>>(),
            "audit": self.audit_results.iter().map(AssertionOutcome::to_json).collect::<Vec<_>>(),
        })
    }
}
