//! The requirement rule: a named wrapper around a result rule.
//!
//! Requirements carry the human-facing names in an area and are the
//! unit of the multicountable exclusivity lists. The body lives in the
//! tree's arena; the rule node copies its metadata at tree build so the
//! hot paths need no arena lookup.

use crate::claims::Claim;
use crate::context::RequirementContext;
use crate::data::CourseInstance;
use crate::error::RuleError;
use crate::path::Path;
use crate::status::ResultStatus;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

use super::{RequirementBody, RequirementId, Rule, RuleResult, Solution};

#[derive(Debug, Clone)]
pub struct RequirementRule {
    pub requirement: RequirementId,
    /// Filled from the body when the tree is built.
    pub name: String,
    pub is_audited: bool,
    pub in_gpa: bool,
    pub disjoint: Option<bool>,
    pub path: Path,
}

impl RequirementRule {
    pub fn reference(requirement: RequirementId) -> RequirementRule {
        RequirementRule {
            requirement,
            name: String::new(),
            is_audited: false,
            in_gpa: true,
            disjoint: None,
            path: Path::root(),
        }
    }

    fn result<'c>(&self, ctx: &'c RequirementContext) -> Option<&'c Arc<Rule>> {
        ctx.requirement(self.requirement).and_then(|b| b.result.as_ref())
    }

    pub fn validate(&self, bodies: &[RequirementBody]) -> Result<(), RuleError> {
        let body = bodies
            .get(self.requirement.0)
            .ok_or_else(|| RuleError::UnknownRequirement {
                name: self.name.clone(),
            })?;
        if body.result.is_none() && !body.is_audited {
            return Err(RuleError::RequirementWithoutResult {
                name: body.name.clone(),
            });
        }
        Ok(())
    }

    pub fn has_potential(&self, ctx: &RequirementContext) -> bool {
        if self.is_audited {
            return false;
        }
        self.result(ctx).is_some_and(|r| r.has_potential(ctx))
    }

    pub fn all_matches(&self, ctx: &RequirementContext) -> Vec<CourseInstance> {
        self.result(ctx).map(|r| r.all_matches(ctx)).unwrap_or_default()
    }

    pub fn is_always_disjoint(&self, ctx: &RequirementContext) -> bool {
        if let Some(disjoint) = self.disjoint {
            return disjoint;
        }
        self.result(ctx).is_some_and(|r| r.is_always_disjoint(ctx))
    }

    pub fn is_never_disjoint(&self, ctx: &RequirementContext) -> bool {
        if self.disjoint == Some(true) {
            return false;
        }
        self.result(ctx).is_some_and(|r| r.is_never_disjoint(ctx))
    }

    pub fn estimate(&self, ctx: &RequirementContext) -> u64 {
        self.result(ctx).map(|r| r.estimate(ctx)).unwrap_or(1)
    }

    pub fn solutions<'a>(
        &'a self,
        ctx: &'a RequirementContext,
    ) -> Box<dyn Iterator<Item = Solution> + 'a> {
        if ctx.exceptions.is_waived(&self.path) {
            return Box::new(std::iter::once(self.wrap(None, true)));
        }

        if self.is_audited {
            return Box::new(std::iter::once(self.wrap(None, false)));
        }

        match self.result(ctx) {
            Some(rule) => {
                Box::new(rule.solutions(ctx, 0).map(move |sub| self.wrap(Some(sub), false)))
            }
            None => Box::new(std::iter::once(self.wrap(None, false))),
        }
    }

    fn wrap(&self, sub: Option<Solution>, overridden: bool) -> Solution {
        Solution::Requirement(RequirementSolution {
            name: self.name.clone(),
            is_audited: self.is_audited,
            in_gpa: self.in_gpa,
            sub: sub.map(Box::new),
            overridden,
            path: self.path.clone(),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "requirement",
            "path": self.path,
            "name": self.name,
            "is_audited": self.is_audited,
            "in_gpa": self.in_gpa,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RequirementSolution {
    pub name: String,
    pub is_audited: bool,
    pub in_gpa: bool,
    pub sub: Option<Box<Solution>>,
    pub overridden: bool,
    pub path: Path,
}

impl RequirementSolution {
    pub fn audit(&self, ctx: &RequirementContext) -> RequirementResult {
        RequirementResult {
            name: self.name.clone(),
            is_audited: self.is_audited,
            in_gpa: self.in_gpa,
            sub: if self.overridden {
                None
            } else {
                self.sub.as_ref().map(|s| Box::new(s.audit(ctx)))
            },
            overridden: self.overridden,
            path: self.path.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "requirement",
            "path": self.path,
            "name": self.name,
            "is_audited": self.is_audited,
            "overridden": self.overridden,
            "result": self.sub.as_ref().map(|s| s.to_json()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RequirementResult {
    pub name: String,
    pub is_audited: bool,
    pub in_gpa: bool,
    pub sub: Option<Box<RuleResult>>,
    pub overridden: bool,
    pub path: Path,
}

impl RequirementResult {
    pub fn status(&self) -> ResultStatus {
        if self.overridden {
            return ResultStatus::Waived;
        }
        if self.is_audited {
            return ResultStatus::PendingApproval;
        }
        match &self.sub {
            Some(sub) => sub.status(),
            None => ResultStatus::Empty,
        }
    }

    pub fn rank(&self) -> (Decimal, Decimal) {
        if self.overridden {
            return (Decimal::ONE, Decimal::ONE);
        }
        match &self.sub {
            Some(sub) => sub.rank(),
            None => (Decimal::ZERO, Decimal::ONE),
        }
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.sub.as_ref().map(|s| s.claims()).unwrap_or_default()
    }

    pub fn claims_for_gpa(&self) -> Vec<Claim> {
        if !self.in_gpa {
            return Vec::new();
        }
        self.sub.as_ref().map(|s| s.claims_for_gpa()).unwrap_or_default()
    }

    pub fn matched(&self) -> Vec<CourseInstance> {
        self.sub.as_ref().map(|s| s.matched()).unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (rank, max_rank) = self.rank();
        json!({
            "type": "requirement",
            "path": self.path,
            "name": self.name,
            "is_audited": self.is_audited,
            "in_gpa": self.in_gpa,
            "status": self.status(),
            "rank": rank.to_string(),
            "max_rank": max_rank.to_string(),
            "ok": self.status().is_passing(),
            "overridden": self.overridden,
            "result": self.sub.as_ref().map(|s| s.to_json()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::{ExceptionSet, RuleException};
    use crate::rule::{CourseRule, RuleTree};

    fn tree_with(body: RequirementBody) -> RuleTree {
        RuleTree::new(
            Rule::Requirement(RequirementRule::reference(RequirementId(0))),
            vec![body],
        )
        .unwrap()
    }

    fn solve(tree: &RuleTree, ctx: &RequirementContext) -> Vec<RuleResult> {
        tree.root.solutions(ctx, 1).map(|s| s.audit(ctx)).collect()
    }

    #[test]
    fn test_wraps_its_result_rule() {
        let tree = tree_with(RequirementBody::new(
            "Core",
            Rule::Course(CourseRule::new("CSCI 121")),
        ));
        let ctx = RequirementContext::new(vec![CourseInstance::builder("1", "CSCI 121").build()])
            .with_requirements(Arc::clone(&tree.requirements));

        let results = solve(&tree, &ctx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status(), ResultStatus::Done);
        assert_eq!(results[0].claims().len(), 1);
    }

    #[test]
    fn test_audited_requirement_is_pending_approval() {
        let tree = tree_with(RequirementBody::audited("Senior Recital"));
        let ctx = RequirementContext::new(Vec::new())
            .with_requirements(Arc::clone(&tree.requirements));

        let results = solve(&tree, &ctx);
        assert_eq!(results[0].status(), ResultStatus::PendingApproval);
        assert_eq!(results[0].rank(), (Decimal::ZERO, Decimal::ONE));
    }

    #[test]
    fn test_out_of_gpa_prunes_gpa_claims() {
        let tree = tree_with(
            RequirementBody::new("Core", Rule::Course(CourseRule::new("CSCI 121")))
                .with_in_gpa(false),
        );
        let ctx = RequirementContext::new(vec![CourseInstance::builder("1", "CSCI 121").build()])
            .with_requirements(Arc::clone(&tree.requirements));

        let results = solve(&tree, &ctx);
        assert_eq!(results[0].claims().len(), 1);
        assert!(results[0].claims_for_gpa().is_empty());
    }

    #[test]
    fn test_waived_requirement() {
        let tree = tree_with(RequirementBody::new(
            "Core",
            Rule::Course(CourseRule::new("CSCI 121")),
        ));
        let path = tree.root.path().clone();
        let ctx = RequirementContext::new(Vec::new())
            .with_requirements(Arc::clone(&tree.requirements))
            .with_exceptions(ExceptionSet::new(vec![RuleException::waive(path)]));

        let results = solve(&tree, &ctx);
        assert!(results[0].waived());
        assert_eq!(results[0].status(), ResultStatus::Waived);
        assert_eq!(results[0].rank(), (Decimal::ONE, Decimal::ONE));
    }

    #[test]
    fn test_body_without_result_or_audit_is_rejected() {
        let body = RequirementBody {
            name: "Broken".to_string(),
            result: None,
            is_audited: false,
            in_gpa: true,
            disjoint: None,
        };
        let err = RuleTree::new(
            Rule::Requirement(RequirementRule::reference(RequirementId(0))),
            vec![body],
        )
        .unwrap_err();
        assert!(matches!(err, RuleError::RequirementWithoutResult { .. }));
    }
}
