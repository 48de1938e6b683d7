//! The conditional rule: an if/then/else over a context-level boolean.
//!
//! The condition is evaluated once against the student's record, never
//! inside the search loop, so a conditional is a passthrough to exactly
//! one branch. A false condition with no else-branch contributes
//! nothing but still yields one (empty) solution, keeping every rule's
//! solution stream non-empty.

use crate::claims::Claim;
use crate::context::RequirementContext;
use crate::data::CourseInstance;
use crate::error::RuleError;
use crate::path::Path;
use crate::predicate::PredicateExpression;
use crate::status::ResultStatus;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;

use super::{RequirementBody, Rule, RuleResult, Solution};

#[derive(Debug, Clone)]
pub struct ConditionalRule {
    pub condition: PredicateExpression,
    pub when_true: Arc<Rule>,
    pub when_false: Option<Arc<Rule>>,
    pub path: Path,
}

impl ConditionalRule {
    pub fn new(
        condition: PredicateExpression,
        when_true: Rule,
        when_false: Option<Rule>,
    ) -> ConditionalRule {
        ConditionalRule {
            condition,
            when_true: Arc::new(when_true),
            when_false: when_false.map(Arc::new),
            path: Path::root(),
        }
    }

    /// The branch this student's record selects, if any.
    pub fn branch(&self, ctx: &RequirementContext) -> Option<&Arc<Rule>> {
        if ctx.evaluate_expression(&self.condition) {
            Some(&self.when_true)
        } else {
            self.when_false.as_ref()
        }
    }

    pub fn validate(&self, bodies: &[RequirementBody]) -> Result<(), RuleError> {
        self.when_true.validate(bodies)?;
        if let Some(when_false) = &self.when_false {
            when_false.validate(bodies)?;
        }
        Ok(())
    }

    pub fn has_potential(&self, ctx: &RequirementContext) -> bool {
        self.branch(ctx).is_some_and(|b| b.has_potential(ctx))
    }

    pub fn all_matches(&self, ctx: &RequirementContext) -> Vec<CourseInstance> {
        self.branch(ctx)
            .map(|b| b.all_matches(ctx))
            .unwrap_or_default()
    }

    pub fn estimate(&self, ctx: &RequirementContext) -> u64 {
        self.branch(ctx).map(|b| b.estimate(ctx)).unwrap_or(1)
    }

    pub fn solutions<'a>(
        &'a self,
        ctx: &'a RequirementContext,
    ) -> Box<dyn Iterator<Item = Solution> + 'a> {
        let resolved = ctx.evaluate_expression(&self.condition);
        let branch = if resolved {
            Some(&self.when_true)
        } else {
            self.when_false.as_ref()
        };

        match branch {
            Some(rule) => Box::new(rule.solutions(ctx, 0).map(move |sub| {
                Solution::Conditional(ConditionalSolution {
                    condition: self.condition.clone(),
                    resolved,
                    sub: Some(Box::new(sub)),
                    path: self.path.clone(),
                })
            })),
            None => Box::new(std::iter::once(Solution::Conditional(ConditionalSolution {
                condition: self.condition.clone(),
                resolved,
                sub: None,
                path: self.path.clone(),
            }))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "conditional",
            "path": self.path,
            "condition": self.condition.to_json(),
            "when_true": self.when_true.to_json(),
            "when_false": self.when_false.as_ref().map(|r| r.to_json()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConditionalSolution {
    pub condition: PredicateExpression,
    pub resolved: bool,
    pub sub: Option<Box<Solution>>,
    pub path: Path,
}

impl ConditionalSolution {
    pub fn audit(&self, ctx: &RequirementContext) -> ConditionalResult {
        ConditionalResult {
            condition: self.condition.clone(),
            resolved: self.resolved,
            sub: self.sub.as_ref().map(|s| Box::new(s.audit(ctx))),
            path: self.path.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "conditional",
            "path": self.path,
            "condition": self.condition.to_json(),
            "resolved": self.resolved,
            "branch": self.sub.as_ref().map(|s| s.to_json()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConditionalResult {
    pub condition: PredicateExpression,
    pub resolved: bool,
    pub sub: Option<Box<RuleResult>>,
    pub path: Path,
}

impl ConditionalResult {
    pub fn status(&self) -> ResultStatus {
        match &self.sub {
            Some(sub) => sub.status(),
            None => ResultStatus::Empty,
        }
    }

    pub fn rank(&self) -> (Decimal, Decimal) {
        match &self.sub {
            Some(sub) => sub.rank(),
            None => (Decimal::ZERO, Decimal::ONE),
        }
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.sub.as_ref().map(|s| s.claims()).unwrap_or_default()
    }

    pub fn claims_for_gpa(&self) -> Vec<Claim> {
        self.sub.as_ref().map(|s| s.claims_for_gpa()).unwrap_or_default()
    }

    pub fn matched(&self) -> Vec<CourseInstance> {
        self.sub.as_ref().map(|s| s.matched()).unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (rank, max_rank) = self.rank();
        json!({
            "type": "conditional",
            "path": self.path,
            "condition": self.condition.to_json(),
            "resolved": self.resolved,
            "status": self.status(),
            "rank": rank.to_string(),
            "max_rank": max_rank.to_string(),
            "ok": self.status().is_passing(),
            "branch": self.sub.as_ref().map(|s| s.to_json()),
        })
    }
}
