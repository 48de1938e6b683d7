//! The rule tree: rules, their candidate solutions, and audited results.
//!
//! Each rule variant moves through the same three phases. A [`Rule`] is
//! the declared requirement; [`Rule::solutions`] lazily enumerates every
//! way the student's record might satisfy it; [`Solution::audit`] claims
//! courses against the shared ledger and settles each candidate into a
//! [`RuleResult`] carrying a status and a progress rank. The variants
//! form a closed set and all cross-variant dispatch is a `match` here.

mod conditional;
mod count;
mod course;
mod proficiency;
mod query;
mod requirement;

pub use conditional::{ConditionalResult, ConditionalRule, ConditionalSolution};
pub use count::{CountItem, CountResult, CountRule, CountSolution};
pub use course::{CourseResult, CourseRule, CourseSolution};
pub use proficiency::{ProficiencyResult, ProficiencyRule, ProficiencySolution};
pub use query::{QueryOutput, QueryResult, QueryRule, QuerySolution, QuerySource};
pub use requirement::{RequirementResult, RequirementRule, RequirementSolution};

use crate::claims::Claim;
use crate::context::RequirementContext;
use crate::data::CourseInstance;
use crate::error::RuleError;
use crate::path::Path;
use crate::status::ResultStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Index of a named requirement's body in the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementId(pub usize);

/// The body of a named requirement. Bodies live in a flat arena on the
/// [`RuleTree`] rather than inline in the tree, and are referenced by
/// [`RequirementRule`] nodes.
#[derive(Debug, Clone)]
pub struct RequirementBody {
    pub name: String,
    pub result: Option<Arc<Rule>>,
    /// Audited requirements have no result rule; they settle to
    /// pending-approval and wait for departmental sign-off.
    pub is_audited: bool,
    pub in_gpa: bool,
    /// Declared override for the disjointness analysis, when the area
    /// author knows better than the matched-set probe.
    pub disjoint: Option<bool>,
}

impl RequirementBody {
    pub fn new(name: impl Into<String>, result: Rule) -> RequirementBody {
        RequirementBody {
            name: name.into(),
            result: Some(Arc::new(result)),
            is_audited: false,
            in_gpa: true,
            disjoint: None,
        }
    }

    pub fn audited(name: impl Into<String>) -> RequirementBody {
        RequirementBody {
            name: name.into(),
            result: None,
            is_audited: true,
            in_gpa: true,
            disjoint: None,
        }
    }

    pub fn with_in_gpa(mut self, in_gpa: bool) -> RequirementBody {
        self.in_gpa = in_gpa;
        self
    }

    pub fn with_disjoint(mut self, disjoint: bool) -> RequirementBody {
        self.disjoint = Some(disjoint);
        self
    }
}

/// A validated rule tree: the root rule plus the requirement arena,
/// with every node's path assigned from its position.
#[derive(Debug, Clone)]
pub struct RuleTree {
    pub root: Arc<Rule>,
    pub requirements: Arc<Vec<RequirementBody>>,
}

impl RuleTree {
    /// Assigns paths throughout `root` and the bodies it references,
    /// then validates the whole tree. Paths derive from tree shape
    /// alone, so re-building the same tree yields the same paths.
    pub fn new(root: Rule, requirements: Vec<RequirementBody>) -> Result<RuleTree, RuleError> {
        let mut root = root;
        let mut bodies = requirements;
        let mut attached: BTreeSet<usize> = BTreeSet::new();
        attach_path(&mut root, &Path::root(), &mut bodies, &mut attached)?;

        root.validate(&bodies)?;
        for body in &bodies {
            if let Some(result) = &body.result {
                result.validate(&bodies)?;
            }
        }

        Ok(RuleTree {
            root: Arc::new(root),
            requirements: Arc::new(bodies),
        })
    }
}

/// One node of the rule tree.
#[derive(Debug, Clone)]
pub enum Rule {
    Count(CountRule),
    Course(CourseRule),
    Query(QueryRule),
    Requirement(RequirementRule),
    Proficiency(ProficiencyRule),
    Conditional(ConditionalRule),
}

impl Rule {
    pub fn path(&self) -> &Path {
        match self {
            Rule::Count(r) => &r.path,
            Rule::Course(r) => &r.path,
            Rule::Query(r) => &r.path,
            Rule::Requirement(r) => &r.path,
            Rule::Proficiency(r) => &r.path,
            Rule::Conditional(r) => &r.path,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Rule::Count(_) => "count",
            Rule::Course(_) => "course",
            Rule::Query(_) => "query",
            Rule::Requirement(_) => "requirement",
            Rule::Proficiency(_) => "proficiency",
            Rule::Conditional(_) => "conditional",
        }
    }

    pub fn validate(&self, bodies: &[RequirementBody]) -> Result<(), RuleError> {
        match self {
            Rule::Count(r) => r.validate(bodies),
            Rule::Course(r) => r.validate(),
            Rule::Query(r) => r.validate(),
            Rule::Requirement(r) => r.validate(bodies),
            Rule::Proficiency(r) => r.validate(),
            Rule::Conditional(r) => r.validate(bodies),
        }
    }

    /// Lazily enumerates candidate solutions. `depth` is 1 only for the
    /// root invocation; the count rule's independent-subtree shortcut
    /// fires there and nowhere else.
    pub fn solutions<'a>(
        &'a self,
        ctx: &'a RequirementContext,
        depth: usize,
    ) -> Box<dyn Iterator<Item = Solution> + 'a> {
        match self {
            Rule::Count(r) => r.solutions(ctx, depth),
            Rule::Course(r) => r.solutions(ctx),
            Rule::Query(r) => r.solutions(ctx),
            Rule::Requirement(r) => r.solutions(ctx),
            Rule::Proficiency(r) => r.solutions(ctx),
            Rule::Conditional(r) => r.solutions(ctx),
        }
    }

    /// Rough solution count, for logging and budget decisions.
    pub fn estimate(&self, ctx: &RequirementContext) -> u64 {
        match self {
            Rule::Count(r) => r.estimate(ctx),
            Rule::Course(_) => 1,
            Rule::Query(r) => r.estimate(ctx),
            Rule::Requirement(r) => r.estimate(ctx),
            Rule::Proficiency(_) => 1,
            Rule::Conditional(r) => r.estimate(ctx),
        }
    }

    /// Could this rule possibly make progress for this student? Rules
    /// without potential are skipped by the count rule's selection.
    pub fn has_potential(&self, ctx: &RequirementContext) -> bool {
        if ctx.exceptions.has_exception_beneath(self.path()) {
            return true;
        }

        match self {
            Rule::Count(r) => r.of.iter().any(|c| c.has_potential(ctx)),
            Rule::Course(r) => r.has_potential(ctx),
            Rule::Query(r) => r.has_potential(ctx),
            Rule::Requirement(r) => r.has_potential(ctx),
            Rule::Proficiency(_) => true,
            Rule::Conditional(r) => r.has_potential(ctx),
        }
    }

    /// Every course this rule could possibly match, for the
    /// disjointness probe.
    pub fn all_matches(&self, ctx: &RequirementContext) -> Vec<CourseInstance> {
        match self {
            Rule::Count(r) => {
                let mut seen = BTreeSet::new();
                r.of.iter()
                    .flat_map(|c| c.all_matches(ctx))
                    .filter(|c| seen.insert(c.clbid.clone()))
                    .collect()
            }
            Rule::Course(r) => r.all_matches(ctx),
            Rule::Query(r) => r.all_matches(ctx),
            Rule::Requirement(r) => r.all_matches(ctx),
            Rule::Proficiency(r) => {
                r.course.as_ref().map(|c| c.all_matches(ctx)).unwrap_or_default()
            }
            Rule::Conditional(r) => r.all_matches(ctx),
        }
    }

    /// True when this subtree can never contend for a course another
    /// subtree wants, regardless of which courses it matches.
    pub fn is_always_disjoint(&self, ctx: &RequirementContext) -> bool {
        match self {
            Rule::Count(r) => r.of.iter().all(|c| c.is_always_disjoint(ctx)),
            Rule::Course(r) => r.allow_claimed,
            Rule::Query(r) => r.is_always_disjoint(),
            Rule::Requirement(r) => r.is_always_disjoint(ctx),
            Rule::Proficiency(r) => r.course.as_ref().is_some_and(|c| c.allow_claimed),
            Rule::Conditional(r) => {
                r.branch(ctx).is_some_and(|b| b.is_always_disjoint(ctx))
            }
        }
    }

    /// True when this subtree always contends: it reads other rules'
    /// claims and must never be solved independently.
    pub fn is_never_disjoint(&self, ctx: &RequirementContext) -> bool {
        match self {
            Rule::Count(r) => r.of.iter().any(|c| c.is_never_disjoint(ctx)),
            Rule::Course(r) => r.from_claimed,
            Rule::Query(r) => r.is_never_disjoint(),
            Rule::Requirement(r) => r.is_never_disjoint(ctx),
            Rule::Proficiency(r) => r.course.as_ref().is_some_and(|c| c.from_claimed),
            Rule::Conditional(r) => {
                r.branch(ctx).is_some_and(|b| b.is_never_disjoint(ctx))
            }
        }
    }

    /// Serialization of the unsolved rule, statused as if audited with
    /// nothing claimed.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = match self {
            Rule::Count(r) => r.to_json(),
            Rule::Course(r) => r.to_json(),
            Rule::Query(r) => r.to_json(),
            Rule::Requirement(r) => r.to_json(),
            Rule::Proficiency(r) => r.to_json(),
            Rule::Conditional(r) => r.to_json(),
        };
        if let Some(map) = value.as_object_mut() {
            map.insert("status".into(), json!(ResultStatus::NeedsMoreItems));
            map.insert("rank".into(), json!("0"));
            map.insert("max_rank".into(), json!("1"));
            map.insert("ok".into(), json!(false));
        }
        value
    }
}

/// One candidate way of satisfying a rule, not yet checked against the
/// claim ledger.
#[derive(Debug, Clone)]
pub enum Solution {
    Count(CountSolution),
    Course(CourseSolution),
    Query(QuerySolution),
    Requirement(RequirementSolution),
    Proficiency(ProficiencySolution),
    Conditional(ConditionalSolution),
}

impl Solution {
    pub fn path(&self) -> &Path {
        match self {
            Solution::Count(s) => &s.path,
            Solution::Course(s) => &s.rule.path,
            Solution::Query(s) => &s.rule.path,
            Solution::Requirement(s) => &s.path,
            Solution::Proficiency(s) => &s.rule.path,
            Solution::Conditional(s) => &s.path,
        }
    }

    /// Claims courses and settles this candidate into a result. May be
    /// called many times for one rule, each against its own fresh or
    /// partially-filled ledger state.
    pub fn audit(&self, ctx: &RequirementContext) -> RuleResult {
        match self {
            Solution::Count(s) => RuleResult::Count(s.audit(ctx)),
            Solution::Course(s) => RuleResult::Course(s.audit(ctx)),
            Solution::Query(s) => RuleResult::Query(s.audit(ctx)),
            Solution::Requirement(s) => RuleResult::Requirement(s.audit(ctx)),
            Solution::Proficiency(s) => RuleResult::Proficiency(s.audit(ctx)),
            Solution::Conditional(s) => RuleResult::Conditional(s.audit(ctx)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Solution::Count(s) => s.to_json(),
            Solution::Course(s) => s.to_json(),
            Solution::Query(s) => s.to_json(),
            Solution::Requirement(s) => s.to_json(),
            Solution::Proficiency(s) => s.to_json(),
            Solution::Conditional(s) => s.to_json(),
        }
    }
}

/// The audited form of one solution, or a rule that was never solved.
#[derive(Debug, Clone)]
pub enum RuleResult {
    Count(CountResult),
    Course(CourseResult),
    Query(QueryResult),
    Requirement(RequirementResult),
    Proficiency(ProficiencyResult),
    Conditional(ConditionalResult),
    /// A rule deselected by its parent count; carries the default rank
    /// so the parent's max-rank still accounts for it.
    Unsolved(UnsolvedRule),
}

impl RuleResult {
    pub fn path(&self) -> &Path {
        match self {
            RuleResult::Count(r) => &r.path,
            RuleResult::Course(r) => &r.rule.path,
            RuleResult::Query(r) => &r.rule.path,
            RuleResult::Requirement(r) => &r.path,
            RuleResult::Proficiency(r) => &r.rule.path,
            RuleResult::Conditional(r) => &r.path,
            RuleResult::Unsolved(r) => r.rule.path(),
        }
    }

    pub fn status(&self) -> ResultStatus {
        match self {
            RuleResult::Count(r) => r.status(),
            RuleResult::Course(r) => r.status(),
            RuleResult::Query(r) => r.status(),
            RuleResult::Requirement(r) => r.status(),
            RuleResult::Proficiency(r) => r.status(),
            RuleResult::Conditional(r) => r.status(),
            RuleResult::Unsolved(_) => ResultStatus::NeedsMoreItems,
        }
    }

    pub fn ok(&self) -> bool {
        self.status().is_passing()
    }

    pub fn waived(&self) -> bool {
        matches!(self.status(), ResultStatus::Waived)
    }

    /// Progress measure as `(rank, max_rank)`. Ranks order candidate
    /// results; max-ranks normalize progress percentages.
    pub fn rank(&self) -> (Decimal, Decimal) {
        match self {
            RuleResult::Count(r) => r.rank(),
            RuleResult::Course(r) => r.rank(),
            RuleResult::Query(r) => r.rank(),
            RuleResult::Requirement(r) => r.rank(),
            RuleResult::Proficiency(r) => r.rank(),
            RuleResult::Conditional(r) => r.rank(),
            RuleResult::Unsolved(_) => (Decimal::ZERO, Decimal::ONE),
        }
    }

    /// Successful claims made anywhere in this result subtree.
    pub fn claims(&self) -> Vec<Claim> {
        match self {
            RuleResult::Count(r) => r.claims(),
            RuleResult::Course(r) => r.claims(),
            RuleResult::Query(r) => r.claims(),
            RuleResult::Requirement(r) => r.claims(),
            RuleResult::Proficiency(r) => r.claims(),
            RuleResult::Conditional(r) => r.claims(),
            RuleResult::Unsolved(_) => Vec::new(),
        }
    }

    /// Claims that count toward the area GPA; requirements marked
    /// out-of-gpa prune their whole subtree.
    pub fn claims_for_gpa(&self) -> Vec<Claim> {
        match self {
            RuleResult::Count(r) => r.claims_for_gpa(),
            RuleResult::Requirement(r) => r.claims_for_gpa(),
            RuleResult::Conditional(r) => r.claims_for_gpa(),
            other => other.claims(),
        }
    }

    /// Courses this result actually used, claimed or passed through.
    pub fn matched(&self) -> Vec<CourseInstance> {
        match self {
            RuleResult::Count(r) => r.matched(),
            RuleResult::Course(r) => r.matched(),
            RuleResult::Query(r) => r.matched(),
            RuleResult::Requirement(r) => r.matched(),
            RuleResult::Proficiency(r) => r.matched(),
            RuleResult::Conditional(r) => r.matched(),
            RuleResult::Unsolved(_) => Vec::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RuleResult::Count(r) => r.to_json(),
            RuleResult::Course(r) => r.to_json(),
            RuleResult::Query(r) => r.to_json(),
            RuleResult::Requirement(r) => r.to_json(),
            RuleResult::Proficiency(r) => r.to_json(),
            RuleResult::Conditional(r) => r.to_json(),
            RuleResult::Unsolved(r) => r.rule.to_json(),
        }
    }
}

/// A rule its parent chose not to solve in this candidate.
#[derive(Debug, Clone)]
pub struct UnsolvedRule {
    pub rule: Arc<Rule>,
}

fn attach_path(
    rule: &mut Rule,
    base: &Path,
    bodies: &mut Vec<RequirementBody>,
    attached: &mut BTreeSet<usize>,
) -> Result<(), RuleError> {
    match rule {
        Rule::Count(r) => {
            r.path = base.append(".count");
            for (i, child) in r.of.iter_mut().enumerate() {
                let slot = r.path.append_index(i);
                attach_path(Arc::make_mut(child), &slot, bodies, attached)?;
            }
            let audit_base = r.path.append(".audit");
            for (i, clause) in r.audit_clauses.iter_mut().enumerate() {
                attach_assertion_path(clause, &audit_base.append_index(i));
            }
        }
        Rule::Course(r) => {
            r.path = base.append(format!("*{}", r.target()));
        }
        Rule::Query(r) => {
            r.path = base.append(".query");
            let assertion_base = r.path.append(".assertions");
            for (i, clause) in r.assertions.iter_mut().enumerate() {
                attach_assertion_path(clause, &assertion_base.append_index(i));
            }
        }
        Rule::Requirement(r) => {
            let body = bodies
                .get(r.requirement.0)
                .ok_or_else(|| RuleError::UnknownRequirement {
                    name: r.name.clone(),
                })?;
            r.name = body.name.clone();
            r.is_audited = body.is_audited;
            r.in_gpa = body.in_gpa;
            r.disjoint = body.disjoint;
            r.path = base.append(format!("%{}", r.name));

            // the first reference to a body positions its subtree
            if attached.insert(r.requirement.0) {
                let inner_path = r.path.clone();
                let result = bodies[r.requirement.0].result.take();
                if let Some(mut result) = result {
                    attach_path(Arc::make_mut(&mut result), &inner_path, bodies, attached)?;
                    bodies[r.requirement.0].result = Some(result);
                }
            }
        }
        Rule::Proficiency(r) => {
            r.path = base.append(format!(".proficiency={}", r.proficiency));
            if let Some(course) = &mut r.course {
                course.path = r.path.append(format!("*{}", course.target()));
            }
        }
        Rule::Conditional(r) => {
            r.path = base.append(".cond");
            attach_path(
                Arc::make_mut(&mut r.when_true),
                &r.path.append("/t"),
                bodies,
                attached,
            )?;
            if let Some(when_false) = &mut r.when_false {
                attach_path(Arc::make_mut(when_false), &r.path.append("/f"), bodies, attached)?;
            }
        }
    }
    Ok(())
}

fn attach_assertion_path(clause: &mut crate::assertion::AnyAssertion, path: &Path) {
    use crate::assertion::AnyAssertion;
    match clause {
        AnyAssertion::Single(a) => a.path = path.clone(),
        AnyAssertion::Conditional {
            when_true,
            when_false,
            ..
        } => {
            when_true.path = path.append("/t");
            if let Some(a) = when_false {
                a.path = path.append("/f");
            }
        }
    }
}
