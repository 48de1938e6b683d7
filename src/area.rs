//! The top of the engine: one area of study, audited end to end.
//!
//! An audit walks every limit-respecting transcript variant, enumerates
//! the root rule's candidate solutions over each, audits them in order,
//! and keeps the best result. The first fully-passing result wins
//! outright; otherwise the walk runs until the stream or the iteration
//! budget is exhausted.

use crate::claims::{Claim, MulticountableMap};
use crate::context::RequirementContext;
use crate::data::{grade_point_average, AreaKind, CourseInstance, Student};
use crate::exception::ExceptionSet;
use crate::limit::LimitSet;
use crate::rule::{RuleResult, RuleTree};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info};

/// One area-of-study specification, ready to audit students against.
#[derive(Debug, Clone)]
pub struct Area {
    pub name: String,
    pub kind: AreaKind,
    pub code: String,
    pub degree: Option<String>,
    pub limits: LimitSet,
    pub multicountable: MulticountableMap,
    pub tree: RuleTree,
}

impl Area {
    pub fn new(
        name: impl Into<String>,
        kind: AreaKind,
        code: impl Into<String>,
        tree: RuleTree,
    ) -> Area {
        Area {
            name: name.into(),
            kind,
            code: code.into(),
            degree: None,
            limits: LimitSet::new(Vec::new()),
            multicountable: MulticountableMap::new(),
            tree,
        }
    }

    pub fn with_degree(mut self, degree: impl Into<String>) -> Area {
        self.degree = Some(degree.into());
        self
    }

    pub fn with_limits(mut self, limits: LimitSet) -> Area {
        self.limits = limits;
        self
    }

    pub fn with_multicountable(mut self, multicountable: MulticountableMap) -> Area {
        self.multicountable = multicountable;
        self
    }

    fn base_context(&self, student: &Student, exceptions: &ExceptionSet) -> RequirementContext {
        RequirementContext::for_student(student)
            .with_exceptions(exceptions.clone())
            .with_multicountable(self.multicountable.clone())
            .with_requirements(self.tree.requirements.clone())
    }

    /// Runs the audit to completion or to the `stop_after` budget,
    /// whichever comes first, keeping the best result seen.
    pub fn audit(
        &self,
        student: &Student,
        exceptions: &ExceptionSet,
        options: &AuditOptions,
    ) -> AuditOutcome {
        let estimate = self.estimate(student, exceptions);
        info!(area = %self.code, estimate, "starting audit");

        let base = self.base_context(student, exceptions);
        let forced = exceptions.all_forced_insertions();
        let limits = self.limits.resolve(&|expr| base.evaluate_expression(expr));

        let mut iterations: usize = 0;
        let mut best: Option<AreaResult> = None;
        let mut best_rank = Decimal::ZERO;

        'transcripts: for transcript in
            limits.limited_transcripts(&student.courses, &forced)
        {
            debug!(courses = transcript.len(), "auditing transcript variant");
            let ctx = base.with_transcript(transcript);

            for solution in self.tree.root.solutions(&ctx, 1) {
                iterations += 1;

                let result = solution.audit(&ctx);
                let (rank, _max_rank) = result.rank();
                let ok = result.ok();

                if best.is_none() || rank > best_rank || ok {
                    best_rank = rank;
                    best = Some(self.settle(result, &ctx));
                }

                if ok {
                    debug!(iterations, "full pass found");
                    break 'transcripts;
                }

                if iterations % options.progress_every == 0 {
                    info!(iterations, best_rank = %best_rank, "audit in progress");
                }

                if options.stop_after.is_some_and(|cap| iterations >= cap) {
                    debug!(iterations, "iteration budget exhausted");
                    break 'transcripts;
                }

                // audits after the first run without the claims of the
                // independently-solved subtrees; those subtrees cannot
                // contend for the same courses anyway
                ctx.reset_claims();
            }
        }

        info!(area = %self.code, iterations, best_rank = %best_rank, "audit finished");

        AuditOutcome {
            result: best,
            iterations,
            estimate,
        }
    }

    /// Rough size of the full search space, across transcript variants.
    pub fn estimate(&self, student: &Student, exceptions: &ExceptionSet) -> u64 {
        let base = self.base_context(student, exceptions);
        let forced = exceptions.all_forced_insertions();

        self.limits
            .resolve(&|expr| base.evaluate_expression(expr))
            .limited_transcripts(&student.courses, &forced)
            .map(|transcript| self.tree.root.estimate(&base.with_transcript(transcript)))
            .fold(0u64, |acc, n| acc.saturating_add(n))
    }

    fn settle(&self, result: RuleResult, ctx: &RequirementContext) -> AreaResult {
        let gpa = self.gpa(&result, ctx);
        AreaResult {
            name: self.name.clone(),
            kind: self.kind,
            code: self.code.clone(),
            degree: self.degree.clone(),
            result,
            gpa,
        }
    }

    /// Degree audits average the whole record, failed courses included;
    /// everything else averages only the courses this result used.
    fn gpa(&self, result: &RuleResult, ctx: &RequirementContext) -> Decimal {
        if self.kind == AreaKind::Degree {
            return grade_point_average(ctx.transcript_with_failed());
        }

        let courses: Vec<CourseInstance> = result
            .claims_for_gpa()
            .iter()
            .filter(|claim| !claim.failed)
            .filter_map(|claim| ctx.find_course_by_clbid(&claim.clbid))
            .cloned()
            .collect();
        grade_point_average(&courses)
    }
}

/// Knobs for one [`Area::audit`] run.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Stop pulling candidates after this many audits.
    pub stop_after: Option<usize>,
    pub progress_every: usize,
}

impl Default for AuditOptions {
    fn default() -> AuditOptions {
        AuditOptions {
            stop_after: None,
            progress_every: 1_000,
        }
    }
}

/// The driver's summary of one audit run.
#[derive(Debug)]
pub struct AuditOutcome {
    /// Best result found, or none when no solution was audited at all.
    pub result: Option<AreaResult>,
    pub iterations: usize,
    pub estimate: u64,
}

/// The settled outcome of auditing one student against one area.
#[derive(Debug, Clone)]
pub struct AreaResult {
    pub name: String,
    pub kind: AreaKind,
    pub code: String,
    pub degree: Option<String>,
    pub result: RuleResult,
    pub gpa: Decimal,
}

impl AreaResult {
    pub fn status(&self) -> crate::status::ResultStatus {
        self.result.status()
    }

    pub fn ok(&self) -> bool {
        self.result.ok()
    }

    pub fn rank(&self) -> (Decimal, Decimal) {
        self.result.rank()
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.result.claims()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (rank, max_rank) = self.rank();
        json!({
            "type": "area",
            "name": self.name,
            "kind": self.kind,
            "code": self.code,
            "degree": self.degree,
            "status": self.status(),
            "ok": self.ok(),
            "rank": rank.to_string(),
            "max_rank": max_rank.to_string(),
            "gpa": self.gpa.round_dp(2).to_string(),
            "result": self.result.to_json(),
        })
    }
}
