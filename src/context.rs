//! Per-audit-attempt state.
//!
//! A context bundles the frozen transcript view with the one mutable
//! component of the whole engine, the claim ledger. The ledger sits
//! behind a `RefCell` so that auditing can claim courses while solution
//! iterators over the same context are still alive; solving is
//! single-threaded by design.

use crate::claims::{Claim, ClaimLedger, MulticountableMap};
use crate::data::{AreaPointer, CourseInstance, Performance, Student};
use crate::exception::ExceptionSet;
use crate::path::Path;
use crate::predicate::{PredicateExpression, PredicateFunction};
use crate::rule::{RequirementBody, RequirementId};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Everything a rule needs to produce and audit its solutions.
#[derive(Debug, Default)]
pub struct RequirementContext {
    transcript: Vec<CourseInstance>,
    transcript_with_failed: Vec<CourseInstance>,
    by_clbid: BTreeMap<String, CourseInstance>,
    pub areas: Vec<AreaPointer>,
    pub performances: Vec<Performance>,
    pub proficiencies: BTreeSet<String>,
    pub exceptions: ExceptionSet,
    pub multicountable: MulticountableMap,
    requirements: Arc<Vec<RequirementBody>>,
    claims: RefCell<ClaimLedger>,
}

impl RequirementContext {
    pub fn new(transcript: Vec<CourseInstance>) -> RequirementContext {
        let by_clbid = transcript
            .iter()
            .map(|c| (c.clbid.clone(), c.clone()))
            .collect();

        RequirementContext {
            transcript_with_failed: transcript.clone(),
            transcript,
            by_clbid,
            ..RequirementContext::default()
        }
    }

    pub fn for_student(student: &Student) -> RequirementContext {
        let mut ctx = RequirementContext::new(student.courses.clone());
        ctx.transcript_with_failed = student.courses_with_failed.clone();
        for c in &student.courses_with_failed {
            ctx.by_clbid
                .entry(c.clbid.clone())
                .or_insert_with(|| c.clone());
        }
        ctx.areas = student.areas.clone();
        ctx.performances = student.performances.clone();
        ctx.proficiencies = student.proficiencies.clone();
        ctx
    }

    pub fn with_exceptions(mut self, exceptions: ExceptionSet) -> RequirementContext {
        self.exceptions = exceptions;
        self
    }

    pub fn with_multicountable(mut self, multicountable: MulticountableMap) -> RequirementContext {
        self.multicountable = multicountable;
        self
    }

    pub fn with_requirements(
        mut self,
        requirements: Arc<Vec<RequirementBody>>,
    ) -> RequirementContext {
        self.requirements = requirements;
        self
    }

    /// Looks up a named requirement's body in the arena.
    pub fn requirement(&self, id: RequirementId) -> Option<&RequirementBody> {
        self.requirements.get(id.0)
    }

    /// A sibling context over a different transcript variant (one
    /// limited-transcript partition), sharing everything else and
    /// starting with no claims.
    pub fn with_transcript(&self, transcript: Vec<CourseInstance>) -> RequirementContext {
        let by_clbid = transcript
            .iter()
            .chain(&self.transcript_with_failed)
            .map(|c| (c.clbid.clone(), c.clone()))
            .collect();

        RequirementContext {
            transcript,
            transcript_with_failed: self.transcript_with_failed.clone(),
            by_clbid,
            areas: self.areas.clone(),
            performances: self.performances.clone(),
            proficiencies: self.proficiencies.clone(),
            exceptions: self.exceptions.clone(),
            multicountable: self.multicountable.clone(),
            requirements: Arc::clone(&self.requirements),
            claims: RefCell::new(ClaimLedger::new()),
        }
    }

    pub fn transcript(&self) -> &[CourseInstance] {
        &self.transcript
    }

    pub fn transcript_with_failed(&self) -> &[CourseInstance] {
        &self.transcript_with_failed
    }

    pub fn find_course_by_clbid(&self, clbid: &str) -> Option<&CourseInstance> {
        self.by_clbid.get(clbid)
    }

    pub fn find_course(&self, identity: &str) -> Option<&CourseInstance> {
        self.transcript
            .iter()
            .find(|c| c.identity == identity || c.crsid == identity)
    }

    pub fn has_course(&self, identity: &str) -> bool {
        self.find_course(identity).is_some()
    }

    pub fn has_ip_course(&self, identity: &str) -> bool {
        self.find_course(identity).is_some_and(|c| c.is_in_progress)
    }

    pub fn has_completed_course(&self, identity: &str) -> bool {
        self.transcript
            .iter()
            .any(|c| (c.identity == identity || c.crsid == identity) && !c.is_in_progress)
    }

    pub fn has_declared_area_code(&self, code: &str) -> bool {
        self.areas.iter().any(|a| a.code == code)
    }

    pub fn has_proficiency(&self, name: &str) -> bool {
        self.proficiencies.contains(name)
    }

    /// Evaluates a context-level boolean expression against this
    /// student's record.
    pub fn evaluate_expression(&self, expr: &PredicateExpression) -> bool {
        expr.evaluate(&|f| match f {
            PredicateFunction::HasCourse(c) => self.has_course(c),
            PredicateFunction::HasIpCourse(c) => self.has_ip_course(c),
            PredicateFunction::HasCompletedCourse(c) => self.has_completed_course(c),
            PredicateFunction::HasDeclaredAreaCode(code) => self.has_declared_area_code(code),
            PredicateFunction::PassedProficiencyExam(name) => self.has_proficiency(name),
        })
    }

    // claim ledger access

    pub fn make_claim(&self, course: &CourseInstance, path: &Path, allow_claimed: bool) -> Claim {
        self.claims
            .borrow_mut()
            .make_claim(course, path, allow_claimed, &self.multicountable)
    }

    pub fn has_claims(&self) -> bool {
        self.claims.borrow().has_claims()
    }

    pub fn claimed_clbids(&self) -> BTreeSet<String> {
        self.claims.borrow().claimed_clbids()
    }

    /// Courses with at least one successful claim, in transcript order.
    pub fn claimed_courses(&self) -> Vec<CourseInstance> {
        let clbids = self.claimed_clbids();
        self.transcript
            .iter()
            .filter(|c| clbids.contains(&c.clbid))
            .cloned()
            .collect()
    }

    /// Drops all claims. Used between sibling solution attempts.
    pub fn reset_claims(&self) {
        self.claims.borrow_mut().clear();
    }

    /// Opens a fresh-claims bracket: the current ledger is set aside and
    /// replaced with an empty one. Dropping the guard restores the saved
    /// ledger on every exit path; [`ClaimScope::merge_and_restore`]
    /// additionally folds the claims made inside the bracket back in.
    pub fn fresh_claims(&self) -> ClaimScope<'_> {
        let saved = std::mem::take(&mut *self.claims.borrow_mut());
        ClaimScope {
            ctx: self,
            saved: Some(saved),
        }
    }
}

/// RAII guard for one fresh-claims bracket. See
/// [`RequirementContext::fresh_claims`].
#[derive(Debug)]
pub struct ClaimScope<'c> {
    ctx: &'c RequirementContext,
    saved: Option<ClaimLedger>,
}

impl ClaimScope<'_> {
    /// True if any claims were made inside the bracket.
    pub fn has_claims(&self) -> bool {
        self.ctx.has_claims()
    }

    /// Restores the saved ledger, then merges the bracket's claims into
    /// it. Used when an independently-solved subtree's winning claims
    /// must survive into the shared ledger.
    pub fn merge_and_restore(mut self) {
        if let Some(saved) = self.saved.take() {
            let mut claims = self.ctx.claims.borrow_mut();
            let inner = std::mem::replace(&mut *claims, saved);
            claims.merge(inner);
        }
    }
}

impl Drop for ClaimScope<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            *self.ctx.claims.borrow_mut() = saved;
        }
    }
}
