//! The course rule: require one specific course.
//!
//! A course rule yields exactly one solution; multiplicity lives in the
//! audit, which walks the matching courses in transcript order and
//! keeps the first one it can claim.

use crate::claims::Claim;
use crate::context::RequirementContext;
use crate::data::{CourseInstance, CourseType};
use crate::error::RuleError;
use crate::path::Path;
use crate::status::ResultStatus;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CourseRule {
    /// Course identity ("DEPT 123") or crsid.
    pub course: Option<String>,
    pub clbid: Option<String>,
    /// Name of an Advanced Placement credit.
    pub ap: Option<String>,
    pub institution: Option<String>,
    pub name: Option<String>,
    /// Minimum grade, in grade points.
    pub grade: Option<Decimal>,
    pub allow_claimed: bool,
    /// Match only courses some other rule has already claimed.
    pub from_claimed: bool,
    pub hidden: bool,
    pub path: Path,
}

impl CourseRule {
    pub fn new(course: impl Into<String>) -> CourseRule {
        CourseRule {
            course: Some(course.into()),
            clbid: None,
            ap: None,
            institution: None,
            name: None,
            grade: None,
            allow_claimed: false,
            from_claimed: false,
            hidden: false,
            path: Path::root(),
        }
    }

    pub fn for_ap(ap: impl Into<String>) -> CourseRule {
        let mut rule = CourseRule::new("");
        rule.course = None;
        rule.ap = Some(ap.into());
        rule
    }

    pub fn with_clbid(mut self, clbid: impl Into<String>) -> CourseRule {
        self.clbid = Some(clbid.into());
        self
    }

    pub fn with_institution(mut self, institution: impl Into<String>) -> CourseRule {
        self.institution = Some(institution.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> CourseRule {
        self.name = Some(name.into());
        self
    }

    pub fn with_grade(mut self, grade: Decimal) -> CourseRule {
        self.grade = Some(grade);
        self
    }

    pub fn with_allow_claimed(mut self) -> CourseRule {
        self.allow_claimed = true;
        self
    }

    pub fn with_from_claimed(mut self) -> CourseRule {
        self.from_claimed = true;
        self.allow_claimed = true;
        self
    }

    pub fn with_hidden(mut self) -> CourseRule {
        self.hidden = true;
        self
    }

    /// Display identity for the path segment.
    pub fn target(&self) -> &str {
        self.course
            .as_deref()
            .or(self.ap.as_deref())
            .or(self.name.as_deref())
            .or(self.clbid.as_deref())
            .unwrap_or("")
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        let has_target = self.course.is_some()
            || self.clbid.is_some()
            || self.ap.is_some()
            || (self.institution.is_some() && self.name.is_some());
        if !has_target {
            return Err(RuleError::CourseRuleWithoutTarget {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    pub fn matches(&self, course: &CourseInstance) -> bool {
        if let Some(clbid) = &self.clbid {
            if course.clbid != *clbid {
                return false;
            }
        }
        if let Some(identity) = &self.course {
            if course.identity != *identity && course.crsid != *identity {
                return false;
            }
        }
        if let Some(ap) = &self.ap {
            if course.course_type != CourseType::AdvancedPlacement || course.name != *ap {
                return false;
            }
        }
        if let Some(institution) = &self.institution {
            if course.institution != *institution {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if course.name != *name {
                return false;
            }
        }
        if let Some(grade) = self.grade {
            if course.is_in_progress || course.grade_points < grade {
                return false;
            }
        }
        true
    }

    /// Inserted courses take priority over transcript matches; a
    /// from-claimed rule matches nothing here because its pool is only
    /// known at audit time.
    pub fn all_matches(&self, ctx: &RequirementContext) -> Vec<CourseInstance> {
        let inserted = ctx.exceptions.insertions(&self.path);
        if !inserted.is_empty() {
            return inserted
                .iter()
                .filter_map(|clbid| ctx.find_course_by_clbid(clbid))
                .cloned()
                .collect();
        }

        if self.from_claimed {
            return Vec::new();
        }

        ctx.transcript()
            .iter()
            .filter(|c| self.matches(c))
            .cloned()
            .collect()
    }

    pub fn has_potential(&self, ctx: &RequirementContext) -> bool {
        self.from_claimed || !self.all_matches(ctx).is_empty()
    }

    pub fn solutions<'a>(
        &'a self,
        ctx: &'a RequirementContext,
    ) -> Box<dyn Iterator<Item = super::Solution> + 'a> {
        let overridden = ctx.exceptions.is_waived(&self.path);
        Box::new(std::iter::once(super::Solution::Course(CourseSolution {
            rule: self.clone(),
            overridden,
        })))
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "course",
            "path": self.path,
            "course": self.course,
            "clbid": self.clbid,
            "ap": self.ap,
            "institution": self.institution,
            "name": self.name,
            "grade": self.grade.map(|g| g.to_string()),
            "allow_claimed": self.allow_claimed,
            "from_claimed": self.from_claimed,
            "hidden": self.hidden,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CourseSolution {
    pub rule: CourseRule,
    pub overridden: bool,
}

impl CourseSolution {
    pub fn audit(&self, ctx: &RequirementContext) -> CourseResult {
        if self.overridden {
            return CourseResult {
                rule: self.rule.clone(),
                claim: None,
                course: None,
                was_forced: false,
                overridden: true,
            };
        }

        let candidates = if self.rule.from_claimed {
            ctx.claimed_courses()
                .into_iter()
                .filter(|c| self.rule.matches(c))
                .collect()
        } else {
            self.rule.all_matches(ctx)
        };

        let forced = ctx.exceptions.forced_insertions(&self.rule.path);
        let mut last_failed: Option<Claim> = None;

        for course in candidates {
            let was_forced = forced.contains(&course.clbid);
            let claim = ctx.make_claim(
                &course,
                &self.rule.path,
                self.rule.allow_claimed || was_forced,
            );

            if !claim.failed {
                return CourseResult {
                    rule: self.rule.clone(),
                    claim: Some(claim),
                    course: Some(course),
                    was_forced,
                    overridden: false,
                };
            }

            debug!(path = %self.rule.path, clbid = %course.clbid, "claim contention");
            last_failed = Some(claim);
        }

        CourseResult {
            rule: self.rule.clone(),
            claim: last_failed,
            course: None,
            was_forced: false,
            overridden: false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut value = self.rule.to_json();
        if let Some(map) = value.as_object_mut() {
            map.insert("overridden".into(), json!(self.overridden));
        }
        value
    }
}

#[derive(Debug, Clone)]
pub struct CourseResult {
    pub rule: CourseRule,
    /// Successful claim, or the last failed one when every candidate
    /// was already taken.
    pub claim: Option<Claim>,
    pub course: Option<CourseInstance>,
    pub was_forced: bool,
    pub overridden: bool,
}

impl CourseResult {
    fn succeeded(&self) -> bool {
        self.claim.as_ref().is_some_and(|c| !c.failed)
    }

    pub fn status(&self) -> ResultStatus {
        if self.overridden {
            return ResultStatus::Waived;
        }
        match &self.course {
            Some(c) if self.succeeded() => {
                if c.is_in_progress_this_term || c.is_incomplete {
                    ResultStatus::PendingCurrent
                } else if c.is_in_progress_in_future {
                    ResultStatus::PendingRegistered
                } else {
                    ResultStatus::Done
                }
            }
            _ => ResultStatus::Empty,
        }
    }

    pub fn rank(&self) -> (Decimal, Decimal) {
        let rank = match self.status() {
            ResultStatus::Done | ResultStatus::Waived => Decimal::ONE,
            ResultStatus::PendingCurrent | ResultStatus::PendingRegistered => dec!(0.5),
            _ => Decimal::ZERO,
        };
        (rank, Decimal::ONE)
    }

    pub fn claims(&self) -> Vec<Claim> {
        match &self.claim {
            Some(claim) if !claim.failed => vec![claim.clone()],
            _ => Vec::new(),
        }
    }

    pub fn matched(&self) -> Vec<CourseInstance> {
        if self.succeeded() {
            self.course.iter().cloned().collect()
        } else {
            Vec::new()
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
            map.insert("was_forced".into(), json!(self.was_forced));
            map.insert(
                "claims".into(),
                json!(self.claim.as_ref().map(Claim::to_json)),
            );
        }
        value
    }
}
