//! The proficiency rule: an exam pass or an embedded course fallback.
//!
//! Satisfied directly when the student has passed the named proficiency
//! exam; otherwise the embedded course rule, if any, gets a chance to
//! satisfy it with coursework.

use crate::claims::Claim;
use crate::context::RequirementContext;
use crate::data::CourseInstance;
use crate::error::RuleError;
use crate::path::Path;
use crate::status::ResultStatus;
use rust_decimal::Decimal;
use serde_json::json;

use super::course::{CourseResult, CourseRule, CourseSolution};
use super::Solution;

#[derive(Debug, Clone)]
pub struct ProficiencyRule {
    pub proficiency: String,
    pub course: Option<Box<CourseRule>>,
    pub path: Path,
}

impl ProficiencyRule {
    pub fn new(proficiency: impl Into<String>) -> ProficiencyRule {
        ProficiencyRule {
            proficiency: proficiency.into(),
            course: None,
            path: Path::root(),
        }
    }

    pub fn with_course(mut self, course: CourseRule) -> ProficiencyRule {
        self.course = Some(Box::new(course));
        self
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if let Some(course) = &self.course {
            course.validate()?;
        }
        Ok(())
    }

    pub fn solutions<'a>(
        &'a self,
        ctx: &'a RequirementContext,
    ) -> Box<dyn Iterator<Item = Solution> + 'a> {
        let overridden = ctx.exceptions.is_waived(&self.path);
        Box::new(std::iter::once(Solution::Proficiency(ProficiencySolution {
            rule: self.clone(),
            course_solution: self.course.as_ref().map(|rule| CourseSolution {
                rule: (**rule).clone(),
                overridden: ctx.exceptions.is_waived(&rule.path),
            }),
            overridden,
        })))
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "proficiency",
            "path": self.path,
            "proficiency": self.proficiency,
            "course": self.course.as_ref().map(|c| c.to_json()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProficiencySolution {
    pub rule: ProficiencyRule,
    pub course_solution: Option<CourseSolution>,
    pub overridden: bool,
}

impl ProficiencySolution {
    pub fn audit(&self, ctx: &RequirementContext) -> ProficiencyResult {
        if self.overridden {
            return ProficiencyResult {
                rule: self.rule.clone(),
                exam_passed: false,
                course_result: None,
                overridden: true,
            };
        }

        let exam_passed = ctx.has_proficiency(&self.rule.proficiency);

        // the exam pass makes the coursework fallback moot
        let course_result = if exam_passed {
            None
        } else {
            self.course_solution.as_ref().map(|s| s.audit(ctx))
        };

        ProficiencyResult {
            rule: self.rule.clone(),
            exam_passed,
            course_result,
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
pub struct ProficiencyResult {
    pub rule: ProficiencyRule,
    pub exam_passed: bool,
    pub course_result: Option<CourseResult>,
    pub overridden: bool,
}

impl ProficiencyResult {
    pub fn status(&self) -> ResultStatus {
        if self.overridden {
            return ResultStatus::Waived;
        }
        if self.exam_passed {
            return ResultStatus::Done;
        }
        match &self.course_result {
            Some(result) => result.status(),
            None => ResultStatus::Empty,
        }
    }

    pub fn rank(&self) -> (Decimal, Decimal) {
        if self.overridden || self.exam_passed {
            return (Decimal::ONE, Decimal::ONE);
        }
        match &self.course_result {
            Some(result) => result.rank(),
            None => (Decimal::ZERO, Decimal::ONE),
        }
    }

    pub fn claims(&self) -> Vec<Claim> {
        self.course_result
            .as_ref()
            .map(|r| r.claims())
            .unwrap_or_default()
    }

    pub fn matched(&self) -> Vec<CourseInstance> {
        self.course_result
            .as_ref()
            .map(|r| r.matched())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let (rank, max_rank) = self.rank();
        json!({
            "type": "proficiency",
            "path": self.rule.path,
            "proficiency": self.rule.proficiency,
            "status": self.status(),
            "rank": rank.to_string(),
            "max_rank": max_rank.to_string(),
            "ok": self.status().is_passing(),
            "exam_passed": self.exam_passed,
            "course": self.course_result.as_ref().map(|r| r.to_json()),
            "overridden": self.overridden,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Student;
    use crate::rule::{Rule, RuleResult, RuleTree};

    fn tree() -> RuleTree {
        RuleTree::new(
            Rule::Proficiency(
                ProficiencyRule::new("Keyboard Level IV")
                    .with_course(CourseRule::new("MUSPF 110")),
            ),
            Vec::new(),
        )
        .unwrap()
    }

    fn solve(tree: &RuleTree, ctx: &RequirementContext) -> RuleResult {
        let solutions: Vec<Solution> = tree.root.solutions(ctx, 1).collect();
        assert_eq!(solutions.len(), 1);
        solutions[0].audit(ctx)
    }

    #[test]
    fn test_exam_pass_is_done_without_claims() {
        let student = Student::new(vec![CourseInstance::builder("1", "MUSPF 110").build()])
            .with_proficiencies(["Keyboard Level IV".to_string()]);
        let ctx = RequirementContext::for_student(&student);

        let result = solve(&tree(), &ctx);
        assert_eq!(result.status(), ResultStatus::Done);
        assert!(result.claims().is_empty(), "exam passes claim no courses");
    }

    #[test]
    fn test_course_fallback() {
        let student = Student::new(vec![CourseInstance::builder("1", "MUSPF 110").build()]);
        let ctx = RequirementContext::for_student(&student);

        let result = solve(&tree(), &ctx);
        assert_eq!(result.status(), ResultStatus::Done);
        assert_eq!(result.claims().len(), 1);
        assert_eq!(result.matched()[0].identity, "MUSPF 110");
    }

    #[test]
    fn test_no_exam_no_course_is_empty() {
        let ctx = RequirementContext::new(Vec::new());
        let result = solve(&tree(), &ctx);
        assert_eq!(result.status(), ResultStatus::Empty);
    }

    #[test]
    fn test_embedded_course_path() {
        let tree = tree();
        let Rule::Proficiency(rule) = tree.root.as_ref() else { panic!() };
        assert_eq!(rule.path.to_string(), "$..proficiency=Keyboard Level IV");
        assert_eq!(
            rule.course.as_ref().unwrap().path.to_string(),
            "$..proficiency=Keyboard Level IV.*MUSPF 110"
        );
    }
}
