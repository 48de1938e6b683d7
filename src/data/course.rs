//! Transcript line items.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use super::GradeCode;

/// The kind of transcript line a course came from. Regular term-based
/// enrollments sort ahead of credit adjustments and transfer work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CourseType {
    Semester,
    Interim,
    Summer,
    AdvancedPlacement,
    Transfer,
    Adjustment,
    Other,
}

impl CourseType {
    fn sort_rank(self) -> u8 {
        match self {
            CourseType::Semester | CourseType::Interim | CourseType::Summer => 1,
            _ => 2,
        }
    }
}

/// One course-taking event on a transcript.
///
/// Identity is the `clbid`; `crsid` groups repeats of the same catalog
/// course. Instances are frozen at load time and shared by reference
/// throughout the search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseInstance {
    pub clbid: String,
    pub crsid: String,
    /// "SUBJ NUM" identity string, e.g. `"CSCI 251"`.
    pub identity: String,
    pub subject: String,
    pub number: String,
    pub section: Option<String>,
    pub level: i64,
    pub year: i64,
    pub term: i64,
    pub credits: Decimal,
    pub grade_code: GradeCode,
    pub grade_points: Decimal,
    pub gpa_points: Decimal,
    pub is_in_gpa: bool,
    pub is_in_progress: bool,
    pub is_in_progress_this_term: bool,
    pub is_in_progress_in_future: bool,
    pub is_incomplete: bool,
    pub is_repeat: bool,
    pub is_stolaf: bool,
    pub is_lab: bool,
    pub attributes: Vec<String>,
    pub gereqs: Vec<String>,
    pub institution: String,
    pub course_type: CourseType,
    pub name: String,
}

impl CourseInstance {
    pub fn builder(clbid: impl Into<String>, course: impl Into<String>) -> CourseInstanceBuilder {
        CourseInstanceBuilder::new(clbid, course)
    }

    /// The repeat-insensitive identity string.
    pub fn course(&self) -> &str {
        &self.identity
    }

    /// Stable sort key: regular enrollments first, then by year, term,
    /// and finally clbid as the tie-breaker.
    pub fn sort_order(&self) -> (u8, i64, i64, &str) {
        (self.course_type.sort_rank(), self.year, self.term, &self.clbid)
    }

    pub fn year_term(&self) -> String {
        format!("{}-{}", self.year, self.term)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "type": "course",
            "clbid": self.clbid,
            "crsid": self.crsid,
            "course": self.identity,
            "subject": self.subject,
            "number": self.number,
            "section": self.section,
            "level": self.level,
            "year": self.year,
            "term": self.term,
            "credits": self.credits.to_string(),
            "grade_code": self.grade_code,
            "grade_points": self.grade_points.to_string(),
            "gpa_points": self.gpa_points.to_string(),
            "flag_gpa": self.is_in_gpa,
            "flag_in_progress": self.is_in_progress,
            "flag_incomplete": self.is_incomplete,
            "flag_repeat": self.is_repeat,
            "flag_stolaf": self.is_stolaf,
            "flag_lab": self.is_lab,
            "attributes": self.attributes,
            "gereqs": self.gereqs,
            "institution": self.institution,
            "course_type": self.course_type,
            "name": self.name,
        })
    }
}

impl fmt::Display for CourseInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity)
    }
}

/// Builder for [`CourseInstance`], the loader-side construction boundary.
///
/// `new(clbid, "SUBJ NUM")` parses the identity string; everything else
/// defaults to a completed one-credit graded on-campus course.
#[derive(Debug, Clone)]
pub struct CourseInstanceBuilder {
    instance: CourseInstance,
}

impl CourseInstanceBuilder {
    pub fn new(clbid: impl Into<String>, course: impl Into<String>) -> CourseInstanceBuilder {
        let clbid = clbid.into();
        let identity = course.into();

        let (subject, number) = match identity.split_once(' ') {
            Some((s, n)) => (s.to_string(), n.to_string()),
            None => (identity.clone(), String::new()),
        };

        let level = number
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse::<i64>()
            .map(|n| n / 100 * 100)
            .unwrap_or(0);

        CourseInstanceBuilder {
            instance: CourseInstance {
                crsid: identity.clone(),
                clbid,
                identity,
                subject,
                number,
                section: None,
                level,
                year: 2000,
                term: 1,
                credits: Decimal::ONE,
                grade_code: GradeCode::B,
                grade_points: GradeCode::B.points(),
                gpa_points: GradeCode::B.points(),
                is_in_gpa: true,
                is_in_progress: false,
                is_in_progress_this_term: false,
                is_in_progress_in_future: false,
                is_incomplete: false,
                is_repeat: false,
                is_stolaf: true,
                is_lab: false,
                attributes: Vec::new(),
                gereqs: Vec::new(),
                institution: "HOME".to_string(),
                course_type: CourseType::Semester,
                name: String::new(),
            },
        }
    }

    pub fn crsid(mut self, crsid: impl Into<String>) -> Self {
        self.instance.crsid = crsid.into();
        self
    }

    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.instance.section = Some(section.into());
        self
    }

    pub fn year(mut self, year: i64) -> Self {
        self.instance.year = year;
        self
    }

    pub fn term(mut self, term: i64) -> Self {
        self.instance.term = term;
        self
    }

    pub fn credits(mut self, credits: Decimal) -> Self {
        self.instance.credits = credits;
        self
    }

    /// Sets the grade code and derives grade points from it. Per-credit
    /// gpa points are grade points times credits.
    pub fn grade(mut self, grade: GradeCode) -> Self {
        self.instance.grade_code = grade;
        self.instance.grade_points = grade.points();
        self.instance.gpa_points = grade.points() * self.instance.credits;
        self
    }

    pub fn in_gpa(mut self, flag: bool) -> Self {
        self.instance.is_in_gpa = flag;
        self
    }

    /// Marks the course as enrolled-but-unfinished in the current term.
    pub fn in_progress_this_term(mut self) -> Self {
        self.instance.is_in_progress = true;
        self.instance.is_in_progress_this_term = true;
        self.instance.is_in_gpa = false;
        self.instance.grade_code = GradeCode::Ip;
        self
    }

    /// Marks the course as registered for a future term.
    pub fn in_progress_in_future(mut self) -> Self {
        self.instance.is_in_progress = true;
        self.instance.is_in_progress_in_future = true;
        self.instance.is_in_gpa = false;
        self.instance.grade_code = GradeCode::Registered;
        self
    }

    pub fn incomplete(mut self) -> Self {
        self.instance.is_in_progress = true;
        self.instance.is_incomplete = true;
        self.instance.is_in_gpa = false;
        self.instance.grade_code = GradeCode::I;
        self
    }

    pub fn repeat(mut self, flag: bool) -> Self {
        self.instance.is_repeat = flag;
        self
    }

    pub fn lab(mut self, flag: bool) -> Self {
        self.instance.is_lab = flag;
        self
    }

    pub fn attributes(mut self, attrs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.instance.attributes = attrs.into_iter().map(Into::into).collect();
        self
    }

    pub fn gereqs(mut self, gereqs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.instance.gereqs = gereqs.into_iter().map(Into::into).collect();
        self
    }

    pub fn institution(mut self, institution: impl Into<String>) -> Self {
        let institution = institution.into();
        self.instance.is_stolaf = institution == "HOME";
        self.instance.institution = institution;
        self
    }

    pub fn course_type(mut self, course_type: CourseType) -> Self {
        self.instance.course_type = course_type;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.instance.name = name.into();
        self
    }

    pub fn build(self) -> CourseInstance {
        self.instance
    }
}
