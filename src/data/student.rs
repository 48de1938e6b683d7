//! The loader-supplied student record.

use super::{AreaPointer, CourseInstance, Performance};
use std::collections::BTreeSet;

/// Everything the engine needs to know about one student: the transcript
/// (plus the parallel including-failed list used only for GPA), declared
/// areas, performances, and passed proficiency exams.
#[derive(Debug, Clone, Default)]
pub struct Student {
    pub courses: Vec<CourseInstance>,
    pub courses_with_failed: Vec<CourseInstance>,
    pub areas: Vec<AreaPointer>,
    pub performances: Vec<Performance>,
    pub proficiencies: BTreeSet<String>,
}

impl Student {
    pub fn new(courses: Vec<CourseInstance>) -> Student {
        Student {
            courses_with_failed: courses.clone(),
            courses,
            ..Student::default()
        }
    }

    pub fn with_areas(mut self, areas: Vec<AreaPointer>) -> Student {
        self.areas = areas;
        self
    }

    pub fn with_performances(mut self, performances: Vec<Performance>) -> Student {
        self.performances = performances;
        self
    }

    pub fn with_proficiencies(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Student {
        self.proficiencies = names.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the including-failed list (by default it mirrors `courses`).
    pub fn with_failed_courses(mut self, courses: Vec<CourseInstance>) -> Student {
        self.courses_with_failed = courses;
        self
    }
}
