//! Student-facing data: courses, grades, declared areas, performances.
//!
//! Everything in this module is an immutable snapshot produced by the
//! external loader. The engine references courses by `clbid` and never
//! copies-and-mutates an instance after construction.

mod area;
mod course;
mod grades;
mod performance;
mod student;

pub use area::{AreaKind, AreaPointer};
pub use course::{CourseInstance, CourseInstanceBuilder, CourseType};
pub use grades::{grade_point_average, str_to_grade_points, GradeCode};
pub use performance::Performance;
pub use student::Student;
