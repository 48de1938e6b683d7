//! Grade codes and grade-point arithmetic.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::CourseInstance;

/// A letter grade or registrar transcript code.
///
/// Ordered from best to worst; codes past `F` carry no grade points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GradeCode {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D+")]
    DPlus,
    D,
    #[serde(rename = "D-")]
    DMinus,
    F,
    /// Pass (ungraded).
    P,
    /// Satisfactory.
    S,
    /// Unsatisfactory.
    U,
    /// Incomplete.
    I,
    /// In progress.
    #[serde(rename = "IP")]
    Ip,
    /// Withdrawn.
    W,
    /// Audit.
    #[serde(rename = "AU")]
    Au,
    /// No grade reported.
    #[serde(rename = "NG")]
    Ng,
    /// Registered for a future term.
    #[serde(rename = "REG")]
    Registered,
}

impl GradeCode {
    /// Grade points carried by this code, or zero for non-letter codes.
    pub fn points(self) -> Decimal {
        use GradeCode::*;
        match self {
            APlus | A => Decimal::new(400, 2),
            AMinus => Decimal::new(370, 2),
            BPlus => Decimal::new(330, 2),
            B => Decimal::new(300, 2),
            BMinus => Decimal::new(270, 2),
            CPlus => Decimal::new(230, 2),
            C => Decimal::new(200, 2),
            CMinus => Decimal::new(170, 2),
            DPlus => Decimal::new(130, 2),
            D => Decimal::new(100, 2),
            DMinus => Decimal::new(70, 2),
            _ => Decimal::new(0, 2),
        }
    }
}

/// Looks up grade points for a grade-code string; unknown codes carry none.
pub fn str_to_grade_points(s: &str) -> Decimal {
    serde_json::from_value::<GradeCode>(serde_json::Value::String(s.to_string()))
        .map(GradeCode::points)
        .unwrap_or_else(|_| Decimal::new(0, 2))
}

/// Computes a grade-point average over the gpa-eligible subset of
/// `courses`. The result is truncated, not rounded, to two places.
pub fn grade_point_average<'a>(courses: impl IntoIterator<Item = &'a CourseInstance>) -> Decimal {
    let mut gp_sum = Decimal::ZERO;
    let mut credit_sum = Decimal::ZERO;

    for c in courses.into_iter().filter(|c| c.is_in_gpa) {
        gp_sum += c.gpa_points;
        credit_sum += c.credits;
    }

    if credit_sum.is_zero() {
        return Decimal::new(0, 2);
    }

    (gp_sum / credit_sum).trunc_with_scale(2)
}
