//! Declared areas of study.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AreaKind {
    Degree,
    Major,
    Concentration,
    Emphasis,
}

/// A declared area of study: something the student has signed up to
/// complete, as opposed to the area specification being audited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AreaPointer {
    pub code: String,
    pub kind: AreaKind,
    pub name: String,
    pub degree: String,
}

impl AreaPointer {
    pub fn new(
        code: impl Into<String>,
        kind: AreaKind,
        name: impl Into<String>,
        degree: impl Into<String>,
    ) -> AreaPointer {
        AreaPointer {
            code: code.into(),
            kind,
            name: name.into(),
            degree: degree.into(),
        }
    }
}
