/*!
Class records: attendance, homework, and exam results.

Dates are represented by the `time::Date` struct. These are plain record
types; the `Store` methods that persist them live in `store::records`.
*/
use serde::{Deserialize, Serialize};
use time::Date;

/// One student's presence (or absence) in one teacher's class on one day.
///
/// (student, teacher, day) is unique; recording the same triple again
/// overwrites the `present` flag rather than duplicating the row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attendance {
    pub student: String,
    pub teacher: String,
    pub day: Date,
    pub present: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Homework {
    /// Database id; 0 on a not-yet-inserted assignment.
    #[serde(default)]
    pub id: i64,
    pub teacher: String,
    /// Class label the assignment is addressed to, e.g. `"10A"`.
    pub class: String,
    pub title: String,
    pub due: Option<Date>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExamResult {
    /// Database id; 0 on a not-yet-inserted result.
    #[serde(default)]
    pub id: i64,
    pub student: String,
    pub teacher: String,
    /// Exam label, e.g. `"Algebra midterm"`.
    pub exam: String,
    pub score: f32,
    pub taken: Option<Date>,
}
