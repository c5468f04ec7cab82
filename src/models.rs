use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentGroup {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub course_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_weight: Option<f64>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl AssignmentGroup {
    pub fn assignment(&self, id: i64) -> Option<&Assignment> {
        self.assignments.iter().find(|assignment| assignment.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub due_at: String,
    /// `None` when the source value is missing or not a number.
    #[serde(default, deserialize_with = "lenient_number")]
    pub points_possible: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub learner_id: i64,
    pub assignment_id: i64,
    pub submission: SubmissionDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionDetail {
    pub submitted_at: String,
    /// `None` when the source value is missing or not a number.
    #[serde(default, deserialize_with = "lenient_number")]
    pub score: Option<f64>,
}

/// Everything one aggregation run needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeInput {
    pub course: Course,
    pub assignment_group: AssignmentGroup,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

/// Per-learner result. `scores` keeps assignment ids in the order they were
/// first recorded; `avg` is `None` when no points were possible.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerSummary {
    pub id: i64,
    pub avg: Option<f64>,
    pub scores: Vec<(i64, f64)>,
}

impl Serialize for LearnerSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.scores.len()))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("avg", &self.avg)?;
        for (assignment_id, score) in &self.scores {
            map.serialize_entry(&assignment_id.to_string(), score)?;
        }
        map.end()
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| value.as_f64()))
}
