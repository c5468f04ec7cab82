use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::models::{Assignment, AssignmentGroup, Course, GradeInput, Submission, SubmissionDetail};

pub fn load_input(path: &Path) -> anyhow::Result<GradeInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    let input: GradeInput = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse input {}", path.display()))?;
    info!(
        path = %path.display(),
        assignments = input.assignment_group.assignments.len(),
        submissions = input.submissions.len(),
        "input loaded"
    );
    Ok(input)
}

pub fn load_submissions_csv(path: &Path) -> anyhow::Result<Vec<Submission>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let submissions = read_submissions_csv(file)
        .with_context(|| format!("failed to import submissions from {}", path.display()))?;
    info!(path = %path.display(), count = submissions.len(), "submissions imported");
    Ok(submissions)
}

/// Reads `learner_id,assignment_id,submitted_at,score` rows. A score that is
/// empty or not a number is kept as `None`.
pub fn read_submissions_csv<R: Read>(reader: R) -> anyhow::Result<Vec<Submission>> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        learner_id: i64,
        assignment_id: i64,
        submitted_at: String,
        #[serde(default)]
        score: String,
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut submissions = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid submission row {}", index + 1))?;
        submissions.push(Submission {
            learner_id: row.learner_id,
            assignment_id: row.assignment_id,
            submission: SubmissionDetail {
                submitted_at: row.submitted_at,
                score: row.score.parse::<f64>().ok(),
            },
        });
    }

    Ok(submissions)
}

pub fn sample_input() -> GradeInput {
    let assignment = |id, name: &str, due_at: &str, points_possible| Assignment {
        id,
        name: Some(name.to_string()),
        due_at: due_at.to_string(),
        points_possible: Some(points_possible),
    };
    let submission = |learner_id, assignment_id, submitted_at: &str, score| Submission {
        learner_id,
        assignment_id,
        submission: SubmissionDetail {
            submitted_at: submitted_at.to_string(),
            score: Some(score),
        },
    };

    GradeInput {
        course: Course {
            id: 451,
            name: Some("Introduction to JavaScript".to_string()),
        },
        assignment_group: AssignmentGroup {
            id: 12345,
            name: Some("Fundamentals of JavaScript".to_string()),
            course_id: 451,
            group_weight: Some(25.0),
            assignments: vec![
                assignment(1, "Declare a Variable", "2023-01-25", 50.0),
                assignment(2, "Write a Function", "2023-02-27", 150.0),
                assignment(3, "Code the World", "3156-11-15", 500.0),
            ],
        },
        submissions: vec![
            submission(125, 1, "2023-01-25", 47.0),
            submission(125, 2, "2023-02-12", 150.0),
            submission(125, 3, "2023-01-25", 400.0),
            submission(132, 1, "2023-01-24", 39.0),
            submission(132, 2, "2023-03-07", 140.0),
        ],
    }
}
