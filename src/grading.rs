use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{AssignmentGroup, Course, LearnerSummary, Submission};

/// Share of `points_possible` deducted from a late submission.
pub const LATE_PENALTY_RATE: f64 = 0.1;

#[derive(Debug, Error, PartialEq)]
pub enum GradeError {
    #[error("assignment group course_id {group_course_id} does not match course id {course_id}")]
    CourseMismatch { course_id: i64, group_course_id: i64 },
}

/// A submission that was skipped. Never fatal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Diagnostic {
    #[error("assignment {assignment_id} not found (learner {learner_id})")]
    AssignmentNotFound { learner_id: i64, assignment_id: i64 },
    #[error("invalid points_possible for assignment {assignment_id}")]
    InvalidPointsPossible { assignment_id: i64 },
    #[error("invalid due_at '{due_at}' for assignment {assignment_id}")]
    InvalidDueDate { assignment_id: i64, due_at: String },
    #[error("invalid score for submission by learner {learner_id} for assignment {assignment_id}")]
    InvalidScore { learner_id: i64, assignment_id: i64 },
    #[error("invalid submitted_at '{submitted_at}' for submission by learner {learner_id} for assignment {assignment_id}")]
    InvalidSubmittedAt {
        learner_id: i64,
        assignment_id: i64,
        submitted_at: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub summaries: Vec<LearnerSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug)]
struct LearnerTotals {
    id: i64,
    scores: Vec<(i64, f64)>,
    total_score: f64,
    total_possible: f64,
}

impl LearnerTotals {
    fn new(id: i64) -> Self {
        Self {
            id,
            scores: Vec::new(),
            total_score: 0.0,
            total_possible: 0.0,
        }
    }

    fn record(&mut self, assignment_id: i64, score: f64, points_possible: f64) {
        let fraction = score / points_possible;
        match self.scores.iter_mut().find(|(id, _)| *id == assignment_id) {
            Some(entry) => entry.1 = fraction,
            None => self.scores.push((assignment_id, fraction)),
        }
        self.total_score += score;
        self.total_possible += points_possible;
    }

    fn finish(self) -> LearnerSummary {
        let avg = if self.total_possible > 0.0 {
            Some(self.total_score / self.total_possible)
        } else {
            None
        };
        LearnerSummary {
            id: self.id,
            avg,
            scores: self.scores,
        }
    }
}

/// Learner accumulators kept in first-seen order.
#[derive(Default)]
struct Ledger {
    index: HashMap<i64, usize>,
    learners: Vec<LearnerTotals>,
}

impl Ledger {
    fn entry(&mut self, learner_id: i64) -> &mut LearnerTotals {
        let slot = match self.index.get(&learner_id) {
            Some(slot) => *slot,
            None => {
                self.learners.push(LearnerTotals::new(learner_id));
                let slot = self.learners.len() - 1;
                self.index.insert(learner_id, slot);
                slot
            }
        };
        &mut self.learners[slot]
    }

    fn into_summaries(self) -> Vec<LearnerSummary> {
        self.learners.into_iter().map(LearnerTotals::finish).collect()
    }
}

pub fn aggregate(
    course: &Course,
    group: &AssignmentGroup,
    submissions: &[Submission],
    now: DateTime<Utc>,
) -> Result<Aggregation, GradeError> {
    if course.id != group.course_id {
        return Err(GradeError::CourseMismatch {
            course_id: course.id,
            group_course_id: group.course_id,
        });
    }

    let mut ledger = Ledger::default();
    let mut diagnostics = Vec::new();

    for submission in submissions {
        if let Err(diagnostic) = apply_submission(&mut ledger, group, submission, now) {
            warn!(learner_id = submission.learner_id, "{diagnostic}");
            diagnostics.push(diagnostic);
        }
    }

    let summaries = ledger.into_summaries();
    debug!(
        learners = summaries.len(),
        skipped = diagnostics.len(),
        "aggregation finished"
    );

    Ok(Aggregation {
        summaries,
        diagnostics,
    })
}

fn apply_submission(
    ledger: &mut Ledger,
    group: &AssignmentGroup,
    submission: &Submission,
    now: DateTime<Utc>,
) -> Result<(), Diagnostic> {
    let learner_id = submission.learner_id;
    let assignment_id = submission.assignment_id;

    let assignment = group
        .assignment(assignment_id)
        .ok_or(Diagnostic::AssignmentNotFound {
            learner_id,
            assignment_id,
        })?;

    let points_possible = assignment
        .points_possible
        .filter(|points| points.is_finite() && *points > 0.0)
        .ok_or(Diagnostic::InvalidPointsPossible { assignment_id })?;

    let due = parse_timestamp(&assignment.due_at).ok_or_else(|| Diagnostic::InvalidDueDate {
        assignment_id,
        due_at: assignment.due_at.clone(),
    })?;
    if due > now {
        debug!(assignment_id, %due, "assignment not yet due");
        return Ok(());
    }

    let learner = ledger.entry(learner_id);

    let raw = submission
        .submission
        .score
        .filter(|score| score.is_finite() && *score >= 0.0)
        .ok_or(Diagnostic::InvalidScore {
            learner_id,
            assignment_id,
        })?;

    let submitted_at = &submission.submission.submitted_at;
    let submitted = parse_timestamp(submitted_at).ok_or_else(|| Diagnostic::InvalidSubmittedAt {
        learner_id,
        assignment_id,
        submitted_at: submitted_at.clone(),
    })?;

    let late = submitted > due;
    let score = effective_score(raw, points_possible, late);
    learner.record(assignment_id, score, points_possible);
    Ok(())
}

pub fn late_penalty(points_possible: f64) -> f64 {
    points_possible * LATE_PENALTY_RATE
}

/// Score that counts towards the learner's totals, never below zero.
pub fn effective_score(raw: f64, points_possible: f64, late: bool) -> f64 {
    let score = if late {
        raw - late_penalty(points_possible)
    } else {
        raw
    };
    score.max(0.0)
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` and `YYYY-MM-DD`. Naive values are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::sample_input;
    use crate::models::{Assignment, SubmissionDetail};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn assignment(id: i64, due_at: &str, points_possible: Option<f64>) -> Assignment {
        Assignment {
            id,
            name: None,
            due_at: due_at.to_string(),
            points_possible,
        }
    }

    fn submission(
        learner_id: i64,
        assignment_id: i64,
        submitted_at: &str,
        score: Option<f64>,
    ) -> Submission {
        Submission {
            learner_id,
            assignment_id,
            submission: SubmissionDetail {
                submitted_at: submitted_at.to_string(),
                score,
            },
        }
    }

    fn course_and_group(assignments: Vec<Assignment>) -> (Course, AssignmentGroup) {
        let course = Course { id: 9, name: None };
        let group = AssignmentGroup {
            id: 1,
            name: None,
            course_id: 9,
            group_weight: None,
            assignments,
        };
        (course, group)
    }

    fn score_for(summary: &LearnerSummary, assignment_id: i64) -> Option<f64> {
        summary
            .scores
            .iter()
            .find(|(id, _)| *id == assignment_id)
            .map(|(_, score)| *score)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sample_fixture_matches_expected_summaries() {
        let input = sample_input();
        let result = aggregate(
            &input.course,
            &input.assignment_group,
            &input.submissions,
            now(),
        )
        .unwrap();

        assert!(result.diagnostics.is_empty());
        assert_eq!(result.summaries.len(), 2);

        let first = &result.summaries[0];
        assert_eq!(first.id, 125);
        assert!(close(first.avg.unwrap(), 0.985));
        assert!(close(score_for(&first, 1).unwrap(), 0.94));
        assert!(close(score_for(&first, 2).unwrap(), 1.0));
        assert_eq!(score_for(&first, 3), None);

        let second = &result.summaries[1];
        assert_eq!(second.id, 132);
        assert!(close(second.avg.unwrap(), 0.82));
        assert!(close(score_for(&second, 1).unwrap(), 0.78));
        assert!(close(score_for(&second, 2).unwrap(), 125.0 / 150.0));
    }

    #[test]
    fn course_mismatch_fails_without_output() {
        let input = sample_input();
        let course = Course { id: 452, name: None };
        let err = aggregate(&course, &input.assignment_group, &input.submissions, now())
            .unwrap_err();
        assert_eq!(
            err,
            GradeError::CourseMismatch {
                course_id: 452,
                group_course_id: 451
            }
        );
    }

    #[test]
    fn future_assignments_never_contribute() {
        let (course, group) = course_and_group(vec![
            assignment(1, "2024-01-01", Some(10.0)),
            assignment(2, "2024-06-02", Some(100.0)),
        ]);
        let submissions = vec![
            submission(5, 2, "2024-05-01", Some(100.0)),
            submission(5, 1, "2024-01-01", Some(5.0)),
            submission(6, 2, "2024-05-01", Some(90.0)),
        ];

        let result = aggregate(&course, &group, &submissions, now()).unwrap();
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.summaries[0].scores, vec![(1, 0.5)]);
        assert!(close(result.summaries[0].avg.unwrap(), 0.5));
    }

    #[test]
    fn late_submissions_lose_ten_percent_and_clamp_at_zero() {
        let (course, group) = course_and_group(vec![
            assignment(1, "2024-01-01", Some(100.0)),
            assignment(2, "2024-01-01", Some(100.0)),
        ]);
        let submissions = vec![
            submission(5, 1, "2024-01-02", Some(80.0)),
            submission(5, 2, "2024-01-01T00:00:01Z", Some(4.0)),
        ];

        let result = aggregate(&course, &group, &submissions, now()).unwrap();
        let summary = &result.summaries[0];
        assert!(close(score_for(&summary, 1).unwrap(), 0.7));
        assert!(close(score_for(&summary, 2).unwrap(), 0.0));
        assert!(close(summary.avg.unwrap(), 70.0 / 200.0));
    }

    #[test]
    fn submission_on_due_date_is_on_time() {
        let (course, group) = course_and_group(vec![assignment(1, "2024-01-01", Some(50.0))]);
        let submissions = vec![submission(5, 1, "2024-01-01", Some(50.0))];

        let result = aggregate(&course, &group, &submissions, now()).unwrap();
        assert!(close(score_for(&result.summaries[0], 1).unwrap(), 1.0));
    }

    #[test]
    fn fraction_may_exceed_one() {
        let (course, group) = course_and_group(vec![assignment(1, "2024-01-01", Some(50.0))]);
        let submissions = vec![submission(5, 1, "2023-12-30", Some(60.0))];

        let result = aggregate(&course, &group, &submissions, now()).unwrap();
        assert!(close(score_for(&result.summaries[0], 1).unwrap(), 1.2));
        assert!(close(result.summaries[0].avg.unwrap(), 1.2));
    }

    #[test]
    fn malformed_submissions_are_skipped_and_reported() {
        let (course, group) = course_and_group(vec![
            assignment(1, "2024-01-01", Some(10.0)),
            assignment(2, "2024-01-01", Some(0.0)),
            assignment(3, "not a date", Some(10.0)),
        ]);
        let submissions = vec![
            submission(5, 99, "2024-01-01", Some(1.0)),
            submission(5, 2, "2024-01-01", Some(1.0)),
            submission(5, 3, "2024-01-01", Some(1.0)),
            submission(6, 1, "2024-01-01", Some(-1.0)),
            submission(6, 1, "2024-01-01", None),
            submission(7, 1, "yesterday", Some(3.0)),
            submission(5, 1, "2024-01-01", Some(8.0)),
        ];

        let result = aggregate(&course, &group, &submissions, now()).unwrap();
        assert_eq!(
            result.diagnostics,
            vec![
                Diagnostic::AssignmentNotFound {
                    learner_id: 5,
                    assignment_id: 99
                },
                Diagnostic::InvalidPointsPossible { assignment_id: 2 },
                Diagnostic::InvalidDueDate {
                    assignment_id: 3,
                    due_at: "not a date".to_string()
                },
                Diagnostic::InvalidScore {
                    learner_id: 6,
                    assignment_id: 1
                },
                Diagnostic::InvalidScore {
                    learner_id: 6,
                    assignment_id: 1
                },
                Diagnostic::InvalidSubmittedAt {
                    learner_id: 7,
                    assignment_id: 1,
                    submitted_at: "yesterday".to_string()
                },
            ]
        );

        let ids: Vec<i64> = result.summaries.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![6, 7, 5]);
        assert_eq!(result.summaries[2].scores, vec![(1, 0.8)]);
    }

    #[test]
    fn learner_without_graded_work_has_no_average() {
        let (course, group) = course_and_group(vec![assignment(1, "2024-01-01", Some(10.0))]);
        let submissions = vec![submission(6, 1, "2024-01-01", Some(f64::NAN))];

        let result = aggregate(&course, &group, &submissions, now()).unwrap();
        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.summaries[0].avg, None);
        assert!(result.summaries[0].scores.is_empty());
    }

    #[test]
    fn learners_keep_first_seen_order() {
        let (course, group) = course_and_group(vec![assignment(1, "2024-01-01", Some(10.0))]);
        let submissions = vec![
            submission(300, 1, "2024-01-01", Some(1.0)),
            submission(2, 1, "2024-01-01", Some(2.0)),
            submission(150, 1, "2024-01-01", Some(3.0)),
        ];

        let result = aggregate(&course, &group, &submissions, now()).unwrap();
        let ids: Vec<i64> = result.summaries.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![300, 2, 150]);
    }

    #[test]
    fn repeat_submission_replaces_fraction_but_counts_twice() {
        let (course, group) = course_and_group(vec![
            assignment(1, "2024-01-01", Some(10.0)),
            assignment(2, "2024-01-01", Some(10.0)),
        ]);
        let submissions = vec![
            submission(5, 1, "2024-01-01", Some(4.0)),
            submission(5, 2, "2024-01-01", Some(10.0)),
            submission(5, 1, "2024-01-01", Some(6.0)),
        ];

        let result = aggregate(&course, &group, &submissions, now()).unwrap();
        let summary = &result.summaries[0];
        assert_eq!(summary.scores, vec![(1, 0.6), (2, 1.0)]);
        assert!(close(summary.avg.unwrap(), 20.0 / 30.0));
    }

    #[test]
    fn effective_score_applies_penalty_only_when_late() {
        assert_eq!(effective_score(140.0, 150.0, true), 125.0);
        assert_eq!(effective_score(140.0, 150.0, false), 140.0);
        assert_eq!(effective_score(3.0, 50.0, true), 0.0);
        assert_eq!(late_penalty(50.0), 5.0);
    }

    #[test]
    fn parses_supported_timestamp_formats() {
        let midnight = Utc.with_ymd_and_hms(2023, 1, 25, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2023-01-25"), Some(midnight));
        assert_eq!(parse_timestamp("2023-01-25T00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2023-01-25T02:00:00+02:00"), Some(midnight));
        assert_eq!(parse_timestamp(" 2023-01-25 "), Some(midnight));
        assert_eq!(parse_timestamp("25/01/2023"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
