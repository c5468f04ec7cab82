use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::grading::Aggregation;
use crate::models::{GradeInput, LearnerSummary};

pub fn summaries_to_json(summaries: &[LearnerSummary]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summaries)
}

fn percent(fraction: f64) -> String {
    format!("{:.1}%", fraction * 100.0)
}

pub fn build_report(input: &GradeInput, aggregation: &Aggregation, now: DateTime<Utc>) -> String {
    let mut output = String::new();
    let course_label = input
        .course
        .name
        .clone()
        .unwrap_or_else(|| format!("course {}", input.course.id));
    let group = &input.assignment_group;
    let group_label = group
        .name
        .clone()
        .unwrap_or_else(|| format!("group {}", group.id));

    let _ = writeln!(output, "# Learner Grade Summary");
    let _ = writeln!(
        output,
        "Generated for {} / {} (graded as of {})",
        course_label,
        group_label,
        now.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Learner Averages");

    if aggregation.summaries.is_empty() {
        let _ = writeln!(output, "No graded submissions.");
    } else {
        for summary in &aggregation.summaries {
            match summary.avg {
                Some(avg) => {
                    let _ = writeln!(
                        output,
                        "- Learner {}: {} across {} assignments",
                        summary.id,
                        percent(avg),
                        summary.scores.len()
                    );
                }
                None => {
                    let _ = writeln!(output, "- Learner {}: no graded work", summary.id);
                }
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Assignment Breakdown");

    if aggregation.summaries.iter().all(|s| s.scores.is_empty()) {
        let _ = writeln!(output, "No assignment scores recorded.");
    } else {
        for summary in aggregation.summaries.iter().filter(|s| !s.scores.is_empty()) {
            let _ = writeln!(output, "- Learner {}", summary.id);
            for (assignment_id, score) in &summary.scores {
                let label = group
                    .assignment(*assignment_id)
                    .and_then(|a| a.name.as_deref())
                    .map(|name| format!("{} ({})", assignment_id, name))
                    .unwrap_or_else(|| assignment_id.to_string());
                let _ = writeln!(output, "  - {}: {}", label, percent(*score));
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Skipped Submissions");

    if aggregation.diagnostics.is_empty() {
        let _ = writeln!(output, "None.");
    } else {
        for diagnostic in &aggregation.diagnostics {
            let _ = writeln!(output, "- {}", diagnostic);
        }
    }

    output
}
