use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{ClassSummary, EventRow, StudentRow};

fn format_lpa(value: Option<f64>) -> String {
    value
        .map(|lpa| format!("{lpa:.2} LPA"))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn build_report(
    generated_on: NaiveDate,
    summary: &ClassSummary,
    students: &[StudentRow],
    recent: &[EventRow],
    unmatched: &[EventRow],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Placement Report: {}", summary.class_id);
    let _ = writeln!(output, "Generated on {}", generated_on);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Summary");
    let _ = writeln!(output, "- Students: {}", summary.total_students);
    let _ = writeln!(output, "- Placed: {}", summary.placed_count);
    let _ = writeln!(output, "- Not placed: {}", summary.not_placed_count);
    let _ = writeln!(output, "- Internships: {}", summary.internship_count);
    let _ = writeln!(output, "- Trained: {}", summary.trained_count);
    let _ = writeln!(output, "- Best offer: {}", format_lpa(summary.max_lpa));
    let _ = writeln!(output, "- Average offer: {}", format_lpa(summary.avg_lpa_placed));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Outcome Mix");

    if summary.outcome_counts.is_empty() {
        let _ = writeln!(output, "No matched events recorded for this class.");
    } else {
        for (result, count) in summary.outcome_counts.iter() {
            let _ = writeln!(output, "- {}: {} events", result.as_str(), count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Placements by Company");

    if summary.company_breakdown.is_empty() {
        let _ = writeln!(output, "No placements recorded for this class.");
    } else {
        let mut companies: Vec<(&String, &usize)> = summary.company_breakdown.iter().collect();
        companies.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (company, count) in companies {
            let _ = writeln!(output, "- {}: {} students", company, count);
        }
    }

    let mut ranked: Vec<&StudentRow> = students
        .iter()
        .filter(|row| row.summary.max_lpa.is_some())
        .collect();
    ranked.sort_by(|a, b| {
        b.summary
            .max_lpa
            .partial_cmp(&a.summary.max_lpa)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Offers");

    if ranked.is_empty() {
        let _ = writeln!(output, "No offers with compensation recorded.");
    } else {
        for row in ranked.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}) {} across {} offers",
                row.student.name,
                row.student.student_id,
                format_lpa(row.summary.max_lpa),
                row.summary.offers
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Events");

    if recent.is_empty() {
        let _ = writeln!(output, "No matched events recorded for this class.");
    } else {
        for event in recent.iter().take(5) {
            let name = students
                .iter()
                .find(|row| event.student_id.as_deref() == Some(row.student.student_id.as_str()))
                .map(|row| row.student.name.as_str())
                .unwrap_or("unknown student");
            let _ = writeln!(
                output,
                "- {} {} at {}: {}{}",
                name,
                event.event_type.as_str(),
                event.company.as_deref().unwrap_or("unknown company"),
                event.result.as_str(),
                event
                    .event_date
                    .map(|date| format!(" on {date}"))
                    .unwrap_or_default()
            );
        }
    }

    let waiting = unmatched
        .iter()
        .filter(|event| event.reported.class_id.as_deref() == Some(summary.class_id.as_str()))
        .count();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Awaiting Review");
    let _ = writeln!(
        output,
        "{} unmatched events reported for this class ({} across all classes).",
        waiting,
        unmatched.len()
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventResult, EventType, Student, StudentSummary};
    use crate::summary::tests::event;
    use std::collections::BTreeMap;

    fn summary() -> ClassSummary {
        ClassSummary {
            class_id: "A".to_string(),
            total_students: 2,
            placed_count: 1,
            internship_count: 0,
            trained_count: 0,
            not_placed_count: 1,
            total_events: 1,
            outcome_counts: BTreeMap::from([(EventResult::Selected, 1)]),
            event_type_counts: BTreeMap::from([(EventType::Placement, 1)]),
            max_lpa: Some(6.0),
            avg_lpa_placed: Some(6.0),
            companies: vec!["Acme".to_string()],
            company_breakdown: BTreeMap::from([("Acme".to_string(), 1)]),
        }
    }

    fn student_row(id: &str, max_lpa: Option<f64>) -> StudentRow {
        StudentRow {
            student: Student {
                student_id: id.to_string(),
                name: format!("Student {id}"),
                email: None,
                phone: None,
                class_id: "A".to_string(),
                admission_year: None,
                degree: None,
            },
            summary: StudentSummary {
                max_lpa,
                offers: usize::from(max_lpa.is_some()),
                ..StudentSummary::default()
            },
        }
    }

    #[test]
    fn report_lists_sections() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let students = vec![student_row("STU1", Some(6.0)), student_row("STU2", None)];
        let mut waiting = event(0, None, EventType::Placement, EventResult::Applied, "Acme", None);
        waiting.reported.class_id = Some("A".to_string());

        let mut latest = event(3, Some("STU1"), EventType::Placement, EventResult::Selected, "Acme", Some(6.0));
        latest.event_date = NaiveDate::from_ymd_opt(2026, 2, 14);
        let earlier = event(1, Some("STU2"), EventType::Training, EventResult::Applied, "Bootcamp", None);

        let report = build_report(date, &summary(), &students, &[latest, earlier], &[waiting]);
        assert!(report.contains("# Placement Report: A"));
        assert!(report.contains("## Recent Events"));
        assert!(report.contains("- Student STU1 placement at Acme: selected on 2026-02-14"));
        assert!(report.contains("- Student STU2 training at Bootcamp: applied"));
        assert!(report.contains("- Placed: 1"));
        assert!(report.contains("- Acme: 1 students"));
        assert!(report.contains("Student STU1 (STU1) 6.00 LPA"));
        assert!(!report.contains("Student STU2"));
        assert!(report.contains("1 unmatched events reported for this class"));
    }

    #[test]
    fn empty_class_reports_placeholders() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let empty = ClassSummary {
            outcome_counts: BTreeMap::new(),
            company_breakdown: BTreeMap::new(),
            max_lpa: None,
            avg_lpa_placed: None,
            ..summary()
        };
        let report = build_report(date, &empty, &[], &[], &[]);
        assert!(report.contains("No matched events recorded"));
        assert!(report.contains("No placements recorded"));
        assert!(report.contains("Average offer: n/a"));
    }
}
