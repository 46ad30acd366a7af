//! Class and student rollups.
//!
//! Everything here is a pure function of a roster snapshot and the event rows
//! handed in. Only matched rows whose student is still on the roster count;
//! a row bound to a student dropped by a later roster upload is ignored.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::models::{
    ClassSummary, EventResult, EventRow, EventType, StudentSummary,
};
use crate::roster::{normalize_identifier, Roster};

/// Matched rows that still resolve to a student on `roster`.
pub fn attributable<'a>(
    roster: &'a Roster,
    events: &'a [EventRow],
) -> impl Iterator<Item = &'a EventRow> + 'a {
    events.iter().filter(move |event| {
        event.is_matched()
            && event
                .student_id
                .as_deref()
                .is_some_and(|id| roster.contains(id))
    })
}

/// Attributable rows whose student currently belongs to `class_id`.
pub fn class_events<'a>(
    class_id: &'a str,
    roster: &'a Roster,
    events: &'a [EventRow],
) -> impl Iterator<Item = &'a EventRow> + 'a {
    attributable(roster, events).filter(move |event| {
        event
            .student_id
            .as_deref()
            .and_then(|id| roster.class_of(id))
            == Some(class_id)
    })
}

pub fn class_summary(class_id: &str, roster: &Roster, events: &[EventRow]) -> ClassSummary {
    let total_students = roster.class_members(class_id).len();
    let scoped: Vec<&EventRow> = class_events(class_id, roster, events).collect();

    let mut placed = HashSet::new();
    let mut interned = HashSet::new();
    let mut trained = HashSet::new();
    let mut placed_by_company: BTreeMap<String, HashSet<String>> = BTreeMap::new();
    let mut event_type_counts = BTreeMap::new();

    for event in &scoped {
        let student = event
            .student_id
            .as_deref()
            .map(normalize_identifier)
            .unwrap_or_default();
        *event_type_counts.entry(event.event_type).or_insert(0) += 1;

        let selected = event.result == EventResult::Selected;
        match event.event_type {
            EventType::Placement if selected => {
                placed.insert(student.clone());
                if let Some(company) = &event.company {
                    placed_by_company
                        .entry(company.clone())
                        .or_default()
                        .insert(student);
                }
            }
            EventType::Internship if selected => {
                interned.insert(student);
            }
            EventType::Training => {
                trained.insert(student);
            }
            _ => {}
        }
    }

    let (max_lpa, avg_lpa_placed) = compensation_stats(scoped.iter().copied());

    ClassSummary {
        class_id: class_id.to_string(),
        total_students,
        placed_count: placed.len(),
        internship_count: interned.len(),
        trained_count: trained.len(),
        not_placed_count: total_students.saturating_sub(placed.len()),
        total_events: scoped.len(),
        outcome_counts: outcome_counts(scoped.iter().copied()),
        event_type_counts,
        max_lpa,
        avg_lpa_placed,
        companies: companies(scoped.iter().copied()),
        company_breakdown: placed_by_company
            .into_iter()
            .map(|(company, students)| (company, students.len()))
            .collect(),
    }
}

pub fn student_summary(student_id: &str, roster: &Roster, events: &[EventRow]) -> StudentSummary {
    let key = normalize_identifier(student_id);
    let own: Vec<&EventRow> = attributable(roster, events)
        .filter(|event| {
            event
                .student_id
                .as_deref()
                .is_some_and(|id| normalize_identifier(id) == key)
        })
        .collect();

    let count_type = |kind: EventType| own.iter().filter(|e| e.event_type == kind).count();
    let (max_lpa, avg_lpa_placed) = compensation_stats(own.iter().copied());
    let last = own.iter().max_by_key(|event| event.seq);

    StudentSummary {
        total_events: own.len(),
        placements: count_type(EventType::Placement),
        internships: count_type(EventType::Internship),
        trainings: count_type(EventType::Training),
        offers: own.iter().filter(|e| e.result.is_positive()).count(),
        placed: own
            .iter()
            .any(|e| e.event_type == EventType::Placement && e.result == EventResult::Selected),
        outcome_counts: outcome_counts(own.iter().copied()),
        max_lpa,
        avg_lpa_placed,
        companies: companies(own.iter().copied()),
        last_company: last.and_then(|event| event.company.clone()),
        last_result: last.map(|event| event.result),
    }
}

/// Best figure over any positive outcome, and the mean over selected
/// placements only. Rows without a figure are left out of both.
fn compensation_stats<'a>(events: impl Iterator<Item = &'a EventRow>) -> (Option<f64>, Option<f64>) {
    let mut max: Option<f64> = None;
    let mut placed = Vec::new();
    for event in events.filter(|event| event.result.is_positive()) {
        let Some(lpa) = event.compensation else { continue };
        max = Some(max.map_or(lpa, |best| best.max(lpa)));
        if event.event_type == EventType::Placement {
            placed.push(lpa);
        }
    }
    let mean = (!placed.is_empty()).then(|| placed.iter().sum::<f64>() / placed.len() as f64);
    (max, mean)
}

fn outcome_counts<'a>(events: impl Iterator<Item = &'a EventRow>) -> BTreeMap<EventResult, usize> {
    let mut counts = BTreeMap::new();
    for event in events {
        *counts.entry(event.result).or_insert(0) += 1;
    }
    counts
}

fn companies<'a>(events: impl Iterator<Item = &'a EventRow>) -> Vec<String> {
    events
        .filter_map(|event| event.company.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
