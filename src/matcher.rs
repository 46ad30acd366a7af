//! Identity resolution of one uploaded row against the roster.
//!
//! Keys are tried from most to least reliable: identifier, email, phone, name.
//! A key that finds nobody gives no evidence and the next key is tried. The
//! first key that finds anybody decides: exactly one student is a match,
//! several students leave the row unmatched for manual review.

use crate::models::{MatchDecision, MatchMethod, ReportedIdentity, Student};
use crate::roster::Roster;

type Lookup = for<'a> fn(&'a Roster, &str) -> Vec<&'a Student>;

pub fn match_row(roster: &Roster, row: &ReportedIdentity) -> MatchDecision {
    if let Some(student) = row
        .student_id
        .as_deref()
        .and_then(|id| roster.lookup_by_identifier(id))
    {
        return MatchDecision::matched(&student.student_id, MatchMethod::Identifier);
    }

    let keyed: [(Option<&str>, Lookup, MatchMethod); 3] = [
        (row.email.as_deref(), Roster::lookup_by_email, MatchMethod::Email),
        (row.phone.as_deref(), Roster::lookup_by_phone, MatchMethod::Phone),
        (row.name.as_deref(), Roster::lookup_by_name, MatchMethod::Name),
    ];

    for (value, lookup, method) in keyed {
        let Some(value) = value else { continue };
        match lookup(roster, value).as_slice() {
            [] => continue,
            [only] => return MatchDecision::matched(&only.student_id, method),
            _ => return MatchDecision::unmatched(),
        }
    }

    MatchDecision::unmatched()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchStatus;
    use crate::roster::tests::{student, student_with};

    fn roster() -> Roster {
        Roster::build(
            vec![
                student_with("STU1", "Ann", "A", Some("ann@example.com"), Some("9000000001")),
                student_with("STU2", "Bo Chen", "A", Some("x@y.com"), Some("9000000002")),
                student_with("STU3", "Cy", "B", Some("shared@example.com"), Some("9000000003")),
                student_with("STU4", "Cy", "B", Some("shared@example.com"), Some("9000000003")),
                student("STU5", "Dee", "B"),
            ],
            1,
        )
        .unwrap()
    }

    fn identity() -> ReportedIdentity {
        ReportedIdentity::default()
    }

    #[test]
    fn identifier_wins_over_conflicting_email() {
        let row = ReportedIdentity {
            student_id: Some("STU1".into()),
            email: Some("x@y.com".into()),
            ..identity()
        };
        let decision = match_row(&roster(), &row);
        assert_eq!(decision.student_id.as_deref(), Some("STU1"));
        assert_eq!(decision.method, Some(MatchMethod::Identifier));
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn unique_email_matches_at_point_nine() {
        let row = ReportedIdentity {
            email: Some("X@Y.com".into()),
            ..identity()
        };
        let decision = match_row(&roster(), &row);
        assert_eq!(decision.status, MatchStatus::Matched);
        assert_eq!(decision.student_id.as_deref(), Some("STU2"));
        assert_eq!(decision.confidence, 0.9);
    }

    #[test]
    fn unknown_identifier_falls_through_to_email() {
        let row = ReportedIdentity {
            student_id: Some("GHOST".into()),
            email: Some("ann@example.com".into()),
            ..identity()
        };
        let decision = match_row(&roster(), &row);
        assert_eq!(decision.student_id.as_deref(), Some("STU1"));
        assert_eq!(decision.method, Some(MatchMethod::Email));
    }

    #[test]
    fn ambiguous_email_is_unmatched() {
        let row = ReportedIdentity {
            email: Some("shared@example.com".into()),
            ..identity()
        };
        let decision = match_row(&roster(), &row);
        assert_eq!(decision, MatchDecision::unmatched());
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn phone_is_compared_by_digits() {
        let row = ReportedIdentity {
            phone: Some("900-000-0002".into()),
            ..identity()
        };
        let decision = match_row(&roster(), &row);
        assert_eq!(decision.student_id.as_deref(), Some("STU2"));
        assert_eq!(decision.confidence, 0.85);
    }

    #[test]
    fn ambiguous_email_is_not_overridden_by_unique_name() {
        let row = ReportedIdentity {
            email: Some("shared@example.com".into()),
            name: Some("dee".into()),
            ..identity()
        };
        let decision = match_row(&roster(), &row);
        assert_eq!(decision, MatchDecision::unmatched());
    }

    #[test]
    fn ambiguous_phone_is_not_overridden_by_unique_name() {
        let row = ReportedIdentity {
            phone: Some("9000000003".into()),
            name: Some("Dee".into()),
            ..identity()
        };
        assert_eq!(match_row(&roster(), &row).status, MatchStatus::Unmatched);
    }

    #[test]
    fn unknown_email_falls_through_to_unique_name() {
        let row = ReportedIdentity {
            email: Some("nobody@example.com".into()),
            name: Some("  DEE ".into()),
            ..identity()
        };
        let decision = match_row(&roster(), &row);
        assert_eq!(decision.student_id.as_deref(), Some("STU5"));
        assert_eq!(decision.method, Some(MatchMethod::Name));
        assert_eq!(decision.confidence, 0.6);
    }

    #[test]
    fn duplicate_names_are_not_guessed() {
        let row = ReportedIdentity {
            name: Some("CY".into()),
            ..identity()
        };
        assert_eq!(match_row(&roster(), &row).status, MatchStatus::Unmatched);
    }

    #[test]
    fn row_without_keys_is_unmatched() {
        let decision = match_row(&roster(), &identity());
        assert_eq!(decision.student_id, None);
        assert_eq!(decision.status, MatchStatus::Unmatched);
    }
}
