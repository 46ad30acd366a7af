//! Authoritative student roster with exact-key indexes.
//!
//! A [`Roster`] is immutable once built. Replacing the roster means building a
//! new one and swapping the shared `Arc`, so readers always hold a complete
//! snapshot.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, TrackerError};
use crate::models::{ClassInfo, Student};

#[derive(Debug, Clone, Default)]
pub struct Roster {
    version: u64,
    students: Vec<Student>,
    by_identifier: HashMap<String, usize>,
    by_email: HashMap<String, Vec<usize>>,
    by_phone: HashMap<String, Vec<usize>>,
    by_name: HashMap<String, Vec<usize>>,
}

impl Roster {
    /// Validates and indexes a full roster upload.
    ///
    /// Every student needs an identifier, a name and a class. Identifiers are
    /// compared after normalization, so `stu1` and ` STU1 ` collide.
    pub fn build(students: Vec<Student>, version: u64) -> Result<Self> {
        if students.is_empty() {
            return Err(TrackerError::validation("roster upload contains no students"));
        }

        let mut roster = Roster {
            version,
            ..Roster::default()
        };

        for student in students {
            let student = tidy_student(student);
            if student.student_id.is_empty() {
                return Err(TrackerError::validation(
                    "every roster row needs a student_id",
                ));
            }
            if student.name.is_empty() {
                return Err(TrackerError::validation(format!(
                    "student {} is missing a name",
                    student.student_id
                )));
            }
            if student.class_id.is_empty() {
                return Err(TrackerError::validation(format!(
                    "student {} is missing a class",
                    student.student_id
                )));
            }

            let position = roster.students.len();
            let id_key = normalize_identifier(&student.student_id);
            if roster.by_identifier.insert(id_key, position).is_some() {
                return Err(TrackerError::validation(format!(
                    "student_id {} appears more than once",
                    student.student_id
                )));
            }
            if let Some(key) = student.email.as_deref().and_then(normalize_email) {
                roster.by_email.entry(key).or_default().push(position);
            }
            if let Some(key) = student.phone.as_deref().and_then(normalize_phone) {
                roster.by_phone.entry(key).or_default().push(position);
            }
            if let Some(key) = normalize_name(&student.name) {
                roster.by_name.entry(key).or_default().push(position);
            }
            roster.students.push(student);
        }

        Ok(roster)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn lookup_by_identifier(&self, identifier: &str) -> Option<&Student> {
        self.by_identifier
            .get(&normalize_identifier(identifier))
            .map(|&position| &self.students[position])
    }

    pub fn lookup_by_email(&self, email: &str) -> Vec<&Student> {
        self.candidates(&self.by_email, normalize_email(email))
    }

    pub fn lookup_by_phone(&self, phone: &str) -> Vec<&Student> {
        self.candidates(&self.by_phone, normalize_phone(phone))
    }

    pub fn lookup_by_name(&self, name: &str) -> Vec<&Student> {
        self.candidates(&self.by_name, normalize_name(name))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.lookup_by_identifier(identifier).is_some()
    }

    pub fn class_of(&self, identifier: &str) -> Option<&str> {
        self.lookup_by_identifier(identifier)
            .map(|student| student.class_id.as_str())
    }

    /// Students of one class in roster order.
    pub fn class_members(&self, class_id: &str) -> Vec<&Student> {
        self.students
            .iter()
            .filter(|student| student.class_id == class_id)
            .collect()
    }

    pub fn classes(&self) -> Vec<ClassInfo> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for student in &self.students {
            *counts.entry(student.class_id.as_str()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|(class_id, total_students)| ClassInfo {
                class_id: class_id.to_string(),
                total_students,
            })
            .collect()
    }

    fn candidates(&self, index: &HashMap<String, Vec<usize>>, key: Option<String>) -> Vec<&Student> {
        key.and_then(|key| index.get(&key))
            .map(|positions| positions.iter().map(|&p| &self.students[p]).collect())
            .unwrap_or_default()
    }
}

fn tidy_student(student: Student) -> Student {
    Student {
        student_id: student.student_id.trim().to_string(),
        name: student.name.trim().to_string(),
        email: non_blank(student.email),
        phone: non_blank(student.phone),
        class_id: student.class_id.trim().to_string(),
        admission_year: student.admission_year,
        degree: non_blank(student.degree),
    }
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    (!email.is_empty()).then_some(email)
}

pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Lower-cases, drops punctuation and collapses runs of whitespace.
pub fn normalize_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let name = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    (!name.is_empty()).then_some(name)
}
