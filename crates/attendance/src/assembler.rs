//! Joins a course roster with flat attendance rows and derives statistics.
//!
//! The join key is the normalized student name. Ledger rows for students
//! not on the roster are discarded; roster students with no rows default to
//! all-absent. Everything here is a pure function of (Course, records).

use std::collections::{HashMap, HashSet};

use common::{
    normalize_name, AttendanceLedger, AttendanceLevel, AttendanceRecord, AttendanceSummary, Course,
};

/// Build the student → date → present map for one course.
///
/// Later records overwrite earlier ones, so callers can overlay sources in
/// increasing precedence order. Dates outside the course's schedule are
/// dropped to keep the ledger aligned with `class_dates`.
pub fn build_ledger(course: &Course, records: &[AttendanceRecord]) -> AttendanceLedger {
    let roster: HashMap<String, &str> = course
        .students
        .iter()
        .map(|s| (normalize_name(s), s.as_str()))
        .collect();
    let dates: HashSet<&str> = course.class_dates.iter().map(|d| d.as_str()).collect();

    let mut ledger: AttendanceLedger = course
        .students
        .iter()
        .map(|s| (s.clone(), HashMap::new()))
        .collect();

    for rec in records {
        let Some(display) = roster.get(&normalize_name(&rec.student)) else {
            continue;
        };
        let date = rec.date.trim();
        if !dates.contains(date) {
            continue;
        }
        if let Some(marks) = ledger.get_mut(*display) {
            marks.insert(date.to_string(), rec.present);
        }
    }

    ledger
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Per-student totals, in roster order.
pub fn summarize(course: &Course, ledger: &AttendanceLedger) -> Vec<AttendanceSummary> {
    let total = course.class_dates.len() as u32;

    course
        .students
        .iter()
        .map(|student| {
            let present = ledger
                .get(student)
                .map(|marks| marks.values().filter(|p| **p).count() as u32)
                .unwrap_or(0);
            let percentage = if total == 0 {
                0.0
            } else {
                round1(f64::from(present) / f64::from(total) * 100.0)
            };
            AttendanceSummary {
                student: student.clone(),
                present_count: present,
                absent_count: total - present,
                total_sessions: total,
                percentage,
                level: AttendanceLevel::from_percentage(percentage),
            }
        })
        .collect()
}

/// Course-wide aggregates, computed in one pass over the summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseStats {
    pub student_count: usize,
    pub session_count: usize,
    pub average_percentage: f64,
    pub below_threshold: usize,
}

pub fn course_stats(summaries: &[AttendanceSummary], threshold: f64) -> CourseStats {
    let mut sum = 0.0;
    let mut below = 0usize;
    let mut sessions = 0usize;

    for s in summaries {
        sum += s.percentage;
        sessions = sessions.max(s.total_sessions as usize);
        if s.percentage < threshold {
            below += 1;
        }
    }

    CourseStats {
        student_count: summaries.len(),
        session_count: sessions,
        average_percentage: if summaries.is_empty() {
            0.0
        } else {
            round1(sum / summaries.len() as f64)
        },
        below_threshold: below,
    }
}

/// Students under `threshold`, worst first.
pub fn below_threshold(summaries: &[AttendanceSummary], threshold: f64) -> Vec<AttendanceSummary> {
    let mut out: Vec<AttendanceSummary> = summaries
        .iter()
        .filter(|s| s.percentage < threshold)
        .cloned()
        .collect();
    out.sort_by(|a, b| {
        a.percentage
            .partial_cmp(&b.percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

/// Top `n` students by percentage; ties keep roster order (stable sort).
pub fn top_n(summaries: &[AttendanceSummary], n: usize) -> Vec<AttendanceSummary> {
    let mut out = summaries.to_vec();
    out.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out.truncate(n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> Course {
        Course {
            name: "Algebra-4A".into(),
            teacher: "M. Carrasco".into(),
            site: "SAN PEDRO".into(),
            subject: "Matemáticas".into(),
            students: vec!["Ana Rojas".into(), "Benjamín Soto".into(), "Carla Muñoz".into()],
            class_dates: vec!["04/03".into(), "11/03".into(), "18/03".into(), "25/03".into()],
        }
    }

    fn rec(student: &str, date: &str, present: bool) -> AttendanceRecord {
        AttendanceRecord {
            course: "Algebra-4A".into(),
            student: student.into(),
            date: date.into(),
            present,
        }
    }

    #[test]
    fn test_present_plus_absent_equals_sessions() {
        let course = course();
        // Sparse ledger: Ana has two marks, Benjamín one, Carla none.
        let records = vec![
            rec("Ana Rojas", "04/03", true),
            rec("Ana Rojas", "11/03", false),
            rec("Benjamín Soto", "18/03", true),
        ];
        let ledger = build_ledger(&course, &records);

        for summary in summarize(&course, &ledger) {
            assert_eq!(
                summary.present_count + summary.absent_count,
                summary.total_sessions
            );
            assert_eq!(summary.total_sessions, 4);
        }
    }

    #[test]
    fn test_roster_students_default_all_absent() {
        let course = course();
        let ledger = build_ledger(&course, &[]);

        assert_eq!(ledger.len(), 3);
        let summaries = summarize(&course, &ledger);
        assert!(summaries.iter().all(|s| s.present_count == 0));
        assert!(summaries
            .iter()
            .all(|s| s.level == AttendanceLevel::Critical));
    }

    #[test]
    fn test_unmatched_rows_are_discarded() {
        let course = course();
        let records = vec![
            rec("Zacarías Pinto", "04/03", true), // not on the roster
            rec("ana rojas", "04/03", true),      // normalized match
            rec("Ana Rojas", "99/99", true),      // unknown date
        ];
        let ledger = build_ledger(&course, &records);

        assert!(!ledger.contains_key("Zacarías Pinto"));
        assert_eq!(ledger["Ana Rojas"].len(), 1);
        assert_eq!(ledger["Ana Rojas"]["04/03"], true);
    }

    #[test]
    fn test_later_records_overwrite() {
        let course = course();
        let records = vec![
            rec("Ana Rojas", "04/03", false),
            rec("Ana Rojas", "04/03", true),
        ];
        let ledger = build_ledger(&course, &records);
        assert_eq!(ledger["Ana Rojas"]["04/03"], true);
    }

    #[test]
    fn test_percentage_one_decimal() {
        let course = course();
        let records = vec![
            rec("Ana Rojas", "04/03", true),
            rec("Ana Rojas", "11/03", true),
            rec("Ana Rojas", "18/03", true),
        ];
        let ledger = build_ledger(&course, &records);
        let summaries = summarize(&course, &ledger);

        // 3 of 4 sessions.
        assert_eq!(summaries[0].percentage, 75.0);
        assert_eq!(summaries[0].level, AttendanceLevel::Adequate);
    }

    #[test]
    fn test_course_stats_and_below_threshold() {
        let course = course();
        let records = vec![
            rec("Ana Rojas", "04/03", true),
            rec("Ana Rojas", "11/03", true),
            rec("Ana Rojas", "18/03", true),
            rec("Ana Rojas", "25/03", true),
            rec("Benjamín Soto", "04/03", true),
        ];
        let ledger = build_ledger(&course, &records);
        let summaries = summarize(&course, &ledger);

        let stats = course_stats(&summaries, 70.0);
        assert_eq!(stats.student_count, 3);
        assert_eq!(stats.session_count, 4);
        // (100 + 25 + 0) / 3 = 41.7
        assert_eq!(stats.average_percentage, 41.7);
        assert_eq!(stats.below_threshold, 2);

        let low = below_threshold(&summaries, 70.0);
        assert_eq!(low.len(), 2);
        // Worst first.
        assert_eq!(low[0].student, "Carla Muñoz");
        assert_eq!(low[1].student, "Benjamín Soto");
    }

    #[test]
    fn test_top_n_ties_keep_roster_order() {
        let course = course();
        // Ana and Benjamín both 100%, Carla 0%.
        let mut records = Vec::new();
        for date in &course.class_dates {
            records.push(rec("Ana Rojas", date, true));
            records.push(rec("Benjamín Soto", date, true));
        }
        let ledger = build_ledger(&course, &records);
        let summaries = summarize(&course, &ledger);

        let top = top_n(&summaries, 2);
        assert_eq!(top[0].student, "Ana Rojas");
        assert_eq!(top[1].student, "Benjamín Soto");
    }
}
