//! Landmark-based parser for course tab grids.
//!
//! A course tab carries metadata label rows (`PROFESOR`, `SEDE`,
//! `ASIGNATURA` with the value one column to the right), a dates section
//! headed by the `FECHAS` marker and a roster section headed by
//! `NOMBRES ESTUDIANTES`, all in column 0. Presence cells for a student row
//! sit in the columns aligned 1:1 with the date order, starting one column
//! right of the roster column. Markers are scanned, never assumed at fixed
//! offsets.

use std::collections::HashSet;

use tracing::debug;

use common::{normalize_name, AttendanceRecord, Course};

/// Section markers, metadata labels and the present-token set for one grid
/// dialect. Marker matching is trimmed and case-folded.
#[derive(Debug, Clone)]
pub struct GridLayout {
    pub dates_marker: String,
    pub roster_marker: String,
    pub teacher_label: String,
    pub site_label: String,
    pub subject_label: String,
    pub present_tokens: Vec<String>,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            dates_marker: "FECHAS".into(),
            roster_marker: "NOMBRES ESTUDIANTES".into(),
            teacher_label: "PROFESOR".into(),
            site_label: "SEDE".into(),
            subject_label: "ASIGNATURA".into(),
            present_tokens: vec![
                "1".into(),
                "1.0".into(),
                "true".into(),
                "presente".into(),
                "si".into(),
                "sí".into(),
            ],
        }
    }
}

impl GridLayout {
    fn is_marker(&self, cell: &str) -> bool {
        let c = cell.trim().to_uppercase();
        c == self.dates_marker.to_uppercase() || c == self.roster_marker.to_uppercase()
    }

    /// Whether a raw cell value counts as "present". Anything unrecognized
    /// or empty is absent, never an error.
    pub fn is_present_token(&self, raw: &str) -> bool {
        let t = raw.trim().to_lowercase();
        !t.is_empty() && self.present_tokens.iter().any(|p| *p == t)
    }
}

/// One parsed course tab: the course plus the presence cells flattened to
/// records.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTab {
    pub course: Course,
    pub records: Vec<AttendanceRecord>,
}

fn cell_at<'g>(grid: &'g [Vec<String>], row: usize, col: usize) -> &'g str {
    grid.get(row)
        .and_then(|r| r.get(col))
        .map(|s| s.as_str())
        .unwrap_or("")
}

fn plausible_date(cell: &str) -> bool {
    cell.chars().any(|c| c.is_ascii_digit())
}

fn plausible_student(cell: &str, layout: &GridLayout) -> bool {
    cell.trim().parse::<f64>().is_err() && !layout.is_marker(cell)
}

/// Row index of the first column-0 cell matching `marker`.
fn find_marker(grid: &[Vec<String>], marker: &str) -> Option<usize> {
    let wanted = marker.to_uppercase();
    (0..grid.len()).find(|&r| cell_at(grid, r, 0).trim().to_uppercase() == wanted)
}

/// Contiguous non-empty column-0 cells after `start`, stopping at a blank
/// row or the next marker; rows failing `keep` are skipped, not fatal.
fn collect_section(
    grid: &[Vec<String>],
    start: usize,
    layout: &GridLayout,
    keep: impl Fn(&str) -> bool,
) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    for row in start..grid.len() {
        let cell = cell_at(grid, row, 0).trim();
        if cell.is_empty() || layout.is_marker(cell) {
            break;
        }
        if keep(cell) {
            out.push((row, cell.to_string()));
        }
    }
    out
}

/// Value cell of the first row whose column-0 cell equals `label`.
fn metadata_value(grid: &[Vec<String>], label: &str) -> String {
    let wanted = label.to_uppercase();
    for row in 0..grid.len() {
        if cell_at(grid, row, 0).trim().to_uppercase() == wanted {
            return cell_at(grid, row, 1).trim().to_string();
        }
    }
    String::new()
}

/// Reconstruct a course from one raw tab grid.
///
/// Pure function of its inputs: identical grids always yield identical
/// results. Returns `None` when the tab yields zero students or zero dates
/// — a non-course tab, not a partial course.
pub fn parse_tab(name: &str, grid: &[Vec<String>], layout: &GridLayout) -> Option<ParsedTab> {
    let dates_row = find_marker(grid, &layout.dates_marker)?;
    let roster_row = find_marker(grid, &layout.roster_marker)?;

    let class_dates: Vec<String> = collect_section(grid, dates_row + 1, layout, plausible_date)
        .into_iter()
        .map(|(_, cell)| cell)
        .collect();

    let mut seen = HashSet::new();
    let student_rows: Vec<(usize, String)> =
        collect_section(grid, roster_row + 1, layout, |cell| {
            plausible_student(cell, layout)
        })
        .into_iter()
        .filter(|(_, cell)| seen.insert(normalize_name(cell)))
        .collect();

    if class_dates.is_empty() || student_rows.is_empty() {
        debug!(
            "Tab '{}' yields {} dates / {} students; not a course",
            name,
            class_dates.len(),
            student_rows.len()
        );
        return None;
    }

    let mut records = Vec::with_capacity(student_rows.len() * class_dates.len());
    for (row, student) in &student_rows {
        for (j, date) in class_dates.iter().enumerate() {
            let present = layout.is_present_token(cell_at(grid, *row, 1 + j));
            records.push(AttendanceRecord {
                course: name.to_string(),
                student: student.clone(),
                date: date.clone(),
                present,
            });
        }
    }

    let course = Course {
        name: name.to_string(),
        teacher: metadata_value(grid, &layout.teacher_label),
        site: metadata_value(grid, &layout.site_label),
        subject: metadata_value(grid, &layout.subject_label),
        students: student_rows.into_iter().map(|(_, s)| s).collect(),
        class_dates,
    };

    Some(ParsedTab { course, records })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    /// Seven dates, five students, presence cells aligned with the dates.
    fn course_grid() -> Vec<Vec<String>> {
        grid(&[
            &["PROFESOR", "M. Carrasco"],
            &["SEDE", "SAN PEDRO"],
            &["ASIGNATURA", "Matemáticas"],
            &[""],
            &["FECHAS"],
            &["04/03"],
            &["11/03"],
            &["18/03"],
            &["25/03"],
            &["01/04"],
            &["08/04"],
            &["15/04"],
            &[""],
            &["NOMBRES ESTUDIANTES"],
            &["Ana Rojas", "1", "1", "0", "1", "", "1", "1"],
            &["Benjamín Soto", "1", "0", "0", "1", "1", "1", ""],
            &["Carla Muñoz", "presente", "SI", "sí", "1.0", "1", "0", "1"],
            &["Diego Paredes", "", "", "", "", "", "", ""],
            &["Elisa Vidal", "1", "1", "1", "1", "1", "1", "1"],
        ])
    }

    #[test]
    fn test_scenario_full_course() {
        let parsed = parse_tab("Algebra-4A", &course_grid(), &GridLayout::default()).unwrap();

        assert_eq!(parsed.course.class_dates.len(), 7);
        assert_eq!(parsed.course.students.len(), 5);
        assert_eq!(parsed.course.teacher, "M. Carrasco");
        assert_eq!(parsed.course.site, "SAN PEDRO");
        assert_eq!(parsed.course.subject, "Matemáticas");
        assert_eq!(parsed.records.len(), 35);
    }

    #[test]
    fn test_presence_token_variants() {
        let parsed = parse_tab("Algebra-4A", &course_grid(), &GridLayout::default()).unwrap();

        let presences: Vec<bool> = parsed
            .records
            .iter()
            .filter(|r| r.student == "Carla Muñoz")
            .map(|r| r.present)
            .collect();
        // presente, SI, sí, 1.0, 1 all count; 0 does not.
        assert_eq!(presences, vec![true, true, true, true, true, false, true]);

        // Empty cells default to absent.
        assert!(parsed
            .records
            .iter()
            .filter(|r| r.student == "Diego Paredes")
            .all(|r| !r.present));
    }

    #[test]
    fn test_parse_is_deterministic() {
        let g = course_grid();
        let layout = GridLayout::default();
        assert_eq!(
            parse_tab("Algebra-4A", &g, &layout),
            parse_tab("Algebra-4A", &g, &layout)
        );
    }

    #[test]
    fn test_empty_dates_section_is_not_a_course() {
        let g = grid(&[
            &["FECHAS"],
            &[""],
            &["NOMBRES ESTUDIANTES"],
            &["Ana Rojas", "1"],
        ]);
        assert!(parse_tab("Taller", &g, &GridLayout::default()).is_none());
    }

    #[test]
    fn test_missing_markers_is_not_a_course() {
        let g = grid(&[&["RESUMEN ANUAL"], &["totales", "41"]]);
        assert!(parse_tab("RESUMEN", &g, &GridLayout::default()).is_none());
    }

    #[test]
    fn test_plausibility_filters() {
        let g = grid(&[
            &["FECHAS"],
            &["04/03"],
            &["pendiente"], // no digit: not a date
            &["11/03"],
            &[""],
            &["NOMBRES ESTUDIANTES"],
            &["Ana Rojas", "1", "1"],
            &["12345", "1", "1"], // purely numeric: not a name
            &["Ana Rojas", "0", "0"], // duplicate row ignored
            &["Benjamín Soto", "1", "0"],
        ]);
        let parsed = parse_tab("Algebra-4A", &g, &GridLayout::default()).unwrap();

        assert_eq!(parsed.course.class_dates, vec!["04/03", "11/03"]);
        assert_eq!(parsed.course.students, vec!["Ana Rojas", "Benjamín Soto"]);
    }

    #[test]
    fn test_sections_end_at_next_marker_without_blank() {
        let g = grid(&[
            &["FECHAS"],
            &["04/03"],
            &["11/03"],
            &["NOMBRES ESTUDIANTES"],
            &["Ana Rojas", "1", "0"],
        ]);
        let parsed = parse_tab("Algebra-4A", &g, &GridLayout::default()).unwrap();
        assert_eq!(parsed.course.class_dates, vec!["04/03", "11/03"]);
        assert_eq!(parsed.course.students, vec!["Ana Rojas"]);
    }

    #[test]
    fn test_alternate_layout_dialect() {
        let layout = GridLayout {
            dates_marker: "DATES".into(),
            roster_marker: "STUDENTS".into(),
            teacher_label: "TEACHER".into(),
            site_label: "CAMPUS".into(),
            subject_label: "SUBJECT".into(),
            ..GridLayout::default()
        };
        let g = grid(&[
            &["TEACHER", "J. Doe"],
            &["CAMPUS", "NORTH"],
            &["DATES"],
            &["2026-04-06"],
            &["STUDENTS"],
            &["Sam Field", "1"],
        ]);
        let parsed = parse_tab("Algebra", &g, &layout).unwrap();
        assert_eq!(parsed.course.teacher, "J. Doe");
        assert_eq!(parsed.course.site, "NORTH");
        assert_eq!(parsed.course.students, vec!["Sam Field"]);
    }
}
