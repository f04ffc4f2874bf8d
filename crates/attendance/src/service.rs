//! Domain façade over the spreadsheet backend.
//!
//! Owns the transport, the cache, the retry policy and the grid layout as
//! explicit fields — constructed once at process start and passed by
//! reference to callers. Every read follows cache lookup → rate-limited,
//! retried remote fetch → parse → cache store; the only write appends rows
//! and invalidates the affected ledger entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use common::config::AppConfig;
use common::{
    normalize_name, AttendanceLedger, AttendanceRecord, Contact, ContactDirectory, Course,
    CourseAttendance, Error,
};
use sheets_client::{RetryPolicy, TabularSource, WorkbookHandle};

use crate::assembler::build_ledger;
use crate::cache::{fingerprint, CacheStats, CacheStore, CachedValue};
use crate::parser::{parse_tab, GridLayout, ParsedTab};

const COURSES_KEY: &str = "courses";
const CONTACTS_KEY: &str = "contacts";
const LEDGER_OP: &str = "ledger";

const LEDGER_HEADER: [&str; 6] = [
    "Curso",
    "Fecha",
    "Estudiante",
    "Asistencia",
    "Timestamp",
    "Registrado Por",
];

/// Connectivity and tab-presence probe result. Never touches the cache.
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub client: bool,
    pub courses_tab: bool,
    pub attendance_tab: bool,
    pub contacts_tab: bool,
    pub errors: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.client && self.courses_tab && self.contacts_tab && self.errors.is_empty()
    }
}

pub struct SheetsDataService {
    source: Arc<dyn TabularSource>,
    cache: CacheStore,
    retry: RetryPolicy,
    layout: GridLayout,
    cfg: AppConfig,
    courses_handle: OnceCell<WorkbookHandle>,
    attendance_handle: OnceCell<WorkbookHandle>,
}

impl SheetsDataService {
    pub fn new(source: Arc<dyn TabularSource>, cfg: AppConfig) -> Self {
        Self {
            source,
            cache: CacheStore::new(),
            retry: RetryPolicy::from_config(&cfg.retry),
            layout: GridLayout::default(),
            cfg,
            courses_handle: OnceCell::new(),
            attendance_handle: OnceCell::new(),
        }
    }

    fn course_ttl(&self) -> Duration {
        Duration::from_secs(self.cfg.cache.course_ttl_secs)
    }

    fn ledger_ttl(&self) -> Duration {
        Duration::from_secs(self.cfg.cache.ledger_ttl_secs)
    }

    fn contacts_ttl(&self) -> Duration {
        Duration::from_secs(self.cfg.cache.contacts_ttl_secs)
    }

    async fn courses_doc(&self) -> Result<&WorkbookHandle, Error> {
        self.courses_handle
            .get_or_try_init(|| {
                self.retry.run("open courses document", || {
                    self.source.open(&self.cfg.sheets.courses_spreadsheet_id)
                })
            })
            .await
    }

    async fn attendance_doc(&self) -> Result<&WorkbookHandle, Error> {
        self.attendance_handle
            .get_or_try_init(|| {
                self.retry.run("open attendance document", || {
                    self.source.open(&self.cfg.sheets.attendance_spreadsheet_id)
                })
            })
            .await
    }

    // ── Read operations ───────────────────────────────────────────────

    /// All courses, keyed by tab name. Cached.
    pub async fn get_courses(&self) -> Result<HashMap<String, Course>, Error> {
        let parsed = self.parsed_courses().await?;
        Ok(parsed
            .into_iter()
            .map(|(name, tab)| (name, tab.course))
            .collect())
    }

    /// Courses of one site (case-insensitive), each with its assembled
    /// ledger. Derived from the cached course set plus per-course ledger
    /// fetches — no cache entry of its own.
    pub async fn get_courses_for_site(
        &self,
        site: &str,
    ) -> Result<HashMap<String, CourseAttendance>, Error> {
        let wanted = site.trim().to_uppercase();
        let parsed = self.parsed_courses().await?;

        let mut out = HashMap::new();
        for (name, tab) in parsed {
            if tab.course.site.trim().to_uppercase() != wanted {
                continue;
            }
            let ledger = self.course_ledger(&tab).await?;
            out.insert(
                name,
                CourseAttendance {
                    course: tab.course,
                    ledger,
                },
            );
        }

        info!("Site '{}': {} courses", site, out.len());
        Ok(out)
    }

    /// Guardian contacts keyed by normalized student name. Cached.
    pub async fn get_contact_directory(&self) -> Result<ContactDirectory, Error> {
        let key = fingerprint(CONTACTS_KEY, &[]);
        if let Some(CachedValue::Contacts(dir)) = self.cache.get(&key) {
            return Ok(dir);
        }

        let wb = self.courses_doc().await?;
        let tab = self.cfg.sheets.contacts_tab.clone();
        let rows = self
            .retry
            .run("read contacts tab", || self.source.read_records(wb, &tab))
            .await?;

        let email_re = Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("email pattern");

        let mut dir = ContactDirectory::new();
        let mut rejected = 0usize;
        for row in rows {
            let student = row.get("Estudiante").map(|s| s.trim()).unwrap_or_default();
            let guardian = row.get("Apoderado").map(|s| s.trim()).unwrap_or_default();
            let email = row.get("Email").map(|s| s.trim()).unwrap_or_default();

            if student.is_empty() || !email_re.is_match(email) {
                rejected += 1;
                continue;
            }
            dir.insert(
                normalize_name(student),
                Contact {
                    student: student.to_string(),
                    guardian_name: guardian.to_string(),
                    guardian_email: email.to_string(),
                },
            );
        }

        info!("Loaded {} contacts ({} rows rejected)", dir.len(), rejected);
        self.cache
            .put(&key, CachedValue::Contacts(dir.clone()), self.contacts_ttl());
        Ok(dir)
    }

    // ── Write operation ───────────────────────────────────────────────

    /// Append one attendance row per student to the course's ledger tab,
    /// creating the tab (with its header) on first use. Write-through: no
    /// cache read; on success the course's ledger cache entries go away.
    pub async fn record_attendance(
        &self,
        course_name: &str,
        date: &str,
        presence: &HashMap<String, bool>,
        recorded_by: &str,
    ) -> Result<usize, Error> {
        if presence.is_empty() {
            return Err(Error::Malformed("presence map is empty".into()));
        }

        let wb = self.attendance_doc().await?;

        let tabs = self
            .retry
            .run("list ledger tabs", || self.source.list_tabs(wb))
            .await?;
        if !tabs.iter().any(|t| t == course_name) {
            self.retry
                .run("create ledger tab", || self.source.add_tab(wb, course_name))
                .await?;
            let header: Vec<String> = LEDGER_HEADER.iter().map(|s| s.to_string()).collect();
            self.retry
                .run("write ledger header", || {
                    self.source
                        .append_rows(wb, course_name, vec![header.clone()])
                })
                .await?;
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut students: Vec<&String> = presence.keys().collect();
        students.sort();

        let rows: Vec<Vec<String>> = students
            .iter()
            .map(|student| {
                vec![
                    course_name.to_string(),
                    date.to_string(),
                    (*student).clone(),
                    if presence[*student] { "1" } else { "0" }.to_string(),
                    timestamp.clone(),
                    recorded_by.to_string(),
                ]
            })
            .collect();

        let appended = rows.len();
        self.retry
            .run("append attendance rows", || {
                self.source.append_rows(wb, course_name, rows.clone())
            })
            .await?;

        let invalidated = self
            .cache
            .invalidate_prefix(&fingerprint(LEDGER_OP, &[course_name]));
        info!(
            "Recorded {} students for '{}' on {} by {} ({} cache entries invalidated)",
            appended, course_name, date, recorded_by, invalidated
        );

        Ok(appended)
    }

    // ── Operator surface ──────────────────────────────────────────────

    /// Drop every cached entry. Returns the removal count.
    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear_all();
        info!("Cache cleared ({} entries)", removed);
        removed
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Probe both documents and the expected tabs. Uses the transport
    /// directly so a health probe never warms or touches the cache.
    pub async fn health_check(&self) -> HealthReport {
        let mut report = HealthReport::default();

        match self
            .source
            .open(&self.cfg.sheets.courses_spreadsheet_id)
            .await
        {
            Ok(wb) => {
                report.client = true;
                match self.source.list_tabs(&wb).await {
                    Ok(tabs) => {
                        report.contacts_tab = tabs
                            .iter()
                            .any(|t| t.eq_ignore_ascii_case(&self.cfg.sheets.contacts_tab));
                        report.courses_tab = tabs
                            .iter()
                            .any(|t| !t.eq_ignore_ascii_case(&self.cfg.sheets.contacts_tab));
                    }
                    Err(e) => report.errors.push(format!("courses document tabs: {e}")),
                }
            }
            Err(e) => report.errors.push(format!("courses document: {e}")),
        }

        match self
            .source
            .open(&self.cfg.sheets.attendance_spreadsheet_id)
            .await
        {
            Ok(wb) => {
                report.client = true;
                match self.source.list_tabs(&wb).await {
                    Ok(tabs) => {
                        report.attendance_tab = tabs
                            .iter()
                            .any(|t| t.eq_ignore_ascii_case(&self.cfg.sheets.history_tab));
                    }
                    Err(e) => report.errors.push(format!("attendance document tabs: {e}")),
                }
            }
            Err(e) => report.errors.push(format!("attendance document: {e}")),
        }

        report
    }

    // ── Internals ─────────────────────────────────────────────────────

    async fn parsed_courses(&self) -> Result<HashMap<String, ParsedTab>, Error> {
        let key = fingerprint(COURSES_KEY, &[]);
        if let Some(CachedValue::Courses(map)) = self.cache.get(&key) {
            return Ok(map);
        }

        let map = self.fetch_courses().await?;
        self.cache
            .put(&key, CachedValue::Courses(map.clone()), self.course_ttl());
        Ok(map)
    }

    /// Scan every tab of the courses document. A tab that fails to read or
    /// parse is skipped with a warning; only credential failures abort.
    async fn fetch_courses(&self) -> Result<HashMap<String, ParsedTab>, Error> {
        let wb = self.courses_doc().await?;
        let tabs = self
            .retry
            .run("list course tabs", || self.source.list_tabs(wb))
            .await?;

        let mut courses = HashMap::new();
        let mut skipped = 0usize;

        for tab in tabs {
            if tab.eq_ignore_ascii_case(&self.cfg.sheets.contacts_tab) {
                continue;
            }

            let grid = match self
                .retry
                .run("read course tab", || self.source.read_all_cells(wb, &tab))
                .await
            {
                Ok(grid) => grid,
                Err(err @ Error::Unauthorized(_)) => return Err(err),
                Err(err) => {
                    warn!("Skipping tab '{}': {}", tab, err);
                    skipped += 1;
                    continue;
                }
            };

            match parse_tab(&tab, &grid, &self.layout) {
                Some(parsed) => {
                    courses.insert(tab, parsed);
                }
                None => {
                    debug!("Tab '{}' is not a course tab", tab);
                    skipped += 1;
                }
            }
        }

        info!("Loaded {} courses ({} tabs skipped)", courses.len(), skipped);
        Ok(courses)
    }

    async fn course_ledger(&self, tab: &ParsedTab) -> Result<AttendanceLedger, Error> {
        let name = tab.course.name.clone();
        let key = fingerprint(LEDGER_OP, &[name.as_str()]);
        if let Some(CachedValue::Ledger(ledger)) = self.cache.get(&key) {
            return Ok(ledger);
        }

        let ledger = self.fetch_ledger(tab).await?;
        self.cache
            .put(&key, CachedValue::Ledger(ledger.clone()), self.ledger_ttl());
        Ok(ledger)
    }

    /// Assemble the ledger from its sources in increasing precedence:
    /// grid presence cells, the historical flat tab, then the per-course
    /// write tab. Missing tabs contribute nothing and never fail the read.
    async fn fetch_ledger(&self, tab: &ParsedTab) -> Result<AttendanceLedger, Error> {
        let course_name = tab.course.name.clone();
        let mut records: Vec<AttendanceRecord> = tab.records.clone();

        match self.attendance_doc().await {
            Ok(wb) => {
                let history_tab = self.cfg.sheets.history_tab.clone();
                for ledger_tab in [history_tab.as_str(), course_name.as_str()] {
                    match self
                        .retry
                        .run("read ledger tab", || {
                            self.source.read_records(wb, ledger_tab)
                        })
                        .await
                    {
                        Ok(rows) => {
                            records.extend(
                                rows.iter()
                                    .filter_map(|row| self.record_from_row(row))
                                    .filter(|rec| rec.course.trim() == course_name),
                            );
                        }
                        Err(Error::NotFound(_)) => {
                            debug!("Ledger tab '{}' not present", ledger_tab);
                        }
                        Err(err) => {
                            warn!("Ledger tab '{}' unreadable: {}", ledger_tab, err);
                        }
                    }
                }
            }
            Err(Error::NotFound(msg)) => {
                warn!("Attendance document unavailable: {}", msg);
            }
            Err(err) => return Err(err),
        }

        Ok(build_ledger(&tab.course, &records))
    }

    fn record_from_row(&self, row: &HashMap<String, String>) -> Option<AttendanceRecord> {
        let student = row.get("Estudiante")?.trim();
        let date = row.get("Fecha")?.trim();
        if student.is_empty() || date.is_empty() {
            return None;
        }
        Some(AttendanceRecord {
            course: row.get("Curso").map(|c| c.trim()).unwrap_or_default().to_string(),
            student: student.to_string(),
            date: date.to_string(),
            present: self
                .layout
                .is_present_token(row.get("Asistencia").map(|s| s.as_str()).unwrap_or("")),
        })
    }
}
