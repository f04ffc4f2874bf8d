//! Attendance data service — operator CLI.
//!
//! Single-binary Tokio application over the data layer:
//! 1. Loads configuration and the service-account credential
//! 2. Establishes the authenticated Sheets session (once)
//! 3. Runs the requested operation through the façade
//! 4. Prints human-readable summaries for the operator

mod config;

use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, warn};

use attendance::{below_threshold, course_stats, summarize, top_n, SheetsDataService};
use sheets_client::{RateLimiter, SheetsAuth, SheetsRestClient};

/// Attendance data layer operator CLI.
#[derive(Parser)]
#[command(name = "asistencia-service", about = "Attendance data layer operator CLI")]
struct Cli {
    /// Probe connectivity and expected tabs, then exit.
    #[arg(long)]
    check_health: bool,

    /// List every course with roster and session counts.
    #[arg(long)]
    courses: bool,

    /// Print the attendance summary for one site.
    #[arg(long)]
    site: Option<String>,

    /// List guardian contacts.
    #[arg(long)]
    contacts: bool,

    /// Attendance threshold (percent) below which students are flagged.
    #[arg(long, default_value_t = 70.0)]
    threshold: f64,
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "asistencia_service=info,sheets_client=info,attendance=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Budget: {} calls/min; TTLs: courses={}s ledger={}s contacts={}s; retry: {}x from {}ms",
        cfg.rate_limit.calls_per_minute,
        cfg.cache.course_ttl_secs,
        cfg.cache.ledger_ttl_secs,
        cfg.cache.contacts_ttl_secs,
        cfg.retry.max_retries,
        cfg.retry.initial_delay_ms,
    );

    // Initialize auth and the single Sheets session.
    let credentials = match config::load_credentials(&cfg) {
        Ok(raw) => raw,
        Err(e) => {
            error!("Credential error: {}", e);
            std::process::exit(1);
        }
    };
    let auth = match SheetsAuth::from_json(&credentials) {
        Ok(a) => a,
        Err(e) => {
            error!("Auth initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    let limiter = RateLimiter::new(cfg.rate_limit.calls_per_minute);
    let client = match SheetsRestClient::connect(auth, limiter).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to establish Sheets session: {}", e);
            std::process::exit(1);
        }
    };

    let service = SheetsDataService::new(Arc::new(client), cfg);

    // ── Health-check mode ────────────────────────────────────────────
    if cli.check_health {
        info!("Running health check...");
        let report = service.health_check().await;
        info!(
            "client={} courses_tab={} attendance_tab={} contacts_tab={}",
            report.client, report.courses_tab, report.attendance_tab, report.contacts_tab
        );
        for err in &report.errors {
            error!("  {}", err);
        }
        if !report.is_healthy() {
            std::process::exit(1);
        }
        info!("✅ All probes passed");
        return;
    }

    let mut ran_something = false;

    if cli.courses {
        ran_something = true;
        run_courses(&service).await;
    }

    if let Some(site) = &cli.site {
        ran_something = true;
        run_site_summary(&service, site, cli.threshold).await;
    }

    if cli.contacts {
        ran_something = true;
        run_contacts(&service).await;
    }

    if !ran_something {
        info!("Nothing to do; try --check-health, --courses, --site <NAME> or --contacts");
        return;
    }

    let stats = service.cache_stats();
    debug!(
        "Cache: {} hits / {} misses ({:.1}% hit rate), {} entries",
        stats.hits, stats.misses, stats.hit_rate, stats.current_size
    );
}

async fn run_courses(service: &SheetsDataService) {
    match service.get_courses().await {
        Ok(courses) => {
            info!("{} courses loaded", courses.len());
            let mut names: Vec<&String> = courses.keys().collect();
            names.sort();
            for name in names {
                let course = &courses[name];
                info!(
                    "  {} — {} / {} ({}): {} students, {} sessions",
                    course.name,
                    course.site,
                    course.subject,
                    course.teacher,
                    course.students.len(),
                    course.class_dates.len(),
                );
            }
        }
        Err(e) => error!("Failed to load courses: {}", e),
    }
}

async fn run_site_summary(service: &SheetsDataService, site: &str, threshold: f64) {
    let site_courses = match service.get_courses_for_site(site).await {
        Ok(map) => map,
        Err(e) => {
            error!("Failed to load site '{}': {}", site, e);
            return;
        }
    };

    if site_courses.is_empty() {
        info!("No courses for site '{}'", site);
        return;
    }

    let mut names: Vec<&String> = site_courses.keys().collect();
    names.sort();

    for name in names {
        let ca = &site_courses[name];
        let summaries = summarize(&ca.course, &ca.ledger);
        let stats = course_stats(&summaries, threshold);

        info!(
            "{}: {} students, {} sessions, average {:.1}%",
            name, stats.student_count, stats.session_count, stats.average_percentage
        );

        let flagged = below_threshold(&summaries, threshold);
        if flagged.is_empty() {
            info!("  no students below {:.0}%", threshold);
        } else {
            for s in &flagged {
                warn!(
                    "  ⚠️ {}: {:.1}% ({}/{} sessions, {})",
                    s.student,
                    s.percentage,
                    s.present_count,
                    s.total_sessions,
                    s.level.label(),
                );
            }
        }

        for s in top_n(&summaries, 3) {
            info!("  🏆 {}: {:.1}%", s.student, s.percentage);
        }
    }
}

async fn run_contacts(service: &SheetsDataService) {
    match service.get_contact_directory().await {
        Ok(directory) => {
            info!("{} guardian contacts", directory.len());
            let mut keys: Vec<&String> = directory.keys().collect();
            keys.sort();
            for key in keys {
                let contact = &directory[key];
                info!(
                    "  {} → {} <{}>",
                    contact.student, contact.guardian_name, contact.guardian_email
                );
            }
        }
        Err(e) => error!("Failed to load contacts: {}", e),
    }
}
