//! Shared domain types, errors and configuration for the attendance service.

pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, CacheConfig, RateLimitConfig, RetryConfig, SheetsConfig};
pub use error::Error;
pub use types::{
    normalize_name, AttendanceLedger, AttendanceLevel, AttendanceRecord, AttendanceSummary,
    Contact, ContactDirectory, Course, CourseAttendance,
};
