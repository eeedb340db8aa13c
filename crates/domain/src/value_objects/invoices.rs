use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const INVOICE_PREFIX: &str = "INV-";
pub const BUNDLE_INVOICE_PREFIX: &str = "INV-BUNDLE-";

/// `INV-{unix_ms}-{first 8 chars of the course id}`.
pub fn single_course_invoice_number(now: DateTime<Utc>, course_id: Uuid) -> String {
    let course_id = course_id.to_string();
    let short: String = course_id.chars().take(8).collect();
    format!("{INVOICE_PREFIX}{}-{short}", now.timestamp_millis())
}

/// `INV-BUNDLE-{unix_ms}`, shared by every enrollment row of the bundle.
pub fn bundle_invoice_number(now: DateTime<Utc>) -> String {
    format!("{BUNDLE_INVOICE_PREFIX}{}", now.timestamp_millis())
}

pub fn is_bundle_invoice_number(invoice_number: &str) -> bool {
    invoice_number.starts_with(BUNDLE_INVOICE_PREFIX)
}
