//! Formatting utilities for sizes, dates and ratios shown in the console

use chrono::{DateTime, Local, TimeZone, Utc};

/// Format bytes as human-readable size using binary units (KiB, MiB, GiB)
///
/// # Examples
/// ```
/// use xo_console_common::format_bytes;
/// assert_eq!(format_bytes(1024), "1.00 KiB");
/// assert_eq!(format_bytes(1536), "1.50 KiB");
/// assert_eq!(format_bytes(1048576), "1.00 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{size:.2} {}", UNITS[unit_idx])
}

/// Format a signed size as reported by the platform
///
/// Negative sizes (unsized SRs, over-consumed quotas) are shown with a sign.
pub fn format_size(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_bytes(bytes.unsigned_abs()))
    } else {
        format_bytes(bytes as u64)
    }
}

/// Format a ratio (0.0-1.0) as a whole percentage
///
/// # Examples
/// ```
/// use xo_console_common::format::format_percent;
/// assert_eq!(format_percent(0.256), "26%");
/// ```
pub fn format_percent(ratio: f64) -> String {
    if !ratio.is_finite() {
        return "0%".to_string();
    }
    format!("{:.0}%", ratio * 100.0)
}

/// Convert a backup date (milliseconds since epoch) to a UTC timestamp
pub fn backup_datetime(date_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(date_ms).single()
}

/// Format a backup date in the long form used by backup tables,
/// e.g. `March 3, 2017, 10:00:00`
pub fn format_backup_date(date_ms: i64) -> String {
    match backup_datetime(date_ms) {
        Some(dt) => dt
            .with_timezone(&Local)
            .format("%B %-d, %Y, %H:%M:%S")
            .to_string(),
        None => "Unknown date".to_string(),
    }
}

/// Format elapsed time into human-readable string
///
/// # Examples
/// ```
/// use xo_console_common::format::format_elapsed_time;
/// assert_eq!(format_elapsed_time(30), "30s");
/// assert_eq!(format_elapsed_time(90), "1m 30s");
/// assert_eq!(format_elapsed_time(3665), "1h 1m");
/// assert_eq!(format_elapsed_time(90000), "1d 1h");
/// ```
pub fn format_elapsed_time(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (major, minor, major_unit, minor_unit) = if seconds < 60 {
        return format!("{seconds}s");
    } else if seconds < 3600 {
        (seconds / 60, seconds % 60, "m", "s")
    } else if seconds < 86400 {
        (seconds / 3600, (seconds % 3600) / 60, "h", "m")
    } else {
        (seconds / 86400, (seconds % 86400) / 3600, "d", "h")
    };

    if minor == 0 {
        format!("{major}{major_unit}")
    } else {
        format!("{major}{major_unit} {minor}{minor_unit}")
    }
}

/// Describe how long ago a backup was taken relative to `now`
pub fn format_backup_age(date_ms: i64, now: DateTime<Utc>) -> String {
    match backup_datetime(date_ms) {
        Some(dt) => {
            let elapsed = now.signed_duration_since(dt).num_seconds();
            format!("{} ago", format_elapsed_time(elapsed))
        }
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1024), "1.00 KiB");
        assert_eq!(format_bytes(1073741824), "1.00 GiB");
        assert_eq!(format_bytes(1024u64.pow(5)), "1.00 PiB");
    }

    #[test]
    fn test_format_size_negative() {
        assert_eq!(format_size(-1024), "-1.00 KiB");
        assert_eq!(format_size(2048), "2.00 KiB");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.0), "0%");
        assert_eq!(format_percent(1.0), "100%");
        assert_eq!(format_percent(f64::NAN), "0%");
    }

    #[test]
    fn test_format_elapsed_time() {
        assert_eq!(format_elapsed_time(-5), "0s");
        assert_eq!(format_elapsed_time(60), "1m");
        assert_eq!(format_elapsed_time(3600), "1h");
        assert_eq!(format_elapsed_time(86400), "1d");
    }

    #[test]
    fn test_format_backup_age() {
        let now = backup_datetime(10_000_000).unwrap();
        assert_eq!(format_backup_age(10_000_000 - 90_000, now), "1m 30s ago");
    }

    #[test]
    fn test_backup_datetime() {
        let dt = backup_datetime(1_488_535_200_000).unwrap();
        assert_eq!(dt.timestamp(), 1_488_535_200);
    }
}
