use chrono::{DateTime, Utc};

const IEC_UNITS: [&str; 5] = ["Bytes", "KiB", "MiB", "GiB", "TiB"];
const SI_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

const MS_PER_SEC: f64 = 1_000.0;
const MS_PER_MIN: f64 = MS_PER_SEC * 60.0;
const MS_PER_HOUR: f64 = MS_PER_MIN * 60.0;
const MS_PER_DAY: f64 = MS_PER_HOUR * 24.0;

/// Binary (1024-based) size, e.g. `1024 -> "1.00 KiB"`.
pub fn bytes_to_size_iec(bytes: u64) -> String {
    scaled_size(bytes, 1024, &IEC_UNITS)
}

/// Decimal (1000-based) size, e.g. `1000 -> "1.00 KB"`.
pub fn bytes_to_size_si(bytes: u64) -> String {
    scaled_size(bytes, 1000, &SI_UNITS)
}

fn scaled_size(bytes: u64, base: u64, units: &[&str]) -> String {
    if bytes == 0 {
        return "0 Byte".to_string();
    }

    // Integer stepping avoids log() rounding right at unit boundaries.
    let mut exponent = 0;
    let mut divisor = 1u64;
    while exponent + 1 < units.len() {
        match divisor.checked_mul(base) {
            Some(next) if bytes >= next => {
                divisor = next;
                exponent += 1;
            }
            _ => break,
        }
    }

    format!("{:.2} {}", bytes as f64 / divisor as f64, units[exponent])
}

/// Relative age of an event that happened `elapsed_ms` ago.
///
/// Each unit is rounded to one decimal before the thresholds are checked, so
/// 59.97 seconds already reads as `1 min ago`.
pub fn ms_to_time_ago(elapsed_ms: u64) -> String {
    let ms = elapsed_ms as f64;
    let secs = round_tenth(ms / MS_PER_SEC);
    let mins = round_tenth(ms / MS_PER_MIN);
    let hours = round_tenth(ms / MS_PER_HOUR);
    let days = round_tenth(ms / MS_PER_DAY);

    if secs < 60.0 {
        format!("{} sec ago", trim_tenth(secs))
    } else if mins < 60.0 {
        format!("{} min ago", trim_tenth(mins))
    } else if hours < 24.0 {
        format!("{} {} ago", trim_tenth(hours), plural(hours, "hr", "hrs"))
    } else {
        format!("{} {} ago", trim_tenth(days), plural(days, "day", "days"))
    }
}

/// Like [`ms_to_time_ago`] for two instants. A `then` after `now` reads as `0 sec ago`.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then).num_milliseconds().max(0);
    ms_to_time_ago(elapsed as u64)
}

/// `HH:MM:SS` of the time-of-day part of an uptime; whole days are dropped.
pub fn pretty_uptime(secs: u64) -> String {
    let of_day = secs % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        of_day / 3_600,
        (of_day % 3_600) / 60,
        of_day % 60
    )
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn trim_tenth(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn plural<'a>(value: f64, singular: &'a str, many: &'a str) -> &'a str {
    if value == 1.0 { singular } else { many }
}
