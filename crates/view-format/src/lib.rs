//! Display helpers for node views. Pure functions, no I/O.

mod sanity;
mod units;

pub use sanity::{SanityColor, classify_sanity};
pub use units::{bytes_to_size_iec, bytes_to_size_si, ms_to_time_ago, pretty_uptime, time_ago};

/// `yes`/`no` for a known flag, `-` otherwise.
pub fn display_flag(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    }
}

/// Missing, blank and `none` all render as `-`.
pub fn display_text(value: Option<&str>) -> &str {
    match value.map(str::trim) {
        None | Some("") | Some("none") => "-",
        Some(text) => text,
    }
}
