use serde::Serialize;

/// Outcome of a sanity-test metric, as drawn in the node timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityColor {
    NoValue,
    Pass,
    Warning,
    Fail,
}

impl SanityColor {
    pub fn color_token(&self) -> &'static str {
        match self {
            Self::NoValue => "noValue",
            Self::Pass => "green",
            Self::Warning => "orange",
            Self::Fail => "red4",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NoValue => "no value",
            Self::Pass => "passed",
            Self::Warning => "warning",
            Self::Fail => "failed",
        }
    }
}

/// A value of zero or below passes; anything above is a warning when the
/// metric is tagged with `warning` severity and a failure otherwise.
pub fn classify_sanity(value: Option<f64>, severity: Option<&str>) -> SanityColor {
    match value {
        None => SanityColor::NoValue,
        Some(value) if value.is_nan() => SanityColor::NoValue,
        Some(value) if value <= 0.0 => SanityColor::Pass,
        Some(_) if severity == Some("warning") => SanityColor::Warning,
        Some(_) => SanityColor::Fail,
    }
}
