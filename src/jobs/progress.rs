//! Worker diagnostic-line parsing.
//!
//! yt-dlp's progress output is unstructured text and drifts across versions;
//! every assumption about its phrasing lives in this module so the rest of
//! the system only depends on the structured result.

use std::sync::LazyLock;

use regex::Regex;

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)%").unwrap());
static TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)of\s+~?([0-9.]+)([KMG]i?B)").unwrap());
static SPEED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)at\s+([0-9.]+[KMG]i?B/s)").unwrap());
static ETA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)ETA\s+([0-9:]+)").unwrap());
static ETA_ALT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin\s+([0-9:]+)").unwrap());

/// Markers that indicate the worker hit a fatal condition, independent of
/// its eventual exit code.
const FATAL_MARKERS: &[&str] = &["ERROR:", "Traceback"];

/// Progress tokens recognized on a single line, each independently optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressFields {
    /// Completion percentage in `[0, 100]`.
    pub percent: Option<f64>,
    /// Total transfer size as printed, e.g. `10.00MiB`.
    pub total: Option<String>,
    /// Transfer speed as printed, e.g. `1.20MiB/s`.
    pub speed: Option<String>,
    /// Estimated time remaining as printed, e.g. `00:05`.
    pub eta: Option<String>,
}

impl ProgressFields {
    pub fn is_empty(&self) -> bool {
        self.percent.is_none() && self.total.is_none() && self.speed.is_none() && self.eta.is_none()
    }
}

/// Result of classifying one diagnostic line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLine {
    /// Progress tokens found on the line, if any.
    pub progress: Option<ProgressFields>,
    /// Fatal signal carrying the triggering line; set independently of
    /// progress tokens on the same line.
    pub fatal: Option<String>,
}

/// Classify a single diagnostic line.
///
/// Returns `None` when the line carries neither progress tokens nor a fatal
/// marker.
pub fn parse_line(line: &str) -> Option<ParsedLine> {
    let fatal = FATAL_MARKERS
        .iter()
        .any(|m| line.contains(m))
        .then(|| line.trim().to_string());

    let fields = ProgressFields {
        percent: PERCENT_RE
            .captures(line)
            .and_then(|c| c[1].parse::<f64>().ok())
            .filter(|p| (0.0..=100.0).contains(p)),
        total: TOTAL_RE
            .captures(line)
            .map(|c| format!("{}{}", &c[1], &c[2])),
        speed: SPEED_RE.captures(line).map(|c| c[1].to_string()),
        eta: ETA_RE
            .captures(line)
            .or_else(|| ETA_ALT_RE.captures(line))
            .map(|c| c[1].to_string()),
    };

    let progress = (!fields.is_empty()).then_some(fields);

    if progress.is_none() && fatal.is_none() {
        return None;
    }

    Some(ParsedLine { progress, fatal })
}
