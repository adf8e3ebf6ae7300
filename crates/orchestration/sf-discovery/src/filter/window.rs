//! Time-based filtering on object last-modified instants.

use chrono::{DateTime, Utc};

use super::Filter;
use sf_types::{ObjectSummary, TimeWindow};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keeps objects whose last-modified instant falls in `[start, end)`.
///
/// Objects without a timestamp pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowFilter {
    window: TimeWindow,
}

impl WindowFilter {
    pub fn new(window: TimeWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn matches_time(&self, last_modified: Option<DateTime<Utc>>) -> bool {
        last_modified.map_or(true, |modified| self.window.contains(modified))
    }
}

impl Filter for WindowFilter {
    fn matches(&self, obj: &ObjectSummary) -> bool {
        self.matches_time(obj.last_modified)
    }

    fn description(&self) -> String {
        match (self.window.start, self.window.end) {
            (Some(start), Some(end)) => format!(
                "window(from={}, until={})",
                start.format(DATE_FORMAT),
                end.format(DATE_FORMAT)
            ),
            (Some(start), None) => format!("window(from={})", start.format(DATE_FORMAT)),
            (None, Some(end)) => format!("window(until={})", end.format(DATE_FORMAT)),
            (None, None) => "window(any)".to_string(),
        }
    }
}

/// Keeps objects modified strictly after a previous scan's watermark.
///
/// An object stamped exactly at the watermark is dropped: the pass that set
/// the watermark already saw every object with that timestamp.
#[derive(Debug, Clone, Copy)]
pub struct WatermarkFilter {
    watermark: DateTime<Utc>,
}

impl WatermarkFilter {
    pub fn new(watermark: DateTime<Utc>) -> Self {
        Self { watermark }
    }
}

impl Filter for WatermarkFilter {
    fn matches(&self, obj: &ObjectSummary) -> bool {
        obj.last_modified.map_or(true, |modified| modified > self.watermark)
    }

    fn description(&self) -> String {
        format!("watermark(after={})", self.watermark.format(DATE_FORMAT))
    }
}
