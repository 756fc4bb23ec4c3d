//! Time windows over the progress log
//!
//! The log is append-ordered, not time-ordered, so every window works on a
//! copy sorted by timestamp. A window `(start, end]` includes events strictly
//! after `start` and at or before `end`.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::types::{ProgressEvent, Trend};

/// Countable events sorted by timestamp
pub struct Timeline<'a> {
    events: Vec<&'a ProgressEvent>,
}

impl<'a> Timeline<'a> {
    /// Sort events and drop ignored tags and anything dated after `now`
    pub fn new(events: &'a [ProgressEvent], ignored_tags: &[String], now: DateTime<Utc>) -> Self {
        let mut events: Vec<&ProgressEvent> = events
            .iter()
            .filter(|e| e.timestamp <= now)
            .filter(|e| !ignored_tags.iter().any(|t| t.eq_ignore_ascii_case(&e.event)))
            .collect();
        // Stable, so same-instant events keep append order.
        events.sort_by_key(|e| e.timestamp);
        Self { events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Events in `(start, end]`; `None` start means unbounded
    pub fn between(&self, start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> &[&'a ProgressEvent] {
        let lo = match start {
            Some(start) => self.events.partition_point(|e| e.timestamp <= start),
            None => 0,
        };
        let hi = self.events.partition_point(|e| e.timestamp <= end);
        &self.events[lo..hi.max(lo)]
    }
}

/// Start of a window of `days` ending at `now`.
///
/// A window reaching past the representable range is unbounded.
pub fn window_start(now: DateTime<Utc>, days: Option<i64>) -> Option<DateTime<Utc>> {
    days.and_then(|d| days_before(now, d))
}

/// `days` before `at`, `None` when that instant cannot be represented
pub fn days_before(at: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    Duration::try_days(days).and_then(|span| at.checked_sub_signed(span))
}

/// Sum of per-tag increments and the number of events that matched a tag
pub fn tally(events: &[&ProgressEvent], increments: &BTreeMap<String, f64>) -> (f64, usize) {
    let mut points = 0.0;
    let mut matched = 0;
    for event in events {
        let tag = event.event.to_ascii_lowercase();
        if let Some(inc) = increments.get(&tag) {
            points += inc;
            matched += 1;
        }
    }
    (points, matched)
}

/// Count events with a given tag
pub fn count_tag(events: &[&ProgressEvent], tag: &str) -> usize {
    events.iter().filter(|e| e.event.eq_ignore_ascii_case(tag)).count()
}

/// Trend between a recent window and the adjacent prior one.
///
/// Returns the trend and the relative change `(recent - prior) / prior`.
/// With no prior activity any recent activity is improving.
pub fn trend(recent: usize, prior: usize, tolerance: f64) -> (Trend, f64) {
    if prior == 0 {
        return if recent > 0 {
            (Trend::Improving, 1.0)
        } else {
            (Trend::Stable, 0.0)
        };
    }

    let change = (recent as f64 - prior as f64) / prior as f64;
    let trend = if change > tolerance {
        Trend::Improving
    } else if change < -tolerance {
        Trend::Declining
    } else {
        Trend::Stable
    };
    (trend, change)
}
