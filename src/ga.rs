//! Student-support (GA) requests routed by weekly availability.
//!
//! Each assistant publishes free-text hour ranges per weekday
//! (`"9am - 12pm, 1:30pm - 5pm"`). A request for a time window on a given
//! date goes to everyone whose availability overlaps it.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::sheet::{SheetRecord, date_cell};
use crate::validation::Violations;

pub const GA_PREFIX: &str = "GA";

lazy_static! {
    static ref CLOCK_REGEX: Regex =
        Regex::new(r"(?i)^\s*(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\s*$").unwrap();
}

/// Minutes since midnight, `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval {
    pub start: u16,
    pub end: u16,
}

impl Interval {
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Parse `9am`, `1:30pm`, `13:00` or `12pm` into minutes since midnight
pub fn parse_clock(raw: &str) -> Option<u16> {
    let caps = CLOCK_REGEX.captures(raw)?;
    let mut hour: u16 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u16 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    if minute >= 60 {
        return None;
    }
    match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(meridiem) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            if hour == 12 {
                hour = 0;
            }
            if meridiem == "pm" {
                hour += 12;
            }
        }
        None if hour > 23 => return None,
        None => {}
    }
    Some(hour * 60 + minute)
}

/// Parse `"9am - 5pm"` (several ranges may be comma separated). Ranges that
/// do not parse are skipped.
///
/// ```
/// use gutap::ga::parse_ranges;
///
/// let ranges = parse_ranges("9am - 11:30am, 1pm - 5pm");
/// assert_eq!(ranges.len(), 2);
/// assert_eq!((ranges[0].start, ranges[0].end), (540, 690));
/// ```
pub fn parse_ranges(raw: &str) -> Vec<Interval> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .filter_map(|part| {
            let (from, to) = part.split_once('-')?;
            let start = parse_clock(from)?;
            let end = parse_clock(to)?;
            if start < end {
                Some(Interval { start, end })
            } else {
                warn!("ignoring empty availability range '{}'", part.trim());
                None
            }
        })
        .collect()
}

/// One assistant's weekly availability
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Assistant {
    pub name: String,
    pub email: String,
    /// Weekday name (`Monday`..`Sunday`) to range text
    #[serde(default)]
    pub availability: BTreeMap<String, String>,
}

impl Assistant {
    pub fn ranges_on(&self, day: Weekday) -> Vec<Interval> {
        self.availability
            .iter()
            .find(|(k, _)| k.parse::<Weekday>().ok() == Some(day))
            .map(|(_, v)| parse_ranges(v))
            .unwrap_or_default()
    }

    pub fn is_available(&self, day: Weekday, window: &Interval) -> bool {
        self.ranges_on(day).iter().any(|r| r.overlaps(window))
    }
}

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bad availability file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The availability table, loaded from a JSON list of assistants
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AvailabilityTable {
    pub assistants: Vec<Assistant>,
}

impl AvailabilityTable {
    pub fn load(path: &Path) -> Result<Self, AvailabilityError> {
        let data = fs::read_to_string(path).map_err(|source| AvailabilityError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| AvailabilityError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Everyone available for any part of the window on `date`
    pub fn matches(&self, date: NaiveDate, window: &Interval) -> Vec<&Assistant> {
        let day = date.weekday();
        self.assistants
            .iter()
            .filter(|a| a.is_available(day, window))
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GaStatus {
    #[default]
    Submitted,
    Completed,
}

/// One row of the `GA_Support` worksheet
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaRequest {
    #[serde(rename = "Request ID")]
    pub request_id: String,
    #[serde(rename = "Requester")]
    pub requester: String,
    #[serde(rename = "Requester Email")]
    pub requester_email: String,
    #[serde(rename = "Date", with = "date_cell")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "Start Time")]
    pub start_time: String,
    #[serde(rename = "End Time")]
    pub end_time: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Matched Assistants")]
    pub matched: String,
    #[serde(rename = "Status", deserialize_with = "lenient_status")]
    pub status: GaStatus,
    #[serde(rename = "Completed By")]
    pub completed_by: String,
    #[serde(rename = "Submit Date", with = "date_cell")]
    pub submit_date: Option<NaiveDate>,
}

fn lenient_status<'de, D: serde::Deserializer<'de>>(d: D) -> Result<GaStatus, D::Error> {
    let raw = String::deserialize(d)?;
    Ok(if raw.trim() == "Completed" {
        GaStatus::Completed
    } else {
        GaStatus::Submitted
    })
}

impl SheetRecord for GaRequest {
    const WORKSHEET: &'static str = crate::store::GA_SUPPORT;
    const COLUMNS: &'static [&'static str] = &[
        "Request ID",
        "Requester",
        "Requester Email",
        "Date",
        "Start Time",
        "End Time",
        "Description",
        "Matched Assistants",
        "Status",
        "Completed By",
        "Submit Date",
    ];
}

impl GaRequest {
    pub fn matched_names(&self) -> Vec<&str> {
        self.matched
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_matched_to(&self, name: &str) -> bool {
        self.matched_names().contains(&name)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GaForm {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub description: String,
}

fn parse_time_input(raw: &str) -> Option<u16> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .ok()
        .map(|t| (t.hour() * 60 + t.minute()) as u16)
        .or_else(|| parse_clock(raw))
}

fn fmt_minutes(m: u16) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

impl GaForm {
    /// Validate and build the row (without id or matches) plus its window
    pub fn validate(
        &self,
        requester: &str,
        requester_email: &str,
        today: NaiveDate,
    ) -> Result<(GaRequest, Interval), Vec<String>> {
        let mut v = Violations::new();
        let date = date_cell::parse(&self.date);
        match date {
            None => v.push("Date is required."),
            Some(d) if d < today => v.push("Date cannot be in the past."),
            Some(_) => {}
        }
        let start = parse_time_input(&self.start_time);
        let end = parse_time_input(&self.end_time);
        match (start, end) {
            (Some(s), Some(e)) if s >= e => v.push("End time must be after start time."),
            (Some(_), Some(_)) => {}
            _ => v.push("Start and end times are required."),
        }
        v.require(&self.description, "Description is required.");
        v.into_result()?;

        let window = Interval {
            start: start.unwrap_or_default(),
            end: end.unwrap_or_default(),
        };
        let request = GaRequest {
            requester: requester.to_string(),
            requester_email: requester_email.to_string(),
            date,
            start_time: fmt_minutes(window.start),
            end_time: fmt_minutes(window.end),
            description: self.description.trim().to_string(),
            status: GaStatus::Submitted,
            submit_date: Some(today),
            ..GaRequest::default()
        };
        Ok((request, window))
    }
}
