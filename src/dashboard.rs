//! Dashboard metrics and request lists.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ticket::{Priority, Status, TaRequest};

/// Coordinator overview
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CoordinatorMetrics {
    pub total: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub unassigned: usize,
    pub submitted_past_week: usize,
    pub submitted_past_month: usize,
    /// In-progress requests per coach
    pub by_coach: BTreeMap<String, usize>,
    /// In-progress requests due within 30 days, per coach
    pub due_soon_by_coach: BTreeMap<String, usize>,
}

/// One coach's overview
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StaffMetrics {
    pub in_progress: usize,
    pub completed: usize,
    pub newly_assigned: usize,
    pub due_soon: usize,
}

fn within(date: Option<NaiveDate>, from: NaiveDate, to: NaiveDate) -> bool {
    date.is_some_and(|d| d >= from && d <= to)
}

fn due_soon(r: &TaRequest, today: NaiveDate) -> bool {
    r.status == Status::InProgress && within(r.due_date, today, today + Duration::days(30))
}

pub fn coordinator_metrics(requests: &[TaRequest], today: NaiveDate) -> CoordinatorMetrics {
    let mut m = CoordinatorMetrics {
        total: requests.len(),
        ..Default::default()
    };
    for r in requests {
        match r.status {
            Status::Submitted => m.unassigned += 1,
            Status::InProgress => {
                m.in_progress += 1;
                if !r.coach.is_empty() {
                    *m.by_coach.entry(r.coach.clone()).or_default() += 1;
                    if due_soon(r, today) {
                        *m.due_soon_by_coach.entry(r.coach.clone()).or_default() += 1;
                    }
                }
            }
            Status::Completed => m.completed += 1,
        }
        if within(r.submit_date, today - Duration::days(7), today) {
            m.submitted_past_week += 1;
        }
        if within(r.submit_date, today - Duration::days(30), today) {
            m.submitted_past_month += 1;
        }
    }
    m
}

pub fn staff_metrics(requests: &[TaRequest], coach: &str, today: NaiveDate) -> StaffMetrics {
    let mut m = StaffMetrics::default();
    for r in requests.iter().filter(|r| r.coach == coach) {
        match r.status {
            Status::InProgress => {
                m.in_progress += 1;
                if within(r.assigned_date, today - Duration::days(3), today) {
                    m.newly_assigned += 1;
                }
                if due_soon(r, today) {
                    m.due_soon += 1;
                }
            }
            Status::Completed => m.completed += 1,
            Status::Submitted => {}
        }
    }
    m
}

/// Optional filters for request lists; empty fields match everything
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub ta_type: Option<String>,
    pub focus_area: Option<String>,
    pub coach: Option<String>,
}

fn matches_field(filter: &Option<String>, value: &str) -> bool {
    match filter.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(want) => want == value,
    }
}

impl RequestFilter {
    pub fn matches(&self, r: &TaRequest) -> bool {
        let status_ok = match self.status.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(s) => s.parse::<Status>().is_ok_and(|s| s == r.status),
        };
        let priority_ok = match self.priority.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(p) => p.parse::<Priority>().is_ok_and(|p| p == r.priority),
        };
        status_ok
            && priority_ok
            && matches_field(&self.ta_type, &r.ta_type)
            && matches_field(&self.focus_area, &r.focus_area)
            && matches_field(&self.coach, &r.coach)
    }

    pub fn apply<'a>(&self, requests: &'a [TaRequest]) -> Vec<&'a TaRequest> {
        requests.iter().filter(|r| self.matches(r)).collect()
    }
}

/// In-progress requests, shortest expected duration first; requests without
/// an assigned or due date go last
pub fn in_progress_by_duration(requests: &[TaRequest]) -> Vec<&TaRequest> {
    let mut list: Vec<&TaRequest> = requests
        .iter()
        .filter(|r| r.status == Status::InProgress)
        .collect();
    list.sort_by_key(|r| {
        let d = r.expected_duration_days();
        (d.is_none(), d)
    });
    list
}

/// A request listed with its expected and actual duration in days
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimedRequest {
    #[serde(flatten)]
    pub request: TaRequest,
    #[serde(rename = "Expected Days")]
    pub expected_days: Option<i64>,
    #[serde(rename = "Actual Days")]
    pub actual_days: Option<i64>,
}

impl From<&TaRequest> for TimedRequest {
    fn from(r: &TaRequest) -> Self {
        TimedRequest {
            expected_days: r.expected_duration_days(),
            actual_days: r.actual_duration_days(),
            request: r.clone(),
        }
    }
}

/// Completed requests, most recently closed first
pub fn completed_by_close(requests: &[TaRequest]) -> Vec<&TaRequest> {
    let mut list: Vec<&TaRequest> = requests
        .iter()
        .filter(|r| r.status == Status::Completed)
        .collect();
    list.sort_by(|a, b| b.close_date.cmp(&a.close_date));
    list
}
