//! TA requests (worksheet `Main`) and their lifecycle.
//!
//! A ticket moves `Submitted → In Progress → Completed`. Assignment stamps the
//! assigned date, completion stamps the close date, and a transfer swaps the
//! coach without touching the status.

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::sheet::{SheetRecord, append_line, date_cell};
use crate::validation::{Violations, clean_us_phone, format_phone};

pub const TICKET_PREFIX: &str = "GU";

/// Phone cells read back in display format; unrecognised values are kept as typed
fn phone_cell<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let raw = Option::<String>::deserialize(d)?.unwrap_or_default();
    Ok(format_phone(raw.trim()))
}

pub const ORGANIZATIONS: [&str; 3] = ["GU", "HRSA", "NASTAD"];

pub const FOCUS_AREAS: [&str; 7] = [
    "Housing",
    "Prevention",
    "Substance Abuse",
    "Rapid Start",
    "Telehealth/Telemedicine",
    "Data Sharing",
    "Other",
];

pub const TA_TYPES: [&str; 4] = [
    "In-Person",
    "Virtual",
    "Hybrid (Combination of in-person and virtual)",
    "Unsure",
];

pub const JURISDICTIONS: &[&str] = &[
    "Maricopa Co. - Arizona",
    "Alameda Co. - California",
    "Los Angeles Co. - California",
    "Orange Co. - California",
    "Riverside Co. - California",
    "Sacramento Co. - California",
    "San Bernadino Co. -California",
    "San Diego Co. - California",
    "San Francisco Co. - California",
    "Broward Co. - Florida",
    "Duval Co. - Florida",
    "Hillsborough Co. - Florida",
    "Miami-Dade Co. - Florida",
    "Orange Co. - Florida",
    "Palm Beach Co. - Florida",
    "Pinellas Co. - Florida",
    "Cobb Co. - Georgia",
    "Dekalb Co. - Georgia",
    "Fulton Co. - Georgia",
    "Gwinnett Co. - Georgia",
    "Cook Co. - Illinois",
    "Marion Co. - Indiana",
    "East Baton Rough Parish - Louisiana",
    "Orleans Parish - Louisiana",
    "Baltimore City - Maryland",
    "Montgomery Co. - Maryland",
    "Prince George's Co. - Maryland",
    "Suffolk Co. - Massachusetts",
    "Wayne Co. - Michigan",
    "Clark Co. - Neveda",
    "Essex Co. - New Jersey",
    "Hudson Co. - New Jersey",
    "Bronx Co. - New York",
    "Kings Co. - New York",
    "New York Co. - New York",
    "Queens Co. - New York",
    "Mecklenburg Co. - North Carolina",
    "Cuyahoga Co. - Ohio",
    "Franklin Co. - Ohio",
    "Hamilton Co. - Ohio",
    "Philadelphia Co. - Pennsylvania",
    "Shelby Co. - Tennessee",
    "Bexar Co. - Texas",
    "Dallas Co. - Texas",
    "Harris Co. - Texas",
    "Tarrant Co. - Texas",
    "Travis Co. - Texas",
    "King Co. - Washington",
    "Washington, DC",
    "San Juan Municipio - Puerto Rico",
    "Alabama",
    "Arkansas",
    "Kentucky",
    "Mississippi",
    "Missouri",
    "Oklahoma",
    "South Carolina",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    #[default]
    Submitted,
    InProgress,
    Completed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Submitted => "Submitted",
            Status::InProgress => "In Progress",
            Status::Completed => "Completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Submitted" => Ok(Status::Submitted),
            "In Progress" => Ok(Status::InProgress),
            "Completed" => Ok(Status::Completed),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

// Sheet cells are coerced: an unreadable status is treated as a new request.
impl From<String> for Status {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_else(|e| {
            if !s.trim().is_empty() {
                warn!("{}; treating as Submitted", e);
            }
            Status::Submitted
        })
    }
}

impl From<Status> for String {
    fn from(s: Status) -> Self {
        s.as_str().to_string()
    }
}

/// Request priority; the declaration order is the triage order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Critical, Priority::High, Priority::Normal, Priority::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "Critical",
            Priority::High => "High",
            Priority::Normal => "Normal",
            Priority::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown priority '{}'", s.trim()))
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        p.as_str().to_string()
    }
}

/// One row of the `Main` worksheet
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaRequest {
    #[serde(rename = "Ticket ID")]
    pub ticket_id: String,
    #[serde(rename = "Jurisdiction")]
    pub jurisdiction: String,
    #[serde(rename = "Organization")]
    pub organization: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Title/Position")]
    pub title: String,
    #[serde(rename = "Email Address")]
    pub email: String,
    #[serde(rename = "Phone Number", deserialize_with = "phone_cell")]
    pub phone: String,
    #[serde(rename = "Focus Area")]
    pub focus_area: String,
    #[serde(rename = "TA Type")]
    pub ta_type: String,
    #[serde(rename = "Targeted Due Date", with = "date_cell")]
    pub due_date: Option<NaiveDate>,
    #[serde(rename = "TA Description")]
    pub description: String,
    #[serde(rename = "Priority")]
    pub priority: Priority,
    #[serde(rename = "Submit Date", with = "date_cell")]
    pub submit_date: Option<NaiveDate>,
    #[serde(rename = "Status")]
    pub status: Status,
    #[serde(rename = "Assigned Date", with = "date_cell")]
    pub assigned_date: Option<NaiveDate>,
    #[serde(rename = "Close Date", with = "date_cell")]
    pub close_date: Option<NaiveDate>,
    #[serde(rename = "Assigned Coach")]
    pub coach: String,
    #[serde(rename = "Assigned Coordinator")]
    pub coordinator: String,
    #[serde(rename = "Coordinator Comment")]
    pub coordinator_comment: String,
    #[serde(rename = "Staff Comment")]
    pub staff_comment: String,
    #[serde(rename = "Transfer History")]
    pub transfer_history: String,
    #[serde(rename = "Document")]
    pub document: String,

    /// Columns this version does not know about, kept across rewrites
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl SheetRecord for TaRequest {
    const WORKSHEET: &'static str = crate::store::MAIN;
    const COLUMNS: &'static [&'static str] = &[
        "Ticket ID",
        "Jurisdiction",
        "Organization",
        "Name",
        "Title/Position",
        "Email Address",
        "Phone Number",
        "Focus Area",
        "TA Type",
        "Targeted Due Date",
        "TA Description",
        "Priority",
        "Submit Date",
        "Status",
        "Assigned Date",
        "Close Date",
        "Assigned Coach",
        "Assigned Coordinator",
        "Coordinator Comment",
        "Staff Comment",
        "Transfer History",
        "Document",
    ];
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("ticket {ticket} is {actual}, expected {expected}")]
    WrongStatus {
        ticket: String,
        actual: Status,
        expected: Status,
    },

    #[error("a coach must be selected")]
    MissingCoach,

    #[error("{0} is already the assigned coach")]
    SameCoach(String),

    #[error("ticket {ticket} is not assigned to {staff}")]
    NotAssignee { ticket: String, staff: String },

    #[error("comment text is empty")]
    EmptyComment,
}

/// Which history cell a comment lands in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommentKind {
    Coordinator,
    Staff,
}

impl TaRequest {
    fn expect_status(&self, expected: Status) -> Result<(), TransitionError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(TransitionError::WrongStatus {
                ticket: self.ticket_id.clone(),
                actual: self.status,
                expected,
            })
        }
    }

    /// `Submitted → In Progress`, recording coach, coordinator and date
    pub fn assign(&mut self, coach: &str, coordinator: &str, today: NaiveDate) -> Result<(), TransitionError> {
        self.expect_status(Status::Submitted)?;
        if coach.trim().is_empty() {
            return Err(TransitionError::MissingCoach);
        }
        self.coach = coach.trim().to_string();
        self.coordinator = coordinator.to_string();
        self.status = Status::InProgress;
        self.assigned_date = Some(today);
        Ok(())
    }

    /// Hand an in-progress ticket to another coach. Returns the previous coach.
    pub fn transfer(
        &mut self,
        new_coach: &str,
        actor: &str,
        reason: &str,
        today: NaiveDate,
    ) -> Result<String, TransitionError> {
        self.expect_status(Status::InProgress)?;
        let new_coach = new_coach.trim();
        if new_coach.is_empty() {
            return Err(TransitionError::MissingCoach);
        }
        if new_coach == self.coach {
            return Err(TransitionError::SameCoach(new_coach.to_string()));
        }

        let previous = std::mem::replace(&mut self.coach, new_coach.to_string());
        let mut entry = format!("[{}] {} -> {} by {}", today.format(date_cell::FORMAT), previous, new_coach, actor);
        if !reason.trim().is_empty() {
            entry.push_str(": ");
            entry.push_str(reason.trim());
        }
        append_line(&mut self.transfer_history, &entry);
        Ok(previous)
    }

    /// `In Progress → Completed`, stamping the close date
    pub fn complete(&mut self, today: NaiveDate) -> Result<(), TransitionError> {
        self.expect_status(Status::InProgress)?;
        self.status = Status::Completed;
        self.close_date = Some(today);
        Ok(())
    }

    /// Staff may only close their own tickets
    pub fn complete_as(&mut self, staff: &str, today: NaiveDate) -> Result<(), TransitionError> {
        if self.coach != staff {
            return Err(TransitionError::NotAssignee {
                ticket: self.ticket_id.clone(),
                staff: staff.to_string(),
            });
        }
        self.complete(today)
    }

    pub fn add_comment(
        &mut self,
        kind: CommentKind,
        author: &str,
        text: &str,
        today: NaiveDate,
    ) -> Result<(), TransitionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TransitionError::EmptyComment);
        }
        let line = format!("[{}] {}: {}", today.format(date_cell::FORMAT), author, text);
        let cell = match kind {
            CommentKind::Coordinator => &mut self.coordinator_comment,
            CommentKind::Staff => &mut self.staff_comment,
        };
        append_line(cell, &line);
        Ok(())
    }

    /// Days between assignment and the targeted due date
    pub fn expected_duration_days(&self) -> Option<i64> {
        Some((self.due_date? - self.assigned_date?).num_days())
    }

    /// Days between assignment and close
    pub fn actual_duration_days(&self) -> Option<i64> {
        Some((self.close_date? - self.assigned_date?).num_days())
    }

    pub fn documents(&self) -> Vec<&str> {
        self.document
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// `GU0004 | Jane Doe | Cook Co. - Illinois`
    pub fn label(&self) -> String {
        format!("{} | {} | {}", self.ticket_id, self.name, self.jurisdiction)
    }
}

/// Raw requester form input
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestForm {
    pub name: String,
    pub title: String,
    pub organization: String,
    pub location: String,
    pub email: String,
    pub phone: String,
    pub focus_area: String,
    pub focus_area_other: String,
    pub ta_type: String,
    pub due_date: String,
    pub description: String,
    pub priority: String,
}

impl RequestForm {
    /// Check every field and build the new ticket row (without id or
    /// documents). All violations are reported together.
    pub fn validate(&self, today: NaiveDate) -> Result<TaRequest, Vec<String>> {
        let mut v = Violations::new();

        v.require(&self.name, "Name is required.");
        v.require(&self.title, "Title/Position is required.");
        if !ORGANIZATIONS.contains(&self.organization.trim()) {
            v.push("Organization must be selected.");
        }
        if !JURISDICTIONS.contains(&self.location.trim()) {
            v.push("Location must be selected.");
        }
        v.require_email(&self.email);
        let phone = clean_us_phone(&self.phone);
        if phone.is_none() {
            v.push("Please enter a valid U.S. phone number (10 digits).");
        }

        let focus_area = if self.focus_area.trim() == "Other" {
            self.focus_area_other.trim()
        } else {
            self.focus_area.trim()
        };
        if focus_area.is_empty() || (self.focus_area.trim() != "Other" && !FOCUS_AREAS.contains(&focus_area)) {
            v.push("TA Focus Area must be selected.");
        }
        if !TA_TYPES.contains(&self.ta_type.trim()) {
            v.push("TA Style must be selected.");
        }
        let due_date = date_cell::parse(&self.due_date);
        v.require_future(due_date, today, "Target Due Date");
        v.require(&self.description, "TA Description is required.");
        let priority = self.priority.parse::<Priority>();
        if priority.is_err() {
            v.push("Priority Status must be selected.");
        }

        v.into_result()?;

        Ok(TaRequest {
            jurisdiction: self.location.trim().to_string(),
            organization: self.organization.trim().to_string(),
            name: self.name.trim().to_string(),
            title: self.title.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: phone.unwrap_or_default(),
            focus_area: focus_area.to_string(),
            ta_type: self.ta_type.trim().to_string(),
            due_date,
            description: self.description.trim().to_string(),
            priority: priority.unwrap_or_default(),
            submit_date: Some(today),
            status: Status::Submitted,
            ..TaRequest::default()
        })
    }
}

/// Unassigned tickets in triage order: priority, then submit date, then due
/// date. Missing dates sort last.
pub fn unassigned_queue(requests: &[TaRequest]) -> Vec<&TaRequest> {
    let mut queue: Vec<&TaRequest> = requests
        .iter()
        .filter(|r| r.status == Status::Submitted)
        .collect();
    queue.sort_by_key(|r| {
        (
            r.priority,
            r.submit_date.is_none(),
            r.submit_date,
            r.due_date.is_none(),
            r.due_date,
        )
    });
    queue
}

pub fn find_mut<'a>(requests: &'a mut [TaRequest], ticket_id: &str) -> Option<&'a mut TaRequest> {
    requests.iter_mut().find(|r| r.ticket_id == ticket_id)
}
