//! Append-only interaction and delivery logs keyed by ticket id.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::sheet::{SheetRecord, date_cell};
use crate::validation::Violations;

/// Which log a [`LogEntry`] belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    Interaction,
    Delivery,
}

impl LogKind {
    pub fn worksheet(&self) -> &'static str {
        match self {
            LogKind::Interaction => crate::store::INTERACTION,
            LogKind::Delivery => crate::store::DELIVERY,
        }
    }

    pub fn types(&self) -> &'static [&'static str] {
        match self {
            LogKind::Interaction => &["Email", "Phone Call", "Virtual Meeting", "In-Person Meeting", "Other"],
            LogKind::Delivery => &["Training", "Resource/Tool", "Consultation", "Report", "Other"],
        }
    }
}

macro_rules! log_record {
    ($name:ident, $worksheet:expr, $type_col:literal) => {
        #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            #[serde(rename = "Ticket ID")]
            pub ticket_id: String,
            #[serde(rename = "Date", with = "date_cell")]
            pub date: Option<NaiveDate>,
            #[serde(rename = $type_col)]
            pub kind: String,
            #[serde(rename = "Summary")]
            pub summary: String,
            #[serde(rename = "Submitted By")]
            pub submitted_by: String,
        }

        impl SheetRecord for $name {
            const WORKSHEET: &'static str = $worksheet;
            const COLUMNS: &'static [&'static str] =
                &["Ticket ID", "Date", $type_col, "Summary", "Submitted By"];
        }

        impl From<LogEntry> for $name {
            fn from(e: LogEntry) -> Self {
                $name {
                    ticket_id: e.ticket_id,
                    date: e.date,
                    kind: e.kind,
                    summary: e.summary,
                    submitted_by: e.submitted_by,
                }
            }
        }
    };
}

log_record!(Interaction, crate::store::INTERACTION, "Interaction Type");
log_record!(Delivery, crate::store::DELIVERY, "Delivery Type");

/// Staff form input for either log
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogForm {
    pub ticket_id: String,
    pub date: String,
    pub kind: String,
    pub summary: String,
}

/// A validated log line, not yet tied to a worksheet
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub ticket_id: String,
    pub date: Option<NaiveDate>,
    pub kind: String,
    pub summary: String,
    pub submitted_by: String,
}

impl LogForm {
    /// Dates may not lie in the future; the ticket's existence is checked by
    /// the caller.
    pub fn validate(&self, log: LogKind, submitted_by: &str, today: NaiveDate) -> Result<LogEntry, Vec<String>> {
        let mut v = Violations::new();
        v.require(&self.ticket_id, "A ticket must be selected.");
        let date = date_cell::parse(&self.date);
        match date {
            None => v.push("Date is required."),
            Some(d) if d > today => v.push("Date cannot be in the future."),
            Some(_) => {}
        }
        if !log.types().contains(&self.kind.trim()) {
            v.push("Type must be selected.");
        }
        v.require(&self.summary, "Summary is required.");
        v.into_result()?;

        Ok(LogEntry {
            ticket_id: self.ticket_id.trim().to_string(),
            date,
            kind: self.kind.trim().to_string(),
            summary: self.summary.trim().to_string(),
            submitted_by: submitted_by.to_string(),
        })
    }
}
