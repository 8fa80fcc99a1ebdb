//! Travel authorization forms.
//!
//! A traveler submits an itemized multi-day estimate. The form is laid out as
//! a PDF, uploaded, and stored as one `Travel` row whose per-day columns hold
//! JSON-encoded lists. Two routed approvers sign off independently.

pub mod approval;
pub mod per_diem;
#[cfg(feature = "web")]
pub mod pdf;
pub mod report;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::sheet::{SheetRecord, date_cell};
use crate::validation::Violations;
use approval::{ApprovalSlot, ApprovalState, Approver, Decision};
use per_diem::{MealsProvided, breakdown_for, mileage_amount, per_diem, round_cents};

pub const TRAVEL_PREFIX: &str = "TR";

/// One day of the submitted form
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DayInput {
    pub date: String,
    pub mileage: f64,
    pub airfare: f64,
    pub lodging: f64,
    pub per_diem_rate: f64,
    pub breakfast: bool,
    pub lunch: bool,
    pub dinner: bool,
    pub other: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelForm {
    pub traveler_name: String,
    pub traveler_email: String,
    pub organization: String,
    pub purpose: String,
    pub destination: String,
    pub departure_date: String,
    pub return_date: String,
    pub days: Vec<DayInput>,
    pub signature: String,
}

/// A validated travel day with its computed amounts
#[derive(Clone, Debug, PartialEq)]
pub struct TravelDay {
    pub date: NaiveDate,
    pub miles: f64,
    pub airfare: f64,
    pub lodging: f64,
    pub per_diem_rate: f64,
    pub meals: MealsProvided,
    pub other: f64,
    pub first_or_last: bool,
}

impl TravelDay {
    pub fn mileage_amount(&self) -> f64 {
        mileage_amount(self.miles)
    }

    pub fn per_diem(&self) -> f64 {
        per_diem(self.per_diem_rate, self.meals, self.first_or_last)
    }

    pub fn total(&self) -> f64 {
        round_cents(self.mileage_amount() + self.airfare + self.lodging + self.per_diem() + self.other)
    }
}

/// A validated form
#[derive(Clone, Debug, PartialEq)]
pub struct TravelClaim {
    pub traveler_name: String,
    pub traveler_email: String,
    pub organization: String,
    pub purpose: String,
    pub destination: String,
    pub departure: NaiveDate,
    pub return_date: NaiveDate,
    pub days: Vec<TravelDay>,
    pub signature: String,
}

impl TravelClaim {
    pub fn total(&self) -> f64 {
        round_cents(self.days.iter().map(TravelDay::total).sum())
    }
}

fn amount_ok(v: &mut Violations, value: f64, label: &str, date: &str) {
    if !value.is_finite() || value < 0.0 {
        v.push(format!("{} on {} must be zero or more.", label, date));
    }
}

impl TravelForm {
    pub fn validate(&self) -> Result<TravelClaim, Vec<String>> {
        let mut v = Violations::new();
        v.require(&self.traveler_name, "Traveler name is required.");
        v.require_email(&self.traveler_email);
        v.require(&self.organization, "Organization is required.");
        v.require(&self.purpose, "Purpose of travel is required.");
        v.require(&self.destination, "Destination is required.");
        v.require(&self.signature, "Traveler signature is required.");

        let departure = date_cell::parse(&self.departure_date);
        let return_date = date_cell::parse(&self.return_date);
        match (departure, return_date) {
            (Some(d), Some(r)) if r < d => v.push("Return date must not be before departure date."),
            (Some(_), Some(_)) => {}
            _ => v.push("Departure and return dates are required."),
        }
        if self.days.is_empty() {
            v.push("At least one travel day is required.");
        }

        let mut days = Vec::with_capacity(self.days.len());
        for input in &self.days {
            let Some(date) = date_cell::parse(&input.date) else {
                v.push(format!("'{}' is not a valid travel date.", input.date));
                continue;
            };
            if let (Some(d), Some(r)) = (departure, return_date) {
                if date < d || date > r {
                    v.push(format!("{} is outside the travel dates.", input.date));
                }
            }
            if days.iter().any(|day: &TravelDay| day.date == date) {
                v.push(format!("{} is listed more than once.", input.date));
            }
            amount_ok(&mut v, input.mileage, "Mileage", &input.date);
            amount_ok(&mut v, input.airfare, "Airfare", &input.date);
            amount_ok(&mut v, input.lodging, "Lodging", &input.date);
            amount_ok(&mut v, input.other, "Other expenses", &input.date);
            if input.per_diem_rate != 0.0 && breakdown_for(input.per_diem_rate).is_none() {
                v.push(format!(
                    "Per diem rate {} on {} is not a GSA M&IE tier.",
                    input.per_diem_rate, input.date
                ));
            }
            days.push(TravelDay {
                date,
                miles: input.mileage,
                airfare: input.airfare,
                lodging: input.lodging,
                per_diem_rate: input.per_diem_rate,
                meals: MealsProvided {
                    breakfast: input.breakfast,
                    lunch: input.lunch,
                    dinner: input.dinner,
                },
                other: input.other,
                first_or_last: false,
            });
        }
        v.into_result()?;

        let (departure, return_date) = match (departure, return_date) {
            (Some(d), Some(r)) => (d, r),
            _ => return Err(vec!["Departure and return dates are required.".to_string()]),
        };
        days.sort_by_key(|d| d.date);
        for day in &mut days {
            day.first_or_last = day.date == departure || day.date == return_date;
        }

        Ok(TravelClaim {
            traveler_name: self.traveler_name.trim().to_string(),
            traveler_email: self.traveler_email.trim().to_string(),
            organization: self.organization.trim().to_string(),
            purpose: self.purpose.trim().to_string(),
            destination: self.destination.trim().to_string(),
            departure,
            return_date,
            days,
            signature: self.signature.trim().to_string(),
        })
    }
}

/// One row of the `Travel` worksheet
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelRecord {
    #[serde(rename = "Form ID")]
    pub form_id: String,
    #[serde(rename = "Traveler Name")]
    pub traveler_name: String,
    #[serde(rename = "Traveler Email")]
    pub traveler_email: String,
    #[serde(rename = "Organization")]
    pub organization: String,
    #[serde(rename = "Purpose")]
    pub purpose: String,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Departure Date", with = "date_cell")]
    pub departure: Option<NaiveDate>,
    #[serde(rename = "Return Date", with = "date_cell")]
    pub return_date: Option<NaiveDate>,
    #[serde(rename = "Dates")]
    pub dates: String,
    #[serde(rename = "Mileage")]
    pub mileage: String,
    #[serde(rename = "Airfare")]
    pub airfare: String,
    #[serde(rename = "Lodging")]
    pub lodging: String,
    #[serde(rename = "Per Diem Rate")]
    pub per_diem_rate: String,
    #[serde(rename = "Breakfast Provided")]
    pub breakfast: String,
    #[serde(rename = "Lunch Provided")]
    pub lunch: String,
    #[serde(rename = "Dinner Provided")]
    pub dinner: String,
    #[serde(rename = "Other Expenses")]
    pub other: String,
    #[serde(rename = "Total")]
    pub total: String,
    #[serde(rename = "Traveler Signature")]
    pub signature: String,
    #[serde(rename = "Form Link")]
    pub form_link: String,
    #[serde(rename = "Approver 1 Name")]
    pub approver1_name: String,
    #[serde(rename = "Approver 1 Email")]
    pub approver1_email: String,
    #[serde(rename = "Approver 1 Status")]
    pub approver1_status: String,
    #[serde(rename = "Approver 1 Signature")]
    pub approver1_signature: String,
    #[serde(rename = "Approver 1 Date", with = "date_cell")]
    pub approver1_date: Option<NaiveDate>,
    #[serde(rename = "Approver 2 Name")]
    pub approver2_name: String,
    #[serde(rename = "Approver 2 Email")]
    pub approver2_email: String,
    #[serde(rename = "Approver 2 Status")]
    pub approver2_status: String,
    #[serde(rename = "Approver 2 Signature")]
    pub approver2_signature: String,
    #[serde(rename = "Approver 2 Date", with = "date_cell")]
    pub approver2_date: Option<NaiveDate>,
    #[serde(rename = "Final Form Link")]
    pub final_form_link: String,
    #[serde(rename = "Submit Date", with = "date_cell")]
    pub submit_date: Option<NaiveDate>,
}

impl SheetRecord for TravelRecord {
    const WORKSHEET: &'static str = crate::store::TRAVEL;
    const COLUMNS: &'static [&'static str] = &[
        "Form ID",
        "Traveler Name",
        "Traveler Email",
        "Organization",
        "Purpose",
        "Destination",
        "Departure Date",
        "Return Date",
        "Dates",
        "Mileage",
        "Airfare",
        "Lodging",
        "Per Diem Rate",
        "Breakfast Provided",
        "Lunch Provided",
        "Dinner Provided",
        "Other Expenses",
        "Total",
        "Traveler Signature",
        "Form Link",
        "Approver 1 Name",
        "Approver 1 Email",
        "Approver 1 Status",
        "Approver 1 Signature",
        "Approver 1 Date",
        "Approver 2 Name",
        "Approver 2 Email",
        "Approver 2 Status",
        "Approver 2 Signature",
        "Approver 2 Date",
        "Final Form Link",
        "Submit Date",
    ];
}

fn json_list<T: Serialize>(values: impl Iterator<Item = T>) -> String {
    let values: Vec<T> = values.collect();
    serde_json::to_string(&values).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a JSON list cell; malformed cells read as empty
fn parse_list<T: DeserializeOwned>(cell: &str) -> Vec<T> {
    if cell.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(cell).unwrap_or_else(|e| {
        log::warn!("malformed list cell '{}': {}", cell, e);
        Vec::new()
    })
}

impl TravelRecord {
    pub fn new(form_id: &str, claim: &TravelClaim, approvers: [Approver; 2], today: NaiveDate) -> Self {
        let days = &claim.days;
        let mut record = TravelRecord {
            form_id: form_id.to_string(),
            traveler_name: claim.traveler_name.clone(),
            traveler_email: claim.traveler_email.clone(),
            organization: claim.organization.clone(),
            purpose: claim.purpose.clone(),
            destination: claim.destination.clone(),
            departure: Some(claim.departure),
            return_date: Some(claim.return_date),
            dates: json_list(days.iter().map(|d| d.date.format(date_cell::FORMAT).to_string())),
            mileage: json_list(days.iter().map(|d| d.miles)),
            airfare: json_list(days.iter().map(|d| d.airfare)),
            lodging: json_list(days.iter().map(|d| d.lodging)),
            per_diem_rate: json_list(days.iter().map(|d| d.per_diem_rate)),
            breakfast: json_list(days.iter().map(|d| d.meals.breakfast)),
            lunch: json_list(days.iter().map(|d| d.meals.lunch)),
            dinner: json_list(days.iter().map(|d| d.meals.dinner)),
            other: json_list(days.iter().map(|d| d.other)),
            total: format!("{:.2}", claim.total()),
            signature: claim.signature.clone(),
            submit_date: Some(today),
            ..TravelRecord::default()
        };
        record.set_approvals(&ApprovalState::new(approvers));
        record
    }

    /// Rebuild the claim from the stored lists. Short lists are padded with
    /// zeroes; rows without a readable date are dropped.
    pub fn claim(&self) -> TravelClaim {
        let dates: Vec<String> = parse_list(&self.dates);
        let miles: Vec<f64> = parse_list(&self.mileage);
        let airfare: Vec<f64> = parse_list(&self.airfare);
        let lodging: Vec<f64> = parse_list(&self.lodging);
        let rates: Vec<f64> = parse_list(&self.per_diem_rate);
        let breakfast: Vec<bool> = parse_list(&self.breakfast);
        let lunch: Vec<bool> = parse_list(&self.lunch);
        let dinner: Vec<bool> = parse_list(&self.dinner);
        let other: Vec<f64> = parse_list(&self.other);

        let departure = self.departure.unwrap_or_default();
        let return_date = self.return_date.unwrap_or(departure);
        let at = |v: &Vec<f64>, i: usize| v.get(i).copied().unwrap_or(0.0);
        let flag = |v: &Vec<bool>, i: usize| v.get(i).copied().unwrap_or(false);

        let days = dates
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| {
                let date = date_cell::parse(raw)?;
                Some(TravelDay {
                    date,
                    miles: at(&miles, i),
                    airfare: at(&airfare, i),
                    lodging: at(&lodging, i),
                    per_diem_rate: at(&rates, i),
                    meals: MealsProvided {
                        breakfast: flag(&breakfast, i),
                        lunch: flag(&lunch, i),
                        dinner: flag(&dinner, i),
                    },
                    other: at(&other, i),
                    first_or_last: date == departure || date == return_date,
                })
            })
            .collect();

        TravelClaim {
            traveler_name: self.traveler_name.clone(),
            traveler_email: self.traveler_email.clone(),
            organization: self.organization.clone(),
            purpose: self.purpose.clone(),
            destination: self.destination.clone(),
            departure,
            return_date,
            days,
            signature: self.signature.clone(),
        }
    }

    pub fn approvals(&self) -> ApprovalState {
        let slot = |name: &str, email: &str, status: &str, signature: &str, date: Option<NaiveDate>| ApprovalSlot {
            approver: Approver {
                name: name.to_string(),
                email: email.to_string(),
            },
            decision: Decision::parse(status),
            signature: signature.to_string(),
            date,
        };
        ApprovalState {
            slots: [
                slot(
                    &self.approver1_name,
                    &self.approver1_email,
                    &self.approver1_status,
                    &self.approver1_signature,
                    self.approver1_date,
                ),
                slot(
                    &self.approver2_name,
                    &self.approver2_email,
                    &self.approver2_status,
                    &self.approver2_signature,
                    self.approver2_date,
                ),
            ],
        }
    }

    pub fn set_approvals(&mut self, state: &ApprovalState) {
        let [a, b] = &state.slots;
        let status = |s: &ApprovalSlot| s.decision.map(|d| d.as_str().to_string()).unwrap_or_default();

        self.approver1_name = a.approver.name.clone();
        self.approver1_email = a.approver.email.clone();
        self.approver1_status = status(a);
        self.approver1_signature = a.signature.clone();
        self.approver1_date = a.date;

        self.approver2_name = b.approver.name.clone();
        self.approver2_email = b.approver.email.clone();
        self.approver2_status = status(b);
        self.approver2_signature = b.signature.clone();
        self.approver2_date = b.date;
    }
}
