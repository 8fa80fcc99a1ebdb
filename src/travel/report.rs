//! Page-independent layout of the travel authorization report.
//!
//! The report is a handful of string tables; the PDF renderer only has to
//! draw them. Expense tables are cut seven days wide.

use super::{TravelClaim, TravelDay};
use super::approval::{ApprovalState, Decision};
use crate::sheet::date_cell;

pub const DAYS_PER_TABLE: usize = 7;

#[derive(Clone, Debug, PartialEq)]
pub struct ReportTable {
    pub title: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SignatureLine {
    pub role: String,
    pub name: String,
    pub signature: String,
    pub date: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TravelReport {
    pub title: String,
    pub details: Vec<(String, String)>,
    pub tables: Vec<ReportTable>,
    pub grand_total: String,
    pub signatures: Vec<SignatureLine>,
}

fn money(v: f64) -> String {
    format!("${:.2}", v)
}

fn expense_row(label: &str, days: &[TravelDay], cell: impl Fn(&TravelDay) -> f64, as_money: bool) -> Vec<String> {
    let fmt = |v: f64| if as_money { money(v) } else { format!("{:.1}", v) };
    let mut row = vec![label.to_string()];
    let mut sum = 0.0;
    for d in days {
        let v = cell(d);
        sum += v;
        row.push(fmt(v));
    }
    row.push(fmt(sum));
    row
}

/// Lay out a claim. With `approvals`, signed approver lines are filled in;
/// unsigned ones stay blank.
pub fn layout(form_id: &str, claim: &TravelClaim, approvals: Option<&ApprovalState>) -> TravelReport {
    let details = vec![
        ("Form ID".to_string(), form_id.to_string()),
        ("Traveler".to_string(), claim.traveler_name.clone()),
        ("Email".to_string(), claim.traveler_email.clone()),
        ("Organization".to_string(), claim.organization.clone()),
        ("Destination".to_string(), claim.destination.clone()),
        ("Purpose".to_string(), claim.purpose.clone()),
        (
            "Travel Dates".to_string(),
            format!(
                "{} to {}",
                claim.departure.format(date_cell::FORMAT),
                claim.return_date.format(date_cell::FORMAT)
            ),
        ),
    ];

    let chunks = claim.days.chunks(DAYS_PER_TABLE);
    let count = chunks.len();
    let tables = chunks
        .enumerate()
        .map(|(i, days)| {
            let mut header = vec!["Item".to_string()];
            header.extend(days.iter().map(|d| d.date.format("%a %m/%d").to_string()));
            header.push("Subtotal".to_string());

            let mut meals = vec!["Meals Provided".to_string()];
            meals.extend(days.iter().map(|d| d.meals.letters()));
            meals.push(String::new());

            let mut rate = vec!["M&IE Rate".to_string()];
            rate.extend(days.iter().map(|d| money(d.per_diem_rate)));
            rate.push(String::new());

            let rows = vec![
                expense_row("Mileage (mi)", days, |d| d.miles, false),
                expense_row("Mileage", days, TravelDay::mileage_amount, true),
                expense_row("Airfare", days, |d| d.airfare, true),
                expense_row("Lodging", days, |d| d.lodging, true),
                rate,
                meals,
                expense_row("Per Diem", days, TravelDay::per_diem, true),
                expense_row("Other", days, |d| d.other, true),
                expense_row("Daily Total", days, TravelDay::total, true),
            ];

            ReportTable {
                title: if count > 1 {
                    format!("Estimated Expenses ({} of {})", i + 1, count)
                } else {
                    "Estimated Expenses".to_string()
                },
                header,
                rows,
            }
        })
        .collect();

    let mut signatures = vec![SignatureLine {
        role: "Traveler".to_string(),
        name: claim.traveler_name.clone(),
        signature: claim.signature.clone(),
        date: String::new(),
    }];
    if let Some(state) = approvals {
        for (i, slot) in state.slots.iter().enumerate() {
            let signed = slot.decision == Some(Decision::Approve);
            signatures.push(SignatureLine {
                role: format!("Approver {}", i + 1),
                name: slot.approver.name.clone(),
                signature: if signed { slot.signature.clone() } else { String::new() },
                date: match (signed, slot.date) {
                    (true, Some(d)) => d.format(date_cell::FORMAT).to_string(),
                    _ => String::new(),
                },
            });
        }
    }

    TravelReport {
        title: "Travel Authorization Request".to_string(),
        details,
        tables,
        grand_total: money(claim.total()),
        signatures,
    }
}
