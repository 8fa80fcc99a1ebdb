//! Notification emails.

use crate::ga::GaRequest;
use crate::login::User;
use crate::mailer::Email;
use crate::sheet::date_cell;
use crate::ticket::TaRequest;
use crate::travel::TravelRecord;
use crate::travel::approval::Approver;

/// Signature block shared by every email
pub struct Footer<'a> {
    pub public_url: &'a str,
    pub contact_email: Option<&'a str>,
}

impl Footer<'_> {
    fn render(&self, action: &str) -> String {
        let mut s = format!("\n{} via the GU-TAP System: {}/\n", action, self.public_url);
        if let Some(contact) = self.contact_email {
            s.push_str(&format!("Please contact {} for any questions or concerns.\n", contact));
        }
        s.push_str("\nBest,\nGU-TAP System\n");
        s
    }
}

fn day(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format(date_cell::FORMAT).to_string())
        .unwrap_or_default()
}

fn or_none(s: &str) -> &str {
    if s.trim().is_empty() { "None" } else { s }
}

pub fn new_request_to_coordinator(coordinator: &User, r: &TaRequest, footer: &Footer) -> Email {
    Email::new(
        &coordinator.email,
        format!("New TA Request Submitted: {}", r.ticket_id),
        format!(
            "Hi {},\n\nA new Technical Assistance request has been submitted:\n\n\
             Ticket ID: {}\nJurisdiction: {}\nOrganization: {}\nName: {}\n\
             Description: {}\nPriority: {}\nAttachments: {}\n{}",
            coordinator.name,
            r.ticket_id,
            r.jurisdiction,
            r.organization,
            r.name,
            r.description,
            r.priority,
            or_none(&r.document),
            footer.render("Please review and assign this request")
        ),
    )
}

pub fn request_received(r: &TaRequest, footer: &Footer) -> Email {
    Email::new(
        &r.email,
        format!("Your TA Request ({}) has been received", r.ticket_id),
        format!(
            "Hi {},\n\nThank you for submitting your Technical Assistance request.\n\n\
             Here is a summary of your submission:\n\
             - Ticket ID: {}\n- Jurisdiction: {}\n- Organization: {}\n- Name: {}\n\
             - Title/Position: {}\n- Email Address: {}\n- Phone Number: {}\n\
             - Focus Area: {}\n- TA Type: {}\n- Targeted Due Date: {}\n\
             - Priority: {}\n- Description: {}\n\n\
             A TA Coordinator will review your request and assign a coach within 2-3 business days.\n{}",
            r.name,
            r.ticket_id,
            r.jurisdiction,
            r.organization,
            r.name,
            r.title,
            r.email,
            r.phone,
            r.focus_area,
            r.ta_type,
            day(r.due_date),
            r.priority,
            r.description,
            footer.render("You can follow up")
        ),
    )
}

/// Sent to the coach on assignment and on transfer
pub fn assigned_to_coach(coach: &str, coach_email: &str, r: &TaRequest, footer: &Footer) -> Email {
    Email::new(
        coach_email,
        format!("You have been assigned a new TA request: {}", r.ticket_id),
        format!(
            "Hi {},\n\nYou have been assigned as the coach for the following Technical Assistance request:\n\n\
             Ticket ID: {}\nJurisdiction: {}\nOrganization: {}\nName: {}\nDescription: {}\n\
             Priority: {}\nTargeted Due Date: {}\nAttachments: {}\n{}",
            coach,
            r.ticket_id,
            r.jurisdiction,
            r.organization,
            r.name,
            r.description,
            r.priority,
            day(r.due_date),
            or_none(&r.document),
            footer.render("Please view and manage this request")
        ),
    )
}

pub fn request_completed(r: &TaRequest, footer: &Footer) -> Email {
    Email::new(
        &r.email,
        format!("Your TA Request ({}) has been completed", r.ticket_id),
        format!(
            "Hi {},\n\nYour Technical Assistance request {} has been marked as completed by {} on {}.\n{}",
            r.name,
            r.ticket_id,
            r.coach,
            day(r.close_date),
            footer.render("You can submit a new request")
        ),
    )
}

pub fn ga_request_to_assistant(name: &str, email: &str, g: &GaRequest, footer: &Footer) -> Email {
    Email::new(
        email,
        format!("New student support request: {}", g.request_id),
        format!(
            "Hi {},\n\n{} has requested student support and you are available:\n\n\
             Request ID: {}\nDate: {}\nTime: {} - {}\nDescription: {}\n{}",
            name,
            g.requester,
            g.request_id,
            day(g.date),
            g.start_time,
            g.end_time,
            g.description,
            footer.render("Please view and complete this request")
        ),
    )
}

pub fn travel_to_approver(approver: &Approver, t: &TravelRecord, footer: &Footer) -> Email {
    Email::new(
        &approver.email,
        format!("Travel authorization awaiting your approval: {}", t.form_id),
        format!(
            "Hi {},\n\n{} has submitted a travel authorization form for your approval.\n\n\
             Form ID: {}\nDestination: {}\nDates: {} to {}\nEstimated Total: ${}\nForm: {}\n{}",
            approver.name,
            t.traveler_name,
            t.form_id,
            t.destination,
            day(t.departure),
            day(t.return_date),
            t.total,
            or_none(&t.form_link),
            footer.render("Please approve or reject this form")
        ),
    )
}

pub fn travel_approved(t: &TravelRecord, footer: &Footer) -> Email {
    Email::new(
        &t.traveler_email,
        format!("Travel authorization approved: {}", t.form_id),
        format!(
            "Hi {},\n\nYour travel authorization {} to {} has been approved by {} and {}.\n\n\
             Signed form: {}\n{}",
            t.traveler_name,
            t.form_id,
            t.destination,
            t.approver1_name,
            t.approver2_name,
            or_none(&t.final_form_link),
            footer.render("You can review your forms")
        ),
    )
}

pub fn travel_rejected(t: &TravelRecord, approver: &Approver, footer: &Footer) -> Email {
    Email::new(
        &t.traveler_email,
        format!("Travel authorization rejected: {}", t.form_id),
        format!(
            "Hi {},\n\nYour travel authorization {} to {} was rejected by {}.\n\
             Please revise the form and submit it again.\n{}",
            t.traveler_name,
            t.form_id,
            t.destination,
            approver.name,
            footer.render("You can submit a new form")
        ),
    )
}
