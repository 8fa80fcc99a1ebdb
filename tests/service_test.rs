use chrono::NaiveDate;
use gutap::error::AppError;
use gutap::files::{FileError, FileStore, MemoryFileStore};
use gutap::ga::{Assistant, AvailabilityTable, GaForm, GaStatus};
use gutap::login::{Role, User, UserDirectory};
use gutap::logs::LogForm;
use gutap::mailer::{Email, MailError, Mailer, OutboxMailer};
use gutap::service::{Attachment, Settings, Tap};
use gutap::store::{self, MemoryWorkbook, SheetStore};
use gutap::ticket::{CommentKind, RequestForm, Status};
use gutap::travel::approval::{ApprovalRouting, Approver, Decision};
use gutap::travel::{DayInput, TravelForm};
use gutap::dashboard::RequestFilter;
use std::sync::Arc;
use std::time::Duration;

fn today() -> NaiveDate {
    // a Monday
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

fn user(email: &str, name: &str, roles: &[Role]) -> User {
    User {
        email: email.into(),
        name: name.into(),
        roles: roles.to_vec(),
        password_hash: String::new(),
    }
}

fn approver(name: &str, email: &str) -> Approver {
    Approver {
        name: name.into(),
        email: email.into(),
    }
}

struct Harness {
    tap: Tap,
    sheets: Arc<MemoryWorkbook>,
    mail: Arc<OutboxMailer>,
    files: Arc<MemoryFileStore>,
}

fn harness() -> Harness {
    let sheets = Arc::new(MemoryWorkbook::new());
    let mail = Arc::new(OutboxMailer::new());
    let files = Arc::new(MemoryFileStore::new());
    let tap = build(sheets.clone(), mail.clone(), files.clone());
    Harness { tap, sheets, mail, files }
}

fn build(sheets: Arc<MemoryWorkbook>, mailer: Arc<dyn Mailer>, files: Arc<dyn FileStore>) -> Tap {
    let users = UserDirectory::in_memory(vec![
        user("casey@example.edu", "Casey", &[Role::Coordinator]),
        user("sam@example.edu", "Sam", &[Role::Staff]),
        user("alex@example.edu", "Alex", &[Role::Staff, Role::Coordinator]),
        user("riley@example.edu", "Riley", &[Role::ResearchAssistant]),
    ]);
    let routing = ApprovalRouting {
        rules: Vec::new(),
        default: [
            approver("Jordan", "jordan@example.edu"),
            approver("Morgan", "morgan@example.edu"),
        ],
        out_of_office: Vec::new(),
    };
    let availability = AvailabilityTable {
        assistants: vec![Assistant {
            name: "Riley".into(),
            email: "riley@example.edu".into(),
            availability: [("Monday".to_string(), "9am - 12pm".to_string())].into_iter().collect(),
        }],
    };
    Tap::new(
        sheets,
        Duration::from_secs(60),
        files,
        mailer,
        Arc::new(users),
        routing,
        availability,
        Settings::default(),
    )
    .with_today(today())
}

fn request_form() -> RequestForm {
    RequestForm {
        name: "Jane Doe".into(),
        title: "Program Manager".into(),
        organization: "HRSA".into(),
        location: "Cook Co. - Illinois".into(),
        email: "jane.doe@example.org".into(),
        phone: "2025550123".into(),
        focus_area: "Housing".into(),
        ta_type: "Virtual".into(),
        due_date: "2024-06-20".into(),
        description: "Referral workflow".into(),
        priority: "Normal".into(),
        ..RequestForm::default()
    }
}

fn travel_form() -> TravelForm {
    TravelForm {
        traveler_name: "Pat Kim".into(),
        traveler_email: "pat@example.edu".into(),
        organization: "GU".into(),
        purpose: "Site visit".into(),
        destination: "Atlanta, GA".into(),
        departure_date: "2024-06-10".into(),
        return_date: "2024-06-11".into(),
        days: vec![
            DayInput {
                date: "2024-06-10".into(),
                lodging: 120.0,
                per_diem_rate: 68.0,
                ..DayInput::default()
            },
            DayInput {
                date: "2024-06-11".into(),
                per_diem_rate: 68.0,
                ..DayInput::default()
            },
        ],
        signature: "Pat Kim".into(),
    }
}

struct BrokenMailer;

impl Mailer for BrokenMailer {
    fn send(&self, _email: &Email) -> Result<(), MailError> {
        Err(MailError::Address("nowhere".into()))
    }
}

struct BrokenFiles;

impl FileStore for BrokenFiles {
    fn upload(&self, name: &str, _content_type: &str, _bytes: &[u8]) -> Result<String, FileError> {
        Err(FileError::BadName(name.into()))
    }
}

#[test]
fn submit_allocates_ids_uploads_and_notifies() {
    let h = harness();
    let attachment = Attachment {
        filename: "plan.pdf".into(),
        content_type: "application/pdf".into(),
        bytes: b"%PDF-1.4".to_vec(),
    };

    let first = h.tap.submit_request(&request_form(), &[attachment]).unwrap();
    assert!(first.warnings.is_empty());
    assert_eq!(first.value.ticket_id, "GU0001");
    assert_eq!(first.value.document, "memory://GU0001_plan.pdf");
    assert_eq!(h.files.names(), ["GU0001_plan.pdf"]);

    let second = h.tap.submit_request(&request_form(), &[]).unwrap();
    assert_eq!(second.value.ticket_id, "GU0002");
    assert!(second.value.document.is_empty());

    let stored = h.sheets.read(store::MAIN).unwrap();
    assert_eq!(stored.len(), 2);

    // two coordinators plus the requester, per submission
    let sent = h.mail.sent();
    assert_eq!(sent.len(), 6);
    assert!(sent.iter().any(|e| e.to == "casey@example.edu" && e.subject.contains("GU0001")));
    assert!(sent.iter().any(|e| e.to == "alex@example.edu"));
    assert!(sent.iter().any(|e| e.to == "jane.doe@example.org" && e.subject.contains("received")));
}

#[test]
fn invalid_requests_are_not_stored() {
    let h = harness();
    let mut form = request_form();
    form.email = "nope".into();

    match h.tap.submit_request(&form, &[]) {
        Err(AppError::Validation(errors)) => {
            assert_eq!(errors, vec!["Please enter a valid email address."])
        }
        other => panic!("expected a validation error, got {:?}", other.map(|o| o.value)),
    }
    assert!(h.sheets.read(store::MAIN).unwrap().is_empty());
    assert!(h.mail.sent().is_empty());
}

#[test]
fn mail_failures_become_warnings() {
    let sheets = Arc::new(MemoryWorkbook::new());
    let tap = build(sheets.clone(), Arc::new(BrokenMailer), Arc::new(MemoryFileStore::new()));

    let outcome = tap.submit_request(&request_form(), &[]).unwrap();
    assert_eq!(outcome.warnings.len(), 3);
    assert!(outcome.warnings.contains(&"Email to jane.doe@example.org could not be sent.".to_string()));
    assert_eq!(sheets.read(store::MAIN).unwrap().len(), 1);
}

#[test]
fn failed_attachment_uploads_do_not_block_the_ticket() {
    let sheets = Arc::new(MemoryWorkbook::new());
    let tap = build(sheets.clone(), Arc::new(OutboxMailer::new()), Arc::new(BrokenFiles));
    let attachment = Attachment {
        filename: "plan.pdf".into(),
        content_type: "application/pdf".into(),
        bytes: vec![1, 2, 3],
    };

    let outcome = tap.submit_request(&request_form(), &[attachment]).unwrap();
    assert_eq!(outcome.warnings, vec!["GU0001_plan.pdf could not be uploaded."]);
    assert!(outcome.value.document.is_empty());
}

#[test]
fn ticket_lifecycle_through_the_service() {
    let h = harness();
    h.tap.submit_request(&request_form(), &[]).unwrap();

    let assigned = h.tap.assign("GU0001", "Sam", "Casey").unwrap();
    assert!(assigned.warnings.is_empty());
    assert_eq!(assigned.value.status, Status::InProgress);
    assert!(h.mail.sent().iter().any(|e| e.to == "sam@example.edu"));

    let transferred = h.tap.transfer("GU0001", "Alex", "Casey", "workload").unwrap();
    assert_eq!(transferred.value.coach, "Alex");
    assert!(transferred.value.transfer_history.contains("Sam -> Alex by Casey: workload"));

    let err = h.tap.complete("GU0001", Some("Sam")).unwrap_err();
    assert!(matches!(err, AppError::Transition(_)));
    assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);

    h.tap.add_comment("GU0001", CommentKind::Staff, "Alex", "sent resources").unwrap();
    let done = h.tap.complete("GU0001", Some("Alex")).unwrap();
    assert_eq!(done.value.status, Status::Completed);
    assert_eq!(done.value.close_date, Some(today()));
    assert!(h.mail.sent().iter().any(|e| e.subject.contains("has been completed")));
    let completed = h.tap.completed().unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].actual_days, Some(0));

    let stored = &h.tap.requests().unwrap()[0];
    assert_eq!(stored.staff_comment, "[2024-06-03] Alex: sent resources");
    assert_eq!(stored.status, Status::Completed);
}

#[test]
fn assigning_twice_conflicts_and_unknown_tickets_are_not_found() {
    let h = harness();
    h.tap.submit_request(&request_form(), &[]).unwrap();
    h.tap.assign("GU0001", "Sam", "Casey").unwrap();

    assert!(matches!(h.tap.assign("GU0001", "Alex", "Casey"), Err(AppError::Transition(_))));
    assert!(matches!(h.tap.assign("GU0404", "Sam", "Casey"), Err(AppError::NotFound(_))));
}

#[test]
fn unknown_coach_is_assigned_with_a_warning() {
    let h = harness();
    h.tap.submit_request(&request_form(), &[]).unwrap();
    let outcome = h.tap.assign("GU0001", "Nobody", "Casey").unwrap();
    assert_eq!(outcome.warnings, vec!["No email on file for Nobody."]);
    assert_eq!(outcome.value.coach, "Nobody");
}

#[test]
fn rewrites_keep_columns_added_by_hand() {
    let h = harness();
    h.tap.submit_request(&request_form(), &[]).unwrap();

    let mut table = h.sheets.read(store::MAIN).unwrap();
    table.headers.push("Region".into());
    table.rows[0].push("Midwest".into());
    h.sheets.overwrite(store::MAIN, &table).unwrap();

    // bypass the read cache so the hand edit is seen
    let fresh = build(h.sheets.clone(), h.mail.clone(), h.files.clone());
    fresh.assign("GU0001", "Sam", "Casey").unwrap();

    let table = h.sheets.read(store::MAIN).unwrap();
    let region = table.column("Region").unwrap();
    assert_eq!(table.rows[0][region], "Midwest");
}

#[test]
fn queues_and_filters() {
    let h = harness();
    for priority in ["Low", "Critical", "Normal"] {
        let mut form = request_form();
        form.priority = priority.into();
        h.tap.submit_request(&form, &[]).unwrap();
    }
    h.tap.assign("GU0003", "Sam", "Casey").unwrap();

    let queue: Vec<String> = h.tap.unassigned().unwrap().into_iter().map(|r| r.ticket_id).collect();
    assert_eq!(queue, ["GU0002", "GU0001"]);

    let filter = RequestFilter {
        coach: Some("Sam".into()),
        ..RequestFilter::default()
    };
    assert_eq!(h.tap.list_requests(&filter).unwrap().len(), 1);
    assert_eq!(h.tap.in_progress().unwrap().len(), 1);
    assert!(h.tap.completed().unwrap().is_empty());

    let metrics = h.tap.coordinator_metrics().unwrap();
    assert_eq!(metrics.total, 3);
    assert_eq!(metrics.unassigned, 2);
    assert_eq!(metrics.by_coach.get("Sam"), Some(&1));
    assert_eq!(metrics.due_soon_by_coach.get("Sam"), Some(&1));
    assert_eq!(metrics.submitted_past_week, 3);

    let staff = h.tap.staff_metrics("Sam").unwrap();
    assert_eq!(staff.in_progress, 1);
    assert_eq!(staff.newly_assigned, 1);

    assert_eq!(h.tap.coaches(), ["Sam", "Alex"]);
    assert_eq!(h.tap.next_id(store::MAIN).unwrap(), "GU0004");
}

#[test]
fn logs_need_an_existing_ticket() {
    let h = harness();
    h.tap.submit_request(&request_form(), &[]).unwrap();
    let form = LogForm {
        ticket_id: "GU0001".into(),
        date: "2024-06-03".into(),
        kind: "Phone Call".into(),
        summary: "Intro call".into(),
    };

    h.tap.log_interaction(&form, "Sam").unwrap();
    let missing = LogForm {
        ticket_id: "GU0099".into(),
        ..form.clone()
    };
    assert!(matches!(h.tap.log_interaction(&missing, "Sam"), Err(AppError::NotFound(_))));

    let delivery = LogForm {
        kind: "Training".into(),
        ..form
    };
    h.tap.log_delivery(&delivery, "Sam").unwrap();

    let interactions = h.tap.interactions("GU0001").unwrap();
    assert_eq!(interactions.len(), 1);
    assert_eq!(interactions[0].submitted_by, "Sam");
    assert_eq!(h.tap.deliveries("GU0001").unwrap()[0].kind, "Training");
}

#[test]
fn ga_requests_go_to_available_assistants() {
    let h = harness();
    let form = GaForm {
        date: "2024-06-10".into(),
        start_time: "10:00".into(),
        end_time: "11:00".into(),
        description: "Survey data entry".into(),
    };

    let outcome = h.tap.submit_ga_request(&form, "Casey", "casey@example.edu").unwrap();
    assert_eq!(outcome.value.request_id, "GA0001");
    assert_eq!(outcome.value.matched, "Riley");
    assert!(h.mail.sent().iter().any(|e| e.to == "riley@example.edu"));
    assert_eq!(h.tap.ga_requests_for("Riley").unwrap().len(), 1);

    assert!(matches!(
        h.tap.complete_ga_request("GA0001", "Sam"),
        Err(AppError::Forbidden(_))
    ));
    let done = h.tap.complete_ga_request("GA0001", "Riley").unwrap();
    assert_eq!(done.status, GaStatus::Completed);
    assert_eq!(done.completed_by, "Riley");
    assert!(h.tap.ga_requests_for("Riley").unwrap().is_empty());
    assert_eq!(h.tap.ga_requests_by("CASEY@example.edu").unwrap().len(), 1);
}

#[test]
fn unmatched_ga_requests_are_kept_with_a_warning() {
    let h = harness();
    let form = GaForm {
        date: "2024-06-11".into(),
        start_time: "10:00".into(),
        end_time: "11:00".into(),
        description: "Tuesday help".into(),
    };
    let outcome = h.tap.submit_ga_request(&form, "Casey", "casey@example.edu").unwrap();
    assert_eq!(outcome.warnings, vec!["No research assistant is available at that time."]);
    assert!(outcome.value.matched.is_empty());
    assert_eq!(h.sheets.read(store::GA_SUPPORT).unwrap().len(), 1);
}

#[test]
fn travel_needs_both_approvals() {
    let h = harness();
    let submitted = h.tap.submit_travel(&travel_form()).unwrap();
    let form_id = submitted.value.form_id.clone();
    assert_eq!(form_id, "TR0001");
    assert_eq!(submitted.value.form_link, "memory://TR0001_travel_authorization.pdf");
    assert_eq!(submitted.value.total, "222.00");
    let to: Vec<String> = h.mail.sent().into_iter().map(|e| e.to).collect();
    assert_eq!(to, ["jordan@example.edu", "morgan@example.edu"]);

    assert_eq!(h.tap.pending_travel_for("jordan@example.edu").unwrap().len(), 1);
    let first = h.tap.decide_travel(&form_id, "jordan@example.edu", Decision::Approve, "Jordan").unwrap();
    assert!(first.value.final_form_link.is_empty());
    assert!(h.tap.pending_travel_for("jordan@example.edu").unwrap().is_empty());

    let second = h.tap.decide_travel(&form_id, "morgan@example.edu", Decision::Approve, "Morgan").unwrap();
    assert_eq!(second.value.final_form_link, "memory://TR0001_travel_authorization_signed.pdf");
    let (content_type, bytes) = h.files.get("TR0001_travel_authorization_signed.pdf").unwrap();
    assert_eq!(content_type, "application/pdf");
    assert!(bytes.starts_with(b"%PDF"));
    assert!(h.mail.sent().iter().any(|e| e.to == "pat@example.edu" && e.subject.contains("approved")));

    let again = h.tap.decide_travel(&form_id, "morgan@example.edu", Decision::Reject, "Morgan");
    assert!(matches!(again, Err(AppError::Approval(_))));
}

#[test]
fn travel_rejection_and_strangers() {
    let h = harness();
    let form_id = h.tap.submit_travel(&travel_form()).unwrap().value.form_id;

    let err = h.tap.decide_travel(&form_id, "pat@example.edu", Decision::Approve, "Pat").unwrap_err();
    assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);

    let rejected = h.tap.decide_travel(&form_id, "morgan@example.edu", Decision::Reject, "Morgan").unwrap();
    assert_eq!(rejected.value.approver2_status, "reject");
    assert!(h.mail.sent().iter().any(|e| e.to == "pat@example.edu" && e.subject.contains("rejected")));
    assert_eq!(h.tap.travel_form(&form_id).unwrap().approver2_status, "reject");
    assert!(h.tap.pending_travel_for("jordan@example.edu").unwrap().is_empty());
    let late = h.tap.decide_travel(&form_id, "jordan@example.edu", Decision::Approve, "Jordan").unwrap_err();
    assert_eq!(late.status(), axum::http::StatusCode::CONFLICT);
    assert!(matches!(h.tap.travel_form("TR0404"), Err(AppError::NotFound(_))));
}

#[test]
fn travel_pdf_upload_failure_is_an_error() {
    let sheets = Arc::new(MemoryWorkbook::new());
    let tap = build(sheets.clone(), Arc::new(OutboxMailer::new()), Arc::new(BrokenFiles));
    assert!(matches!(tap.submit_travel(&travel_form()), Err(AppError::File(_))));
    assert!(sheets.read(store::TRAVEL).unwrap().is_empty());
}

#[test]
fn exports_known_worksheets() {
    let h = harness();
    h.tap.submit_request(&request_form(), &[]).unwrap();

    let csv = h.tap.export(store::MAIN, gutap::downloader::ExportFormat::Csv).unwrap();
    let csv = String::from_utf8(csv).unwrap();
    assert!(csv.starts_with("Ticket ID,Jurisdiction,"));
    assert!(csv.contains("GU0001"));

    let xlsx = h.tap.export(store::MAIN, gutap::downloader::ExportFormat::Xlsx).unwrap();
    assert!(xlsx.starts_with(b"PK"));

    assert!(matches!(
        h.tap.export("Secrets", gutap::downloader::ExportFormat::Csv),
        Err(AppError::NotFound(_))
    ));
}
