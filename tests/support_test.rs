use chrono::NaiveDate;
use gutap::config::StoreKind;
use gutap::downloader::{ExportFormat, export, to_csv};
use gutap::files::{FileStore, LocalFileStore, MemoryFileStore};
use gutap::login::{Role, User, UserDirectory, hash_password, verify_password};
use gutap::mailer::{Email, MailError, Mailer, OutboxMailer, deliver_all, generate_password};
use gutap::notify::{self, Footer};
use gutap::sheet::Table;
use gutap::ticket::TaRequest;
use std::time::Duration;

struct Picky;

impl Mailer for Picky {
    fn send(&self, email: &Email) -> Result<(), MailError> {
        if email.to.ends_with("@example.edu") {
            Ok(())
        } else {
            Err(MailError::Address(email.to.clone()))
        }
    }
}

#[test]
fn local_files_get_public_links() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalFileStore::new(dir.path().join("uploads"), "https://tap.example.edu/").unwrap();

    let link = store.upload("GU0001_site plan.pdf", "application/pdf", b"%PDF").unwrap();
    assert_eq!(link, "https://tap.example.edu/files/GU0001_site_plan.pdf");
    let saved = std::fs::read(dir.path().join("uploads").join("GU0001_site_plan.pdf")).unwrap();
    assert_eq!(saved, b"%PDF");

    assert!(store.upload("...", "text/plain", b"x").is_err());
}

#[test]
fn memory_files_are_kept_by_name() {
    let store = MemoryFileStore::new();
    assert_eq!(store.upload("b.txt", "text/plain", b"2").unwrap(), "memory://b.txt");
    store.upload("a.txt", "text/plain", b"1").unwrap();
    assert_eq!(store.names(), ["a.txt", "b.txt"]);
    assert_eq!(store.get("a.txt"), Some(("text/plain".to_string(), b"1".to_vec())));
    assert_eq!(store.get("c.txt"), None);
}

#[test]
fn delivery_keeps_going_after_a_failure() {
    let emails = vec![
        Email::new("a@example.org", "s", "b"),
        Email::new("b@example.edu", "s", "b"),
        Email::new("c@example.org", "s", "b"),
    ];
    let warnings = deliver_all(&Picky, &emails, Duration::ZERO);
    assert_eq!(
        warnings,
        vec![
            "Email to a@example.org could not be sent.",
            "Email to c@example.org could not be sent.",
        ]
    );

    let outbox = OutboxMailer::new();
    assert!(deliver_all(&outbox, &emails, Duration::from_millis(1)).is_empty());
    assert_eq!(outbox.sent(), emails);
}

#[test]
fn generated_passwords() {
    let a = generate_password();
    let b = generate_password();
    assert_eq!(a.len(), 12);
    assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_ne!(a, b);
}

#[test]
fn passwords_hash_and_verify() {
    let hash = hash_password("correct horse").unwrap();
    assert_ne!(hash, "correct horse");
    assert!(verify_password("correct horse", &hash));
    assert!(!verify_password("wrong", &hash));
    assert!(!verify_password("correct horse", "not a hash"));
}

#[test]
fn user_directory_round_trips_through_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db").join("users.json");

    let users = UserDirectory::load(&path).unwrap();
    assert!(users.all().is_empty());
    users.add_user("sam@example.edu", "Sam", &[Role::Staff], "pw1").unwrap();
    assert!(users.add_user("SAM@example.edu", "Sam", &[Role::Staff], "pw").is_err());
    assert!(users.add_user("not-an-email", "X", &[Role::Staff], "pw").is_err());

    let reloaded = UserDirectory::load(&path).unwrap();
    assert!(reloaded.verify("sam@example.edu", "pw1", Role::Staff).is_some());
    assert!(reloaded.verify("sam@example.edu", "pw1", Role::Coordinator).is_none());
    assert_eq!(reloaded.staff_email("Sam").as_deref(), Some("sam@example.edu"));

    reloaded.change_password("sam@example.edu", "pw1", "pw2").unwrap();
    assert!(reloaded.change_password("sam@example.edu", "pw1", "pw3").is_err());
    assert!(reloaded.verify("sam@example.edu", "pw2", Role::Staff).is_some());
}

#[test]
fn failed_user_saves_leave_the_directory_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("users.json");
    let users = UserDirectory::load(&path).unwrap();
    users.add_user("sam@example.edu", "Sam", &[Role::Staff], "pw1").unwrap();

    // a directory in place of the users file makes every save fail
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    assert!(users.add_user("alex@example.edu", "Alex", &[Role::Staff], "pw").is_err());
    assert!(users.find("alex@example.edu").is_none());
    assert_eq!(users.all().len(), 1);

    assert!(users.change_password("sam@example.edu", "pw1", "pw2").is_err());
    assert!(users.verify("sam@example.edu", "pw1", Role::Staff).is_some());
    assert!(users.verify("sam@example.edu", "pw2", Role::Staff).is_none());
}

#[test]
fn roles_parse_from_slugs_and_labels() {
    assert_eq!(Role::parse("assistant"), Some(Role::ResearchAssistant));
    assert_eq!(Role::parse("Assignee/Staff"), Some(Role::Staff));
    assert_eq!(Role::parse("admin"), None);
    let staff: Role = serde_json::from_str(r#""Staff""#).unwrap();
    assert_eq!(staff, Role::Staff);
    assert_eq!(Role::Coordinator.home(), "/coordinator");
}

#[test]
fn export_formats() {
    assert_eq!(ExportFormat::parse("report.XLSX"), Some(ExportFormat::Xlsx));
    assert_eq!(ExportFormat::parse("csv"), Some(ExportFormat::Csv));
    assert_eq!(ExportFormat::parse("pdf"), None);

    let mut table = Table::new(&["Ticket ID", "Summary"]);
    table.rows.push(vec!["GU0001".into(), "said \"hi\"\nthen left".into()]);
    assert_eq!(
        to_csv(&table),
        "Ticket ID,Summary\nGU0001,\"said \"\"hi\"\"\nthen left\"\n"
    );
    let mut crlf = Table::new(&["Summary"]);
    crlf.rows.push(vec!["line one\r".into()]);
    assert_eq!(to_csv(&crlf), "Summary\n\"line one\r\"\n");
    let xlsx = export(&table, "Main", ExportFormat::Xlsx).unwrap();
    assert!(xlsx.starts_with(b"PK"));
}

#[test]
fn store_kind_from_env_values() {
    assert_eq!(" Memory ".parse::<StoreKind>().unwrap(), StoreKind::Memory);
    assert_eq!("local".parse::<StoreKind>().unwrap(), StoreKind::Local);
    assert!("sheets".parse::<StoreKind>().is_err());
}

#[test]
fn notification_texts() {
    let footer = Footer {
        public_url: "https://tap.example.edu",
        contact_email: Some("help@example.edu"),
    };
    let coordinator = User {
        email: "casey@example.edu".into(),
        name: "Casey".into(),
        roles: vec![Role::Coordinator],
        password_hash: String::new(),
    };
    let request = TaRequest {
        ticket_id: "GU0007".into(),
        name: "Jane Doe".into(),
        email: "jane@example.org".into(),
        coach: "Sam".into(),
        close_date: NaiveDate::from_ymd_opt(2024, 6, 3),
        ..TaRequest::default()
    };

    let email = notify::new_request_to_coordinator(&coordinator, &request, &footer);
    assert_eq!(email.to, "casey@example.edu");
    assert_eq!(email.subject, "New TA Request Submitted: GU0007");
    assert!(email.body.contains("Attachments: None"));
    assert!(email.body.contains("https://tap.example.edu/"));
    assert!(email.body.contains("Please contact help@example.edu"));

    let done = notify::request_completed(&request, &footer);
    assert_eq!(done.to, "jane@example.org");
    assert!(done.body.contains("completed by Sam on 2024-06-03"));

    let quiet = Footer {
        public_url: "https://tap.example.edu",
        contact_email: None,
    };
    let assigned = notify::assigned_to_coach("Sam", "sam@example.edu", &request, &quiet);
    assert_eq!(assigned.to, "sam@example.edu");
    assert!(!assigned.body.contains("Please contact"));
}
