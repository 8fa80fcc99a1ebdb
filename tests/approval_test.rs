use chrono::NaiveDate;
use gutap::travel::approval::{
    ApprovalError, ApprovalOutcome, ApprovalRouting, ApprovalState, Approver, Decision, RoutingError, RoutingRule,
    Substitution,
};

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn approver(name: &str) -> Approver {
    Approver {
        name: name.into(),
        email: format!("{}@example.edu", name.to_lowercase()),
    }
}

fn state() -> ApprovalState {
    ApprovalState::new([approver("Jordan"), approver("Morgan")])
}

fn routing() -> ApprovalRouting {
    ApprovalRouting {
        rules: vec![RoutingRule {
            traveler_names: vec!["Alex Rivera".into()],
            traveler_emails: vec!["quinn@example.edu".into()],
            approvers: [approver("Jordan"), approver("Morgan")],
        }],
        default: [approver("Taylor"), approver("Morgan")],
        out_of_office: vec![Substitution {
            absent_email: "taylor@example.edu".into(),
            substitute: approver("Casey"),
            active: false,
        }],
    }
}

#[test]
fn routes_by_name_or_email_then_default() {
    let r = routing();
    assert_eq!(r.route(" alex rivera ", "someone@example.edu")[0].name, "Jordan");
    assert_eq!(r.route("Quinn", "QUINN@example.edu")[0].name, "Jordan");
    assert_eq!(r.route("Pat", "pat@example.edu"), [approver("Taylor"), approver("Morgan")]);
}

#[test]
fn active_substitution_replaces_the_absent_approver() {
    let mut r = routing();
    r.out_of_office[0].active = true;
    assert_eq!(r.route("Pat", "pat@example.edu"), [approver("Casey"), approver("Morgan")]);
    // rules are not affected when the absent approver is not on them
    assert_eq!(r.route("Alex Rivera", "")[0].name, "Jordan");
}

#[test]
fn routing_loads_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routing.json");
    std::fs::write(
        &path,
        r#"{"default": [{"name": "A", "email": "a@example.edu"}, {"name": "B", "email": "b@example.edu"}]}"#,
    )
    .unwrap();
    let r = ApprovalRouting::load(&path).unwrap();
    assert!(r.rules.is_empty());
    assert_eq!(r.route("anyone", "x@example.edu")[1].email, "b@example.edu");
}

#[test]
fn both_approvals_are_needed() {
    let mut s = state();
    assert!(s.awaits("jordan@example.edu"));

    let outcome = s.decide("Jordan@example.edu", Decision::Approve, "J. Lee", date(3)).unwrap();
    assert_eq!(outcome, ApprovalOutcome::Pending);
    assert!(!s.is_fully_approved());
    assert!(!s.awaits("jordan@example.edu"));
    assert!(s.awaits("morgan@example.edu"));

    let outcome = s.decide("morgan@example.edu", Decision::Approve, "M. Price", date(4)).unwrap();
    assert_eq!(outcome, ApprovalOutcome::FullyApproved);
    assert!(s.is_fully_approved());
    assert_eq!(s.slots[0].signature, "J. Lee");
    assert_eq!(s.slots[1].date, Some(date(4)));
}

#[test]
fn fully_approved_forms_are_closed() {
    let mut s = state();
    s.decide("jordan@example.edu", Decision::Approve, "J", date(3)).unwrap();
    s.decide("morgan@example.edu", Decision::Approve, "M", date(3)).unwrap();

    assert_eq!(
        s.decide("morgan@example.edu", Decision::Reject, "M", date(4)),
        Err(ApprovalError::AlreadyApproved)
    );
    assert!(!s.awaits("morgan@example.edu"));
}

#[test]
fn rejection_clears_the_other_decision() {
    let mut s = state();
    s.decide("jordan@example.edu", Decision::Approve, "J", date(3)).unwrap();
    let outcome = s.decide("morgan@example.edu", Decision::Reject, "M", date(4)).unwrap();

    assert_eq!(outcome, ApprovalOutcome::Rejected);
    assert!(s.is_rejected());
    assert_eq!(s.slots[0].decision, None);
    assert!(s.slots[0].signature.is_empty());
    assert_eq!(s.slots[0].date, None);
}

#[test]
fn rejected_forms_leave_both_queues() {
    let mut s = state();
    s.decide("jordan@example.edu", Decision::Reject, "J", date(3)).unwrap();

    assert!(!s.awaits("jordan@example.edu"));
    assert!(!s.awaits("morgan@example.edu"));
    let before = s.clone();
    assert_eq!(
        s.decide("morgan@example.edu", Decision::Approve, "M", date(4)),
        Err(ApprovalError::AlreadyRejected)
    );
    assert_eq!(
        s.decide("jordan@example.edu", Decision::Approve, "J", date(4)),
        Err(ApprovalError::AlreadyRejected)
    );
    assert_eq!(s, before);
}

#[test]
fn substitute_already_on_the_form_is_skipped() {
    let r = ApprovalRouting {
        rules: Vec::new(),
        default: [approver("Ann"), approver("Bob")],
        out_of_office: vec![Substitution {
            absent_email: "ann@example.edu".into(),
            substitute: approver("Bob"),
            active: true,
        }],
    };
    assert_eq!(r.route("Pat", "pat@example.edu"), [approver("Ann"), approver("Bob")]);
}

#[test]
fn one_approver_in_both_slots_can_finish_the_form() {
    let mut s = ApprovalState::new([approver("Bob"), approver("Bob")]);
    assert_eq!(
        s.decide("bob@example.edu", Decision::Approve, "B", date(3)).unwrap(),
        ApprovalOutcome::Pending
    );
    assert!(s.awaits("bob@example.edu"));
    assert_eq!(
        s.decide("bob@example.edu", Decision::Approve, "B", date(3)).unwrap(),
        ApprovalOutcome::FullyApproved
    );
}

#[test]
fn routing_files_need_two_different_approvers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("routing.json");
    std::fs::write(
        &path,
        r#"{"default": [{"name": "A", "email": "a@example.edu"}, {"name": "A", "email": "A@example.edu "}]}"#,
    )
    .unwrap();
    assert!(matches!(ApprovalRouting::load(&path), Err(RoutingError::SameApprover(_))));
    assert!(matches!(
        ApprovalRouting::load(&dir.path().join("missing.json")),
        Err(RoutingError::Io { .. })
    ));
    std::fs::write(&path, "{").unwrap();
    assert!(matches!(ApprovalRouting::load(&path), Err(RoutingError::Parse { .. })));
}

#[test]
fn strangers_and_blank_signatures_are_refused() {
    let mut s = state();
    assert_eq!(
        s.decide("pat@example.edu", Decision::Approve, "P", date(3)),
        Err(ApprovalError::NotAnApprover("pat@example.edu".into()))
    );
    assert_eq!(
        s.decide("jordan@example.edu", Decision::Approve, "  ", date(3)),
        Err(ApprovalError::MissingSignature)
    );
    assert_eq!(s, state());
}

#[test]
fn decisions_parse_case_insensitively() {
    assert_eq!(Decision::parse(" Approve "), Some(Decision::Approve));
    assert_eq!(Decision::parse("REJECT"), Some(Decision::Reject));
    assert_eq!(Decision::parse("maybe"), None);
}
