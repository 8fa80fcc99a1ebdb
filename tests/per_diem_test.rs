use gutap::travel::per_diem::{
    MealsProvided, breakdown_for, meal_deduction, mileage_amount, per_diem, round_cents,
};
use gutap::travel::{DayInput, TravelForm, TravelRecord};
use gutap::travel::approval::Approver;

const NO_MEALS: MealsProvided = MealsProvided { breakfast: false, lunch: false, dinner: false };
const ALL_MEALS: MealsProvided = MealsProvided { breakfast: true, lunch: true, dinner: true };

fn day(date: &str, rate: f64) -> DayInput {
    DayInput {
        date: date.into(),
        per_diem_rate: rate,
        ..DayInput::default()
    }
}

fn form(days: Vec<DayInput>) -> TravelForm {
    TravelForm {
        traveler_name: "Alex Rivera".into(),
        traveler_email: "alex.rivera@example.edu".into(),
        organization: "GU".into(),
        purpose: "Site visit".into(),
        destination: "Atlanta, GA".into(),
        departure_date: "2024-06-03".into(),
        return_date: "2024-06-05".into(),
        days,
        signature: "Alex Rivera".into(),
    }
}

#[test]
fn gsa_tiers() {
    assert_eq!(breakdown_for(68.0).map(|t| t.breakfast), Some(16.0));
    assert_eq!(breakdown_for(92.0).map(|t| t.dinner), Some(38.0));
    assert!(breakdown_for(75.0).is_none());
}

#[test]
fn deductions_follow_the_tier() {
    assert_eq!(meal_deduction(74.0, ALL_MEALS), 69.0);
    assert_eq!(meal_deduction(86.0, MealsProvided { dinner: true, ..NO_MEALS }), 36.0);
    assert_eq!(meal_deduction(75.0, ALL_MEALS), 0.0);
}

#[test]
fn per_diem_rules() {
    assert_eq!(per_diem(68.0, NO_MEALS, false), 68.0);
    assert_eq!(per_diem(68.0, NO_MEALS, true), 51.0);
    // 92 - (23 + 26 + 38) = 5, the incidentals
    assert_eq!(per_diem(92.0, ALL_MEALS, false), 5.0);
    assert_eq!(per_diem(92.0, ALL_MEALS, true), 3.75);
    assert_eq!(per_diem(0.0, NO_MEALS, false), 0.0);
}

#[test]
fn mileage_and_rounding() {
    assert_eq!(mileage_amount(100.0), 70.0);
    assert_eq!(mileage_amount(12.5), 8.75);
    assert_eq!(round_cents(19.999), 20.0);
    assert_eq!(round_cents(0.125), 0.13);
}

#[test]
fn meal_letters() {
    assert_eq!(NO_MEALS.letters(), "-");
    assert_eq!(ALL_MEALS.letters(), "BLD");
    assert_eq!(MealsProvided { lunch: true, ..NO_MEALS }.letters(), "L");
}

#[test]
fn claim_marks_first_and_last_days() {
    let mut middle = day("2024-06-04", 80.0);
    middle.lodging = 150.0;
    middle.breakfast = true;
    let mut first = day("2024-06-03", 80.0);
    first.mileage = 100.0;

    let claim = form(vec![day("2024-06-05", 80.0), middle, first]).validate().unwrap();
    let flags: Vec<bool> = claim.days.iter().map(|d| d.first_or_last).collect();
    assert_eq!(flags, [true, false, true]);
    assert_eq!(claim.days[0].date.to_string(), "2024-06-03");

    // first: 70 mileage + 60 per diem; middle: 150 lodging + 60 per diem; last: 60
    assert_eq!(claim.days[0].total(), 130.0);
    assert_eq!(claim.days[1].total(), 210.0);
    assert_eq!(claim.days[2].total(), 60.0);
    assert_eq!(claim.total(), 400.0);
}

#[test]
fn claim_validation_collects_errors() {
    let mut negative = day("2024-06-04", 80.0);
    negative.airfare = -20.0;
    let mut bad = form(vec![
        day("2024-06-01", 80.0),
        negative,
        day("2024-06-04", 75.0),
        day("soon", 80.0),
    ]);
    bad.signature.clear();

    let errors = bad.validate().unwrap_err();
    assert!(errors.contains(&"Traveler signature is required.".to_string()));
    assert!(errors.contains(&"2024-06-01 is outside the travel dates.".to_string()));
    assert!(errors.contains(&"Airfare on 2024-06-04 must be zero or more.".to_string()));
    assert!(errors.contains(&"2024-06-04 is listed more than once.".to_string()));
    assert!(errors.contains(&"Per diem rate 75 on 2024-06-04 is not a GSA M&IE tier.".to_string()));
    assert!(errors.contains(&"'soon' is not a valid travel date.".to_string()));
}

#[test]
fn return_before_departure_is_rejected() {
    let mut f = form(vec![day("2024-06-03", 80.0)]);
    f.return_date = "2024-06-02".into();
    assert!(f
        .validate()
        .unwrap_err()
        .contains(&"Return date must not be before departure date.".to_string()));
}

#[test]
fn record_round_trips_the_claim() {
    let mut middle = day("2024-06-04", 86.0);
    middle.dinner = true;
    middle.other = 12.5;
    let claim = form(vec![day("2024-06-03", 86.0), middle, day("2024-06-05", 86.0)])
        .validate()
        .unwrap();
    let approvers = [
        Approver { name: "Jordan Lee".into(), email: "jordan.lee@example.edu".into() },
        Approver { name: "Morgan Price".into(), email: "morgan.price@example.edu".into() },
    ];
    let today = chrono::NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();

    let record = TravelRecord::new("TR0001", &claim, approvers, today);
    assert_eq!(record.dates, r#"["2024-06-03","2024-06-04","2024-06-05"]"#);
    assert_eq!(record.dinner, "[false,true,false]");
    assert_eq!(record.total, format!("{:.2}", claim.total()));
    assert_eq!(record.approver1_email, "jordan.lee@example.edu");
    assert!(record.approver1_status.is_empty());

    assert_eq!(record.claim(), claim);
}
