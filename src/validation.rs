//! Form field checks shared by every intake form.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").unwrap();
    static ref NON_DIGIT: Regex = Regex::new(r"\D").unwrap();
}

fn digits_of(raw: &str) -> String {
    NON_DIGIT.replace_all(raw, "").into_owned()
}

/// Display formatting for stored phone numbers.
///
/// ```
/// use gutap::validation::format_phone;
///
/// assert_eq!(format_phone("2025550123"), "(202) 555-0123");
/// assert_eq!(format_phone("1-202-555-0123"), "+1 (202) 555-0123");
/// assert_eq!(format_phone("ext. 42"), "ext. 42");
/// ```
pub fn format_phone(raw: &str) -> String {
    let digits = digits_of(raw);
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        11 if digits.starts_with('1') => {
            format!("+1 ({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..])
        }
        _ => raw.to_string(),
    }
}

/// Intake phone check: exactly ten US digits, reformatted, or `None`
pub fn clean_us_phone(raw: &str) -> Option<String> {
    let digits = digits_of(raw);
    if digits.len() == 10 {
        Some(format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..]))
    } else {
        None
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email.trim())
}

/// Collects every violation of a form before reporting
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.0.push(message.into());
    }

    /// Record `message` when `value` is blank
    pub fn require(&mut self, value: &str, message: &str) {
        if value.trim().is_empty() {
            self.push(message);
        }
    }

    pub fn require_email(&mut self, value: &str) {
        if value.trim().is_empty() || !is_valid_email(value) {
            self.push("Please enter a valid email address.");
        }
    }

    /// Due dates must fall strictly after `today`
    pub fn require_future(&mut self, date: Option<NaiveDate>, today: NaiveDate, label: &str) {
        match date {
            None => self.push(format!("{} is required.", label)),
            Some(d) if d <= today => self.push(format!("{} must be after today.", label)),
            Some(_) => {}
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), Vec<String>> {
        if self.0.is_empty() { Ok(()) } else { Err(self.0) }
    }
}
