//! Two-approver routing and sign-off for travel forms.

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approver {
    pub name: String,
    pub email: String,
}

/// Travelers matched by name or email go to a fixed approver pair
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(default)]
    pub traveler_names: Vec<String>,
    #[serde(default)]
    pub traveler_emails: Vec<String>,
    pub approvers: [Approver; 2],
}

impl RoutingRule {
    fn matches(&self, name: &str, email: &str) -> bool {
        self.traveler_names.iter().any(|n| n.trim().eq_ignore_ascii_case(name.trim()))
            || self.traveler_emails.iter().any(|e| e.trim().eq_ignore_ascii_case(email.trim()))
    }
}

/// Manual out-of-office switch: while `active`, forms routed to `absent_email`
/// go to `substitute` instead
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Substitution {
    pub absent_email: String,
    pub substitute: Approver,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bad routing file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is routed to both approver slots")]
    SameApprover(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalRouting {
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    pub default: [Approver; 2],
    #[serde(default)]
    pub out_of_office: Vec<Substitution>,
}

impl ApprovalRouting {
    pub fn load(path: &Path) -> Result<Self, RoutingError> {
        let data = fs::read_to_string(path).map_err(|source| RoutingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let routing: ApprovalRouting = serde_json::from_str(&data).map_err(|source| RoutingError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        routing.check()?;
        Ok(routing)
    }

    /// Every configured pair needs two different approvers
    pub fn check(&self) -> Result<(), RoutingError> {
        let pairs = std::iter::once(&self.default).chain(self.rules.iter().map(|r| &r.approvers));
        for [a, b] in pairs {
            if same_email(&a.email, &b.email) {
                return Err(RoutingError::SameApprover(a.email.clone()));
            }
        }
        Ok(())
    }

    /// The two approvers for a traveler: first matching rule, else the
    /// default pair, then active substitutions applied per slot. A substitute
    /// who already holds the other slot is skipped.
    pub fn route(&self, traveler_name: &str, traveler_email: &str) -> [Approver; 2] {
        let mut pair = self
            .rules
            .iter()
            .find(|r| r.matches(traveler_name, traveler_email))
            .map(|r| r.approvers.clone())
            .unwrap_or_else(|| self.default.clone());

        for i in 0..2 {
            let Some(sub) = self
                .out_of_office
                .iter()
                .find(|s| s.active && same_email(&s.absent_email, &pair[i].email))
            else {
                continue;
            };
            if same_email(&sub.substitute.email, &pair[1 - i].email) {
                warn!(
                    "not substituting {} for {}: already the other approver",
                    sub.substitute.email, pair[i].email
                );
                continue;
            }
            pair[i] = sub.substitute.clone();
        }
        pair
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approve" => Some(Decision::Approve),
            "reject" => Some(Decision::Reject),
            _ => None,
        }
    }
}

/// One approver's recorded decision
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApprovalSlot {
    pub approver: Approver,
    pub decision: Option<Decision>,
    pub signature: String,
    pub date: Option<NaiveDate>,
}

impl ApprovalSlot {
    pub fn pending(approver: Approver) -> Self {
        ApprovalSlot {
            approver,
            ..Default::default()
        }
    }

    fn clear(&mut self) {
        self.decision = None;
        self.signature.clear();
        self.date = None;
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ApprovalError {
    #[error("{0} is not an approver for this form")]
    NotAnApprover(String),

    #[error("this form is already fully approved")]
    AlreadyApproved,

    #[error("this form has been rejected")]
    AlreadyRejected,

    #[error("a signature is required")]
    MissingSignature,
}

/// Where a form stands after a decision
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Waiting on the other approver
    Pending,
    FullyApproved,
    Rejected,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApprovalState {
    pub slots: [ApprovalSlot; 2],
}

impl ApprovalState {
    pub fn new(approvers: [Approver; 2]) -> Self {
        ApprovalState {
            slots: approvers.map(ApprovalSlot::pending),
        }
    }

    /// Both routed approvers said `approve`
    pub fn is_fully_approved(&self) -> bool {
        self.slots.iter().all(|s| s.decision == Some(Decision::Approve))
    }

    pub fn is_rejected(&self) -> bool {
        self.slots.iter().any(|s| s.decision == Some(Decision::Reject))
    }

    pub fn slot_index(&self, email: &str) -> Option<usize> {
        self.slots.iter().position(|s| same_email(&s.approver.email, email))
    }

    /// First undecided slot held by `email`, else the first one it holds
    fn decision_slot(&self, email: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.decision.is_none() && same_email(&s.approver.email, email))
            .or_else(|| self.slot_index(email))
    }

    /// Is `email` an approver who has not decided yet? Closed forms wait on nobody.
    pub fn awaits(&self, email: &str) -> bool {
        !self.is_fully_approved()
            && !self.is_rejected()
            && self
                .slots
                .iter()
                .any(|s| s.decision.is_none() && same_email(&s.approver.email, email))
    }

    /// Record one approver's decision. A rejection clears whatever the other
    /// approver had recorded and closes the form.
    pub fn decide(
        &mut self,
        email: &str,
        decision: Decision,
        signature: &str,
        today: NaiveDate,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let idx = self
            .decision_slot(email)
            .ok_or_else(|| ApprovalError::NotAnApprover(email.to_string()))?;
        if self.is_fully_approved() {
            return Err(ApprovalError::AlreadyApproved);
        }
        if self.is_rejected() {
            return Err(ApprovalError::AlreadyRejected);
        }
        if signature.trim().is_empty() {
            return Err(ApprovalError::MissingSignature);
        }

        let slot = &mut self.slots[idx];
        slot.decision = Some(decision);
        slot.signature = signature.trim().to_string();
        slot.date = Some(today);

        Ok(match decision {
            Decision::Reject => {
                self.slots[1 - idx].clear();
                ApprovalOutcome::Rejected
            }
            Decision::Approve if self.is_fully_approved() => ApprovalOutcome::FullyApproved,
            Decision::Approve => ApprovalOutcome::Pending,
        })
    }
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
