//! The shared service layer behind every dashboard page.
//!
//! Each write is a read-modify-write of one worksheet: load the table, change
//! typed records, rewrite the table whole, then send notifications. Within the
//! process the sequence runs under one lock. Side effects after the save
//! (uploads that are not the record itself, emails) never undo it; their
//! failures come back as warnings.

use chrono::{Local, NaiveDate};
use log::{info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::dashboard::{self, CoordinatorMetrics, RequestFilter, StaffMetrics, TimedRequest};
use crate::downloader::{self, ExportFormat};
use crate::error::AppError;
use crate::files::FileStore;
use crate::ga::{AvailabilityTable, GA_PREFIX, GaForm, GaRequest, GaStatus};
use crate::login::{Role, UserDirectory};
use crate::logs::{Delivery, Interaction, LogForm, LogKind};
use crate::mailer::{Email, Mailer, deliver_all};
use crate::notify::{self, Footer};
use crate::sheet::{SheetRecord, Table, next_id};
use crate::store::{self, CachedStore, SheetStore, read_with_backoff};
use crate::ticket::{self, CommentKind, RequestForm, TICKET_PREFIX, TaRequest};
use crate::travel::approval::{ApprovalOutcome, ApprovalRouting, Decision};
use crate::travel::{TRAVEL_PREFIX, TravelForm, TravelRecord, pdf, report};

/// Result of a write plus the side-effect failures it survived
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

/// An uploaded file from a form
#[derive(Clone, Debug)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub email_delay: Duration,
    pub public_url: String,
    pub contact_email: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            email_delay: Duration::ZERO,
            public_url: "http://127.0.0.1:3000".to_string(),
            contact_email: None,
        }
    }
}

pub struct Tap {
    store: CachedStore,
    files: Arc<dyn FileStore>,
    mailer: Arc<dyn Mailer>,
    users: Arc<UserDirectory>,
    routing: ApprovalRouting,
    availability: AvailabilityTable,
    settings: Settings,
    fixed_today: Option<NaiveDate>,
    write_lock: Mutex<()>,
}

impl Tap {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn SheetStore>,
        cache_ttl: Duration,
        files: Arc<dyn FileStore>,
        mailer: Arc<dyn Mailer>,
        users: Arc<UserDirectory>,
        routing: ApprovalRouting,
        availability: AvailabilityTable,
        settings: Settings,
    ) -> Self {
        Tap {
            store: CachedStore::new(store, cache_ttl),
            files,
            mailer,
            users,
            routing,
            availability,
            settings,
            fixed_today: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Pin "today", for tests and demos
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.fixed_today.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn users(&self) -> &Arc<UserDirectory> {
        &self.users
    }

    pub fn availability(&self) -> &AvailabilityTable {
        &self.availability
    }

    /// First read of every worksheet, retried with backoff
    pub fn warm_up(&self) -> Result<(), AppError> {
        for ws in store::WORKSHEETS {
            let table = read_with_backoff(&self.store, ws, 4, Duration::from_millis(500))?;
            info!("{}: {} rows", ws, table.len());
        }
        Ok(())
    }

    fn footer(&self) -> Footer<'_> {
        Footer {
            public_url: &self.settings.public_url,
            contact_email: self.settings.contact_email.as_deref(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, AppError> {
        self.write_lock
            .lock()
            .map_err(|_| AppError::Internal("write lock poisoned".to_string()))
    }

    fn notify(&self, emails: &[Email]) -> Vec<String> {
        deliver_all(self.mailer.as_ref(), emails, self.settings.email_delay)
    }

    fn table(&self, worksheet: &str) -> Result<Table, AppError> {
        Ok(self.store.read(worksheet)?)
    }

    /// Uncached read for the locked read-modify-write paths
    fn fresh_table(&self, worksheet: &str) -> Result<Table, AppError> {
        Ok(self.store.read_fresh(worksheet)?)
    }

    fn records<T: SheetRecord>(&self) -> Result<Vec<T>, AppError> {
        Ok(self.table(T::WORKSHEET)?.records())
    }

    fn append<T: SheetRecord>(&self, mut table: Table, record: &T) -> Result<(), AppError> {
        table.push(record).map_err(store::StoreError::from)?;
        self.store.overwrite(T::WORKSHEET, &table)?;
        Ok(())
    }

    /// Load a worksheet, change the one record `find` picks, write it back
    fn update_one<T, R>(
        &self,
        what: &str,
        find: impl Fn(&T) -> bool,
        change: impl FnOnce(&mut T) -> Result<R, AppError>,
    ) -> Result<(T, R), AppError>
    where
        T: SheetRecord + Clone,
    {
        let mut table = self.fresh_table(T::WORKSHEET)?;
        let (index, mut record) = table
            .indexed_records::<T>()
            .into_iter()
            .find(|(_, r)| find(r))
            .ok_or_else(|| AppError::NotFound(what.to_string()))?;
        let result = change(&mut record)?;
        table.set_record(index, &record).map_err(store::StoreError::from)?;
        self.store.overwrite(T::WORKSHEET, &table)?;
        Ok((record, result))
    }

    fn upload(&self, name: &str, content_type: &str, bytes: &[u8], warnings: &mut Vec<String>) -> Option<String> {
        match self.files.upload(name, content_type, bytes) {
            Ok(link) => Some(link),
            Err(e) => {
                warn!("upload of {} failed: {}", name, e);
                warnings.push(format!("{} could not be uploaded.", name));
                None
            }
        }
    }

    // ---- TA requests ----

    /// Validate, allocate an id, upload attachments, save, then notify every
    /// coordinator and the requester
    pub fn submit_request(&self, form: &RequestForm, attachments: &[Attachment]) -> Result<Outcome<TaRequest>, AppError> {
        let today = self.today();
        let mut request = form.validate(today)?;
        let mut warnings = Vec::new();

        let request = {
            let _guard = self.lock()?;
            let table = self.fresh_table(store::MAIN)?;
            request.ticket_id = next_id(TICKET_PREFIX, table.column_values("Ticket ID"));

            let links: Vec<String> = attachments
                .iter()
                .filter(|a| !a.bytes.is_empty())
                .filter_map(|a| {
                    let name = format!("{}_{}", request.ticket_id, a.filename);
                    self.upload(&name, &a.content_type, &a.bytes, &mut warnings)
                })
                .collect();
            request.document = links.join(", ");

            self.append(table, &request)?;
            request
        };
        info!("{} submitted by {}", request.ticket_id, request.email);

        let footer = self.footer();
        let mut emails: Vec<Email> = self
            .users
            .with_role(Role::Coordinator)
            .iter()
            .map(|c| notify::new_request_to_coordinator(c, &request, &footer))
            .collect();
        emails.push(notify::request_received(&request, &footer));
        warnings.extend(self.notify(&emails));

        Ok(Outcome { value: request, warnings })
    }

    fn coach_email(&self, coach: &str, warnings: &mut Vec<String>) -> Option<String> {
        let email = self.users.staff_email(coach);
        if email.is_none() {
            warn!("no staff account named {}", coach);
            warnings.push(format!("No email on file for {}.", coach));
        }
        email
    }

    pub fn assign(&self, ticket_id: &str, coach: &str, coordinator: &str) -> Result<Outcome<TaRequest>, AppError> {
        let today = self.today();
        let mut warnings = Vec::new();
        let coach_email = self.coach_email(coach.trim(), &mut warnings);

        let (request, ()) = {
            let _guard = self.lock()?;
            self.update_one::<TaRequest, _>(
                ticket_id,
                |r| r.ticket_id == ticket_id,
                |r| Ok(r.assign(coach, coordinator, today)?),
            )?
        };
        info!("{} assigned to {} by {}", ticket_id, request.coach, coordinator);

        if let Some(to) = coach_email {
            let email = notify::assigned_to_coach(&request.coach, &to, &request, &self.footer());
            warnings.extend(self.notify(&[email]));
        }
        Ok(Outcome { value: request, warnings })
    }

    pub fn transfer(
        &self,
        ticket_id: &str,
        new_coach: &str,
        actor: &str,
        reason: &str,
    ) -> Result<Outcome<TaRequest>, AppError> {
        let today = self.today();
        let mut warnings = Vec::new();
        let coach_email = self.coach_email(new_coach.trim(), &mut warnings);

        let (request, previous) = {
            let _guard = self.lock()?;
            self.update_one::<TaRequest, _>(
                ticket_id,
                |r| r.ticket_id == ticket_id,
                |r| Ok(r.transfer(new_coach, actor, reason, today)?),
            )?
        };
        info!("{} transferred from {} to {} by {}", ticket_id, previous, request.coach, actor);

        if let Some(to) = coach_email {
            let email = notify::assigned_to_coach(&request.coach, &to, &request, &self.footer());
            warnings.extend(self.notify(&[email]));
        }
        Ok(Outcome { value: request, warnings })
    }

    /// Close a ticket. With `staff`, only that coach's own tickets qualify.
    pub fn complete(&self, ticket_id: &str, staff: Option<&str>) -> Result<Outcome<TaRequest>, AppError> {
        let today = self.today();
        let (request, ()) = {
            let _guard = self.lock()?;
            self.update_one::<TaRequest, _>(
                ticket_id,
                |r| r.ticket_id == ticket_id,
                |r| {
                    match staff {
                        Some(name) => r.complete_as(name, today)?,
                        None => r.complete(today)?,
                    }
                    Ok(())
                },
            )?
        };
        info!("{} completed", ticket_id);

        let warnings = self.notify(&[notify::request_completed(&request, &self.footer())]);
        Ok(Outcome { value: request, warnings })
    }

    pub fn add_comment(
        &self,
        ticket_id: &str,
        kind: CommentKind,
        author: &str,
        text: &str,
    ) -> Result<TaRequest, AppError> {
        let today = self.today();
        let _guard = self.lock()?;
        let (request, ()) = self.update_one::<TaRequest, _>(
            ticket_id,
            |r| r.ticket_id == ticket_id,
            |r| Ok(r.add_comment(kind, author, text, today)?),
        )?;
        Ok(request)
    }

    pub fn requests(&self) -> Result<Vec<TaRequest>, AppError> {
        self.records()
    }

    pub fn list_requests(&self, filter: &RequestFilter) -> Result<Vec<TaRequest>, AppError> {
        let all = self.requests()?;
        Ok(filter.apply(&all).into_iter().cloned().collect())
    }

    pub fn unassigned(&self) -> Result<Vec<TaRequest>, AppError> {
        let all = self.requests()?;
        Ok(ticket::unassigned_queue(&all).into_iter().cloned().collect())
    }

    pub fn in_progress(&self) -> Result<Vec<TimedRequest>, AppError> {
        let all = self.requests()?;
        Ok(dashboard::in_progress_by_duration(&all).into_iter().map(TimedRequest::from).collect())
    }

    pub fn completed(&self) -> Result<Vec<TimedRequest>, AppError> {
        let all = self.requests()?;
        Ok(dashboard::completed_by_close(&all).into_iter().map(TimedRequest::from).collect())
    }

    pub fn coordinator_metrics(&self) -> Result<CoordinatorMetrics, AppError> {
        Ok(dashboard::coordinator_metrics(&self.requests()?, self.today()))
    }

    pub fn staff_metrics(&self, coach: &str) -> Result<StaffMetrics, AppError> {
        Ok(dashboard::staff_metrics(&self.requests()?, coach, self.today()))
    }

    /// Display names of everyone who can be assigned tickets
    pub fn coaches(&self) -> Vec<String> {
        self.users.with_role(Role::Staff).into_iter().map(|u| u.name).collect()
    }

    // ---- interaction and delivery logs ----

    fn log(&self, kind: LogKind, form: &LogForm, submitted_by: &str) -> Result<(), AppError> {
        let entry = form.validate(kind, submitted_by, self.today())?;
        let _guard = self.lock()?;
        let main = self.table(store::MAIN)?;
        if !main.column_values("Ticket ID").contains(&entry.ticket_id.as_str()) {
            return Err(AppError::NotFound(entry.ticket_id));
        }
        let table = self.fresh_table(kind.worksheet())?;
        info!("{:?} logged on {} by {}", kind, entry.ticket_id, submitted_by);
        match kind {
            LogKind::Interaction => self.append(table, &Interaction::from(entry)),
            LogKind::Delivery => self.append(table, &Delivery::from(entry)),
        }
    }

    pub fn log_interaction(&self, form: &LogForm, submitted_by: &str) -> Result<(), AppError> {
        self.log(LogKind::Interaction, form, submitted_by)
    }

    pub fn log_delivery(&self, form: &LogForm, submitted_by: &str) -> Result<(), AppError> {
        self.log(LogKind::Delivery, form, submitted_by)
    }

    pub fn interactions(&self, ticket_id: &str) -> Result<Vec<Interaction>, AppError> {
        Ok(self
            .records::<Interaction>()?
            .into_iter()
            .filter(|i| i.ticket_id == ticket_id)
            .collect())
    }

    pub fn deliveries(&self, ticket_id: &str) -> Result<Vec<Delivery>, AppError> {
        Ok(self
            .records::<Delivery>()?
            .into_iter()
            .filter(|d| d.ticket_id == ticket_id)
            .collect())
    }

    // ---- student support ----

    /// Record a support request and email every available assistant
    pub fn submit_ga_request(
        &self,
        form: &GaForm,
        requester: &str,
        requester_email: &str,
    ) -> Result<Outcome<GaRequest>, AppError> {
        let (mut request, window) = form.validate(requester, requester_email, self.today())?;
        let date = request.date.unwrap_or_else(|| self.today());
        let matched = self.availability.matches(date, &window);
        request.matched = matched.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", ");

        let mut warnings = Vec::new();
        if matched.is_empty() {
            warnings.push("No research assistant is available at that time.".to_string());
        }

        {
            let _guard = self.lock()?;
            let table = self.fresh_table(store::GA_SUPPORT)?;
            request.request_id = next_id(GA_PREFIX, table.column_values("Request ID"));
            self.append(table, &request)?;
        }
        info!("{} submitted by {}, matched: {}", request.request_id, requester, request.matched);

        let footer = self.footer();
        let emails: Vec<Email> = matched
            .iter()
            .map(|a| notify::ga_request_to_assistant(&a.name, &a.email, &request, &footer))
            .collect();
        warnings.extend(self.notify(&emails));
        Ok(Outcome { value: request, warnings })
    }

    pub fn complete_ga_request(&self, request_id: &str, assistant: &str) -> Result<GaRequest, AppError> {
        let _guard = self.lock()?;
        let (request, ()) = self.update_one::<GaRequest, _>(
            request_id,
            |g| g.request_id == request_id,
            |g| {
                if !g.is_matched_to(assistant) {
                    return Err(AppError::Forbidden(format!("{} was not matched to {}", request_id, assistant)));
                }
                g.status = GaStatus::Completed;
                g.completed_by = assistant.to_string();
                Ok(())
            },
        )?;
        info!("{} completed by {}", request_id, assistant);
        Ok(request)
    }

    /// Open requests matched to `assistant`
    pub fn ga_requests_for(&self, assistant: &str) -> Result<Vec<GaRequest>, AppError> {
        Ok(self
            .records::<GaRequest>()?
            .into_iter()
            .filter(|g| g.status == GaStatus::Submitted && g.is_matched_to(assistant))
            .collect())
    }

    pub fn ga_requests_by(&self, requester_email: &str) -> Result<Vec<GaRequest>, AppError> {
        Ok(self
            .records::<GaRequest>()?
            .into_iter()
            .filter(|g| g.requester_email.eq_ignore_ascii_case(requester_email))
            .collect())
    }

    // ---- travel authorization ----

    /// Lay out and upload the PDF, store the form, email both approvers
    pub fn submit_travel(&self, form: &TravelForm) -> Result<Outcome<TravelRecord>, AppError> {
        let today = self.today();
        let claim = form.validate()?;
        let approvers = self.routing.route(&claim.traveler_name, &claim.traveler_email);
        let mut warnings = Vec::new();

        let record = {
            let _guard = self.lock()?;
            let table = self.fresh_table(store::TRAVEL)?;
            let form_id = next_id(TRAVEL_PREFIX, table.column_values("Form ID"));

            let bytes = pdf::render(&report::layout(&form_id, &claim, None))?;
            let link = self.files.upload(&format!("{}_travel_authorization.pdf", form_id), "application/pdf", &bytes)?;

            let mut record = TravelRecord::new(&form_id, &claim, approvers, today);
            record.form_link = link;
            self.append(table, &record)?;
            record
        };
        info!("{} submitted by {}", record.form_id, record.traveler_email);

        let footer = self.footer();
        let emails: Vec<Email> = record
            .approvals()
            .slots
            .iter()
            .map(|s| notify::travel_to_approver(&s.approver, &record, &footer))
            .collect();
        warnings.extend(self.notify(&emails));
        Ok(Outcome { value: record, warnings })
    }

    /// Record one approver's decision. Full approval regenerates the signed
    /// PDF and sends it to the traveler; a rejection notifies the traveler.
    pub fn decide_travel(
        &self,
        form_id: &str,
        approver_email: &str,
        decision: Decision,
        signature: &str,
    ) -> Result<Outcome<TravelRecord>, AppError> {
        let today = self.today();
        let mut warnings = Vec::new();

        let (record, outcome) = {
            let _guard = self.lock()?;
            self.update_one::<TravelRecord, _>(
                form_id,
                |t| t.form_id == form_id,
                |t| {
                    let mut state = t.approvals();
                    let outcome = state.decide(approver_email, decision, signature, today)?;
                    t.set_approvals(&state);
                    if outcome == ApprovalOutcome::FullyApproved {
                        let bytes = pdf::render(&report::layout(&t.form_id, &t.claim(), Some(&state)))?;
                        let name = format!("{}_travel_authorization_signed.pdf", t.form_id);
                        if let Some(link) = self.upload(&name, "application/pdf", &bytes, &mut warnings) {
                            t.final_form_link = link;
                        }
                    }
                    Ok(outcome)
                },
            )?
        };
        info!("{} {} by {}", form_id, decision.as_str(), approver_email);

        let footer = self.footer();
        let email = match outcome {
            ApprovalOutcome::FullyApproved => Some(notify::travel_approved(&record, &footer)),
            ApprovalOutcome::Rejected => record
                .approvals()
                .slots
                .iter()
                .find(|s| s.approver.email.eq_ignore_ascii_case(approver_email.trim()))
                .map(|s| notify::travel_rejected(&record, &s.approver, &footer)),
            ApprovalOutcome::Pending => None,
        };
        if let Some(email) = email {
            warnings.extend(self.notify(&[email]));
        }
        Ok(Outcome { value: record, warnings })
    }

    /// Forms still waiting on `approver_email`
    pub fn pending_travel_for(&self, approver_email: &str) -> Result<Vec<TravelRecord>, AppError> {
        Ok(self
            .records::<TravelRecord>()?
            .into_iter()
            .filter(|t| t.approvals().awaits(approver_email))
            .collect())
    }

    pub fn travel_form(&self, form_id: &str) -> Result<TravelRecord, AppError> {
        self.records::<TravelRecord>()?
            .into_iter()
            .find(|t| t.form_id == form_id)
            .ok_or_else(|| AppError::NotFound(form_id.to_string()))
    }

    // ---- export ----

    pub fn export(&self, worksheet: &str, format: ExportFormat) -> Result<Vec<u8>, AppError> {
        if !store::WORKSHEETS.contains(&worksheet) {
            return Err(AppError::NotFound(format!("worksheet {}", worksheet)));
        }
        let table = self.table(worksheet)?;
        downloader::export(&table, worksheet, format).map_err(|e| AppError::Internal(e.to_string()))
    }

    pub fn next_id(&self, worksheet: &str) -> Result<String, AppError> {
        let (prefix, column) = match worksheet {
            store::MAIN => (TICKET_PREFIX, "Ticket ID"),
            store::GA_SUPPORT => (GA_PREFIX, "Request ID"),
            store::TRAVEL => (TRAVEL_PREFIX, "Form ID"),
            other => return Err(AppError::NotFound(format!("id column for {}", other))),
        };
        Ok(next_id(prefix, self.table(worksheet)?.column_values(column)))
    }
}
