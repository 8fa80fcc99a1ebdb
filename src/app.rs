use axum::{
    Form, Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use handlebars::Handlebars;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::{Config, StoreKind};
use crate::dashboard::RequestFilter;
use crate::downloader::ExportFormat;
use crate::error::AppError;
use crate::files::{FileStore, LocalFileStore};
use crate::ga::{AvailabilityTable, GaForm};
use crate::login::{self, Role, UserDirectory, current_session, require_role};
use crate::logs::{LogForm, LogKind};
use crate::mailer::{Mailer, OutboxMailer, SmtpMailer};
use crate::service::{Attachment, Settings, Tap};
use crate::store::{LocalWorkbook, MemoryWorkbook, SheetStore};
use crate::ticket::{self, CommentKind, Priority, RequestForm};
use crate::travel::TravelForm;
use crate::travel::approval::{ApprovalRouting, Decision};

const TEMPLATES: [(&str, &str); 11] = [
    ("index", include_str!("./templates/index.hbs")),
    ("request", include_str!("./templates/request.hbs")),
    ("submitted", include_str!("./templates/submitted.hbs")),
    ("login", include_str!("./templates/login.hbs")),
    ("password", include_str!("./templates/password.hbs")),
    ("coordinator", include_str!("./templates/coordinator.hbs")),
    ("staff", include_str!("./templates/staff.hbs")),
    ("ga", include_str!("./templates/ga.hbs")),
    ("assistant", include_str!("./templates/assistant.hbs")),
    ("travel", include_str!("./templates/travel.hbs")),
    ("approvals", include_str!("./templates/approvals.hbs")),
];

pub struct AppState {
    pub service: Arc<Tap>,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(service: Tap) -> Result<Self, Box<dyn std::error::Error>> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(false);
        for (name, source) in TEMPLATES {
            templates.register_template_string(name, source)?;
        }
        Ok(AppState {
            service: Arc::new(service),
            templates,
        })
    }

    /// Wire up the service from configuration
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn SheetStore> = match config.store {
            StoreKind::Local => Arc::new(LocalWorkbook::open(&config.data_dir)?),
            StoreKind::Memory => {
                warn!("using the in-memory sheet store; nothing will be persisted");
                Arc::new(MemoryWorkbook::new())
            }
        };
        let files: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&config.upload_dir, &config.public_url)?);
        let mailer: Arc<dyn Mailer> = match &config.smtp {
            Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
            None => Arc::new(OutboxMailer::new()),
        };
        let users = Arc::new(UserDirectory::load(&config.users_file)?);
        let routing = ApprovalRouting::load(&config.routing_file)?;
        let availability = AvailabilityTable::load(&config.availability_file).unwrap_or_else(|e| {
            warn!("no GA availability loaded: {}", e);
            AvailabilityTable::default()
        });

        let service = Tap::new(
            store,
            config.cache_ttl,
            files,
            mailer,
            users,
            routing,
            availability,
            Settings {
                email_delay: config.email_delay,
                public_url: config.public_url.clone(),
                contact_email: config.contact_email.clone(),
            },
        );
        Self::new(service)
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<Html<String>, AppError> {
        self.templates
            .render(name, data)
            .map(Html)
            .map_err(|e| AppError::Internal(format!("template {}: {}", name, e)))
    }

    /// Run a service call on the blocking pool
    async fn call<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&Tap) -> Result<T, AppError> + Send + 'static,
    {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || f(&service))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
    }
}

pub fn build_router(state: Arc<AppState>, files_dir: Option<PathBuf>) -> Router {
    let mut app = Router::new()
        .route("/", get(serve_index))
        .route("/request", get(serve_request_form).post(submit_request))
        .route("/login", get(login::serve_login_page).post(login::handle_login))
        .route("/logout", get(login::handle_logout))
        .route(
            "/password",
            get(login::serve_change_password_page).post(login::handle_change_password),
        )
        .route("/coordinator", get(serve_coordinator))
        .route("/coordinator/assign", post(handle_assign))
        .route("/coordinator/transfer", post(handle_transfer))
        .route("/coordinator/comment", post(handle_coordinator_comment))
        .route("/staff", get(serve_staff))
        .route("/staff/complete", post(handle_staff_complete))
        .route("/staff/comment", post(handle_staff_comment))
        .route("/staff/interaction", post(handle_interaction))
        .route("/staff/delivery", post(handle_delivery))
        .route("/ga", get(serve_ga).post(handle_ga_request))
        .route("/assistant", get(serve_assistant))
        .route("/assistant/complete", post(handle_ga_complete))
        .route("/travel", get(serve_travel))
        .route("/travel/approvals", get(serve_approvals).post(handle_decision))
        .route("/api/travel", post(api_submit_travel))
        .route("/api/tickets", get(api_tickets))
        .route("/api/metrics", get(api_metrics))
        .route("/api/export/:worksheet", get(api_export));
    if let Some(dir) = files_dir {
        app = app.nest_service("/files", ServeDir::new(dir));
    }
    app.with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::from_config(&config)?);

    let service = state.service.clone();
    tokio::task::spawn_blocking(move || service.warm_up()).await??;

    let app = build_router(state, Some(config.upload_dir.clone()));
    let listener = TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct Flash {
    error: Option<String>,
    success: Option<String>,
}

/// Page responses: a missing login goes to the login page instead of a 401
fn page(result: Result<Html<String>, AppError>) -> Response {
    match result {
        Ok(html) => html.into_response(),
        Err(AppError::Unauthorized) => Redirect::to("/login").into_response(),
        Err(e) => e.into_response(),
    }
}

/// Redirect back to `path` with a success or error message
fn back(path: &str, result: Result<String, AppError>) -> Response {
    match result {
        Ok(message) => Redirect::to(&format!("{}?success={}", path, urlencoding::encode(&message))).into_response(),
        Err(AppError::Unauthorized) => Redirect::to("/login").into_response(),
        Err(e) => {
            let message = e.messages().join(" ");
            Redirect::to(&format!("{}?error={}", path, urlencoding::encode(&message))).into_response()
        }
    }
}

fn with_warnings(message: String, warnings: &[String]) -> String {
    if warnings.is_empty() {
        message
    } else {
        format!("{} Warning: {}", message, warnings.join(" "))
    }
}

async fn serve_index(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let session = current_session(&jar);
    page(state.render(
        "index",
        &json!({
            "name": session.as_ref().map(|s| s.name.clone()),
            "home": session.as_ref().map(|s| s.role.home()),
        }),
    ))
}

// ---- requester intake ----

fn request_page_data(form: &RequestForm, errors: &[String]) -> Value {
    json!({
        "form": {
            "name": form.name, "title": form.title, "organization": form.organization,
            "location": form.location, "email": form.email, "phone": form.phone,
            "focus_area": form.focus_area, "focus_area_other": form.focus_area_other,
            "ta_type": form.ta_type, "due_date": form.due_date,
            "description": form.description, "priority": form.priority,
        },
        "errors": errors,
        "organizations": ticket::ORGANIZATIONS,
        "jurisdictions": ticket::JURISDICTIONS,
        "focus_areas": ticket::FOCUS_AREAS,
        "ta_types": ticket::TA_TYPES,
        "priorities": Priority::ALL.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
    })
}

async fn serve_request_form(State(state): State<Arc<AppState>>) -> Response {
    page(state.render("request", &request_page_data(&RequestForm::default(), &[])))
}

/// Split the multipart body into form fields and attached files
async fn read_request_multipart(mut multipart: Multipart) -> Result<(RequestForm, Vec<Attachment>), AppError> {
    let mut fields = Map::new();
    let mut attachments = Vec::new();
    let bad = |e: axum::extract::multipart::MultipartError| AppError::Validation(vec![e.body_text()]);

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad)?.to_vec();
                if !filename.is_empty() {
                    attachments.push(Attachment {
                        filename,
                        content_type,
                        bytes,
                    });
                }
            }
            None => {
                let text = field.text().await.map_err(bad)?;
                fields.insert(name, Value::String(text));
            }
        }
    }

    let form = serde_json::from_value(Value::Object(fields))
        .map_err(|e| AppError::Validation(vec![e.to_string()]))?;
    Ok((form, attachments))
}

async fn submit_request(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let (form, attachments) = match read_request_multipart(multipart).await {
        Ok(parts) => parts,
        Err(e) => return e.into_response(),
    };

    let submitted = form.clone();
    match state.call(move |tap| tap.submit_request(&submitted, &attachments)).await {
        Ok(outcome) => page(state.render(
            "submitted",
            &json!({ "request": outcome.value, "warnings": outcome.warnings }),
        )),
        Err(AppError::Validation(errors)) => match state.render("request", &request_page_data(&form, &errors)) {
            Ok(html) => (StatusCode::BAD_REQUEST, html).into_response(),
            Err(e) => e.into_response(),
        },
        Err(e) => e.into_response(),
    }
}

// ---- coordinator ----

#[derive(Debug, Deserialize)]
struct AssignForm {
    ticket_id: String,
    coach: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct CommentForm {
    ticket_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct TicketForm {
    ticket_id: String,
}

async fn serve_coordinator(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(filter): Query<RequestFilter>,
    Query(flash): Query<Flash>,
) -> Response {
    let result = async {
        let session = require_role(&jar, Role::Coordinator)?;
        let (metrics, unassigned, in_progress, completed, filtered, coaches) = state
            .call(move |tap| {
                Ok((
                    tap.coordinator_metrics()?,
                    tap.unassigned()?,
                    tap.in_progress()?,
                    tap.completed()?,
                    tap.list_requests(&filter)?,
                    tap.coaches(),
                ))
            })
            .await?;
        state.render(
            "coordinator",
            &json!({
                "name": session.name,
                "metrics": metrics,
                "unassigned": unassigned,
                "in_progress": in_progress,
                "completed": completed,
                "requests": filtered,
                "coaches": coaches,
                "error": flash.error,
                "success": flash.success,
            }),
        )
    }
    .await;
    page(result)
}

async fn handle_assign(State(state): State<Arc<AppState>>, jar: CookieJar, Form(form): Form<AssignForm>) -> Response {
    let result = async {
        let session = require_role(&jar, Role::Coordinator)?;
        let outcome = state
            .call(move |tap| tap.assign(&form.ticket_id, &form.coach, &session.name))
            .await?;
        Ok::<_, AppError>(with_warnings(
            format!("{} assigned to {}.", outcome.value.ticket_id, outcome.value.coach),
            &outcome.warnings,
        ))
    }
    .await;
    back("/coordinator", result)
}

async fn handle_transfer(State(state): State<Arc<AppState>>, jar: CookieJar, Form(form): Form<AssignForm>) -> Response {
    let result = async {
        let session = require_role(&jar, Role::Coordinator)?;
        let outcome = state
            .call(move |tap| tap.transfer(&form.ticket_id, &form.coach, &session.name, &form.reason))
            .await?;
        Ok::<_, AppError>(with_warnings(
            format!("{} transferred to {}.", outcome.value.ticket_id, outcome.value.coach),
            &outcome.warnings,
        ))
    }
    .await;
    back("/coordinator", result)
}

async fn handle_coordinator_comment(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CommentForm>,
) -> Response {
    let result = async {
        let session = require_role(&jar, Role::Coordinator)?;
        let request = state
            .call(move |tap| tap.add_comment(&form.ticket_id, CommentKind::Coordinator, &session.name, &form.text))
            .await?;
        Ok::<_, AppError>(format!("Comment added to {}.", request.ticket_id))
    }
    .await;
    back("/coordinator", result)
}

// ---- staff ----

async fn serve_staff(State(state): State<Arc<AppState>>, jar: CookieJar, Query(flash): Query<Flash>) -> Response {
    let result = async {
        let session = require_role(&jar, Role::Staff)?;
        let coach = session.name.clone();
        let (metrics, mine) = state
            .call(move |tap| {
                let filter = RequestFilter {
                    coach: Some(coach.clone()),
                    ..Default::default()
                };
                Ok((tap.staff_metrics(&coach)?, tap.list_requests(&filter)?))
            })
            .await?;
        state.render(
            "staff",
            &json!({
                "name": session.name,
                "metrics": metrics,
                "requests": mine,
                "interaction_types": LogKind::Interaction.types(),
                "delivery_types": LogKind::Delivery.types(),
                "error": flash.error,
                "success": flash.success,
            }),
        )
    }
    .await;
    page(result)
}

async fn handle_staff_complete(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<TicketForm>,
) -> Response {
    let result = async {
        let session = require_role(&jar, Role::Staff)?;
        let outcome = state
            .call(move |tap| tap.complete(&form.ticket_id, Some(&session.name)))
            .await?;
        Ok::<_, AppError>(with_warnings(
            format!("{} marked completed.", outcome.value.ticket_id),
            &outcome.warnings,
        ))
    }
    .await;
    back("/staff", result)
}

async fn handle_staff_comment(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<CommentForm>,
) -> Response {
    let result = async {
        let session = require_role(&jar, Role::Staff)?;
        let request = state
            .call(move |tap| tap.add_comment(&form.ticket_id, CommentKind::Staff, &session.name, &form.text))
            .await?;
        Ok::<_, AppError>(format!("Comment added to {}.", request.ticket_id))
    }
    .await;
    back("/staff", result)
}

async fn handle_log(state: Arc<AppState>, jar: CookieJar, kind: LogKind, form: LogForm) -> Response {
    let result = async {
        let session = require_role(&jar, Role::Staff)?;
        let ticket_id = form.ticket_id.clone();
        state
            .call(move |tap| match kind {
                LogKind::Interaction => tap.log_interaction(&form, &session.name),
                LogKind::Delivery => tap.log_delivery(&form, &session.name),
            })
            .await?;
        Ok::<_, AppError>(format!("{:?} logged for {}.", kind, ticket_id))
    }
    .await;
    back("/staff", result)
}

async fn handle_interaction(State(state): State<Arc<AppState>>, jar: CookieJar, Form(form): Form<LogForm>) -> Response {
    handle_log(state, jar, LogKind::Interaction, form).await
}

async fn handle_delivery(State(state): State<Arc<AppState>>, jar: CookieJar, Form(form): Form<LogForm>) -> Response {
    handle_log(state, jar, LogKind::Delivery, form).await
}

// ---- student support ----

async fn serve_ga(State(state): State<Arc<AppState>>, jar: CookieJar, Query(flash): Query<Flash>) -> Response {
    let result = async {
        let session = current_session(&jar).ok_or(AppError::Unauthorized)?;
        let email = session.email.clone();
        let mine = state.call(move |tap| tap.ga_requests_by(&email)).await?;
        state.render(
            "ga",
            &json!({
                "name": session.name,
                "home": session.role.home(),
                "requests": mine,
                "error": flash.error,
                "success": flash.success,
            }),
        )
    }
    .await;
    page(result)
}

async fn handle_ga_request(State(state): State<Arc<AppState>>, jar: CookieJar, Form(form): Form<GaForm>) -> Response {
    let result = async {
        let session = current_session(&jar).ok_or(AppError::Unauthorized)?;
        let outcome = state
            .call(move |tap| tap.submit_ga_request(&form, &session.name, &session.email))
            .await?;
        let matched = if outcome.value.matched.is_empty() {
            "nobody".to_string()
        } else {
            outcome.value.matched.clone()
        };
        Ok::<_, AppError>(with_warnings(
            format!("{} submitted and sent to {}.", outcome.value.request_id, matched),
            &outcome.warnings,
        ))
    }
    .await;
    back("/ga", result)
}

#[derive(Debug, Deserialize)]
struct GaCompleteForm {
    request_id: String,
}

async fn serve_assistant(State(state): State<Arc<AppState>>, jar: CookieJar, Query(flash): Query<Flash>) -> Response {
    let result = async {
        let session = require_role(&jar, Role::ResearchAssistant)?;
        let name = session.name.clone();
        let open = state.call(move |tap| tap.ga_requests_for(&name)).await?;
        state.render(
            "assistant",
            &json!({
                "name": session.name,
                "requests": open,
                "error": flash.error,
                "success": flash.success,
            }),
        )
    }
    .await;
    page(result)
}

async fn handle_ga_complete(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<GaCompleteForm>,
) -> Response {
    let result = async {
        let session = require_role(&jar, Role::ResearchAssistant)?;
        let request = state
            .call(move |tap| tap.complete_ga_request(&form.request_id, &session.name))
            .await?;
        Ok::<_, AppError>(format!("{} marked completed.", request.request_id))
    }
    .await;
    back("/assistant", result)
}

// ---- travel ----

async fn serve_travel(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let result = async {
        let session = current_session(&jar).ok_or(AppError::Unauthorized)?;
        state.render(
            "travel",
            &json!({
                "name": session.name,
                "email": session.email,
                "home": session.role.home(),
                "rates": crate::travel::per_diem::MIE_TIERS.iter().map(|t| t.rate).collect::<Vec<_>>(),
            }),
        )
    }
    .await;
    page(result)
}

async fn api_submit_travel(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(form): Json<TravelForm>,
) -> Result<Json<Value>, AppError> {
    current_session(&jar).ok_or(AppError::Unauthorized)?;
    let outcome = state.call(move |tap| tap.submit_travel(&form)).await?;
    Ok(Json(json!({
        "status": "ok",
        "form_id": outcome.value.form_id,
        "total": outcome.value.total,
        "form_link": outcome.value.form_link,
        "approvers": [outcome.value.approver1_name, outcome.value.approver2_name],
        "warnings": outcome.warnings,
    })))
}

#[derive(Debug, Deserialize)]
struct DecisionForm {
    form_id: String,
    decision: String,
    signature: String,
}

async fn serve_approvals(State(state): State<Arc<AppState>>, jar: CookieJar, Query(flash): Query<Flash>) -> Response {
    let result = async {
        let session = current_session(&jar).ok_or(AppError::Unauthorized)?;
        let email = session.email.clone();
        let pending = state.call(move |tap| tap.pending_travel_for(&email)).await?;
        state.render(
            "approvals",
            &json!({
                "name": session.name,
                "home": session.role.home(),
                "forms": pending,
                "error": flash.error,
                "success": flash.success,
            }),
        )
    }
    .await;
    page(result)
}

async fn handle_decision(State(state): State<Arc<AppState>>, jar: CookieJar, Form(form): Form<DecisionForm>) -> Response {
    let result = async {
        let session = current_session(&jar).ok_or(AppError::Unauthorized)?;
        let decision = Decision::parse(&form.decision)
            .ok_or_else(|| AppError::Validation(vec!["Decision must be approve or reject.".to_string()]))?;
        let outcome = state
            .call(move |tap| tap.decide_travel(&form.form_id, &session.email, decision, &form.signature))
            .await?;
        Ok::<_, AppError>(with_warnings(
            format!("{} {}d.", outcome.value.form_id, decision.as_str()),
            &outcome.warnings,
        ))
    }
    .await;
    back("/travel/approvals", result)
}

// ---- JSON API ----

async fn api_tickets(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(filter): Query<RequestFilter>,
) -> Result<Json<Value>, AppError> {
    require_role(&jar, Role::Coordinator)?;
    let requests = state.call(move |tap| tap.list_requests(&filter)).await?;
    Ok(Json(json!({ "status": "ok", "requests": requests })))
}

async fn api_metrics(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<Json<Value>, AppError> {
    let session = current_session(&jar).ok_or(AppError::Unauthorized)?;
    match session.role {
        Role::Coordinator => {
            let metrics = state.call(|tap| tap.coordinator_metrics()).await?;
            Ok(Json(json!({ "status": "ok", "metrics": metrics })))
        }
        Role::Staff => {
            let metrics = state.call(move |tap| tap.staff_metrics(&session.name)).await?;
            Ok(Json(json!({ "status": "ok", "metrics": metrics })))
        }
        Role::ResearchAssistant => Err(AppError::Forbidden("no metrics for this role".to_string())),
    }
}

#[derive(Debug, Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

async fn api_export(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(worksheet): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    require_role(&jar, Role::Coordinator)?;
    let format = match query.format.as_deref() {
        None => ExportFormat::Xlsx,
        Some(raw) => ExportFormat::parse(raw)
            .ok_or_else(|| AppError::Validation(vec![format!("Unknown export format '{}'.", raw)]))?,
    };
    let ws = worksheet.clone();
    let bytes = state.call(move |tap| tap.export(&ws, format)).await?;

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.{}\"", worksheet, format.extension()),
            ),
        ],
        bytes,
    )
        .into_response())
}
