use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use lazy_static::lazy_static;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, create_dir_all};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;
use crate::validation::is_valid_email;

const SESSION_COOKIE: &str = "session";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds

/// Dashboard roles that require a login. Requesters submit without one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Coordinator,
    #[serde(rename = "Assignee/Staff", alias = "Staff")]
    Staff,
    #[serde(rename = "Research Assistant")]
    ResearchAssistant,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Coordinator, Role::Staff, Role::ResearchAssistant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Coordinator => "Coordinator",
            Role::Staff => "Assignee/Staff",
            Role::ResearchAssistant => "Research Assistant",
        }
    }

    /// Short form used in forms and on the command line
    pub fn slug(&self) -> &'static str {
        match self {
            Role::Coordinator => "coordinator",
            Role::Staff => "staff",
            Role::ResearchAssistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        let raw = raw.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.slug().eq_ignore_ascii_case(raw) || r.as_str().eq_ignore_ascii_case(raw))
    }

    /// Landing page after login
    pub fn home(&self) -> &'static str {
        match self {
            Role::Coordinator => "/coordinator",
            Role::Staff => "/staff",
            Role::ResearchAssistant => "/assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dashboard user as stored in the users file
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub email: String,
    pub name: String,
    pub roles: Vec<Role>,

    /// Argon2 hash of the user's password
    pub password_hash: String,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("users file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("users file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("password hashing failed")]
    Hash,

    #[error("email, name, role and password are all required")]
    MissingField,

    #[error("'{0}' is not a valid email address")]
    BadEmail(String),

    #[error("{0} is already registered")]
    Duplicate(String),

    #[error("no user with email {0}")]
    UnknownUser(String),

    #[error("current password is incorrect")]
    WrongPassword,

    #[error("user directory lock poisoned")]
    Poisoned,
}

/// Users loaded from the JSON users file (a list of [`User`])
pub struct UserDirectory {
    path: Option<PathBuf>,
    users: RwLock<Vec<User>>,
}

impl UserDirectory {
    /// Load the users file. A missing file yields an empty directory that is
    /// created on the first save.
    pub fn load(path: &Path) -> Result<Self, LoginError> {
        let users = if path.exists() {
            let data = fs::read_to_string(path).map_err(|source| LoginError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&data)?
        } else {
            warn!("users file {} not found, starting with no users", path.display());
            Vec::new()
        };
        Ok(UserDirectory {
            path: Some(path.to_path_buf()),
            users: RwLock::new(users),
        })
    }

    /// Directory that never touches disk
    pub fn in_memory(users: Vec<User>) -> Self {
        UserDirectory {
            path: None,
            users: RwLock::new(users),
        }
    }

    fn save(&self, users: &[User]) -> Result<(), LoginError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| LoginError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent).map_err(io_err)?;
            }
        }
        let json = serde_json::to_string_pretty(users)?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn all(&self) -> Vec<User> {
        self.users.read().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn find(&self, email: &str) -> Option<User> {
        let users = self.users.read().ok()?;
        users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned()
    }

    pub fn with_role(&self, role: Role) -> Vec<User> {
        self.all().into_iter().filter(|u| u.has_role(role)).collect()
    }

    /// Email of the staff member with display name `name`
    pub fn staff_email(&self, name: &str) -> Option<String> {
        self.with_role(Role::Staff)
            .into_iter()
            .find(|u| u.name == name)
            .map(|u| u.email)
    }

    /// Register a user with a freshly hashed password
    pub fn add_user(&self, email: &str, name: &str, roles: &[Role], password: &str) -> Result<(), LoginError> {
        if email.trim().is_empty() || name.trim().is_empty() || roles.is_empty() || password.is_empty() {
            return Err(LoginError::MissingField);
        }
        if !is_valid_email(email.trim()) {
            return Err(LoginError::BadEmail(email.to_string()));
        }
        let password_hash = hash_password(password)?;

        let mut users = self.users.write().map_err(|_| LoginError::Poisoned)?;
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(email.trim())) {
            return Err(LoginError::Duplicate(email.to_string()));
        }
        let mut updated = users.clone();
        updated.push(User {
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            roles: roles.to_vec(),
            password_hash,
        });
        self.save(&updated)?;
        *users = updated;
        info!("added user {}", email.trim());
        Ok(())
    }

    /// The user, if the password matches and the user holds `role`
    pub fn verify(&self, email: &str, password: &str, role: Role) -> Option<User> {
        let user = self.find(email)?;
        if user.has_role(role) && verify_password(password, &user.password_hash) {
            Some(user)
        } else {
            None
        }
    }

    pub fn change_password(&self, email: &str, old_password: &str, new_password: &str) -> Result<(), LoginError> {
        if new_password.is_empty() {
            return Err(LoginError::MissingField);
        }
        let mut users = self.users.write().map_err(|_| LoginError::Poisoned)?;
        let mut updated = users.clone();
        let user = updated
            .iter_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .ok_or_else(|| LoginError::UnknownUser(email.to_string()))?;
        if !verify_password(old_password, &user.password_hash) {
            return Err(LoginError::WrongPassword);
        }
        user.password_hash = hash_password(new_password)?;
        self.save(&updated)?;
        *users = updated;
        Ok(())
    }
}

/// Hash a password using Argon2id with a random salt
pub fn hash_password(password: &str) -> Result<String, LoginError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| LoginError::Hash)
}

/// Check a plaintext password against a stored hash; malformed hashes never match
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => {
            warn!("stored password hash is malformed");
            false
        }
    }
}

/// An authenticated session, bound to the role chosen at login
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub expires_at: SystemTime,
}

lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
}

/// Store a new session and return its id
pub fn create_session(user: &User, role: Role) -> String {
    let session_id = Uuid::new_v4().to_string();
    let session = Session {
        email: user.email.clone(),
        name: user.name.clone(),
        role,
        expires_at: SystemTime::now() + Duration::from_secs(SESSION_DURATION),
    };

    if let Ok(mut sessions) = SESSIONS.write() {
        sessions.retain(|_, s| s.expires_at > SystemTime::now());
        sessions.insert(session_id.clone(), session);
    }
    session_id
}

/// The live session for `session_id`, if any
pub fn validate_session(session_id: &str) -> Option<Session> {
    let sessions = SESSIONS.read().ok()?;
    sessions
        .get(session_id)
        .filter(|s| s.expires_at > SystemTime::now())
        .cloned()
}

pub fn end_session(session_id: &str) {
    if let Ok(mut sessions) = SESSIONS.write() {
        sessions.remove(session_id);
    }
}

/// Session from the request cookie
pub fn current_session(jar: &CookieJar) -> Option<Session> {
    jar.get(SESSION_COOKIE).and_then(|c| validate_session(c.value()))
}

/// Session from the request cookie, which must carry `role`
pub fn require_role(jar: &CookieJar, role: Role) -> Result<Session, AppError> {
    let session = current_session(jar).ok_or(AppError::Unauthorized)?;
    if session.role == role {
        Ok(session)
    } else {
        Err(AppError::Forbidden(format!("this page is for the {} role", role)))
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeForm {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessageQuery>,
) -> Result<Html<String>, AppError> {
    let roles: Vec<_> = Role::ALL
        .iter()
        .map(|r| serde_json::json!({ "slug": r.slug(), "label": r.as_str() }))
        .collect();
    state.render(
        "login",
        &serde_json::json!({ "roles": roles, "error": query.error, "success": query.success }),
    )
}

pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let Some(role) = Role::parse(&form.role) else {
        return Redirect::to("/login?error=Please+select+a+role").into_response();
    };

    let users = state.service.users().clone();
    let email = form.email.clone();
    let verified = tokio::task::spawn_blocking(move || users.verify(&email, &form.password, role))
        .await
        .ok()
        .flatten();

    match verified {
        Some(user) => {
            info!("{} logged in as {}", user.email, role);
            let session_id = create_session(&user, role);
            let cookie = Cookie::build((SESSION_COOKIE, session_id)).path("/").http_only(true);
            (jar.add(cookie), Redirect::to(role.home())).into_response()
        }
        None => {
            warn!("failed login for {} as {}", form.email, role);
            Redirect::to("/login?error=Invalid+email%2C+password+or+role").into_response()
        }
    }
}

pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        end_session(cookie.value());
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login"),
    )
}

pub async fn serve_change_password_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<MessageQuery>,
) -> Result<Html<String>, AppError> {
    let session = current_session(&jar).ok_or(AppError::Unauthorized)?;
    state.render(
        "password",
        &serde_json::json!({
            "name": session.name,
            "home": session.role.home(),
            "error": query.error,
            "success": query.success,
        }),
    )
}

pub async fn handle_change_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<PasswordChangeForm>,
) -> Result<Redirect, AppError> {
    let session = current_session(&jar).ok_or(AppError::Unauthorized)?;
    if form.new_password != form.confirm_password {
        return Ok(Redirect::to("/password?error=New+passwords+don%27t+match"));
    }

    let users = state.service.users().clone();
    let email = session.email.clone();
    let result = tokio::task::spawn_blocking(move || {
        users.change_password(&email, &form.old_password, &form.new_password)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(match result {
        Ok(()) => {
            info!("{} changed their password", session.email);
            Redirect::to("/password?success=Password+changed")
        }
        Err(e) => Redirect::to(&format!("/password?error={}", urlencoding::encode(&e.to_string()))),
    })
}
