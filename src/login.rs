#[cfg(feature = "web")]
use crate::app::AppState;
use crate::error::{DashboardError, DashboardResult};
use crate::record::normalize_source;
use crate::table::ServiceTable;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
#[cfg(feature = "web")]
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
#[cfg(feature = "web")]
use std::sync::Arc;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Longest session lifetime accepted: one year.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Who is looking at the dashboard.
///
/// Source names are kept in their normalized (trimmed, lowercase) form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Anonymous,
    User(String),
    Owner(String),
}

impl Role {
    pub fn source_name(&self) -> Option<&str> {
        match self {
            Role::Anonymous => None,
            Role::User(source) | Role::Owner(source) => Some(source),
        }
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, Role::Owner(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Anonymous => "Guest",
            Role::User(_) => "User",
            Role::Owner(_) => "Owner",
        }
    }
}

/// Checks a submitted password against the value stored in the sheet.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, candidate: &str, stored: &str) -> bool;
}

/// Compares against plaintext sheet columns, case-insensitively, in constant time.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextVerifier;

impl CredentialVerifier for PlaintextVerifier {
    fn verify(&self, candidate: &str, stored: &str) -> bool {
        if stored.is_empty() {
            return false;
        }
        constant_time_eq(
            candidate.to_lowercase().as_bytes(),
            stored.to_lowercase().as_bytes(),
        )
    }
}

/// Verifies against Argon2 PHC strings stored in the credential columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn verify(&self, candidate: &str, stored: &str) -> bool {
        verify_password(&candidate.to_lowercase(), stored).unwrap_or(false)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Hash a password using Argon2
///
/// The password is lowercased first, matching how logins are compared.
///
/// # Arguments
/// * `password` - The plaintext password to hash
///
/// # Returns
/// * `DashboardResult<String>` - The PHC-formatted hash
pub fn hash_password(password: &str) -> DashboardResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.to_lowercase().as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(e) => Err(DashboardError::Validation(format!(
            "Password hashing failed: {}",
            e
        ))),
    }
}

/// Verify a password against a stored hash
///
/// # Returns
/// * `DashboardResult<bool>` - True if the password matches, or an error for a malformed hash
fn verify_password(password: &str, hash: &str) -> DashboardResult<bool> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => {
            return Err(DashboardError::Validation(
                "Invalid password hash format".to_string(),
            ));
        }
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Authenticate a source against the credential columns
///
/// The user column is checked before the owner column, so a password present
/// in both logs in as a plain user. Unknown sources and wrong passwords are
/// reported the same way.
///
/// # Arguments
/// * `table` - Current record snapshot
/// * `source_name` - Source name as typed on the login form
/// * `password` - Password as typed on the login form
/// * `verifier` - How stored credentials are compared
///
/// # Returns
/// * `DashboardResult<Role>` - `User` or `Owner` scoped to the source, or `InvalidCredentials`
pub fn authenticate(
    table: &ServiceTable,
    source_name: &str,
    password: &str,
    verifier: &dyn CredentialVerifier,
) -> DashboardResult<Role> {
    let source = normalize_source(source_name);
    let candidate = password.to_lowercase();
    if source.is_empty() || candidate.is_empty() {
        return Err(DashboardError::InvalidCredentials);
    }

    let rows: Vec<_> = table
        .records()
        .iter()
        .filter(|r| r.belongs_to(&source))
        .collect();

    let user_secrets: BTreeSet<&str> = rows.iter().map(|r| r.password.as_str()).collect();
    if user_secrets.iter().any(|stored| verifier.verify(&candidate, stored)) {
        return Ok(Role::User(source));
    }

    let owner_secrets: BTreeSet<&str> = rows.iter().map(|r| r.owner_password.as_str()).collect();
    if owner_secrets.iter().any(|stored| verifier.verify(&candidate, stored)) {
        return Ok(Role::Owner(source));
    }

    Err(DashboardError::InvalidCredentials)
}

/// User session data
#[derive(Debug, Clone)]
pub struct Session {
    pub role: Role,
    pub expires_at: SystemTime,
}

/// Server-side session storage keyed by the cookie value.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl: ttl.min(MAX_SESSION_TTL),
        }
    }

    /// Create a new session and return its id.
    pub fn create(&self, role: Role) -> String {
        let session_id = Uuid::new_v4().to_string();
        let now = SystemTime::now();
        let session = Session {
            role,
            expires_at: now
                .checked_add(self.ttl)
                .or_else(|| now.checked_add(MAX_SESSION_TTL))
                .unwrap_or(now),
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, s| s.expires_at > SystemTime::now());
        sessions.insert(session_id.clone(), session);

        session_id
    }

    /// The role for a live session, `None` for unknown or expired ids.
    pub fn validate(&self, session_id: &str) -> Option<Role> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());

        sessions
            .get(session_id)
            .filter(|session| session.expires_at > SystemTime::now())
            .map(|session| session.role.clone())
    }

    pub fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Web handler functions below (only compiled with "web" feature)

/// Login form fields
#[cfg(feature = "web")]
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub source_name: String,
    pub password: String,
}

#[cfg(feature = "web")]
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
    pub notice: Option<String>,
}

/// Serve the login page
#[cfg(feature = "web")]
pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<axum::response::Html<String>, DashboardError> {
    state.views.login(query.notice, query.error)
}

/// Handle login requests
///
/// Validates the form against the current snapshot and, on success, stores a
/// session and hands its id to the browser in an HTTP-only cookie.
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let outcome = state.table().and_then(|table| {
        if table.is_empty() {
            return Err(DashboardError::StoreUnavailable(
                "User data is not properly loaded or missing required columns.".to_string(),
            ));
        }
        authenticate(
            &table,
            &form.source_name,
            &form.password,
            state.verifier.as_ref(),
        )
    });

    match outcome {
        Ok(role) => {
            tracing::info!(
                source = role.source_name().unwrap_or_default(),
                role = role.label(),
                "Login successful"
            );
            let session_id = state.sessions.create(role);
            let cookie = Cookie::build((SESSION_COOKIE, session_id))
                .path("/")
                .http_only(true);
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Err(e) => {
            tracing::warn!(source = %form.source_name.trim(), "Login rejected: {}", e);
            let status = match e {
                DashboardError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                ref other => other.status_code(),
            };
            match state.views.login(None, Some(e.to_string())) {
                Ok(page) => (status, page).into_response(),
                Err(render_error) => render_error.into_response(),
            }
        }
    }
}

/// Handle logout
///
/// Drops the server-side session and clears the cookie.
#[cfg(feature = "web")]
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }

    let cookie = Cookie::build((SESSION_COOKIE, "")).path("/");
    (jar.remove(cookie), Redirect::to("/login"))
}

/// Authentication middleware
///
/// Resolves the session cookie into a [`Role`] stored in the request
/// extensions. Requests without a live session are sent to the login page.
#[cfg(feature = "web")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let role = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.validate(cookie.value()))
        .unwrap_or(Role::Anonymous);

    if role == Role::Anonymous {
        return Redirect::to("/login").into_response();
    }

    request.extensions_mut().insert(role);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::fixtures::record;

    fn credentials_table() -> ServiceTable {
        let mut alpha = record("Alpha", "Pune", "Wash", "1", None);
        alpha.password = "Alpha123".into();
        alpha.owner_password = "AlphaBoss".into();

        let mut beta = record("beta", "Delhi", "Wash", "2", None);
        beta.password = "beta-user".into();
        beta.owner_password = "beta-owner".into();

        let mut shared = record("gamma", "Agra", "Wash", "3", None);
        shared.password = "same".into();
        shared.owner_password = "same".into();

        let mut blank = record("delta", "Agra", "Wash", "4", None);
        blank.password = String::new();
        blank.owner_password = String::new();

        ServiceTable::new(vec![alpha, beta, shared, blank])
    }

    #[test]
    fn user_password_gives_user_role() {
        let table = credentials_table();
        let role = authenticate(&table, " ALPHA ", "alpha123", &PlaintextVerifier).unwrap();
        assert_eq!(role, Role::User("alpha".into()));
        assert!(!role.is_owner());
    }

    #[test]
    fn owner_password_gives_owner_role() {
        let table = credentials_table();
        let role = authenticate(&table, "beta", "BETA-OWNER", &PlaintextVerifier).unwrap();
        assert_eq!(role, Role::Owner("beta".into()));
        assert_eq!(role.source_name(), Some("beta"));
    }

    #[test]
    fn user_column_wins_when_both_match() {
        let table = credentials_table();
        assert_eq!(
            authenticate(&table, "gamma", "same", &PlaintextVerifier).unwrap(),
            Role::User("gamma".into())
        );
    }

    #[test]
    fn failures_are_indistinguishable() {
        let table = credentials_table();
        let unknown = authenticate(&table, "nobody", "alpha123", &PlaintextVerifier);
        let wrong = authenticate(&table, "alpha", "nope", &PlaintextVerifier);
        assert_eq!(unknown, Err(DashboardError::InvalidCredentials));
        assert_eq!(unknown, wrong);
    }

    #[test]
    fn blank_credentials_never_match() {
        let table = credentials_table();
        assert!(authenticate(&table, "delta", "", &PlaintextVerifier).is_err());
        assert!(authenticate(&table, "", "alpha123", &PlaintextVerifier).is_err());
    }

    #[test]
    fn argon2_columns_verify() {
        let mut row = record("hashed", "Pune", "Wash", "1", None);
        row.password = hash_password("Letmein").unwrap();
        row.owner_password = hash_password("Boss").unwrap();
        let table = ServiceTable::new(vec![row]);

        assert_eq!(
            authenticate(&table, "hashed", "LETMEIN", &Argon2Verifier).unwrap(),
            Role::User("hashed".into())
        );
        assert_eq!(
            authenticate(&table, "hashed", "boss", &Argon2Verifier).unwrap(),
            Role::Owner("hashed".into())
        );
        assert!(authenticate(&table, "hashed", "wrong", &Argon2Verifier).is_err());
        assert!(!Argon2Verifier.verify("x", "not-a-hash"));
    }

    #[test]
    fn sessions_expire_and_can_be_removed() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(Role::User("alpha".into()));
        assert_eq!(store.validate(&id), Some(Role::User("alpha".into())));
        assert_eq!(store.validate("missing"), None);
        store.remove(&id);
        assert_eq!(store.validate(&id), None);

        let expired = SessionStore::new(Duration::from_secs(0));
        let id = expired.create(Role::Owner("beta".into()));
        assert_eq!(expired.validate(&id), None);
    }

    #[test]
    fn huge_ttl_is_capped() {
        let store = SessionStore::new(Duration::from_secs(u64::MAX));
        let id = store.create(Role::User("alpha".into()));
        assert_eq!(store.validate(&id), Some(Role::User("alpha".into())));

        let sessions = store.sessions.read().unwrap();
        let expires_at = sessions[&id].expires_at;
        assert!(expires_at <= SystemTime::now() + MAX_SESSION_TTL);
    }
}
