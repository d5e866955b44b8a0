use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    Extension, Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_password};
use crate::config::AuthConfig;
use crate::db::{
    AuthSession, Capability, Company, LoginRequest, RegisterRequest, Role, TokenResponse, User,
    UserResponse,
};
use crate::{AppState, DbPool};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Store a new session for the user and return the plaintext token
async fn issue_token(pool: &DbPool, user_id: &str, ttl_days: i64) -> Result<String, ApiError> {
    let token = generate_token();
    let now = chrono::Utc::now();
    let expires_at = (now + chrono::Duration::days(ttl_days)).to_rfc3339();

    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(&expires_at)
    .bind(now.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(token)
}

/// Login endpoint
///
/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = normalize_email(&request.email);

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;

    // Same answer for unknown email and wrong password
    let user = user
        .filter(|u| verify_password(&request.password, &u.password_hash))
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let token = issue_token(&state.db, &user.id, state.config.auth.token_ttl_days).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: UserResponse::from(user),
    }))
}

/// Self-registration into an existing company. Always creates a `user`.
///
/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let email = normalize_email(&request.email);

    let mut errors = ValidationErrorBuilder::new();
    errors.check("email", validate_email(&email));
    errors.check("password", validate_password(&request.password));
    if request.company_id.trim().is_empty() {
        errors.add("company_id", "Company ID is required");
    }
    if matches!(request.role, Some(role) if role != Role::User) {
        errors.add("role", "Self-registration is limited to the user role");
    }
    errors.finish()?;

    let company: Option<Company> = sqlx::query_as("SELECT * FROM companies WHERE id = ?")
        .bind(request.company_id.trim())
        .fetch_optional(&state.db)
        .await?;
    let company =
        company.ok_or_else(|| ApiError::validation_field("company_id", "Company not found"))?;

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        password_hash,
        company_id: company.id,
        role: Role::User.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, company_id, role, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.company_id)
    .bind(&user.role)
    .bind(&user.created_at)
    .execute(&state.db)
    .await
    .map_err(|e| match ApiError::from(e) {
        err if err.status() == axum::http::StatusCode::CONFLICT => {
            ApiError::conflict("Email already registered")
        }
        err => err,
    })?;

    tracing::info!(user_id = %user.id, company_id = %user.company_id, "Registered user");

    let token = issue_token(&state.db, &user.id, state.config.auth.token_ttl_days).await?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: UserResponse::from(user),
    }))
}

/// GET /api/auth/me
pub async fn me(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Extract the bearer token from request headers
fn extract_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve a token to its user, rejecting unknown and expired tokens
pub async fn get_current_user(pool: &DbPool, token: &str) -> Result<User, ApiError> {
    let session: Option<AuthSession> =
        sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .fetch_optional(pool)
            .await?;

    let session = session.ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

    let expired = chrono::DateTime::parse_from_rfc3339(&session.expires_at)
        .map(|expires| expires < chrono::Utc::now())
        .unwrap_or(true);
    if expired {
        return Err(ApiError::unauthorized("Token expired"));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await?;

    user.ok_or_else(|| ApiError::unauthorized("User not found"))
}

/// Auth middleware that validates tokens and exposes the caller as an
/// `Extension<User>` to protected handlers
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?
        .to_string();

    let user = get_current_user(&state.db, &token).await?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Fail with 403 unless the caller's role carries the capability
pub fn require(user: &User, capability: Capability) -> Result<(), ApiError> {
    if user.role_enum().allows(capability) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "Role '{}' is not allowed to perform this action",
            user.role
        )))
    }
}

/// Ensure the configured administrator exists, creating its company on first
/// start. Returns true when the account was created.
pub async fn ensure_admin_user(pool: &DbPool, config: &AuthConfig) -> anyhow::Result<bool> {
    let email = normalize_email(&config.admin_email);

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        tracing::debug!("Admin user {} already exists", email);
        return Ok(false);
    }

    let now = chrono::Utc::now().to_rfc3339();

    let company: Option<(String,)> = sqlx::query_as("SELECT id FROM companies WHERE name = ?")
        .bind(&config.admin_company)
        .fetch_optional(pool)
        .await?;
    let company_id = match company {
        Some((id,)) => id,
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            sqlx::query("INSERT INTO companies (id, name, created_at) VALUES (?, ?, ?)")
                .bind(&id)
                .bind(&config.admin_company)
                .bind(&now)
                .execute(pool)
                .await?;
            id
        }
    };

    let password_hash = hash_password(&config.admin_password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, company_id, role, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&email)
    .bind(&password_hash)
    .bind(&company_id)
    .bind(Role::Admin.to_string())
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!("Created admin user {}", email);
    Ok(true)
}
