//! Router tests against an in-memory database.
//!
//! Tests cover:
//! - Health endpoint (no auth required)
//! - Token authentication on protected routes
//! - Registration rules
//! - Admin-only company management
//! - Per-company employee uniqueness and scoping
//! - Notes and the CSV report

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method

use badgenotes::config::{AuthConfig, Config};
use badgenotes::{api, db, AppState};

const ADMIN_EMAIL: &str = "admin@test.local";
const ADMIN_PASSWORD: &str = "admin-password";

/// Test helper: Router over a fresh database with a known administrator
async fn setup_app() -> Router {
    let pool = db::init_in_memory().await.expect("Should open database");
    let config = Config {
        auth: AuthConfig {
            admin_email: ADMIN_EMAIL.to_string(),
            admin_password: ADMIN_PASSWORD.to_string(),
            ..AuthConfig::default()
        },
        ..Config::default()
    };
    api::auth::ensure_admin_user(&pool, &config.auth)
        .await
        .expect("Should create admin");

    api::create_router(Arc::new(AppState::new(config, pool)))
}

/// Test helper: Build a request with an optional bearer token and JSON body
fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Test helper: Send a request and return status plus JSON body
async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["access_token"].as_str().unwrap().to_string()
}

async fn create_company(app: &Router, admin_token: &str, name: &str) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/companies",
            Some(admin_token),
            Some(json!({ "name": name })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn register(app: &Router, email: &str, company_id: &str) -> (StatusCode, Value) {
    send(
        app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": email,
                "password": "password123",
                "company_id": company_id,
                "role": "user"
            })),
        ),
    )
    .await
}

/// Admin creates a company, a user registers into it and logs in
async fn user_token(app: &Router, company: &str, email: &str) -> (String, String) {
    let admin = login(app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let company_id = create_company(app, &admin, company).await;
    let (status, body) = register(app, email, &company_id).await;
    assert_eq!(status, StatusCode::OK, "register failed: {}", body);
    (body["access_token"].as_str().unwrap().to_string(), company_id)
}

// =============================================================================
// Health and authentication
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_auth_required() {
    let app = setup_app().await;
    let response = app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = setup_app().await;

    for uri in ["/api/auth/me", "/api/employees", "/api/notes", "/api/notes/export/csv"] {
        let (status, body) = send(&app, request("GET", uri, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["code"], "unauthorized");
        assert!(body["detail"].is_string());
    }

    let (status, _) = send(&app, request("GET", "/api/notes", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_bad_password() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": ADMIN_EMAIL, "password": "wrong-password" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Invalid credentials");
}

#[tokio::test]
async fn test_me_returns_role_and_company() {
    let app = setup_app().await;
    let token = login(&app, "ADMIN@test.local", ADMIN_PASSWORD).await;

    let (status, body) = send(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], ADMIN_EMAIL);
    assert_eq!(body["role"], "admin");
    assert!(body["company_id"].is_string());
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_unknown_company_is_validation_error() {
    let app = setup_app().await;
    let (status, body) = register(&app, "jane@acme.com", "no-such-company").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert!(body["fields"]["company_id"].is_array());
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = setup_app().await;
    let (_, company_id) = user_token(&app, "Acme", "jane@acme.com").await;

    let (status, body) = register(&app, "Jane@Acme.com", &company_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Email already registered");
}

#[tokio::test]
async fn test_register_cannot_create_admin() {
    let app = setup_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let company_id = create_company(&app, &admin, "Acme").await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "email": "mallory@acme.com",
                "password": "password123",
                "company_id": company_id,
                "role": "admin"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Companies
// =============================================================================

#[tokio::test]
async fn test_companies_are_admin_only() {
    let app = setup_app().await;
    let (user, company_id) = user_token(&app, "Acme", "jane@acme.com").await;

    let (status, body) = send(&app, request("GET", "/api/companies", Some(&user), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    // Single lookup is public
    let (status, body) = send(
        &app,
        request("GET", &format!("/api/companies/{}", company_id), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Acme");

    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (status, body) = send(&app, request("GET", "/api/companies", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    // Administration plus Acme
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_cannot_capture_notes() {
    let app = setup_app().await;
    let admin = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/employees",
            Some(&admin),
            Some(json!({ "employee_number": "EMP001", "name": "Jane Doe" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// =============================================================================
// Employees
// =============================================================================

#[tokio::test]
async fn test_duplicate_employee_number_conflicts() {
    let app = setup_app().await;
    let (token, _) = user_token(&app, "Acme", "jane@acme.com").await;

    let create = |name: &str| {
        request(
            "POST",
            "/api/employees",
            Some(&token),
            Some(json!({ "employee_number": "EMP001", "name": name })),
        )
    };

    let (status, body) = send(&app, create("Jane Doe")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["employee_number"], "EMP001");

    let (status, body) = send(&app, create("Janet Doe")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Employee number already exists");
}

#[tokio::test]
async fn test_same_badge_number_in_two_companies() {
    let app = setup_app().await;
    let (acme, _) = user_token(&app, "Acme", "jane@acme.com").await;
    let (globex, _) = user_token(&app, "Globex", "hank@globex.com").await;

    for token in [&acme, &globex] {
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/employees",
                Some(token),
                Some(json!({ "employee_number": "EMP001", "name": "Someone" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    // Each company only sees its own employee
    let (status, body) = send(&app, request("GET", "/api/employees", Some(&acme), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_lookup_by_number() {
    let app = setup_app().await;
    let (token, company_id) = user_token(&app, "Acme", "jane@acme.com").await;

    let (status, body) = send(
        &app,
        request("GET", "/api/employees/number/EMP404", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Employee not found");

    send(
        &app,
        request(
            "POST",
            "/api/employees",
            Some(&token),
            Some(json!({ "employee_number": "EMP001", "name": "Jane Doe" })),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        request("GET", "/api/employees/number/EMP001", Some(&token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Jane Doe");
    assert_eq!(body["company_id"], company_id.as_str());
}

#[tokio::test]
async fn test_invalid_employee_fields() {
    let app = setup_app().await;
    let (token, _) = user_token(&app, "Acme", "jane@acme.com").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/employees",
            Some(&token),
            Some(json!({ "employee_number": "EMP 001", "name": "  " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fields"]["employee_number"].is_array());
    assert!(body["fields"]["name"].is_array());
}

// =============================================================================
// Notes
// =============================================================================

#[tokio::test]
async fn test_notes_and_export() {
    let app = setup_app().await;
    let (token, _) = user_token(&app, "Acme", "jane@acme.com").await;

    let (_, employee) = send(
        &app,
        request(
            "POST",
            "/api/employees",
            Some(&token),
            Some(json!({ "employee_number": "EMP001", "name": "Doe, Jane" })),
        ),
    )
    .await;
    let employee_id = employee["id"].as_str().unwrap();

    let (status, note) = send(
        &app,
        request(
            "POST",
            "/api/notes",
            Some(&token),
            Some(json!({ "employee_id": employee_id, "note_text": "Late arrival" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(note["employee_id"], employee_id);
    assert!(note["timestamp"].is_string());

    let (status, notes) = send(
        &app,
        request(
            "GET",
            &format!("/api/notes/employee/{}", employee_id),
            Some(&token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notes.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(request("GET", "/api/notes/export/csv", Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("notizen_export_"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("Mitarbeiternummer,Name,Notiz,Timestamp,Erstellt am")
    );
    let row = lines.next().unwrap();
    assert!(row.starts_with("EMP001,\"Doe, Jane\",Late arrival,"));
}

#[tokio::test]
async fn test_note_for_other_company_employee_is_not_found() {
    let app = setup_app().await;
    let (acme, _) = user_token(&app, "Acme", "jane@acme.com").await;
    let (globex, _) = user_token(&app, "Globex", "hank@globex.com").await;

    let (_, employee) = send(
        &app,
        request(
            "POST",
            "/api/employees",
            Some(&acme),
            Some(json!({ "employee_number": "EMP001", "name": "Jane Doe" })),
        ),
    )
    .await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/notes",
            Some(&globex),
            Some(json!({ "employee_id": employee["id"], "note_text": "Sneaky" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blank_note_rejected() {
    let app = setup_app().await;
    let (token, _) = user_token(&app, "Acme", "jane@acme.com").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/notes",
            Some(&token),
            Some(json!({ "employee_id": "whatever", "note_text": "   " })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
}
