pub mod auth;
mod companies;
mod employees;
pub mod error;
mod notes;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/companies/:id", get(companies::get_company));

    // Protected API routes
    let api_routes = Router::new()
        .route("/auth/me", get(auth::me))
        // Companies
        .route(
            "/companies",
            get(companies::list_companies).post(companies::create_company),
        )
        // Employees
        .route(
            "/employees",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route(
            "/employees/number/:employee_number",
            get(employees::get_employee_by_number),
        )
        .route("/employees/:id", get(employees::get_employee))
        // Notes
        .route("/notes", get(notes::list_notes).post(notes::create_note))
        .route("/notes/export/csv", get(notes::export_notes_csv))
        .route(
            "/notes/employee/:employee_id",
            get(notes::list_employee_notes),
        )
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", public_routes.merge(api_routes))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn health_check() -> &'static str {
    "OK"
}
