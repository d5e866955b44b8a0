use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::require;
use super::error::ApiError;
use super::validation::validate_name;
use crate::db::{Capability, Company, CreateCompanyRequest, User};
use crate::AppState;

/// List all companies (admin only)
///
/// GET /api/companies
pub async fn list_companies(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Company>>, ApiError> {
    require(&user, Capability::ManageCompanies)?;

    let companies =
        sqlx::query_as::<_, Company>("SELECT * FROM companies ORDER BY created_at DESC")
            .fetch_all(&state.db)
            .await?;

    Ok(Json(companies))
}

/// Create a company (admin only). Companies are immutable afterwards.
///
/// POST /api/companies
pub async fn create_company(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateCompanyRequest>,
) -> Result<(StatusCode, Json<Company>), ApiError> {
    require(&user, Capability::ManageCompanies)?;
    validate_name(&req.name).map_err(|e| ApiError::validation_field("name", e))?;

    let company = Company {
        id: Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query("INSERT INTO companies (id, name, created_at) VALUES (?, ?, ?)")
        .bind(&company.id)
        .bind(&company.name)
        .bind(&company.created_at)
        .execute(&state.db)
        .await?;

    tracing::info!(company_id = %company.id, "Created company {}", company.name);
    Ok((StatusCode::CREATED, Json(company)))
}

/// Look up a single company. Public, so registration forms can check an id.
///
/// GET /api/companies/:id
pub async fn get_company(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Company>, ApiError> {
    let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = ?")
        .bind(&id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    Ok(Json(company))
}
