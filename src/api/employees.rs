use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::require;
use super::error::{ApiError, ErrorCode, ValidationErrorBuilder};
use super::validation::{validate_employee_number, validate_name};
use crate::db::{Capability, CreateEmployeeRequest, Employee, User};
use crate::AppState;

/// List the caller's company employees
///
/// GET /api/employees
pub async fn list_employees(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Employee>>, ApiError> {
    require(&user, Capability::ViewNotes)?;

    let employees = sqlx::query_as::<_, Employee>(
        "SELECT * FROM employees WHERE company_id = ? ORDER BY name",
    )
    .bind(&user.company_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(employees))
}

/// Create an employee in the caller's company.
///
/// The (company_id, employee_number) pair is unique at the storage level, so
/// two concurrent creations of the same badge resolve to exactly one 409.
///
/// POST /api/employees
pub async fn create_employee(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateEmployeeRequest>,
) -> Result<(StatusCode, Json<Employee>), ApiError> {
    require(&user, Capability::CaptureNotes)?;

    let employee_number = req.employee_number.trim();
    let mut errors = ValidationErrorBuilder::new();
    errors.check("employee_number", validate_employee_number(employee_number));
    errors.check("name", validate_name(&req.name));
    errors.finish()?;

    let employee = Employee {
        id: Uuid::new_v4().to_string(),
        employee_number: employee_number.to_string(),
        name: req.name.trim().to_string(),
        company_id: user.company_id.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        "INSERT INTO employees (id, employee_number, name, company_id, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&employee.id)
    .bind(&employee.employee_number)
    .bind(&employee.name)
    .bind(&employee.company_id)
    .bind(&employee.created_at)
    .execute(&state.db)
    .await
    .map_err(|e| match ApiError::from(e) {
        err if err.code() == ErrorCode::Conflict => {
            ApiError::conflict("Employee number already exists")
        }
        err => err,
    })?;

    tracing::info!(
        employee_id = %employee.id,
        company_id = %employee.company_id,
        "Created employee {}",
        employee.employee_number
    );
    Ok((StatusCode::CREATED, Json(employee)))
}

/// GET /api/employees/:id
pub async fn get_employee(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Employee>, ApiError> {
    require(&user, Capability::ViewNotes)?;

    let employee = sqlx::query_as::<_, Employee>(
        "SELECT * FROM employees WHERE id = ? AND company_id = ?",
    )
    .bind(&id)
    .bind(&user.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    Ok(Json(employee))
}

/// Badge lookup. A 404 here is the normal "unknown badge" answer.
///
/// GET /api/employees/number/:employee_number
pub async fn get_employee_by_number(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(employee_number): Path<String>,
) -> Result<Json<Employee>, ApiError> {
    require(&user, Capability::CaptureNotes)?;

    let employee = sqlx::query_as::<_, Employee>(
        "SELECT * FROM employees WHERE employee_number = ? AND company_id = ?",
    )
    .bind(employee_number.trim())
    .bind(&user.company_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    Ok(Json(employee))
}
