use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::require;
use super::error::ApiError;
use super::validation::validate_note_text;
use crate::db::{Capability, CreateNoteRequest, Employee, Note, NoteExportRow, User};
use crate::AppState;

const CSV_HEADER: [&str; 5] = ["Mitarbeiternummer", "Name", "Notiz", "Timestamp", "Erstellt am"];

/// Notes of the caller's company, newest first
///
/// GET /api/notes
pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Note>>, ApiError> {
    require(&user, Capability::ViewNotes)?;

    let notes = sqlx::query_as::<_, Note>(
        r#"
        SELECT n.* FROM notes n
        JOIN employees e ON e.id = n.employee_id
        WHERE e.company_id = ?
        ORDER BY n.timestamp DESC
        "#,
    )
    .bind(&user.company_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(notes))
}

/// GET /api/notes/employee/:employee_id
pub async fn list_employee_notes(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(employee_id): Path<String>,
) -> Result<Json<Vec<Note>>, ApiError> {
    require(&user, Capability::ViewNotes)?;
    find_company_employee(&state, &user, &employee_id).await?;

    let notes = sqlx::query_as::<_, Note>(
        "SELECT * FROM notes WHERE employee_id = ? ORDER BY timestamp DESC",
    )
    .bind(&employee_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(notes))
}

/// Append a note. The timestamp is taken here, at submission time.
///
/// POST /api/notes
pub async fn create_note(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    require(&user, Capability::CaptureNotes)?;
    validate_note_text(&req.note_text).map_err(|e| ApiError::validation_field("note_text", e))?;

    // Employees of other companies are indistinguishable from missing ones
    let employee = find_company_employee(&state, &user, &req.employee_id).await?;

    let now = chrono::Utc::now().to_rfc3339();
    let note = Note {
        id: Uuid::new_v4().to_string(),
        employee_id: employee.id,
        note_text: req.note_text,
        timestamp: now.clone(),
        created_by: user.id.clone(),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO notes (id, employee_id, note_text, timestamp, created_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&note.id)
    .bind(&note.employee_id)
    .bind(&note.note_text)
    .bind(&note.timestamp)
    .bind(&note.created_by)
    .bind(&note.created_at)
    .execute(&state.db)
    .await?;

    tracing::info!(note_id = %note.id, employee_id = %note.employee_id, "Created note");
    Ok((StatusCode::CREATED, Json(note)))
}

/// CSV report of all notes of the caller's company
///
/// GET /api/notes/export/csv
pub async fn export_notes_csv(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    require(&user, Capability::ExportNotes)?;

    let rows = sqlx::query_as::<_, NoteExportRow>(
        r#"
        SELECT e.employee_number, e.name, n.note_text, n.timestamp, n.created_at
        FROM notes n
        JOIN employees e ON e.id = n.employee_id
        WHERE e.company_id = ?
        ORDER BY n.timestamp DESC
        "#,
    )
    .bind(&user.company_id)
    .fetch_all(&state.db)
    .await?;

    let body = render_csv(&rows);
    let filename = format!(
        "notizen_export_{}.csv",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );

    tracing::info!(rows = rows.len(), company_id = %user.company_id, "Exported notes");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        body,
    ))
}

async fn find_company_employee(
    state: &AppState,
    user: &User,
    employee_id: &str,
) -> Result<Employee, ApiError> {
    sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ? AND company_id = ?")
        .bind(employee_id)
        .bind(&user.company_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))
}

fn render_csv(rows: &[NoteExportRow]) -> String {
    let mut out = String::new();
    push_record(&mut out, &CSV_HEADER);
    for row in rows {
        push_record(
            &mut out,
            &[
                row.employee_number.as_str(),
                row.name.as_str(),
                row.note_text.as_str(),
                row.timestamp.as_str(),
                row.created_at.as_str(),
            ],
        );
    }
    out
}

fn push_record(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_csv_field(field));
    }
    out.push_str("\r\n");
}

/// RFC 4180 quoting: wrap in quotes when needed, double embedded quotes
fn escape_csv_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_csv_field() {
        assert_eq!(escape_csv_field("Late arrival"), "Late arrival");
        assert_eq!(escape_csv_field("Doe, Jane"), "\"Doe, Jane\"");
        assert_eq!(escape_csv_field("said \"hi\""), "\"said \"\"hi\"\"\"");
        assert_eq!(escape_csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_render_csv() {
        let rows = vec![NoteExportRow {
            employee_number: "EMP001".into(),
            name: "Jane Doe".into(),
            note_text: "Late arrival, again".into(),
            timestamp: "2026-10-19T08:00:00+00:00".into(),
            created_at: "2026-10-19T08:00:00+00:00".into(),
        }];

        let csv = render_csv(&rows);
        let mut lines = csv.split("\r\n");
        assert_eq!(
            lines.next(),
            Some("Mitarbeiternummer,Name,Notiz,Timestamp,Erstellt am")
        );
        assert_eq!(
            lines.next(),
            Some("EMP001,Jane Doe,\"Late arrival, again\",2026-10-19T08:00:00+00:00,2026-10-19T08:00:00+00:00")
        );
        assert_eq!(lines.next(), Some(""));
    }

    #[test]
    fn test_render_empty_report_has_header_only() {
        assert_eq!(
            render_csv(&[]),
            "Mitarbeiternummer,Name,Notiz,Timestamp,Erstellt am\r\n"
        );
    }
}
