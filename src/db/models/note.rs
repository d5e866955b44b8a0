//! Note models. Notes are append-only.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: String,
    pub employee_id: String,
    pub note_text: String,
    /// Set by the store when the note is submitted
    pub timestamp: String,
    /// Id of the authoring user
    #[serde(alias = "user_id")]
    pub created_by: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNoteRequest {
    pub employee_id: String,
    pub note_text: String,
}

/// Note joined with its employee, used for the CSV report
#[derive(Debug, Clone, FromRow)]
pub struct NoteExportRow {
    pub employee_number: String,
    pub name: String,
    pub note_text: String,
    pub timestamp: String,
    pub created_at: String,
}
