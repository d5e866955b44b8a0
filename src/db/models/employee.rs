//! Employee models. An employee number is unique within its company only.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub id: String,
    /// Value encoded on the badge barcode
    pub employee_number: String,
    pub name: String,
    pub company_id: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmployeeRequest {
    pub employee_number: String,
    pub name: String,
}
