//! Maps a scanned barcode to an employee of the caller's company.

use std::sync::Arc;

use crate::api::validation::validate_name;
use crate::client::BackendStore;
use crate::db::{CreateEmployeeRequest, Employee};
use crate::error::{Error, Result};
use crate::session::CompanyScope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Employee),
    /// Unknown badge: the operator has to name the employee
    NotFound { barcode: String },
}

pub struct IdentificationResolver {
    backend: Arc<dyn BackendStore>,
}

impl IdentificationResolver {
    pub fn new(backend: Arc<dyn BackendStore>) -> Self {
        Self { backend }
    }

    pub async fn resolve(&self, barcode: &str, scope: &CompanyScope) -> Result<Resolution> {
        let barcode = normalize_barcode(barcode)?;

        match self.backend.find_employee_by_number(barcode).await {
            Ok(employee) => {
                ensure_in_scope(&employee, scope)?;
                tracing::debug!(employee_id = %employee.id, "Badge {} resolved", barcode);
                Ok(Resolution::Found(employee))
            }
            Err(Error::NotFound(_)) => {
                tracing::debug!("Badge {} is not registered", barcode);
                Ok(Resolution::NotFound {
                    barcode: barcode.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Register the badge under `name`. A `Conflict` means someone else
    /// registered it first; it is returned as-is.
    pub async fn create_employee(
        &self,
        barcode: &str,
        name: &str,
        scope: &CompanyScope,
    ) -> Result<Employee> {
        let barcode = normalize_barcode(barcode)?;
        validate_name(name).map_err(Error::Validation)?;

        let request = CreateEmployeeRequest {
            employee_number: barcode.to_string(),
            name: name.trim().to_string(),
        };
        let employee = self.backend.create_employee(&request).await?;
        ensure_in_scope(&employee, scope)?;

        tracing::info!(employee_id = %employee.id, "Registered badge {}", barcode);
        Ok(employee)
    }
}

fn normalize_barcode(barcode: &str) -> Result<&str> {
    let barcode = barcode.trim();
    if barcode.is_empty() {
        return Err(Error::validation("Barcode is empty"));
    }
    Ok(barcode)
}

fn ensure_in_scope(employee: &Employee, scope: &CompanyScope) -> Result<()> {
    if scope.contains(&employee.company_id) {
        Ok(())
    } else {
        Err(Error::Forbidden(
            "employee belongs to another company".to_string(),
        ))
    }
}
