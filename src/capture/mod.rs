//! Note capture workflow.
//!
//! [`NoteCaptureController`] drives one operator through
//! scan → identify → (register) → write note. All workflow flags live in the
//! single [`CaptureState`] value; every transition takes `&mut self`, so only
//! one backend action is ever in flight per controller.

use std::sync::Arc;

use crate::api::validation::validate_note_text;
use crate::client::BackendStore;
use crate::db::{Capability, CreateNoteRequest, Employee, Note};
use crate::error::{Error, Result};
use crate::resolver::{IdentificationResolver, Resolution};
use crate::scanner::{ScanHandle, ScanOutcome, Scanner};
use crate::session::{CompanyScope, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    AwaitingScan,
    BarcodeCaptured { barcode: String },
    EmployeeNeedsCreation { barcode: String },
    EmployeeResolved { employee: Employee },
    NoteEntry { employee: Employee, draft: String },
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureState::Idle => "idle",
            CaptureState::AwaitingScan => "awaiting a scan",
            CaptureState::BarcodeCaptured { .. } => "a barcode is captured",
            CaptureState::EmployeeNeedsCreation { .. } => "the employee needs registering",
            CaptureState::EmployeeResolved { .. } => "an employee is selected",
            CaptureState::NoteEntry { .. } => "writing a note",
        }
    }

    pub fn employee(&self) -> Option<&Employee> {
        match self {
            CaptureState::EmployeeResolved { employee } | CaptureState::NoteEntry { employee, .. } => {
                Some(employee)
            }
            _ => None,
        }
    }

    pub fn barcode(&self) -> Option<&str> {
        match self {
            CaptureState::BarcodeCaptured { barcode }
            | CaptureState::EmployeeNeedsCreation { barcode } => Some(barcode),
            CaptureState::EmployeeResolved { employee } | CaptureState::NoteEntry { employee, .. } => {
                Some(&employee.employee_number)
            }
            _ => None,
        }
    }
}

pub struct NoteCaptureController {
    backend: Arc<dyn BackendStore>,
    resolver: IdentificationResolver,
    scanner: Scanner,
    scope: CompanyScope,
    state: CaptureState,
    scan: Option<ScanHandle>,
    last_error: Option<String>,
}

impl NoteCaptureController {
    pub fn new(session: &Session, backend: Arc<dyn BackendStore>, scanner: Scanner) -> Result<Self> {
        session.require(Capability::CaptureNotes)?;

        Ok(Self {
            resolver: IdentificationResolver::new(backend.clone()),
            backend,
            scanner,
            scope: session.scope(),
            state: CaptureState::Idle,
            scan: None,
            last_error: None,
        })
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    /// Message of the most recent failure, kept until the next successful step
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Open the camera. `Ok(false)` if a scan is already running.
    pub fn start_scan(&mut self) -> Result<bool> {
        match self.state {
            CaptureState::Idle => {
                self.scan = Some(self.scanner.start());
                self.transition(CaptureState::AwaitingScan);
                Ok(true)
            }
            CaptureState::AwaitingScan => Ok(false),
            _ => Err(self.invalid()),
        }
    }

    /// Wait for the running scan and resolve whatever it decoded
    pub async fn await_scan(&mut self) -> Result<()> {
        if self.state != CaptureState::AwaitingScan {
            return Err(self.invalid());
        }
        let outcome = match self.scan.as_mut() {
            Some(scan) => scan.outcome().await,
            None => Ok(ScanOutcome::Ended),
        };
        // Reached only once the loop has finished. An abandoned wait keeps
        // the handle so cancel_scan/reset can still join it.
        self.scan = None;

        match outcome {
            Ok(ScanOutcome::Decoded(barcode)) => {
                self.transition(CaptureState::BarcodeCaptured { barcode });
                self.resolve_captured().await
            }
            Ok(ScanOutcome::Cancelled) | Ok(ScanOutcome::Ended) => {
                self.transition(CaptureState::Idle);
                Ok(())
            }
            Err(e) => {
                self.state = CaptureState::Idle;
                Err(self.record(e))
            }
        }
    }

    /// Close the camera and go back to idle
    pub async fn cancel_scan(&mut self) -> Result<()> {
        if self.state != CaptureState::AwaitingScan {
            return Err(self.invalid());
        }
        self.close_scan().await;
        self.transition(CaptureState::Idle);
        Ok(())
    }

    /// Repeat the lookup after a failed resolve
    pub async fn retry_resolve(&mut self) -> Result<()> {
        if !matches!(self.state, CaptureState::BarcodeCaptured { .. }) {
            return Err(self.invalid());
        }
        self.resolve_captured().await
    }

    /// Pick an employee from the company list, skipping the scan
    pub fn select_employee(&mut self, employee: Employee) -> Result<()> {
        if self.state != CaptureState::Idle {
            return Err(self.invalid());
        }
        if !self.scope.contains(&employee.company_id) {
            return Err(self.record(Error::validation(
                "Selected employee does not belong to your company",
            )));
        }
        self.transition(CaptureState::EmployeeResolved { employee });
        Ok(())
    }

    /// Register the scanned, unknown badge under `name`
    pub async fn create_employee(&mut self, name: &str) -> Result<Employee> {
        let CaptureState::EmployeeNeedsCreation { barcode } = &self.state else {
            return Err(self.invalid());
        };

        match self.resolver.create_employee(barcode, name, &self.scope).await {
            Ok(employee) => {
                self.transition(CaptureState::EmployeeResolved {
                    employee: employee.clone(),
                });
                Ok(employee)
            }
            Err(e) => Err(self.record(e)),
        }
    }

    pub fn open_note_form(&mut self) -> Result<()> {
        let CaptureState::EmployeeResolved { employee } = &self.state else {
            return Err(self.invalid());
        };
        let employee = employee.clone();
        self.transition(CaptureState::NoteEntry {
            employee,
            draft: String::new(),
        });
        Ok(())
    }

    /// Persist the note. On success the workflow starts over; on failure the
    /// text stays in the form.
    pub async fn submit_note(&mut self, text: &str) -> Result<Note> {
        let employee_id = match &mut self.state {
            CaptureState::NoteEntry { employee, draft } => {
                *draft = text.to_string();
                Some(employee.id.clone())
            }
            _ => None,
        };
        let Some(employee_id) = employee_id else {
            if matches!(self.state, CaptureState::EmployeeResolved { .. }) {
                return Err(self.invalid());
            }
            return Err(self.record(Error::validation("No employee selected")));
        };
        validate_note_text(text).map_err(|e| self.record(Error::Validation(e)))?;

        let request = CreateNoteRequest {
            employee_id,
            note_text: text.to_string(),
        };
        match self.backend.create_note(&request).await {
            Ok(note) => {
                tracing::info!(note_id = %note.id, employee_id = %note.employee_id, "Note saved");
                self.transition(CaptureState::Idle);
                Ok(note)
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Abandon the workflow from any state
    pub async fn reset(&mut self) {
        self.close_scan().await;
        self.transition(CaptureState::Idle);
    }

    async fn resolve_captured(&mut self) -> Result<()> {
        let CaptureState::BarcodeCaptured { barcode } = &self.state else {
            return Err(self.invalid());
        };

        match self.resolver.resolve(barcode, &self.scope).await {
            Ok(Resolution::Found(employee)) => {
                self.transition(CaptureState::EmployeeResolved { employee });
                Ok(())
            }
            Ok(Resolution::NotFound { barcode }) => {
                self.transition(CaptureState::EmployeeNeedsCreation { barcode });
                Ok(())
            }
            Err(e) => Err(self.record(e)),
        }
    }

    async fn close_scan(&mut self) {
        if let Some(scan) = self.scan.take() {
            scan.close().await;
        }
    }

    fn transition(&mut self, next: CaptureState) {
        tracing::debug!(from = self.state.name(), to = next.name(), "Capture state change");
        self.state = next;
        self.last_error = None;
    }

    fn record(&mut self, error: Error) -> Error {
        tracing::warn!(state = self.state.name(), "Capture step failed: {}", error);
        self.last_error = Some(error.to_string());
        error
    }

    fn invalid(&self) -> Error {
        Error::InvalidState(self.state.name())
    }
}
