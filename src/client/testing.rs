//! In-memory Backend Store for unit tests.
//!
//! Mirrors the reference server's rules (token check, capabilities, company
//! scoping, per-company badge uniqueness) without a socket.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::{BackendStore, ByteStream};
use crate::db::{
    Capability, Company, CreateEmployeeRequest, CreateNoteRequest, Employee, LoginRequest, Note,
    RegisterRequest, Role, TokenResponse, UserResponse,
};
use crate::error::{Error, Result};
use crate::session::SessionContext;

#[derive(Default)]
struct State {
    companies: Vec<Company>,
    users: Vec<(UserResponse, String)>,
    /// token -> user id
    tokens: HashMap<String, String>,
    employees: Vec<Employee>,
    notes: Vec<Note>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, Error>,
}

pub struct MemoryBackend {
    session: SessionContext,
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new(session: SessionContext) -> Self {
        Self {
            session,
            state: Mutex::new(State::default()),
        }
    }

    pub fn seed_company(&self, name: &str) -> Company {
        let company = Company {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: now(),
        };
        self.state.lock().companies.push(company.clone());
        company
    }

    pub fn seed_user(&self, email: &str, password: &str, company_id: &str, role: Role) -> UserResponse {
        let user = UserResponse {
            id: Uuid::new_v4().to_string(),
            email: email.to_lowercase(),
            role,
            company_id: company_id.to_string(),
        };
        self.state
            .lock()
            .users
            .push((user.clone(), password.to_string()));
        user
    }

    /// Simulates another session creating the employee behind our back
    pub fn seed_employee(&self, company_id: &str, employee_number: &str, name: &str) -> Employee {
        let employee = Employee {
            id: Uuid::new_v4().to_string(),
            employee_number: employee_number.to_string(),
            name: name.to_string(),
            company_id: company_id.to_string(),
            created_at: now(),
        };
        self.state.lock().employees.push(employee.clone());
        employee
    }

    /// Invalidate every issued token, as an expiry would
    pub fn revoke_tokens(&self) {
        self.state.lock().tokens.clear();
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: &'static str, error: Error) {
        self.state.lock().failures.insert(operation, error);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn notes(&self) -> Vec<Note> {
        self.state.lock().notes.clone()
    }

    pub fn employees(&self) -> Vec<Employee> {
        self.state.lock().employees.clone()
    }

    fn enter(&self, operation: &'static str) -> Result<()> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_insert(0) += 1;
        match state.failures.remove(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn authenticate(&self, capability: Option<Capability>) -> Result<UserResponse> {
        let token = self
            .session
            .token()
            .ok_or_else(|| Error::Unauthorized("Missing authorization token".to_string()))?;

        let state = self.state.lock();
        let user_id = state
            .tokens
            .get(&token)
            .ok_or_else(|| Error::Unauthorized("Invalid token".to_string()))?;
        let user = state
            .users
            .iter()
            .map(|(user, _)| user)
            .find(|user| &user.id == user_id)
            .cloned()
            .ok_or_else(|| Error::Unauthorized("User not found".to_string()))?;

        if let Some(capability) = capability {
            if !user.role.allows(capability) {
                return Err(Error::Forbidden("Insufficient permissions".to_string()));
            }
        }
        Ok(user)
    }

    fn issue(&self, user: UserResponse) -> TokenResponse {
        let token = Uuid::new_v4().simple().to_string();
        self.state.lock().tokens.insert(token.clone(), user.id.clone());
        TokenResponse {
            access_token: token,
            token_type: "bearer".to_string(),
            user,
        }
    }

    fn company_employee(&self, user: &UserResponse, employee_id: &str) -> Result<Employee> {
        self.state
            .lock()
            .employees
            .iter()
            .find(|e| e.id == employee_id && e.company_id == user.company_id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Employee not found".to_string()))
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl BackendStore for MemoryBackend {
    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse> {
        self.enter("login")?;
        let email = request.email.trim().to_lowercase();
        let user = self
            .state
            .lock()
            .users
            .iter()
            .find(|(user, password)| user.email == email && *password == request.password)
            .map(|(user, _)| user.clone())
            .ok_or_else(|| Error::Auth("Invalid credentials".to_string()))?;
        Ok(self.issue(user))
    }

    async fn register(&self, request: &RegisterRequest) -> Result<TokenResponse> {
        self.enter("register")?;
        if request.role.unwrap_or(Role::User) != Role::User {
            return Err(Error::validation("Only user accounts can be registered"));
        }

        let email = request.email.trim().to_lowercase();
        {
            let state = self.state.lock();
            if !state.companies.iter().any(|c| c.id == request.company_id) {
                return Err(Error::validation("Company not found"));
            }
            if state.users.iter().any(|(user, _)| user.email == email) {
                return Err(Error::Conflict("Email already registered".to_string()));
            }
        }

        let user = self.seed_user(&email, &request.password, &request.company_id, Role::User);
        Ok(self.issue(user))
    }

    async fn current_user(&self) -> Result<UserResponse> {
        self.enter("current_user")?;
        self.authenticate(None)
    }

    async fn list_companies(&self) -> Result<Vec<Company>> {
        self.enter("list_companies")?;
        self.authenticate(Some(Capability::ManageCompanies))?;
        Ok(self.state.lock().companies.clone())
    }

    async fn create_company(&self, name: &str) -> Result<Company> {
        self.enter("create_company")?;
        self.authenticate(Some(Capability::ManageCompanies))?;
        if name.trim().is_empty() {
            return Err(Error::validation("Name is required"));
        }
        Ok(self.seed_company(name.trim()))
    }

    async fn get_company(&self, id: &str) -> Result<Company> {
        self.enter("get_company")?;
        self.state
            .lock()
            .companies
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Company not found".to_string()))
    }

    async fn list_employees(&self) -> Result<Vec<Employee>> {
        self.enter("list_employees")?;
        let user = self.authenticate(Some(Capability::ViewNotes))?;
        Ok(self
            .state
            .lock()
            .employees
            .iter()
            .filter(|e| e.company_id == user.company_id)
            .cloned()
            .collect())
    }

    async fn get_employee(&self, id: &str) -> Result<Employee> {
        self.enter("get_employee")?;
        let user = self.authenticate(Some(Capability::ViewNotes))?;
        self.company_employee(&user, id)
    }

    async fn find_employee_by_number(&self, employee_number: &str) -> Result<Employee> {
        self.enter("find_employee_by_number")?;
        let user = self.authenticate(Some(Capability::CaptureNotes))?;
        self.state
            .lock()
            .employees
            .iter()
            .find(|e| e.employee_number == employee_number && e.company_id == user.company_id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Employee not found".to_string()))
    }

    async fn create_employee(&self, request: &CreateEmployeeRequest) -> Result<Employee> {
        self.enter("create_employee")?;
        let user = self.authenticate(Some(Capability::CaptureNotes))?;
        if request.name.trim().is_empty() {
            return Err(Error::validation("Name is required"));
        }

        let exists = self.state.lock().employees.iter().any(|e| {
            e.company_id == user.company_id && e.employee_number == request.employee_number
        });
        if exists {
            return Err(Error::Conflict("Employee number already exists".to_string()));
        }
        Ok(self.seed_employee(&user.company_id, &request.employee_number, request.name.trim()))
    }

    async fn list_notes(&self) -> Result<Vec<Note>> {
        self.enter("list_notes")?;
        let user = self.authenticate(Some(Capability::ViewNotes))?;
        let state = self.state.lock();
        let mut notes: Vec<Note> = state
            .notes
            .iter()
            .filter(|n| {
                state
                    .employees
                    .iter()
                    .any(|e| e.id == n.employee_id && e.company_id == user.company_id)
            })
            .cloned()
            .collect();
        notes.reverse();
        Ok(notes)
    }

    async fn list_employee_notes(&self, employee_id: &str) -> Result<Vec<Note>> {
        self.enter("list_employee_notes")?;
        let user = self.authenticate(Some(Capability::ViewNotes))?;
        self.company_employee(&user, employee_id)?;
        let mut notes: Vec<Note> = self
            .state
            .lock()
            .notes
            .iter()
            .filter(|n| n.employee_id == employee_id)
            .cloned()
            .collect();
        notes.reverse();
        Ok(notes)
    }

    async fn create_note(&self, request: &CreateNoteRequest) -> Result<Note> {
        self.enter("create_note")?;
        let user = self.authenticate(Some(Capability::CaptureNotes))?;
        if request.note_text.trim().is_empty() {
            return Err(Error::validation("Note text is required"));
        }
        let employee = self.company_employee(&user, &request.employee_id)?;

        let timestamp = now();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            employee_id: employee.id,
            note_text: request.note_text.clone(),
            timestamp: timestamp.clone(),
            created_by: user.id,
            created_at: timestamp,
        };
        self.state.lock().notes.push(note.clone());
        Ok(note)
    }

    async fn export_notes(&self) -> Result<ByteStream> {
        self.enter("export_notes")?;
        let user = self.authenticate(Some(Capability::ExportNotes))?;

        let state = self.state.lock();
        let mut chunks = vec![Ok(Bytes::from_static(
            b"Mitarbeiternummer,Name,Notiz,Timestamp,Erstellt am\r\n",
        ))];
        for note in state.notes.iter().rev() {
            let Some(employee) = state
                .employees
                .iter()
                .find(|e| e.id == note.employee_id && e.company_id == user.company_id)
            else {
                continue;
            };
            chunks.push(Ok(Bytes::from(format!(
                "{},{},{},{},{}\r\n",
                employee.employee_number,
                employee.name,
                note.note_text,
                note.timestamp,
                note.created_at
            ))));
        }
        Ok(futures::stream::iter(chunks).boxed())
    }
}
