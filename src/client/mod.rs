//! Backend Store access.
//!
//! Everything that talks to the backend goes through [`BackendStore`], so the
//! workflow components can run against the HTTP backend in production and an
//! in-memory store in tests.

mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpBackend;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::db::{
    Company, CreateEmployeeRequest, CreateNoteRequest, Employee, LoginRequest, Note,
    RegisterRequest, TokenResponse, UserResponse,
};
use crate::error::Result;

/// Raw report bytes, as they arrive
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

#[async_trait]
pub trait BackendStore: Send + Sync {
    /// Unauthenticated. 401 maps to `Error::Auth`.
    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse>;
    /// Unauthenticated. 401 maps to `Error::Auth`.
    async fn register(&self, request: &RegisterRequest) -> Result<TokenResponse>;
    async fn current_user(&self) -> Result<UserResponse>;

    async fn list_companies(&self) -> Result<Vec<Company>>;
    async fn create_company(&self, name: &str) -> Result<Company>;
    async fn get_company(&self, id: &str) -> Result<Company>;

    async fn list_employees(&self) -> Result<Vec<Employee>>;
    async fn get_employee(&self, id: &str) -> Result<Employee>;
    /// `Error::NotFound` when no employee of the caller's company carries
    /// this number.
    async fn find_employee_by_number(&self, employee_number: &str) -> Result<Employee>;
    async fn create_employee(&self, request: &CreateEmployeeRequest) -> Result<Employee>;

    async fn list_notes(&self) -> Result<Vec<Note>>;
    async fn list_employee_notes(&self, employee_id: &str) -> Result<Vec<Note>>;
    async fn create_note(&self, request: &CreateNoteRequest) -> Result<Note>;

    /// Report of all notes of the caller's company
    async fn export_notes(&self) -> Result<ByteStream>;
}
