//! reqwest implementation of the Backend Store.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::{BackendStore, ByteStream};
use crate::config::ClientConfig;
use crate::db::{
    Company, CreateCompanyRequest, CreateEmployeeRequest, CreateNoteRequest, Employee,
    LoginRequest, Note, RegisterRequest, TokenResponse, UserResponse,
};
use crate::error::{Error, Result};
use crate::session::SessionContext;

/// Error payload returned by the backend
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    detail: String,
}

/// Whether a call carries the session token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Login and registration
    Credentials,
    Protected,
}

pub struct HttpBackend {
    client: Client,
    base_url: Url,
    session: SessionContext,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig, session: SessionContext) -> Result<Self> {
        let base_url = api_base_url(&config.api_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("badgenotes/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL. Segments are percent-encoded, so a scanned
    /// barcode can never escape its path segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url, access: Access) -> RequestBuilder {
        tracing::debug!(%method, %url, "Backend request");
        let builder = self.client.request(method, url);

        if access == Access::Protected {
            // No cached token: send the request bare and let the backend refuse it
            if let Some(token) = self.session.token() {
                return builder.bearer_auth(token);
            }
        }
        builder
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let request = self.request(Method::GET, self.url(segments), Access::Protected);
        self.send(request, Access::Protected).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
        access: Access,
    ) -> Result<T> {
        let request = self.request(Method::POST, self.url(segments), access).json(body);
        self.send(request, access).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, access: Access) -> Result<T> {
        let response = checked(request.send().await?, access).await?;
        let status = response.status().as_u16();

        response.json().await.map_err(|e| {
            if e.is_decode() {
                Error::Server {
                    status,
                    detail: format!("Invalid response body: {}", e),
                }
            } else {
                Error::Network(e)
            }
        })
    }
}

/// Append the `/api` prefix to the configured backend URL
fn api_base_url(api_url: &str) -> Result<Url> {
    let mut url = Url::parse(api_url.trim())
        .map_err(|e| Error::validation(format!("Invalid API URL '{}': {}", api_url, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::validation(format!("Invalid API URL '{}'", api_url)));
    }

    url.path_segments_mut()
        .map_err(|_| Error::validation(format!("Invalid API URL '{}'", api_url)))?
        .pop_if_empty()
        .push("api");
    Ok(url)
}

/// Turn non-success responses into the error taxonomy
async fn checked(response: Response, access: Access) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorPayload>(&body)
        .map(|payload| payload.detail)
        .ok()
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

    tracing::debug!(status = status.as_u16(), %detail, "Backend returned an error");
    Err(Error::from_status(
        status.as_u16(),
        detail,
        access == Access::Credentials,
    ))
}

#[async_trait]
impl BackendStore for HttpBackend {
    async fn login(&self, request: &LoginRequest) -> Result<TokenResponse> {
        self.post(&["auth", "login"], request, Access::Credentials)
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<TokenResponse> {
        self.post(&["auth", "register"], request, Access::Credentials)
            .await
    }

    async fn current_user(&self) -> Result<UserResponse> {
        self.get(&["auth", "me"]).await
    }

    async fn list_companies(&self) -> Result<Vec<Company>> {
        self.get(&["companies"]).await
    }

    async fn create_company(&self, name: &str) -> Result<Company> {
        let body = CreateCompanyRequest {
            name: name.to_string(),
        };
        self.post(&["companies"], &body, Access::Protected).await
    }

    async fn get_company(&self, id: &str) -> Result<Company> {
        self.get(&["companies", id]).await
    }

    async fn list_employees(&self) -> Result<Vec<Employee>> {
        self.get(&["employees"]).await
    }

    async fn get_employee(&self, id: &str) -> Result<Employee> {
        self.get(&["employees", id]).await
    }

    async fn find_employee_by_number(&self, employee_number: &str) -> Result<Employee> {
        self.get(&["employees", "number", employee_number]).await
    }

    async fn create_employee(&self, request: &CreateEmployeeRequest) -> Result<Employee> {
        self.post(&["employees"], request, Access::Protected).await
    }

    async fn list_notes(&self) -> Result<Vec<Note>> {
        self.get(&["notes"]).await
    }

    async fn list_employee_notes(&self, employee_id: &str) -> Result<Vec<Note>> {
        self.get(&["notes", "employee", employee_id]).await
    }

    async fn create_note(&self, request: &CreateNoteRequest) -> Result<Note> {
        self.post(&["notes"], request, Access::Protected).await
    }

    async fn export_notes(&self) -> Result<ByteStream> {
        let request = self.request(
            Method::GET,
            self.url(&["notes", "export", "csv"]),
            Access::Protected,
        );
        let response = checked(request.send().await?, Access::Protected).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from))
            .boxed())
    }
}
