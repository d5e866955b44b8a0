use std::sync::Arc;

use super::{Session, SessionContext};
use crate::api::validation::{validate_email, validate_password};
use crate::client::BackendStore;
use crate::db::{LoginRequest, RegisterRequest, Role, TokenResponse, UserResponse};
use crate::error::{Error, Result};

/// Owns authentication: the only writer of the [`SessionContext`].
pub struct SessionManager {
    backend: Arc<dyn BackendStore>,
    context: SessionContext,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn BackendStore>, context: SessionContext) -> Self {
        Self { backend, context }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(Error::validation("Email and password are required"));
        }

        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };
        let response = self.backend.login(&request).await.map_err(|e| {
            // A failed login never leaves a previous identity behind
            self.invalidate_on_auth_failure(&e);
            e
        })?;

        let session = self.install(response)?;
        tracing::info!(user = %session.user.email, role = %session.role(), "Logged in");
        Ok(session)
    }

    /// Self-service registration always creates a plain user
    pub async fn register(&self, email: &str, password: &str, company_id: &str) -> Result<Session> {
        validate_email(email.trim()).map_err(Error::Validation)?;
        validate_password(password).map_err(Error::Validation)?;
        if company_id.trim().is_empty() {
            return Err(Error::validation("Company is required"));
        }

        let request = RegisterRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
            company_id: company_id.trim().to_string(),
            role: Some(Role::User),
        };
        let response = self.backend.register(&request).await?;

        let session = self.install(response)?;
        tracing::info!(user = %session.user.email, company = %session.user.company_id, "Registered");
        Ok(session)
    }

    /// Check the cached token with the backend and refresh the cached user
    pub async fn current_user(&self) -> Result<UserResponse> {
        let Some(session) = self.context.current() else {
            return Err(Error::Unauthorized("not logged in".to_string()));
        };

        match self.backend.current_user().await {
            Ok(user) => {
                if user != session.user {
                    self.context.install(Session {
                        token: session.token,
                        user: user.clone(),
                    })?;
                }
                Ok(user)
            }
            Err(e) => {
                self.invalidate_on_auth_failure(&e);
                Err(e)
            }
        }
    }

    /// Local only; the backend keeps the token until it expires
    pub fn logout(&self) -> Result<()> {
        if let Some(session) = self.context.current() {
            tracing::info!(user = %session.user.email, "Logged out");
        }
        self.context.clear()
    }

    /// Tear the session down when a protected call was refused. Returns whether
    /// the error was an authentication failure.
    pub fn invalidate_on_auth_failure(&self, error: &Error) -> bool {
        if !error.is_auth_failure() {
            return false;
        }
        if self.context.is_authenticated() {
            tracing::warn!(error = %error, "Clearing session after authentication failure");
        }
        if let Err(e) = self.context.clear() {
            tracing::error!("Failed to remove session file: {}", e);
        }
        true
    }

    fn install(&self, response: TokenResponse) -> Result<Session> {
        let session = Session {
            token: response.access_token,
            user: response.user,
        };
        self.context.install(session.clone())?;
        Ok(session)
    }
}
