//! Session handling.
//!
//! A [`SessionContext`] is the one piece of shared mutable state on the
//! client: every component that calls the backend holds a clone and reads the
//! token from it, while only the [`SessionManager`] writes to it (login,
//! registration, logout and teardown after an authentication failure).

mod manager;
mod store;

pub use manager::SessionManager;
pub use store::SessionStore;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{Capability, Role, UserResponse};
use crate::error::{Error, Result};

/// An authenticated identity: bearer token plus the acting user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: UserResponse,
}

impl Session {
    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn scope(&self) -> CompanyScope {
        CompanyScope::new(self.user.company_id.clone())
    }

    /// Fail unless the session's role carries the capability
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.role().allows(capability) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "role '{}' cannot perform {:?}",
                self.role(),
                capability
            )))
        }
    }
}

/// The tenant every employee and note operation is confined to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompanyScope {
    company_id: String,
}

impl CompanyScope {
    pub fn new(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
        }
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn contains(&self, company_id: &str) -> bool {
        self.company_id == company_id
    }
}

#[derive(Clone)]
pub struct SessionContext {
    current: Arc<RwLock<Option<Session>>>,
    store: Option<Arc<SessionStore>>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token
        f.debug_struct("SessionContext")
            .field("user", &self.current.read().as_ref().map(|s| s.user.email.clone()))
            .field("store", &self.store.as_ref().map(|s| s.path().to_path_buf()))
            .finish()
    }
}

impl SessionContext {
    /// Initialise from durable storage
    pub fn load(store: SessionStore) -> Result<Self> {
        let current = store.load()?;
        if let Some(session) = &current {
            tracing::debug!(user = %session.user.email, "Restored cached session");
        }
        Ok(Self {
            current: Arc::new(RwLock::new(current)),
            store: Some(Arc::new(store)),
        })
    }

    /// A context that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            current: Arc::new(RwLock::new(None)),
            store: None,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.token.clone())
    }

    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    /// The active session, or `Unauthorized` when logged out
    pub fn require_session(&self) -> Result<Session> {
        self.current()
            .ok_or_else(|| Error::Unauthorized("not logged in".to_string()))
    }

    pub(super) fn install(&self, session: Session) -> Result<()> {
        if let Some(store) = &self.store {
            store.save(&session)?;
        }
        *self.current.write() = Some(session);
        Ok(())
    }

    /// Drop the in-memory session first, so a failing file removal still
    /// leaves the process logged out
    pub(super) fn clear(&self) -> Result<()> {
        self.current.write().take();
        if let Some(store) = &self.store {
            store.clear()?;
        }
        Ok(())
    }
}
