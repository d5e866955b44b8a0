pub mod api;
pub mod capture;
pub mod cli;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod resolver;
pub mod scanner;
pub mod session;

pub use db::{Capability, Company, DbPool, Employee, Note, Role, UserResponse};
pub use error::{Error, Result};

use config::Config;

/// Shared state of the reference server
pub struct AppState {
    pub config: Config,
    pub db: DbPool,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        Self { config, db }
    }
}
