//! Database models split into domain-specific modules.

pub mod company;
pub mod employee;
pub mod note;
pub mod user;

pub use company::*;
pub use employee::*;
pub use note::*;
pub use user::*;
