//! gnxi-core: shared foundations for ovs-gnxi
//!
//! Provides:
//! - The workspace-wide `Error`/`Result` types
//! - Runtime configuration: environment seeding and flag defaults
//! - The username/password request authenticator

pub mod auth;
pub mod config;
pub mod error;

pub use auth::Authenticator;
pub use error::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::auth::Authenticator;
    pub use super::error::{Error, Result};
}
