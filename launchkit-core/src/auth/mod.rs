//! Player authentication.
//!
//! This module provides:
//! - The `ServerAuth` capability and the `Session` it produces
//! - An explicit registry mapping auth-type aliases to constructors
//! - Offline authentication

mod offline;
mod registry;

pub use offline::OfflineAuth;
pub use registry::{AuthConstructor, AuthRegistry, AuthType};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid player name: {0}")]
    InvalidPlayerName(String),
    #[error("Login rejected: {0}")]
    Rejected(String),
}

/// Identity handed to a launched module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub player_name: String,
    pub access_token: String,
    pub uuid: Uuid,
}

/// One way of turning a user name and password into a session.
pub trait ServerAuth: Send + Sync {
    /// The alias this auth type is registered under.
    fn alias(&self) -> &'static str;

    fn player_name(&self) -> &str;

    fn login(&self) -> Result<Session, AuthError>;
}
