//! Session and credential management.
//!
//! - `Session`: bearer-token session persisted to the cache dir,
//!   expiring after 8 hours
//! - `CredentialStore`: optional password storage in the OS keychain

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionData};
