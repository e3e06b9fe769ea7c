//! Credential handling for platform connections.
//!
//! # Security Guarantees
//! - Secret values are moved into `Zeroizing` containers, never copied
//! - Leftover connection fields are wiped when the payload is dropped
//! - `Debug` output of every credential type is redacted
//! - Nothing in this module implements `Serialize`
//!
//! # Module Structure
//! - `secrets`: raw secret fields from a connection payload
//! - `credentials`: typed credentials consumed by adapter authentication

mod credentials;
mod secrets;

pub use credentials::{
    AccessToken, Credential, CredentialKind, PasswordCredential, ServiceAccountKey,
    normalize_private_key,
};
pub use secrets::{ENV_REFERENCE_PREFIX, SecretFields};
