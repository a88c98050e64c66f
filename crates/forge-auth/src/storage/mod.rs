//! Storage traits for authentication data.
//!
//! This module defines storage interfaces for:
//!
//! - Users and their email addresses
//! - Authentication sources
//! - Auth tokens and personal access tokens
//! - External login links
//! - WebAuthn credentials
//!
//! # Implementations
//!
//! - [`memory::MemoryAuthStorage`] - in-process maps, for tests and single-node setups
//! - `forge-auth-postgres` - PostgreSQL storage backend

pub mod access_token;
pub mod auth_token;
pub mod email;
pub mod external_login;
pub mod memory;
pub mod source;
pub mod user;
pub mod webauthn;

pub use access_token::AccessTokenStorage;
pub use auth_token::AuthTokenStorage;
pub use email::EmailAddressStorage;
pub use external_login::ExternalLoginStorage;
pub use memory::MemoryAuthStorage;
pub use source::SourceStorage;
pub use user::UserStorage;
pub use webauthn::{WebAuthnCredentialStorage, update_sign_count};
