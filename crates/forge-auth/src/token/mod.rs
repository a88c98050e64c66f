//! Auth tokens, personal access tokens and their scopes.

pub mod access_token;
pub mod auth_token;
pub mod scope;

pub use access_token::{create_access_token, get_access_token_by_sha};
pub use auth_token::{
    check_auth_token, create_auth_token, delete_auth_token_by_id, delete_auth_tokens_by_user_id,
    delete_expired_auth_tokens, regenerate_auth_token,
};
pub use scope::AccessTokenScope;
