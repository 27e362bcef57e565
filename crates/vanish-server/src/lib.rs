pub mod auth;
pub mod dirs;
pub mod error;
pub mod handlers;
pub mod server;
pub mod store;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub vault: store::Vault,
    /// Bearer token for admin routes; admin routes are not mounted without it.
    pub admin_token: Option<String>,
}

pub use error::VaultError;
pub use server::{app, build_cors, resolve_admin_token, run, ServerConfig};
