//! Authentication for Aegis Core.
//!
//! API-key authentication for gateway clients.

mod api_key;
mod middleware;

pub use api_key::{ApiKeyInfo, ApiKeyValidator, ConfiguredApiKey};
pub use middleware::require_api_key;
