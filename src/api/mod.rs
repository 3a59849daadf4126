//! HTTP adapter over the portal components.

pub mod analytics;
pub mod error;
pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_api_router;
