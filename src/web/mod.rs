//! Browser UI: shared store handles, the query view model, HTML rendering
//! and the axum server.

pub mod query;
pub mod render;
pub mod server;
pub mod state;

pub use server::{WebServer, router};
pub use state::AppState;
