//! HTTP API for driving the live session from the chat UI
//!
//! - POST /live/connect - Go live (toggle on)
//! - POST /live/disconnect - Stop the live session (toggle off)
//! - GET /live/status - Status string and session statistics
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, LiveStatusResponse};
pub use routes::create_router;
pub use state::AppState;
