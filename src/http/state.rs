use crate::session::LiveSession;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The live session behind the toggle (one per server)
    pub live: Arc<LiveSession>,
}

impl AppState {
    pub fn new(live: LiveSession) -> Self {
        Self {
            live: Arc::new(live),
        }
    }
}
