//! Shared application state threaded through every handler.

use linkforty_attribution::AttributionEngine;
use linkforty_events::EventBus;
use linkforty_resolver::Resolver;
use linkforty_store::Store;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub resolver: Arc<Resolver>,
    pub attribution: Arc<AttributionEngine>,
    pub events: Arc<EventBus>,
    pub node_id: String,
    pub start_time: Instant,
}
