use std::sync::Arc;

use crate::engine::FlagEngine;
use crate::queue::InvalidationQueue;
use crate::store::FlagStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FlagEngine>,
    pub store: Arc<dyn FlagStore>,
    pub invalidations: Option<InvalidationQueue>,
}
