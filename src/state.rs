use std::sync::Arc;

use crate::engine::LearningEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LearningEngine>,
}

impl AppState {
    pub fn new(engine: Arc<LearningEngine>) -> Self {
        Self { engine }
    }
}
