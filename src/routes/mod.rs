mod advisor;
mod health;
mod mastery;
mod prereqs;
mod sessions;

use axum::Router;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub(crate) struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(sessions::router())
        .merge(mastery::router())
        .merge(advisor::router())
        .merge(prereqs::router())
        .with_state(state)
}
