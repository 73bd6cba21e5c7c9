mod routes;
mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{
    alerts::AlertScheduler,
    config::Config,
    notify::BroadcastBus,
    recurrence::{RecurrenceResolver, ScheduleService},
    store::Repositories,
};

/// Admin HTTP surface: health, metrics, the schedule and alert hooks used
/// by the task routes of the main application, and the live alert socket.
pub struct Server {
    repos: Repositories,
    schedules: Arc<ScheduleService>,
    scheduler: Arc<AlertScheduler>,
    bus: BroadcastBus,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub repos: Repositories,
    pub schedules: Arc<ScheduleService>,
    pub scheduler: Arc<AlertScheduler>,
    pub bus: BroadcastBus,
}

impl Server {
    /// `bus` must be the one the alert dispatcher publishes to.
    pub fn new(
        config: &Config,
        repos: Repositories,
        scheduler: Arc<AlertScheduler>,
        bus: BroadcastBus,
    ) -> Self {
        let schedules = Arc::new(ScheduleService::new(
            repos.schedules.clone(),
            RecurrenceResolver::new(config.alerts.offset()),
            config.recurrence.resolve_mode(),
        ));
        Self {
            repos,
            schedules,
            scheduler,
            bus,
        }
    }

    pub fn build_router(self) -> Router {
        let state = AppState {
            repos: self.repos,
            schedules: self.schedules,
            scheduler: self.scheduler,
            bus: self.bus,
        };

        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::metrics))
            .route("/tasks/{id}/alerts", get(routes::task_alerts))
            .route(
                "/tasks/{id}/schedule",
                get(routes::get_schedule)
                    .put(routes::put_schedule)
                    .delete(routes::delete_schedule),
            )
            .route("/tasks/{id}/evaluate", post(routes::evaluate_task))
            .route("/ws/{user_id}", get(websocket::ws_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }
}
