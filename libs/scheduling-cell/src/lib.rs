// libs/scheduling-cell/src/lib.rs
//
// Appointment scheduling and capacity-booking engine: schedule (slot)
// definition, capacity accounting, booking creation, cancellation and the
// status transition rules, exposed over the cell's HTTP router.

use std::sync::Arc;

use shared_config::AppConfig;

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

use services::scheduling::{SchedulingPolicy, SchedulingService};

/// Shared state for the scheduling cell: the engine plus the app config the
/// auth middleware needs.
#[derive(Clone)]
pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub service: Arc<SchedulingService>,
}

impl SchedulingState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let policy = SchedulingPolicy::from_config(&config);
        Self {
            config,
            service: Arc::new(SchedulingService::new(policy)),
        }
    }
}
