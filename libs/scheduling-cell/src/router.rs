// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::SchedulingState;

pub fn scheduling_routes(state: Arc<SchedulingState>) -> Router {
    // Every scheduling operation requires authentication
    let protected_routes = Router::new()
        // Schedule management
        .route("/schedules", post(handlers::create_schedule))
        .route("/availability", post(handlers::set_availability))
        .route("/schedules/{schedule_id}", delete(handlers::delete_schedule))
        .route("/doctors/{doctor_id}/slots", get(handlers::get_open_slots))
        .route("/doctors/{doctor_id}/schedules", get(handlers::get_doctor_schedules))

        // Booking lifecycle
        .route("/bookings", post(handlers::book_appointment))
        .route("/bookings/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/bookings/{appointment_id}/status", post(handlers::update_appointment_status))
        .route("/bookings/{appointment_id}/reschedule", post(handlers::reschedule_appointment))

        // Listings
        .route("/patients/{patient_id}/appointments", get(handlers::get_patient_appointments))
        .route("/doctors/{doctor_id}/appointments", get(handlers::get_doctor_appointments))

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
