// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentRangeQuery, BookAppointmentRequest, CallerIdentity, CreateScheduleRequest,
    RescheduleRequest, SchedulingError, SetAvailabilityRequest, SlotQuery, SlotView,
    StatusUpdateRequest,
};
use crate::SchedulingState;

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

fn map_scheduling_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::NotFound => AppError::NotFound("Schedule or appointment not found".to_string()),
        SchedulingError::Forbidden => AppError::Forbidden("Not authorized for this operation".to_string()),
        SchedulingError::SlotFull => AppError::BadRequest("Schedule is fully booked".to_string()),
        SchedulingError::ScheduleClosed => AppError::BadRequest("Schedule is closed for new bookings".to_string()),
        SchedulingError::OutOfBookingWindow => AppError::BadRequest("Date is outside the booking window".to_string()),
        SchedulingError::InvalidTransition(status) => {
            AppError::BadRequest(format!("Appointment cannot change state from {}", status))
        }
        SchedulingError::Validation(msg) => AppError::BadRequest(msg),
        SchedulingError::CapacityBelowBooked { requested, booked } => AppError::Conflict(format!(
            "Capacity {} is below current booked count {}",
            requested, booked
        )),
        SchedulingError::ScheduleHasBookings => {
            AppError::Conflict("Schedule still has active bookings".to_string())
        }
        SchedulingError::Conflict | SchedulingError::Storage(_) => AppError::Internal(e.to_string()),
    }
}

fn caller_from(user: &User) -> Result<CallerIdentity, AppError> {
    CallerIdentity::from_user(user).map_err(map_scheduling_error)
}

// ==============================================================================
// SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_schedule(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let schedule = state
        .service
        .create_schedule(&caller, request)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule": schedule
    })))
}

#[axum::debug_handler]
pub async fn set_availability(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Json(request): Json<SetAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let schedules = state
        .service
        .set_availability(&caller, request)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "schedules": schedules
    })))
}

#[axum::debug_handler]
pub async fn get_open_slots(
    State(state): State<Arc<SchedulingState>>,
    Extension(_user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let date = query
        .date
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let slots: Vec<SlotView> = state
        .service
        .list_open_slots(doctor_id, date)
        .await
        .map_err(map_scheduling_error)?
        .into_iter()
        .map(SlotView::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "doctor_id": doctor_id,
        "date": date,
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_schedules(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let schedules = state
        .service
        .list_doctor_schedules(&caller, doctor_id)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "schedules": schedules
    })))
}

#[axum::debug_handler]
pub async fn delete_schedule(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    state
        .service
        .delete_schedule(&caller, schedule_id)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Schedule deleted"
    })))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let appointment = state
        .service
        .book(&caller, request)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let appointment = state
        .service
        .cancel(&caller, appointment_id)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let appointment = state
        .service
        .update_status(&caller, appointment_id, request.status)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let appointment = state
        .service
        .reschedule(&caller, appointment_id, request.schedule_id)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled"
    })))
}

// ==============================================================================
// LISTING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let appointments = state
        .service
        .list_patient_appointments(&caller, patient_id)
        .await
        .map_err(map_scheduling_error)?;

    let total = appointments.len();
    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_appointments(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AppointmentRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from(&user)?;

    let appointments = state
        .service
        .list_doctor_appointments(&caller, doctor_id, query.from, query.to)
        .await
        .map_err(map_scheduling_error)?;

    let total = appointments.len();
    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "total": total
    })))
}
