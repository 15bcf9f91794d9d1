// libs/scheduling-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

use shared_models::auth::User;

// ==============================================================================
// CORE SCHEDULING MODELS
// ==============================================================================

/// A doctor's bookable time block on a date. `booked_count` is mutated only by
/// the slot store; `0 <= booked_count <= capacity` holds at every observable
/// point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
    pub booked_count: u32,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn remaining_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.booked_count)
    }

    pub fn is_open(&self) -> bool {
        self.status == ScheduleStatus::Open
    }
}

/// An open slot as served to booking clients: the schedule plus the derived
/// fullness fields the UI renders (full blocks stay listed, greyed out).
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub remaining_capacity: u32,
    pub fully_booked: bool,
}

impl From<Schedule> for SlotView {
    fn from(schedule: Schedule) -> Self {
        let remaining = schedule.remaining_capacity();
        Self {
            schedule,
            remaining_capacity: remaining,
            fully_booked: remaining == 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Open,
    Closed,
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Open => write!(f, "open"),
            ScheduleStatus::Closed => write!(f, "closed"),
        }
    }
}

/// One patient's reservation against exactly one schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub schedule_id: Uuid,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Appointment lifecycle. `completed` and `cancelled` are terminal. Legacy
/// boundary synonyms (`pending`, `confirmed`) normalize to `scheduled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[serde(alias = "pending", alias = "confirmed")]
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// Whether an appointment in this status holds a unit of slot capacity.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Completed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// CALLER IDENTITY
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Patient,
    Doctor,
    Admin,
}

impl Role {
    /// The identity provider has used both `patient` and `user` for the
    /// patient role; normalize here.
    pub fn parse(role: &str) -> Option<Role> {
        match role {
            "patient" | "user" => Some(Role::Patient),
            "doctor" => Some(Role::Doctor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller as resolved by the identity collaborator.
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity {
    pub id: Uuid,
    pub role: Role,
}

impl CallerIdentity {
    pub fn from_user(user: &User) -> Result<Self, SchedulingError> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| SchedulingError::Validation("Caller id is not a valid UUID".to_string()))?;
        let role = user
            .role
            .as_deref()
            .and_then(Role::parse)
            .ok_or(SchedulingError::Forbidden)?;
        Ok(Self { id, role })
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAvailabilityRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub morning_capacity: u32,
    pub afternoon_capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub schedule_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub schedule_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub date: Option<NaiveDate>,
}

/// Half-open date range: `from` inclusive, `to` exclusive.
#[derive(Debug, Deserialize)]
pub struct AppointmentRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("Schedule or appointment not found")]
    NotFound,

    #[error("Schedule capacity exhausted")]
    SlotFull,

    #[error("Schedule is closed for new bookings")]
    ScheduleClosed,

    #[error("Capacity {requested} is below current booked count {booked}")]
    CapacityBelowBooked { requested: u32, booked: u32 },

    #[error("Schedule has active bookings")]
    ScheduleHasBookings,

    #[error("Booking date outside the allowed window")]
    OutOfBookingWindow,

    #[error("Not authorized for this operation")]
    Forbidden,

    #[error("Appointment cannot change state from {0}")]
    InvalidTransition(AppointmentStatus),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Concurrent update conflict on schedule counter")]
    Conflict,

    #[error("Storage error: {0}")]
    Storage(String),
}
