// libs/scheduling-cell/src/services/scheduling.rs
//
// The scheduling engine facade. This layer decides WHEN an operation is
// allowed (caller authorization, booking window, block ownership); the slot
// store and booking ledger carry out the mutation.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, CallerIdentity,
    CreateScheduleRequest, Role, Schedule, ScheduleStatus, SchedulingError,
    SetAvailabilityRequest,
};
use crate::services::audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
use crate::services::ledger::BookingLedger;
use crate::services::slot_store::SlotStore;

/// Tunable behavior extracted from app config so tests can pin it directly.
#[derive(Debug, Clone)]
pub struct SchedulingPolicy {
    pub booking_window_days: i64,
    pub default_slot_capacity: u32,
    pub auto_create_default_slots: bool,
}

impl SchedulingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            booking_window_days: config.booking_window_days,
            default_slot_capacity: config.default_slot_capacity,
            auto_create_default_slots: config.auto_create_default_slots,
        }
    }
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            booking_window_days: 7,
            default_slot_capacity: 16,
            auto_create_default_slots: true,
        }
    }
}

// Standard consultation blocks used when a doctor has published no explicit
// availability for a date.
fn morning_block() -> (NaiveTime, NaiveTime) {
    (
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
    )
}

fn afternoon_block() -> (NaiveTime, NaiveTime) {
    (
        NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
    )
}

pub struct SchedulingService {
    policy: SchedulingPolicy,
    slots: Arc<SlotStore>,
    ledger: Arc<BookingLedger>,
    audit: Arc<dyn AuditSink>,
}

impl SchedulingService {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self::with_audit_sink(policy, Arc::new(TracingAuditSink))
    }

    pub fn with_audit_sink(policy: SchedulingPolicy, audit: Arc<dyn AuditSink>) -> Self {
        let slots = Arc::new(SlotStore::new());
        let ledger = Arc::new(BookingLedger::new(slots.clone()));
        Self {
            policy,
            slots,
            ledger,
            audit,
        }
    }

    pub fn slot_store(&self) -> &Arc<SlotStore> {
        &self.slots
    }

    pub fn ledger(&self) -> &Arc<BookingLedger> {
        &self.ledger
    }

    // ==========================================================================
    // SCHEDULE MANAGEMENT
    // ==========================================================================

    /// Publish or update one availability block. Doctors manage their own
    /// calendar; admins manage anyone's.
    pub async fn create_schedule(
        &self,
        caller: &CallerIdentity,
        request: CreateScheduleRequest,
    ) -> Result<Schedule, SchedulingError> {
        self.authorize_doctor(caller, request.doctor_id)?;

        let schedule = self
            .slots
            .upsert_schedule(
                request.doctor_id,
                request.date,
                request.start_time,
                request.end_time,
                request.capacity,
            )
            .await?;

        self.emit_audit(AuditAction::ScheduleCreated, caller.id, schedule.id);
        Ok(schedule)
    }

    /// Publish morning and afternoon capacity for a date in one call. A zero
    /// capacity closes the matching block if it exists and never creates one.
    pub async fn set_availability(
        &self,
        caller: &CallerIdentity,
        request: SetAvailabilityRequest,
    ) -> Result<Vec<Schedule>, SchedulingError> {
        self.authorize_doctor(caller, request.doctor_id)?;

        let mut affected = Vec::new();
        let blocks = [
            (morning_block(), request.morning_capacity),
            (afternoon_block(), request.afternoon_capacity),
        ];

        for ((start, end), capacity) in blocks {
            if capacity == 0 {
                if let Some(block) = self
                    .slots
                    .find_block(request.doctor_id, request.date, start)
                    .await
                {
                    let closed = self.slots.set_status(block.id, ScheduleStatus::Closed).await?;
                    affected.push(closed);
                }
                continue;
            }

            let schedule = self
                .slots
                .upsert_schedule(request.doctor_id, request.date, start, end, capacity)
                .await?;
            self.emit_audit(AuditAction::ScheduleCreated, caller.id, schedule.id);
            affected.push(schedule);
        }

        Ok(affected)
    }

    /// Materialize the standard blocks for a date that has no published
    /// availability yet. No-op when the doctor already has any block on the
    /// date, or when auto-creation is disabled.
    pub async fn ensure_default_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), SchedulingError> {
        if !self.policy.auto_create_default_slots {
            return Ok(());
        }

        let (morning_start, _) = morning_block();
        let (afternoon_start, _) = afternoon_block();
        let has_morning = self.slots.find_block(doctor_id, date, morning_start).await.is_some();
        let has_afternoon = self
            .slots
            .find_block(doctor_id, date, afternoon_start)
            .await
            .is_some();
        if has_morning || has_afternoon {
            return Ok(());
        }

        for (start, end) in [morning_block(), afternoon_block()] {
            self.slots
                .upsert_schedule(doctor_id, date, start, end, self.policy.default_slot_capacity)
                .await?;
        }

        debug!(doctor_id = %doctor_id, date = %date, "Materialized default slots");
        Ok(())
    }

    /// Open slots for a doctor on a date, full ones included. Defaults are
    /// materialized lazily so a doctor who never published availability is
    /// still bookable.
    pub async fn list_open_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Schedule>, SchedulingError> {
        if self.check_window(date).is_ok() {
            self.ensure_default_slots(doctor_id, date).await?;
        }
        Ok(self.slots.list_open_slots(doctor_id, date).await)
    }

    pub async fn list_doctor_schedules(
        &self,
        caller: &CallerIdentity,
        doctor_id: Uuid,
    ) -> Result<Vec<Schedule>, SchedulingError> {
        self.authorize_doctor(caller, doctor_id)?;
        Ok(self.slots.list_for_doctor(doctor_id).await)
    }

    pub async fn delete_schedule(
        &self,
        caller: &CallerIdentity,
        schedule_id: Uuid,
    ) -> Result<(), SchedulingError> {
        let schedule = self.slots.get(schedule_id).await.ok_or(SchedulingError::NotFound)?;
        self.authorize_doctor(caller, schedule.doctor_id)?;

        self.slots.delete(schedule_id).await?;
        self.emit_audit(AuditAction::ScheduleDeleted, caller.id, schedule_id);
        Ok(())
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    /// Book one unit of capacity. Patients book for themselves; admins may
    /// book on a patient's behalf.
    pub async fn book(
        &self,
        caller: &CallerIdentity,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, SchedulingError> {
        match caller.role {
            Role::Patient if caller.id == request.patient_id => {}
            Role::Admin => {}
            _ => return Err(SchedulingError::Forbidden),
        }

        let schedule = self
            .slots
            .get(request.schedule_id)
            .await
            .ok_or(SchedulingError::NotFound)?;
        // A doctor mismatch reads the same as a missing schedule.
        if schedule.doctor_id != request.doctor_id {
            return Err(SchedulingError::NotFound);
        }
        if !schedule.is_open() {
            return Err(SchedulingError::ScheduleClosed);
        }
        self.check_window(schedule.date)?;

        let appointment = self
            .ledger
            .create(request.patient_id, request.doctor_id, request.schedule_id)
            .await?;

        self.emit_audit(AuditAction::AppointmentBooked, caller.id, appointment.id);
        Ok(appointment)
    }

    /// Cancel an appointment. The patient who holds it, the doctor who serves
    /// it, or an admin.
    pub async fn cancel(
        &self,
        caller: &CallerIdentity,
        appointment_id: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self
            .ledger
            .get(appointment_id)
            .await
            .ok_or(SchedulingError::NotFound)?;
        self.authorize_participant(caller, &appointment)?;

        let cancelled = self.ledger.cancel(appointment_id).await?;
        self.emit_audit(AuditAction::AppointmentCancelled, caller.id, appointment_id);
        Ok(cancelled)
    }

    /// Status transitions other than patient cancellation. Doctors close out
    /// their own appointments; admins may act on any.
    pub async fn update_status(
        &self,
        caller: &CallerIdentity,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self
            .ledger
            .get(appointment_id)
            .await
            .ok_or(SchedulingError::NotFound)?;

        match status {
            AppointmentStatus::Cancelled => self.authorize_participant(caller, &appointment)?,
            _ => self.authorize_doctor(caller, appointment.doctor_id)?,
        }

        let updated = self.ledger.mark_status(appointment_id, status).await?;

        let action = match status {
            AppointmentStatus::Cancelled => AuditAction::AppointmentCancelled,
            AppointmentStatus::Completed => AuditAction::AppointmentCompleted,
            AppointmentStatus::Scheduled => return Ok(updated),
        };
        self.emit_audit(action, caller.id, appointment_id);
        Ok(updated)
    }

    /// Move a scheduled appointment to another open block of the same doctor.
    /// The target block's capacity is claimed before the old one is released.
    pub async fn reschedule(
        &self,
        caller: &CallerIdentity,
        appointment_id: Uuid,
        new_schedule_id: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self
            .ledger
            .get(appointment_id)
            .await
            .ok_or(SchedulingError::NotFound)?;
        self.authorize_participant(caller, &appointment)?;

        let target = self
            .slots
            .get(new_schedule_id)
            .await
            .ok_or(SchedulingError::NotFound)?;
        if target.doctor_id != appointment.doctor_id {
            return Err(SchedulingError::Validation(
                "Target schedule belongs to a different doctor".to_string(),
            ));
        }
        if !target.is_open() {
            return Err(SchedulingError::ScheduleClosed);
        }
        self.check_window(target.date)?;

        let moved = self.ledger.reschedule(appointment_id, new_schedule_id).await?;
        self.emit_audit(AuditAction::AppointmentRescheduled, caller.id, appointment_id);
        Ok(moved)
    }

    // ==========================================================================
    // LISTINGS
    // ==========================================================================

    pub async fn list_patient_appointments(
        &self,
        caller: &CallerIdentity,
        patient_id: Uuid,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        match caller.role {
            Role::Patient if caller.id == patient_id => {}
            Role::Admin => {}
            _ => return Err(SchedulingError::Forbidden),
        }
        Ok(self.ledger.list_for_patient(patient_id).await)
    }

    pub async fn list_doctor_appointments(
        &self,
        caller: &CallerIdentity,
        doctor_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        self.authorize_doctor(caller, doctor_id)?;
        Ok(self.ledger.list_for_doctor(doctor_id, from, to).await)
    }

    // ==========================================================================
    // INTERNALS
    // ==========================================================================

    /// Caller must be the doctor in question or an admin.
    fn authorize_doctor(
        &self,
        caller: &CallerIdentity,
        doctor_id: Uuid,
    ) -> Result<(), SchedulingError> {
        match caller.role {
            Role::Doctor if caller.id == doctor_id => Ok(()),
            Role::Admin => Ok(()),
            _ => Err(SchedulingError::Forbidden),
        }
    }

    /// Caller must be a participant of the appointment or an admin.
    fn authorize_participant(
        &self,
        caller: &CallerIdentity,
        appointment: &Appointment,
    ) -> Result<(), SchedulingError> {
        match caller.role {
            Role::Patient if caller.id == appointment.patient_id => Ok(()),
            Role::Doctor if caller.id == appointment.doctor_id => Ok(()),
            Role::Admin => Ok(()),
            _ => Err(SchedulingError::Forbidden),
        }
    }

    /// Bookings are accepted from today through `booking_window_days` ahead,
    /// boundary day included.
    fn check_window(&self, date: NaiveDate) -> Result<(), SchedulingError> {
        let today = Utc::now().date_naive();
        let horizon = today + Duration::days(self.policy.booking_window_days);
        if date < today || date > horizon {
            return Err(SchedulingError::OutOfBookingWindow);
        }
        Ok(())
    }

    fn emit_audit(&self, action: AuditAction, actor_id: Uuid, subject_id: Uuid) {
        let sink = self.audit.clone();
        let event = AuditEvent::new(action, actor_id, subject_id);
        tokio::spawn(async move {
            sink.record(event).await;
        });
        info!(action = %action, subject_id = %subject_id, "Scheduling mutation recorded");
    }
}
