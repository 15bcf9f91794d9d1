// libs/scheduling-cell/src/services/ledger.rs
//
// Booking ledger: appointment records and their lifecycle. The ledger owns
// HOW a booking mutates state (reserve before persist, release exactly once
// on cancel); the scheduling service decides WHEN a mutation is allowed.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentStatus, SchedulingError};
use crate::services::slot_store::SlotStore;

const MAX_BOOKING_ATTEMPTS: u32 = 3;

pub struct BookingLedger {
    slots: Arc<SlotStore>,
    appointments: Arc<RwLock<HashMap<Uuid, Appointment>>>,
}

impl BookingLedger {
    pub fn new(slots: Arc<SlotStore>) -> Self {
        Self {
            slots,
            appointments: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Book one unit of capacity for a patient. Idempotent per
    /// `(patient_id, schedule_id)`: a repeated request returns the existing
    /// scheduled appointment without claiming more capacity. The ledger lock
    /// is held across the duplicate check, the reservation and the persist so
    /// two identical requests cannot both pass the duplicate check.
    pub async fn create(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        schedule_id: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let mut last_error = SchedulingError::Conflict;

        for attempt in 1..=MAX_BOOKING_ATTEMPTS {
            // Lock order: ledger before slots, everywhere.
            let mut appointments = self.appointments.write().await;

            if let Some(existing) = appointments.values().find(|a| {
                a.patient_id == patient_id
                    && a.schedule_id == schedule_id
                    && a.status == AppointmentStatus::Scheduled
            }) {
                debug!(
                    appointment_id = %existing.id,
                    patient_id = %patient_id,
                    "Duplicate booking request, returning existing appointment"
                );
                return Ok(existing.clone());
            }

            match self.slots.try_reserve(schedule_id).await {
                Ok(_) => {}
                Err(SchedulingError::Conflict) => {
                    drop(appointments);
                    warn!(
                        schedule_id = %schedule_id,
                        attempt = attempt,
                        "Counter conflict while reserving, retrying"
                    );
                    last_error = SchedulingError::Conflict;
                    tokio::time::sleep(std::time::Duration::from_millis(10 * attempt as u64)).await;
                    continue;
                }
                Err(e) => return Err(e),
            }

            let now = Utc::now();
            let appointment = Appointment {
                id: Uuid::new_v4(),
                patient_id,
                doctor_id,
                schedule_id,
                status: AppointmentStatus::Scheduled,
                created_at: now,
                updated_at: now,
            };

            if let Err(e) = Self::persist(&mut appointments, appointment.clone()) {
                // Compensation: the reservation must not outlive a failed
                // persist.
                error!(
                    schedule_id = %schedule_id,
                    error = %e,
                    "Persist failed after reserve, releasing capacity"
                );
                if let Err(release_err) = self.slots.release(schedule_id).await {
                    error!(
                        schedule_id = %schedule_id,
                        error = %release_err,
                        "Compensating release failed, counter may be inflated"
                    );
                }
                return Err(e);
            }

            info!(
                appointment_id = %appointment.id,
                patient_id = %patient_id,
                schedule_id = %schedule_id,
                "Appointment booked"
            );
            return Ok(appointment);
        }

        Err(last_error)
    }

    fn persist(
        appointments: &mut HashMap<Uuid, Appointment>,
        appointment: Appointment,
    ) -> Result<(), SchedulingError> {
        if appointments.contains_key(&appointment.id) {
            return Err(SchedulingError::Storage(format!(
                "appointment id collision: {}",
                appointment.id
            )));
        }
        appointments.insert(appointment.id, appointment);
        Ok(())
    }

    /// Cancel an appointment and give its capacity back. Cancelling an
    /// already cancelled appointment is a no-op success; the release happens
    /// exactly once, on the transition out of `scheduled`.
    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, SchedulingError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&appointment_id)
            .ok_or(SchedulingError::NotFound)?;

        match appointment.status {
            AppointmentStatus::Cancelled => return Ok(appointment.clone()),
            AppointmentStatus::Completed => {
                return Err(SchedulingError::InvalidTransition(AppointmentStatus::Completed))
            }
            AppointmentStatus::Scheduled => {}
        }

        appointment.status = AppointmentStatus::Cancelled;
        appointment.updated_at = Utc::now();
        let cancelled = appointment.clone();
        let schedule_id = cancelled.schedule_id;
        drop(appointments);

        if let Err(e) = self.slots.release(schedule_id).await {
            // The delete guard keeps a booked schedule alive, so this only
            // fires if state was tampered with outside the engine.
            error!(
                schedule_id = %schedule_id,
                error = %e,
                "Release after cancellation failed"
            );
            return Err(e);
        }

        info!(appointment_id = %appointment_id, "Appointment cancelled");
        Ok(cancelled)
    }

    /// Apply a status transition. Terminal states admit no further change,
    /// except that re-asserting `cancelled` stays a no-op success.
    pub async fn mark_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, SchedulingError> {
        if status == AppointmentStatus::Cancelled {
            return self.cancel(appointment_id).await;
        }

        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&appointment_id)
            .ok_or(SchedulingError::NotFound)?;

        if appointment.status.is_terminal() {
            return Err(SchedulingError::InvalidTransition(appointment.status));
        }

        if appointment.status != status {
            appointment.status = status;
            appointment.updated_at = Utc::now();
            info!(
                appointment_id = %appointment_id,
                status = %status,
                "Appointment status updated"
            );
        }
        Ok(appointment.clone())
    }

    /// Move a scheduled appointment to another block. The new block's
    /// capacity is claimed first; only then is the old block released, so a
    /// failed move leaves the appointment exactly where it was.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        new_schedule_id: Uuid,
    ) -> Result<Appointment, SchedulingError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&appointment_id)
            .ok_or(SchedulingError::NotFound)?;

        if appointment.status != AppointmentStatus::Scheduled {
            return Err(SchedulingError::InvalidTransition(appointment.status));
        }
        if appointment.schedule_id == new_schedule_id {
            return Ok(appointment.clone());
        }

        self.slots.try_reserve(new_schedule_id).await?;

        let old_schedule_id = appointment.schedule_id;
        appointment.schedule_id = new_schedule_id;
        appointment.updated_at = Utc::now();
        let moved = appointment.clone();
        drop(appointments);

        if let Err(e) = self.slots.release(old_schedule_id).await {
            error!(
                schedule_id = %old_schedule_id,
                error = %e,
                "Release of previous block failed after reschedule"
            );
            return Err(e);
        }

        info!(
            appointment_id = %appointment_id,
            from = %old_schedule_id,
            to = %new_schedule_id,
            "Appointment rescheduled"
        );
        Ok(moved)
    }

    pub async fn get(&self, appointment_id: Uuid) -> Option<Appointment> {
        self.appointments.read().await.get(&appointment_id).cloned()
    }

    pub async fn list_for_patient(&self, patient_id: Uuid) -> Vec<Appointment> {
        let appointments = self.appointments.read().await;
        let mut results: Vec<Appointment> = appointments
            .values()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect();
        results.sort_by_key(|a| a.created_at);
        results
    }

    /// Appointments for one doctor whose schedule date falls in the half-open
    /// range `[from, to)`. Either bound may be absent.
    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Vec<Appointment> {
        let appointments: Vec<Appointment> = {
            let guard = self.appointments.read().await;
            guard
                .values()
                .filter(|a| a.doctor_id == doctor_id)
                .cloned()
                .collect()
        };

        let mut results = Vec::new();
        for appointment in appointments {
            let Some(schedule) = self.slots.get(appointment.schedule_id).await else {
                continue;
            };
            if let Some(from) = from {
                if schedule.date < from {
                    continue;
                }
            }
            if let Some(to) = to {
                if schedule.date >= to {
                    continue;
                }
            }
            results.push(appointment);
        }
        results.sort_by_key(|a| a.created_at);
        results
    }
}
