// libs/scheduling-cell/src/services/slot_store.rs
//
// Schedule (slot) storage and the capacity counter. `try_reserve` and
// `release` are the only two places that touch `booked_count`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Schedule, ScheduleStatus, SchedulingError};

/// In-memory schedule store. One entry per schedule id; the natural key
/// `(doctor_id, date, start_time)` is enforced by `upsert`.
pub struct SlotStore {
    schedules: Arc<RwLock<HashMap<Uuid, Schedule>>>,
}

impl SlotStore {
    pub fn new() -> Self {
        Self {
            schedules: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create or update the schedule identified by
    /// `(doctor_id, date, start_time)`. An existing row keeps its id and
    /// booked count; capacity and end time are replaced and the block is
    /// reopened. Lowering capacity below the current booked count is
    /// rejected without modifying the row.
    pub async fn upsert_schedule(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        capacity: u32,
    ) -> Result<Schedule, SchedulingError> {
        if end_time <= start_time {
            return Err(SchedulingError::Validation(
                "end_time must be after start_time".to_string(),
            ));
        }

        let mut schedules = self.schedules.write().await;

        let existing_id = schedules
            .values()
            .find(|s| s.doctor_id == doctor_id && s.date == date && s.start_time == start_time)
            .map(|s| s.id);

        if let Some(id) = existing_id {
            let schedule = schedules
                .get_mut(&id)
                .ok_or_else(|| SchedulingError::Storage("schedule vanished during upsert".to_string()))?;

            if capacity < schedule.booked_count {
                return Err(SchedulingError::CapacityBelowBooked {
                    requested: capacity,
                    booked: schedule.booked_count,
                });
            }

            schedule.capacity = capacity;
            schedule.end_time = end_time;
            schedule.status = ScheduleStatus::Open;

            debug!(
                schedule_id = %schedule.id,
                doctor_id = %doctor_id,
                capacity = capacity,
                "Updated existing schedule block"
            );
            return Ok(schedule.clone());
        }

        let schedule = Schedule {
            id: Uuid::new_v4(),
            doctor_id,
            date,
            start_time,
            end_time,
            capacity,
            booked_count: 0,
            status: ScheduleStatus::Open,
            created_at: Utc::now(),
        };
        schedules.insert(schedule.id, schedule.clone());

        debug!(
            schedule_id = %schedule.id,
            doctor_id = %doctor_id,
            date = %date,
            capacity = capacity,
            "Created schedule block"
        );
        Ok(schedule)
    }

    pub async fn get(&self, schedule_id: Uuid) -> Option<Schedule> {
        self.schedules.read().await.get(&schedule_id).cloned()
    }

    /// Look up a block by its natural key.
    pub async fn find_block(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Option<Schedule> {
        self.schedules
            .read()
            .await
            .values()
            .find(|s| s.doctor_id == doctor_id && s.date == date && s.start_time == start_time)
            .cloned()
    }

    /// Open blocks for one doctor on one date, ordered by start time. Full
    /// blocks are included; callers derive fullness from the counters so the
    /// UI can still show them.
    pub async fn list_open_slots(&self, doctor_id: Uuid, date: NaiveDate) -> Vec<Schedule> {
        let schedules = self.schedules.read().await;
        let mut slots: Vec<Schedule> = schedules
            .values()
            .filter(|s| s.doctor_id == doctor_id && s.date == date && s.is_open())
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        slots
    }

    /// Every block for one doctor regardless of status, ordered by date then
    /// start time.
    pub async fn list_for_doctor(&self, doctor_id: Uuid) -> Vec<Schedule> {
        let schedules = self.schedules.read().await;
        let mut blocks: Vec<Schedule> = schedules
            .values()
            .filter(|s| s.doctor_id == doctor_id)
            .cloned()
            .collect();
        blocks.sort_by_key(|s| (s.date, s.start_time));
        blocks
    }

    /// Atomically claim one unit of capacity. Fails with `SlotFull` when the
    /// block is at capacity and `ScheduleClosed` when it no longer accepts
    /// bookings. A cheap read-lock check rejects the common full case before
    /// taking the write lock; the decision is always made under the write
    /// lock.
    pub async fn try_reserve(&self, schedule_id: Uuid) -> Result<Schedule, SchedulingError> {
        {
            let schedules = self.schedules.read().await;
            let schedule = schedules.get(&schedule_id).ok_or(SchedulingError::NotFound)?;
            if !schedule.is_open() {
                return Err(SchedulingError::ScheduleClosed);
            }
            if schedule.remaining_capacity() == 0 {
                return Err(SchedulingError::SlotFull);
            }
        }

        let mut schedules = self.schedules.write().await;
        let schedule = schedules
            .get_mut(&schedule_id)
            .ok_or(SchedulingError::NotFound)?;

        if !schedule.is_open() {
            return Err(SchedulingError::ScheduleClosed);
        }
        if schedule.remaining_capacity() == 0 {
            return Err(SchedulingError::SlotFull);
        }

        schedule.booked_count += 1;
        debug!(
            schedule_id = %schedule_id,
            booked = schedule.booked_count,
            capacity = schedule.capacity,
            "Reserved slot capacity"
        );
        Ok(schedule.clone())
    }

    /// Return one unit of capacity. The counter never goes below zero; an
    /// unbalanced release is logged and floored rather than wrapping.
    pub async fn release(&self, schedule_id: Uuid) -> Result<Schedule, SchedulingError> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules
            .get_mut(&schedule_id)
            .ok_or(SchedulingError::NotFound)?;

        if schedule.booked_count == 0 {
            warn!(
                schedule_id = %schedule_id,
                "Release called on schedule with zero booked count"
            );
        } else {
            schedule.booked_count -= 1;
        }

        debug!(
            schedule_id = %schedule_id,
            booked = schedule.booked_count,
            "Released slot capacity"
        );
        Ok(schedule.clone())
    }

    pub async fn set_status(
        &self,
        schedule_id: Uuid,
        status: ScheduleStatus,
    ) -> Result<Schedule, SchedulingError> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules
            .get_mut(&schedule_id)
            .ok_or(SchedulingError::NotFound)?;
        schedule.status = status;
        Ok(schedule.clone())
    }

    /// Delete a block. Refused while any capacity is claimed, since the
    /// booked count equals the number of live appointments.
    pub async fn delete(&self, schedule_id: Uuid) -> Result<(), SchedulingError> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules.get(&schedule_id).ok_or(SchedulingError::NotFound)?;

        if schedule.booked_count > 0 {
            return Err(SchedulingError::ScheduleHasBookings);
        }

        schedules.remove(&schedule_id);
        debug!(schedule_id = %schedule_id, "Deleted schedule block");
        Ok(())
    }
}

impl Default for SlotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn upsert_same_key_updates_in_place() {
        let store = SlotStore::new();
        let doctor = Uuid::new_v4();

        let first = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 10)
            .await
            .unwrap();
        let second = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(13, 0), 20)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.capacity, 20);
        assert_eq!(second.end_time, t(13, 0));
        assert_eq!(store.list_for_doctor(doctor).await.len(), 1);
    }

    #[tokio::test]
    async fn upsert_reopens_closed_block_and_keeps_booked_count() {
        let store = SlotStore::new();
        let doctor = Uuid::new_v4();

        let block = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 5)
            .await
            .unwrap();
        store.try_reserve(block.id).await.unwrap();
        store.set_status(block.id, ScheduleStatus::Closed).await.unwrap();

        let updated = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 8)
            .await
            .unwrap();

        assert_eq!(updated.status, ScheduleStatus::Open);
        assert_eq!(updated.booked_count, 1);
        assert_eq!(updated.capacity, 8);
    }

    #[tokio::test]
    async fn upsert_rejects_capacity_below_booked() {
        let store = SlotStore::new();
        let doctor = Uuid::new_v4();

        let block = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 3)
            .await
            .unwrap();
        store.try_reserve(block.id).await.unwrap();
        store.try_reserve(block.id).await.unwrap();

        let result = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 1)
            .await;
        assert_matches!(
            result,
            Err(SchedulingError::CapacityBelowBooked { requested: 1, booked: 2 })
        );

        // Lowering exactly to the booked count is allowed.
        let updated = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 2)
            .await
            .unwrap();
        assert_eq!(updated.capacity, 2);
        assert_eq!(updated.booked_count, 2);
    }

    #[tokio::test]
    async fn upsert_rejects_inverted_times() {
        let store = SlotStore::new();
        let result = store
            .upsert_schedule(Uuid::new_v4(), d("2026-09-01"), t(12, 0), t(9, 0), 5)
            .await;
        assert_matches!(result, Err(SchedulingError::Validation(_)));
    }

    #[tokio::test]
    async fn reserve_fills_to_capacity_then_rejects() {
        let store = SlotStore::new();
        let doctor = Uuid::new_v4();
        let block = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 2)
            .await
            .unwrap();

        store.try_reserve(block.id).await.unwrap();
        let full = store.try_reserve(block.id).await.unwrap();
        assert_eq!(full.booked_count, 2);

        assert_matches!(store.try_reserve(block.id).await, Err(SchedulingError::SlotFull));
    }

    #[tokio::test]
    async fn reserve_on_closed_block_is_rejected() {
        let store = SlotStore::new();
        let doctor = Uuid::new_v4();
        let block = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 2)
            .await
            .unwrap();
        store.set_status(block.id, ScheduleStatus::Closed).await.unwrap();

        assert_matches!(
            store.try_reserve(block.id).await,
            Err(SchedulingError::ScheduleClosed)
        );
    }

    #[tokio::test]
    async fn release_floors_at_zero() {
        let store = SlotStore::new();
        let doctor = Uuid::new_v4();
        let block = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 2)
            .await
            .unwrap();

        let after = store.release(block.id).await.unwrap();
        assert_eq!(after.booked_count, 0);
    }

    #[tokio::test]
    async fn delete_refused_while_booked() {
        let store = SlotStore::new();
        let doctor = Uuid::new_v4();
        let block = store
            .upsert_schedule(doctor, d("2026-09-01"), t(9, 0), t(12, 0), 2)
            .await
            .unwrap();
        store.try_reserve(block.id).await.unwrap();

        assert_matches!(
            store.delete(block.id).await,
            Err(SchedulingError::ScheduleHasBookings)
        );

        store.release(block.id).await.unwrap();
        store.delete(block.id).await.unwrap();
        assert!(store.get(block.id).await.is_none());
    }

    #[tokio::test]
    async fn open_slot_listing_keeps_full_blocks_and_skips_closed_ones() {
        let store = SlotStore::new();
        let doctor = Uuid::new_v4();
        let date = d("2026-09-01");

        let morning = store
            .upsert_schedule(doctor, date, t(9, 0), t(12, 0), 1)
            .await
            .unwrap();
        let afternoon = store
            .upsert_schedule(doctor, date, t(13, 0), t(17, 0), 5)
            .await
            .unwrap();
        let evening = store
            .upsert_schedule(doctor, date, t(18, 0), t(20, 0), 5)
            .await
            .unwrap();

        store.try_reserve(morning.id).await.unwrap();
        store.set_status(evening.id, ScheduleStatus::Closed).await.unwrap();

        // The full morning block stays visible; only the closed one is gone.
        let open = store.list_open_slots(doctor, date).await;
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].id, morning.id);
        assert_eq!(open[0].remaining_capacity(), 0);
        assert_eq!(open[1].id, afternoon.id);
        assert_eq!(open[1].remaining_capacity(), 5);
    }
}
