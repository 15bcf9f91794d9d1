use std::sync::Arc;

use chrono::{Duration, NaiveTime, Utc};
use uuid::Uuid;

use scheduling_cell::models::{
    BookAppointmentRequest, CallerIdentity, CreateScheduleRequest, Role, SchedulingError,
};
use scheduling_cell::services::scheduling::{SchedulingPolicy, SchedulingService};

fn t(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

async fn service_with_block(capacity: u32) -> (Arc<SchedulingService>, Uuid, Uuid) {
    let svc = Arc::new(SchedulingService::new(SchedulingPolicy::default()));
    let doctor_id = Uuid::new_v4();
    let schedule = svc
        .create_schedule(
            &CallerIdentity { id: doctor_id, role: Role::Doctor },
            CreateScheduleRequest {
                doctor_id,
                date: Utc::now().date_naive() + Duration::days(1),
                start_time: t(9),
                end_time: t(12),
                capacity,
            },
        )
        .await
        .unwrap();
    (svc, doctor_id, schedule.id)
}

#[tokio::test]
async fn concurrent_bookings_never_exceed_capacity() {
    let capacity = 3u32;
    let contenders = 10usize;
    let (svc, doctor_id, schedule_id) = service_with_block(capacity).await;

    let mut handles = Vec::new();
    for _ in 0..contenders {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            let patient_id = Uuid::new_v4();
            svc.book(
                &CallerIdentity { id: patient_id, role: Role::Patient },
                BookAppointmentRequest {
                    patient_id,
                    doctor_id,
                    schedule_id,
                },
            )
            .await
        }));
    }

    let mut booked = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(SchedulingError::SlotFull) => rejected += 1,
            Err(e) => panic!("unexpected error under contention: {}", e),
        }
    }

    assert_eq!(booked, capacity as usize);
    assert_eq!(rejected, contenders - capacity as usize);
    assert_eq!(
        svc.slot_store().get(schedule_id).await.unwrap().booked_count,
        capacity
    );
}

#[tokio::test]
async fn heavy_contention_on_a_larger_block() {
    let capacity = 16u32;
    let contenders = 48usize;
    let (svc, doctor_id, schedule_id) = service_with_block(capacity).await;

    let mut handles = Vec::new();
    for _ in 0..contenders {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            let patient_id = Uuid::new_v4();
            svc.book(
                &CallerIdentity { id: patient_id, role: Role::Patient },
                BookAppointmentRequest {
                    patient_id,
                    doctor_id,
                    schedule_id,
                },
            )
            .await
        }));
    }

    let results = futures::future::join_all(handles).await;
    let booked = results
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(booked, capacity as usize);
    assert_eq!(
        svc.slot_store().get(schedule_id).await.unwrap().booked_count,
        capacity
    );
}

#[tokio::test]
async fn concurrent_duplicate_requests_book_once() {
    let (svc, doctor_id, schedule_id) = service_with_block(8).await;
    let patient_id = Uuid::new_v4();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            svc.book(
                &CallerIdentity { id: patient_id, role: Role::Patient },
                BookAppointmentRequest {
                    patient_id,
                    doctor_id,
                    schedule_id,
                },
            )
            .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.sort();
    ids.dedup();

    // Every racer saw the same appointment and only one unit was claimed.
    assert_eq!(ids.len(), 1);
    assert_eq!(svc.slot_store().get(schedule_id).await.unwrap().booked_count, 1);
}

#[tokio::test]
async fn concurrent_cancels_release_exactly_once() {
    let (svc, doctor_id, schedule_id) = service_with_block(4).await;
    let patient_id = Uuid::new_v4();
    let caller = CallerIdentity { id: patient_id, role: Role::Patient };

    let appointment = svc
        .book(
            &caller,
            BookAppointmentRequest {
                patient_id,
                doctor_id,
                schedule_id,
            },
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            svc.cancel(&caller, appointment.id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(svc.slot_store().get(schedule_id).await.unwrap().booked_count, 0);
}

#[tokio::test]
async fn mixed_bookings_and_cancellations_keep_the_counter_consistent() {
    let (svc, doctor_id, schedule_id) = service_with_block(32).await;

    let mut handles = Vec::new();
    for _ in 0..20 {
        let svc = svc.clone();
        handles.push(tokio::spawn(async move {
            let patient_id = Uuid::new_v4();
            let caller = CallerIdentity { id: patient_id, role: Role::Patient };
            let appointment = svc
                .book(
                    &caller,
                    BookAppointmentRequest {
                        patient_id,
                        doctor_id,
                        schedule_id,
                    },
                )
                .await?;
            svc.cancel(&caller, appointment.id).await?;
            Ok::<_, SchedulingError>(())
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let schedule = svc.slot_store().get(schedule_id).await.unwrap();
    assert_eq!(schedule.booked_count, 0);
}
