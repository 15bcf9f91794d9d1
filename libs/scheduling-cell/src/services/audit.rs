// libs/scheduling-cell/src/services/audit.rs
//
// Audit trail for scheduling mutations. Sinks are fire-and-forget; a slow or
// failing sink never blocks or fails the operation it records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ScheduleCreated,
    ScheduleDeleted,
    AppointmentBooked,
    AppointmentCancelled,
    AppointmentCompleted,
    AppointmentRescheduled,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::ScheduleCreated => write!(f, "schedule_created"),
            AuditAction::ScheduleDeleted => write!(f, "schedule_deleted"),
            AuditAction::AppointmentBooked => write!(f, "appointment_booked"),
            AuditAction::AppointmentCancelled => write!(f, "appointment_cancelled"),
            AuditAction::AppointmentCompleted => write!(f, "appointment_completed"),
            AuditAction::AppointmentRescheduled => write!(f, "appointment_rescheduled"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor_id: Uuid,
    pub subject_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, actor_id: Uuid, subject_id: Uuid) -> Self {
        Self {
            action,
            actor_id,
            subject_id,
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Default sink: structured log lines on the `audit` target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            action = %event.action,
            actor_id = %event.actor_id,
            subject_id = %event.subject_id,
            occurred_at = %event.occurred_at,
            "Audit event"
        );
    }
}
