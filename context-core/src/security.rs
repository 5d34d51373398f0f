//! Security/audit event logging (ported from `security_logger.py`'s
//! `SecurityEventType` enum in the original source).
//!
//! Events are emitted as structured `tracing` events on the `security`
//! target so a deployment can route them to a separate audit sink without
//! the engine knowing anything about where they end up.

use serde::Serialize;
use uuid::Uuid;

/// Mirrors the original `SecurityEventType` enum values one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventType {
    AuthSuccess,
    AuthFailure,
    ReadOnlyViolation,
    ValidationRejected,
    CrossProjectAccessGranted,
    CrossProjectAccessDenied,
    ConsentChanged,
    BulkOperationExecuted,
    ExportPerformed,
    ImportPerformed,
}

/// One audit record. `project_name`/`memory_id` are optional because not
/// every event (e.g. `AuthFailure`) is scoped to a project or a unit.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub project_name: Option<String>,
    pub memory_id: Option<Uuid>,
    pub detail: String,
}

/// Emit `event` as a structured `tracing` event at a severity appropriate to
/// its type: denials and violations log at `warn`, everything else at
/// `info`.
pub fn audit_log(event: &SecurityEvent) {
    match event.event_type {
        SecurityEventType::AuthFailure
        | SecurityEventType::ReadOnlyViolation
        | SecurityEventType::ValidationRejected
        | SecurityEventType::CrossProjectAccessDenied => {
            tracing::warn!(
                target: "security",
                event_type = ?event.event_type,
                project_name = event.project_name.as_deref(),
                memory_id = event.memory_id.map(|id| id.to_string()),
                detail = %event.detail,
                "security event"
            );
        }
        _ => {
            tracing::info!(
                target: "security",
                event_type = ?event.event_type,
                project_name = event.project_name.as_deref(),
                memory_id = event.memory_id.map(|id| id.to_string()),
                detail = %event.detail,
                "security event"
            );
        }
    }
}

/// Convenience constructor + log in one call, for the common case of
/// logging an event with no memory id attached.
pub fn log_project_event(event_type: SecurityEventType, project_name: &str, detail: impl Into<String>) {
    audit_log(&SecurityEvent {
        event_type,
        project_name: Some(project_name.to_string()),
        memory_id: None,
        detail: detail.into(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_log_does_not_panic_for_every_event_type() {
        for event_type in [
            SecurityEventType::AuthSuccess,
            SecurityEventType::AuthFailure,
            SecurityEventType::ReadOnlyViolation,
            SecurityEventType::ValidationRejected,
            SecurityEventType::CrossProjectAccessGranted,
            SecurityEventType::CrossProjectAccessDenied,
            SecurityEventType::ConsentChanged,
            SecurityEventType::BulkOperationExecuted,
            SecurityEventType::ExportPerformed,
            SecurityEventType::ImportPerformed,
        ] {
            audit_log(&SecurityEvent {
                event_type,
                project_name: Some("demo".to_string()),
                memory_id: None,
                detail: "test".to_string(),
            });
        }
    }
}
