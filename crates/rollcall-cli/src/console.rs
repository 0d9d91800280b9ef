//! Terminal status badge and error notifications.

use rollcall_core::{CameraError, EventKind, SessionEvent, SessionObserver};
use rollcall_hw::FacingMode;
use uuid::Uuid;

/// Prints "Camera Active" / "Camera Offline" on lifecycle events and
/// surfaces device errors as notifications.
pub struct StatusBadge;

impl SessionObserver for StatusBadge {
    fn on_event(&self, event: &SessionEvent) {
        tracing::debug!(
            session = %event.session.id,
            event = event.kind.as_str(),
            at = %event.timestamp,
            "camera event"
        );
        println!("{}", badge(event));
    }

    fn on_error(&self, session: Uuid, error: &CameraError) {
        tracing::debug!(%session, category = error.category(), "camera error");
        eprintln!("{}", notification(error));
    }
}

fn badge(event: &SessionEvent) -> String {
    match event.kind {
        EventKind::Start => {
            let resolution = event
                .session
                .resolution
                .map(|r| format!("{}x{}", r.width, r.height))
                .unwrap_or_else(|| "unknown resolution".to_string());
            format!(
                "● Camera Active ({resolution}, {})",
                facing_label(event.session.facing_mode)
            )
        }
        EventKind::Stop => "○ Camera Offline".to_string(),
    }
}

fn notification(error: &CameraError) -> String {
    format!("Camera Error: {error}")
}

fn facing_label(facing: FacingMode) -> &'static str {
    match facing {
        FacingMode::User => "front",
        FacingMode::Environment => "back",
    }
}
