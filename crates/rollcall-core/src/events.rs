//! Session lifecycle events and observer registry.

use crate::error::CameraError;
use crate::session::SessionSnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Start,
    Stop,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Start => "start",
            EventKind::Stop => "stop",
        }
    }
}

/// A lifecycle event, carrying the session state at the moment it fired.
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub kind: EventKind,
    pub session: SessionSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Receives lifecycle events and error notifications from a session.
///
/// Handlers run synchronously inside the session operation that fired them.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);

    /// A device failure the operator should be told about.
    fn on_error(&self, _session: Uuid, _error: &CameraError) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Per-session observer list.
#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<dyn SessionObserver>)>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self, observer: Arc<dyn SessionObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn emit(&self, event: &SessionEvent) {
        for (_, observer) in &self.entries {
            observer.on_event(event);
        }
    }

    pub(crate) fn notify_error(&self, session: Uuid, error: &CameraError) {
        for (_, observer) in &self.entries {
            observer.on_error(session, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use rollcall_hw::FacingMode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Counter {
        events: Mutex<Vec<EventKind>>,
        errors: Mutex<Vec<CameraError>>,
    }

    impl SessionObserver for Counter {
        fn on_event(&self, event: &SessionEvent) {
            self.events.lock().unwrap().push(event.kind);
        }

        fn on_error(&self, _session: Uuid, error: &CameraError) {
            self.errors.lock().unwrap().push(error.clone());
        }
    }

    fn event(kind: EventKind) -> SessionEvent {
        SessionEvent {
            kind,
            session: SessionSnapshot {
                id: Uuid::nil(),
                state: SessionState::Idle,
                active: false,
                facing_mode: FacingMode::User,
                resolution: None,
                has_stream: false,
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_emit_reaches_every_subscriber() {
        let mut observers = Observers::default();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        observers.subscribe(a.clone());
        observers.subscribe(b.clone());

        observers.emit(&event(EventKind::Start));
        observers.notify_error(Uuid::nil(), &CameraError::DeviceBusy);

        assert_eq!(*a.events.lock().unwrap(), vec![EventKind::Start]);
        assert_eq!(*b.errors.lock().unwrap(), vec![CameraError::DeviceBusy]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut observers = Observers::default();
        let a = Arc::new(Counter::default());
        let id = observers.subscribe(a.clone());
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        assert_eq!(observers.len(), 0);

        observers.emit(&event(EventKind::Stop));
        assert!(a.events.lock().unwrap().is_empty());
    }
}
