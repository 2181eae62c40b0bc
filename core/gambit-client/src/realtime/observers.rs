//! Observer registry for realtime events.
//!
//! Observers are keyed by event name and invoked in registration order.
//! Registration hands back a [`Subscription`] used to deregister; callbacks
//! are never compared by identity. A panicking observer is caught and
//! logged, and its siblings still receive the event.

use gambit_protocol::{
    event_names, ConnectionChange, Mission, RealtimeEvent, RecordDone, RecordStatus,
    SystemIndicators,
};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub type ObserverId = u64;

type Callback = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: ObserverId,
    by_event: HashMap<String, Vec<(ObserverId, Callback)>>,
}

/// Shared handle to the observer registry. Clones see the same observers.
#[derive(Clone, Default)]
pub struct Observers {
    inner: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = lock(&self.inner);
        let mut counts: Vec<(&str, usize)> = registry
            .by_event
            .iter()
            .map(|(event, observers)| (event.as_str(), observers.len()))
            .collect();
        counts.sort_unstable();
        f.debug_struct("Observers").field("events", &counts).finish()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for events named `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.inner);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .by_event
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            event: event.to_string(),
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Removes one observer (`Some(id)`) or every observer (`None`) for
    /// `event`. Returns how many were removed.
    pub fn off(&self, event: &str, id: Option<ObserverId>) -> usize {
        remove(&mut lock(&self.inner), event, id)
    }

    pub fn count(&self, event: &str) -> usize {
        lock(&self.inner)
            .by_event
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn on_indicators<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SystemIndicators) + Send + Sync + 'static,
    {
        self.on(event_names::INDICATORS, move |event| {
            if let RealtimeEvent::Indicators(data) = event {
                callback(data);
            }
        })
    }

    pub fn on_record_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RecordStatus) + Send + Sync + 'static,
    {
        self.on(event_names::RECORD_STATUS, move |event| {
            if let RealtimeEvent::RecordStatus(data) = event {
                callback(data);
            }
        })
    }

    pub fn on_mission_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Mission) + Send + Sync + 'static,
    {
        self.on(event_names::MISSION_STATUS, move |event| {
            if let RealtimeEvent::MissionStatus(data) = event {
                callback(data);
            }
        })
    }

    pub fn on_record_done<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RecordDone) + Send + Sync + 'static,
    {
        self.on(event_names::RECORD_DONE, move |event| {
            if let RealtimeEvent::RecordDone(data) = event {
                callback(data);
            }
        })
    }

    pub fn on_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionChange) + Send + Sync + 'static,
    {
        self.on(event_names::CONNECTION, move |event| {
            if let RealtimeEvent::Connection(data) = event {
                callback(data);
            }
        })
    }

    /// Delivers `event` to every observer registered under its name.
    /// Returns the number of observers that completed without panicking.
    pub(crate) fn emit(&self, event: &RealtimeEvent) -> usize {
        let name = event.name();
        // Snapshot so callbacks may (un)register without deadlocking.
        let callbacks: Vec<(ObserverId, Callback)> = match lock(&self.inner).by_event.get(name) {
            Some(observers) => observers.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, callback) in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    tracing::error!(
                        event = name,
                        observer = id,
                        panic = %panic_message(payload.as_ref()),
                        "Realtime observer panicked"
                    );
                }
            }
        }
        delivered
    }
}

/// Handle returned by registration; pass it back to remove the observer.
///
/// Dropping a subscription does not deregister anything.
#[derive(Debug)]
pub struct Subscription {
    event: String,
    id: ObserverId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Removes exactly this observer. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => remove(&mut lock(&inner), &self.event, Some(self.id)) > 0,
            None => false,
        }
    }
}

fn lock(inner: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn remove(registry: &mut Registry, event: &str, id: Option<ObserverId>) -> usize {
    let Some(observers) = registry.by_event.get_mut(event) else {
        return 0;
    };
    let removed = match id {
        Some(id) => {
            let before = observers.len();
            observers.retain(|(candidate, _)| *candidate != id);
            before - observers.len()
        }
        None => observers.len(),
    };
    if id.is_none() || observers.is_empty() {
        registry.by_event.remove(event);
    }
    removed
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_protocol::MissionState;
    use serde_json::json;

    fn indicators() -> RealtimeEvent {
        RealtimeEvent::Indicators(SystemIndicators {
            cpu: 10.0,
            temp: 40.0,
            disk: 5.0,
            mem: 20.0,
            battery: 90.0,
            sat: 12.0,
            fps: 30.0,
            connected: true,
        })
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn Fn(&RealtimeEvent) + Send + Sync>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |label: &str| -> Box<dyn Fn(&RealtimeEvent) + Send + Sync> {
            let log = Arc::clone(&log_clone);
            let label = label.to_string();
            Box::new(move |_event: &RealtimeEvent| log.lock().unwrap().push(label.clone()))
        };
        (log, make)
    }

    #[test]
    fn observers_fire_in_registration_order() {
        let observers = Observers::new();
        let (log, make) = recorder();
        observers.on("indicators", make("first"));
        observers.on("indicators", make("second"));

        assert_eq!(observers.emit(&indicators()), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn unsubscribe_removes_only_target() {
        let observers = Observers::new();
        let (log, make) = recorder();
        let first = observers.on("indicators", make("first"));
        observers.on("indicators", make("second"));

        assert!(first.unsubscribe());
        observers.emit(&indicators());
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
        assert_eq!(observers.count("indicators"), 1);
    }

    #[test]
    fn off_with_id_removes_one() {
        let observers = Observers::new();
        let (log, make) = recorder();
        observers.on("indicators", make("first"));
        let second = observers.on("indicators", make("second"));

        assert_eq!(observers.off("indicators", Some(second.id())), 1);
        assert_eq!(observers.off("indicators", Some(second.id())), 0);
        observers.emit(&indicators());
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn off_without_id_removes_every_observer_for_event() {
        let observers = Observers::new();
        let (log, make) = recorder();
        observers.on("indicators", make("a"));
        observers.on("indicators", make("b"));
        observers.on("record_status", make("c"));

        assert_eq!(observers.off("indicators", None), 2);
        assert_eq!(observers.emit(&indicators()), 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(observers.count("record_status"), 1);
    }

    #[test]
    fn panicking_observer_does_not_block_siblings() {
        let observers = Observers::new();
        let (log, make) = recorder();
        observers.on("indicators", |_| panic!("observer failure"));
        observers.on("indicators", make("survivor"));

        assert_eq!(observers.emit(&indicators()), 1);
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn typed_wrappers_receive_payloads() {
        let observers = Observers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        observers.on_mission_status(move |mission| {
            seen_clone.lock().unwrap().push((mission.id.clone(), mission.status));
        });

        let event = RealtimeEvent::MissionStatus(
            serde_json::from_value(json!({"id": "m1", "status": "RUNNING"})).unwrap(),
        );
        observers.emit(&event);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("m1".to_string(), MissionState::Running)]
        );
    }

    #[test]
    fn unknown_event_reaches_literal_name_observers() {
        let observers = Observers::new();
        let (log, make) = recorder();
        observers.on("calibration_step", make("calibration"));

        let delivered = observers.emit(&RealtimeEvent::Other {
            event: "calibration_step".to_string(),
            data: json!({"step": 2}),
        });
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock().unwrap(), vec!["calibration"]);
    }

    #[test]
    fn observer_may_unsubscribe_during_dispatch() {
        let observers = Observers::new();
        let observers_clone = observers.clone();
        observers.on("connection", move |_| {
            observers_clone.off("connection", None);
        });

        assert_eq!(observers.emit(&RealtimeEvent::connection(true)), 1);
        assert_eq!(observers.count("connection"), 0);
    }

    #[test]
    fn unsubscribe_after_registry_dropped_is_noop() {
        let observers = Observers::new();
        let subscription = observers.on("indicators", |_| {});
        drop(observers);
        assert!(!subscription.unsubscribe());
    }
}
