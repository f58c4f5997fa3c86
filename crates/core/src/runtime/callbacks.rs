use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ObserverError, panic_message};
use crate::types::{AgentEvent, DecisionResult, EventKind, SleepResult};

/// Handle returned by [`CallbackRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackId(u64);

/// An observer for one event kind.
#[derive(Clone)]
pub enum Observer {
    Response(Arc<dyn Fn(&str) + Send + Sync>),
    Decision(Arc<dyn Fn(&DecisionResult) + Send + Sync>),
    Sleep(Arc<dyn Fn(&SleepResult) + Send + Sync>),
}

impl Observer {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Response(_) => EventKind::Response,
            Self::Decision(_) => EventKind::Decision,
            Self::Sleep(_) => EventKind::Sleep,
        }
    }

    /// Invoke with `event`. Events of another kind are ignored.
    fn call(&self, event: &AgentEvent) {
        match (self, event) {
            (Self::Response(f), AgentEvent::Response(text)) => f(text),
            (Self::Decision(f), AgentEvent::Decision(decision)) => f(decision),
            (Self::Sleep(f), AgentEvent::Sleep(sleep)) => f(sleep),
            _ => {}
        }
    }
}

/// Ordered observers per event kind.
///
/// Observers run on the dispatching task, outside the registry lock, so they
/// may register or remove observers themselves. A panicking observer is
/// isolated and reported as an [`ObserverError`].
#[derive(Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    observers: RwLock<Vec<(CallbackId, Observer)>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Observer) -> CallbackId {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let kind = observer.kind();
        self.observers.write().unwrap_or_else(PoisonError::into_inner).push((id, observer));
        tracing::debug!(%kind, id = id.0, "observer registered");
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unregister(&self, id: CallbackId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        before != observers.len()
    }

    /// Number of observers registered for `kind`.
    pub fn len(&self, kind: EventKind) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, o)| o.kind() == kind)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    /// Invoke every observer of the event's kind in registration order.
    /// Returns the failures; they never stop the remaining observers.
    pub fn dispatch(&self, event: &AgentEvent) -> Vec<ObserverError> {
        let kind = event.kind();
        let targets: Vec<(CallbackId, Observer)> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, o)| o.kind() == kind)
            .cloned()
            .collect();

        let mut failures = Vec::new();
        for (id, observer) in targets {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer.call(event))) {
                let error = ObserverError { kind, id: id.0, message: panic_message(payload.as_ref()) };
                tracing::warn!(%kind, id = id.0, error = %error.message, "observer failed");
                failures.push(error);
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Observer) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |tag: &str| {
            let sink = sink.clone();
            let tag = tag.to_owned();
            Observer::Response(Arc::new(move |text: &str| sink.lock().unwrap().push(format!("{tag}:{text}"))))
        };
        (log, make)
    }

    fn explode(_: &str) {
        panic!("boom");
    }

    #[test]
    fn dispatch_runs_in_registration_order() {
        let registry = CallbackRegistry::new();
        let (log, make) = recorder();
        registry.register(make("a"));
        registry.register(make("b"));
        registry.register(make("c"));
        assert!(registry.dispatch(&AgentEvent::Response("hi".into())).is_empty());
        assert_eq!(*log.lock().unwrap(), ["a:hi", "b:hi", "c:hi"]);
    }

    #[test]
    fn dispatch_only_reaches_matching_kind() {
        let registry = CallbackRegistry::new();
        let (log, make) = recorder();
        registry.register(make("r"));
        let sleep = SleepResult { duration_secs: 30, reasoning: "r".into() };
        registry.dispatch(&AgentEvent::Sleep(sleep));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(registry.len(EventKind::Response), 1);
        assert_eq!(registry.len(EventKind::Sleep), 0);
    }

    #[test]
    fn panicking_observer_is_isolated() {
        let registry = CallbackRegistry::new();
        let (log, make) = recorder();
        let bad = registry.register(Observer::Response(Arc::new(explode)));
        registry.register(make("after"));

        let failures = registry.dispatch(&AgentEvent::Response("x".into()));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, bad.0);
        assert_eq!(failures[0].kind, EventKind::Response);
        assert_eq!(failures[0].message, "boom");
        assert_eq!(*log.lock().unwrap(), ["after:x"]);
    }

    #[test]
    fn unregistered_observer_is_not_called() {
        let registry = CallbackRegistry::new();
        let (log, make) = recorder();
        let id = registry.register(make("gone"));
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        registry.dispatch(&AgentEvent::Response("x".into()));
        assert!(log.lock().unwrap().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn observer_may_register_during_dispatch() {
        let registry = Arc::new(CallbackRegistry::new());
        let inner = registry.clone();
        registry.register(Observer::Response(Arc::new(move |_: &str| {
            inner.register(Observer::Response(Arc::new(|_: &str| {})));
        })));
        registry.dispatch(&AgentEvent::Response("x".into()));
        assert_eq!(registry.len(EventKind::Response), 2);
    }
}
