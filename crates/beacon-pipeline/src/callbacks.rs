//! Per-request callback registry.

use crate::{EventError, EventHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{trace, warn};

/// Streaming observer for one registered request. Invoked per handle/error
/// as records arrive; `on_complete` fires exactly once when the request's
/// response cycle finishes.
pub trait ResponseHandler: Send + Sync {
    fn on_handle(&self, handle: &EventHandle);
    fn on_error(&self, error: &EventError);
    fn on_complete(&self);
}

/// One-shot completion callback receiving everything accumulated for the
/// request, possibly both empty.
pub type CompletionCallback = Box<dyn FnOnce(Vec<EventHandle>, Vec<EventError>) + Send>;

struct Registration {
    handler: Option<Arc<dyn ResponseHandler>>,
    completion: Option<CompletionCallback>,
    handles: Vec<EventHandle>,
    errors: Vec<EventError>,
}

/// Registry mapping an originating request's event id to its callbacks.
///
/// Keys are request *event* ids, independent of the correlation ids the
/// queue assigns to hits. Removal on the first `unregister` makes the
/// terminal notification exactly-once under concurrent access.
#[derive(Default)]
pub struct CallbackRegistry {
    registrations: Mutex<HashMap<String, Registration>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers callbacks for a request event id. A call with neither a
    /// handler nor a completion is a no-op, as is an empty id.
    pub fn register(
        &self,
        request_event_id: &str,
        handler: Option<Arc<dyn ResponseHandler>>,
        completion: Option<CompletionCallback>,
    ) {
        if request_event_id.is_empty() {
            warn!("Refusing to register callbacks for an empty request event id");
            return;
        }
        if handler.is_none() && completion.is_none() {
            return;
        }

        trace!(request_event_id, "Registering response callbacks");
        let mut registrations = self.registrations.lock().expect("lock poisoned");
        registrations.insert(
            request_event_id.to_string(),
            Registration {
                handler,
                completion,
                handles: Vec::new(),
                errors: Vec::new(),
            },
        );
    }

    /// Records a handle for the request and forwards it to the handler, if
    /// any. Unknown ids are no-ops.
    pub fn notify_handle(&self, request_event_id: &str, handle: &EventHandle) {
        let handler = {
            let mut registrations = self.registrations.lock().expect("lock poisoned");
            let Some(registration) = registrations.get_mut(request_event_id) else {
                return;
            };
            registration.handles.push(handle.clone());
            registration.handler.clone()
        };

        // Invoked outside the lock so a handler may re-enter the registry
        if let Some(handler) = handler {
            handler.on_handle(handle);
        }
    }

    /// Records an error for the request and forwards it to the handler, if
    /// any. Unknown ids are no-ops.
    pub fn notify_error(&self, request_event_id: &str, error: &EventError) {
        let handler = {
            let mut registrations = self.registrations.lock().expect("lock poisoned");
            let Some(registration) = registrations.get_mut(request_event_id) else {
                return;
            };
            registration.errors.push(error.clone());
            registration.handler.clone()
        };

        if let Some(handler) = handler {
            handler.on_error(error);
        }
    }

    /// Fires the terminal notifications for the id and removes the
    /// registration. Idempotent: only the first call has effect.
    pub fn unregister(&self, request_event_id: &str) {
        let registration = {
            let mut registrations = self.registrations.lock().expect("lock poisoned");
            registrations.remove(request_event_id)
        };
        let Some(registration) = registration else {
            return;
        };

        trace!(request_event_id, "Unregistering response callbacks");
        if let Some(completion) = registration.completion {
            completion(registration.handles, registration.errors);
        }
        if let Some(handler) = registration.handler {
            handler.on_complete();
        }
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registrations.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        handles: AtomicUsize,
        errors: AtomicUsize,
        completions: AtomicUsize,
    }

    impl ResponseHandler for CountingHandler {
        fn on_handle(&self, _handle: &EventHandle) {
            self.handles.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &EventError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_complete(&self) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_handle() -> EventHandle {
        serde_json::from_value(serde_json::json!({"type": "state:store"})).unwrap()
    }

    fn sample_error() -> EventError {
        serde_json::from_value(serde_json::json!({"title": "Failed"})).unwrap()
    }

    #[test]
    fn handler_receives_streamed_records() {
        let registry = CallbackRegistry::new();
        let handler = Arc::new(CountingHandler::default());
        registry.register("req-1", Some(handler.clone()), None);

        registry.notify_handle("req-1", &sample_handle());
        registry.notify_handle("req-1", &sample_handle());
        registry.notify_error("req-1", &sample_error());

        assert_eq!(handler.handles.load(Ordering::SeqCst), 2);
        assert_eq!(handler.errors.load(Ordering::SeqCst), 1);
        assert_eq!(handler.completions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn completion_receives_accumulated_results() {
        let registry = CallbackRegistry::new();
        let received: Arc<Mutex<Option<(usize, usize)>>> = Arc::new(Mutex::new(None));
        let sink = received.clone();
        registry.register(
            "req-1",
            None,
            Some(Box::new(move |handles, errors| {
                *sink.lock().unwrap() = Some((handles.len(), errors.len()));
            })),
        );

        registry.notify_handle("req-1", &sample_handle());
        registry.notify_error("req-1", &sample_error());
        registry.notify_error("req-1", &sample_error());
        registry.unregister("req-1");

        assert_eq!(*received.lock().unwrap(), Some((1, 2)));
    }

    #[test]
    fn unregister_without_notifications_fires_terminal_once() {
        let registry = CallbackRegistry::new();
        let handler = Arc::new(CountingHandler::default());
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        registry.register(
            "req-1",
            Some(handler.clone()),
            Some(Box::new(move |handles, errors| {
                assert!(handles.is_empty());
                assert!(errors.is_empty());
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );

        registry.unregister("req-1");
        registry.unregister("req-1");
        registry.unregister("req-1");

        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(handler.completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let registry = CallbackRegistry::new();
        registry.notify_handle("nope", &sample_handle());
        registry.notify_error("nope", &sample_error());
        registry.unregister("nope");
        assert!(registry.is_empty());
    }

    #[test]
    fn empty_registration_is_refused() {
        let registry = CallbackRegistry::new();
        registry.register("", Some(Arc::new(CountingHandler::default())), None);
        registry.register("req-1", None, None);
        assert!(registry.is_empty());
    }

    #[test]
    fn notifications_after_unregister_are_dropped() {
        let registry = CallbackRegistry::new();
        let handler = Arc::new(CountingHandler::default());
        registry.register("req-1", Some(handler.clone()), None);

        registry.unregister("req-1");
        registry.notify_handle("req-1", &sample_handle());

        assert_eq!(handler.handles.load(Ordering::SeqCst), 0);
        assert_eq!(handler.completions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_notify_and_unregister_fires_once() {
        let registry = Arc::new(CallbackRegistry::new());
        let completions = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = completions.clone();
            registry.register(
                "req-1",
                None,
                Some(Box::new(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            );

            let threads: Vec<_> = (0..4)
                .map(|_| {
                    let registry = registry.clone();
                    std::thread::spawn(move || {
                        registry.notify_handle("req-1", &sample_handle());
                        registry.unregister("req-1");
                    })
                })
                .collect();
            for t in threads {
                t.join().unwrap();
            }
        }

        assert_eq!(completions.load(Ordering::SeqCst), 20);
    }
}
