//! Per-event-class listener registry with reference-counted transport
//! subscriptions.
//!
//! The transport is only asked to `start_notify` when the first listener
//! for a class appears, and to `stop_notify` when the last one leaves.
//! A removal pinned with `persist` keeps the subscription up, and a
//! later register will not re-issue it.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use log::warn;
use tokio::time::timeout;
use uuid::Uuid;

use crate::codec;
use crate::error::{CodecError, WandError};
use crate::transport::Transport;
use crate::types::{EventClass, SensorEvent};

/// Listener callbacks are invoked on the notification-delivery path and
/// must not block; they run outside every registry lock.
pub type SensorCallback = Arc<dyn Fn(&SensorEvent) + Send + Sync>;

/// Opaque token returned by [`Registry::register`], required for removal.
/// Random per registration, so ids never collide across reconnect cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn generate() -> ListenerId {
        ListenerId(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Default)]
struct ClassState {
    // IndexMap keeps insertion order; dispatch promises to invoke
    // listeners in the order they were registered.
    listeners: IndexMap<ListenerId, SensorCallback>,
    subscribed: bool,
}

#[derive(Default)]
pub struct Registry {
    classes: Mutex<HashMap<EventClass, ClassState>>,
    hooks: Mutex<HashMap<EventClass, SensorCallback>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Adds a listener. When the class has no live transport subscription
    /// yet, awaits `start_notify` under `deadline`; a failure or timeout
    /// rolls the insertion back.
    pub async fn register<T: Transport>(
        &self,
        transport: &T,
        event: EventClass,
        callback: SensorCallback,
        deadline: Duration,
    ) -> Result<ListenerId, WandError> {
        let id = ListenerId::generate();

        let needs_subscribe = {
            let mut classes = self.classes.lock().unwrap();
            let state = classes.entry(event).or_default();
            state.listeners.insert(id, callback);
            !state.subscribed
        };

        if needs_subscribe {
            let result = timeout(deadline, transport.start_notify(event.characteristic())).await;

            let mut classes = self.classes.lock().unwrap();
            let state = classes.entry(event).or_default();
            match result {
                Ok(Ok(())) => state.subscribed = true,
                Ok(Err(source)) => {
                    state.listeners.shift_remove(&id);
                    return Err(WandError::SubscriptionFailed { event, source });
                }
                Err(_) => {
                    state.listeners.shift_remove(&id);
                    return Err(WandError::TransportTimeout(deadline));
                }
            }
        }

        Ok(id)
    }

    /// Removes a listener. Returns false (with no transport call) for
    /// unknown ids. When the last listener of a class leaves and
    /// `persist` is false, awaits `stop_notify` under `deadline`.
    pub async fn unregister<T: Transport>(
        &self,
        transport: &T,
        id: ListenerId,
        persist: bool,
        deadline: Duration,
    ) -> Result<bool, WandError> {
        let mut unsubscribe = None;

        let removed = {
            let mut classes = self.classes.lock().unwrap();
            let mut removed = false;

            for (event, state) in classes.iter_mut() {
                if state.listeners.shift_remove(&id).is_none() {
                    continue;
                }
                removed = true;
                if state.listeners.is_empty() && state.subscribed && !persist {
                    // Flip the flag before the await so a concurrent
                    // register sees the pre-transition state and
                    // re-subscribes rather than assuming the link is up.
                    state.subscribed = false;
                    unsubscribe = Some(*event);
                }
                break;
            }

            removed
        };

        if let Some(event) = unsubscribe {
            match timeout(deadline, transport.stop_notify(event.characteristic())).await {
                Ok(Ok(())) => {}
                Ok(Err(source)) => return Err(WandError::SubscriptionFailed { event, source }),
                Err(_) => return Err(WandError::TransportTimeout(deadline)),
            }
        }

        Ok(removed)
    }

    /// Installs (or replaces) the built-in hook for a class. The hook is
    /// invoked before user listeners on every dispatch.
    pub fn set_hook(&self, event: EventClass, callback: SensorCallback) {
        self.hooks.lock().unwrap().insert(event, callback);
    }

    /// Decodes a raw notification payload and fans it out: built-in hook
    /// first, then every listener in registration order. Callbacks run
    /// outside the registry locks; a panicking callback is reported and
    /// skipped without aborting the rest.
    pub fn dispatch(&self, event: EventClass, data: &[u8]) -> Result<(), CodecError> {
        let decoded = codec::decode_event(event, data)?;

        let hook = self.hooks.lock().unwrap().get(&event).cloned();
        let callbacks: Vec<SensorCallback> = {
            let classes = self.classes.lock().unwrap();
            classes
                .get(&event)
                .map(|state| state.listeners.values().cloned().collect())
                .unwrap_or_default()
        };

        if let Some(hook) = hook {
            invoke_isolated(&hook, &decoded, "built-in hook");
        }
        for callback in &callbacks {
            invoke_isolated(callback, &decoded, "listener");
        }

        Ok(())
    }

    /// Drops every listener and forces all subscription flags false
    /// without touching the transport. Used on disconnect, where the
    /// link is already gone. Built-in hooks survive.
    pub fn clear(&self) {
        self.classes.lock().unwrap().clear();
    }

    pub fn listener_count(&self, event: EventClass) -> usize {
        self.classes
            .lock()
            .unwrap()
            .get(&event)
            .map_or(0, |state| state.listeners.len())
    }

    pub fn is_subscribed(&self, event: EventClass) -> bool {
        self.classes
            .lock()
            .unwrap()
            .get(&event)
            .map_or(false, |state| state.subscribed)
    }
}

fn invoke_isolated(callback: &SensorCallback, event: &SensorEvent, kind: &str) {
    if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
        warn!("A {} for {:?} panicked during dispatch", kind, event.class());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::error::TransportError;

    const DEADLINE: Duration = Duration::from_millis(200);

    /// Counts notify calls; optionally fails or hangs on `start_notify`.
    #[derive(Default)]
    struct NotifyProbe {
        starts: AtomicUsize,
        stops: AtomicUsize,
        fail_start: bool,
        hang_start: bool,
    }

    #[async_trait]
    impl Transport for NotifyProbe {
        async fn connect(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn read_characteristic(&self, _c: Uuid) -> Result<Vec<u8>, TransportError> {
            Ok(Vec::new())
        }
        async fn write_characteristic(&self, _c: Uuid, _p: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
        async fn start_notify(&self, _c: Uuid) -> Result<(), TransportError> {
            if self.hang_start {
                futures::future::pending::<()>().await;
            }
            if self.fail_start {
                return Err(TransportError::Other("subscribe refused".into()));
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn stop_notify(&self, _c: Uuid) -> Result<(), TransportError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn noop() -> SensorCallback {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn only_first_listener_subscribes_transport() {
        let registry = Registry::new();
        let probe = NotifyProbe::default();

        registry
            .register(&probe, EventClass::Position, noop(), DEADLINE)
            .await
            .unwrap();
        registry
            .register(&probe, EventClass::Position, noop(), DEADLINE)
            .await
            .unwrap();

        assert_eq!(probe.starts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.listener_count(EventClass::Position), 2);
    }

    #[tokio::test]
    async fn only_last_removal_unsubscribes_transport() {
        let registry = Registry::new();
        let probe = NotifyProbe::default();

        let a = registry
            .register(&probe, EventClass::Position, noop(), DEADLINE)
            .await
            .unwrap();
        let b = registry
            .register(&probe, EventClass::Position, noop(), DEADLINE)
            .await
            .unwrap();

        assert!(registry.unregister(&probe, a, false, DEADLINE).await.unwrap());
        assert_eq!(probe.stops.load(Ordering::SeqCst), 0);

        assert!(registry.unregister(&probe, b, false, DEADLINE).await.unwrap());
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persist_pins_the_transport_subscription() {
        let registry = Registry::new();
        let probe = NotifyProbe::default();

        let id = registry
            .register(&probe, EventClass::Button, noop(), DEADLINE)
            .await
            .unwrap();
        assert!(registry.unregister(&probe, id, true, DEADLINE).await.unwrap());

        assert_eq!(probe.stops.load(Ordering::SeqCst), 0);
        assert!(registry.is_subscribed(EventClass::Button));

        // A later listener must not re-issue start_notify either.
        registry
            .register(&probe, EventClass::Button, noop(), DEADLINE)
            .await
            .unwrap();
        assert_eq!(probe.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_id_is_a_silent_no_op() {
        let registry = Registry::new();
        let probe = NotifyProbe::default();

        registry
            .register(&probe, EventClass::Battery, noop(), DEADLINE)
            .await
            .unwrap();
        let removed = registry
            .unregister(&probe, ListenerId::generate(), false, DEADLINE)
            .await
            .unwrap();

        assert!(!removed);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 0);
        assert_eq!(registry.listener_count(EventClass::Battery), 1);
    }

    #[tokio::test]
    async fn failed_subscribe_rolls_back_the_insertion() {
        let registry = Registry::new();
        let probe = NotifyProbe {
            fail_start: true,
            ..NotifyProbe::default()
        };

        let err = registry
            .register(&probe, EventClass::Temperature, noop(), DEADLINE)
            .await
            .unwrap_err();

        assert!(matches!(err, WandError::SubscriptionFailed { .. }));
        assert_eq!(registry.listener_count(EventClass::Temperature), 0);
        assert!(!registry.is_subscribed(EventClass::Temperature));
    }

    #[tokio::test]
    async fn subscribe_timeout_rolls_back_the_insertion() {
        let registry = Registry::new();
        let probe = NotifyProbe {
            hang_start: true,
            ..NotifyProbe::default()
        };

        let err = registry
            .register(&probe, EventClass::Position, noop(), Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, WandError::TransportTimeout(_)));
        assert_eq!(registry.listener_count(EventClass::Position), 0);
    }

    #[tokio::test]
    async fn dispatch_runs_hook_then_listeners_in_registration_order() {
        let registry = Registry::new();
        let probe = NotifyProbe::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let recorder = |tag: &'static str| -> SensorCallback {
            let order = order.clone();
            Arc::new(move |_| order.lock().unwrap().push(tag))
        };

        registry.set_hook(EventClass::Button, recorder("hook"));
        registry
            .register(&probe, EventClass::Button, recorder("first"), DEADLINE)
            .await
            .unwrap();
        registry
            .register(&probe, EventClass::Button, recorder("second"), DEADLINE)
            .await
            .unwrap();

        registry.dispatch(EventClass::Button, &[1]).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["hook", "first", "second"]);
    }

    #[tokio::test]
    async fn panicking_listener_does_not_stop_the_rest() {
        let registry = Registry::new();
        let probe = NotifyProbe::default();
        let reached = Arc::new(AtomicUsize::new(0));

        registry
            .register(
                &probe,
                EventClass::Battery,
                Arc::new(|_| panic!("listener blew up")),
                DEADLINE,
            )
            .await
            .unwrap();
        let reached2 = reached.clone();
        registry
            .register(
                &probe,
                EventClass::Battery,
                Arc::new(move |_| {
                    reached2.fetch_add(1, Ordering::SeqCst);
                }),
                DEADLINE,
            )
            .await
            .unwrap();

        registry.dispatch(EventClass::Battery, &[50]).unwrap();

        assert_eq!(reached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dispatch_surfaces_decode_errors() {
        let registry = Registry::new();
        let err = registry.dispatch(EventClass::Position, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, CodecError::MalformedPayload { .. }));
    }

    #[tokio::test]
    async fn clear_drops_listeners_without_transport_calls() {
        let registry = Registry::new();
        let probe = NotifyProbe::default();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits2 = hits.clone();
        registry
            .register(
                &probe,
                EventClass::Button,
                Arc::new(move |_| {
                    hits2.fetch_add(1, Ordering::SeqCst);
                }),
                DEADLINE,
            )
            .await
            .unwrap();

        registry.clear();

        assert_eq!(probe.stops.load(Ordering::SeqCst), 0);
        assert!(!registry.is_subscribed(EventClass::Button));
        assert_eq!(registry.listener_count(EventClass::Button), 0);

        registry.dispatch(EventClass::Button, &[1]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
