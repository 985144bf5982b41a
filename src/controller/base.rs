//! Per-controller configuration, state and listener registry
//!
//! State is held as an immutable `Arc` snapshot. `update` clones the
//! current snapshot, applies the patch to the private copy and publishes
//! the result before notifying subscribers, so readers never observe a
//! half-applied patch.

use crate::controller::composable::ControllerContext;
use crate::errors::{KeyringError, Result};
use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Shape of a controller's state record.
pub trait StateShape: Clone + Default + Serialize + Send + Sync + 'static {
    /// Partial update; every `Some` field is a key that changed.
    type Patch: Default + DeserializeOwned + Send;

    /// Apply `patch` in place and return the names of the keys it touched.
    fn apply(&mut self, patch: Self::Patch) -> Vec<&'static str>;
}

/// Shape of a controller's configuration record.
pub trait ConfigShape: Clone + Default + Send + Sync + 'static {
    type Patch: Default + Send;

    /// Apply `patch`. With `existing_only`, optional fields that are
    /// currently unset stay unset.
    fn apply(&mut self, patch: Self::Patch, existing_only: bool);

    fn disabled(&self) -> bool;
}

/// State change callback. An error aborts the notification pass.
pub type Listener<S> = Arc<dyn Fn(&S) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscription<S> {
    id: ListenerId,
    watched: Vec<String>,
    listener: Listener<S>,
}

impl<S> Clone for Subscription<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            watched: self.watched.clone(),
            listener: self.listener.clone(),
        }
    }
}

impl<S> Subscription<S> {
    fn wants(&self, changed: &[&'static str]) -> bool {
        self.watched.is_empty()
            || changed
                .iter()
                .any(|key| self.watched.iter().any(|w| w == key))
    }
}

/// Configuration, state and subscriptions shared by every controller
pub struct BaseController<C: ConfigShape, S: StateShape> {
    name: &'static str,
    config: RwLock<C>,
    state: RwLock<Arc<S>>,
    listeners: Mutex<Vec<Subscription<S>>>,
    next_listener: AtomicU64,
    context: RwLock<Weak<ControllerContext>>,
}

impl<C: ConfigShape, S: StateShape> BaseController<C, S> {
    /// Start from defaults, then merge the initial config and state.
    pub fn new(name: &'static str, config: C::Patch, state: S::Patch) -> Self {
        let mut initial_config = C::default();
        initial_config.apply(config, false);

        let mut initial_state = S::default();
        initial_state.apply(state);

        Self {
            name,
            config: RwLock::new(initial_config),
            state: RwLock::new(Arc::new(initial_state)),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            context: RwLock::new(Weak::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<S> {
        self.state.read().clone()
    }

    pub fn config(&self) -> C {
        self.config.read().clone()
    }

    pub fn is_disabled(&self) -> bool {
        self.config.read().disabled()
    }

    /// Update configuration.
    ///
    /// `full_update = false` only touches fields that are already set;
    /// `overwrite` resets to defaults before applying.
    pub fn configure(&self, patch: C::Patch, overwrite: bool, full_update: bool) {
        let mut config = self.config.write();
        if full_update && overwrite {
            *config = C::default();
        }
        config.apply(patch, !full_update);
    }

    /// Merge (or with `overwrite`, replace) state, then notify subscribers.
    pub fn update(&self, patch: S::Patch, overwrite: bool) -> Result<()> {
        let (snapshot, changed) = {
            let mut guard = self.state.write();
            let mut next = if overwrite {
                S::default()
            } else {
                (**guard).clone()
            };
            let changed = next.apply(patch);
            let next = Arc::new(next);
            *guard = next.clone();
            (next, changed)
        };

        self.notify(&snapshot, &changed)
    }

    /// Merge cached JSON state, as produced by serializing `S`.
    pub fn rehydrate(&self, cached: &serde_json::Value) -> Result<()> {
        let patch: S::Patch = serde_json::from_value(cached.clone())?;
        self.update(patch, false)
    }

    fn notify(&self, state: &S, changed: &[&'static str]) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }

        // Listeners may subscribe or unsubscribe while being notified
        let subscriptions: Vec<Subscription<S>> = self.listeners.lock().clone();

        for subscription in subscriptions.iter().filter(|s| s.wants(changed)) {
            if let Err(e) = (subscription.listener)(state) {
                warn!("{} listener {:?} failed: {}", self.name, subscription.id, e);
                return Err(KeyringError::ListenerFailed {
                    controller: self.name.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Register a listener for changes to any of `watched`, or to
    /// everything when `watched` is empty.
    pub fn subscribe<F>(&self, listener: F, watched: &[&str]) -> ListenerId
    where
        F: Fn(&S) -> Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Subscription {
            id,
            watched: watched.iter().map(|key| key.to_string()).collect(),
            listener: Arc::new(listener),
        });
        debug!("{} subscribed listener {:?} to {:?}", self.name, id, watched);
        id
    }

    /// Returns true if a listener was found and removed
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|s| s.id != id);
        listeners.len() != before
    }

    pub(crate) fn attach_context(&self, context: Weak<ControllerContext>) {
        *self.context.write() = context;
    }

    /// Sibling registry, present once composed
    pub fn context(&self) -> Option<Arc<ControllerContext>> {
        self.context.read().upgrade()
    }
}

/// A controller built on [`BaseController`].
pub trait Controller: Send + Sync {
    type Config: ConfigShape;
    type State: StateShape;

    fn base(&self) -> &BaseController<Self::Config, Self::State>;

    /// Siblings that must be present when composed
    fn required_controllers(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Read and subscribe to a controller's state.
pub trait Stateful {
    type State: StateShape;

    fn state(&self) -> Arc<Self::State>;
    fn subscribe_fn(
        &self,
        listener: Listener<Self::State>,
        watched: &[&str],
    ) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

/// Reconfigure a controller.
pub trait Configurable {
    type Config: ConfigShape;

    fn config(&self) -> Self::Config;
    fn configure(
        &self,
        patch: <Self::Config as ConfigShape>::Patch,
        overwrite: bool,
        full_update: bool,
    );
}

impl<T: Controller> Stateful for T {
    type State = T::State;

    fn state(&self) -> Arc<Self::State> {
        self.base().state()
    }

    fn subscribe_fn(&self, listener: Listener<Self::State>, watched: &[&str]) -> ListenerId {
        self.base().subscribe(move |state| listener(state), watched)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.base().unsubscribe(id)
    }
}

impl<T: Controller> Configurable for T {
    type Config = T::Config;

    fn config(&self) -> Self::Config {
        self.base().config()
    }

    fn configure(
        &self,
        patch: <Self::Config as ConfigShape>::Patch,
        overwrite: bool,
        full_update: bool,
    ) {
        self.base().configure(patch, overwrite, full_update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default, Serialize)]
    struct Counter {
        count: u32,
        label: String,
    }

    #[derive(Default, Deserialize)]
    #[serde(default)]
    struct CounterPatch {
        count: Option<u32>,
        label: Option<String>,
    }

    impl StateShape for Counter {
        type Patch = CounterPatch;

        fn apply(&mut self, patch: CounterPatch) -> Vec<&'static str> {
            let mut changed = Vec::new();
            if let Some(count) = patch.count {
                self.count = count;
                changed.push("count");
            }
            if let Some(label) = patch.label {
                self.label = label;
                changed.push("label");
            }
            changed
        }
    }

    #[derive(Clone, Default)]
    struct Switch {
        disabled: bool,
        limit: Option<u32>,
    }

    #[derive(Default)]
    struct SwitchPatch {
        disabled: Option<bool>,
        limit: Option<u32>,
    }

    impl ConfigShape for Switch {
        type Patch = SwitchPatch;

        fn apply(&mut self, patch: SwitchPatch, existing_only: bool) {
            if let Some(disabled) = patch.disabled {
                self.disabled = disabled;
            }
            if let Some(limit) = patch.limit {
                if !existing_only || self.limit.is_some() {
                    self.limit = Some(limit);
                }
            }
        }

        fn disabled(&self) -> bool {
            self.disabled
        }
    }

    fn counter() -> BaseController<Switch, Counter> {
        BaseController::new("Counter", SwitchPatch::default(), CounterPatch::default())
    }

    fn count_patch(count: u32) -> CounterPatch {
        CounterPatch {
            count: Some(count),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_merges_and_overwrites() {
        let controller = counter();
        controller
            .update(
                CounterPatch {
                    count: Some(1),
                    label: Some("a".into()),
                },
                false,
            )
            .unwrap();
        controller.update(count_patch(2), false).unwrap();
        assert_eq!(controller.state().count, 2);
        assert_eq!(controller.state().label, "a");

        controller.update(count_patch(3), true).unwrap();
        assert_eq!(controller.state().count, 3);
        assert_eq!(controller.state().label, "");
    }

    #[test]
    fn test_watched_keys_filter_notifications() {
        let controller = counter();
        let all = Arc::new(AtomicUsize::new(0));
        let labels = Arc::new(AtomicUsize::new(0));

        let all_hits = all.clone();
        controller.subscribe(
            move |_| {
                all_hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &[],
        );
        let label_hits = labels.clone();
        controller.subscribe(
            move |_| {
                label_hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &["label"],
        );

        controller.update(count_patch(1), false).unwrap();
        controller
            .update(
                CounterPatch {
                    label: Some("b".into()),
                    ..Default::default()
                },
                false,
            )
            .unwrap();

        assert_eq!(all.load(Ordering::SeqCst), 2);
        assert_eq!(labels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_reports_presence() {
        let controller = counter();
        let id = controller.subscribe(|_| Ok(()), &[]);
        assert!(controller.unsubscribe(id));
        assert!(!controller.unsubscribe(id));
    }

    #[test]
    fn test_failing_listener_aborts_pass() {
        let controller = counter();
        let later = Arc::new(AtomicUsize::new(0));

        controller.subscribe(|_| Err(KeyringError::InternalError("boom".into())), &[]);
        let later_hits = later.clone();
        controller.subscribe(
            move |_| {
                later_hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &[],
        );

        let result = controller.update(count_patch(7), false);
        assert!(matches!(result, Err(KeyringError::ListenerFailed { .. })));
        // The state change itself is kept
        assert_eq!(controller.state().count, 7);
        assert_eq!(later.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disabled_controller_mutates_silently() {
        let controller = counter();
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();
        controller.subscribe(
            move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            &[],
        );

        controller.configure(
            SwitchPatch {
                disabled: Some(true),
                ..Default::default()
            },
            false,
            true,
        );
        controller.update(count_patch(4), false).unwrap();

        assert_eq!(controller.state().count, 4);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_partial_configure_skips_unset_fields() {
        let controller = counter();
        controller.configure(
            SwitchPatch {
                limit: Some(5),
                ..Default::default()
            },
            false,
            false,
        );
        assert_eq!(controller.config().limit, None);

        controller.configure(
            SwitchPatch {
                limit: Some(5),
                ..Default::default()
            },
            false,
            true,
        );
        assert_eq!(controller.config().limit, Some(5));
    }

    #[test]
    fn test_rehydrate_from_json() {
        let controller = counter();
        controller
            .rehydrate(&serde_json::json!({ "count": 9 }))
            .unwrap();
        assert_eq!(controller.state().count, 9);
    }
}
