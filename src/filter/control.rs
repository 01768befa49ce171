//! The filter control: lifecycle, bus wiring, and reconciliation
//!
//! `RulesFilter` owns one [`FilterState`] and is its only mutation point.
//! Three triggers drive it: user interaction (widget callback, broadcast on
//! real change), peer broadcasts (applied without re-publishing), and
//! registry-changed notifications (reload, prune, no publish). The control
//! subscribes to the same topic it publishes on; its own broadcasts come
//! back synchronously and are absorbed by the suppressor.

use super::seed::seed_from_query;
use super::state::{FilterState, LoadPhase};
use super::widget::SelectionView;
use crate::bus::{Bus, SubscriptionHandle, Topic};
use crate::registry::{RegistryError, RegistryFetcher, RegistryLoader, RuleRef};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

/// Default deadline for one registry fetch
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification event published when a rule is created
pub const EVENT_RULES_NEW: &str = "rules.new";
/// Notification event published when a rule is edited
pub const EVENT_RULES_EDIT: &str = "rules.edit";

/// Wire payload for the `connections_filters` topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRulesPayload {
    pub matched_rules: Vec<String>,
}

/// Wire payload for the `notifications` topic (extra fields ignored)
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPayload {
    pub event: String,
}

type ViewListener = Arc<dyn Fn(&SelectionView) + Send + Sync>;

struct Inner {
    bus: Bus,
    loader: RegistryLoader,
    state: Mutex<FilterState>,
    /// Seed ids from query state; taken by the first successful load
    seed: Mutex<Option<Vec<String>>>,
    listeners: Mutex<Vec<ViewListener>>,
    torn_down: AtomicBool,
    /// Captured at mount: bus handlers run synchronously on the publisher's
    /// thread, outside any async context, so reloads they trigger must be
    /// spawned through this handle.
    runtime: Handle,
}

/// A mounted filter control
///
/// Dropping the control tears it down; [`RulesFilter::teardown`] may also be
/// called explicitly and is idempotent.
pub struct RulesFilter {
    inner: Arc<Inner>,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

impl RulesFilter {
    /// Mount a filter control with the default load timeout
    ///
    /// Captures the seed from `query`, subscribes to both bus topics, and
    /// performs the initial registry load before returning. A failed initial
    /// load leaves the control mounted with empty rules and the error in
    /// [`RulesFilter::last_error`].
    pub async fn mount(bus: Bus, fetcher: Arc<dyn RegistryFetcher>, query: &str) -> Self {
        Self::mount_with_timeout(bus, fetcher, query, DEFAULT_LOAD_TIMEOUT).await
    }

    pub async fn mount_with_timeout(
        bus: Bus,
        fetcher: Arc<dyn RegistryFetcher>,
        query: &str,
        load_timeout: Duration,
    ) -> Self {
        let seed = seed_from_query(query);
        debug!(seed_ids = seed.len(), "Mounting rules filter");

        let inner = Arc::new(Inner {
            bus: bus.clone(),
            loader: RegistryLoader::new(fetcher, load_timeout),
            state: Mutex::new(FilterState::new()),
            seed: Mutex::new(Some(seed)),
            listeners: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
            runtime: Handle::current(),
        });

        let filters_handle = {
            let inner = inner.clone();
            bus.subscribe(Topic::ConnectionsFilters, move |payload| {
                inner.on_connections_filters(payload);
            })
        };
        let notifications_handle = {
            let inner = inner.clone();
            bus.subscribe(Topic::Notifications, move |payload| {
                inner.clone().on_notification(payload);
            })
        };

        let control = Self {
            inner,
            subscriptions: Mutex::new(vec![filters_handle, notifications_handle]),
        };
        control.inner.clone().run_load().await;
        control
    }

    /// User-driven selection change: the widget's full new selection
    ///
    /// Broadcasts `{matched_rules: [ids]}` to `connections_filters` when, and
    /// only when, the id set actually changed.
    pub fn set_selection(&self, next: Vec<RuleRef>) {
        if self.inner.torn_down.load(Ordering::Acquire) {
            return;
        }

        // Apply under the lock, publish after releasing it: our own broadcast
        // is delivered back synchronously to this control's handler.
        let applied = {
            let mut state = self.inner.state.lock();
            if !state.apply_active(next) {
                return;
            }
            let ids: Vec<String> = state.active().iter().map(|r| r.id.clone()).collect();
            (ids, SelectionView::from_state(&state))
        };

        let (ids, view) = applied;
        debug!(active = ids.len(), "Selection changed, broadcasting");
        self.inner.notify_listeners(&view);
        self.inner
            .bus
            .publish(Topic::ConnectionsFilters, json!({ "matched_rules": ids }));
    }

    /// Currently selected rules, in insertion order
    pub fn selection(&self) -> Vec<RuleRef> {
        self.inner.state.lock().active().to_vec()
    }

    /// Enabled rules as of the last applied load
    pub fn rules(&self) -> Vec<RuleRef> {
        self.inner.state.lock().rules().to_vec()
    }

    /// Selectable remainder (rules minus selection)
    pub fn suggestions(&self) -> Vec<RuleRef> {
        self.inner.state.lock().suggestions()
    }

    /// Snapshot for the selection widget
    pub fn view(&self) -> SelectionView {
        SelectionView::from_state(&self.inner.state.lock())
    }

    pub fn phase(&self) -> LoadPhase {
        self.inner.state.lock().phase()
    }

    /// Last registry failure, cleared by the next successful load
    pub fn last_error(&self) -> Option<RegistryError> {
        self.inner.state.lock().last_error().cloned()
    }

    /// Register a listener invoked after every applied state change
    ///
    /// Suppressed (no-op) updates invoke nothing.
    pub fn subscribe_changes<F>(&self, listener: F)
    where
        F: Fn(&SelectionView) + Send + Sync + 'static,
    {
        self.inner.listeners.lock().push(Arc::new(listener));
    }

    /// Reload the registry now, applying the usual reconciliation
    pub async fn reload(&self) {
        self.inner.clone().run_load().await;
    }

    pub fn is_mounted(&self) -> bool {
        !self.inner.torn_down.load(Ordering::Acquire)
    }

    /// Remove both bus subscriptions and stop all further effects
    ///
    /// Idempotent. In-flight loads observe the torn-down flag and are
    /// discarded without mutating state or publishing.
    pub fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = std::mem::take(&mut *self.subscriptions.lock());
        for handle in &handles {
            self.inner.bus.unsubscribe(handle);
        }
        debug!(released = handles.len(), "Rules filter torn down");
    }
}

impl Drop for RulesFilter {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Inner {
    /// Peer broadcast on `connections_filters`: apply, never re-publish
    fn on_connections_filters(&self, payload: &Value) {
        if self.torn_down.load(Ordering::Acquire) {
            return;
        }

        let parsed: MatchedRulesPayload = match serde_json::from_value(payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                warn!(topic = %Topic::ConnectionsFilters, %err, "Ignoring malformed payload");
                return;
            }
        };

        let applied = {
            let mut state = self.state.lock();
            // Resolve ids against locally known rules; unknown ids are an
            // expected race with registry refresh and are dropped, never
            // fabricated into placeholder entries.
            let next: Vec<RuleRef> = state
                .rules()
                .iter()
                .filter(|r| parsed.matched_rules.iter().any(|id| *id == r.id))
                .cloned()
                .collect();
            if next.len() < parsed.matched_rules.len() {
                trace!(
                    dropped = parsed.matched_rules.len() - next.len(),
                    "Dropped unknown rule ids from peer broadcast"
                );
            }
            state
                .apply_active(next)
                .then(|| SelectionView::from_state(&state))
        };

        if let Some(view) = applied {
            debug!(active = view.tags.len(), "Applied peer selection");
            self.notify_listeners(&view);
        }
    }

    /// Backend notification: reload on rule registry changes
    fn on_notification(self: Arc<Self>, payload: &Value) {
        if self.torn_down.load(Ordering::Acquire) {
            return;
        }

        let parsed: NotificationPayload = match serde_json::from_value(payload.clone()) {
            Ok(p) => p,
            Err(err) => {
                warn!(topic = %Topic::Notifications, %err, "Ignoring malformed payload");
                return;
            }
        };

        match parsed.event.as_str() {
            EVENT_RULES_NEW | EVENT_RULES_EDIT => {
                debug!(event = %parsed.event, "Registry changed, scheduling reload");
                let inner = self.clone();
                self.runtime.spawn(async move {
                    inner.run_load().await;
                });
            }
            other => trace!(event = other, "Ignoring notification event"),
        }
    }

    /// One full load cycle: fetch, then reconcile if still current
    async fn run_load(self: Arc<Self>) {
        if self.torn_down.load(Ordering::Acquire) {
            return;
        }
        self.state.lock().phase = LoadPhase::Loading;

        let (generation, result) = self.loader.load().await;

        let applied = {
            let mut state = self.state.lock();
            if self.torn_down.load(Ordering::Acquire) {
                return;
            }
            if !self.loader.is_current(generation) {
                debug!(generation, "Discarding stale registry load");
                return;
            }

            match result {
                Ok(rules) => {
                    // First successful load reconciles the query seed; later
                    // loads prune selections the registry no longer carries.
                    let next_active: Vec<RuleRef> = match self.seed.lock().take() {
                        Some(seed) => rules
                            .iter()
                            .filter(|r| seed.iter().any(|id| *id == r.id))
                            .cloned()
                            .collect(),
                        None => state
                            .active()
                            .iter()
                            .filter(|a| rules.iter().any(|r| r.id == a.id))
                            .cloned()
                            .collect(),
                    };

                    let rules_changed = state.rules != rules;
                    state.rules = rules;
                    let active_changed = state.apply_active(next_active);
                    state.phase = LoadPhase::Loaded;
                    state.last_error = None;

                    info!(
                        generation,
                        rules = state.rules().len(),
                        active = state.active().len(),
                        "Rule registry loaded"
                    );

                    (rules_changed || active_changed).then(|| SelectionView::from_state(&state))
                }
                Err(err) => {
                    warn!(generation, %err, "Registry load failed, keeping previous state");
                    state.phase = LoadPhase::Idle;
                    state.last_error = Some(err);
                    None
                }
            }
        };

        if let Some(view) = applied {
            self.notify_listeners(&view);
        }
    }

    fn notify_listeners(&self, view: &SelectionView) {
        // Snapshot so listeners may add listeners
        let listeners: Vec<ViewListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener(view);
        }
    }
}
