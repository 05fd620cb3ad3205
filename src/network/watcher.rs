use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::CanaryError;
use crate::network::host::{
    ContextId, HostContext, NotificationService, Receiver, SubscriptionHandle,
};
use crate::network::types::*;

/// Anything that wants to hear about radio state transitions.
///
/// Listeners run on whichever thread the host delivers on, against a snapshot
/// of the registry taken when the broadcast arrived.
pub trait StateListener: Send + Sync {
    fn on_state_changed(&self, event: &StateChangeEvent);
}

impl<F> StateListener for F
where
    F: Fn(&StateChangeEvent) + Send + Sync,
{
    fn on_state_changed(&self, event: &StateChangeEvent) {
        self(event)
    }
}

/// Extension point for turning a connectivity broadcast into a mobile data
/// transition. The watcher ships without one and drops those broadcasts.
pub trait MobileDataDecoder: Send + Sync {
    fn decode(&self, notification: &Notification) -> Option<(StateCode, StateCode)>;
}

// ── Listener registry ─────────────────────────────────────────────────

#[derive(Default)]
struct ListenerRegistry {
    wifi: Vec<Arc<dyn StateListener>>,
    mobile: Vec<Arc<dyn StateListener>>,
}

fn same_listener(a: &Arc<dyn StateListener>, b: &Arc<dyn StateListener>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

impl ListenerRegistry {
    fn list(&self, kind: StateKind) -> &Vec<Arc<dyn StateListener>> {
        match kind {
            StateKind::Wifi => &self.wifi,
            StateKind::Mobile => &self.mobile,
        }
    }

    fn list_mut(&mut self, kind: StateKind) -> &mut Vec<Arc<dyn StateListener>> {
        match kind {
            StateKind::Wifi => &mut self.wifi,
            StateKind::Mobile => &mut self.mobile,
        }
    }

    /// Returns false if the listener was already present
    fn add(&mut self, kind: StateKind, listener: Arc<dyn StateListener>) -> bool {
        let list = self.list_mut(kind);
        if list.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        list.push(listener);
        true
    }

    /// Returns false if the listener was not present
    fn remove(&mut self, kind: StateKind, listener: &Arc<dyn StateListener>) -> bool {
        let list = self.list_mut(kind);
        match list.iter().position(|l| same_listener(l, listener)) {
            Some(index) => {
                list.remove(index);
                true
            }
            None => false,
        }
    }

    fn clear(&mut self) {
        self.wifi.clear();
        self.mobile.clear();
    }
}

// ── Dispatcher (the host-facing receiver) ─────────────────────────────

/// Shared half of the watcher that the host calls into
#[derive(Default)]
struct Dispatcher {
    context: RwLock<Option<ContextId>>,
    listeners: Mutex<ListenerRegistry>,
    mobile_decoder: RwLock<Option<Arc<dyn MobileDataDecoder>>>,
}

impl Dispatcher {
    fn on_wifi_state_changed(&self, notification: &Notification) {
        let current = decode_extra(notification, EXTRA_WIFI_STATE);
        let previous = decode_extra(notification, EXTRA_PREVIOUS_WIFI_STATE);
        self.fan_out(StateChangeEvent::wifi(current, previous));
    }

    fn on_mobile_data_state_changed(&self, notification: &Notification) {
        let decoder = self.mobile_decoder.read().clone();
        let Some(decoder) = decoder else {
            debug!("No mobile data decoder installed; dropped connectivity signal.");
            return;
        };
        match decoder.decode(notification) {
            Some((current, previous)) => self.fan_out(StateChangeEvent::mobile(current, previous)),
            None => debug!("Mobile data decoder could not read the signal."),
        }
    }

    fn fan_out(&self, event: StateChangeEvent) {
        let targets = self.listeners.lock().list(event.kind).clone();
        debug!("Notifying {} listener(s): {}", targets.len(), event);
        for listener in &targets {
            listener.on_state_changed(&event);
        }
    }
}

fn decode_extra(notification: &Notification, key: &str) -> StateCode {
    notification
        .extra(key)
        .map(StateCode::from_code)
        .unwrap_or(StateCode::Unknown)
}

impl Receiver for Dispatcher {
    fn on_notification(&self, context: Option<ContextId>, notification: Option<&Notification>) {
        let Some(context) = context else {
            debug!("Received signal with null context.");
            return;
        };

        if *self.context.read() != Some(context) {
            debug!("Received signal from external context {}.", context);
            return;
        }

        let Some(notification) = notification else {
            debug!("Received a null notification.");
            return;
        };

        let Some(action) = notification.action.as_deref() else {
            debug!("Received notification with null action.");
            return;
        };

        debug!("Caught action [{}].", action);

        match action {
            WIFI_STATE_CHANGED_ACTION => self.on_wifi_state_changed(notification),
            CONNECTIVITY_ACTION => self.on_mobile_data_state_changed(notification),
            NETWORK_STATE_CHANGED_ACTION => {
                debug!("Association change carries no radio state; ignored.")
            }
            _ => debug!("Ignored unrecognized action."),
        }
    }
}

// ── Watcher ───────────────────────────────────────────────────────────

/// Keeps one host subscription whose filter matches the enabled features,
/// and fans decoded radio transitions out to registered listeners.
pub struct NetworkStateWatcher {
    context: Option<Arc<dyn HostContext>>,
    service: Option<Arc<dyn NotificationService>>,
    subscription: Option<SubscriptionHandle>,
    enabled: FeatureSet,
    dispatcher: Arc<Dispatcher>,
}

impl Default for NetworkStateWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkStateWatcher {
    /// An unbound watcher with nothing enabled
    pub fn new() -> Self {
        Self {
            context: None,
            service: None,
            subscription: None,
            enabled: FeatureSet::NONE,
            dispatcher: Arc::new(Dispatcher::default()),
        }
    }

    /// A watcher bound to the given context (not yet registered)
    pub fn bound(context: Arc<dyn HostContext>) -> Self {
        let mut watcher = Self::new();
        watcher.bind(Some(context));
        watcher
    }

    /// Attach to a host context, dropping any subscription held in the old one.
    /// Binding to `None` leaves the watcher inert.
    pub fn bind(&mut self, context: Option<Arc<dyn HostContext>>) {
        if self.context.is_some() {
            self.unregister();
        }

        match context {
            None => {
                warn!("Null context was set. Cannot register a receiver.");
                self.service = None;
                *self.dispatcher.context.write() = None;
                self.context = None;
            }
            Some(context) => {
                self.service = context.notification_service();
                if self.service.is_none() {
                    warn!(
                        "Context {} provides no notification service. Cannot register a receiver.",
                        context.id()
                    );
                }
                *self.dispatcher.context.write() = Some(context.id());
                self.context = Some(context);
            }
        }
    }

    /// Subscribe with a filter computed from the enabled features. Any
    /// existing subscription is replaced, never duplicated.
    pub fn register(&mut self) {
        let Some(service) = self.service.clone() else {
            if self.context.is_some() {
                warn!("Bound context has no notification service; cannot register.");
            } else {
                warn!("Cannot register the receiver without a context.");
            }
            return;
        };

        if let Some(handle) = self.subscription.take() {
            debug!("Already registered as {}; replacing the subscription.", handle);
            release(service.as_ref(), handle);
        }

        let filter = EventFilter::for_features(self.enabled);
        let receiver: Arc<dyn Receiver> = self.dispatcher.clone();
        match service.subscribe(filter, receiver) {
            Ok(handle) => {
                info!("Registered as a receiver ({}) for [{}].", handle, self.enabled);
                self.subscription = Some(handle);
            }
            Err(e) => warn!("Failed to register as a receiver: {}", e),
        }
    }

    /// Cancel the active subscription, if there is one
    pub fn unregister(&mut self) {
        if self.context.is_none() {
            warn!("Null context; nothing to do to unregister.");
            return;
        }

        match (self.subscription.take(), self.service.as_deref()) {
            (Some(handle), Some(service)) => release(service, handle),
            _ => debug!("Tried to unregister, but wasn't registered yet."),
        }
    }

    /// Unregister and forget every listener. The owner should call this when
    /// it is being torn down.
    pub fn stop(&mut self) {
        self.unregister();
        self.dispatcher.listeners.lock().clear();
        info!("Watcher stopped.");
    }

    // ── Features ──────────────────────────────────────────────────────

    /// True iff every feature in `flags` is enabled
    pub fn is_enabled(&self, flags: FeatureSet) -> bool {
        self.enabled.contains(flags)
    }

    pub fn features(&self) -> FeatureSet {
        self.enabled
    }

    /// The filter the next `register` would subscribe with
    pub fn filter(&self) -> EventFilter {
        EventFilter::for_features(self.enabled)
    }

    /// Enable features and re-register with the widened filter
    pub fn enable(&mut self, flags: FeatureSet) {
        self.enabled = self.enabled.union(flags);
        self.resubscribe();
    }

    /// Disable features and re-register with the narrowed filter
    pub fn disable(&mut self, flags: FeatureSet) {
        self.enabled = self.enabled.difference(flags);
        self.resubscribe();
    }

    /// Disable if every given feature is on, otherwise enable them all
    pub fn toggle(&mut self, flags: FeatureSet) {
        if self.is_enabled(flags) {
            self.disable(flags);
        } else {
            self.enable(flags);
        }
    }

    fn resubscribe(&mut self) {
        self.unregister();
        self.register();
    }

    // ── Listeners ─────────────────────────────────────────────────────

    pub fn add_listener(&self, kind: StateKind, listener: Arc<dyn StateListener>) {
        if !self.dispatcher.listeners.lock().add(kind, listener) {
            debug!("Skipped adding a duplicate {} listener.", kind);
        }
    }

    pub fn remove_listener(&self, kind: StateKind, listener: &Arc<dyn StateListener>) {
        if !self.dispatcher.listeners.lock().remove(kind, listener) {
            debug!("Skipped removing a {} listener; not found in list.", kind);
        }
    }

    pub fn add_wifi_listener(&self, listener: Arc<dyn StateListener>) {
        self.add_listener(StateKind::Wifi, listener);
    }

    pub fn remove_wifi_listener(&self, listener: &Arc<dyn StateListener>) {
        self.remove_listener(StateKind::Wifi, listener);
    }

    pub fn listener_count(&self, kind: StateKind) -> usize {
        self.dispatcher.listeners.lock().list(kind).len()
    }

    /// Install (or clear) the mobile data extension point
    pub fn set_mobile_decoder(&self, decoder: Option<Arc<dyn MobileDataDecoder>>) {
        *self.dispatcher.mobile_decoder.write() = decoder;
    }

    // ── Introspection ─────────────────────────────────────────────────

    pub fn is_bound(&self) -> bool {
        self.context.is_some()
    }

    pub fn is_registered(&self) -> bool {
        self.subscription.is_some()
    }

    /// Deliver a broadcast exactly as the host would
    pub fn on_notification(&self, context: Option<ContextId>, notification: Option<&Notification>) {
        self.dispatcher.on_notification(context, notification);
    }
}

impl Drop for NetworkStateWatcher {
    fn drop(&mut self) {
        if let (Some(handle), Some(service)) = (self.subscription.take(), self.service.as_deref()) {
            release(service, handle);
        }
    }
}

fn release(service: &dyn NotificationService, handle: SubscriptionHandle) {
    match service.unsubscribe(handle) {
        Ok(()) => info!("Unregistered receiver {}.", handle),
        Err(CanaryError::NotRegistered(_)) => {
            debug!("Tried to unregister {}, but wasn't registered.", handle)
        }
        Err(e) => warn!("Failed to unregister {}: {}", handle, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::local::{LocalBroadcaster, LocalContext};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<StateChangeEvent>>,
    }

    impl StateListener for Recorder {
        fn on_state_changed(&self, event: &StateChangeEvent) {
            self.events.lock().push(*event);
        }
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.events.lock().len()
        }
    }

    fn setup() -> (Arc<LocalBroadcaster>, Arc<LocalContext>, NetworkStateWatcher) {
        let broadcaster = Arc::new(LocalBroadcaster::new());
        let context = Arc::new(LocalContext::new(7, broadcaster.clone()));
        let watcher = NetworkStateWatcher::bound(context.clone());
        (broadcaster, context, watcher)
    }

    fn wifi_event() -> Notification {
        Notification::wifi_state_changed(StateCode::Enabled, StateCode::Enabling)
    }

    #[test]
    fn enable_disable_is_net_bitwise_effect() {
        let mut watcher = NetworkStateWatcher::new();
        watcher.enable(FeatureSet::WIFI);
        watcher.enable(FeatureSet::MOBILE);
        watcher.disable(FeatureSet::WIFI);
        watcher.enable(FeatureSet::WIFI);
        watcher.disable(FeatureSet::MOBILE);
        watcher.disable(FeatureSet::MOBILE);
        assert_eq!(watcher.features(), FeatureSet::WIFI);
        assert!(watcher.is_enabled(FeatureSet::WIFI));
        assert!(!watcher.is_enabled(FeatureSet::ALL));
    }

    #[test]
    fn unknown_bits_are_ignored() {
        let mut watcher = NetworkStateWatcher::new();
        watcher.enable(FeatureSet::from_bits_truncate(0b1101));
        assert_eq!(watcher.features(), FeatureSet::WIFI);
    }

    #[test]
    fn toggle_round_trips() {
        let (_, _, mut watcher) = setup();
        let initial = watcher.features();
        watcher.toggle(FeatureSet::WIFI);
        assert!(watcher.is_enabled(FeatureSet::WIFI));
        watcher.toggle(FeatureSet::WIFI);
        assert!(!watcher.is_enabled(FeatureSet::WIFI));
        assert_eq!(watcher.features(), initial);
    }

    #[test]
    fn toggle_enables_all_when_partially_enabled() {
        let mut watcher = NetworkStateWatcher::new();
        watcher.enable(FeatureSet::WIFI);
        watcher.toggle(FeatureSet::ALL);
        assert_eq!(watcher.features(), FeatureSet::ALL);
    }

    #[test]
    fn duplicate_listener_notified_once() {
        let (broadcaster, context, mut watcher) = setup();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn StateListener> = recorder.clone();
        watcher.add_wifi_listener(listener.clone());
        watcher.add_wifi_listener(listener);
        assert_eq!(watcher.listener_count(StateKind::Wifi), 1);

        watcher.enable(FeatureSet::WIFI);
        broadcaster.send(context.id(), &wifi_event());
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn removing_absent_listener_is_harmless() {
        let (_, _, watcher) = setup();
        let present: Arc<dyn StateListener> = Arc::new(Recorder::default());
        let absent: Arc<dyn StateListener> = Arc::new(Recorder::default());
        watcher.add_wifi_listener(present);
        watcher.remove_wifi_listener(&absent);
        assert_eq!(watcher.listener_count(StateKind::Wifi), 1);
    }

    #[test]
    fn double_register_delivers_once() {
        let (broadcaster, context, mut watcher) = setup();
        let recorder = Arc::new(Recorder::default());
        watcher.add_wifi_listener(recorder.clone());
        watcher.enable(FeatureSet::WIFI);
        watcher.register();
        watcher.register();
        assert_eq!(broadcaster.subscription_count(), 1);

        broadcaster.send(context.id(), &wifi_event());
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn double_unregister_is_benign() {
        let (broadcaster, _, mut watcher) = setup();
        watcher.enable(FeatureSet::WIFI);
        watcher.unregister();
        watcher.unregister();
        assert!(!watcher.is_registered());
        assert_eq!(broadcaster.subscription_count(), 0);
    }

    #[test]
    fn stop_silences_listeners() {
        let (broadcaster, context, mut watcher) = setup();
        let recorder = Arc::new(Recorder::default());
        watcher.add_wifi_listener(recorder.clone());
        watcher.enable(FeatureSet::WIFI);
        watcher.stop();

        assert_eq!(broadcaster.send(context.id(), &wifi_event()), 0);
        watcher.on_notification(Some(context.id()), Some(&wifi_event()));
        assert_eq!(recorder.count(), 0);
        assert_eq!(watcher.listener_count(StateKind::Wifi), 0);
    }

    #[test]
    fn listeners_can_be_rebuilt_after_stop() {
        let (broadcaster, context, mut watcher) = setup();
        watcher.enable(FeatureSet::WIFI);
        watcher.stop();

        let recorder = Arc::new(Recorder::default());
        watcher.add_wifi_listener(recorder.clone());
        watcher.register();
        broadcaster.send(context.id(), &wifi_event());
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn listeners_notified_in_registration_order() {
        let (broadcaster, context, mut watcher) = setup();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let order = order.clone();
            watcher.add_wifi_listener(Arc::new(move |_: &StateChangeEvent| order.lock().push(tag)));
        }
        watcher.enable(FeatureSet::WIFI);
        broadcaster.send(context.id(), &wifi_event());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn malformed_notifications_are_dropped() {
        let (_, context, mut watcher) = setup();
        let recorder = Arc::new(Recorder::default());
        watcher.add_wifi_listener(recorder.clone());
        watcher.enable(FeatureSet::WIFI);

        watcher.on_notification(None, Some(&wifi_event()));
        watcher.on_notification(Some(context.id()), None);
        watcher.on_notification(Some(context.id()), Some(&Notification::default()));
        watcher.on_notification(Some(context.id()), Some(&Notification::new("bogus")));
        watcher.on_notification(
            Some(context.id()),
            Some(&Notification::new(NETWORK_STATE_CHANGED_ACTION)),
        );
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn missing_extras_decode_as_unknown() {
        let (_, context, watcher) = setup();
        let recorder = Arc::new(Recorder::default());
        watcher.add_wifi_listener(recorder.clone());
        watcher.on_notification(
            Some(context.id()),
            Some(&Notification::new(WIFI_STATE_CHANGED_ACTION).with_extra(EXTRA_WIFI_STATE, 3)),
        );
        assert_eq!(
            recorder.events.lock()[0],
            StateChangeEvent::wifi(StateCode::Enabled, StateCode::Unknown)
        );
    }

    #[test]
    fn connectivity_dropped_without_decoder() {
        let (broadcaster, context, mut watcher) = setup();
        let recorder = Arc::new(Recorder::default());
        watcher.add_listener(StateKind::Mobile, recorder.clone());
        watcher.enable(FeatureSet::MOBILE);

        assert_eq!(broadcaster.send(context.id(), &Notification::new(CONNECTIVITY_ACTION)), 1);
        assert_eq!(recorder.count(), 0);
    }

    struct FixedDecoder;

    impl MobileDataDecoder for FixedDecoder {
        fn decode(&self, _: &Notification) -> Option<(StateCode, StateCode)> {
            Some((StateCode::Enabled, StateCode::Disabled))
        }
    }

    #[test]
    fn connectivity_passes_through_installed_decoder() {
        let (broadcaster, context, mut watcher) = setup();
        let recorder = Arc::new(Recorder::default());
        watcher.add_listener(StateKind::Mobile, recorder.clone());
        watcher.set_mobile_decoder(Some(Arc::new(FixedDecoder)));
        watcher.enable(FeatureSet::MOBILE);

        broadcaster.send(context.id(), &Notification::new(CONNECTIVITY_ACTION));
        assert_eq!(
            recorder.events.lock().as_slice(),
            &[StateChangeEvent::mobile(StateCode::Enabled, StateCode::Disabled)]
        );
    }

    #[test]
    fn disable_narrows_live_filter() {
        let (broadcaster, context, mut watcher) = setup();
        let recorder = Arc::new(Recorder::default());
        watcher.add_wifi_listener(recorder.clone());
        watcher.enable(FeatureSet::WIFI);
        watcher.disable(FeatureSet::WIFI);

        assert!(watcher.is_registered());
        assert_eq!(broadcaster.send(context.id(), &wifi_event()), 0);
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn rebinding_releases_old_subscription() {
        let (broadcaster, _, mut watcher) = setup();
        watcher.enable(FeatureSet::WIFI);
        assert_eq!(broadcaster.subscription_count(), 1);

        let other: Arc<dyn HostContext> = Arc::new(LocalContext::new(8, broadcaster.clone()));
        watcher.bind(Some(other));
        assert!(!watcher.is_registered());
        assert_eq!(broadcaster.subscription_count(), 0);
    }

    #[test]
    fn drop_releases_subscription() {
        let (broadcaster, _, mut watcher) = setup();
        watcher.enable(FeatureSet::WIFI);
        drop(watcher);
        assert_eq!(broadcaster.subscription_count(), 0);
    }

    #[test]
    fn one_shot_listener_removes_itself() {
        let (broadcaster, context, mut watcher) = setup();
        watcher.enable(FeatureSet::WIFI);
        let watcher = Arc::new(Mutex::new(watcher));

        let hits = Arc::new(Mutex::new(0));
        let slot: Arc<Mutex<Option<Arc<dyn StateListener>>>> = Arc::new(Mutex::new(None));
        let one_shot: Arc<dyn StateListener> = {
            let (watcher, hits, slot) = (watcher.clone(), hits.clone(), slot.clone());
            Arc::new(move |_: &StateChangeEvent| {
                *hits.lock() += 1;
                if let Some(me) = slot.lock().take() {
                    watcher.lock().remove_wifi_listener(&me);
                }
            })
        };
        *slot.lock() = Some(one_shot.clone());
        watcher.lock().add_wifi_listener(one_shot);

        broadcaster.send(context.id(), &wifi_event());
        broadcaster.send(context.id(), &wifi_event());
        assert_eq!(*hits.lock(), 1);
        assert_eq!(watcher.lock().listener_count(StateKind::Wifi), 0);
    }

    #[test]
    fn listener_added_during_delivery_waits_for_next_event() {
        let (broadcaster, context, mut watcher) = setup();
        watcher.enable(FeatureSet::WIFI);
        let watcher = Arc::new(Mutex::new(watcher));

        let late = Arc::new(Recorder::default());
        let adder: Arc<dyn StateListener> = {
            let (watcher, late) = (watcher.clone(), late.clone());
            Arc::new(move |_: &StateChangeEvent| {
                watcher.lock().add_wifi_listener(late.clone());
            })
        };
        watcher.lock().add_wifi_listener(adder);

        broadcaster.send(context.id(), &wifi_event());
        assert_eq!(late.count(), 0);
        broadcaster.send(context.id(), &wifi_event());
        assert_eq!(late.count(), 1);
    }
}
