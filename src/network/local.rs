use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::{CanaryError, CanaryResult};
use crate::network::host::{
    ContextId, HostContext, NotificationService, Receiver, SubscriptionHandle,
};
use crate::network::types::*;

struct Subscription {
    filter: EventFilter,
    receiver: Arc<dyn Receiver>,
}

/// In-process broadcaster: receivers subscribe with a filter and `send`
/// delivers synchronously on the caller's thread.
pub struct LocalBroadcaster {
    next_handle: AtomicU64,
    subscriptions: Mutex<BTreeMap<SubscriptionHandle, Subscription>>,
}

impl Default for LocalBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            subscriptions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Deliver a broadcast to every subscriber whose filter matches.
    /// Returns how many receivers it reached.
    pub fn send(&self, context: ContextId, notification: &Notification) -> usize {
        let targets: Vec<Arc<dyn Receiver>> = self
            .subscriptions
            .lock()
            .values()
            .filter(|s| s.filter.matches(notification))
            .map(|s| s.receiver.clone())
            .collect();

        trace!(
            "Broadcasting {:?} to {} receiver(s)",
            notification.action,
            targets.len()
        );
        for receiver in &targets {
            receiver.on_notification(Some(context), Some(notification));
        }
        targets.len()
    }

    /// Hand a possibly-malformed broadcast to every subscriber, bypassing filters
    pub fn send_raw(&self, context: Option<ContextId>, notification: Option<&Notification>) -> usize {
        let targets: Vec<Arc<dyn Receiver>> = self
            .subscriptions
            .lock()
            .values()
            .map(|s| s.receiver.clone())
            .collect();

        for receiver in &targets {
            receiver.on_notification(context, notification);
        }
        targets.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl NotificationService for LocalBroadcaster {
    fn subscribe(
        &self,
        filter: EventFilter,
        receiver: Arc<dyn Receiver>,
    ) -> CanaryResult<SubscriptionHandle> {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        debug!("Subscribed {} to {} action(s)", handle, filter.len());
        self.subscriptions
            .lock()
            .insert(handle, Subscription { filter, receiver });
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> CanaryResult<()> {
        match self.subscriptions.lock().remove(&handle) {
            Some(_) => Ok(()),
            None => Err(CanaryError::NotRegistered(handle)),
        }
    }
}

/// A host context backed by a `LocalBroadcaster`, with settable connection
/// snapshots
pub struct LocalContext {
    id: ContextId,
    broadcaster: Option<Arc<LocalBroadcaster>>,
    wifi_info: RwLock<Option<WifiConnectionInfo>>,
    dhcp: RwLock<Option<DhcpInfo>>,
    data_state: RwLock<Option<DataState>>,
}

impl LocalContext {
    pub fn new(id: ContextId, broadcaster: Arc<LocalBroadcaster>) -> Self {
        Self {
            id,
            broadcaster: Some(broadcaster),
            wifi_info: RwLock::new(None),
            dhcp: RwLock::new(None),
            data_state: RwLock::new(None),
        }
    }

    /// A context that offers no broadcast service at all
    pub fn detached(id: ContextId) -> Self {
        Self {
            id,
            broadcaster: None,
            wifi_info: RwLock::new(None),
            dhcp: RwLock::new(None),
            data_state: RwLock::new(None),
        }
    }

    pub fn set_wifi_connection_info(&self, info: Option<WifiConnectionInfo>) {
        *self.wifi_info.write() = info;
    }

    pub fn set_dhcp_info(&self, info: Option<DhcpInfo>) {
        *self.dhcp.write() = info;
    }

    pub fn set_mobile_data_state(&self, state: Option<DataState>) {
        *self.data_state.write() = state;
    }
}

impl HostContext for LocalContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn notification_service(&self) -> Option<Arc<dyn NotificationService>> {
        self.broadcaster
            .clone()
            .map(|b| b as Arc<dyn NotificationService>)
    }

    fn wifi_connection_info(&self) -> Option<WifiConnectionInfo> {
        self.wifi_info.read().clone()
    }

    fn dhcp_info(&self) -> Option<DhcpInfo> {
        *self.dhcp.read()
    }

    fn mobile_data_state(&self) -> Option<DataState> {
        *self.data_state.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter(AtomicU64);

    impl Receiver for Counter {
        fn on_notification(&self, _: Option<ContextId>, _: Option<&Notification>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn send_respects_filters() {
        let broadcaster = LocalBroadcaster::new();
        let counter = Arc::new(Counter::default());
        broadcaster
            .subscribe(EventFilter::for_features(FeatureSet::MOBILE), counter.clone())
            .unwrap();

        let wifi = Notification::wifi_state_changed(StateCode::Enabled, StateCode::Disabled);
        assert_eq!(broadcaster.send(1, &wifi), 0);
        assert_eq!(broadcaster.send(1, &Notification::new(CONNECTIVITY_ACTION)), 1);
        assert_eq!(counter.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unsubscribe_unknown_handle_fails() {
        let broadcaster = LocalBroadcaster::new();
        let err = broadcaster.unsubscribe(SubscriptionHandle(99)).unwrap_err();
        assert!(matches!(err, CanaryError::NotRegistered(SubscriptionHandle(99))));
    }

    #[test]
    fn handles_are_unique() {
        let broadcaster = LocalBroadcaster::new();
        let a = broadcaster
            .subscribe(EventFilter::new(), Arc::new(Counter::default()))
            .unwrap();
        let b = broadcaster
            .subscribe(EventFilter::new(), Arc::new(Counter::default()))
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(broadcaster.subscription_count(), 2);
    }

    #[test]
    fn detached_context_has_no_service() {
        assert!(LocalContext::detached(3).notification_service().is_none());
    }
}
