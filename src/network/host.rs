// Seams between the watcher and whatever delivers connectivity broadcasts.

use std::fmt;
use std::sync::Arc;

use crate::error::CanaryResult;
use crate::network::types::{DataState, DhcpInfo, EventFilter, Notification, WifiConnectionInfo};

/// Identity of a host execution context. Notifications are stamped with the
/// context they were delivered through.
pub type ContextId = u64;

/// Opaque token for a live subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something that wants host broadcasts delivered to it
pub trait Receiver: Send + Sync {
    /// Called by the host, possibly from its own thread. Either argument may
    /// be absent when the host hands over a malformed broadcast.
    fn on_notification(&self, context: Option<ContextId>, notification: Option<&Notification>);
}

/// The host's pub/sub mechanism for connectivity broadcasts
pub trait NotificationService: Send + Sync {
    fn subscribe(
        &self,
        filter: EventFilter,
        receiver: Arc<dyn Receiver>,
    ) -> CanaryResult<SubscriptionHandle>;

    /// Fails with `CanaryError::NotRegistered` for unknown handles
    fn unsubscribe(&self, handle: SubscriptionHandle) -> CanaryResult<()>;
}

/// A host execution context a watcher can be bound to
pub trait HostContext: Send + Sync {
    fn id(&self) -> ContextId;

    /// The broadcast service this context exposes, if any
    fn notification_service(&self) -> Option<Arc<dyn NotificationService>>;

    fn wifi_connection_info(&self) -> Option<WifiConnectionInfo> {
        None
    }

    fn dhcp_info(&self) -> Option<DhcpInfo> {
        None
    }

    fn mobile_data_state(&self) -> Option<DataState> {
        None
    }
}
