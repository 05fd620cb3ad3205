use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::Connection;

use crate::error::{CanaryError, CanaryResult};
use crate::network::dbus_proxies::NetworkManagerProxy;
use crate::network::host::{
    ContextId, HostContext, NotificationService, Receiver, SubscriptionHandle,
};
use crate::network::types::*;
use crate::network::watcher::MobileDataDecoder;

/// Host context backed by NetworkManager on the system D-Bus.
///
/// Radio switches are read from the `WirelessEnabled` and `WwanEnabled`
/// properties and their change signals become canary broadcasts.
pub struct NmHost {
    id: ContextId,
    connection: Connection,
    service: Arc<NmSignalService>,
}

impl NmHost {
    /// Connect to the system D-Bus. Must be called from within a tokio runtime.
    pub async fn connect(id: ContextId) -> CanaryResult<Self> {
        let connection = Connection::system().await?;
        let service = Arc::new(NmSignalService {
            id,
            connection: connection.clone(),
            runtime: Handle::current(),
            next_handle: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        });
        Ok(Self {
            id,
            connection,
            service,
        })
    }

    async fn proxy(&self) -> CanaryResult<NetworkManagerProxy<'static>> {
        Ok(NetworkManagerProxy::new(&self.connection).await?)
    }

    /// Get NM version string
    pub async fn version(&self) -> CanaryResult<String> {
        Ok(self.proxy().await?.version().await?)
    }

    /// Check if the given radio is switched on
    pub async fn radio_enabled(&self, kind: StateKind) -> CanaryResult<bool> {
        let proxy = self.proxy().await?;
        let enabled = match kind {
            StateKind::Wifi => proxy.wireless_enabled().await?,
            StateKind::Mobile => proxy.wwan_enabled().await?,
        };
        Ok(enabled)
    }

    /// Check if the hardware switch allows the given radio on
    pub async fn radio_hardware_enabled(&self, kind: StateKind) -> CanaryResult<bool> {
        let proxy = self.proxy().await?;
        let enabled = match kind {
            StateKind::Wifi => proxy.wireless_hardware_enabled().await?,
            StateKind::Mobile => proxy.wwan_hardware_enabled().await?,
        };
        Ok(enabled)
    }

    /// Switch the given radio on/off
    pub async fn set_radio_enabled(&self, kind: StateKind, enabled: bool) -> CanaryResult<()> {
        let proxy = self.proxy().await?;
        match kind {
            StateKind::Wifi => proxy.set_wireless_enabled(enabled).await?,
            StateKind::Mobile => proxy.set_wwan_enabled(enabled).await?,
        }
        info!("Switched {} radio {}", kind, if enabled { "on" } else { "off" });
        Ok(())
    }

    /// Flip the given radio; returns the new setting
    pub async fn toggle_radio(&self, kind: StateKind) -> CanaryResult<bool> {
        let enabled = !self.radio_enabled(kind).await?;
        self.set_radio_enabled(kind, enabled).await?;
        Ok(enabled)
    }
}

impl HostContext for NmHost {
    fn id(&self) -> ContextId {
        self.id
    }

    fn notification_service(&self) -> Option<Arc<dyn NotificationService>> {
        let service: Arc<dyn NotificationService> = self.service.clone();
        Some(service)
    }
}

/// Follows NM property change streams, one task per subscription
pub struct NmSignalService {
    id: ContextId,
    connection: Connection,
    runtime: Handle,
    next_handle: AtomicU64,
    tasks: Mutex<HashMap<SubscriptionHandle, JoinHandle<()>>>,
}

impl NotificationService for NmSignalService {
    fn subscribe(
        &self,
        filter: EventFilter,
        receiver: Arc<dyn Receiver>,
    ) -> CanaryResult<SubscriptionHandle> {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let follow = RadioFollow {
            wifi: filter.has_action(WIFI_STATE_CHANGED_ACTION),
            wwan: filter.has_action(CONNECTIVITY_ACTION),
        };
        debug!(
            "Starting NetworkManager signal listener {} (wifi: {}, wwan: {})",
            handle, follow.wifi, follow.wwan
        );
        let task = self
            .runtime
            .spawn(follow_radios(self.connection.clone(), self.id, follow, receiver));
        self.tasks.lock().insert(handle, task);
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> CanaryResult<()> {
        match self.tasks.lock().remove(&handle) {
            Some(task) => {
                task.abort();
                debug!("Stopped NetworkManager signal listener {}", handle);
                Ok(())
            }
            None => Err(CanaryError::NotRegistered(handle)),
        }
    }
}

impl Drop for NmSignalService {
    fn drop(&mut self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RadioFollow {
    wifi: bool,
    wwan: bool,
}

async fn follow_radios(
    connection: Connection,
    context: ContextId,
    follow: RadioFollow,
    receiver: Arc<dyn Receiver>,
) {
    let proxy = match NetworkManagerProxy::new(&connection).await {
        Ok(p) => p,
        Err(e) => {
            warn!("Failed to reach NetworkManager: {}", e);
            return;
        }
    };

    let mut wifi_previous = StateCode::Unknown;
    let mut wifi_changes = None;
    if follow.wifi {
        wifi_previous = state_of(proxy.wireless_enabled().await);
        wifi_changes = Some(Box::pin(proxy.receive_wireless_enabled_changed().await));
    }

    let mut wwan_previous = StateCode::Unknown;
    let mut wwan_changes = None;
    if follow.wwan {
        wwan_previous = state_of(proxy.wwan_enabled().await);
        wwan_changes = Some(Box::pin(proxy.receive_wwan_enabled_changed().await));
    }

    loop {
        tokio::select! {
            Some(change) = next_change(&mut wifi_changes) => {
                let current = state_of(change.get().await);
                if current == wifi_previous {
                    continue;
                }
                let notification = Notification::wifi_state_changed(current, wifi_previous);
                wifi_previous = current;
                receiver.on_notification(Some(context), Some(&notification));
            }
            Some(change) = next_change(&mut wwan_changes) => {
                let current = state_of(change.get().await);
                if current == wwan_previous {
                    continue;
                }
                let notification = Notification::new(CONNECTIVITY_ACTION)
                    .with_extra(EXTRA_MOBILE_STATE, current.code())
                    .with_extra(EXTRA_PREVIOUS_MOBILE_STATE, wwan_previous.code());
                wwan_previous = current;
                receiver.on_notification(Some(context), Some(&notification));
            }
            else => break,
        }
    }

    debug!("NetworkManager signal streams ended");
}

/// Next item of a stream that may not have been opened; `None` disables the
/// `select!` branch
async fn next_change<S>(stream: &mut Option<S>) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    match stream {
        Some(stream) => stream.next().await,
        None => None,
    }
}

fn state_of(enabled: zbus::Result<bool>) -> StateCode {
    match enabled {
        Ok(enabled) => StateCode::from_enabled(enabled),
        Err(_) => StateCode::Unknown,
    }
}

/// Reads the mobile radio extras that `NmHost` attaches to connectivity
/// broadcasts
#[derive(Debug, Default, Clone, Copy)]
pub struct NmMobileDecoder;

impl MobileDataDecoder for NmMobileDecoder {
    fn decode(&self, notification: &Notification) -> Option<(StateCode, StateCode)> {
        let current = notification.extra(EXTRA_MOBILE_STATE)?;
        let previous = notification.extra(EXTRA_PREVIOUS_MOBILE_STATE)?;
        Some((StateCode::from_code(current), StateCode::from_code(previous)))
    }
}
