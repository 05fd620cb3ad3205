use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::network::{FeatureSet, HostContext, NetworkStateWatcher};

const ACTION_PREFIX: &str = "canary.service.";
/// The command a service receives when it is first kicked off
pub const ACTION_KICKOFF: &str = "canary.service.SERVICE_START";

/// A long-lived owner for one `NetworkStateWatcher`, independent of whatever
/// UI happens to be looking at it.
///
/// There is no global instance: whoever calls `kickoff` owns the service and
/// hands out `ServiceBinder`s to consumers. Dropping the service stops the
/// watcher and releases its subscription.
pub struct CanaryService {
    watcher: Arc<Mutex<NetworkStateWatcher>>,
    stopped: bool,
}

impl CanaryService {
    /// Start a service hosting a watcher bound to `context`, monitoring `features`
    pub fn kickoff(context: Arc<dyn HostContext>, features: FeatureSet) -> Self {
        let mut watcher = NetworkStateWatcher::bound(context);
        watcher.enable(features);
        Self::host(watcher)
    }

    /// Start a service around a watcher the caller has already bound and
    /// fitted with listeners, so nothing it registers for is missed
    pub fn host(watcher: NetworkStateWatcher) -> Self {
        info!("Canary service created.");

        let service = Self {
            watcher: Arc::new(Mutex::new(watcher)),
            stopped: false,
        };
        service.on_start_command(Some(ACTION_KICKOFF), 1);
        service
    }

    /// Log a command sent to the running service
    pub fn on_start_command(&self, action: Option<&str>, start_id: u32) {
        let action = action.unwrap_or("(null)");
        let short = action.strip_prefix(ACTION_PREFIX).unwrap_or(action);
        info!(
            "Received a command with ID [{}] and action [{}].",
            start_id, short
        );
    }

    /// A handle consumers use to reach the running watcher
    pub fn binder(&self) -> ServiceBinder {
        ServiceBinder {
            watcher: self.watcher.clone(),
        }
    }

    /// The hosted watcher
    pub fn watcher(&self) -> Arc<Mutex<NetworkStateWatcher>> {
        self.watcher.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop the watcher. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.watcher.lock().stop();
        self.stopped = true;
        info!("Canary service destroyed.");
    }
}

impl Drop for CanaryService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Cheap, cloneable access to a service's watcher
#[derive(Clone)]
pub struct ServiceBinder {
    watcher: Arc<Mutex<NetworkStateWatcher>>,
}

impl ServiceBinder {
    pub fn watcher(&self) -> Arc<Mutex<NetworkStateWatcher>> {
        self.watcher.clone()
    }

    /// Run `f` with exclusive access to the watcher
    pub fn with_watcher<R>(&self, f: impl FnOnce(&mut NetworkStateWatcher) -> R) -> R {
        f(&mut self.watcher.lock())
    }
}
