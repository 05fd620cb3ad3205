pub mod dbus_proxies;
pub mod host;
pub mod local;
pub mod nm;
pub mod probe;
pub mod types;
pub mod watcher;

pub use host::{ContextId, HostContext, NotificationService, Receiver, SubscriptionHandle};
pub use local::{LocalBroadcaster, LocalContext};
pub use nm::{NmHost, NmMobileDecoder};
pub use types::*;
pub use watcher::{MobileDataDecoder, NetworkStateWatcher, StateListener};
