use thiserror::Error;

use crate::network::host::SubscriptionHandle;

/// Unified error type for canary
#[derive(Error, Debug)]
pub enum CanaryError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),

    #[error("Subscription {0} is not registered")]
    NotRegistered(SubscriptionHandle),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type CanaryResult<T> = Result<T, CanaryError>;
