use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CanaryError;

// ── Feature flags ─────────────────────────────────────────────────────

/// Bitmask of monitoring features. Unknown bits are always masked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet(u32);

impl FeatureSet {
    pub const NONE: Self = Self(0);
    /// WiFi radio monitoring
    pub const WIFI: Self = Self(1);
    /// Mobile data monitoring
    pub const MOBILE: Self = Self(2);
    pub const ALL: Self = Self(Self::WIFI.0 | Self::MOBILE.0);

    /// Build a set from raw bits, dropping anything outside the known flags
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True iff every flag in `other` is also in `self`
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// The individual kinds enabled in this set, WiFi first
    pub fn kinds(&self) -> Vec<StateKind> {
        let mut kinds = Vec::new();
        if self.contains(Self::WIFI) {
            kinds.push(StateKind::Wifi);
        }
        if self.contains(Self::MOBILE) {
            kinds.push(StateKind::Mobile);
        }
        kinds
    }
}

impl BitOr for FeatureSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl From<StateKind> for FeatureSet {
    fn from(kind: StateKind) -> Self {
        match kind {
            StateKind::Wifi => Self::WIFI,
            StateKind::Mobile => Self::MOBILE,
        }
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.kinds().iter().map(|k| k.to_string()).collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

// ── Radio state ───────────────────────────────────────────────────────

/// Which radio an event or listener is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Wifi,
    Mobile,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wifi => write!(f, "wifi"),
            Self::Mobile => write!(f, "mobile"),
        }
    }
}

impl FromStr for StateKind {
    type Err = CanaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wifi" | "wlan" => Ok(Self::Wifi),
            "mobile" | "wwan" | "data" => Ok(Self::Mobile),
            other => Err(CanaryError::Parse(format!("unknown radio kind: {other}"))),
        }
    }
}

/// Radio state, numbered the way the host reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateCode {
    Disabling,
    Disabled,
    Enabling,
    Enabled,
    Unknown,
}

impl StateCode {
    /// Decode a host state code. Anything outside the known range is `Unknown`.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Disabling,
            1 => Self::Disabled,
            2 => Self::Enabling,
            3 => Self::Enabled,
            _ => Self::Unknown,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Disabling => 0,
            Self::Disabled => 1,
            Self::Enabling => 2,
            Self::Enabled => 3,
            Self::Unknown => 4,
        }
    }

    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabling => write!(f, "disabling"),
            Self::Disabled => write!(f, "disabled"),
            Self::Enabling => write!(f, "enabling"),
            Self::Enabled => write!(f, "enabled"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A decoded radio state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub kind: StateKind,
    pub current: StateCode,
    pub previous: StateCode,
}

impl StateChangeEvent {
    pub fn wifi(current: StateCode, previous: StateCode) -> Self {
        Self {
            kind: StateKind::Wifi,
            current,
            previous,
        }
    }

    pub fn mobile(current: StateCode, previous: StateCode) -> Self {
        Self {
            kind: StateKind::Mobile,
            current,
            previous,
        }
    }
}

impl fmt::Display for StateChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} state changed from [{}] to [{}]",
            self.kind, self.previous, self.current
        )
    }
}

// ── Host notifications ────────────────────────────────────────────────

/// WiFi radio was switched on/off or is transitioning
pub const WIFI_STATE_CHANGED_ACTION: &str = "canary.net.wifi.WIFI_STATE_CHANGED";
/// WiFi association changed (carries no radio state)
pub const NETWORK_STATE_CHANGED_ACTION: &str = "canary.net.wifi.STATE_CHANGE";
/// General connectivity changed; mobile data state lives here
pub const CONNECTIVITY_ACTION: &str = "canary.net.conn.CONNECTIVITY_CHANGE";

pub const EXTRA_WIFI_STATE: &str = "wifi_state";
pub const EXTRA_PREVIOUS_WIFI_STATE: &str = "previous_wifi_state";
pub const EXTRA_MOBILE_STATE: &str = "mobile_state";
pub const EXTRA_PREVIOUS_MOBILE_STATE: &str = "previous_mobile_state";

/// A raw broadcast from the host: an action name plus integer extras
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    pub action: Option<String>,
    pub extras: HashMap<String, i32>,
}

impl Notification {
    pub fn new(action: &str) -> Self {
        Self {
            action: Some(action.to_string()),
            extras: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: i32) -> Self {
        self.extras.insert(key.to_string(), value);
        self
    }

    pub fn extra(&self, key: &str) -> Option<i32> {
        self.extras.get(key).copied()
    }

    /// A WiFi state broadcast carrying current and previous codes
    pub fn wifi_state_changed(current: StateCode, previous: StateCode) -> Self {
        Self::new(WIFI_STATE_CHANGED_ACTION)
            .with_extra(EXTRA_WIFI_STATE, current.code())
            .with_extra(EXTRA_PREVIOUS_WIFI_STATE, previous.code())
    }
}

/// The set of actions a subscription wants to receive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    actions: BTreeSet<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The filter a watcher subscribes with for a given feature set
    pub fn for_features(features: FeatureSet) -> Self {
        let mut filter = Self::new();
        if features.contains(FeatureSet::WIFI) {
            filter.add_action(NETWORK_STATE_CHANGED_ACTION);
            filter.add_action(WIFI_STATE_CHANGED_ACTION);
        }
        if features.contains(FeatureSet::MOBILE) {
            filter.add_action(CONNECTIVITY_ACTION);
        }
        filter
    }

    pub fn add_action(&mut self, action: &str) {
        self.actions.insert(action.to_string());
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains(action)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether a notification passes this filter. Action-less notifications
    /// always pass so the receiver can decide to drop them.
    pub fn matches(&self, notification: &Notification) -> bool {
        match notification.action.as_deref() {
            Some(action) => self.has_action(action),
            None => true,
        }
    }
}

// ── Connection snapshots ──────────────────────────────────────────────

/// Network id reported when the device is not associated with any network
pub const NETWORK_ID_UNAVAILABLE: i32 = -1;

/// WPA supplicant negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplicantState {
    Disconnected,
    Scanning,
    Associating,
    Associated,
    Handshake,
    Completed,
    Inactive,
    Unknown,
}

/// The WiFi association as the host sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiConnectionInfo {
    pub network_id: i32,
    pub supplicant_state: SupplicantState,
    pub ip_address: u32,
}

/// The lease handed out by DHCP on the WiFi interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhcpInfo {
    pub ip_address: u32,
}

/// Mobile data link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    Disconnected,
    Connecting,
    Connected,
    Suspended,
}
