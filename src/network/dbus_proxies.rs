// D-Bus proxy trait definitions for the NetworkManager interfaces canary uses.
// These use zbus's #[proxy] macro to auto-generate typed async clients.

use zbus::proxy;

// ── NetworkManager Main Interface ─────────────────────────────────────

#[proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
pub trait NetworkManager {
    /// NetworkManager version
    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;

    /// Whether wireless is enabled
    #[zbus(property)]
    fn wireless_enabled(&self) -> zbus::Result<bool>;

    /// Set wireless enabled/disabled
    #[zbus(property)]
    fn set_wireless_enabled(&self, enabled: bool) -> zbus::Result<()>;

    /// Whether the wireless hardware switch allows the radio on
    #[zbus(property)]
    fn wireless_hardware_enabled(&self) -> zbus::Result<bool>;

    /// Whether mobile broadband is enabled
    #[zbus(property)]
    fn wwan_enabled(&self) -> zbus::Result<bool>;

    /// Set mobile broadband enabled/disabled
    #[zbus(property)]
    fn set_wwan_enabled(&self, enabled: bool) -> zbus::Result<()>;

    /// Whether the mobile broadband hardware switch allows the radio on
    #[zbus(property)]
    fn wwan_hardware_enabled(&self) -> zbus::Result<bool>;
}
