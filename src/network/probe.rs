use crate::network::host::HostContext;
use crate::network::types::*;

/// Whether we are certain the device is associated with a WiFi network.
///
/// All of the following must hold:
/// - connection info is available and carries a network id
/// - the supplicant finished negotiating
/// - a DHCP lease is available and its address matches the connection's
pub fn is_wifi_connected(info: Option<&WifiConnectionInfo>, dhcp: Option<&DhcpInfo>) -> bool {
    let Some(info) = info else { return false };
    if info.network_id == NETWORK_ID_UNAVAILABLE {
        return false;
    }
    if info.supplicant_state != SupplicantState::Completed {
        return false;
    }
    match dhcp {
        Some(lease) => lease.ip_address == info.ip_address,
        None => false,
    }
}

/// Whether the mobile data link is up
pub fn is_mobile_data_connected(state: Option<DataState>) -> bool {
    state == Some(DataState::Connected)
}

/// `is_wifi_connected` against the snapshots a context provides
pub fn wifi_connected(context: Option<&dyn HostContext>) -> bool {
    context.is_some_and(|ctx| {
        is_wifi_connected(ctx.wifi_connection_info().as_ref(), ctx.dhcp_info().as_ref())
    })
}

pub fn mobile_data_connected(context: Option<&dyn HostContext>) -> bool {
    context.is_some_and(|ctx| is_mobile_data_connected(ctx.mobile_data_state()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::local::{LocalBroadcaster, LocalContext};
    use std::sync::Arc;

    fn associated(ip: u32) -> WifiConnectionInfo {
        WifiConnectionInfo {
            network_id: 4,
            supplicant_state: SupplicantState::Completed,
            ip_address: ip,
        }
    }

    #[test]
    fn wifi_requires_matching_lease() {
        let info = associated(0x0a00_0002);
        assert!(is_wifi_connected(
            Some(&info),
            Some(&DhcpInfo { ip_address: 0x0a00_0002 })
        ));
        assert!(!is_wifi_connected(
            Some(&info),
            Some(&DhcpInfo { ip_address: 0x0a00_0003 })
        ));
        assert!(!is_wifi_connected(Some(&info), None));
        assert!(!is_wifi_connected(None, None));
    }

    #[test]
    fn wifi_requires_network_and_completed_handshake() {
        let lease = DhcpInfo { ip_address: 1 };
        let mut info = associated(1);
        info.network_id = NETWORK_ID_UNAVAILABLE;
        assert!(!is_wifi_connected(Some(&info), Some(&lease)));

        let mut info = associated(1);
        info.supplicant_state = SupplicantState::Handshake;
        assert!(!is_wifi_connected(Some(&info), Some(&lease)));
    }

    #[test]
    fn mobile_data_requires_connected() {
        assert!(is_mobile_data_connected(Some(DataState::Connected)));
        assert!(!is_mobile_data_connected(Some(DataState::Suspended)));
        assert!(!is_mobile_data_connected(None));
    }

    #[test]
    fn context_forms_read_snapshots() {
        assert!(!wifi_connected(None));
        assert!(!mobile_data_connected(None));

        let local = LocalContext::new(1, Arc::new(LocalBroadcaster::new()));
        let ctx: &dyn HostContext = &local;
        assert!(!wifi_connected(Some(ctx)));

        local.set_wifi_connection_info(Some(associated(9)));
        local.set_dhcp_info(Some(DhcpInfo { ip_address: 9 }));
        local.set_mobile_data_state(Some(DataState::Connected));
        assert!(wifi_connected(Some(ctx)));
        assert!(mobile_data_connected(Some(ctx)));
    }
}
