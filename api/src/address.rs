/// Discovery of the address that LAN clients should use to reach this host.
use std::net::{IpAddr, Ipv4Addr};

use mediablob_shared::CatalogError;
use tracing::{debug, warn};

/// Where the advertised host in asset URLs comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAddress {
    /// Use this host verbatim (from `PUBLIC_HOST`).
    Fixed(String),
    /// Pick the first non-loopback IPv4 address bound to a local interface.
    Discover,
}

impl HostAddress {
    /// Resolve to a host string suitable for an `http://` URL.
    pub fn resolve(&self) -> Result<String, CatalogError> {
        match self {
            HostAddress::Fixed(host) => Ok(host.clone()),
            HostAddress::Discover => local_ipv4().map(|ip| ip.to_string()),
        }
    }
}

/// First IPv4 address that is neither loopback nor unspecified.
pub fn first_reachable_ipv4<I>(addrs: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addrs.into_iter().find_map(|ip| match ip {
        IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4),
        _ => None,
    })
}

/// Scan the host's interfaces for a reachable IPv4 address.
pub fn local_ipv4() -> Result<Ipv4Addr, CatalogError> {
    let interfaces = if_addrs::get_if_addrs().map_err(|e| {
        warn!("Failed to enumerate network interfaces: {}", e);
        CatalogError::NoReachableAddress
    })?;

    let found = first_reachable_ipv4(interfaces.iter().map(|iface| iface.ip()));
    match found {
        Some(ip) => {
            debug!("Advertising address {}", ip);
            Ok(ip)
        }
        None => Err(CatalogError::NoReachableAddress),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_skips_loopback_and_ipv6() {
        let addrs = vec![
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 129)),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 4)),
        ];
        assert_eq!(first_reachable_ipv4(addrs), Some(Ipv4Addr::new(10, 0, 0, 129)));
    }

    #[test]
    fn test_loopback_only_host_has_no_address() {
        let addrs = vec![IpAddr::V4(Ipv4Addr::LOCALHOST), IpAddr::V6(Ipv6Addr::LOCALHOST)];
        assert_eq!(first_reachable_ipv4(addrs), None);
    }

    #[test]
    fn test_fixed_host_is_used_verbatim() {
        let host = HostAddress::Fixed("media.lan".to_string());
        assert_eq!(host.resolve().unwrap(), "media.lan");
    }
}
