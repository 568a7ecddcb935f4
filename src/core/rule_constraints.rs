//! Constraint functions for firewall rules
//!
//! This module centralizes the small predicates that both the rule model and
//! the formatters depend on: which protocols carry ports, which family an
//! address belongs to, and what counts as a local (loopback) redirect target.
//! Keeping them here makes the netfilter and pf backends agree on every
//! classification decision.
//!
//! # Examples
//!
//! ```
//! use melt::core::rule::{AddressFamily, Protocol};
//! use melt::core::rule_constraints::*;
//!
//! assert!(protocol_supports_ports(Protocol::Tcp));
//! assert!(!protocol_supports_ports(Protocol::Icmp));
//!
//! let host = "10.0.0.1".parse().unwrap();
//! assert_eq!(family_of(&host), AddressFamily::Inet);
//! assert!(is_single_host(&host));
//! ```

use crate::core::rule::{AddressFamily, Protocol};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

// ═══════════════════════════════════════════════════════════════════════════
// Protocol Constraints
// ═══════════════════════════════════════════════════════════════════════════

/// Returns `true` if the protocol supports port filtering.
///
/// ICMP has types and codes rather than ports; both backends reject
/// `--dport`/`port` on it.
///
/// # Examples
///
/// ```
/// use melt::core::rule::Protocol;
/// use melt::core::rule_constraints::protocol_supports_ports;
///
/// assert!(protocol_supports_ports(Protocol::Udp));
/// assert!(protocol_supports_ports(Protocol::Sctp));
/// assert!(!protocol_supports_ports(Protocol::Icmpv6));
/// ```
#[inline]
pub fn protocol_supports_ports(protocol: Protocol) -> bool {
    matches!(protocol, Protocol::Tcp | Protocol::Udp | Protocol::Sctp)
}

/// Returns `true` if `protocol` exists in `family`.
///
/// ICMP belongs to IPv4 and ICMPv6 to IPv6; `iptables` and `ip6tables` each
/// reject the other one.
///
/// # Examples
///
/// ```
/// use melt::core::rule::{AddressFamily, Protocol};
/// use melt::core::rule_constraints::protocol_allows_family;
///
/// assert!(protocol_allows_family(Protocol::Tcp, AddressFamily::Inet6));
/// assert!(!protocol_allows_family(Protocol::Icmp, AddressFamily::Inet6));
/// assert!(!protocol_allows_family(Protocol::Icmpv6, AddressFamily::Inet));
/// ```
#[inline]
pub fn protocol_allows_family(protocol: Protocol, family: AddressFamily) -> bool {
    match protocol {
        Protocol::Icmp => family == AddressFamily::Inet,
        Protocol::Icmpv6 => family == AddressFamily::Inet6,
        Protocol::Tcp | Protocol::Udp | Protocol::Sctp => true,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Address Constraints
// ═══════════════════════════════════════════════════════════════════════════

/// Returns the address family of a host or network.
#[inline]
pub fn family_of(host: &IpNetwork) -> AddressFamily {
    match host {
        IpNetwork::V4(_) => AddressFamily::Inet,
        IpNetwork::V6(_) => AddressFamily::Inet6,
    }
}

/// Returns `true` if the network designates exactly one host (/32 or /128).
///
/// # Examples
///
/// ```
/// use melt::core::rule_constraints::is_single_host;
///
/// assert!(is_single_host(&"192.0.2.7".parse().unwrap()));
/// assert!(is_single_host(&"2001:db8::7/128".parse().unwrap()));
/// assert!(!is_single_host(&"192.0.2.0/24".parse().unwrap()));
/// ```
#[inline]
pub fn is_single_host(host: &IpNetwork) -> bool {
    match host {
        IpNetwork::V4(net) => net.prefix() == 32,
        IpNetwork::V6(net) => net.prefix() == 128,
    }
}

/// Returns the loopback address of `family`, or `None` when no family is known.
///
/// # Examples
///
/// ```
/// use melt::core::rule::AddressFamily;
/// use melt::core::rule_constraints::loopback_address;
/// use std::net::IpAddr;
///
/// assert_eq!(loopback_address(Some(AddressFamily::Inet)), Some("127.0.0.1".parse::<IpAddr>().unwrap()));
/// assert_eq!(loopback_address(Some(AddressFamily::Inet6)), Some("::1".parse::<IpAddr>().unwrap()));
/// assert_eq!(loopback_address(None), None);
/// ```
pub fn loopback_address(family: Option<AddressFamily>) -> Option<IpAddr> {
    match family? {
        AddressFamily::Inet => Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        AddressFamily::Inet6 => Some(IpAddr::V6(Ipv6Addr::LOCALHOST)),
    }
}

/// Returns `true` if a redirect to `host` stays on the local machine.
///
/// A redirect without a host only rewrites the port, so it is local. A host
/// is local when it is exactly the loopback address of the rule's family
/// (`127.0.0.1` or `::1`, as a single host).
///
/// # Examples
///
/// ```
/// use melt::core::rule::AddressFamily;
/// use melt::core::rule_constraints::redirects_to_loopback;
///
/// let inet = Some(AddressFamily::Inet);
/// assert!(redirects_to_loopback(None, inet));
/// assert!(redirects_to_loopback(Some(&"127.0.0.1/32".parse().unwrap()), inet));
/// assert!(!redirects_to_loopback(Some(&"10.0.0.2".parse().unwrap()), inet));
/// ```
pub fn redirects_to_loopback(host: Option<&IpNetwork>, family: Option<AddressFamily>) -> bool {
    let Some(host) = host else {
        return true;
    };
    let family = family.or(Some(family_of(host)));
    is_single_host(host) && loopback_address(family) == Some(host.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_supports_ports() {
        assert!(protocol_supports_ports(Protocol::Tcp));
        assert!(protocol_supports_ports(Protocol::Udp));
        assert!(protocol_supports_ports(Protocol::Sctp));
        assert!(!protocol_supports_ports(Protocol::Icmp));
        assert!(!protocol_supports_ports(Protocol::Icmpv6));
    }

    #[test]
    fn test_protocol_allows_family() {
        assert!(protocol_allows_family(Protocol::Icmp, AddressFamily::Inet));
        assert!(protocol_allows_family(Protocol::Icmpv6, AddressFamily::Inet6));
        assert!(!protocol_allows_family(Protocol::Icmp, AddressFamily::Inet6));
        assert!(!protocol_allows_family(Protocol::Icmpv6, AddressFamily::Inet));
        assert!(protocol_allows_family(Protocol::Udp, AddressFamily::Inet));
    }

    #[test]
    fn test_family_of() {
        let ipv4: IpNetwork = "192.168.1.0/24".parse().unwrap();
        let ipv6: IpNetwork = "2001:db8::/32".parse().unwrap();

        assert_eq!(family_of(&ipv4), AddressFamily::Inet);
        assert_eq!(family_of(&ipv6), AddressFamily::Inet6);
    }

    #[test]
    fn test_loopback_must_match_family() {
        let v4_loopback: IpNetwork = "127.0.0.1".parse().unwrap();
        let v6_loopback: IpNetwork = "::1".parse().unwrap();

        assert!(redirects_to_loopback(Some(&v6_loopback), Some(AddressFamily::Inet6)));
        assert!(!redirects_to_loopback(Some(&v4_loopback), Some(AddressFamily::Inet6)));
        assert!(!redirects_to_loopback(Some(&v6_loopback), Some(AddressFamily::Inet)));
    }

    #[test]
    fn test_loopback_network_is_not_a_local_target() {
        // Only the loopback host itself diverts locally
        let network: IpNetwork = "127.0.0.0/8".parse().unwrap();
        let other: IpNetwork = "127.0.0.2".parse().unwrap();

        assert!(!redirects_to_loopback(Some(&network), Some(AddressFamily::Inet)));
        assert!(!redirects_to_loopback(Some(&other), Some(AddressFamily::Inet)));
    }

    #[test]
    fn test_loopback_family_defaults_to_host_family() {
        let v4_loopback: IpNetwork = "127.0.0.1".parse().unwrap();
        assert!(redirects_to_loopback(Some(&v4_loopback), None));
    }
}
