//! Host name resolution for policy documents
//!
//! Policy documents may name hosts instead of addresses. A [`Resolve`]
//! implementation turns each name into the addresses the rule applies to.
//! Literal addresses and networks never reach the resolver backend; they are
//! parsed directly.

use crate::core::error::{Error, Result};
use crate::core::rule::AddressFamily;
use crate::core::rule_constraints::family_of;
use ipnetwork::IpNetwork;
use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use tracing::debug;

/// Turns a host as written in a policy document into addresses
pub trait Resolve {
    /// Resolves `host`, keeping only addresses of `family` when one is given.
    ///
    /// A literal address or network of another family yields an empty list:
    /// the rule simply does not apply to that family.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if a name cannot be resolved to any
    /// address of the requested family.
    fn resolve(&self, host: &str, family: Option<AddressFamily>) -> Result<Vec<IpNetwork>>;
}

/// Parses `host` as an address or network, filtered by `family`.
///
/// Returns `None` when `host` is not a literal and needs a lookup.
fn parse_literal(host: &str, family: Option<AddressFamily>) -> Option<Vec<IpNetwork>> {
    let network = host.parse::<IpNetwork>().ok()?;
    if family.is_some_and(|family| family != family_of(&network)) {
        return Some(Vec::new());
    }
    Some(vec![network])
}

/// IPv6 first, duplicates removed, filtered by family.
fn collect_addresses(
    host: &str,
    addresses: impl IntoIterator<Item = IpAddr>,
    family: Option<AddressFamily>,
) -> Result<Vec<IpNetwork>> {
    let mut found: Vec<IpNetwork> = Vec::new();
    for address in addresses {
        let network = IpNetwork::from(address);
        if family.is_some_and(|family| family != family_of(&network)) {
            continue;
        }
        if !found.contains(&network) {
            found.push(network);
        }
    }
    // Stable: keeps resolver order within each family
    found.sort_by_key(|network| !network.is_ipv6());

    if found.is_empty() {
        let message = match family {
            Some(AddressFamily::Inet) => "does not resolve to any valid IPv4 address.",
            Some(AddressFamily::Inet6) => "does not resolve to any valid IPv6 address.",
            None => "does not resolve to any valid IP address.",
        };
        return Err(Error::Resolution {
            host: host.to_string(),
            message: message.to_string(),
        });
    }
    Ok(found)
}

/// Resolves names with the platform resolver (`getaddrinfo`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str, family: Option<AddressFamily>) -> Result<Vec<IpNetwork>> {
        if let Some(literal) = parse_literal(host, family) {
            return Ok(literal);
        }

        // ToSocketAddrs requires a port
        let addresses = (host, 0)
            .to_socket_addrs()
            .map_err(|e| Error::Resolution {
                host: host.to_string(),
                message: format!("could not be resolved: {e}"),
            })?
            .map(|socket| socket.ip());

        let found = collect_addresses(host, addresses, family)?;
        debug!(host, ?family, addresses = ?found, "resolved host");
        Ok(found)
    }
}

/// Resolves names from a fixed table, for tests and offline builds
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `addresses` as the result of looking up `name`.
    pub fn with_host(mut self, name: &str, addresses: &[IpAddr]) -> Self {
        self.hosts
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(addresses);
        self
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, host: &str, family: Option<AddressFamily>) -> Result<Vec<IpNetwork>> {
        if let Some(literal) = parse_literal(host, family) {
            return Ok(literal);
        }
        let addresses = self.hosts.get(host).map(Vec::as_slice).unwrap_or_default();
        collect_addresses(host, addresses.iter().copied(), family)
    }
}
