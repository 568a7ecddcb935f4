//! Backend-agnostic firewall rule model
//!
//! This module defines the [`Rule`] entity and the value types it is built
//! from. A rule is validated once, when it is constructed from a
//! [`RuleConfig`], and is read-only afterwards: formatters only ever see rules
//! whose invariants hold.
//!
//! # Invariants
//!
//! - A source, destination or redirect port requires a protocol, and that
//!   protocol must use ports.
//! - All addresses used by a rule belong to one address family. When the
//!   family is not given explicitly it is inferred from the addresses.
//! - `in`/`out` interfaces only appear on forward rules; other rules use `on`.
//! - ICMP requires IPv4 and ICMPv6 requires IPv6 when the family is known.
//! - A rule is either a NAT rule, a redirect rule, or a filter rule. Setting
//!   both `nat_to` and `redirect_to` is rejected.
//!
//! # Example
//!
//! ```
//! use melt::core::rule::{Action, Direction, Endpoint, PortRange, Protocol, Rule, RuleConfig};
//!
//! let rule = Rule::new(RuleConfig {
//!     action: Action::Pass,
//!     direction: Some(Direction::In),
//!     protocol: Some(Protocol::Tcp),
//!     to: Some(Endpoint::port(PortRange::single(80))),
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! assert!(rule.is_filter());
//! assert!(rule.applies_inbound());
//! assert_eq!(rule.address_family(), None);
//! ```

use crate::core::error::{Error, Result};
use crate::core::rule_constraints::{
    family_of, protocol_allows_family, protocol_supports_ports, redirects_to_loopback,
};
use crate::validators;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happens to a packet matching the rule
///
/// Also used as the default policy of a rule set, where [`Action::Block`] is
/// the default.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    /// Let the packet through
    Pass,
    /// Drop the packet, or return it when the rule asks for it
    #[default]
    Block,
    /// Log the packet
    Log,
}

/// Traffic direction a rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    /// Routed traffic (netfilter FORWARD chain)
    Forward,
}

/// IP address family
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase", try_from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4
    Inet,
    /// IPv6
    Inet6,
}

impl AddressFamily {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AddressFamily::Inet => "inet",
            AddressFamily::Inet6 => "inet6",
        }
    }
}

impl FromStr for AddressFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inet" => Ok(AddressFamily::Inet),
            "inet6" => Ok(AddressFamily::Inet6),
            other => Err(Error::UnsupportedAddressFamily(other.to_string())),
        }
    }
}

impl TryFrom<String> for AddressFamily {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Layer 4 protocol matched by a rule
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    /// Transmission Control Protocol
    Tcp,
    /// User Datagram Protocol
    Udp,
    /// Stream Control Transmission Protocol
    Sctp,
    /// Internet Control Message Protocol (IPv4)
    Icmp,
    /// Internet Control Message Protocol version 6
    #[serde(alias = "icmp6", alias = "ipv6-icmp")]
    #[strum(to_string = "icmpv6", serialize = "icmp6", serialize = "ipv6-icmp")]
    Icmpv6,
}

/// A single port or an inclusive port range
///
/// Bounds are always in `1..=65535` with `start <= end`; every constructor
/// outside the crate validates them.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "PortSpec")]
pub struct PortRange {
    start: u16,
    end: u16,
}

/// Ports as written in policy documents: `80`, `"80"` or `"6000:6010"`
#[derive(Deserialize)]
#[serde(untagged)]
enum PortSpec {
    Number(u16),
    Text(String),
}

impl PortRange {
    /// A range of one port.
    ///
    /// # Panics
    ///
    /// Panics if `port` is 0.
    pub const fn single(port: u16) -> Self {
        assert!(port != 0, "port 0 is reserved");
        Self {
            start: port,
            end: port,
        }
    }

    /// Builds a range without validating it, for fixed ranges in formatters.
    pub(crate) const fn new_unchecked(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Builds a validated range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidField`] if a bound is 0 or `start > end`.
    pub fn new(start: u16, end: u16) -> Result<Self> {
        let (start, end) = validators::validate_port_range(start, end)
            .map_err(|message| Error::invalid_field("port", message))?;
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> u16 {
        self.start
    }

    pub const fn end(&self) -> u16 {
        self.end
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let text = text.trim();
        let (start, end) = match text.split_once([':', '-']) {
            Some((start, end)) => (start, end),
            None => (text, text),
        };
        let parse_bound = |bound: &str| {
            bound
                .trim()
                .parse::<u16>()
                .map_err(|_| format!("Invalid port {text:?}"))
        };
        let (start, end) = validators::validate_port_range(parse_bound(start)?, parse_bound(end)?)?;
        Ok(Self { start, end })
    }
}

impl FromStr for PortRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).map_err(|message| Error::invalid_field("port", message))
    }
}

impl TryFrom<PortSpec> for PortRange {
    type Error = String;

    fn try_from(spec: PortSpec) -> std::result::Result<Self, String> {
        match spec {
            PortSpec::Number(port) => {
                validators::validate_port(port)?;
                Ok(Self::single(port))
            }
            PortSpec::Text(text) => Self::parse(&text),
        }
    }
}

/// Renders `80` or `6000:6010`, the range syntax both backends understand
impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// A network interface, possibly negated (`!lo` means "any interface but lo")
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub struct Interface {
    name: String,
    negated: bool,
}

impl Interface {
    /// Builds an interface match without validating the name.
    pub(crate) fn new_unchecked(name: &str, negated: bool) -> Self {
        Self {
            name: name.to_string(),
            negated,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let (negated, name) = match text.strip_prefix('!') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, text),
        };
        if name.is_empty() {
            return Err("Interface name cannot be empty".to_string());
        }
        validators::validate_interface(name)?;
        Ok(Self {
            name: name.to_string(),
            negated,
        })
    }
}

impl FromStr for Interface {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).map_err(|message| Error::invalid_field("on", message))
    }
}

impl TryFrom<String> for Interface {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, String> {
        Self::parse(&value)
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Source, destination or redirect target of a rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: Option<IpNetwork>,
    pub port: Option<PortRange>,
}

impl Endpoint {
    pub fn host(host: IpNetwork) -> Self {
        Self {
            host: Some(host),
            port: None,
        }
    }

    pub fn port(port: PortRange) -> Self {
        Self {
            host: None,
            port: Some(port),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none()
    }
}

/// Everything needed to build a [`Rule`]
///
/// All fields are optional except `action`, which defaults to
/// [`Action::Block`] so configs can be written with `..Default::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleConfig {
    pub action: Action,
    /// Reject/return blocked packets instead of silently dropping them
    pub return_on_block: bool,
    /// `None` applies the rule to both inbound and outbound traffic
    pub direction: Option<Direction>,
    pub protocol: Option<Protocol>,
    /// `None` lets the family be inferred from the addresses
    pub address_family: Option<AddressFamily>,
    pub on_interface: Option<Interface>,
    /// Ingress interface of a forward rule
    pub in_interface: Option<Interface>,
    /// Egress interface of a forward rule
    pub out_interface: Option<Interface>,
    pub from: Option<Endpoint>,
    pub to: Option<Endpoint>,
    /// Translate the source address (outbound NAT)
    pub nat_to: Option<IpNetwork>,
    /// Redirect matching traffic (port forwarding, DNAT)
    pub redirect_to: Option<Endpoint>,
    /// Keep evaluating later rules after a match (pf only)
    pub no_quick: bool,
}

/// A validated, backend-agnostic firewall rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    action: Action,
    return_on_block: bool,
    direction: Option<Direction>,
    protocol: Option<Protocol>,
    address_family: Option<AddressFamily>,
    on_interface: Option<Interface>,
    in_interface: Option<Interface>,
    out_interface: Option<Interface>,
    from: Option<Endpoint>,
    to: Option<Endpoint>,
    nat_to: Option<IpNetwork>,
    redirect_to: Option<Endpoint>,
    no_quick: bool,
}

impl Rule {
    /// Validates `config` and builds a rule from it.
    ///
    /// When no address family is given and the addresses of the rule all
    /// belong to one family, that family is stored on the rule.
    ///
    /// # Errors
    ///
    /// - [`Error::NatRedirectConflict`] if both `nat_to` and a redirect target are set
    /// - [`Error::MissingProtocol`] if a port is given without a protocol
    /// - [`Error::InvalidField`] if ports are used with a protocol that has none,
    ///   if `in`/`out` interfaces are set on a rule that is not a forward rule,
    ///   or if an ICMP protocol does not match the rule's address family
    /// - [`Error::AddressFamilyConflict`] if the addresses mix IPv4 and IPv6
    pub fn new(config: RuleConfig) -> Result<Self> {
        let mut rule = Self::new_unchecked(config);

        if rule.is_nat() && rule.is_redirect() {
            return Err(Error::NatRedirectConflict);
        }

        let has_port = rule.from_port().is_some()
            || rule.to_port().is_some()
            || rule.redirect_port().is_some();
        if has_port {
            match rule.protocol {
                None => return Err(Error::MissingProtocol),
                Some(protocol) if !protocol_supports_ports(protocol) => {
                    return Err(Error::invalid_field(
                        "proto",
                        format!("{protocol} does not use ports"),
                    ));
                }
                Some(_) => {}
            }
        }

        if !rule.is_forward() {
            if rule.in_interface.is_some() {
                return Err(Error::invalid_field(
                    "in",
                    "an ingress interface is only valid on forward rules, use \"on\"",
                ));
            }
            if rule.out_interface.is_some() {
                return Err(Error::invalid_field(
                    "out",
                    "an egress interface is only valid on forward rules, use \"on\"",
                ));
            }
        }

        rule.address_family = rule.resolve_address_family()?;

        if let (Some(protocol), Some(family)) = (rule.protocol, rule.address_family)
            && !protocol_allows_family(protocol, family)
        {
            return Err(Error::invalid_field(
                "proto",
                format!("{protocol} cannot be used with {family}"),
            ));
        }

        Ok(rule)
    }

    /// Builds a rule without checking any invariant.
    ///
    /// Only for rules synthesized by the formatters, whose shape is fixed.
    pub(crate) fn new_unchecked(config: RuleConfig) -> Self {
        let RuleConfig {
            action,
            return_on_block,
            direction,
            protocol,
            address_family,
            on_interface,
            in_interface,
            out_interface,
            from,
            to,
            nat_to,
            redirect_to,
            no_quick,
        } = config;

        Self {
            action,
            return_on_block,
            direction,
            protocol,
            address_family,
            on_interface,
            in_interface,
            out_interface,
            from,
            to,
            nat_to,
            redirect_to,
            no_quick,
        }
    }

    /// Families found on the rule, in order of first appearance.
    fn families(&self) -> Vec<AddressFamily> {
        let mut families: Vec<AddressFamily> = Vec::with_capacity(2);
        let hosts = [
            self.from_host(),
            self.to_host(),
            self.redirect_host(),
            self.nat_to.as_ref(),
        ];
        let found = self
            .address_family
            .into_iter()
            .chain(hosts.into_iter().flatten().map(family_of));
        for family in found {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }

    fn resolve_address_family(&self) -> Result<Option<AddressFamily>> {
        let families = self.families();
        match families.as_slice() {
            [] => Ok(None),
            [family] => Ok(Some(*family)),
            _ => Err(Error::AddressFamilyConflict { families }),
        }
    }

    /// Derives the FORWARD-path filter rule of a redirect rule.
    ///
    /// The interface moves to `in_interface` for inbound rules and to
    /// `out_interface` otherwise, the redirect target is merged into `to`,
    /// and the direction becomes [`Direction::Forward`].
    pub fn as_forward_rule(&self) -> Rule {
        let mut rule = self.clone();

        if let Some(interface) = rule.on_interface.take() {
            if self.direction == Some(Direction::In) {
                rule.in_interface = Some(interface);
            } else {
                rule.out_interface = Some(interface);
            }
        }

        if let Some(redirect) = rule.redirect_to.take() {
            let to = rule.to.get_or_insert_with(Endpoint::default);
            if redirect.host.is_some() {
                to.host = redirect.host;
            }
            if redirect.port.is_some() {
                to.port = redirect.port;
            }
        }

        rule.direction = Some(Direction::Forward);
        rule
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn return_on_block(&self) -> bool {
        self.return_on_block
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    pub fn address_family(&self) -> Option<AddressFamily> {
        self.address_family
    }

    pub fn on_interface(&self) -> Option<&Interface> {
        self.on_interface.as_ref()
    }

    pub fn in_interface(&self) -> Option<&Interface> {
        self.in_interface.as_ref()
    }

    pub fn out_interface(&self) -> Option<&Interface> {
        self.out_interface.as_ref()
    }

    pub fn from(&self) -> Option<&Endpoint> {
        self.from.as_ref()
    }

    pub fn to(&self) -> Option<&Endpoint> {
        self.to.as_ref()
    }

    pub fn nat_to(&self) -> Option<&IpNetwork> {
        self.nat_to.as_ref()
    }

    pub fn redirect_to(&self) -> Option<&Endpoint> {
        self.redirect_to.as_ref()
    }

    pub fn no_quick(&self) -> bool {
        self.no_quick
    }

    pub fn from_host(&self) -> Option<&IpNetwork> {
        self.from.as_ref().and_then(|e| e.host.as_ref())
    }

    pub fn from_port(&self) -> Option<PortRange> {
        self.from.and_then(|e| e.port)
    }

    pub fn to_host(&self) -> Option<&IpNetwork> {
        self.to.as_ref().and_then(|e| e.host.as_ref())
    }

    pub fn to_port(&self) -> Option<PortRange> {
        self.to.and_then(|e| e.port)
    }

    pub fn redirect_host(&self) -> Option<&IpNetwork> {
        self.redirect_to.as_ref().and_then(|e| e.host.as_ref())
    }

    pub fn redirect_port(&self) -> Option<PortRange> {
        self.redirect_to.and_then(|e| e.port)
    }

    pub fn is_nat(&self) -> bool {
        self.nat_to.is_some()
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_to.is_some_and(|e| !e.is_empty())
    }

    pub fn is_filter(&self) -> bool {
        !self.is_nat() && !self.is_redirect()
    }

    pub fn applies_inbound(&self) -> bool {
        matches!(self.direction, None | Some(Direction::In))
    }

    pub fn applies_outbound(&self) -> bool {
        matches!(self.direction, None | Some(Direction::Out))
    }

    pub fn is_forward(&self) -> bool {
        self.direction == Some(Direction::Forward)
    }

    pub fn ipv4_compatible(&self) -> bool {
        matches!(self.address_family, None | Some(AddressFamily::Inet))
    }

    pub fn ipv6_compatible(&self) -> bool {
        matches!(self.address_family, None | Some(AddressFamily::Inet6))
    }

    /// Returns `true` if this redirect stays on the local host.
    ///
    /// That is the case when the target has no host, or when the host is the
    /// loopback address of the rule's address family.
    pub fn redirects_to_loopback(&self) -> bool {
        redirects_to_loopback(self.redirect_host(), self.address_family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::{iface, net};

    #[test]
    fn test_port_range_parsing() {
        assert_eq!("80".parse::<PortRange>().unwrap(), PortRange::single(80));
        assert_eq!(
            "6000:6010".parse::<PortRange>().unwrap(),
            PortRange::new(6000, 6010).unwrap()
        );
        assert_eq!(
            "8000-9000".parse::<PortRange>().unwrap().to_string(),
            "8000:9000"
        );
        assert!("0".parse::<PortRange>().is_err());
        assert!("90:80".parse::<PortRange>().is_err());
        assert!("http".parse::<PortRange>().is_err());
    }

    #[test]
    fn test_port_range_rejects_invalid_bounds() {
        assert!(matches!(
            PortRange::new(90, 0),
            Err(Error::InvalidField { field, .. }) if field == "port"
        ));
        assert!(PortRange::new(0, 10).is_err());
        assert!(PortRange::new(443, 80).is_err());

        let range = PortRange::new(6000, 6010).unwrap();
        assert_eq!((range.start(), range.end()), (6000, 6010));
        assert!(!range.is_single());
    }

    #[test]
    #[should_panic(expected = "port 0 is reserved")]
    fn test_single_port_zero_panics() {
        let _ = PortRange::single(0);
    }

    #[test]
    fn test_port_range_from_json() {
        let single: PortRange = serde_json::from_str("53").unwrap();
        assert_eq!(single, PortRange::single(53));
        let range: PortRange = serde_json::from_str("\"1024:2048\"").unwrap();
        assert_eq!(range.to_string(), "1024:2048");
        assert!(serde_json::from_str::<PortRange>("0").is_err());
    }

    #[test]
    fn test_interface_negation() {
        let lo = iface("!lo");
        assert!(lo.is_negated());
        assert_eq!(lo.name(), "lo");
        assert_eq!(lo.to_string(), "!lo");

        let eth0 = iface("eth0");
        assert!(!eth0.is_negated());

        assert!("!".parse::<Interface>().is_err());
        assert!("this-name-is-far-too-long".parse::<Interface>().is_err());
        assert!("eth0;rm".parse::<Interface>().is_err());
    }

    #[test]
    fn test_address_family_parsing() {
        assert_eq!("inet".parse::<AddressFamily>().unwrap(), AddressFamily::Inet);
        assert_eq!(
            "inet6".parse::<AddressFamily>().unwrap(),
            AddressFamily::Inet6
        );
        assert!(matches!(
            "ipx".parse::<AddressFamily>(),
            Err(Error::UnsupportedAddressFamily(name)) if name == "ipx"
        ));
    }

    #[test]
    fn test_protocol_aliases() {
        assert_eq!("icmp6".parse::<Protocol>().unwrap(), Protocol::Icmpv6);
        assert_eq!(Protocol::Icmpv6.to_string(), "icmpv6");
        let proto: Protocol = serde_json::from_str("\"ipv6-icmp\"").unwrap();
        assert_eq!(proto, Protocol::Icmpv6);
    }

    #[test]
    fn test_port_without_protocol_is_rejected() {
        let result = Rule::new(RuleConfig {
            from: Some(Endpoint::port(PortRange::single(53))),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::MissingProtocol)));

        let result = Rule::new(RuleConfig {
            redirect_to: Some(Endpoint::port(PortRange::single(3128))),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::MissingProtocol)));
    }

    #[test]
    fn test_port_with_icmp_is_rejected() {
        let result = Rule::new(RuleConfig {
            protocol: Some(Protocol::Icmp),
            to: Some(Endpoint::port(PortRange::single(7))),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::InvalidField { field, .. }) if field == "proto"));
    }

    #[test]
    fn test_address_family_is_inferred() {
        let rule = Rule::new(RuleConfig {
            from: Some(Endpoint::host(net("192.168.0.0/16"))),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(rule.address_family(), Some(AddressFamily::Inet));
        assert!(rule.ipv4_compatible());
        assert!(!rule.ipv6_compatible());

        let rule = Rule::new(RuleConfig {
            to: Some(Endpoint::host(net("2001:db8::1"))),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(rule.address_family(), Some(AddressFamily::Inet6));
    }

    #[test]
    fn test_address_family_conflict() {
        let result = Rule::new(RuleConfig {
            from: Some(Endpoint::host(net("10.0.0.1"))),
            to: Some(Endpoint::host(net("2001:db8::1"))),
            ..Default::default()
        });
        match result {
            Err(Error::AddressFamilyConflict { families }) => {
                assert_eq!(families, vec![AddressFamily::Inet, AddressFamily::Inet6]);
            }
            other => panic!("expected a family conflict, got {other:?}"),
        }

        let result = Rule::new(RuleConfig {
            address_family: Some(AddressFamily::Inet6),
            redirect_to: Some(Endpoint::host(net("10.0.0.1"))),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::AddressFamilyConflict { .. })));
    }

    #[test]
    fn test_in_out_interfaces_require_forward() {
        let result = Rule::new(RuleConfig {
            direction: Some(Direction::In),
            out_interface: Some(iface("eth0")),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::InvalidField { field, .. }) if field == "out"));

        let result = Rule::new(RuleConfig {
            in_interface: Some(iface("eth1")),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::InvalidField { field, .. }) if field == "in"));

        let forward = Rule::new(RuleConfig {
            direction: Some(Direction::Forward),
            in_interface: Some(iface("eth1")),
            out_interface: Some(iface("eth0")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(forward.in_interface(), Some(&iface("eth1")));
        assert_eq!(forward.out_interface(), Some(&iface("eth0")));
    }

    #[test]
    fn test_icmp_must_match_family() {
        let result = Rule::new(RuleConfig {
            protocol: Some(Protocol::Icmp),
            address_family: Some(AddressFamily::Inet6),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::InvalidField { field, .. }) if field == "proto"));

        let result = Rule::new(RuleConfig {
            protocol: Some(Protocol::Icmpv6),
            to: Some(Endpoint::host(net("192.0.2.1"))),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::InvalidField { field, .. }) if field == "proto"));

        // Without a known family the rule stays valid for both
        let icmp = Rule::new(RuleConfig {
            protocol: Some(Protocol::Icmpv6),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(icmp.address_family(), None);
        assert!(
            Rule::new(RuleConfig {
                protocol: Some(Protocol::Icmpv6),
                address_family: Some(AddressFamily::Inet6),
                ..Default::default()
            })
            .is_ok()
        );
    }

    #[test]
    fn test_nat_and_redirect_are_exclusive() {
        let result = Rule::new(RuleConfig {
            nat_to: Some(net("192.0.2.1")),
            redirect_to: Some(Endpoint::host(net("10.0.0.2"))),
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::NatRedirectConflict)));
    }

    #[test]
    fn test_classification() {
        let nat = Rule::new(RuleConfig {
            nat_to: Some(net("192.0.2.1")),
            ..Default::default()
        })
        .unwrap();
        assert!(nat.is_nat() && !nat.is_redirect() && !nat.is_filter());

        // An empty redirect target does not make a redirect rule
        let filter = Rule::new(RuleConfig {
            redirect_to: Some(Endpoint::default()),
            ..Default::default()
        })
        .unwrap();
        assert!(filter.is_filter());

        let both_ways = Rule::new(RuleConfig::default()).unwrap();
        assert!(both_ways.applies_inbound() && both_ways.applies_outbound());
        assert!(!both_ways.is_forward());
    }

    #[test]
    fn test_as_forward_rule() {
        let rule = Rule::new(RuleConfig {
            action: Action::Pass,
            direction: Some(Direction::In),
            on_interface: Some(iface("eth0")),
            protocol: Some(Protocol::Tcp),
            to: Some(Endpoint {
                host: Some(net("198.51.100.10")),
                port: Some(PortRange::single(80)),
            }),
            redirect_to: Some(Endpoint::host(net("10.0.0.2"))),
            ..Default::default()
        })
        .unwrap();

        let forward = rule.as_forward_rule();
        assert!(forward.is_forward());
        assert!(forward.is_filter());
        assert_eq!(forward.on_interface(), None);
        assert_eq!(forward.in_interface(), Some(&iface("eth0")));
        assert_eq!(forward.out_interface(), None);
        assert_eq!(forward.to_host(), Some(&net("10.0.0.2")));
        // The redirect has no port, so the destination port stays
        assert_eq!(forward.to_port(), Some(PortRange::single(80)));
        assert_eq!(forward.action(), Action::Pass);
    }

    #[test]
    fn test_as_forward_rule_outbound_interface() {
        let rule = Rule::new(RuleConfig {
            direction: Some(Direction::Out),
            on_interface: Some(iface("wg0")),
            protocol: Some(Protocol::Udp),
            redirect_to: Some(Endpoint {
                host: Some(net("10.8.0.1")),
                port: Some(PortRange::single(53)),
            }),
            ..Default::default()
        })
        .unwrap();

        let forward = rule.as_forward_rule();
        assert_eq!(forward.out_interface(), Some(&iface("wg0")));
        assert_eq!(forward.in_interface(), None);
        assert_eq!(forward.to_port(), Some(PortRange::single(53)));
        assert_eq!(forward.redirect_to(), None);
    }

    #[test]
    fn test_redirects_to_loopback() {
        let local = Rule::new(RuleConfig {
            protocol: Some(Protocol::Tcp),
            redirect_to: Some(Endpoint {
                host: Some(net("127.0.0.1/32")),
                port: Some(PortRange::single(3128)),
            }),
            ..Default::default()
        })
        .unwrap();
        assert!(local.redirects_to_loopback());

        let port_only = Rule::new(RuleConfig {
            protocol: Some(Protocol::Tcp),
            redirect_to: Some(Endpoint::port(PortRange::single(8080))),
            ..Default::default()
        })
        .unwrap();
        assert!(port_only.redirects_to_loopback());

        let remote = Rule::new(RuleConfig {
            redirect_to: Some(Endpoint::host(net("::1/64"))),
            ..Default::default()
        })
        .unwrap();
        assert!(!remote.redirects_to_loopback());
    }
}
