//! netfilter backend (`iptables-restore` format)
//!
//! A rule set compiles to up to two tables:
//!
//! ```text
//! *nat                      only when NAT or redirect rules exist
//! :PREROUTING ACCEPT [0:0]
//! ...
//! -A PREROUTING ...         redirect rules
//! -A POSTROUTING ...        NAT rules
//! COMMIT
//! *filter
//! :INPUT DROP [0:0]         chain policies from the rule set policy
//! ...
//! -A INPUT ... RELATED,ESTABLISHED ... ACCEPT
//! -A INPUT ...              inbound rules
//! -A FORWARD ... RELATED,ESTABLISHED ... ACCEPT
//! -A FORWARD ...            forward rules, then rules derived from redirects
//! -A OUTPUT ... RELATED,ESTABLISHED ... ACCEPT
//! -A OUTPUT ...             outbound rules
//! COMMIT
//! ```
//!
//! DNAT only rewrites the destination; the translated packets still traverse
//! FORWARD. Every redirect to a non-local target therefore also produces a
//! FORWARD filter rule (see [`Rule::as_forward_rule`]).

use super::{Formatter, emit_address, join_sections};
use crate::core::rule::{Action, AddressFamily, Direction, Interface, PortRange, Protocol, Rule};
use crate::core::rule_constraints::protocol_allows_family;
use ipnetwork::IpNetwork;
use tracing::{debug, trace};

/// netfilter chains used by the generated rule sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Chain {
    Prerouting,
    Input,
    Forward,
    Output,
    Postrouting,
}

impl Chain {
    /// Interface flag matching a bare `on` interface in this chain.
    ///
    /// Packets have an ingress interface in PREROUTING, INPUT and FORWARD,
    /// and an egress interface in OUTPUT and POSTROUTING.
    const fn interface_flag(self) -> &'static str {
        match self {
            Chain::Prerouting | Chain::Input | Chain::Forward => "-i",
            Chain::Output | Chain::Postrouting => "-o",
        }
    }
}

const NAT_CHAINS: [Chain; 4] = [
    Chain::Prerouting,
    Chain::Input,
    Chain::Output,
    Chain::Postrouting,
];

/// netfilter formatter, optionally restricted to one address family
///
/// [`Netfilter::new`] keeps every rule; [`Netfilter::ipv4`] and
/// [`Netfilter::ipv6`] drop the rules that cannot apply to their family
/// before compiling, for `iptables-restore` and `ip6tables-restore`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Netfilter {
    family: Option<AddressFamily>,
}

impl Netfilter {
    pub const fn new() -> Self {
        Self { family: None }
    }

    pub const fn ipv4() -> Self {
        Self {
            family: Some(AddressFamily::Inet),
        }
    }

    pub const fn ipv6() -> Self {
        Self {
            family: Some(AddressFamily::Inet6),
        }
    }

    pub const fn family(&self) -> Option<AddressFamily> {
        self.family
    }

    /// Family-less ICMP rules only go to the family their protocol exists in.
    fn accepts(&self, rule: &Rule) -> bool {
        let Some(family) = self.family else {
            return true;
        };
        let compatible = match family {
            AddressFamily::Inet => rule.ipv4_compatible(),
            AddressFamily::Inet6 => rule.ipv6_compatible(),
        };
        compatible
            && rule
                .protocol()
                .is_none_or(|protocol| protocol_allows_family(protocol, family))
    }

    fn emit_nat_table(rules: &[&Rule]) -> String {
        let redirects: Vec<&Rule> = rules.iter().copied().filter(|r| r.is_redirect()).collect();
        let nats: Vec<&Rule> = rules.iter().copied().filter(|r| r.is_nat()).collect();
        if redirects.is_empty() && nats.is_empty() {
            return String::new();
        }

        let mut lines = Vec::with_capacity(6 + redirects.len() + nats.len());
        lines.push("*nat".to_string());
        lines.extend(NAT_CHAINS.iter().map(|chain| format!(":{chain} ACCEPT [0:0]")));
        lines.extend(redirects.iter().map(|rule| emit_redirect_rule(rule)));
        lines.extend(nats.iter().map(|rule| emit_nat_rule(rule)));
        lines.push("COMMIT".to_string());
        lines.join("\n")
    }

    fn emit_filter_table(rules: &[&Rule], policy: Action) -> String {
        let policy = policy_target(policy);
        let filters: Vec<&Rule> = rules.iter().copied().filter(|r| r.is_filter()).collect();

        let mut lines = vec!["*filter".to_string()];
        for chain in [Chain::Input, Chain::Forward, Chain::Output] {
            lines.push(format!(":{chain} {policy} [0:0]"));
        }

        lines.push(emit_established(Chain::Input));
        lines.extend(
            filters
                .iter()
                .filter(|r| r.applies_inbound())
                .map(|rule| emit_filter_rule(rule, Chain::Input)),
        );

        lines.push(emit_established(Chain::Forward));
        lines.extend(
            filters
                .iter()
                .filter(|r| r.is_forward())
                .map(|rule| emit_filter_rule(rule, Chain::Forward)),
        );
        for redirect in rules
            .iter()
            .filter(|r| r.is_redirect() && !r.redirects_to_loopback())
        {
            let forward = redirect.as_forward_rule();
            trace!(?forward, "synthesized forward rule for redirect");
            lines.push(emit_filter_rule(&forward, Chain::Forward));
        }

        lines.push(emit_established(Chain::Output));
        lines.extend(
            filters
                .iter()
                .filter(|r| r.applies_outbound())
                .map(|rule| emit_filter_rule(rule, Chain::Output)),
        );

        lines.push("COMMIT".to_string());
        lines.join("\n")
    }
}

impl Formatter for Netfilter {
    fn emit_rule(&self, rule: &Rule) -> String {
        if rule.is_nat() {
            emit_nat_rule(rule)
        } else if rule.is_redirect() {
            emit_redirect_rule(rule)
        } else {
            filter_chains(rule)
                .iter()
                .map(|chain| emit_filter_rule(rule, *chain))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }

    fn emit_ruleset(&self, rules: &[Rule], policy: Action) -> String {
        let selected: Vec<&Rule> = rules.iter().filter(|rule| self.accepts(rule)).collect();
        debug!(
            family = ?self.family,
            total = rules.len(),
            selected = selected.len(),
            %policy,
            "compiling netfilter rule set"
        );

        join_sections([
            Self::emit_nat_table(&selected),
            Self::emit_filter_table(&selected, policy),
        ])
    }

    fn filename_fragment(&self) -> &'static [&'static str] {
        match self.family {
            None => &["netfilter", "rules"],
            Some(AddressFamily::Inet) => &["netfilter", "rules.v4"],
            Some(AddressFamily::Inet6) => &["netfilter", "rules.v6"],
        }
    }
}

/// Chains a filter rule is emitted into, by direction.
fn filter_chains(rule: &Rule) -> &'static [Chain] {
    match rule.direction() {
        Some(Direction::In) => &[Chain::Input],
        Some(Direction::Out) => &[Chain::Output],
        Some(Direction::Forward) => &[Chain::Forward],
        None => &[Chain::Input, Chain::Output],
    }
}

fn emit_filter_rule(rule: &Rule, chain: Chain) -> String {
    let mut parts = vec![format!("-A {chain}")];
    if let Some(interface) = rule.on_interface() {
        push_interface(&mut parts, chain.interface_flag(), interface);
    } else {
        if let Some(interface) = rule.in_interface() {
            push_interface(&mut parts, "-i", interface);
        }
        if let Some(interface) = rule.out_interface() {
            push_interface(&mut parts, "-o", interface);
        }
    }
    push_matches(&mut parts, rule);
    parts.push(format!("-j {}", filter_target(rule)));
    parts.join(" ")
}

fn emit_redirect_rule(rule: &Rule) -> String {
    let mut parts = vec![format!("-A {}", Chain::Prerouting)];
    if let Some(interface) = rule.on_interface() {
        push_interface(&mut parts, Chain::Prerouting.interface_flag(), interface);
    }
    push_matches(&mut parts, rule);

    match rule.redirect_host() {
        Some(host) if !rule.redirects_to_loopback() => {
            parts.push(format!(
                "-j DNAT --to-destination {}",
                dnat_destination(host, rule.redirect_port())
            ));
        }
        _ => {
            parts.push("-j REDIRECT".to_string());
            if let Some(port) = rule.redirect_port() {
                parts.push(format!("--to-port {port}"));
            }
        }
    }
    parts.join(" ")
}

fn emit_nat_rule(rule: &Rule) -> String {
    let mut parts = vec![format!("-A {}", Chain::Postrouting)];
    if let Some(interface) = rule.on_interface() {
        push_interface(&mut parts, Chain::Postrouting.interface_flag(), interface);
    }
    push_matches(&mut parts, rule);
    parts.push("-j MASQUERADE".to_string());
    parts.join(" ")
}

fn emit_established(chain: Chain) -> String {
    format!("-A {chain} -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT")
}

fn push_interface(parts: &mut Vec<String>, flag: &str, interface: &Interface) {
    if interface.is_negated() {
        parts.push(format!("! {flag} {}", interface.name()));
    } else {
        parts.push(format!("{flag} {}", interface.name()));
    }
}

/// Protocol, source and destination matches, in `iptables` order.
fn push_matches(parts: &mut Vec<String>, rule: &Rule) {
    if let Some(protocol) = rule.protocol() {
        parts.push(format!("-p {}", protocol_name(protocol)));
    }
    if let Some(host) = rule.from_host() {
        parts.push(format!("-s {}", emit_address(host)));
    }
    if let Some(port) = rule.from_port() {
        parts.push(format!("--sport {port}"));
    }
    if let Some(host) = rule.to_host() {
        parts.push(format!("-d {}", emit_address(host)));
    }
    if let Some(port) = rule.to_port() {
        parts.push(format!("--dport {port}"));
    }
}

fn protocol_name(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
        Protocol::Sctp => "sctp",
        Protocol::Icmp => "icmp",
        Protocol::Icmpv6 => "icmpv6",
    }
}

fn filter_target(rule: &Rule) -> &'static str {
    match rule.action() {
        Action::Pass => "ACCEPT",
        Action::Log => "LOG",
        Action::Block if rule.return_on_block() => "RETURN",
        Action::Block => "DROP",
    }
}

/// Built-in chain policy for the rule set policy.
///
/// Built-in chains only accept ACCEPT or DROP; LOG does not terminate
/// evaluation, so a log policy lets packets through.
fn policy_target(policy: Action) -> &'static str {
    match policy {
        Action::Pass | Action::Log => "ACCEPT",
        Action::Block => "DROP",
    }
}

/// `--to-destination` argument: `addr`, `addr:port` or `[addr6]:port`.
fn dnat_destination(host: &IpNetwork, port: Option<PortRange>) -> String {
    let address = emit_address(host);
    let Some(port) = port else {
        return address;
    };
    let port = if port.is_single() {
        port.start().to_string()
    } else {
        format!("{}-{}", port.start(), port.end())
    };
    match host {
        IpNetwork::V4(_) => format!("{address}:{port}"),
        IpNetwork::V6(_) => format!("[{address}]:{port}"),
    }
}
