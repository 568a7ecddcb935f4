//! pf backend (`pf.conf` format)
//!
//! pf evaluates every rule and the last match wins, unless a matching rule is
//! `quick`. The rule set therefore starts with non-quick catch-all rules
//! (default policy, X11 protection) that user rules, which are quick unless
//! `no_quick` is set, override:
//!
//! ```text
//! match in all scrub (no-df)
//! set skip on lo
//! block return                        default policy
//! block return in on ! lo0 proto tcp to any port 6000:6010
//! pass out quick on eth0 ... nat-to   NAT rules
//! pass in quick on eth0 ... rdr-to    redirect rules
//! pass in quick ...                   filter rules
//! ```

use super::{Formatter, emit_address, join_sections};
use crate::core::rule::{
    Action, Direction, Endpoint, Interface, PortRange, Protocol, Rule, RuleConfig,
};
use crate::core::rule_constraints::loopback_address;
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// pf formatter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pf;

impl Pf {
    /// Catch-all rule applying the rule set policy.
    fn default_rule(policy: Action) -> Rule {
        Rule::new_unchecked(RuleConfig {
            action: policy,
            return_on_block: true,
            no_quick: true,
            ..Default::default()
        })
    }

    /// Blocks remote access to X11 displays 0 to 10.
    fn x11_rule() -> Rule {
        Rule::new_unchecked(RuleConfig {
            action: Action::Block,
            return_on_block: true,
            direction: Some(Direction::In),
            on_interface: Some(Interface::new_unchecked("lo0", true)),
            protocol: Some(Protocol::Tcp),
            to: Some(Endpoint::port(PortRange::new_unchecked(6000, 6010))),
            no_quick: true,
            ..Default::default()
        })
    }

    fn emit_group<'a>(&self, rules: impl Iterator<Item = &'a Rule>) -> String {
        rules
            .map(|rule| self.emit_rule(rule))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Formatter for Pf {
    fn emit_rule(&self, rule: &Rule) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(12);

        parts.push(action_keyword(rule.action()).to_string());
        if rule.action() == Action::Block && rule.return_on_block() {
            parts.push("return".to_string());
        }
        match rule.direction() {
            Some(Direction::In) => parts.push("in".to_string()),
            Some(Direction::Out) => parts.push("out".to_string()),
            // pf has no forward direction; the rule matches both ways
            Some(Direction::Forward) | None => {}
        }
        // match rules never end evaluation
        if !rule.no_quick() && rule.action() != Action::Log {
            parts.push("quick".to_string());
        }
        // One `on` per pf rule: a forward rule with both interfaces keeps the
        // ingress one
        if let Some(interface) = rule
            .on_interface()
            .or_else(|| rule.in_interface())
            .or_else(|| rule.out_interface())
        {
            if interface.is_negated() {
                parts.push(format!("on ! {}", interface.name()));
            } else {
                parts.push(format!("on {}", interface.name()));
            }
        }
        if let Some(family) = rule.address_family() {
            parts.push(family.as_str().to_string());
        }
        if let Some(protocol) = rule.protocol() {
            parts.push(format!("proto {}", protocol_name(protocol)));
        }
        if let Some(from) = rule.from() {
            push_endpoint(&mut parts, "from", from);
        }
        if let Some(to) = rule.to() {
            push_endpoint(&mut parts, "to", to);
        }
        if rule.is_redirect() {
            if rule.redirects_to_loopback() {
                parts.push(format!("divert-to {}", divert_address(rule)));
            } else if let Some(host) = rule.redirect_host() {
                parts.push(format!("rdr-to {}", emit_address(host)));
            }
            if let Some(port) = rule.redirect_port() {
                parts.push(format!("port {port}"));
            }
        }
        if let Some(address) = rule.nat_to() {
            parts.push(format!("nat-to {}", emit_address(address)));
        }

        parts.join(" ")
    }

    fn emit_ruleset(&self, rules: &[Rule], policy: Action) -> String {
        debug!(total = rules.len(), %policy, "compiling pf rule set");

        join_sections([
            "match in all scrub (no-df)".to_string(),
            "set skip on lo".to_string(),
            self.emit_rule(&Self::default_rule(policy)),
            self.emit_rule(&Self::x11_rule()),
            self.emit_group(rules.iter().filter(|r| r.is_nat())),
            self.emit_group(rules.iter().filter(|r| r.is_redirect())),
            self.emit_group(rules.iter().filter(|r| r.is_filter())),
        ])
    }

    fn filename_fragment(&self) -> &'static [&'static str] {
        &["pf.conf"]
    }
}

fn action_keyword(action: Action) -> &'static str {
    match action {
        Action::Pass => "pass",
        Action::Block => "block",
        Action::Log => "match log",
    }
}

fn protocol_name(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
        Protocol::Sctp => "sctp",
        Protocol::Icmp => "icmp",
        Protocol::Icmpv6 => "icmp6",
    }
}

/// `from`/`to` clause; an absent host is `any`, an empty endpoint is omitted.
fn push_endpoint(parts: &mut Vec<String>, keyword: &str, endpoint: &Endpoint) {
    if endpoint.is_empty() {
        return;
    }
    let host = endpoint
        .host
        .as_ref()
        .map_or_else(|| "any".to_string(), emit_address);
    parts.push(format!("{keyword} {host}"));
    if let Some(port) = endpoint.port {
        parts.push(format!("port {port}"));
    }
}

/// Local address a `divert-to` rule hands packets to.
///
/// Without an explicit host this is the loopback of the rule's family, and
/// `127.0.0.1` when the rule has no family.
fn divert_address(rule: &Rule) -> String {
    if let Some(host) = rule.redirect_host() {
        return emit_address(host);
    }
    let address =
        loopback_address(rule.address_family()).unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    emit_address(&IpNetwork::from(address))
}
