//! Shared test utilities for core module tests
//!
//! Provides common builders so tests read as rule descriptions rather than
//! parsing boilerplate. This module is only compiled in test mode.

use crate::core::rule::{Interface, PortRange, Rule, RuleConfig};
use ipnetwork::IpNetwork;

/// Builds a rule that is expected to be valid.
///
/// # Panics
///
/// Panics if `config` violates a rule invariant.
pub fn rule(config: RuleConfig) -> Rule {
    Rule::new(config).expect("test rule should be valid")
}

/// Parses an address or CIDR network.
pub fn net(text: &str) -> IpNetwork {
    text.parse().expect("test address should parse")
}

/// Parses an interface, `!`-negated or not.
pub fn iface(text: &str) -> Interface {
    text.parse().expect("test interface should parse")
}

/// Parses a port or `start:end` range.
pub fn port(text: &str) -> PortRange {
    text.parse().expect("test port should parse")
}
