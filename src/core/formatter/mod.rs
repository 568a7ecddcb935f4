//! Backend formatters
//!
//! A [`Formatter`] turns validated [`Rule`]s into the configuration syntax of
//! one packet filter. Two backends exist:
//!
//! - [`netfilter`]: `iptables-restore` input, optionally restricted to one
//!   address family ([`Netfilter::ipv4`], [`Netfilter::ipv6`])
//! - [`pf`]: `pf.conf` rules
//!
//! Formatters are stateless values. Compiling is a pure function of the rules
//! and the policy, so the same input always yields byte-identical output.

pub mod netfilter;
pub mod pf;

pub use netfilter::Netfilter;
pub use pf::Pf;

use crate::core::rule::{Action, Rule};
use crate::core::rule_constraints::is_single_host;
use ipnetwork::IpNetwork;

/// Compiles rules into the configuration syntax of one backend
pub trait Formatter {
    /// Compiles a single rule.
    ///
    /// Rules that a backend expands into several statements return them
    /// newline-separated.
    fn emit_rule(&self, rule: &Rule) -> String;

    /// Compiles a complete rule set with `policy` as the default action.
    ///
    /// The output includes the structural scaffolding of the backend and has
    /// no trailing newline.
    fn emit_ruleset(&self, rules: &[Rule], policy: Action) -> String;

    /// Path components under which the packaging layer should store the
    /// compiled rule set.
    fn filename_fragment(&self) -> &'static [&'static str];
}

/// Available backends, as named on the command line
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    /// BSD pf
    Pf,
    /// netfilter, both address families in one file
    Netfilter,
    /// netfilter, IPv4 rules only (`iptables-restore`)
    Netfilter4,
    /// netfilter, IPv6 rules only (`ip6tables-restore`)
    Netfilter6,
}

impl Backend {
    pub fn formatter(self) -> Box<dyn Formatter> {
        match self {
            Backend::Pf => Box::new(Pf),
            Backend::Netfilter => Box::new(Netfilter::new()),
            Backend::Netfilter4 => Box::new(Netfilter::ipv4()),
            Backend::Netfilter6 => Box::new(Netfilter::ipv6()),
        }
    }
}

/// Renders a host as a bare address, or a network in CIDR notation.
pub(crate) fn emit_address(host: &IpNetwork) -> String {
    if is_single_host(host) {
        host.ip().to_string()
    } else {
        host.to_string()
    }
}

/// Joins the non-empty sections of a rule set with newlines.
pub(crate) fn join_sections(sections: impl IntoIterator<Item = String>) -> String {
    sections
        .into_iter()
        .filter(|section| !section.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::net;
    use strum::IntoEnumIterator;

    #[test]
    fn test_emit_address() {
        assert_eq!(emit_address(&net("127.0.0.1/32")), "127.0.0.1");
        assert_eq!(emit_address(&net("2001:db8::1")), "2001:db8::1");
        assert_eq!(emit_address(&net("127.0.0.0/8")), "127.0.0.0/8");
        assert_eq!(emit_address(&net("2001:db8::/32")), "2001:db8::/32");
    }

    #[test]
    fn test_join_sections_skips_empty() {
        let joined = join_sections(vec![
            String::new(),
            "a".to_string(),
            String::new(),
            "b\nc".to_string(),
        ]);
        assert_eq!(joined, "a\nb\nc");
    }

    #[test]
    fn test_backend_names() {
        assert_eq!("netfilter6".parse::<Backend>().unwrap(), Backend::Netfilter6);
        assert!("iptables".parse::<Backend>().is_err());

        let fragments: Vec<_> = Backend::iter()
            .map(|b| b.formatter().filename_fragment().join("/"))
            .collect();
        assert_eq!(
            fragments,
            vec![
                "pf.conf",
                "netfilter/rules",
                "netfilter/rules.v4",
                "netfilter/rules.v6"
            ]
        );
    }
}
