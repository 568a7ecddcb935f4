//! Policy documents
//!
//! A policy document is the JSON input of the compiler: a default policy and
//! a list of rules written with short keys. Hosts may be names, so a single
//! entry can expand into several [`Rule`]s, one per family-consistent
//! combination of resolved addresses.

use crate::core::error::{Error, Result};
use crate::core::resolver::{Resolve, StaticResolver};
use crate::core::rule::{
    Action, AddressFamily, Direction, Endpoint, Interface, PortRange, Protocol, Rule, RuleConfig,
};
use crate::core::rule_constraints::{family_of, protocol_allows_family};
use ipnetwork::IpNetwork;
use serde::Deserialize;
use serde_json::error::Category;
use std::path::Path;
use tracing::{debug, warn};

/// A complete policy document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyDocument {
    /// Default action of the compiled rule set
    pub policy: Action,
    pub rules: Vec<RuleSpec>,
}

/// Document shape before the rules are checked one by one, so errors can
/// name the offending rule.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    policy: Action,
    #[serde(default)]
    rules: Vec<serde_json::Value>,
}

/// One rule entry as written in a policy document
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(default)]
    pub action: Action,
    #[serde(default, rename = "return")]
    pub return_on_block: bool,
    #[serde(default, rename = "dir")]
    pub direction: Option<Direction>,
    #[serde(default, rename = "proto")]
    pub protocol: Option<Protocol>,
    #[serde(default, rename = "af")]
    pub address_family: Option<AddressFamily>,
    #[serde(default, rename = "on")]
    pub on_interface: Option<Interface>,
    #[serde(default, rename = "in")]
    pub in_interface: Option<Interface>,
    #[serde(default, rename = "out")]
    pub out_interface: Option<Interface>,
    #[serde(default)]
    pub from: Option<EndpointSpec>,
    #[serde(default)]
    pub to: Option<EndpointSpec>,
    /// Address or host name
    #[serde(default)]
    pub nat_to: Option<String>,
    #[serde(default, rename = "rdr_to")]
    pub redirect_to: Option<EndpointSpec>,
    #[serde(default)]
    pub no_quick: bool,
}

/// An endpoint whose host may still need resolving
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSpec {
    /// Address, CIDR network or host name
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<PortRange>,
}

impl PolicyDocument {
    /// Parses a policy document.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`] if the text is not valid JSON
    /// - [`Error::InvalidField`] naming `document` or `rules[i]` if a value
    ///   has the wrong shape or an unknown key
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawDocument = serde_json::from_str(text).map_err(|e| match e.classify() {
            Category::Data => Error::invalid_field("document", e.to_string()),
            _ => Error::Serialization(e),
        })?;

        let rules = raw
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<RuleSpec>(value)
                    .map_err(|e| Error::invalid_field(format!("rules[{index}]"), e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            policy: raw.policy,
            rules,
        })
    }

    /// Reads and parses the policy document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading policy document");
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Resolves host names and builds the validated rules, in document order.
    ///
    /// # Errors
    ///
    /// Returns the first resolution or validation error. The index of the
    /// failing entry is logged.
    pub fn into_rules(&self, resolver: &dyn Resolve) -> Result<Vec<Rule>> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for (index, spec) in self.rules.iter().enumerate() {
            match spec.expand(resolver) {
                Ok(expanded) => {
                    debug!(rule = index, expanded = expanded.len(), "expanded rule");
                    rules.extend(expanded);
                }
                Err(e) => {
                    warn!(rule = index, error = %e, "rejected rule");
                    return Err(e);
                }
            }
        }
        Ok(rules)
    }
}

impl RuleSpec {
    /// Builds one rule per family-consistent combination of resolved hosts.
    ///
    /// A host that resolves to nothing for the rule's family (a literal of
    /// the other family) makes the entry expand to no rule at all.
    pub fn expand(&self, resolver: &dyn Resolve) -> Result<Vec<Rule>> {
        let family = self.address_family;
        let from_hosts = resolve_endpoint(resolver, self.from.as_ref(), family)?;
        let to_hosts = resolve_endpoint(resolver, self.to.as_ref(), family)?;
        let redirect_hosts = resolve_endpoint(resolver, self.redirect_to.as_ref(), family)?;
        let nat_hosts = resolve_host(resolver, self.nat_to.as_deref(), family)?;

        let mut combinations = Vec::new();
        for from in &from_hosts {
            for to in &to_hosts {
                for redirect in &redirect_hosts {
                    for nat in &nat_hosts {
                        combinations.push([*from, *to, *redirect, *nat]);
                    }
                }
            }
        }

        let consistent: Vec<_> = combinations
            .iter()
            .filter(|hosts| self.accepts_hosts(hosts.as_slice()))
            .collect();

        // Literals of both families, or ICMP of the wrong family: let
        // validation report the conflict
        if consistent.is_empty() {
            return match combinations.first() {
                Some(hosts) => Rule::new(self.config(*hosts)).map(|rule| vec![rule]),
                None => Ok(Vec::new()),
            };
        }

        consistent
            .into_iter()
            .map(|hosts| Rule::new(self.config(*hosts)))
            .collect()
    }

    /// `true` if the hosts share one family that the protocol exists in.
    fn accepts_hosts(&self, hosts: &[Option<IpNetwork>]) -> bool {
        let mut families = hosts.iter().flatten().map(family_of);
        let Some(first) = families.next() else {
            return true;
        };
        families.all(|family| family == first)
            && self
                .protocol
                .is_none_or(|protocol| protocol_allows_family(protocol, first))
    }

    fn config(&self, [from, to, redirect, nat]: [Option<IpNetwork>; 4]) -> RuleConfig {
        RuleConfig {
            action: self.action,
            return_on_block: self.return_on_block,
            direction: self.direction,
            protocol: self.protocol,
            address_family: self.address_family,
            on_interface: self.on_interface.clone(),
            in_interface: self.in_interface.clone(),
            out_interface: self.out_interface.clone(),
            from: endpoint(self.from.as_ref(), from),
            to: endpoint(self.to.as_ref(), to),
            nat_to: nat,
            redirect_to: endpoint(self.redirect_to.as_ref(), redirect),
            no_quick: self.no_quick,
        }
    }
}

impl Rule {
    /// Parses a single rule written with policy document keys.
    ///
    /// Hosts must be literal addresses or networks; names need a resolver and
    /// go through [`PolicyDocument::into_rules`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidField`] for unknown keys or malformed values, and
    ///   when the addresses do not belong to the explicit `af`
    /// - [`Error::Resolution`] if a host is a name
    /// - any validation error of [`Rule::new`]
    pub fn from_json(text: &str) -> Result<Self> {
        let spec: RuleSpec = serde_json::from_str(text).map_err(|e| match e.classify() {
            Category::Data => Error::invalid_field("rule", e.to_string()),
            _ => Error::Serialization(e),
        })?;
        spec.expand(&StaticResolver::new())?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::invalid_field("af", "rule addresses do not belong to its address family")
            })
    }
}

fn endpoint(spec: Option<&EndpointSpec>, host: Option<IpNetwork>) -> Option<Endpoint> {
    spec.map(|spec| Endpoint {
        host,
        port: spec.port,
    })
}

fn resolve_endpoint(
    resolver: &dyn Resolve,
    spec: Option<&EndpointSpec>,
    family: Option<AddressFamily>,
) -> Result<Vec<Option<IpNetwork>>> {
    resolve_host(resolver, spec.and_then(|spec| spec.host.as_deref()), family)
}

/// Resolved candidates for one host field; an absent host is a single `None`.
fn resolve_host(
    resolver: &dyn Resolve,
    host: Option<&str>,
    family: Option<AddressFamily>,
) -> Result<Vec<Option<IpNetwork>>> {
    match host {
        None => Ok(vec![None]),
        Some(host) => Ok(resolver
            .resolve(host.trim(), family)?
            .into_iter()
            .map(Some)
            .collect()),
    }
}
