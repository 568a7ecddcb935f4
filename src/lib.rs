//! melt - firewall rule compiler
//!
//! Compiles backend-agnostic firewall rules into `iptables-restore` input
//! for netfilter and `pf.conf` rules for BSD pf.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, validation, resolution, and the backend formatters
//! - [`config`] - JSON policy documents and their expansion into rules
//! - [`validators`] - Port and interface name validation
//!
//! # Example
//!
//! ```
//! use melt::{Action, Backend, PolicyDocument, StaticResolver};
//!
//! let doc = PolicyDocument::from_json(
//!     r#"{ "rules": [ { "action": "pass", "dir": "in", "proto": "tcp", "to": { "port": 22 } } ] }"#,
//! )
//! .unwrap();
//! let rules = doc.into_rules(&StaticResolver::new()).unwrap();
//!
//! let output = Backend::Netfilter.formatter().emit_ruleset(&rules, Action::Block);
//! assert!(output.contains("-A INPUT -p tcp --dport 22 -j ACCEPT"));
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod core;
pub mod validators;

// Re-export commonly used types
pub use config::{EndpointSpec, PolicyDocument, RuleSpec};
pub use core::error::{Error, ErrorTranslation, Result};
pub use core::formatter::{Backend, Formatter, Netfilter, Pf};
pub use core::resolver::{Resolve, StaticResolver, SystemResolver};
pub use core::rule::{
    Action, AddressFamily, Direction, Endpoint, Interface, PortRange, Protocol, Rule, RuleConfig,
};
