//! Core rule compilation functionality
//!
//! This module contains the rule model and the backends that compile it.
//! It provides:
//!
//! - [`rule`]: The backend-agnostic [`rule::Rule`] and its value types
//! - [`rule_constraints`]: Protocol and address predicates shared by all backends
//! - [`formatter`]: The [`formatter::Formatter`] trait with the netfilter and pf backends
//! - [`resolver`]: Host name resolution for policy documents
//! - [`error`]: Error types for rule validation and document loading

pub mod error;
pub mod formatter;
pub mod resolver;
pub mod rule;
pub mod rule_constraints;

#[cfg(test)]
pub mod test_helpers;
