use crate::core::rule::AddressFamily;
use thiserror::Error;

/// Core error types for melt
#[derive(Debug, Error)]
pub enum Error {
    /// A rule field is unknown or its value is malformed
    #[error("Invalid field {field}: {message}")]
    InvalidField { field: String, message: String },

    /// A port was given on a rule that has no protocol
    #[error("If a source, destination or redirect port is specified, the protocol must also be given")]
    MissingProtocol,

    /// The endpoints of a rule imply more than one address family
    #[error("Address family conflict: rule mixes {}", format_families(families))]
    AddressFamilyConflict { families: Vec<AddressFamily> },

    /// An address family other than inet or inet6 was requested
    #[error("Unsupported address family {0:?}")]
    UnsupportedAddressFamily(String),

    /// A rule asks for both source NAT and a redirect
    #[error("A rule cannot both translate its source (nat_to) and redirect (rdr_to)")]
    NatRedirectConflict,

    /// Hostname resolution produced no usable address
    #[error("\"{host}\" {message}")]
    Resolution { host: String, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document could not be parsed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn format_families(families: &[AddressFamily]) -> String {
    families
        .iter()
        .map(AddressFamily::as_str)
        .collect::<Vec<_>>()
        .join(" and ")
}

impl Error {
    /// Shorthand for [`Error::InvalidField`].
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns a user-facing explanation of the error with remediation hints.
    pub fn translate(&self) -> ErrorTranslation {
        match self {
            Error::InvalidField { field, .. } => {
                ErrorTranslation::new(format!("Rule field '{field}' is not valid"))
                    .with_suggestion("Known keys: action, return, dir, proto, af, on, in, out, from, to, nat_to, rdr_to, no_quick")
                    .with_suggestion("Ports are integers or \"start:end\" ranges between 1 and 65535")
                    .with_suggestion("Interface names are at most 15 characters, optionally prefixed with '!'")
            }
            Error::MissingProtocol => ErrorTranslation::new("Port given without a protocol")
                .with_suggestion("Add \"proto\": \"tcp\" or \"proto\": \"udp\" to the rule"),
            Error::AddressFamilyConflict { .. } => {
                ErrorTranslation::new("Rule mixes IPv4 and IPv6 addresses")
                    .with_suggestion("Split the rule into one IPv4 rule and one IPv6 rule")
                    .with_suggestion("Check that \"af\" matches the addresses used by the rule")
            }
            Error::UnsupportedAddressFamily(_) => {
                ErrorTranslation::new("Unknown address family")
                    .with_suggestion("Use \"inet\" for IPv4 or \"inet6\" for IPv6")
            }
            Error::NatRedirectConflict => {
                ErrorTranslation::new("Rule combines NAT and redirection")
                    .with_suggestion("Use one rule with nat_to and another rule with rdr_to")
            }
            Error::Resolution { host, .. } => {
                ErrorTranslation::new(format!("Could not resolve \"{host}\""))
                    .with_suggestion("Check the hostname for typos")
                    .with_suggestion("Verify DNS works on this machine: getent hosts <name>")
                    .with_suggestion("Use a literal address to avoid resolution")
            }
            Error::Io(_) => ErrorTranslation::new("Could not read the policy document")
                .with_suggestion("Check the path and file permissions"),
            Error::Serialization(_) => ErrorTranslation::new("Policy document is not valid JSON")
                .with_suggestion("Check for missing quotes, brackets, or commas"),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

pub type Result<T> = std::result::Result<T, Error>;
