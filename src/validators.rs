//! Input validation for rule fields
//!
//! These checks catch values that would produce a rule set the backend
//! refuses to load. They do not check that an interface actually exists on
//! the host. Errors are plain messages; callers attach the field name.

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err(format!(
            "Start port {start} must be less than or equal to end port {end}"
        ))
    } else {
        Ok((start, end))
    }
}

/// Validates a network interface name, without its `!` negation prefix.
///
/// Kernel limits on Linux and BSD:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// Names are interpolated verbatim into both backends, so anything outside
/// that alphabet is refused.
///
/// # Errors
///
/// Returns `Err` if the name violates these constraints.
///
/// # Examples
///
/// ```
/// use melt::validators::validate_interface;
///
/// assert!(validate_interface("eth0").is_ok());
/// assert!(validate_interface("lo0").is_ok());
/// assert!(validate_interface("eth0 -j ACCEPT").is_err());
/// ```
pub fn validate_interface(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Interface name cannot be empty".to_string());
    }

    if name.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if name == "." || name == ".." {
        return Err("Invalid interface name".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err(format!("Interface name {name:?} contains invalid characters"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port() {
        assert!(validate_port(1).is_ok());
        assert!(validate_port(65535).is_ok());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn test_validate_port_range() {
        assert_eq!(validate_port_range(6000, 6010), Ok((6000, 6010)));
        assert_eq!(validate_port_range(22, 22), Ok((22, 22)));
        assert!(validate_port_range(0, 10).is_err());
        assert!(validate_port_range(443, 80).is_err());
    }

    #[test]
    fn test_validate_interface() {
        assert!(validate_interface("eth0").is_ok());
        assert!(validate_interface("enp0s31f6").is_ok());
        assert!(validate_interface("br-lan.10").is_ok());
        assert!(validate_interface("wg_vpn").is_ok());
    }

    #[test]
    fn test_validate_interface_rejects_bad_names() {
        assert!(validate_interface("").is_err());
        assert!(validate_interface("..").is_err());
        assert!(validate_interface("averyveryverylongname").is_err());
        assert!(validate_interface("eth0\n").is_err());
        assert!(validate_interface("eth0\"").is_err());
        assert!(validate_interface("eth 0").is_err());
    }
}
