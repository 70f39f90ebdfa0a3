//! Input validation and sanitization
//!
//! Values typed by the user end up in remote setup scripts, so they are
//! checked before a container spec is ever handed to the transport.

use crate::container::ServerCredentials;
use crate::error::{VpnError, VpnResult};
use std::net::IpAddr;

/// Maximum length for configuration values
const MAX_CONFIG_VALUE_LEN: usize = 255;

/// AEAD ciphers accepted by the ShadowSocks container
pub const SS_CIPHERS: &[&str] = &[
    "chacha20-ietf-poly1305",
    "aes-256-gcm",
    "aes-192-gcm",
    "aes-128-gcm",
];

/// Validate a TCP/UDP port
pub fn validate_port(port: u16) -> VpnResult<()> {
    if port == 0 {
        return Err(VpnError::InvalidParameter(
            "Port must be between 1 and 65535".to_string()
        ));
    }
    Ok(())
}

/// Parse and validate a port typed as text
pub fn parse_port(text: &str) -> VpnResult<u16> {
    let port = text.trim().parse::<u16>()
        .map_err(|_| VpnError::InvalidParameter(format!("Invalid port: {}", text)))?;
    validate_port(port)?;
    Ok(port)
}

/// Validate ShadowSocks cipher name
pub fn validate_ss_cipher(cipher: &str) -> VpnResult<()> {
    if !SS_CIPHERS.contains(&cipher) {
        return Err(VpnError::InvalidParameter(
            format!("Unsupported ShadowSocks cipher: {}", cipher)
        ));
    }
    Ok(())
}

/// Validate the site a Cloak server masquerades as.
///
/// Accepts a bare hostname or one prefixed with `http://` / `https://`.
pub fn validate_masking_site(site: &str) -> VpnResult<()> {
    let host = site
        .strip_prefix("https://")
        .or_else(|| site.strip_prefix("http://"))
        .unwrap_or(site);
    let host = host.trim_end_matches('/');
    validate_hostname(host)
}

/// Characters that could escape a quoted value in a remote setup script
const SCRIPT_METACHARS: &[char] = &['`', '$', '"', '\'', '\\', ';', '|', '&', '<', '>'];

/// Check a free-text value that ends up in a remote setup script.
///
/// Returns the trimmed value.
pub fn sanitize_config_value(value: &str) -> VpnResult<String> {
    let value = value.trim();

    if value.len() > MAX_CONFIG_VALUE_LEN {
        return Err(VpnError::InvalidParameter(
            format!("Value too long (max {} characters)", MAX_CONFIG_VALUE_LEN)
        ));
    }

    if let Some(c) = value.chars().find(|c| c.is_control() || SCRIPT_METACHARS.contains(c)) {
        return Err(VpnError::InvalidParameter(
            format!("Value contains forbidden character {:?}", c)
        ));
    }

    Ok(value.to_string())
}

/// Longest DNS name accepted for a server or masking site
const MAX_HOSTNAME_LEN: usize = 253;

/// Longest single DNS label
const MAX_LABEL_LEN: usize = 63;

/// Validate a server address or masking site: an IP literal or a DNS name
pub fn validate_hostname(host: &str) -> VpnResult<()> {
    if host.is_empty() {
        return Err(VpnError::InvalidParameter(
            "Server address cannot be empty".to_string()
        ));
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    if host.len() > MAX_HOSTNAME_LEN {
        return Err(VpnError::InvalidParameter(
            format!("Server address too long (max {} characters)", MAX_HOSTNAME_LEN)
        ));
    }

    for label in host.split('.') {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(VpnError::InvalidParameter(
                format!("Invalid server address '{}'", host)
            ));
        }
    }

    Ok(())
}

/// Validate credentials before any remote operation is attempted
pub fn validate_credentials(credentials: &ServerCredentials) -> VpnResult<()> {
    validate_hostname(&credentials.host_name)?;
    validate_port(credentials.port)?;

    if credentials.user_name.is_empty() {
        return Err(VpnError::InvalidParameter(
            "User name cannot be empty".to_string()
        ));
    }
    sanitize_config_value(&credentials.user_name)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_validation() {
        assert!(validate_port(1).is_ok());
        assert!(validate_port(443).is_ok());
        assert!(validate_port(0).is_err());

        assert_eq!(parse_port(" 1194 ").unwrap(), 1194);
        assert!(parse_port("70000").is_err());
        assert!(parse_port("443; reboot").is_err());
        assert!(parse_port("").is_err());
    }

    #[test]
    fn test_cipher_validation() {
        assert!(validate_ss_cipher("chacha20-ietf-poly1305").is_ok());
        assert!(validate_ss_cipher("aes-128-gcm").is_ok());
        assert!(validate_ss_cipher("rc4-md5").is_err());
        assert!(validate_ss_cipher("").is_err());
    }

    #[test]
    fn test_masking_site_validation() {
        assert!(validate_masking_site("example.com").is_ok());
        assert!(validate_masking_site("https://tile.openstreetmap.org/").is_ok());
        assert!(validate_masking_site("http://example.com").is_ok());
        assert!(validate_masking_site("example.com/$(id)").is_err());
        assert!(validate_masking_site("").is_err());
    }

    #[test]
    fn test_sanitize_config_value() {
        assert_eq!(sanitize_config_value(" root ").unwrap(), "root");
        assert!(sanitize_config_value("admin$(id)").is_err());
        assert!(sanitize_config_value("ops'; reboot").is_err());
        assert!(sanitize_config_value("root\nrm -rf /").is_err());
        assert!(sanitize_config_value(&"a".repeat(256)).is_err());
    }

    #[test]
    fn test_server_address_validation() {
        assert!(validate_hostname("vpn.example.net").is_ok());
        assert!(validate_hostname("203.0.113.17").is_ok());
        assert!(validate_hostname("2001:db8::1").is_ok());
        assert!(validate_hostname("my-vps-01").is_ok());

        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("vpn..example.net").is_err());
        assert!(validate_hostname("-vps.example.net").is_err());
        assert!(validate_hostname("vps-.example.net").is_err());
        assert!(validate_hostname(&format!("{}.example.net", "a".repeat(64))).is_err());
        assert!(validate_hostname("vps.example.net && reboot").is_err());
    }

    #[test]
    fn test_masking_site_rejects_paths_and_ports() {
        assert!(validate_masking_site("https://www.bing.com/").is_ok());
        assert!(validate_masking_site("https://www.bing.com/search").is_err());
        assert!(validate_masking_site("example.com:8443").is_err());
        assert!(validate_masking_site("https://").is_err());
    }

    #[test]
    fn test_credentials_validation() {
        let mut creds = ServerCredentials::new("198.51.100.4", "root", "secret");
        assert!(validate_credentials(&creds).is_ok());

        creds.user_name.clear();
        assert!(validate_credentials(&creds).is_err());

        creds.user_name = "root".to_string();
        creds.port = 0;
        assert!(validate_credentials(&creds).is_err());
    }
}
