//! Bridge address parsing
//!
//! Accepts `host:port`, `[v6-host]:port`, `:port` or a bare port number.
//! An IPv6 host must be bracketed.
//! The host defaults to the loopback address. Input that cannot be read
//! falls back to [`DEFAULT_PORT`] instead of failing, so a bad setting
//! degrades to the default rendezvous point.

use std::fmt;

/// Host used when the address does not name one
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when the address cannot be parsed
pub const DEFAULT_PORT: u16 = 47800;

/// Host and port every bridge instance rendezvouses on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BridgeAddress {
    host: String,
    port: u16,
}

impl BridgeAddress {
    /// Create an address from parts
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let host = if host.trim().is_empty() {
            DEFAULT_HOST.to_string()
        } else {
            host.trim().to_string()
        };
        Self { host, port }
    }

    /// Loopback address on `port`
    pub fn localhost(port: u16) -> Self {
        Self::new(DEFAULT_HOST, port)
    }

    /// Parse a configuration string, falling back to defaults
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if let Ok(port) = input.parse::<u16>() {
            return Self::localhost(port);
        }

        let Some((host, port)) = input.rsplit_once(':') else {
            tracing::warn!(
                "Unreadable bridge address '{}', using {}:{}",
                input,
                DEFAULT_HOST,
                DEFAULT_PORT
            );
            return Self::default();
        };

        let host = host.trim();
        let host = match host.strip_prefix('[') {
            Some(bracketed) => bracketed.strip_suffix(']'),
            // An IPv6 literal needs brackets before the port
            None if host.contains(':') => None,
            None => Some(host),
        };
        let Some(host) = host else {
            tracing::warn!(
                "Unreadable host in bridge address '{}', using {}:{}",
                input,
                DEFAULT_HOST,
                DEFAULT_PORT
            );
            return Self::default();
        };
        let port = port.trim().parse::<u16>().unwrap_or_else(|_| {
            tracing::warn!(
                "Unreadable port in bridge address '{}', using {}",
                input,
                DEFAULT_PORT
            );
            DEFAULT_PORT
        });

        Self::new(host, port)
    }

    /// Host name or IP literal
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Form accepted by `TcpStream::connect` and `TcpListener::bind`
    pub fn socket_pair(&self) -> (&str, u16) {
        (&self.host, self.port)
    }
}

impl Default for BridgeAddress {
    fn default() -> Self {
        Self::localhost(DEFAULT_PORT)
    }
}

impl fmt::Display for BridgeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<&str> for BridgeAddress {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_port() {
        assert_eq!(BridgeAddress::parse("9000"), BridgeAddress::localhost(9000));
        assert_eq!(BridgeAddress::parse(" 9001 ").port(), 9001);
    }

    #[test]
    fn test_parse_host_and_port() {
        let addr = BridgeAddress::parse("10.0.0.5:7000");
        assert_eq!(addr.host(), "10.0.0.5");
        assert_eq!(addr.port(), 7000);
        assert_eq!(addr.to_string(), "10.0.0.5:7000");
    }

    #[test]
    fn test_parse_empty_host() {
        assert_eq!(BridgeAddress::parse(":7000"), BridgeAddress::localhost(7000));
    }

    #[test]
    fn test_parse_ipv6() {
        let addr = BridgeAddress::parse("[::1]:7000");
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.port(), 7000);
        assert_eq!(addr.to_string(), "[::1]:7000");
    }

    #[test]
    fn test_parse_unbracketed_ipv6_falls_back() {
        assert_eq!(BridgeAddress::parse("::1"), BridgeAddress::default());
        assert_eq!(BridgeAddress::parse("fe80::1:9000"), BridgeAddress::default());
        assert_eq!(BridgeAddress::parse("[::1"), BridgeAddress::default());
        assert_eq!(BridgeAddress::parse("[fe80::1]:9000").host(), "fe80::1");
    }

    #[test]
    fn test_parse_failures_fall_back() {
        assert_eq!(BridgeAddress::parse("nonsense"), BridgeAddress::default());
        assert_eq!(BridgeAddress::parse(""), BridgeAddress::default());

        let addr = BridgeAddress::parse("hub.local:http");
        assert_eq!(addr.host(), "hub.local");
        assert_eq!(addr.port(), DEFAULT_PORT);

        assert_eq!(BridgeAddress::parse("70000").port(), DEFAULT_PORT);
    }
}
