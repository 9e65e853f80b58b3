use super::ProbeError;
use rustls::pki_types::ServerName;
use std::{fmt, net::IpAddr};

/// Host and port resolved from a probe target string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    host: String,
    port: u16,
}

impl ProbeTarget {
    /// Split `target` into host and port, appending `default_port` when none is embedded
    ///
    /// Accepts `host`, `host:port`, `[v6]:port`, `[v6]` and bare IP literals.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::InvalidTarget` for empty hosts or unparseable ports
    pub fn parse(target: &str, default_port: u16) -> Result<Self, ProbeError> {
        let invalid = |reason: &str| ProbeError::InvalidTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty target"));
        }

        // bare IPv6 literals contain ':' but carry no port
        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Ok(Self {
                host: ip.to_string(),
                port: default_port,
            });
        }

        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| invalid("missing closing bracket"))?;
            match after {
                "" => (host, None),
                _ => {
                    let port = after
                        .strip_prefix(':')
                        .ok_or_else(|| invalid("unexpected characters after bracket"))?;
                    (host, Some(port))
                }
            }
        } else {
            match trimmed.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (trimmed, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or_else(|| invalid("invalid port"))?,
            None => default_port,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Address in `host:port` form, bracketing IPv6 literals
    #[must_use]
    pub fn authority(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{ip}]:{}", self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    /// SNI value for the handshake, the bare host
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::InvalidTarget` if the host is not a valid DNS name or IP address
    pub fn server_name(&self) -> Result<ServerName<'static>, ProbeError> {
        self.host.parse::<IpAddr>().map_or_else(
            |_| {
                ServerName::try_from(self.host.clone()).map_err(|_| ProbeError::InvalidTarget {
                    target: self.authority(),
                    reason: format!("invalid server name: {}", self.host),
                })
            },
            |ip| Ok(ServerName::from(ip)),
        )
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn test_hostname_gets_default_port() {
        let target = ProbeTarget::parse("example.com", 443).unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), 443);
        assert_eq!(target.authority(), "example.com:443");
    }

    #[test]
    fn test_embedded_port_is_kept() {
        let target = ProbeTarget::parse("example.com:8443", 443).unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), 8443);
    }

    #[test]
    fn test_ipv4() {
        let target = ProbeTarget::parse("127.0.0.1", 9443).unwrap();
        assert_eq!(target.authority(), "127.0.0.1:9443");

        let target = ProbeTarget::parse("127.0.0.1:1", 9443).unwrap();
        assert_eq!(target.port(), 1);
    }

    #[test]
    fn test_ipv6() {
        let target = ProbeTarget::parse("::1", 443).unwrap();
        assert_eq!(target.host(), "::1");
        assert_eq!(target.authority(), "[::1]:443");

        let target = ProbeTarget::parse("[2001:db8::1]:8443", 443).unwrap();
        assert_eq!(target.host(), "2001:db8::1");
        assert_eq!(target.port(), 8443);

        let target = ProbeTarget::parse("[::1]", 8443).unwrap();
        assert_eq!(target.port(), 8443);
    }

    #[test]
    fn test_invalid_targets() {
        assert!(ProbeTarget::parse("", 443).is_err());
        assert!(ProbeTarget::parse("   ", 443).is_err());
        assert!(ProbeTarget::parse(":443", 443).is_err());
        assert!(ProbeTarget::parse("example.com:https", 443).is_err());
        assert!(ProbeTarget::parse("example.com:0", 443).is_err());
        assert!(ProbeTarget::parse("example.com:70000", 443).is_err());
        assert!(ProbeTarget::parse("[::1", 443).is_err());
        assert!(ProbeTarget::parse("[::1]x", 443).is_err());
    }

    #[test]
    fn test_server_name() {
        assert!(
            ProbeTarget::parse("db.example.com", 443)
                .unwrap()
                .server_name()
                .is_ok()
        );
        assert!(
            ProbeTarget::parse("192.168.1.100", 443)
                .unwrap()
                .server_name()
                .is_ok()
        );
        assert!(
            ProbeTarget::parse("2001:db8::1", 443)
                .unwrap()
                .server_name()
                .is_ok()
        );
        assert!(
            ProbeTarget::parse("invalid host name with spaces", 443)
                .unwrap()
                .server_name()
                .is_err()
        );
    }
}
