use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
    /// No proxy; requests leave from the host's own address.
    Direct,
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyProtocol::Http => write!(f, "http"),
            ProxyProtocol::Https => write!(f, "https"),
            ProxyProtocol::Socks5 => write!(f, "socks5"),
            ProxyProtocol::Direct => write!(f, "direct"),
        }
    }
}

impl FromStr for ProxyProtocol {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(ProxyProtocol::Http),
            "https" => Ok(ProxyProtocol::Https),
            "socks5" | "socks5h" => Ok(ProxyProtocol::Socks5),
            "direct" => Ok(ProxyProtocol::Direct),
            _ => Err(format!("Unknown proxy protocol: {s}")),
        }
    }
}

/// Where a request should egress. Handed to adapters; carries no health state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyEndpoint {
    pub address: String,
    pub protocol: ProxyProtocol,
}

impl ProxyEndpoint {
    pub fn direct() -> Self {
        Self {
            address: "direct".into(),
            protocol: ProxyProtocol::Direct,
        }
    }

    /// Proxy URL usable by an HTTP client, `None` for direct egress.
    pub fn url(&self) -> Option<String> {
        match self.protocol {
            ProxyProtocol::Direct => None,
            p => Some(format!("{p}://{}", self.address)),
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.url() {
            Some(url) => f.write_str(&url),
            None => f.write_str("direct"),
        }
    }
}

impl FromStr for ProxyEndpoint {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("direct") {
            return Ok(ProxyEndpoint::direct());
        }
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| format!("Proxy must look like scheme://host:port: {s}"))?;
        let protocol: ProxyProtocol = scheme.parse()?;
        if protocol == ProxyProtocol::Direct {
            return Err(format!("Direct egress takes no address: {s}"));
        }
        let address = rest.trim_end_matches('/');
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| format!("Proxy is missing a port: {s}"))?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(format!("Invalid proxy address: {s}"));
        }
        Ok(ProxyEndpoint {
            address: address.to_string(),
            protocol,
        })
    }
}

/// A pooled proxy and its health. Only the proxy pool mutates this.
#[derive(Debug, Clone)]
pub struct Proxy {
    pub endpoint: ProxyEndpoint,
    pub consecutive_failures: u32,
    pub quarantined_until: Option<Instant>,
}

impl Proxy {
    pub fn new(endpoint: ProxyEndpoint) -> Self {
        Self {
            endpoint,
            consecutive_failures: 0,
            quarantined_until: None,
        }
    }

    pub fn is_quarantined(&self, now: Instant) -> bool {
        matches!(self.quarantined_until, Some(until) if until > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_endpoints() {
        let p: ProxyEndpoint = "http://10.0.0.1:8080".parse().unwrap();
        assert_eq!(p.protocol, ProxyProtocol::Http);
        assert_eq!(p.address, "10.0.0.1:8080");
        assert_eq!(p.url().unwrap(), "http://10.0.0.1:8080");

        let s: ProxyEndpoint = "socks5://user:pw@proxy.example:1080".parse().unwrap();
        assert_eq!(s.protocol, ProxyProtocol::Socks5);

        let d: ProxyEndpoint = "direct".parse().unwrap();
        assert!(d.url().is_none());
    }

    #[test]
    fn test_reject_bad_endpoints() {
        assert!("10.0.0.1:8080".parse::<ProxyEndpoint>().is_err());
        assert!("ftp://10.0.0.1:21".parse::<ProxyEndpoint>().is_err());
        assert!("http://10.0.0.1".parse::<ProxyEndpoint>().is_err());
        assert!("http://:80".parse::<ProxyEndpoint>().is_err());
    }
}
