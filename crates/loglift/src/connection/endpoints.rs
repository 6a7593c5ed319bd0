//! 🧭 Server endpoints: `"http://a:9200;http://b:9200"` in, an ordered list of (scheme, host, port) out.
//!
//! The config string is semicolon-delimited because that's how the ops folks wrote it in 2018
//! and nobody has been brave enough to change it. Whitespace around entries is forgiven.
//! A trailing `;` is forgiven. An entry that isn't a URL is NOT forgiven. 🦆

use std::fmt;

use url::Url;

use crate::error::ConfigurationError;

/// 📡 One backend node address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ServerEndpoint {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// 🔍 Parses a single `scheme://host[:port]` entry.
    ///
    /// Supported schemes: `http`, `https`, `tcp`. Missing ports fall back to 9200 for the
    /// HTTP family and 9300 for `tcp`, the two numbers every search-cluster operator dreams in.
    pub fn parse(entry: &str) -> Result<Self, ConfigurationError> {
        let entry = entry.trim();
        let invalid = |reason: String| ConfigurationError::InvalidServer {
            entry: entry.to_string(),
            reason,
        };

        let url = Url::parse(entry).map_err(|e| invalid(e.to_string()))?;
        let scheme = url.scheme().to_ascii_lowercase();
        let default_port = match scheme.as_str() {
            "http" | "https" => 9200,
            "tcp" => 9300,
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        };
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?;
        if !matches!(url.path(), "" | "/") {
            return Err(invalid(format!(
                "path '{}' is not supported, requests always go to the server root",
                url.path()
            )));
        }

        // 🔧 `Url::port` hides a port that equals the scheme's well-known one (`:80`), so
        // look at the raw authority before falling back to the cluster default
        let port = url
            .port()
            .or_else(|| explicit_port(entry))
            .unwrap_or(default_port);
        Ok(Self::new(scheme, host, port))
    }

    /// 🔗 Base URL for HTTP requests, no trailing slash.
    pub fn base_url(&self) -> String {
        self.to_string()
    }

    /// 🔌 `host:port`, the way socket APIs like it.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn explicit_port(entry: &str) -> Option<u16> {
    let (_, rest) = entry.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let (host, port) = authority.rsplit_once(':')?;
    if host.is_empty() || port.ends_with(']') {
        return None;
    }
    port.parse().ok()
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// 📋 Parses the semicolon-delimited server list, preserving order.
pub fn parse_server_list(server_uris: &str) -> Result<Vec<ServerEndpoint>, ConfigurationError> {
    let endpoints = server_uris
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ServerEndpoint::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if endpoints.is_empty() {
        return Err(ConfigurationError::NoServers);
    }
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_two_servers_walk_in_and_keep_their_place_in_line() {
        let endpoints = parse_server_list("http://a:9200;http://b:9200").unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0], ServerEndpoint::new("http", "a", 9200));
        assert_eq!(endpoints[1], ServerEndpoint::new("http", "b", 9200));
    }

    #[test]
    fn the_one_where_whitespace_and_trailing_semicolons_are_forgiven() {
        let endpoints = parse_server_list(" https://search.internal ; tcp://10.0.0.7 ;").unwrap();
        assert_eq!(endpoints[0].to_string(), "https://search.internal:9200");
        assert_eq!(endpoints[1].to_string(), "tcp://10.0.0.7:9300");
        assert_eq!(endpoints[1].authority(), "10.0.0.7:9300");
    }

    #[test]
    fn the_one_where_an_empty_list_is_a_configuration_error() {
        assert!(matches!(parse_server_list(""), Err(ConfigurationError::NoServers)));
        assert!(matches!(parse_server_list(" ; ;"), Err(ConfigurationError::NoServers)));
    }

    #[test]
    fn the_one_where_garbage_entries_are_not_forgiven() {
        let err = parse_server_list("http://ok:9200;not a url").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidServer { .. }));

        let err = parse_server_list("ftp://files:21").unwrap_err();
        match err {
            ConfigurationError::InvalidServer { reason, .. } => assert!(reason.contains("ftp")),
            other => panic!("💀 expected InvalidServer, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_port_80_is_taken_at_its_word() {
        let endpoints = parse_server_list("http://proxy.internal:80;https://edge:443/").unwrap();
        assert_eq!(endpoints[0].port, 80);
        assert_eq!(endpoints[1].port, 443);
    }

    #[test]
    fn the_one_where_a_proxy_path_is_refused_instead_of_quietly_dropped() {
        let err = parse_server_list("http://a:9200;https://gateway.internal/es-proxy").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidServer { ref entry, .. } if entry == "https://gateway.internal/es-proxy"
        ));
        assert!(ServerEndpoint::parse("http://a:9200/").is_ok());
    }
}
