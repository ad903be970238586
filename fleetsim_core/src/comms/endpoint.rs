//! Endpoint strings of the form `tcp://host:port`.
//!
//! Endpoints travel through the directory as opaque strings; only the edges
//! of the fabric parse them back into socket addresses.

use std::net::SocketAddr;

use crate::error::{FleetError, FleetResult};

/// Well-known TCP port of the directory REP socket.
pub const DEFAULT_DIRECTORY_PORT: u16 = 23700;

/// Default directory endpoint on the local host.
pub fn default_directory_endpoint() -> String {
    format!("tcp://127.0.0.1:{DEFAULT_DIRECTORY_PORT}")
}

/// Format a bound socket address as a `tcp://` endpoint string.
pub fn format_tcp_endpoint(addr: &SocketAddr) -> String {
    format!("tcp://{addr}")
}

/// Parse a `tcp://host:port` endpoint back into a socket address.
pub fn parse_tcp_endpoint(endpoint: &str) -> FleetResult<SocketAddr> {
    let rest = endpoint.strip_prefix("tcp://").ok_or_else(|| {
        FleetError::transport(format!("unsupported endpoint `{endpoint}` (expected tcp://)"))
    })?;
    rest.parse()
        .map_err(|e| FleetError::transport(format!("malformed endpoint `{endpoint}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let addr: SocketAddr = "127.0.0.1:23700".parse().unwrap();
        let ep = format_tcp_endpoint(&addr);
        assert_eq!(ep, "tcp://127.0.0.1:23700");
        assert_eq!(parse_tcp_endpoint(&ep).unwrap(), addr);
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(parse_tcp_endpoint("udp://127.0.0.1:1").is_err());
        assert!(parse_tcp_endpoint("127.0.0.1:1").is_err());
        assert!(parse_tcp_endpoint("tcp://not-an-addr").is_err());
    }
}
