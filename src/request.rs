//! Framework-independent parts of request handling.

use std::net::SocketAddr;

use bytes::Bytes;

/// Header echoing the address that was resolved.
pub const REFLECTED_IP_HEADER: &str = "X-Reflected-Ip";

/// Header carrying the original client address behind a proxy.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Work out which address a request asks about.
///
/// Whatever follows `base_path` in `path` is taken verbatim as the address.
/// An empty remainder means the client wants its own location, see
/// [`client_ip_for`].
pub fn resolve_ip(
    path: &str,
    base_path: &str,
    forwarded_for: Option<&str>,
    remote_addr: Option<&str>,
) -> String {
    let ip = path.replacen(base_path, "", 1);
    if ip.is_empty() {
        client_ip_for(forwarded_for, remote_addr)
    } else {
        ip
    }
}

/// Address of the client itself.
///
/// Uses the first entry of the forwarded-for header when present, else the
/// socket peer address without its port.
pub fn client_ip_for(forwarded_for: Option<&str>, remote_addr: Option<&str>) -> String {
    match forwarded_for.filter(|v| !v.trim().is_empty()) {
        Some(header) => header.split(',').next().unwrap_or_default().trim().to_string(),
        None => remote_addr.map(strip_port).unwrap_or_default(),
    }
}

fn strip_port(addr: &str) -> String {
    if let Ok(socket) = addr.parse::<SocketAddr>() {
        return socket.ip().to_string();
    }

    // Bare IPv6 literals contain colons but no port
    match addr.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host.to_string()
        }
        _ => addr.trim_start_matches('[').trim_end_matches(']').to_string(),
    }
}

/// Response to a lookup request, independent of the HTTP framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value for the `X-Reflected-Ip` header.
    pub reflected_ip: Option<String>,
    /// Value for the `Access-Control-Allow-Origin` header.
    pub allow_origin: Option<String>,
    /// Serialized record, empty on failure.
    pub body: Bytes,
}

impl GeoResponse {
    /// 200 carrying the record for `ip`.
    pub fn found(ip: &str, body: Bytes) -> Self {
        Self {
            status: 200,
            reflected_ip: Some(ip.to_string()),
            allow_origin: None,
            body,
        }
    }

    /// 500 with an empty body.
    pub fn failed() -> Self {
        Self {
            status: 500,
            reflected_ip: None,
            allow_origin: None,
            body: Bytes::new(),
        }
    }

    /// Attach the CORS origin when one is configured.
    pub fn with_allow_origin(mut self, allow_origin: Option<&str>) -> Self {
        self.allow_origin = allow_origin.filter(|o| !o.is_empty()).map(str::to_string);
        self
    }
}
