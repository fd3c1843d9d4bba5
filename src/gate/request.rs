//! Request and response descriptors exchanged with the host pipeline.

use std::collections::HashMap;
use std::net::IpAddr;

/// Bucket used when no client address can be determined for a request.
///
/// Address-less requests all share one counter rather than failing the
/// request; protected-route limiting degrades gracefully.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// The slice of an incoming request the gate needs to make a decision:
/// the path being requested and the originating network address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    path: String,
    remote_addr: Option<IpAddr>,
}

impl ClientRequest {
    /// Create a request descriptor from a path and an optional client address.
    pub fn new(path: impl Into<String>, remote_addr: Option<IpAddr>) -> Self {
        Self {
            path: path.into(),
            remote_addr,
        }
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The originating network address, if one was determined.
    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    /// The client address used for counter keying, falling back to the shared
    /// [`UNKNOWN_ADDRESS`] bucket when no address is available.
    pub fn client_address(&self) -> String {
        match self.remote_addr {
            Some(addr) => addr.to_string(),
            None => UNKNOWN_ADDRESS.to_string(),
        }
    }
}

/// A response descriptor handed back to the host pipeline: status code,
/// headers, and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: String,
}

impl GateResponse {
    /// Create a response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Add a header to the response.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The canonical rejection response for a rate-limited request: 429 with a
    /// plain-text body reporting how long the client should wait.
    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        Self::new(
            429,
            format!(
                "Rate limit exceeded. Try again in {} seconds.",
                retry_after_secs
            ),
        )
        .with_header("Content-Type", "text/plain; charset=utf-8")
    }
}
