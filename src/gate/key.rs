//! Counter key generation and handling.

use super::request::ClientRequest;

/// A key that uniquely identifies a client's counter entry in the store.
///
/// The key is composed of the gate's configured prefix and the client's
/// network address, rendered as `{prefix}::{address}`. Two distinct client
/// addresses never share an entry; the same address under the same prefix
/// collides intentionally across gate instances, since the prefix is expected
/// to be unique per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The configured key prefix
    pub prefix: String,
    /// The client address this counter belongs to
    pub address: String,
}

impl CounterKey {
    /// Create a counter key for a request under the given prefix.
    pub fn new(prefix: &str, request: &ClientRequest) -> Self {
        Self {
            prefix: prefix.to_string(),
            address: request.client_address(),
        }
    }

    /// Convert the key to its store representation.
    pub fn to_store_key(&self) -> String {
        format!("{}::{}", self.prefix, self.address)
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_store_key())
    }
}
