//! Channel name resolution

use std::net::{SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

use super::BindError;

/// A named channel published at a fixed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    #[serde(rename = "@name")]
    pub name: String,
    /// `host:port` of the publisher
    #[serde(rename = "@address")]
    pub address: String,
}

/// Maps channel names to publisher addresses.
///
/// Names not listed are tried as a literal `host:port`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDirectory {
    #[serde(rename = "channel", default)]
    pub entries: Vec<ChannelEntry>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the address for `name`.
    pub fn insert(&mut self, name: impl Into<String>, address: impl Into<String>) {
        let name = name.into();
        let address = address.into();
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.address = address,
            None => self.entries.push(ChannelEntry { name, address }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.address.as_str())
    }

    /// Resolve `name` to a socket address.
    pub fn resolve(&self, name: &str) -> Result<SocketAddr, BindError> {
        if name.is_empty() {
            return Err(BindError::EmptyName);
        }

        let address = self.get(name).unwrap_or(name);
        // A bare name without a port is not an address
        if !address.contains(':') {
            return Err(BindError::UnknownChannel(name.to_string()));
        }

        address
            .to_socket_addrs()
            .map_err(|e| BindError::Resolve {
                channel: name.to_string(),
                reason: e.to_string(),
            })?
            .next()
            .ok_or_else(|| BindError::Resolve {
                channel: name.to_string(),
                reason: format!("'{}' resolved to no addresses", address),
            })
    }
}
