//! Client identity derived from hostname and process id

use display_bridge_shared::defaults;
use std::fmt;
use std::io;

/// Broker client identity, unique per host and process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    hostname: String,
    id: String,
}

impl ClientIdentity {
    pub fn new(hostname: impl Into<String>, pid: u32) -> Self {
        let hostname = hostname.into();
        let id = format!("{}-{}-{}", defaults::CLIENT_ID_PREFIX, hostname, pid);
        Self { hostname, id }
    }

    /// Derive the identity for this process
    pub fn detect() -> io::Result<Self> {
        let hostname = hostname::get()?.to_string_lossy().into_owned();
        if hostname.is_empty() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "hostname is empty"));
        }
        Ok(Self::new(hostname, std::process::id()))
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
