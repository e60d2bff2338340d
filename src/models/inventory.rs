use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Canonical platform values
pub mod platform {
    pub const JUNOS: &str = "junos";
}

/// NETCONF-over-SSH port used when no layer sets one
pub const DEFAULT_PORT: u16 = 830;

/// Session timeout (seconds) used when no layer sets one
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection parameters shared by hosts, groups and defaults.
/// Every field is optional so a lower layer can fill it in.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionParams {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

/// Per-connection tuning
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionOptions {
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Host is a managed device entry from hosts.yaml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Host {
    #[serde(skip)]
    pub name: String,
    #[serde(flatten)]
    pub params: ConnectionParams,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub connection_options: ConnectionOptions,
}

/// Group carries attributes inherited by its member hosts (groups.yaml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Group {
    #[serde(skip)]
    pub name: String,
    #[serde(flatten)]
    pub params: ConnectionParams,
    /// Parent groups
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub connection_options: ConnectionOptions,
}

/// Defaults apply to every host after its own groups (defaults.yaml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(flatten)]
    pub params: ConnectionParams,
    #[serde(default)]
    pub data: HashMap<String, Value>,
    #[serde(default)]
    pub connection_options: ConnectionOptions,
}

/// ResolvedHost is a host with group and default inheritance applied.
/// This is what tasks operate on.
#[derive(Debug, Clone)]
pub struct ResolvedHost {
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub platform: String,
    pub timeout: u64,
    /// Every group the host belongs to, ancestors included, highest priority first
    pub groups: Vec<String>,
    pub data: HashMap<String, Value>,
}

impl ResolvedHost {
    /// Look up an inventory attribute, the equivalent of `host[key]`
    pub fn get(&self, key: &str) -> Result<&Value, MissingAttribute> {
        self.data
            .get(key)
            .ok_or_else(|| MissingAttribute::new(&self.name, key))
    }
}

/// Returned when a task references an attribute the host doesn't carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAttribute {
    pub host: String,
    pub key: String,
}

impl MissingAttribute {
    pub fn new(host: &str, key: &str) -> Self {
        Self {
            host: host.to_string(),
            key: key.to_string(),
        }
    }
}

impl std::fmt::Display for MissingAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host {} has no attribute '{}'", self.host, self.key)
    }
}

impl std::error::Error for MissingAttribute {}
