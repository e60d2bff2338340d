use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use crate::config::Config;
use crate::models::{
    platform, Defaults, Group, Host, ResolvedHost, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS,
};

/// Simple file-backed inventory: hosts, groups and defaults.
///
/// Attribute resolution order (highest → lowest priority):
/// 1. Host `data`
/// 2. Groups in declared order, each followed depth-first by its parents
/// 3. Defaults `data`
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: BTreeMap<String, Host>,
    groups: HashMap<String, Group>,
    defaults: Defaults,
}

impl Inventory {
    /// Load hosts, groups and defaults from the files named in the config.
    /// The groups and defaults files are optional.
    pub fn load(cfg: &Config) -> Result<Self> {
        let hosts_path = cfg.resolve(&cfg.inventory.hosts_file);
        let hosts = std::fs::read_to_string(&hosts_path)
            .with_context(|| format!("Failed to read hosts file {}", hosts_path.display()))?;
        let groups = read_optional(&cfg.resolve(&cfg.inventory.groups_file))?;
        let defaults = read_optional(&cfg.resolve(&cfg.inventory.defaults_file))?;

        let mut inventory = Self::from_yaml(&hosts, groups.as_deref(), defaults.as_deref())?;

        // Environment credentials only fill gaps the inventory leaves
        if inventory.defaults.params.username.is_none() {
            inventory.defaults.params.username = cfg.default_username.clone();
        }
        if inventory.defaults.params.password.is_none() {
            inventory.defaults.params.password = cfg.default_password.clone();
        }

        tracing::info!(
            "Inventory loaded: {} hosts, {} groups",
            inventory.hosts.len(),
            inventory.groups.len()
        );
        Ok(inventory)
    }

    /// Build an inventory from YAML documents
    pub fn from_yaml(hosts: &str, groups: Option<&str>, defaults: Option<&str>) -> Result<Self> {
        let hosts: BTreeMap<String, Host> = parse_map(hosts).context("Invalid hosts file")?;
        let groups: BTreeMap<String, Group> = match groups {
            Some(g) => parse_map(g).context("Invalid groups file")?,
            None => BTreeMap::new(),
        };
        let defaults: Defaults = match defaults {
            Some(d) if !d.trim().is_empty() => {
                serde_yaml::from_str(d).context("Invalid defaults file")?
            }
            _ => Defaults::default(),
        };

        Ok(Self::from_parts(hosts, groups, defaults))
    }

    pub fn from_parts(
        hosts: BTreeMap<String, Host>,
        groups: BTreeMap<String, Group>,
        defaults: Defaults,
    ) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|(name, mut host)| {
                host.name = name.clone();
                (name, host)
            })
            .collect();
        let groups = groups
            .into_iter()
            .map(|(name, mut group)| {
                group.name = name.clone();
                (name, group)
            })
            .collect();

        Self { hosts, groups, defaults }
    }

    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.hosts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Keep only the named hosts. Unknown names are logged and ignored.
    pub fn filter_names(&self, names: &[String]) -> Self {
        for name in names {
            if !self.hosts.contains_key(name) {
                tracing::warn!("Host filter: {} is not in the inventory", name);
            }
        }
        self.filter(|host| names.iter().any(|n| n == &host.name))
    }

    /// Keep only hosts that belong to a group, directly or through a parent
    pub fn filter_group(&self, group: &str) -> Self {
        self.filter(|host| {
            self.group_chain(&host.groups)
                .iter()
                .any(|g| g.name == group)
        })
    }

    fn filter(&self, keep: impl Fn(&Host) -> bool) -> Self {
        Self {
            hosts: self
                .hosts
                .iter()
                .filter(|(_, h)| keep(h))
                .map(|(n, h)| (n.clone(), h.clone()))
                .collect(),
            groups: self.groups.clone(),
            defaults: self.defaults.clone(),
        }
    }

    /// Resolve a host's connection parameters and data through its groups and defaults
    pub fn resolve(&self, name: &str) -> Result<ResolvedHost> {
        let host = self
            .hosts
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Host not found: {}", name))?;
        let chain = self.group_chain(&host.groups);

        // Merge data lowest priority first so higher layers overwrite
        let mut data: HashMap<String, Value> = self.defaults.data.clone();
        for group in chain.iter().rev() {
            for (key, value) in &group.data {
                data.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &host.data {
            data.insert(key.clone(), value.clone());
        }

        // First layer that sets a field wins
        let defaults = &self.defaults;
        macro_rules! pick {
            ($field:ident) => {
                host.params
                    .$field
                    .clone()
                    .or_else(|| chain.iter().find_map(|g| g.params.$field.clone()))
                    .or_else(|| defaults.params.$field.clone())
            };
        }

        let timeout = host
            .connection_options
            .timeout
            .or_else(|| chain.iter().find_map(|g| g.connection_options.timeout))
            .or(defaults.connection_options.timeout)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(ResolvedHost {
            name: host.name.clone(),
            hostname: pick!(hostname).unwrap_or_else(|| host.name.clone()),
            port: pick!(port).unwrap_or(DEFAULT_PORT),
            username: pick!(username),
            password: pick!(password),
            platform: pick!(platform).unwrap_or_else(|| platform::JUNOS.to_string()),
            timeout,
            groups: chain.iter().map(|g| g.name.clone()).collect(),
            data,
        })
    }

    /// Walk groups depth-first in declared order, parents after children.
    /// Each group appears once; unknown groups are skipped, cycles stop the walk.
    fn group_chain(&self, roots: &[String]) -> Vec<&Group> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        for name in roots {
            self.visit_group(name, &mut visited, &mut chain);
        }
        chain
    }

    fn visit_group<'a>(
        &'a self,
        name: &str,
        visited: &mut HashSet<String>,
        chain: &mut Vec<&'a Group>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        let Some(group) = self.groups.get(name) else {
            tracing::warn!("Group {} is referenced but not defined", name);
            return;
        };
        chain.push(group);
        for parent in &group.groups {
            self.visit_group(parent, visited, chain);
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        tracing::debug!("Optional inventory file {} not found", path.display());
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Some(content))
}

/// An empty YAML document is an empty map
fn parse_map<T: serde::de::DeserializeOwned>(content: &str) -> Result<BTreeMap<String, T>> {
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: Option<BTreeMap<String, T>> = serde_yaml::from_str(content)?;
    Ok(parsed.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOSTS: &str = r#"
srx1:
  hostname: 192.0.2.1
  groups: [dc1, firewalls]
  data:
    addressbook:
      - name: web
        prefix: 198.51.100.10/32
srx2:
  hostname: 192.0.2.2
  port: 22
  groups: [dc2]
  data:
    site: override
"#;

    const GROUPS: &str = r#"
firewalls:
  username: netops
  data:
    role: firewall
dc1:
  groups: [emea]
  data:
    site: dc1
emea:
  password: region-secret
  data:
    site: emea
    region: emea
dc2:
  groups: [dc2]
"#;

    const DEFAULTS: &str = r#"
username: admin
password: default-secret
connection_options:
  timeout: 60
data:
  region: global
"#;

    fn inventory() -> Inventory {
        Inventory::from_yaml(HOSTS, Some(GROUPS), Some(DEFAULTS)).unwrap()
    }

    #[test]
    fn test_group_order_is_depth_first() {
        let inv = inventory();
        let srx1 = inv.resolve("srx1").unwrap();
        assert_eq!(srx1.groups, vec!["dc1", "emea", "firewalls"]);
    }

    #[test]
    fn test_data_priority() {
        let inv = inventory();
        let srx1 = inv.resolve("srx1").unwrap();
        // dc1 beats its parent emea
        assert_eq!(srx1.data["site"], "dc1");
        // emea beats defaults
        assert_eq!(srx1.data["region"], "emea");
        assert_eq!(srx1.data["role"], "firewall");
        assert!(srx1.get("addressbook").unwrap().is_array());

        let srx2 = inv.resolve("srx2").unwrap();
        assert_eq!(srx2.data["site"], "override");
        assert_eq!(srx2.data["region"], "global");
    }

    #[test]
    fn test_connection_params_inherit() {
        let inv = inventory();
        let srx1 = inv.resolve("srx1").unwrap();
        // dc1 chain (dc1, emea) comes before firewalls, so emea's password wins
        assert_eq!(srx1.password.as_deref(), Some("region-secret"));
        assert_eq!(srx1.username.as_deref(), Some("netops"));
        assert_eq!(srx1.port, DEFAULT_PORT);
        assert_eq!(srx1.timeout, 60);
        assert_eq!(srx1.platform, "junos");

        let srx2 = inv.resolve("srx2").unwrap();
        assert_eq!(srx2.port, 22);
        assert_eq!(srx2.username.as_deref(), Some("admin"));
    }

    #[test]
    fn test_group_cycle_terminates() {
        let inv = inventory();
        let srx2 = inv.resolve("srx2").unwrap();
        assert_eq!(srx2.groups, vec!["dc2"]);
    }

    #[test]
    fn test_missing_attribute() {
        let inv = inventory();
        let srx2 = inv.resolve("srx2").unwrap();
        let err = srx2.get("secpolicies").unwrap_err();
        assert_eq!(err.key, "secpolicies");
        assert_eq!(err.to_string(), "host srx2 has no attribute 'secpolicies'");
    }

    #[test]
    fn test_hostname_falls_back_to_name() {
        let inv = Inventory::from_yaml("edge1: {}\n", None, None).unwrap();
        let edge1 = inv.resolve("edge1").unwrap();
        assert_eq!(edge1.hostname, "edge1");
        assert!(edge1.username.is_none());
        assert_eq!(edge1.timeout, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_filters() {
        let inv = inventory();
        let by_name = inv.filter_names(&["srx2".to_string(), "nope".to_string()]);
        assert_eq!(by_name.host_names().collect::<Vec<_>>(), vec!["srx2"]);

        let by_group = inv.filter_group("emea");
        assert_eq!(by_group.host_names().collect::<Vec<_>>(), vec!["srx1"]);
        assert_eq!(by_group.len(), 1);
    }

    #[test]
    fn test_load_from_files() {
        let dir = std::env::temp_dir().join(format!("junos-push-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("inventory")).unwrap();
        std::fs::write(dir.join("inventory/hosts.yaml"), HOSTS).unwrap();
        std::fs::write(dir.join("inventory/groups.yaml"), GROUPS).unwrap();

        let cfg = Config {
            base_dir: dir.clone(),
            default_username: Some("env-user".to_string()),
            ..Config::default()
        };
        let inv = Inventory::load(&cfg).unwrap();
        assert_eq!(inv.len(), 2);
        // No defaults file, so the environment username fills the gap
        let srx2 = inv.resolve("srx2").unwrap();
        assert_eq!(srx2.username.as_deref(), Some("env-user"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
