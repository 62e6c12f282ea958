//! Configuration for a lab deployment.
//!
//! Loaded from an optional YAML file and merged over defaults. The file
//! only needs the keys it wants to change:
//!
//! ```yaml
//! scenario: alb-ingress
//! cluster:
//!   endpoint_public_cidrs:
//!     - 203.0.113.0/24
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::NetworkConfig;
use crate::scenario::{ScenarioKind, DEFAULT_CLUSTER_NAME};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which lab scenario to provision
    pub scenario: ScenarioKind,

    /// Cluster-level settings
    pub cluster: ClusterConfig,

    /// Shared network settings; ignored by scenarios that own their network
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scenario: ScenarioKind::SystemDns,
            cluster: ClusterConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

/// Cluster settings shared by every scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster name
    pub name: String,

    /// CIDRs allowed to reach the public API endpoint. The default keeps
    /// the lab-standard `0.0.0.0/0`; narrow it for anything that outlives
    /// a training session.
    pub endpoint_public_cidrs: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_CLUSTER_NAME.to_string(),
            endpoint_public_cidrs: vec!["0.0.0.0/0".to_string()],
        }
    }
}

impl Config {
    /// Load configuration, merging an optional file over the defaults.
    pub fn load(path: Option<&PathBuf>) -> Result<Config> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let raw = fs::read_to_string(path).map_err(|e| Error::ConfigLoad {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let config: Config = serde_yaml::from_str(&raw).map_err(|e| Error::ConfigLoad {
            path: path.clone(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot synthesize.
    pub fn validate(&self) -> Result<()> {
        if self.cluster.name.is_empty() {
            return Err(Error::Config("cluster name is empty".to_string()));
        }
        if self.cluster.endpoint_public_cidrs.is_empty() {
            return Err(Error::Config(
                "endpoint_public_cidrs is empty; the public endpoint would be unreachable"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_are_the_lab_baseline() {
        let config = Config::default();
        assert_eq!(config.cluster.name, "trbsht-cluster");
        assert_eq!(config.cluster.endpoint_public_cidrs, vec!["0.0.0.0/0"]);
        assert_eq!(config.network.max_azs, 2);
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scenario: alb-ingress").unwrap();
        writeln!(file, "cluster:").unwrap();
        writeln!(file, "  endpoint_public_cidrs:").unwrap();
        writeln!(file, "    - 203.0.113.0/24").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.scenario, ScenarioKind::AlbIngress);
        assert_eq!(config.cluster.endpoint_public_cidrs, vec!["203.0.113.0/24"]);
        // Untouched sections keep their defaults.
        assert_eq!(config.cluster.name, "trbsht-cluster");
    }

    #[test]
    fn missing_file_is_a_config_load_error() {
        let err = Config::load(Some(&PathBuf::from("/does/not/exist.yaml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad { .. }));
    }

    #[test]
    fn empty_endpoint_allow_list_is_rejected() {
        let mut config = Config::default();
        config.cluster.endpoint_public_cidrs.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
