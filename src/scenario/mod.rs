//! The troubleshooting scenario catalog.
//!
//! Each variant provisions one deliberately broken (or about-to-break) EKS
//! lab environment. They all run through the same [`ClusterBuilder`]
//! skeleton and differ only in capacity strategy, extra resources and
//! workload manifests, so the interesting part of every module is the
//! handful of lines where it plants its particular landmine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterHandle, ClusterOptions};
use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use crate::identity::Identity;
use crate::network::{NetworkConfig, NetworkHandle, SubnetKind, SubnetPlanEntry};

mod alb_ingress;
mod bastion;
mod dns_override;
mod launch_template;
mod public_subnets;
mod self_managed;
mod storage;
mod system_dns;

/// Default cluster name, shared by every variant.
pub const DEFAULT_CLUSTER_NAME: &str = "trbsht-cluster";

/// Which lab environment to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Bastion host with an assumable admin role (lab 5-2)
    BastionAccess,
    /// Self-managed scaling group joining via the bootstrap script (lab 6-2)
    SelfManagedNodes,
    /// Managed node group pinned to a launch template (lab 6-3)
    LaunchTemplateNodes,
    /// Node group left on a stale launch-template version (lab 6-5)
    LaunchTemplateRevision,
    /// CoreDNS pinned to a labeled system node group (lab 7-2)
    SystemDns,
    /// Nodes in undersized public subnets, IP exhaustion ahead (lab 8-2)
    PublicSubnetNodes,
    /// Pod dnsConfig pointing at an unreachable nameserver (lab 8-4)
    DnsConfigOverride,
    /// ALB ingress with a restrictive backend security group (lab 9-2)
    AlbIngress,
    /// EBS-backed persistent volume without a CSI driver (lab 9-4)
    PersistentStorage,
}

impl ScenarioKind {
    /// Every variant, in catalog order.
    pub fn all() -> &'static [ScenarioKind] {
        &[
            ScenarioKind::BastionAccess,
            ScenarioKind::SelfManagedNodes,
            ScenarioKind::LaunchTemplateNodes,
            ScenarioKind::LaunchTemplateRevision,
            ScenarioKind::SystemDns,
            ScenarioKind::PublicSubnetNodes,
            ScenarioKind::DnsConfigOverride,
            ScenarioKind::AlbIngress,
            ScenarioKind::PersistentStorage,
        ]
    }

    /// Catalog name, used on the command line and in config files.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::BastionAccess => "bastion-access",
            ScenarioKind::SelfManagedNodes => "self-managed-nodes",
            ScenarioKind::LaunchTemplateNodes => "launch-template-nodes",
            ScenarioKind::LaunchTemplateRevision => "launch-template-revision",
            ScenarioKind::SystemDns => "system-dns",
            ScenarioKind::PublicSubnetNodes => "public-subnet-nodes",
            ScenarioKind::DnsConfigOverride => "dns-config-override",
            ScenarioKind::AlbIngress => "alb-ingress",
            ScenarioKind::PersistentStorage => "persistent-storage",
        }
    }

    /// One-line description for `list-scenarios`.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioKind::BastionAccess => {
                "bastion host, assumable admin role, no worker capacity"
            }
            ScenarioKind::SelfManagedNodes => {
                "self-managed scaling group with a reduced node policy set"
            }
            ScenarioKind::LaunchTemplateNodes => {
                "managed node group pinned to an explicit launch-template version"
            }
            ScenarioKind::LaunchTemplateRevision => {
                "launch template revised after the node group pinned the old version"
            }
            ScenarioKind::SystemDns => "CoreDNS node-affined to a labeled system node group",
            ScenarioKind::PublicSubnetNodes => {
                "nodes in /27 public subnets under pod IP pressure"
            }
            ScenarioKind::DnsConfigOverride => {
                "CoreDNS without upstream forwarding plus a broken pod dnsConfig"
            }
            ScenarioKind::AlbIngress => "ALB ingress controller fronting the 2048 game",
            ScenarioKind::PersistentStorage => "EBS persistent volume, OIDC provider, no CSI driver",
        }
    }

    /// Whether the variant provisions its own network instead of using the
    /// shared one.
    pub fn owns_network(&self) -> bool {
        matches!(self, ScenarioKind::PublicSubnetNodes)
    }

    /// The network configuration this variant wants. Most use whatever the
    /// deployment provides; the public-subnet variant insists on its own
    /// undersized /27 tiers because the exhaustion is the exercise.
    pub fn network_config(&self, shared: &NetworkConfig) -> NetworkConfig {
        if self.owns_network() {
            NetworkConfig {
                max_azs: 2,
                cidr: "10.0.0.0/16".to_string(),
                subnet_plan: vec![
                    SubnetPlanEntry::new("public", SubnetKind::Public).with_cidr_mask(27),
                    SubnetPlanEntry::new("private", SubnetKind::PrivateWithEgress)
                        .with_cidr_mask(27),
                ],
            }
        } else {
            shared.clone()
        }
    }

    /// Build the variant into the graph.
    ///
    /// `base` carries deployment-level cluster settings (version pin,
    /// endpoint allow-list); each variant layers its own toggles on top.
    pub fn build(
        &self,
        graph: &mut ResourceGraph,
        cluster_name: &str,
        base: ClusterOptions,
        network: NetworkHandle,
        identity: &Identity,
    ) -> Result<ClusterHandle> {
        tracing::info!(scenario = %self, cluster = cluster_name, "building scenario");
        match self {
            ScenarioKind::BastionAccess => {
                bastion::build(graph, cluster_name, base, network, identity)
            }
            ScenarioKind::SelfManagedNodes => {
                self_managed::build(graph, cluster_name, base, network, identity)
            }
            ScenarioKind::LaunchTemplateNodes => {
                launch_template::build_pinned(graph, cluster_name, base, network, identity)
            }
            ScenarioKind::LaunchTemplateRevision => {
                launch_template::build_revised(graph, cluster_name, base, network, identity)
            }
            ScenarioKind::SystemDns => {
                system_dns::build(graph, cluster_name, base, network, identity)
            }
            ScenarioKind::PublicSubnetNodes => {
                public_subnets::build(graph, cluster_name, base, network, identity)
            }
            ScenarioKind::DnsConfigOverride => {
                dns_override::build(graph, cluster_name, base, network, identity)
            }
            ScenarioKind::AlbIngress => {
                alb_ingress::build(graph, cluster_name, base, network, identity)
            }
            ScenarioKind::PersistentStorage => {
                storage::build(graph, cluster_name, base, network, identity)
            }
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ScenarioKind::all()
            .iter()
            .find(|k| k.name() == s)
            .copied()
            .ok_or_else(|| Error::UnknownScenario(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in ScenarioKind::all() {
            assert_eq!(&kind.name().parse::<ScenarioKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "not-a-lab".parse::<ScenarioKind>().unwrap_err();
        assert!(matches!(err, Error::UnknownScenario(_)));
    }

    #[test]
    fn only_the_public_subnet_variant_owns_its_network() {
        let owners: Vec<_> = ScenarioKind::all()
            .iter()
            .filter(|k| k.owns_network())
            .collect();
        assert_eq!(owners, vec![&ScenarioKind::PublicSubnetNodes]);
    }

    #[test]
    fn owned_network_uses_undersized_subnets() {
        let shared = NetworkConfig::default();
        let config = ScenarioKind::PublicSubnetNodes.network_config(&shared);
        assert!(config.subnet_plan.iter().all(|e| e.cidr_mask == Some(27)));
        // Everyone else takes the shared network as-is.
        let config = ScenarioKind::SystemDns.network_config(&shared);
        assert_eq!(config.subnet_plan.len(), shared.subnet_plan.len());
    }
}
