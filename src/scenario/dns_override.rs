//! Lab 8-4: broken DNS resolution.
//!
//! CoreDNS is overwritten with a Corefile that no longer forwards to the
//! VPC resolver, and a diagnostic pod arrives with a dnsConfig pointing at
//! a nameserver that does not exist. Two independent faults, one symptom.

use crate::capacity::{CapacityStrategy, ManagedNodeGroup};
use crate::cluster::{ClusterBuilder, ClusterHandle, ClusterOptions};
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::identity::Identity;
use crate::manifest::{fixtures, Manifest};
use crate::network::NetworkHandle;

pub(crate) fn build(
    graph: &mut ResourceGraph,
    cluster_name: &str,
    base: ClusterOptions,
    network: NetworkHandle,
    identity: &Identity,
) -> Result<ClusterHandle> {
    let mut builder = ClusterBuilder::new(
        cluster_name,
        ClusterOptions {
            open_intra_cluster_tcp: true,
            ..base
        },
    );
    builder.bind_network(network)?;
    builder.declare_cluster(graph)?;
    builder.map_caller(identity)?;
    builder.add_capacity(
        graph,
        CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("trbsht-nodegroup", 1)),
    )?;
    builder.apply_manifest(
        graph,
        Manifest::from_yaml("coredns-config", fixtures::COREDNS_CONFIGMAP_NO_FORWARD)?
            .with_overwrite(true),
    )?;
    builder.apply_manifest(graph, Manifest::from_yaml("nettools", fixtures::NETTOOLS_POD)?)?;
    builder.finish(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkConfig, NetworkProvisioner};

    fn caller() -> Identity {
        Identity::new(
            "AIDAEXAMPLE",
            "arn:aws:iam::111122223333:user/lab-admin",
            "111122223333",
        )
    }

    #[test]
    fn corefile_overwrite_drops_upstream_forwarding() {
        let mut graph = ResourceGraph::new();
        let network =
            NetworkProvisioner::provision(&mut graph, "Lab", &NetworkConfig::default()).unwrap();
        build(
            &mut graph,
            "trbsht-cluster",
            ClusterOptions::default(),
            network,
            &caller(),
        )
        .unwrap();

        let config = graph.get("ManifestCorednsConfig").unwrap();
        let corefile = config.properties["Manifest"][0]["data"]["Corefile"]
            .as_str()
            .unwrap();
        assert!(!corefile.contains("forward"));

        let nettools = graph.get("ManifestNettools").unwrap();
        assert_eq!(
            nettools.properties["Manifest"][0]["spec"]["dnsPolicy"],
            serde_json::json!("None")
        );
        graph.validate().unwrap();
    }
}
