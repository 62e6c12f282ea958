//! Lab 7-2: CoreDNS pinned to a system node group.
//!
//! The node group carries a `system-nodegroup=true` label and the CoreDNS
//! deployment is overwritten with a node affinity requiring that label.
//! With only one labeled node, draining it takes cluster DNS down with it.

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
        CapacityStrategy::ManagedNodeGroup(
            ManagedNodeGroup::new("trbsht-nodegroup-72", 1).with_label("system-nodegroup", "true"),
        ),
    )?;
    builder.apply_manifest(
        graph,
        Manifest::from_yaml("coredns", fixtures::COREDNS_DEPLOYMENT)?.with_overwrite(true),
    )?;
    builder.finish(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkConfig, NetworkProvisioner};
    use serde_json::json;

    fn caller() -> Identity {
        Identity::new(
            "AIDAEXAMPLE",
            "arn:aws:iam::111122223333:user/lab-admin",
            "111122223333",
        )
    }

    #[test]
    fn coredns_overwrite_lands_after_the_labeled_node_group() {
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

        let nodegroup = graph.get("TrbshtNodegroup72").unwrap();
        assert_eq!(
            nodegroup.properties["Labels"]["system-nodegroup"],
            json!("true")
        );

        let manifest = graph.get("ManifestCoredns").unwrap();
        assert_eq!(manifest.properties["Overwrite"], json!(true));
        assert!(graph
            .dependencies_of("ManifestCoredns")
            .contains(&"TrbshtNodegroup72".to_string()));
        graph.validate().unwrap();
    }
}
