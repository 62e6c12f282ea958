//! Lab 9-4: persistent storage without a CSI driver.
//!
//! An EBS volume is provisioned and the cluster gets an OIDC provider, but
//! no EBS CSI driver is installed. Any pod that claims the volume stays
//! Pending until the student installs the add-on themselves.

use serde_json::json;

use crate::capacity::{CapacityStrategy, ManagedNodeGroup};
use crate::cluster::{ClusterBuilder, ClusterHandle, ClusterOptions};
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::identity::Identity;
use crate::network::NetworkHandle;

const VOLUME_AZ: &str = "ap-northeast-2a";

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
    builder.enable_oidc_provider(graph)?;
    builder.map_caller(identity)?;

    graph.declare(
        "PvEbs",
        "AWS::EC2::Volume",
        json!({
            "Size": 20,
            "AvailabilityZone": VOLUME_AZ,
            "Tags": [{ "Key": "Name", "Value": "pv-ebs" }],
        }),
    )?;

    builder.add_capacity(
        graph,
        CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("trbsht-nodegroup", 2)),
    )?;
    builder.finish(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{NetworkConfig, NetworkProvisioner};
    use serde_json::json as j;

    fn caller() -> Identity {
        Identity::new(
            "AIDAEXAMPLE",
            "arn:aws:iam::111122223333:user/lab-admin",
            "111122223333",
        )
    }

    #[test]
    fn volume_and_oidc_provider_exist_but_no_csi_driver() {
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

        let volume = graph.get("PvEbs").unwrap();
        assert_eq!(volume.properties["Size"], j!(20));
        assert_eq!(volume.properties["AvailabilityZone"], j!(VOLUME_AZ));

        assert!(graph.contains("OidcProvider"));
        // The gap the lab is about: nothing installs the CSI driver.
        assert!(!graph.contains("EbsCsiAddon"));
        graph.validate().unwrap();
    }
}
