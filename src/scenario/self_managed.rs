//! Lab 6-2: self-managed worker nodes.
//!
//! A plain scaling group runs a pinned EKS-optimized AMI and joins the
//! cluster through the bootstrap script. The node role skips the CNI and
//! registry policies on purpose; finding out why the nodes never go Ready
//! is the exercise.

use crate::capacity::{CapacityStrategy, SelfManagedGroup};
use crate::cluster::{ClusterBuilder, ClusterHandle, ClusterOptions};
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::identity::Identity;
use crate::network::NetworkHandle;

const NODE_AMI: &str = "ami-048f188129fbbcc9f";

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
        CapacityStrategy::SelfManaged(SelfManagedGroup {
            name: "self-managed-node-group".to_string(),
            instance_type: "t3.large".to_string(),
            image_id: NODE_AMI.to_string(),
            min_capacity: 1,
        }),
    )?;
    builder.finish(graph)
}
