//! Lab 8-2: worker nodes in undersized public subnets.
//!
//! This variant owns its network: /27 subnet tiers leave barely thirty
//! addresses per subnet, and the node group is placed in the public tier.
//! A pinned VPC CNI DaemonSet plus filler workloads then burn through the
//! remaining pod IPs. Control-plane logging is off here; the original lab
//! leaves it that way.

use crate::capacity::{CapacityStrategy, ManagedNodeGroup};
use crate::cluster::{ClusterBuilder, ClusterHandle, ClusterOptions};
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::identity::Identity;
use crate::manifest::{fixtures, Manifest};
use crate::network::{NetworkHandle, SubnetKind};

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
            logging: false,
            ..base
        },
    );
    builder.bind_network(network)?;
    builder.declare_cluster(graph)?;
    builder.map_caller(identity)?;
    builder.add_capacity(
        graph,
        CapacityStrategy::ManagedNodeGroup(
            ManagedNodeGroup::new("trbsht-nodegroup-82", 2)
                .with_label("system-nodegroup", "true")
                .in_subnets(SubnetKind::Public),
        ),
    )?;
    builder.apply_manifest(
        graph,
        Manifest::from_yaml("vpc-cni", fixtures::VPC_CNI_DAEMONSET)?.with_overwrite(true),
    )?;
    builder.apply_manifest(
        graph,
        Manifest::from_yaml("ip-pressure", fixtures::IP_PRESSURE_WORKLOADS)?.with_overwrite(true),
    )?;
    builder.finish(graph)
}
