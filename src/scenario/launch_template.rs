//! Labs 6-3 and 6-5: managed node groups bound to launch templates.
//!
//! Both variants pin the node group to an explicit template version. The
//! 6-5 variant then revises the template to a new AMI while the node group
//! keeps the original pin, so freshly scaled nodes boot the old image; an
//! nginx deployment with a zero-disruption budget makes the resulting
//! rollout wedge visible.

use crate::capacity::{
    CapacityStrategy, LaunchTemplate, LaunchTemplateRevision, ManagedNodeGroup, SelfManagedGroup,
};
use crate::cluster::{ClusterBuilder, ClusterHandle, ClusterOptions};
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::identity::Identity;
use crate::manifest::{fixtures, Manifest};
use crate::network::NetworkHandle;

const NODE_AMI: &str = "ami-048f188129fbbcc9f";
const REVISED_NODE_AMI: &str = "ami-0eada94f1ebaaa3a1";

/// Lab 6-3: node group pinned to the template's current version.
pub(crate) fn build_pinned(
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

    let template =
        LaunchTemplate::new("trbsht-ngrp-lt-63", NODE_AMI).declare(graph, "NodeLaunchTemplate")?;
    let pin = template.at_version(template.latest_version())?;

    builder.add_capacity(
        graph,
        CapacityStrategy::ManagedNodeGroup(
            ManagedNodeGroup::new("trbsht-nodegroup", 1).with_launch_template(pin),
        ),
    )?;
    builder.finish(graph)
}

/// Lab 6-5: template revised after the node group took its pin.
pub(crate) fn build_revised(
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

    let user_data = SelfManagedGroup::bootstrap_user_data(cluster_name);
    let mut template = LaunchTemplate::new("trbsht-ngrp-lt-65", NODE_AMI)
        .with_user_data(user_data.clone())
        .declare(graph, "NodeLaunchTemplate")?;
    // The node group stays on the original version; the revision below
    // only moves the template.
    let stale_pin = template.at_version(template.latest_version())?;
    template.revise(
        graph,
        LaunchTemplateRevision {
            image_id: Some(REVISED_NODE_AMI.to_string()),
            user_data: Some(user_data),
        },
    )?;

    builder.add_capacity(
        graph,
        CapacityStrategy::ManagedNodeGroup(
            ManagedNodeGroup::new("trbsht-nodegroup", 1).with_launch_template(stale_pin),
        ),
    )?;
    builder.apply_manifest(
        graph,
        Manifest::from_yaml("nginx-deployment", fixtures::NGINX_DEPLOYMENT)?,
    )?;
    builder.apply_manifest(graph, Manifest::from_yaml("nginx-pdb", fixtures::NGINX_PDB)?)?;
    builder.finish(graph)
}
