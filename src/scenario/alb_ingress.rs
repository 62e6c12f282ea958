//! Lab 9-2: ALB ingress in front of the 2048 game.
//!
//! The load balancer controller is installed first and the game manifest
//! records an explicit dependency on it. The ingress is then pointed at a
//! backend security group that allows no inbound traffic at all, so the
//! ALB comes up with every target unhealthy.

use serde_json::json;

use crate::capacity::{CapacityStrategy, ManagedNodeGroup};
use crate::cluster::{ClusterBuilder, ClusterHandle, ClusterOptions};
use crate::error::Result;
use crate::graph::{DependencyKind, ResourceGraph};
use crate::identity::Identity;
use crate::manifest::{fixtures, Manifest};
use crate::network::NetworkHandle;

const ALB_CONTROLLER_VERSION: &str = "2.6.2";

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
    builder.bind_network(network.clone())?;
    builder.declare_cluster(graph)?;
    builder.map_caller(identity)?;
    builder.add_capacity(
        graph,
        CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("trbsht-nodegroup", 2)),
    )?;

    // No ingress rules: the ALB's health checks have nowhere to go.
    let backend_sg = graph.declare(
        "BackendSecurityGroup",
        "AWS::EC2::SecurityGroup",
        json!({
            "GroupDescription": "Backend security group for the game ingress",
            "VpcId": network.vpc.reference(),
        }),
    )?;
    graph.add_dependency(
        "BackendSecurityGroup",
        &network.vpc.logical_id,
        DependencyKind::Reference,
    )?;

    builder.install_alb_controller(graph, ALB_CONTROLLER_VERSION)?;

    let mut game = Manifest::from_yaml("game-2048", fixtures::GAME_2048)?
        .with_overwrite(true)
        .with_dependency("alb-controller");
    for document in &mut game.documents {
        if document["kind"] == "Ingress" {
            document["metadata"]["annotations"]["alb.ingress.kubernetes.io/security-groups"] =
                backend_sg.get_att("GroupId");
        }
    }
    builder.apply_manifest(graph, game)?;
    graph.add_dependency("ManifestGame2048", "BackendSecurityGroup", DependencyKind::Reference)?;

    builder.apply_manifest(
        graph,
        Manifest::from_yaml("coredns-config", fixtures::COREDNS_CONFIGMAP)?
            .with_overwrite(true)
            .with_dependency("alb-controller"),
    )?;
    builder.finish(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ALB_INGRESS_CAPABILITY;
    use crate::network::{NetworkConfig, NetworkProvisioner};

    fn caller() -> Identity {
        Identity::new(
            "AIDAEXAMPLE",
            "arn:aws:iam::111122223333:user/lab-admin",
            "111122223333",
        )
    }

    #[test]
    fn game_waits_for_the_controller_and_carries_the_backend_group() {
        let mut graph = ResourceGraph::new();
        let network =
            NetworkProvisioner::provision(&mut graph, "Lab", &NetworkConfig::default()).unwrap();
        let cluster = build(
            &mut graph,
            "trbsht-cluster",
            ClusterOptions::default(),
            network,
            &caller(),
        )
        .unwrap();

        assert!(cluster.capabilities.contains(ALB_INGRESS_CAPABILITY));
        let deps = graph.dependencies_of("ManifestGame2048");
        assert!(deps.contains(&"AlbController".to_string()));
        assert!(deps.contains(&"BackendSecurityGroup".to_string()));

        let game = graph.get("ManifestGame2048").unwrap();
        let ingress = game.properties["Manifest"]
            .as_array()
            .unwrap()
            .iter()
            .find(|d| d["kind"] == "Ingress")
            .unwrap();
        assert_eq!(
            ingress["metadata"]["annotations"]["alb.ingress.kubernetes.io/security-groups"],
            serde_json::json!({ "Fn::GetAtt": ["BackendSecurityGroup", "GroupId"] })
        );
        graph.validate().unwrap();
    }
}
