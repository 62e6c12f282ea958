//! Lab 5-2: cluster access through a bastion host.
//!
//! No worker capacity at all; the exercise is reaching the control plane.
//! A bastion instance in a public subnet carries a role that can describe
//! and reconfigure the cluster, and a second admin role is assumable only
//! from the bastion. Both the caller and the bastion role land in aws-auth.

use serde_json::json;

use crate::auth::CLUSTER_ADMIN_GROUP;
use crate::cluster::{ClusterBuilder, ClusterHandle, ClusterOptions};
use crate::error::Result;
use crate::graph::{DependencyKind, ResourceGraph};
use crate::iam::{declare_role, PolicyStatement, Principal, RoleSpec};
use crate::identity::Identity;
use crate::network::{NetworkHandle, SubnetKind};

/// Latest Amazon Linux 2 AMI, resolved by the provisioning engine.
const AL2_IMAGE: &str =
    "{{resolve:ssm:/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2}}";

fn bastion_user_data() -> String {
    [
        "#!/bin/bash",
        "sudo curl -O https://s3.us-west-2.amazonaws.com/amazon-eks/1.28.5/2024-01-04/bin/linux/amd64/kubectl",
        "sudo chmod +x ./kubectl",
        "sudo mkdir -p $HOME/bin && sudo cp ./kubectl $HOME/bin/kubectl && export PATH=$HOME/bin:$PATH",
        "sudo echo 'export PATH=$HOME/bin:$PATH' >> ~/.bashrc",
        "sudo yum remove awscli",
        "sudo curl 'https://awscli.amazonaws.com/awscli-exe-linux-x86_64.zip' -o 'awscliv2.zip'",
        "unzip awscliv2.zip",
        "sudo ./aws/install --bin-dir /usr/local/bin --install-dir /usr/local/aws-cli --update",
    ]
    .join("\n")
}

pub(crate) fn build(
    graph: &mut ResourceGraph,
    cluster_name: &str,
    base: ClusterOptions,
    network: NetworkHandle,
    identity: &Identity,
) -> Result<ClusterHandle> {
    let cluster_access = PolicyStatement::allow(
        ["eks:UpdateClusterConfig", "eks:DescribeCluster"],
        ["*"],
    );
    let bastion_role = declare_role(
        graph,
        "BastionRole",
        RoleSpec::assumed_by(Principal::ec2())
            .with_managed_policy("AmazonSSMManagedInstanceCore")
            .with_statement(cluster_access.clone()),
    )?;
    declare_role(
        graph,
        "AdminRole",
        RoleSpec::assumed_by(Principal::Role(bastion_role.resource.clone()))
            .named("adminRole")
            .with_statement(cluster_access),
    )?;

    // SSH from anywhere is the point of this lab, not an oversight.
    graph.declare(
        "BastionSecurityGroup",
        "AWS::EC2::SecurityGroup",
        json!({
            "GroupDescription": "Bastion SSH access",
            "VpcId": network.vpc.reference(),
            "SecurityGroupIngress": [{
                "IpProtocol": "tcp",
                "FromPort": 22,
                "ToPort": 22,
                "CidrIp": "0.0.0.0/0",
                "Description": "SSH",
            }],
        }),
    )?;
    graph.add_dependency(
        "BastionSecurityGroup",
        &network.vpc.logical_id,
        DependencyKind::Reference,
    )?;

    graph.declare(
        "BastionInstanceProfile",
        "AWS::IAM::InstanceProfile",
        json!({ "Roles": [bastion_role.resource.reference()] }),
    )?;
    graph.add_dependency("BastionInstanceProfile", "BastionRole", DependencyKind::Reference)?;

    let public_subnet = &network.subnets(SubnetKind::Public)[0];
    graph.declare(
        "BastionInstance",
        "AWS::EC2::Instance",
        json!({
            "InstanceType": "t2.micro",
            "ImageId": AL2_IMAGE,
            "SubnetId": public_subnet.resource.reference(),
            "SecurityGroupIds": [{ "Fn::GetAtt": ["BastionSecurityGroup", "GroupId"] }],
            "IamInstanceProfile": { "Ref": "BastionInstanceProfile" },
            "UserData": { "Fn::Base64": bastion_user_data() },
        }),
    )?;
    graph.add_dependency("BastionInstance", "BastionInstanceProfile", DependencyKind::Reference)?;
    graph.add_dependency("BastionInstance", "BastionSecurityGroup", DependencyKind::Reference)?;
    graph.add_dependency(
        "BastionInstance",
        &public_subnet.resource.logical_id,
        DependencyKind::Reference,
    )?;

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
    builder.also_map_role(&bastion_role, "bastion", vec![CLUSTER_ADMIN_GROUP.to_string()])?;
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
    fn bastion_lab_maps_both_principals_and_declares_no_capacity() {
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

        assert!(cluster.node_role.is_none());
        assert!(cluster
            .authorization
            .grants_cluster_admin("arn:aws:iam::111122223333:user/lab-admin"));
        assert_eq!(cluster.authorization.role_mappings.len(), 1);
        assert_eq!(cluster.authorization.role_mappings[0].role_logical_id, "BastionRole");

        // The wide-open SSH rule survives, flagged by the security group.
        let sg = graph.get("BastionSecurityGroup").unwrap();
        assert_eq!(
            sg.properties["SecurityGroupIngress"][0]["CidrIp"],
            serde_json::json!("0.0.0.0/0")
        );
        // Intra-cluster all-TCP rule comes from the builder toggle.
        assert!(graph.contains("ClusterSecurityGroupSelfIngress"));
        graph.validate().unwrap();
    }
}
