//! The shared cluster skeleton.
//!
//! Every scenario builds the same control-plane core through
//! [`ClusterBuilder`] and diverges only in capacity, extra resources and
//! manifests. The builder is a state machine; each operation is legal in
//! exactly one place in the sequence
//!
//! ```text
//! Declared -> NetworkBound -> ClusterDeclared -> AuthMapped
//!          -> CapacityDeclared -> ManifestsApplied -> Complete
//! ```
//!
//! and calling it anywhere else is a [`Error::PhaseViolation`]. Capacity and
//! manifests are optional stops, but when both occur capacity always comes
//! first: nodes must be able to join before anything schedules on them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{json, Value};

use crate::auth::{AuthorizationMapping, CLUSTER_ADMIN_GROUP};
use crate::capacity::{CapacityStrategy, ManagedNodeGroup, SelfManagedGroup};
use crate::error::{Error, Result};
use crate::graph::{DependencyKind, ResourceGraph, ResourceRef};
use crate::iam::{declare_role, Principal, RoleHandle, RoleSpec};
use crate::identity::Identity;
use crate::manifest::Manifest;
use crate::network::{NetworkHandle, SubnetKind};

/// Kubernetes version every lab cluster runs.
pub const DEFAULT_CLUSTER_VERSION: &str = "1.28";

/// Control-plane log types enabled when logging is on.
pub const CLUSTER_LOG_TYPES: &[&str] = &["authenticator", "audit", "controllerManager"];

/// The capability an installed ALB ingress controller satisfies.
pub const ALB_INGRESS_CAPABILITY: &str = "ingress-class:alb";

// ============================================================================
// Phases
// ============================================================================

/// Lifecycle phase of a [`ClusterBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Builder exists, nothing declared
    Declared,
    /// Network placement chosen
    NetworkBound,
    /// Control plane in the graph
    ClusterDeclared,
    /// Caller mapped to cluster-admin
    AuthMapped,
    /// Worker capacity in the graph
    CapacityDeclared,
    /// At least one workload manifest applied
    ManifestsApplied,
    /// Finished, handle issued
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Declared => "declared",
            Phase::NetworkBound => "network-bound",
            Phase::ClusterDeclared => "cluster-declared",
            Phase::AuthMapped => "auth-mapped",
            Phase::CapacityDeclared => "capacity-declared",
            Phase::ManifestsApplied => "manifests-applied",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Options
// ============================================================================

/// Cluster-level knobs shared by all scenarios.
///
/// The defaults mirror the lab baseline: a pinned Kubernetes version, a
/// public-and-private endpoint whose public side is open to the world, and
/// control-plane logging on. The open endpoint is part of the curriculum;
/// callers narrow `endpoint_public_cidrs` when they want a locked-down
/// cluster.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Kubernetes version
    pub version: String,
    /// CIDRs allowed to reach the public endpoint
    pub endpoint_public_cidrs: Vec<String>,
    /// Whether control-plane logging is enabled
    pub logging: bool,
    /// Add an all-TCP self-referencing rule to the control-plane security
    /// group
    pub open_intra_cluster_tcp: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            version: DEFAULT_CLUSTER_VERSION.to_string(),
            endpoint_public_cidrs: vec!["0.0.0.0/0".to_string()],
            logging: true,
            open_intra_cluster_tcp: false,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Handle to a completed cluster.
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    /// Cluster name
    pub name: String,
    /// The control-plane resource
    pub resource: ResourceRef,
    /// Final principal-to-group mapping
    pub authorization: AuthorizationMapping,
    /// Worker node role, when capacity declared one
    pub node_role: Option<RoleHandle>,
    /// Capabilities provided by installed add-ons
    pub capabilities: BTreeSet<String>,
}

/// Phase-checked builder for one cluster and its dependents.
#[derive(Debug)]
pub struct ClusterBuilder {
    name: String,
    options: ClusterOptions,
    phase: Phase,
    network: Option<NetworkHandle>,
    cluster: Option<ResourceRef>,
    security_group: Option<ResourceRef>,
    capacity: Option<ResourceRef>,
    capacity_kind: Option<&'static str>,
    node_role: Option<RoleHandle>,
    auth: AuthorizationMapping,
    // capability -> name of the add-on construct providing it
    capabilities: BTreeMap<String, String>,
    // manifest / add-on name -> logical id, for dependency resolution
    applied: BTreeMap<String, String>,
}

impl ClusterBuilder {
    /// A builder in the initial phase.
    pub fn new(name: impl Into<String>, options: ClusterOptions) -> Self {
        Self {
            name: name.into(),
            options,
            phase: Phase::Declared,
            network: None,
            cluster: None,
            security_group: None,
            capacity: None,
            capacity_kind: None,
            node_role: None,
            auth: AuthorizationMapping::new(),
            capabilities: BTreeMap::new(),
            applied: BTreeMap::new(),
        }
    }

    /// Cluster name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn expect_phase(&self, expected: Phase, operation: &str) -> Result<()> {
        if self.phase != expected {
            return Err(Error::phase_violation(
                self.name.clone(),
                operation,
                self.phase.to_string(),
            ));
        }
        Ok(())
    }

    fn cluster_ref(&self, operation: &str) -> Result<&ResourceRef> {
        self.cluster.as_ref().ok_or_else(|| {
            Error::phase_violation(self.name.clone(), operation, self.phase.to_string())
        })
    }

    /// Bind the cluster to a provisioned network.
    pub fn bind_network(&mut self, network: NetworkHandle) -> Result<&mut Self> {
        self.expect_phase(Phase::Declared, "bind_network")?;
        self.network = Some(network);
        self.phase = Phase::NetworkBound;
        Ok(self)
    }

    /// Declare the control plane: service role, security group, cluster.
    pub fn declare_cluster(&mut self, graph: &mut ResourceGraph) -> Result<&mut Self> {
        self.expect_phase(Phase::NetworkBound, "declare_cluster")?;
        let network = self.network.as_ref().ok_or_else(|| {
            Error::phase_violation(self.name.clone(), "declare_cluster", self.phase.to_string())
        })?;

        let service_role = declare_role(
            graph,
            "ClusterRole",
            RoleSpec::assumed_by(Principal::Service("eks.amazonaws.com".to_string()))
                .with_managed_policy("AmazonEKSClusterPolicy"),
        )?;

        let security_group = graph.declare(
            "ClusterSecurityGroup",
            "AWS::EC2::SecurityGroup",
            json!({
                "GroupDescription": format!("Control plane security group for {}", self.name),
                "VpcId": network.vpc.reference(),
            }),
        )?;
        graph.add_dependency(
            "ClusterSecurityGroup",
            &network.vpc.logical_id,
            DependencyKind::Reference,
        )?;

        if self.options.open_intra_cluster_tcp {
            // Deliberately permissive: any TCP between members of the group.
            graph.declare(
                "ClusterSecurityGroupSelfIngress",
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "GroupId": security_group.get_att("GroupId"),
                    "SourceSecurityGroupId": security_group.get_att("GroupId"),
                    "IpProtocol": "tcp",
                    "FromPort": 0,
                    "ToPort": 65535,
                }),
            )?;
            graph.add_dependency(
                "ClusterSecurityGroupSelfIngress",
                "ClusterSecurityGroup",
                DependencyKind::Reference,
            )?;
        }

        let mut subnet_ids: Vec<Value> = network.subnet_ids(SubnetKind::Public);
        subnet_ids.extend(network.subnet_ids(SubnetKind::PrivateWithEgress));

        let mut properties = json!({
            "Name": self.name,
            "Version": self.options.version,
            "RoleArn": service_role.arn(),
            "ResourcesVpcConfig": {
                "SecurityGroupIds": [security_group.get_att("GroupId")],
                "SubnetIds": subnet_ids,
                "EndpointPublicAccess": true,
                "EndpointPrivateAccess": true,
                "PublicAccessCidrs": self.options.endpoint_public_cidrs,
            },
        });
        if self.options.logging {
            properties["Logging"] = json!({
                "ClusterLogging": {
                    "EnabledTypes": CLUSTER_LOG_TYPES
                        .iter()
                        .map(|t| json!({ "Type": t }))
                        .collect::<Vec<_>>(),
                },
            });
        }

        let cluster = graph.declare("Cluster", "AWS::EKS::Cluster", properties)?;
        graph.add_dependency("Cluster", "ClusterRole", DependencyKind::Reference)?;
        graph.add_dependency("Cluster", "ClusterSecurityGroup", DependencyKind::Reference)?;
        for kind in [SubnetKind::Public, SubnetKind::PrivateWithEgress] {
            for subnet in network.subnets(kind) {
                graph.add_dependency(
                    "Cluster",
                    &subnet.resource.logical_id,
                    DependencyKind::Reference,
                )?;
            }
        }

        tracing::info!(cluster = %self.name, version = %self.options.version, "declared control plane");
        self.cluster = Some(cluster);
        self.security_group = Some(security_group);
        self.phase = Phase::ClusterDeclared;
        Ok(self)
    }

    /// Map the resolved caller to cluster-admin. Always the first entry in
    /// the authorization mapping; nothing else may be mapped before it.
    pub fn map_caller(&mut self, identity: &Identity) -> Result<&mut Self> {
        self.expect_phase(Phase::ClusterDeclared, "map_caller")?;
        self.auth.map_caller_as_admin(identity);
        tracing::debug!(caller = %identity.arn, "mapped caller to {CLUSTER_ADMIN_GROUP}");
        self.phase = Phase::AuthMapped;
        Ok(self)
    }

    /// Map an additional IAM user, after the caller.
    pub fn also_map_user(
        &mut self,
        user_arn: impl Into<String>,
        username: impl Into<String>,
        groups: Vec<String>,
    ) -> Result<&mut Self> {
        self.expect_phase(Phase::AuthMapped, "also_map_user")?;
        self.auth.map_user(user_arn, username, groups);
        Ok(self)
    }

    /// Map an additional declared role, after the caller.
    pub fn also_map_role(
        &mut self,
        role: &RoleHandle,
        username: impl Into<String>,
        groups: Vec<String>,
    ) -> Result<&mut Self> {
        self.expect_phase(Phase::AuthMapped, "also_map_role")?;
        self.auth
            .map_role(role.resource.logical_id.clone(), username, groups);
        Ok(self)
    }

    /// Declare worker capacity. Exactly one strategy per cluster; a second
    /// call is a [`Error::ConfigurationConflict`] regardless of strategy.
    pub fn add_capacity(
        &mut self,
        graph: &mut ResourceGraph,
        strategy: CapacityStrategy,
    ) -> Result<&mut Self> {
        if let Some(existing) = self.capacity_kind {
            return Err(Error::configuration_conflict(
                self.name.clone(),
                format!(
                    "capacity already declared as {existing}; cannot also add a {}",
                    strategy.kind_name()
                ),
            ));
        }
        self.expect_phase(Phase::AuthMapped, "add_capacity")?;

        let kind = strategy.kind_name();
        let capacity = match strategy {
            CapacityStrategy::SelfManaged(group) => self.declare_self_managed(graph, group)?,
            CapacityStrategy::ManagedNodeGroup(group) => self.declare_node_group(graph, group)?,
        };

        tracing::info!(cluster = %self.name, kind, "declared worker capacity");
        self.capacity = Some(capacity);
        self.capacity_kind = Some(kind);
        self.phase = Phase::CapacityDeclared;
        Ok(self)
    }

    fn declare_self_managed(
        &mut self,
        graph: &mut ResourceGraph,
        group: SelfManagedGroup,
    ) -> Result<ResourceRef> {
        let cluster = self.cluster_ref("add_capacity")?.clone();
        let network = self.network.as_ref().ok_or_else(|| {
            Error::phase_violation(self.name.clone(), "add_capacity", self.phase.to_string())
        })?;
        let group_id = logical_id(&group.name);

        // Self-managed nodes carry a reduced policy set; the CNI policy is
        // intentionally absent in the lab it belongs to.
        let role = declare_role(
            graph,
            &format!("{group_id}Role"),
            RoleSpec::assumed_by(Principal::ec2()).with_managed_policies([
                "AmazonEKSWorkerNodePolicy",
                "AmazonSSMManagedInstanceCore",
                "AmazonS3FullAccess",
            ]),
        )?;
        let profile_id = format!("{group_id}InstanceProfile");
        graph.declare(
            &profile_id,
            "AWS::IAM::InstanceProfile",
            json!({ "Roles": [role.resource.reference()] }),
        )?;
        graph.add_dependency(&profile_id, &role.resource.logical_id, DependencyKind::Reference)?;

        let template_id = format!("{group_id}LaunchTemplate");
        let template = graph.declare(
            &template_id,
            "AWS::EC2::LaunchTemplate",
            json!({
                "LaunchTemplateData": {
                    "ImageId": group.image_id,
                    "InstanceType": group.instance_type,
                    "IamInstanceProfile": { "Arn": { "Fn::GetAtt": [profile_id, "Arn"] } },
                    "UserData": {
                        "Fn::Base64": SelfManagedGroup::bootstrap_user_data(&self.name),
                    },
                },
            }),
        )?;
        graph.add_dependency(&template_id, &profile_id, DependencyKind::Reference)?;

        let subnet_ids = network.subnet_ids(SubnetKind::PrivateWithEgress);
        let asg = graph.declare(
            &group_id,
            "AWS::AutoScaling::AutoScalingGroup",
            json!({
                "AutoScalingGroupName": group.name,
                "MinSize": group.min_capacity.to_string(),
                "MaxSize": group.min_capacity.max(1).to_string(),
                "LaunchTemplate": {
                    "LaunchTemplateId": template.reference(),
                    "Version": "1",
                },
                "VPCZoneIdentifier": subnet_ids,
            }),
        )?;
        graph.add_dependency(&group_id, &template_id, DependencyKind::Reference)?;
        graph.add_dependency(&group_id, &cluster.logical_id, DependencyKind::Ordering)?;
        for subnet in network.subnets(SubnetKind::PrivateWithEgress) {
            graph.add_dependency(&group_id, &subnet.resource.logical_id, DependencyKind::Reference)?;
        }

        // Nodes join through aws-auth, so the role must be mapped.
        self.auth.map_role(
            role.resource.logical_id.clone(),
            "system:node:{{EC2PrivateDNSName}}",
            vec!["system:bootstrappers".to_string(), "system:nodes".to_string()],
        );
        self.node_role = Some(role);
        Ok(asg)
    }

    fn declare_node_group(
        &mut self,
        graph: &mut ResourceGraph,
        group: ManagedNodeGroup,
    ) -> Result<ResourceRef> {
        let cluster = self.cluster_ref("add_capacity")?.clone();
        let network = self.network.as_ref().ok_or_else(|| {
            Error::phase_violation(self.name.clone(), "add_capacity", self.phase.to_string())
        })?;
        let group_id = logical_id(&group.name);

        let role = declare_role(graph, &format!("{group_id}Role"), RoleSpec::node_role())?;

        let subnet_kind = group.subnet_kind.unwrap_or(SubnetKind::PrivateWithEgress);
        let subnet_ids = network.subnet_ids(subnet_kind);
        let min = group.min_size;

        let mut properties = json!({
            "ClusterName": cluster.reference(),
            "NodegroupName": group.name,
            "NodeRole": role.arn(),
            "Subnets": subnet_ids,
            "InstanceTypes": group.instance_types,
            "ScalingConfig": {
                "MinSize": min,
                "DesiredSize": group.desired_size,
                "MaxSize": group.desired_size.max(min),
            },
        });
        if !group.labels.is_empty() {
            properties["Labels"] = json!(group.labels);
        }
        if let Some(lt) = group.launch_template_property() {
            properties["LaunchTemplate"] = lt;
        }

        let nodegroup = graph.declare(&group_id, "AWS::EKS::Nodegroup", properties)?;
        graph.add_dependency(&group_id, &cluster.logical_id, DependencyKind::Reference)?;
        graph.add_dependency(&group_id, &role.resource.logical_id, DependencyKind::Reference)?;
        for subnet in network.subnets(subnet_kind) {
            graph.add_dependency(&group_id, &subnet.resource.logical_id, DependencyKind::Reference)?;
        }
        if let Some(lt) = &group.launch_template {
            graph.add_dependency(&group_id, &lt.template.logical_id, DependencyKind::Reference)?;
        }

        self.node_role = Some(role);
        Ok(nodegroup)
    }

    /// Install the AWS load balancer controller. Provides the
    /// `ingress-class:alb` capability manifests with ALB ingresses require.
    pub fn install_alb_controller(
        &mut self,
        graph: &mut ResourceGraph,
        chart_version: &str,
    ) -> Result<&mut Self> {
        if self.phase < Phase::AuthMapped || self.phase == Phase::Complete {
            return Err(Error::phase_violation(
                self.name.clone(),
                "install_alb_controller",
                self.phase.to_string(),
            ));
        }
        let cluster = self.cluster_ref("install_alb_controller")?.clone();

        graph.declare(
            "AlbController",
            "Custom::HelmChart",
            json!({
                "ClusterName": cluster.reference(),
                "Chart": "aws-load-balancer-controller",
                "Repository": "https://aws.github.io/eks-charts",
                "Version": chart_version,
                "Namespace": "kube-system",
                "Values": { "clusterName": self.name },
            }),
        )?;
        graph.add_dependency("AlbController", &cluster.logical_id, DependencyKind::Reference)?;
        if let Some(capacity) = &self.capacity {
            graph.add_dependency("AlbController", &capacity.logical_id, DependencyKind::Ordering)?;
        }

        self.capabilities.insert(
            ALB_INGRESS_CAPABILITY.to_string(),
            "alb-controller".to_string(),
        );
        self.applied
            .insert("alb-controller".to_string(), "AlbController".to_string());
        tracing::info!(cluster = %self.name, version = chart_version, "installed ALB controller");
        Ok(self)
    }

    /// Apply a workload manifest.
    ///
    /// The manifest's named dependencies must already be satisfied by
    /// earlier applies, and a manifest consuming an add-on capability must
    /// name that add-on in its dependencies. Anything missing is a
    /// [`Error::ManifestOrderingViolation`]; the edge is demanded, never
    /// inferred.
    pub fn apply_manifest(
        &mut self,
        graph: &mut ResourceGraph,
        manifest: Manifest,
    ) -> Result<&mut Self> {
        if self.phase < Phase::AuthMapped || self.phase == Phase::Complete {
            return Err(Error::phase_violation(
                self.name.clone(),
                "apply_manifest",
                self.phase.to_string(),
            ));
        }

        for capability in manifest.required_capabilities() {
            let Some(provider) = self.capabilities.get(&capability) else {
                return Err(Error::manifest_ordering(
                    manifest.name.clone(),
                    format!("capability {capability} is not provided by any installed add-on"),
                ));
            };
            if !manifest.depends_on.iter().any(|d| d == provider) {
                return Err(Error::manifest_ordering(
                    manifest.name.clone(),
                    format!("consumes {capability} but does not depend on its provider {provider}"),
                ));
            }
        }
        let mut dependency_ids = Vec::new();
        for dependency in &manifest.depends_on {
            match self.applied.get(dependency) {
                Some(id) => dependency_ids.push(id.clone()),
                None => {
                    return Err(Error::manifest_ordering(
                        manifest.name.clone(),
                        format!("depends on {dependency}, which has not been applied"),
                    ));
                }
            }
        }

        let cluster = self.cluster_ref("apply_manifest")?.clone();
        let id = format!("Manifest{}", logical_id(&manifest.name));
        graph.declare(
            &id,
            "Custom::KubernetesManifest",
            json!({
                "ClusterName": cluster.reference(),
                "Manifest": manifest.documents,
                "Overwrite": manifest.overwrite,
            }),
        )?;
        graph.add_dependency(&id, &cluster.logical_id, DependencyKind::Reference)?;
        if let Some(capacity) = &self.capacity {
            graph.add_dependency(&id, &capacity.logical_id, DependencyKind::Ordering)?;
        }
        for dependency_id in dependency_ids {
            graph.add_dependency(&id, &dependency_id, DependencyKind::Ordering)?;
        }

        tracing::debug!(cluster = %self.name, manifest = %manifest.name, "applied manifest");
        self.applied.insert(manifest.name.clone(), id);
        self.phase = Phase::ManifestsApplied;
        Ok(self)
    }

    /// Declare an OIDC identity provider for the cluster.
    pub fn enable_oidc_provider(&mut self, graph: &mut ResourceGraph) -> Result<&mut Self> {
        if self.phase < Phase::ClusterDeclared || self.phase == Phase::Complete {
            return Err(Error::phase_violation(
                self.name.clone(),
                "enable_oidc_provider",
                self.phase.to_string(),
            ));
        }
        let cluster = self.cluster_ref("enable_oidc_provider")?.clone();
        graph.declare(
            "OidcProvider",
            "AWS::IAM::OIDCProvider",
            json!({
                "Url": cluster.get_att("OpenIdConnectIssuerUrl"),
                "ClientIdList": ["sts.amazonaws.com"],
            }),
        )?;
        graph.add_dependency("OidcProvider", &cluster.logical_id, DependencyKind::Reference)?;
        Ok(self)
    }

    /// Finish the cluster: declare the `aws-auth` ConfigMap and issue the
    /// handle. Capacity and manifests are both optional; anything before
    /// auth mapping is too early to finish.
    pub fn finish(mut self, graph: &mut ResourceGraph) -> Result<ClusterHandle> {
        if self.phase < Phase::AuthMapped || self.phase == Phase::Complete {
            return Err(Error::phase_violation(
                self.name.clone(),
                "finish",
                self.phase.to_string(),
            ));
        }
        let cluster = self.cluster_ref("finish")?.clone();

        graph.declare(
            "AwsAuth",
            "Custom::KubernetesManifest",
            json!({
                "ClusterName": cluster.reference(),
                "Manifest": [self.auth.to_config_map()],
                "Overwrite": true,
            }),
        )?;
        graph.add_dependency("AwsAuth", &cluster.logical_id, DependencyKind::Reference)?;
        for mapping in &self.auth.role_mappings {
            graph.add_dependency("AwsAuth", &mapping.role_logical_id, DependencyKind::Reference)?;
        }
        // Nodes can only register once their role is in aws-auth.
        if let Some(capacity) = &self.capacity {
            graph.add_dependency(&capacity.logical_id, "AwsAuth", DependencyKind::Ordering)?;
        }

        self.phase = Phase::Complete;
        tracing::info!(cluster = %self.name, "cluster complete");
        Ok(ClusterHandle {
            name: self.name,
            resource: cluster,
            authorization: self.auth,
            node_role: self.node_role,
            capabilities: self.capabilities.into_keys().collect(),
        })
    }
}

/// Turn a kebab-or-spaced name into a CloudFormation-style logical id.
pub(crate) fn logical_id(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if upper_next {
                out.extend(c.to_uppercase());
                upper_next = false;
            } else {
                out.push(c);
            }
        } else {
            upper_next = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::fixtures;
    use crate::network::{NetworkConfig, NetworkProvisioner};
    use pretty_assertions::assert_eq;

    fn caller() -> Identity {
        Identity::new(
            "AIDAEXAMPLE",
            "arn:aws:iam::111122223333:user/lab-admin",
            "111122223333",
        )
    }

    fn bound_builder(graph: &mut ResourceGraph) -> ClusterBuilder {
        let network =
            NetworkProvisioner::provision(graph, "Lab", &NetworkConfig::default()).unwrap();
        let mut builder = ClusterBuilder::new("lab-cluster", ClusterOptions::default());
        builder.bind_network(network).unwrap();
        builder
    }

    #[test]
    fn logical_ids_are_pascal_case() {
        assert_eq!(logical_id("trbsht-nodegroup"), "TrbshtNodegroup");
        assert_eq!(logical_id("game-2048"), "Game2048");
        assert_eq!(logical_id("aws-auth"), "AwsAuth");
    }

    #[test]
    fn operations_out_of_order_are_phase_violations() {
        let mut graph = ResourceGraph::new();
        let mut builder = ClusterBuilder::new("lab-cluster", ClusterOptions::default());

        // Cannot declare the control plane before binding a network.
        let err = builder.declare_cluster(&mut graph).unwrap_err();
        assert!(matches!(err, Error::PhaseViolation { .. }));

        // Cannot add capacity before auth is mapped.
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        let err = builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("ng", 1)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::PhaseViolation { .. }));
    }

    #[test]
    fn second_capacity_is_a_configuration_conflict() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("ng", 1)),
            )
            .unwrap();

        let err = builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::SelfManaged(SelfManagedGroup {
                    name: "asg".to_string(),
                    instance_type: "t3.large".to_string(),
                    image_id: "ami-048f188129fbbcc9f".to_string(),
                    min_capacity: 1,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, Error::ConfigurationConflict { .. }));
    }

    #[test]
    fn caller_is_always_the_first_auth_entry() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        builder
            .also_map_user(
                "arn:aws:iam::111122223333:user/second",
                "second",
                vec![CLUSTER_ADMIN_GROUP.to_string()],
            )
            .unwrap();
        builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("ng", 1)),
            )
            .unwrap();
        let cluster = builder.finish(&mut graph).unwrap();

        let first = &cluster.authorization.user_mappings[0];
        assert_eq!(first.user_arn, caller().arn);
        assert!(cluster.authorization.grants_cluster_admin(&caller().arn));
    }

    #[test]
    fn alb_manifest_without_controller_is_an_ordering_violation() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("ng", 2)),
            )
            .unwrap();

        let game = Manifest::from_yaml("game-2048", fixtures::GAME_2048).unwrap();
        let err = builder.apply_manifest(&mut graph, game).unwrap_err();
        assert!(matches!(err, Error::ManifestOrderingViolation { .. }));
    }

    #[test]
    fn consumer_without_an_edge_on_the_installed_controller_is_rejected() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("ng", 2)),
            )
            .unwrap();
        builder.install_alb_controller(&mut graph, "2.6.2").unwrap();

        // The controller is there, but the manifest never names it.
        let game = Manifest::from_yaml("game-2048", fixtures::GAME_2048).unwrap();
        let err = builder.apply_manifest(&mut graph, game).unwrap_err();
        assert!(matches!(err, Error::ManifestOrderingViolation { .. }));
        assert!(!graph.contains("ManifestGame2048"));
    }

    #[test]
    fn alb_manifest_after_controller_is_accepted() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("ng", 2)),
            )
            .unwrap();
        builder.install_alb_controller(&mut graph, "2.6.2").unwrap();

        let game = Manifest::from_yaml("game-2048", fixtures::GAME_2048)
            .unwrap()
            .with_dependency("alb-controller");
        builder.apply_manifest(&mut graph, game).unwrap();
        let cluster = builder.finish(&mut graph).unwrap();

        assert!(cluster.capabilities.contains(ALB_INGRESS_CAPABILITY));
        assert!(graph
            .dependencies_of("ManifestGame2048")
            .contains(&"AlbController".to_string()));
        graph.validate().unwrap();
    }

    #[test]
    fn capacity_after_manifests_is_too_late() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        let pdb = Manifest::from_yaml("nginx-pdb", fixtures::NGINX_PDB).unwrap();
        builder.apply_manifest(&mut graph, pdb).unwrap();

        let err = builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("ng", 1)),
            )
            .unwrap_err();
        assert!(matches!(err, Error::PhaseViolation { .. }));
    }

    #[test]
    fn node_group_scaling_defaults_to_two_desired_nodes() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("ng", 1)),
            )
            .unwrap();

        let scaling = &graph.get("Ng").unwrap().properties["ScalingConfig"];
        assert_eq!(scaling["MinSize"], json!(1));
        assert_eq!(scaling["DesiredSize"], json!(2));
        assert_eq!(scaling["MaxSize"], json!(2));
    }

    #[test]
    fn cluster_without_capacity_still_finishes() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        let cluster = builder.finish(&mut graph).unwrap();
        assert!(cluster.node_role.is_none());
        graph.validate().unwrap();
    }

    #[test]
    fn nodes_wait_for_aws_auth() {
        let mut graph = ResourceGraph::new();
        let mut builder = bound_builder(&mut graph);
        builder.declare_cluster(&mut graph).unwrap();
        builder.map_caller(&caller()).unwrap();
        builder
            .add_capacity(
                &mut graph,
                CapacityStrategy::ManagedNodeGroup(ManagedNodeGroup::new("worker-group", 1)),
            )
            .unwrap();
        builder.finish(&mut graph).unwrap();

        assert!(graph
            .dependencies_of("WorkerGroup")
            .contains(&"AwsAuth".to_string()));
        graph.validate().unwrap();
    }
}
