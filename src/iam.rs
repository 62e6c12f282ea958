//! IAM role and policy declarations.
//!
//! Each scenario owns its own roles: node roles for worker capacity, a
//! bastion role with SSM access, and in one variant an admin role that is
//! only assumable from the bastion. Declarations land in the resource graph
//! as `AWS::IAM::Role` resources.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::graph::{DependencyKind, ResourceGraph, ResourceRef};

/// The standard managed-policy set attached to EKS worker node roles in
/// these labs. `AmazonS3FullAccess` is deliberately over-broad; it is part
/// of the curriculum, not an oversight.
pub const NODE_ROLE_POLICIES: &[&str] = &[
    "AmazonEKSWorkerNodePolicy",
    "AmazonEC2ContainerRegistryReadOnly",
    "AmazonEKS_CNI_Policy",
    "AmazonSSMManagedInstanceCore",
    "AmazonS3FullAccess",
];

/// Who may assume a role.
#[derive(Debug, Clone)]
pub enum Principal {
    /// An AWS service, e.g. `ec2.amazonaws.com`
    Service(String),
    /// Another role declared in the same graph
    Role(ResourceRef),
}

impl Principal {
    /// The EC2 service principal.
    pub fn ec2() -> Self {
        Self::Service("ec2.amazonaws.com".to_string())
    }

    fn to_policy_principal(&self) -> Value {
        match self {
            Principal::Service(service) => json!({ "Service": service }),
            Principal::Role(role) => json!({ "AWS": role.get_att("Arn") }),
        }
    }
}

/// Allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Allow the listed actions
    Allow,
    /// Deny the listed actions
    Deny,
}

/// A single inline policy statement.
#[derive(Debug, Clone)]
pub struct PolicyStatement {
    /// Allow or deny
    pub effect: Effect,
    /// IAM action names
    pub actions: Vec<String>,
    /// Resource ARNs the statement applies to
    pub resources: Vec<String>,
}

impl PolicyStatement {
    /// An allow statement over the given actions and resources.
    pub fn allow(
        actions: impl IntoIterator<Item = impl Into<String>>,
        resources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "Effect": match self.effect {
                Effect::Allow => "Allow",
                Effect::Deny => "Deny",
            },
            "Action": self.actions,
            "Resource": self.resources,
        })
    }
}

/// Specification for a role declaration.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    /// Explicit role name; generated by the provider when absent
    pub role_name: Option<String>,
    /// Trust relationship
    pub assumed_by: Principal,
    /// AWS managed policy names to attach
    pub managed_policies: Vec<String>,
    /// Inline policy statements
    pub inline_statements: Vec<PolicyStatement>,
}

impl RoleSpec {
    /// A role assumable by the given principal, with no policies yet.
    pub fn assumed_by(principal: Principal) -> Self {
        Self {
            role_name: None,
            assumed_by: principal,
            managed_policies: Vec::new(),
            inline_statements: Vec::new(),
        }
    }

    /// Set an explicit role name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.role_name = Some(name.into());
        self
    }

    /// Attach an AWS managed policy by name.
    pub fn with_managed_policy(mut self, name: impl Into<String>) -> Self {
        self.managed_policies.push(name.into());
        self
    }

    /// Attach several AWS managed policies by name.
    pub fn with_managed_policies(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.managed_policies
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Add an inline policy statement.
    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.inline_statements.push(statement);
        self
    }

    /// The standard worker node role for these labs.
    pub fn node_role() -> Self {
        Self::assumed_by(Principal::ec2()).with_managed_policies(NODE_ROLE_POLICIES.iter().copied())
    }
}

/// Handle to a declared role.
#[derive(Debug, Clone)]
pub struct RoleHandle {
    /// The graph resource backing this role
    pub resource: ResourceRef,
    /// Explicit role name, when one was requested
    pub role_name: Option<String>,
}

impl RoleHandle {
    /// `{"Fn::GetAtt": [id, "Arn"]}` for this role.
    pub fn arn(&self) -> Value {
        self.resource.get_att("Arn")
    }
}

fn managed_policy_arn(name: &str) -> String {
    format!("arn:aws:iam::aws:policy/{name}")
}

/// Declare an IAM role into the graph.
pub fn declare_role(
    graph: &mut ResourceGraph,
    logical_id: &str,
    spec: RoleSpec,
) -> Result<RoleHandle> {
    let mut properties = json!({
        "AssumeRolePolicyDocument": {
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": spec.assumed_by.to_policy_principal(),
                "Action": "sts:AssumeRole",
            }],
        },
    });

    if let Some(name) = &spec.role_name {
        properties["RoleName"] = json!(name);
    }
    if !spec.managed_policies.is_empty() {
        let arns: Vec<String> = spec
            .managed_policies
            .iter()
            .map(|n| managed_policy_arn(n))
            .collect();
        properties["ManagedPolicyArns"] = json!(arns);
    }
    if !spec.inline_statements.is_empty() {
        let statements: Vec<Value> = spec.inline_statements.iter().map(|s| s.to_json()).collect();
        properties["Policies"] = json!([{
            "PolicyName": format!("{logical_id}Policy"),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": statements,
            },
        }]);
    }

    let resource = graph.declare(logical_id, "AWS::IAM::Role", properties)?;
    if let Principal::Role(trusted) = &spec.assumed_by {
        graph.add_dependency(logical_id, &trusted.logical_id, DependencyKind::Reference)?;
    }
    Ok(RoleHandle {
        resource,
        role_name: spec.role_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_role_carries_the_standard_policy_set() {
        let mut graph = ResourceGraph::new();
        let role = declare_role(&mut graph, "NodeRole", RoleSpec::node_role()).unwrap();
        assert_eq!(role.resource.logical_id, "NodeRole");

        let declared = graph.get("NodeRole").unwrap();
        let arns = declared.properties["ManagedPolicyArns"].as_array().unwrap();
        assert_eq!(arns.len(), NODE_ROLE_POLICIES.len());
        assert_eq!(
            arns[0],
            serde_json::json!("arn:aws:iam::aws:policy/AmazonEKSWorkerNodePolicy")
        );
    }

    #[test]
    fn role_assumable_by_role_records_a_reference_edge() {
        let mut graph = ResourceGraph::new();
        let bastion = declare_role(
            &mut graph,
            "BastionRole",
            RoleSpec::assumed_by(Principal::ec2())
                .with_managed_policy("AmazonSSMManagedInstanceCore")
                .with_statement(PolicyStatement::allow(
                    ["eks:UpdateClusterConfig", "eks:DescribeCluster"],
                    ["*"],
                )),
        )
        .unwrap();
        declare_role(
            &mut graph,
            "AdminRole",
            RoleSpec::assumed_by(Principal::Role(bastion.resource.clone())).named("adminRole"),
        )
        .unwrap();

        assert_eq!(graph.dependencies_of("AdminRole"), vec!["BastionRole"]);
        let admin = graph.get("AdminRole").unwrap();
        assert_eq!(admin.properties["RoleName"], serde_json::json!("adminRole"));
    }
}
