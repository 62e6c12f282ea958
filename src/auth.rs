//! Cluster authorization mappings.
//!
//! EKS grants in-cluster permissions by mapping IAM principals to Kubernetes
//! groups through the `aws-auth` ConfigMap. Every cluster declared here maps
//! the resolved caller identity to `system:masters` before anything else:
//! a cluster whose creator is not mapped is unreachable the moment it comes
//! up, which is exactly the kind of lab accident this tool must not cause by
//! itself.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::identity::Identity;

/// The Kubernetes group carrying cluster-admin privilege.
pub const CLUSTER_ADMIN_GROUP: &str = "system:masters";

/// An IAM user mapped into the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMapping {
    /// IAM user ARN
    pub user_arn: String,
    /// In-cluster username
    pub username: String,
    /// Kubernetes groups
    pub groups: Vec<String>,
}

/// An IAM role mapped into the cluster. The role is identified by its
/// logical id in the resource graph; the ARN is substituted at apply time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    /// Logical id of the role resource
    pub role_logical_id: String,
    /// In-cluster username
    pub username: String,
    /// Kubernetes groups
    pub groups: Vec<String>,
}

/// Ordered mapping from IAM principals to Kubernetes group sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationMapping {
    /// User mappings, in declaration order
    pub user_mappings: Vec<UserMapping>,
    /// Role mappings, in declaration order
    pub role_mappings: Vec<RoleMapping>,
}

impl AuthorizationMapping {
    /// An empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the caller identity to the cluster-admin group.
    pub fn map_caller_as_admin(&mut self, identity: &Identity) {
        self.user_mappings.push(UserMapping {
            user_arn: identity.arn.clone(),
            username: identity.short_name().to_string(),
            groups: vec![CLUSTER_ADMIN_GROUP.to_string()],
        });
    }

    /// Map an IAM user to the given groups.
    pub fn map_user(
        &mut self,
        user_arn: impl Into<String>,
        username: impl Into<String>,
        groups: Vec<String>,
    ) {
        self.user_mappings.push(UserMapping {
            user_arn: user_arn.into(),
            username: username.into(),
            groups,
        });
    }

    /// Map a declared role to the given groups.
    pub fn map_role(
        &mut self,
        role_logical_id: impl Into<String>,
        username: impl Into<String>,
        groups: Vec<String>,
    ) {
        self.role_mappings.push(RoleMapping {
            role_logical_id: role_logical_id.into(),
            username: username.into(),
            groups,
        });
    }

    /// Whether the given ARN is mapped to the cluster-admin group.
    pub fn grants_cluster_admin(&self, arn: &str) -> bool {
        self.user_mappings
            .iter()
            .any(|m| m.user_arn == arn && m.groups.iter().any(|g| g == CLUSTER_ADMIN_GROUP))
    }

    /// Whether anything at all holds cluster-admin privilege.
    pub fn has_cluster_admin(&self) -> bool {
        let user = self
            .user_mappings
            .iter()
            .any(|m| m.groups.iter().any(|g| g == CLUSTER_ADMIN_GROUP));
        let role = self
            .role_mappings
            .iter()
            .any(|m| m.groups.iter().any(|g| g == CLUSTER_ADMIN_GROUP));
        user || role
    }

    /// Render the mapping as the `aws-auth` ConfigMap manifest.
    ///
    /// User entries are literal YAML; role entries go through an `Fn::Sub`
    /// so the provisioning engine substitutes role ARNs that only exist
    /// after the roles are created.
    pub fn to_config_map(&self) -> Value {
        let mut data = serde_json::Map::new();

        if !self.user_mappings.is_empty() {
            let mut map_users = String::new();
            for mapping in &self.user_mappings {
                map_users.push_str(&format!(
                    "- userarn: {}\n  username: {}\n  groups:\n",
                    mapping.user_arn, mapping.username
                ));
                for group in &mapping.groups {
                    map_users.push_str(&format!("    - {group}\n"));
                }
            }
            data.insert("mapUsers".to_string(), json!(map_users));
        }

        if !self.role_mappings.is_empty() {
            let mut map_roles = String::new();
            for mapping in &self.role_mappings {
                map_roles.push_str(&format!(
                    "- rolearn: ${{{}.Arn}}\n  username: {}\n  groups:\n",
                    mapping.role_logical_id, mapping.username
                ));
                for group in &mapping.groups {
                    map_roles.push_str(&format!("    - {group}\n"));
                }
            }
            data.insert("mapRoles".to_string(), json!({ "Fn::Sub": map_roles }));
        }

        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {
                "name": "aws-auth",
                "namespace": "kube-system",
            },
            "data": Value::Object(data),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn caller() -> Identity {
        Identity::new(
            "AIDAEXAMPLE",
            "arn:aws:iam::111122223333:user/lab-admin",
            "111122223333",
        )
    }

    #[test]
    fn caller_mapping_grants_cluster_admin() {
        let mut auth = AuthorizationMapping::new();
        auth.map_caller_as_admin(&caller());
        assert!(auth.grants_cluster_admin("arn:aws:iam::111122223333:user/lab-admin"));
        assert!(auth.has_cluster_admin());
    }

    #[test]
    fn config_map_renders_users_and_roles() {
        let mut auth = AuthorizationMapping::new();
        auth.map_caller_as_admin(&caller());
        auth.map_role("BastionRole", "bastion", vec![CLUSTER_ADMIN_GROUP.to_string()]);

        let manifest = auth.to_config_map();
        assert_eq!(manifest["kind"], json!("ConfigMap"));
        assert_eq!(manifest["metadata"]["name"], json!("aws-auth"));

        let map_users = manifest["data"]["mapUsers"].as_str().unwrap();
        assert!(map_users.contains("userarn: arn:aws:iam::111122223333:user/lab-admin"));
        assert!(map_users.contains("- system:masters"));

        let map_roles = manifest["data"]["mapRoles"]["Fn::Sub"].as_str().unwrap();
        assert!(map_roles.contains("rolearn: ${BastionRole.Arn}"));
    }

    #[test]
    fn empty_mapping_has_no_admin() {
        assert!(!AuthorizationMapping::new().has_cluster_admin());
    }
}
