//! Worker capacity declarations.
//!
//! Clusters are declared with zero default capacity; scenarios add workers
//! explicitly through exactly one of two strategies: a self-managed auto
//! scaling group with a custom AMI and bootstrap script, or a managed node
//! group, optionally bound to a launch template.
//!
//! Launch-template versions are always explicit numbers. Revising a template
//! produces a new version and the node group keeps pointing at whatever
//! number it was given; there is no "latest" token to paper over a stale
//! pin. One lab scenario exists precisely because of that footgun.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::graph::{ResourceGraph, ResourceRef};
use crate::network::SubnetKind;

/// A launch template specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchTemplate {
    /// Template name
    pub name: String,
    /// AMI id for the node root image
    pub image_id: String,
    /// Root volume size in GiB
    pub volume_size_gib: u32,
    /// Root volume type
    pub volume_type: String,
    /// Optional bootstrap user data (plain text, encoded at render time)
    pub user_data: Option<String>,
}

impl LaunchTemplate {
    /// A template with the lab defaults: 20 GiB gp3 root volume.
    pub fn new(name: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_id: image_id.into(),
            volume_size_gib: 20,
            volume_type: "gp3".to_string(),
            user_data: None,
        }
    }

    /// Attach bootstrap user data.
    pub fn with_user_data(mut self, user_data: impl Into<String>) -> Self {
        self.user_data = Some(user_data.into());
        self
    }

    /// Declare the template into the graph. The initial version is 1.
    pub fn declare(self, graph: &mut ResourceGraph, logical_id: &str) -> Result<LaunchTemplateHandle> {
        let mut data = json!({
            "ImageId": self.image_id,
            "BlockDeviceMappings": [{
                "DeviceName": "/dev/xvda",
                "Ebs": {
                    "DeleteOnTermination": true,
                    "VolumeSize": self.volume_size_gib,
                    "VolumeType": self.volume_type,
                },
            }],
        });
        if let Some(user_data) = &self.user_data {
            data["UserData"] = json!({ "Fn::Base64": user_data });
        }
        let resource = graph.declare(
            logical_id,
            "AWS::EC2::LaunchTemplate",
            json!({
                "LaunchTemplateName": self.name,
                "LaunchTemplateData": data,
            }),
        )?;
        Ok(LaunchTemplateHandle {
            resource,
            name: self.name,
            latest_version: 1,
        })
    }
}

/// Property overrides producing a new launch-template version.
#[derive(Debug, Clone, Default)]
pub struct LaunchTemplateRevision {
    /// Replacement AMI id
    pub image_id: Option<String>,
    /// Replacement user data
    pub user_data: Option<String>,
}

/// Handle to a declared launch template, tracking its newest version.
#[derive(Debug, Clone)]
pub struct LaunchTemplateHandle {
    /// The graph resource backing this template
    pub resource: ResourceRef,
    /// Template name
    pub name: String,
    latest_version: u64,
}

impl LaunchTemplateHandle {
    /// The newest version number of this template.
    pub fn latest_version(&self) -> u64 {
        self.latest_version
    }

    /// Apply a revision, producing a new version. Returns the new version
    /// number; existing [`LaunchTemplateRef`]s keep their old pins.
    pub fn revise(
        &mut self,
        graph: &mut ResourceGraph,
        revision: LaunchTemplateRevision,
    ) -> Result<u64> {
        let properties = graph
            .properties_mut(&self.resource.logical_id)
            .ok_or_else(|| {
                Error::missing_reference(self.resource.logical_id.clone(), &self.resource.logical_id)
            })?;
        let data = &mut properties["LaunchTemplateData"];
        if let Some(image_id) = revision.image_id {
            data["ImageId"] = json!(image_id);
        }
        if let Some(user_data) = revision.user_data {
            data["UserData"] = json!({ "Fn::Base64": user_data });
        }
        self.latest_version += 1;
        tracing::debug!(
            template = %self.resource.logical_id,
            version = self.latest_version,
            "revised launch template"
        );
        Ok(self.latest_version)
    }

    /// Pin a node group to a concrete version of this template.
    ///
    /// The version must exist; pinning a version the template never reached
    /// is caught here rather than surfacing as an apply-time failure.
    pub fn at_version(&self, version: u64) -> Result<LaunchTemplateRef> {
        if version == 0 || version > self.latest_version {
            return Err(Error::missing_reference(
                self.resource.logical_id.clone(),
                format!("{} version {version}", self.name),
            ));
        }
        Ok(LaunchTemplateRef {
            template: self.resource.clone(),
            version,
        })
    }
}

/// An explicit (template, version) pair a node group binds to.
#[derive(Debug, Clone)]
pub struct LaunchTemplateRef {
    /// The launch template resource
    pub template: ResourceRef,
    /// Concrete version number
    pub version: u64,
}

/// Self-managed worker capacity: a plain auto scaling group running a
/// custom AMI that joins the cluster via the EKS bootstrap script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfManagedGroup {
    /// Auto scaling group name
    pub name: String,
    /// Instance type
    pub instance_type: String,
    /// AMI id
    pub image_id: String,
    /// Minimum capacity
    pub min_capacity: u32,
}

impl SelfManagedGroup {
    /// The bootstrap script joining a node to the named cluster.
    pub fn bootstrap_user_data(cluster_name: &str) -> String {
        format!("set -o xtrace\n/etc/eks/bootstrap.sh {cluster_name}")
    }
}

/// Managed node group capacity.
#[derive(Debug, Clone, Default)]
pub struct ManagedNodeGroup {
    /// Node group name
    pub name: String,
    /// Candidate instance types
    pub instance_types: Vec<String>,
    /// Minimum node count
    pub min_size: u32,
    /// Desired node count; defaults to 2, never below the minimum
    pub desired_size: u32,
    /// Kubernetes node labels
    pub labels: BTreeMap<String, String>,
    /// Subnet tier override; defaults to the private tier
    pub subnet_kind: Option<SubnetKind>,
    /// Optional explicit launch-template binding
    pub launch_template: Option<LaunchTemplateRef>,
}

impl ManagedNodeGroup {
    /// A node group with the lab's standard instance mix.
    pub fn new(name: impl Into<String>, min_size: u32) -> Self {
        Self {
            name: name.into(),
            instance_types: vec!["t3.large".to_string(), "t2.medium".to_string()],
            min_size,
            desired_size: min_size.max(2),
            ..Self::default()
        }
    }

    /// Add a node label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Place the node group in the given subnet tier.
    pub fn in_subnets(mut self, kind: SubnetKind) -> Self {
        self.subnet_kind = Some(kind);
        self
    }

    /// Bind the node group to a launch-template version.
    pub fn with_launch_template(mut self, reference: LaunchTemplateRef) -> Self {
        self.launch_template = Some(reference);
        self
    }

    /// Launch-template spec property, when bound.
    pub(crate) fn launch_template_property(&self) -> Option<Value> {
        self.launch_template.as_ref().map(|lt| {
            json!({
                "Id": lt.template.reference(),
                "Version": lt.version.to_string(),
            })
        })
    }
}

/// One of the two mutually exclusive capacity strategies.
#[derive(Debug, Clone)]
pub enum CapacityStrategy {
    /// Self-managed auto scaling group
    SelfManaged(SelfManagedGroup),
    /// Managed node group
    ManagedNodeGroup(ManagedNodeGroup),
}

impl CapacityStrategy {
    /// Short strategy name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CapacityStrategy::SelfManaged(_) => "self-managed scaling group",
            CapacityStrategy::ManagedNodeGroup(_) => "managed node group",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn revision_bumps_the_version_and_rewrites_properties() {
        let mut graph = ResourceGraph::new();
        let mut handle = LaunchTemplate::new("lab-lt", "ami-048f188129fbbcc9f")
            .declare(&mut graph, "NodeLt")
            .unwrap();
        assert_eq!(handle.latest_version(), 1);

        let new_version = handle
            .revise(
                &mut graph,
                LaunchTemplateRevision {
                    image_id: Some("ami-0eada94f1ebaaa3a1".to_string()),
                    ..LaunchTemplateRevision::default()
                },
            )
            .unwrap();
        assert_eq!(new_version, 2);

        let declared = graph.get("NodeLt").unwrap();
        assert_eq!(
            declared.properties["LaunchTemplateData"]["ImageId"],
            json!("ami-0eada94f1ebaaa3a1")
        );
    }

    #[test]
    fn pinning_an_unknown_version_is_rejected() {
        let mut graph = ResourceGraph::new();
        let handle = LaunchTemplate::new("lab-lt", "ami-048f188129fbbcc9f")
            .declare(&mut graph, "NodeLt")
            .unwrap();
        assert!(handle.at_version(1).is_ok());
        assert!(matches!(
            handle.at_version(2),
            Err(Error::MissingReference { .. })
        ));
        assert!(handle.at_version(0).is_err());
    }

    #[test]
    fn stale_pins_survive_revision() {
        let mut graph = ResourceGraph::new();
        let mut handle = LaunchTemplate::new("lab-lt", "ami-048f188129fbbcc9f")
            .declare(&mut graph, "NodeLt")
            .unwrap();
        let original = handle.at_version(1).unwrap();
        handle
            .revise(&mut graph, LaunchTemplateRevision::default())
            .unwrap();
        // The pin still names version 1 even though the template moved on.
        assert_eq!(original.version, 1);
        assert_eq!(handle.latest_version(), 2);
    }

    #[test]
    fn desired_size_defaults_to_two_and_tracks_larger_minimums() {
        assert_eq!(ManagedNodeGroup::new("ng", 1).desired_size, 2);
        assert_eq!(ManagedNodeGroup::new("ng", 3).desired_size, 3);
    }

    #[test]
    fn bootstrap_user_data_names_the_cluster() {
        let script = SelfManagedGroup::bootstrap_user_data("trbsht-cluster");
        assert!(script.contains("/etc/eks/bootstrap.sh trbsht-cluster"));
    }
}
