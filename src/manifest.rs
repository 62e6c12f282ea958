//! Kubernetes workload manifests.
//!
//! Scenario payloads (CoreDNS overrides, the 2048 game, filler DaemonSets,
//! and so on) live as YAML fixtures under `manifests/` and are embedded at
//! compile time; this module parses and validates them and tracks the two
//! things the declaration layer cares about:
//!
//! - the explicit overwrite policy each manifest is applied with
//! - what each manifest *consumes* (e.g. an ingress class supplied by a
//!   controller add-on), so the builder can demand an ordering edge on the
//!   producer and reject a manifest that would be applied before it

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{Error, Result};

/// Raw YAML fixture payloads shipped with the crate.
pub mod fixtures {
    /// nginx deployment, 2 replicas (6-5 lab)
    pub const NGINX_DEPLOYMENT: &str = include_str!("../manifests/nginx-deployment.yaml");
    /// PodDisruptionBudget with `maxUnavailable: 0` pinning nginx (6-5 lab)
    pub const NGINX_PDB: &str = include_str!("../manifests/nginx-pdb.yaml");
    /// CoreDNS deployment node-affined to the system node group (7-2 lab)
    pub const COREDNS_DEPLOYMENT: &str = include_str!("../manifests/coredns-deployment.yaml");
    /// CoreDNS Corefile without upstream forwarding (8-4 lab)
    pub const COREDNS_CONFIGMAP_NO_FORWARD: &str =
        include_str!("../manifests/coredns-configmap-no-forward.yaml");
    /// CoreDNS Corefile with upstream forwarding restored (9-2 lab)
    pub const COREDNS_CONFIGMAP: &str = include_str!("../manifests/coredns-configmap.yaml");
    /// VPC CNI DaemonSet pin (8-2 lab)
    pub const VPC_CNI_DAEMONSET: &str = include_str!("../manifests/vpc-cni-daemonset.yaml");
    /// Two filler DaemonSets plus a 4-replica nginx deployment (8-2 lab)
    pub const IP_PRESSURE_WORKLOADS: &str =
        include_str!("../manifests/ip-pressure-workloads.yaml");
    /// nettools pod with a deliberately broken dnsConfig (8-4 lab)
    pub const NETTOOLS_POD: &str = include_str!("../manifests/nettools-pod.yaml");
    /// 2048 game deployment, service and ALB ingress (9-2 lab)
    pub const GAME_2048: &str = include_str!("../manifests/game-2048.yaml");
}

/// All fixtures by name, for bulk validation.
pub static ALL_FIXTURES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("nginx-deployment", fixtures::NGINX_DEPLOYMENT),
        ("nginx-pdb", fixtures::NGINX_PDB),
        ("coredns-deployment", fixtures::COREDNS_DEPLOYMENT),
        (
            "coredns-configmap-no-forward",
            fixtures::COREDNS_CONFIGMAP_NO_FORWARD,
        ),
        ("coredns-configmap", fixtures::COREDNS_CONFIGMAP),
        ("vpc-cni-daemonset", fixtures::VPC_CNI_DAEMONSET),
        ("ip-pressure-workloads", fixtures::IP_PRESSURE_WORKLOADS),
        ("nettools-pod", fixtures::NETTOOLS_POD),
        ("game-2048", fixtures::GAME_2048),
    ])
});

/// A named set of Kubernetes documents applied to a cluster as one unit.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Manifest name, used as the construct id suffix
    pub name: String,
    /// Whether existing objects are overwritten on apply
    pub overwrite: bool,
    /// Parsed documents
    pub documents: Vec<Value>,
    /// Logical ids of constructs this manifest must be applied after
    pub depends_on: Vec<String>,
}

impl Manifest {
    /// Parse a (possibly multi-document) YAML payload.
    ///
    /// Every document must carry `apiVersion`, `kind` and `metadata`;
    /// anything else is a construct-time [`Error::ManifestInvalid`] that
    /// aborts the run before declaration completes.
    pub fn from_yaml(name: impl Into<String>, yaml: &str) -> Result<Self> {
        let name = name.into();
        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(yaml) {
            let value: serde_json::Value = serde::Deserialize::deserialize(document)
                .map_err(|e| Error::manifest_invalid(&name, e.to_string()))?;
            if value.is_null() {
                continue;
            }
            validate_document(&name, &value)?;
            documents.push(value);
        }
        if documents.is_empty() {
            return Err(Error::manifest_invalid(&name, "no documents"));
        }
        Ok(Self {
            name,
            overwrite: false,
            documents,
            depends_on: Vec::new(),
        })
    }

    /// Set the overwrite policy.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Record an explicit ordering dependency on another construct.
    pub fn with_dependency(mut self, construct_id: impl Into<String>) -> Self {
        self.depends_on.push(construct_id.into());
        self
    }

    /// Capabilities this manifest consumes from cluster add-ons.
    ///
    /// Currently recognized: an `Ingress` document naming an
    /// `ingressClassName` consumes `ingress-class:<name>`, which must be
    /// provided by a controller construct declared beforehand.
    pub fn required_capabilities(&self) -> Vec<String> {
        let mut requirements = Vec::new();
        for document in &self.documents {
            if document["kind"] == "Ingress" {
                if let Some(class) = document["spec"]["ingressClassName"].as_str() {
                    requirements.push(format!("ingress-class:{class}"));
                }
            }
        }
        requirements.sort();
        requirements.dedup();
        requirements
    }

    /// The `kind/namespace/name` identifiers of the contained documents.
    pub fn object_names(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(|d| {
                let kind = d["kind"].as_str().unwrap_or("?");
                let namespace = d["metadata"]["namespace"].as_str().unwrap_or("default");
                let name = d["metadata"]["name"].as_str().unwrap_or("?");
                format!("{kind}/{namespace}/{name}")
            })
            .collect()
    }
}

fn validate_document(name: &str, document: &Value) -> Result<()> {
    if !document.is_object() {
        return Err(Error::manifest_invalid(name, "document is not a mapping"));
    }
    for field in ["apiVersion", "kind"] {
        if document[field].as_str().map_or(true, str::is_empty) {
            return Err(Error::manifest_invalid(
                name,
                format!("document is missing '{field}'"),
            ));
        }
    }
    if !document["metadata"].is_object() {
        return Err(Error::manifest_invalid(name, "document is missing 'metadata'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn all_shipped_fixtures_parse() {
        for (name, yaml) in ALL_FIXTURES.iter() {
            let manifest = Manifest::from_yaml(*name, yaml)
                .unwrap_or_else(|e| panic!("fixture {name}: {e}"));
            assert!(!manifest.documents.is_empty());
        }
    }

    #[test]
    fn ingress_class_is_detected_as_a_requirement() {
        let manifest = Manifest::from_yaml("game", fixtures::GAME_2048).unwrap();
        assert_eq!(
            manifest.required_capabilities(),
            vec!["ingress-class:alb".to_string()]
        );
    }

    #[test]
    fn malformed_yaml_is_an_invalid_manifest() {
        let err = Manifest::from_yaml("broken", "kind: [unclosed").unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid { .. }));
    }

    #[test]
    fn document_without_kind_is_rejected() {
        let err = Manifest::from_yaml("bad", "apiVersion: v1\nmetadata:\n  name: x\n").unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid { .. }));
    }

    #[test]
    fn document_without_metadata_is_rejected() {
        let err = Manifest::from_yaml("bad", "apiVersion: v1\nkind: Pod\n").unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid { .. }));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let err = Manifest::from_yaml("empty", "").unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid { .. }));
    }

    #[test]
    fn multi_document_payloads_split() {
        let manifest = Manifest::from_yaml("pressure", fixtures::IP_PRESSURE_WORKLOADS).unwrap();
        assert_eq!(manifest.documents.len(), 3);
        assert!(manifest
            .object_names()
            .contains(&"DaemonSet/kube-system/ds-a".to_string()));
    }
}
