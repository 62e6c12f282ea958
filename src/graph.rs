//! Declarative resource graph.
//!
//! This module provides the substrate every construct declares into: a set
//! of named resources plus explicit dependency edges between them. The graph
//! is rendered into a CloudFormation-style JSON template that the external
//! provisioning engine converges on; nothing here talks to AWS directly.
//!
//! Ordering is enforced purely through declaration order and explicit edges.
//! The graph enables:
//!
//! - Duplicate logical-id detection at declaration time
//! - Dangling-reference detection when an edge is recorded
//! - Cycle detection before the template is rendered
//! - Deterministic rendering (identical inputs produce identical bytes)

use std::collections::HashMap;

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// A single declared resource: a logical id, a provider type, and an opaque
/// property bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Unique logical id within the graph
    pub logical_id: String,
    /// Provider resource type, e.g. `AWS::EKS::Cluster`
    pub resource_type: String,
    /// Resource properties as structured JSON
    pub properties: Value,
}

/// Why one resource depends on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Explicitly recorded by a construct (e.g. manifest after controller)
    Explicit,
    /// Implied by a property reference
    Reference,
    /// Pure apply-ordering constraint
    Ordering,
}

/// A reference to a declared resource, handed back by [`ResourceGraph::declare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    /// Logical id of the declared resource
    pub logical_id: String,
}

impl ResourceRef {
    /// A `{"Ref": id}` intrinsic pointing at this resource.
    pub fn reference(&self) -> Value {
        json!({ "Ref": self.logical_id })
    }

    /// A `{"Fn::GetAtt": [id, attr]}` intrinsic for one of this resource's
    /// runtime attributes.
    pub fn get_att(&self, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [self.logical_id, attribute] })
    }
}

/// The declarative resource graph for one deployment.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    graph: DiGraph<Resource, DependencyKind>,
    node_indices: HashMap<String, NodeIndex>,
    description: Option<String>,
}

impl ResourceGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the template description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a resource. Fails with [`Error::ResourceConflict`] when the
    /// logical id is already taken.
    pub fn declare(
        &mut self,
        logical_id: impl Into<String>,
        resource_type: impl Into<String>,
        properties: Value,
    ) -> Result<ResourceRef> {
        let logical_id = logical_id.into();
        if self.node_indices.contains_key(&logical_id) {
            return Err(Error::ResourceConflict(logical_id));
        }
        let idx = self.graph.add_node(Resource {
            logical_id: logical_id.clone(),
            resource_type: resource_type.into(),
            properties,
        });
        self.node_indices.insert(logical_id.clone(), idx);
        tracing::debug!(resource = %logical_id, "declared resource");
        Ok(ResourceRef { logical_id })
    }

    /// Whether a resource with the given logical id has been declared.
    pub fn contains(&self, logical_id: &str) -> bool {
        self.node_indices.contains_key(logical_id)
    }

    /// Number of declared resources.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Look up a declared resource.
    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.node_indices
            .get(logical_id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    /// Mutable access to a declared resource's properties. Used for
    /// post-declaration property overrides such as launch-template revisions.
    pub fn properties_mut(&mut self, logical_id: &str) -> Option<&mut Value> {
        self.node_indices
            .get(logical_id)
            .copied()
            .and_then(|idx| self.graph.node_weight_mut(idx))
            .map(|r| &mut r.properties)
    }

    /// Record that `dependent` must be applied after `dependency`.
    ///
    /// Both ends must already be declared; a dangling end is a
    /// [`Error::MissingReference`], caught here rather than at apply time.
    pub fn add_dependency(
        &mut self,
        dependent: &str,
        dependency: &str,
        kind: DependencyKind,
    ) -> Result<()> {
        let dep_idx = *self
            .node_indices
            .get(dependent)
            .ok_or_else(|| Error::missing_reference(dependent, dependent))?;
        let on_idx = *self
            .node_indices
            .get(dependency)
            .ok_or_else(|| Error::missing_reference(dependent, dependency))?;
        self.graph.add_edge(on_idx, dep_idx, kind);
        Ok(())
    }

    /// The logical ids `logical_id` depends on, sorted.
    pub fn dependencies_of(&self, logical_id: &str) -> Vec<String> {
        let Some(&idx) = self.node_indices.get(logical_id) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .filter_map(|n| self.graph.node_weight(n))
            .map(|r| r.logical_id.clone())
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }

    /// Validate the graph: every edge already checked at insertion, so only
    /// cycles remain. Fails with [`Error::DependencyCycle`].
    pub fn validate(&self) -> Result<()> {
        toposort(&self.graph, None).map_err(|cycle| {
            let id = self
                .graph
                .node_weight(cycle.node_id())
                .map(|r| r.logical_id.clone())
                .unwrap_or_default();
            Error::DependencyCycle(id)
        })?;
        Ok(())
    }

    /// Render the graph into a CloudFormation-style template.
    ///
    /// Resources appear in declaration order and `DependsOn` lists are
    /// sorted, so rendering is deterministic: the same declarations always
    /// produce the same bytes, which is what makes a re-synthesis diff
    /// against the previous template a reliable no-op check.
    pub fn render_template(&self) -> Result<Value> {
        self.validate()?;

        let mut resources = IndexMap::new();
        for idx in self.graph.node_indices() {
            let resource = &self.graph[idx];
            let mut entry = IndexMap::new();
            entry.insert("Type".to_string(), json!(resource.resource_type));
            entry.insert("Properties".to_string(), resource.properties.clone());
            let depends_on = self.dependencies_of(&resource.logical_id);
            if !depends_on.is_empty() {
                entry.insert("DependsOn".to_string(), json!(depends_on));
            }
            resources.insert(resource.logical_id.clone(), entry);
        }

        let mut template = IndexMap::new();
        template.insert(
            "AWSTemplateFormatVersion".to_string(),
            json!("2010-09-09"),
        );
        if let Some(description) = &self.description {
            template.insert("Description".to_string(), json!(description));
        }
        template.insert("Resources".to_string(), serde_json::to_value(resources)?);
        Ok(serde_json::to_value(template)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_graph() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph
            .declare("Vpc", "AWS::EC2::VPC", json!({"CidrBlock": "10.0.0.0/16"}))
            .unwrap();
        graph
            .declare("Cluster", "AWS::EKS::Cluster", json!({"Name": "lab"}))
            .unwrap();
        graph
            .add_dependency("Cluster", "Vpc", DependencyKind::Reference)
            .unwrap();
        graph
    }

    #[test]
    fn duplicate_logical_id_is_a_conflict() {
        let mut graph = sample_graph();
        let err = graph
            .declare("Vpc", "AWS::EC2::VPC", json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::ResourceConflict(id) if id == "Vpc"));
    }

    #[test]
    fn dangling_dependency_is_caught_at_declaration() {
        let mut graph = sample_graph();
        let err = graph
            .add_dependency("Cluster", "NoSuchThing", DependencyKind::Explicit)
            .unwrap_err();
        assert!(matches!(err, Error::MissingReference { reference, .. } if reference == "NoSuchThing"));
    }

    #[test]
    fn cycles_fail_validation() {
        let mut graph = sample_graph();
        graph
            .add_dependency("Vpc", "Cluster", DependencyKind::Ordering)
            .unwrap();
        assert!(matches!(graph.validate(), Err(Error::DependencyCycle(_))));
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = sample_graph().render_template().unwrap();
        let b = sample_graph().render_template().unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn depends_on_appears_in_rendered_template() {
        let template = sample_graph().render_template().unwrap();
        assert_eq!(
            template["Resources"]["Cluster"]["DependsOn"],
            json!(["Vpc"])
        );
        assert_eq!(
            template["Resources"]["Vpc"]["Type"],
            json!("AWS::EC2::VPC")
        );
    }
}
