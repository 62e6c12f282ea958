//! Deployment orchestration.
//!
//! A [`Deployment`] ties the pieces together: resolve the caller identity
//! once, provision the network the scenario wants, build the scenario, and
//! render the finished graph as a template. Any error along the way aborts
//! the whole synthesis; there is no partial output to hand to the
//! provisioning engine.

use serde_json::Value;

use crate::cluster::{ClusterHandle, ClusterOptions};
use crate::config::Config;
use crate::error::Result;
use crate::graph::ResourceGraph;
use crate::identity::{CallerIdentityProvider, IdentityResolver};
use crate::scenario::ScenarioKind;

/// The result of one synthesis run.
#[derive(Debug)]
pub struct Synthesis {
    /// Rendered deployment template
    pub template: Value,
    /// Handle to the built cluster
    pub cluster: ClusterHandle,
    /// The underlying resource graph
    pub graph: ResourceGraph,
}

/// One lab deployment: a configuration plus an identity source.
pub struct Deployment<P> {
    config: Config,
    resolver: IdentityResolver<P>,
}

impl<P: CallerIdentityProvider> Deployment<P> {
    /// A deployment over the given identity provider.
    pub fn new(config: Config, provider: P) -> Self {
        Self {
            config,
            resolver: IdentityResolver::new(provider),
        }
    }

    /// The scenario this deployment provisions.
    pub fn scenario(&self) -> ScenarioKind {
        self.config.scenario
    }

    /// Synthesize the deployment template.
    pub async fn synthesize(&self) -> Result<Synthesis> {
        self.config.validate()?;
        let identity = self.resolver.resolve().await?;
        tracing::info!(caller = %identity.arn, account = %identity.account, "resolved caller identity");

        let scenario = self.config.scenario;
        let mut graph = ResourceGraph::new().with_description(format!(
            "EKS troubleshooting lab: {} ({})",
            scenario,
            scenario.description()
        ));

        let network_config = scenario.network_config(&self.config.network);
        let prefix = if scenario.owns_network() {
            "Scenario"
        } else {
            "Trbsht"
        };
        let network =
            crate::network::NetworkProvisioner::provision(&mut graph, prefix, &network_config)?;

        let base = ClusterOptions {
            endpoint_public_cidrs: self.config.cluster.endpoint_public_cidrs.clone(),
            ..ClusterOptions::default()
        };
        let cluster = scenario.build(
            &mut graph,
            &self.config.cluster.name,
            base,
            network,
            identity,
        )?;

        graph.validate()?;
        let template = graph.render_template()?;
        tracing::info!(
            scenario = %scenario,
            resources = graph.len(),
            "synthesis complete"
        );
        Ok(Synthesis {
            template,
            cluster,
            graph,
        })
    }
}
