//! # ekslab - EKS Troubleshooting Lab Builder
//!
//! ekslab synthesizes deliberately misconfigured EKS environments as
//! declarative deployment templates, one troubleshooting scenario at a
//! time. Each scenario reproduces a specific class of failure (node
//! bootstrap, launch-template drift, DNS, pod IP exhaustion, ingress,
//! storage) so it can be handed to a student to diagnose.
//!
//! ## Core Concepts
//!
//! - **ResourceGraph**: dependency-tracked set of declared resources,
//!   rendered deterministically as a template
//! - **IdentityResolver**: resolves the deploying principal once per run
//!   through an injected provider
//! - **NetworkProvisioner**: two-tier VPC layout (public + NAT-egress
//!   private subnets) replicated across availability zones
//! - **ClusterBuilder**: phase-checked skeleton every scenario shares;
//!   caller-first authorization, single capacity strategy, ordered
//!   manifests
//! - **ScenarioKind**: the catalog of lab variants
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      CLI Interface                        │
//! │               (clap-based command parsing)                │
//! └──────────────────────────────────────────────────────────┘
//!                             │
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Deployment                          │
//! │     (identity resolution + network + scenario build)      │
//! └──────────────────────────────────────────────────────────┘
//!          │                  │                   │
//!          ▼                  ▼                   ▼
//! ┌───────────────┐  ┌─────────────────┐  ┌────────────────┐
//! │ IdentityRes.  │  │ NetworkProvis.  │  │ ScenarioKind   │
//! │ (STS/static)  │  │ (VPC + subnets) │  │ (9 variants)   │
//! └───────────────┘  └─────────────────┘  └────────────────┘
//!                             │
//!                             ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                      ResourceGraph                        │
//! │        (petgraph-backed, rendered as a template)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use ekslab::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let provider = StaticIdentityProvider::new(Identity::new(
//!         "AIDAEXAMPLE",
//!         "arn:aws:iam::111122223333:user/lab-admin",
//!         "111122223333",
//!     ));
//!     let config = Config {
//!         scenario: ScenarioKind::AlbIngress,
//!         ..Config::default()
//!     };
//!     let synthesis = Deployment::new(config, provider).synthesize().await?;
//!     println!("{}", serde_json::to_string_pretty(&synthesis.template)?);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod auth;
pub mod capacity;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod graph;
pub mod iam;
pub mod identity;
pub mod manifest;
pub mod network;
pub mod scenario;
pub mod stack;

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::auth::AuthorizationMapping;
    pub use crate::capacity::{CapacityStrategy, LaunchTemplate, ManagedNodeGroup};
    pub use crate::cluster::{ClusterBuilder, ClusterHandle, ClusterOptions};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::graph::ResourceGraph;
    pub use crate::identity::{
        CallerIdentityProvider, Identity, IdentityResolver, StaticIdentityProvider,
    };
    pub use crate::manifest::Manifest;
    pub use crate::network::{NetworkConfig, NetworkHandle, NetworkProvisioner};
    pub use crate::scenario::ScenarioKind;
    pub use crate::stack::{Deployment, Synthesis};
}
