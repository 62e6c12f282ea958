//! Error types for ekslab.
//!
//! This module defines the error types used throughout ekslab, providing
//! rich error information for debugging and user feedback. All errors are
//! fatal to a synthesis run: there is no partial-apply mode and no local
//! retry, mirroring the all-or-nothing semantics of the provisioning engine
//! the synthesized templates target.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ekslab operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for ekslab.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity Errors
    // ========================================================================
    /// No caller identity could be resolved from the credentials provider.
    #[error("No resolvable caller identity: {0}")]
    CredentialsUnavailable(String),

    // ========================================================================
    // Declaration Errors
    // ========================================================================
    /// Two resources were declared under the same logical id.
    #[error("Resource '{0}' is already declared")]
    ResourceConflict(String),

    /// A declared resource references a logical id that does not exist.
    #[error("Resource '{resource}' references unknown resource '{reference}'")]
    MissingReference {
        /// The resource holding the dangling reference
        resource: String,
        /// The logical id that was not found
        reference: String,
    },

    /// The declared plan cannot fit inside the available address space or
    /// service quota. Surfaced, never retried locally.
    #[error("Resource quota exceeded: {0}")]
    ResourceQuotaExceeded(String),

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle involving resource '{0}'")]
    DependencyCycle(String),

    // ========================================================================
    // Builder Errors
    // ========================================================================
    /// Two mutually exclusive options were requested together.
    #[error("Configuration conflict in '{construct}': {message}")]
    ConfigurationConflict {
        /// The construct that rejected the configuration
        construct: String,
        /// What conflicted
        message: String,
    },

    /// A builder step was invoked out of phase order.
    #[error("Construct '{construct}' cannot {operation} while in phase {phase}")]
    PhaseViolation {
        /// The construct being built
        construct: String,
        /// The operation that was attempted
        operation: String,
        /// The phase the builder was in
        phase: String,
    },

    // ========================================================================
    // Manifest Errors
    // ========================================================================
    /// A manifest document is structurally invalid.
    #[error("Invalid manifest '{name}': {message}")]
    ManifestInvalid {
        /// Manifest name
        name: String,
        /// What is wrong with it
        message: String,
    },

    /// A manifest consumes a resource no declared construct provides, or
    /// omits the dependency edge on its producer.
    #[error("Manifest '{manifest}' requires '{requirement}' which no declared construct provides")]
    ManifestOrderingViolation {
        /// Manifest name
        manifest: String,
        /// The capability or resource the manifest consumes
        requirement: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error loading a configuration file.
    #[error("Failed to load configuration from '{path}': {message}")]
    ConfigLoad {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Unknown scenario name.
    #[error("Unknown scenario '{0}'")]
    UnknownScenario(String),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Error {
    /// Creates a new configuration conflict error.
    pub fn configuration_conflict(
        construct: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConfigurationConflict {
            construct: construct.into(),
            message: message.into(),
        }
    }

    /// Creates a new phase violation error.
    pub fn phase_violation(
        construct: impl Into<String>,
        operation: impl Into<String>,
        phase: impl Into<String>,
    ) -> Self {
        Self::PhaseViolation {
            construct: construct.into(),
            operation: operation.into(),
            phase: phase.into(),
        }
    }

    /// Creates a new invalid manifest error.
    pub fn manifest_invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a new manifest ordering violation.
    pub fn manifest_ordering(
        manifest: impl Into<String>,
        requirement: impl Into<String>,
    ) -> Self {
        Self::ManifestOrderingViolation {
            manifest: manifest.into(),
            requirement: requirement.into(),
        }
    }

    /// Creates a new missing reference error.
    pub fn missing_reference(
        resource: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self::MissingReference {
            resource: resource.into(),
            reference: reference.into(),
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::CredentialsUnavailable(_) => 2,
            Error::ConfigurationConflict { .. } | Error::PhaseViolation { .. } => 3,
            Error::ManifestInvalid { .. } | Error::ManifestOrderingViolation { .. } => 4,
            Error::Config(_) | Error::ConfigLoad { .. } | Error::UnknownScenario(_) => 5,
            Error::ResourceConflict(_)
            | Error::MissingReference { .. }
            | Error::DependencyCycle(_)
            | Error::ResourceQuotaExceeded(_) => 6,
            _ => 1,
        }
    }
}
