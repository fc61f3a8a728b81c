//! Error types for conductor operations.

use thiserror::Error;

use crate::ids::{EdgeId, ModuleId};
use crate::validation::ValidationBoundary;

/// Errors raised by conductor operations.
///
/// Every variant is raised only after the matching audit event (outcome,
/// rejection, or error) has been appended to the log.
#[derive(Debug, Error)]
pub enum ConductorError {
    /// A structural check failed at a boundary running in `enforce` mode.
    #[error("{message}")]
    Validation {
        boundary: ValidationBoundary,
        message: String,
    },
    #[error("Module {0} is not registered.")]
    ModuleNotRegistered(ModuleId),
    #[error("Tool {tool} not found for module {module_id}.")]
    ToolNotFound { module_id: ModuleId, tool: String },
    #[error("Tool {tool} does not expose _meta.ui.resourceUri.")]
    UiResourceMissing { module_id: ModuleId, tool: String },
    #[error("Module {module_id} rejected: {reason}")]
    ModuleRejected { module_id: ModuleId, reason: String },
    #[error("Wiring edge {0} failed validation.")]
    WiringRejected(EdgeId),
    /// The remote module failed to connect, answer, or return usable content.
    #[error("module {module_id}: {message}")]
    Remote { module_id: ModuleId, message: String },
    /// The periodic reducer self-check found a snapshot that violates the
    /// public state contract.
    #[error("reducer consistency failure: {0}")]
    Consistency(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(String),
}

impl ConductorError {
    pub fn remote(module_id: &ModuleId, error: impl std::fmt::Display) -> Self {
        Self::Remote {
            module_id: module_id.clone(),
            message: error.to_string(),
        }
    }

    /// True for failures caused by missing modules, tools, ports or edges.
    pub fn is_referential(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotRegistered(_)
                | Self::ToolNotFound { .. }
                | Self::UiResourceMissing { .. }
                | Self::ModuleRejected { .. }
                | Self::WiringRejected(_)
        )
    }
}

impl From<serde_json::Error> for ConductorError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Convenience result type for conductor operations.
pub type ConductorResult<T> = Result<T, ConductorError>;
