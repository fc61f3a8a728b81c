use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use conductor_events::JsonlFileSink;
use conductor_kernel::Conductor;
use conductor_protocol::{
    ConductorError, ModuleId, ModuleManifest, ModuleRegistration, RuntimeProfile,
    ValidationBoundary, ValidationIssue, ValidationOutcome, ValidationPolicy, WiringEdge,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

pub const RUNTIME_FILE: &str = ".mcp-canvas-runtime.json";
pub const DEFAULT_TRACE_FILE: &str = "flight-recorder.jsonl";

/// Host input that failed its boundary check. Carries the outcome so the
/// caller can print it verbatim.
#[derive(Debug, Error)]
#[error("{}", .0.message)]
pub struct RejectedInput(pub ValidationOutcome);

impl RejectedInput {
    pub fn new(
        boundary: ValidationBoundary,
        policy: &ValidationPolicy,
        message: impl Into<String>,
        issues: Vec<ValidationIssue>,
    ) -> Self {
        Self(ValidationOutcome::failure(
            boundary,
            policy.mode(boundary),
            message,
            issues,
        ))
    }
}

/// Manifest and runtime profile read by `connect --profile`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleProfileFile {
    pub manifest: ModuleManifest,
    #[serde(default)]
    pub runtime: Option<RuntimeProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedModule {
    pub id: ModuleId,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ModuleManifest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<RuntimeProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_adapter_id: Option<String>,
}

impl PersistedModule {
    pub fn registration(&self) -> ModuleRegistration {
        let manifest = self
            .manifest
            .clone()
            .unwrap_or_else(|| default_manifest(self.id.as_str()));
        ModuleRegistration {
            id: self.id.clone(),
            url: self.url.clone(),
            manifest,
            profile: self.profile.clone(),
            transport_adapter_id: self.transport_adapter_id.clone(),
        }
    }
}

pub fn default_manifest(id: &str) -> ModuleManifest {
    ModuleManifest::new(id, "0.1.0", id)
}

/// The daemon's persisted modules, wiring and policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigFile {
    #[serde(default)]
    pub modules: IndexMap<ModuleId, PersistedModule>,
    #[serde(default)]
    pub wiring: Vec<WiringEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_file: Option<PathBuf>,
    #[serde(default)]
    pub validation_policy: ValidationPolicy,
}

impl RuntimeConfigFile {
    /// Read the runtime file. A missing file is an empty config; unreadable
    /// JSON is rejected at `cli.runtimeConfig`.
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "no runtime file; starting empty");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed reading runtime file {}", path.display()))?;

        let defaults = ValidationPolicy::default();
        let document: serde_json::Value = serde_json::from_str(&text).map_err(|error| {
            RejectedInput::new(
                ValidationBoundary::CliRuntimeConfig,
                &defaults,
                format!("Runtime config at {} is not valid JSON.", path.display()),
                vec![ValidationIssue::new("<root>", error.to_string(), "invalid_json")],
            )
        })?;
        let config = serde_json::from_value(document).map_err(|error| {
            RejectedInput::new(
                ValidationBoundary::CliRuntimeConfig,
                &defaults,
                format!("Runtime config at {} failed schema validation.", path.display()),
                vec![ValidationIssue::new("<root>", error.to_string(), "invalid_type")],
            )
        })?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let rendered = serde_json::to_string_pretty(self)?;
        fs::write(path, rendered)
            .await
            .with_context(|| format!("failed writing runtime file {}", path.display()))?;
        info!(path = %path.display(), modules = self.modules.len(), edges = self.wiring.len(), "runtime file saved");
        Ok(())
    }

    pub fn trace_path(&self) -> PathBuf {
        self.trace_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TRACE_FILE))
    }

    /// A conductor with this file's policy, recording to its trace file.
    pub fn conductor(&self) -> Conductor {
        Conductor::builder()
            .policy(self.validation_policy)
            .sink(Arc::new(JsonlFileSink::new(self.trace_path())))
            .build()
    }

    /// Register every module, discover them, and reconnect the saved wiring.
    ///
    /// Saved edges that no longer validate are skipped with a warning so one
    /// stale edge does not block the rest.
    pub async fn hydrate(&self, conductor: &Conductor) -> Result<()> {
        for module in self.modules.values() {
            conductor.register_module(module.registration()).await?;
        }
        if !self.modules.is_empty() {
            conductor.discover_capabilities(None).await?;
        }
        for edge in &self.wiring {
            match conductor.connect_ports(edge.clone()) {
                Ok(_) => {}
                Err(ConductorError::WiringRejected(edge_id)) => {
                    warn!(%edge_id, "saved wiring edge no longer validates; skipped");
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use conductor_protocol::ValidationMode;
    use serde_json::json;

    use super::*;

    fn unique_test_root(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("{name}-{nanos}"))
    }

    #[tokio::test]
    async fn missing_file_is_empty_config() -> Result<()> {
        let root = unique_test_root("conductord-missing");
        let config = RuntimeConfigFile::load(&root.join(RUNTIME_FILE)).await?;
        assert!(config.modules.is_empty());
        assert_eq!(config.trace_path(), PathBuf::from(DEFAULT_TRACE_FILE));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_json_is_rejected_with_an_outcome() -> Result<()> {
        let root = unique_test_root("conductord-invalid");
        fs::create_dir_all(&root).await?;
        let path = root.join(RUNTIME_FILE);
        fs::write(&path, "{ not json").await?;

        let error = RuntimeConfigFile::load(&path).await.unwrap_err();
        let rejected = error.downcast_ref::<RejectedInput>().map(|r| &r.0);
        let outcome = rejected.ok_or_else(|| anyhow::anyhow!("expected rejected input"))?;
        assert_eq!(outcome.boundary, ValidationBoundary::CliRuntimeConfig);
        assert_eq!(outcome.mode, ValidationMode::Enforce);
        assert_eq!(outcome.issues[0].code, "invalid_json");

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }

    #[tokio::test]
    async fn saved_file_round_trips_through_load() -> Result<()> {
        let root = unique_test_root("conductord-save");
        fs::create_dir_all(&root).await?;
        let path = root.join(RUNTIME_FILE);
        let config: RuntimeConfigFile = serde_json::from_value(json!({
            "modules": {
                "pdf": { "id": "pdf", "url": "http://localhost:3001/mcp" }
            },
            "validationPolicy": { "conductor.portSignal": "enforce" }
        }))?;
        config.save(&path).await?;

        let loaded = RuntimeConfigFile::load(&path).await?;
        assert_eq!(loaded, config);
        let registration = loaded.modules[0].registration();
        assert_eq!(registration.manifest.display_name, "pdf");
        assert_eq!(
            loaded.validation_policy.mode(ValidationBoundary::CliFlags),
            ValidationMode::Enforce
        );

        let _ = fs::remove_dir_all(root).await;
        Ok(())
    }
}
