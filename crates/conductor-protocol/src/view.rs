//! Mounted views and the mount request/result pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ModuleId, ViewId};

/// Named layout slot a view is placed into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountPoint {
    #[default]
    Main,
    Sidebar,
    Overlay,
    Pip,
    Fullscreen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountedView {
    pub id: ViewId,
    pub module_id: ModuleId,
    pub tool_name: String,
    pub resource_uri: String,
    pub mount_point: MountPoint,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountViewRequest {
    pub module_id: ModuleId,
    pub tool_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub mount_point: MountPoint,
}

impl MountViewRequest {
    pub fn new(
        module_id: impl Into<ModuleId>,
        tool_name: impl Into<String>,
        mount_point: MountPoint,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            tool_name: tool_name.into(),
            args: Map::new(),
            mount_point,
        }
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.insert(name.into(), value);
        self
    }
}

/// What the host needs to render a mounted view. Rendering is the host's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MountedViewResult {
    pub view: MountedView,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Value>,
    pub tool_result: Value,
}
