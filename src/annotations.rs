//! Annotation keys the engine reads and writes on managed objects.
//!
//! All keys share the `kubedynamicscaler.io/` domain prefix. The values are
//! always strings: integers are rendered decimal, timestamps are RFC3339 UTC.

use std::fmt;
use std::str::FromStr;

pub const PREFIX: &str = "kubedynamicscaler.io/";

pub const ORIGINAL_REPLICAS: &str = "kubedynamicscaler.io/original-replicas";
pub const OVERRIDE_CONTROLLER: &str = "kubedynamicscaler.io/override-controller";
pub const GLOBAL_CONFIG_MANAGED: &str = "kubedynamicscaler.io/global-config-managed";
pub const MANAGED: &str = "kubedynamicscaler.io/managed";
pub const MANAGEMENT_MODE: &str = "kubedynamicscaler.io/management-mode";
pub const LAST_UPDATE: &str = "kubedynamicscaler.io/last-update";

pub const HPA_MANAGED: &str = "kubedynamicscaler.io/hpa-managed";
pub const HPA_ORIGINAL_MIN: &str = "kubedynamicscaler.io/hpa-original-min";
pub const HPA_ORIGINAL_MAX: &str = "kubedynamicscaler.io/hpa-original-max";
pub const LAST_HPA_UPDATE: &str = "kubedynamicscaler.io/last-hpa-update";

pub const TRUE: &str = "true";

/// Which policy kind currently governs an object. An object is managed by
/// at most one of these at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedBy {
    Override,
    Global,
}

impl ManagedBy {
    pub fn annotation_key(self) -> &'static str {
        match self {
            ManagedBy::Override => OVERRIDE_CONTROLLER,
            ManagedBy::Global => GLOBAL_CONFIG_MANAGED,
        }
    }

    fn other_key(self) -> &'static str {
        match self {
            ManagedBy::Override => GLOBAL_CONFIG_MANAGED,
            ManagedBy::Global => OVERRIDE_CONTROLLER,
        }
    }

    /// Set this kind's annotation to `"true"` and clear the other one, on
    /// whatever annotation map is passed in.
    pub fn stamp(self, annotations: &mut std::collections::BTreeMap<String, String>) {
        annotations.insert(self.annotation_key().to_string(), TRUE.to_string());
        annotations.remove(self.other_key());
    }
}

/// Whether replicas are driven directly on the Deployment or indirectly via
/// an HPA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementMode {
    Direct,
    Hpa,
}

impl fmt::Display for ManagementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagementMode::Direct => write!(f, "direct"),
            ManagementMode::Hpa => write!(f, "hpa"),
        }
    }
}

impl FromStr for ManagementMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ManagementMode::Direct),
            "hpa" => Ok(ManagementMode::Hpa),
            other => Err(anyhow::anyhow!("unknown management-mode annotation value {other:?}")),
        }
    }
}

/// Render `now` as the RFC3339 UTC timestamp the `last-update`/`last-hpa-update`
/// annotations expect.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
