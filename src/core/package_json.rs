//! `package.json` manifests of the project and of each target.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of a package manifest.
pub const PACKAGE_JSON: &str = "package.json";

/// The subset of `package.json` the orchestrator reads and writes.
///
/// Unknown fields are preserved so a manifest can be rewritten without
/// losing information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub module_type: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageJson {
    /// Load `package.json` from a package directory.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(PACKAGE_JSON);

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Manifest {
            path: path.clone(),
            message: e.to_string(),
        })?;

        Self::parse(&content, &path)
    }

    /// Parse manifest content.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Serialize as pretty JSON with a trailing newline.
    pub fn to_pretty_json(&self) -> String {
        let mut json = serde_json::to_string_pretty(self).unwrap_or_default();
        json.push('\n');
        json
    }

    /// Names of runtime dependencies.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }
}

/// Locate an installed package's directory the way a node resolver would:
/// `node_modules/<name>/package.json` in `from` or any ancestor.
pub fn resolve_installed(from: &Path, name: &str) -> Option<PathBuf> {
    from.ancestors()
        .map(|dir| dir.join("node_modules").join(name))
        .find(|dir| dir.join(PACKAGE_JSON).is_file())
}
