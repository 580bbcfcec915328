//! The packager collaborator.
//!
//! Packaging itself (installers, archives, signing) is left to an external
//! tool. Triad assembles the application directory and hands the tool a
//! configuration derived from the `[packager]` passthrough table.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::project::Project;
use crate::util::fs::{display_slash, write_string};
use crate::util::process::resolve_command;

/// Directory holding icons and other installer inputs.
pub const BUILD_RESOURCES_DIR: &str = "buildResources";

/// Directory installers are written to.
pub const BUILD_OUTPUT_DIR: &str = "buildOutput";

/// Everything a packager needs.
#[derive(Debug, Clone)]
pub struct PackageRequest {
    pub project_root: PathBuf,
    /// Assembled application directory
    pub app_dir: PathBuf,
    /// Packager configuration
    pub config: Value,
}

impl PackageRequest {
    /// Build the request for `project`, merging the passthrough config with
    /// the directories and resources triad manages.
    pub fn for_project(project: &Project) -> Self {
        let root = project.root();

        let managed = json!({
            "directories": {
                "app": display_slash(&project.app_dir()),
                "buildResources": display_slash(&root.join(BUILD_RESOURCES_DIR)),
                "output": format!("{}/${{os}} ${{arch}}", display_slash(&root.join(BUILD_OUTPUT_DIR))),
            },
            "extraFiles": project
                .config()
                .resources
                .iter()
                .map(|resource| json!({ "from": resource, "to": format!("{0}/{0}", resource) }))
                .collect::<Vec<_>>(),
        });

        PackageRequest {
            project_root: root.to_path_buf(),
            app_dir: project.app_dir(),
            config: deep_merge(project.config().packager.to_json(), managed),
        }
    }
}

/// Produces distributables from an assembled application directory.
#[async_trait]
pub trait Packager: Send + Sync {
    async fn package(&self, request: &PackageRequest) -> Result<()>;
}

/// Packager driven through its command line, e.g. `electron-builder`.
#[derive(Debug, Clone)]
pub struct CommandPackager {
    command: Vec<String>,
}

impl CommandPackager {
    pub fn new(command: Vec<String>) -> Self {
        CommandPackager { command }
    }

    /// Where the merged configuration is written before invoking the tool.
    pub fn config_file(project_root: &Path) -> PathBuf {
        project_root.join(".triad").join("packager.json")
    }
}

#[async_trait]
impl Packager for CommandPackager {
    async fn package(&self, request: &PackageRequest) -> Result<()> {
        let config_file = Self::config_file(&request.project_root);
        let mut content = serde_json::to_string_pretty(&request.config)?;
        content.push('\n');
        write_string(&config_file, &content)?;

        let process = resolve_command(&request.project_root, &self.command)?
            .arg("--config")
            .arg(&config_file)
            .arg("--projectDir")
            .arg(&request.project_root)
            .arg("--publish")
            .arg("never")
            .cwd(&request.project_root);

        tracing::debug!(command = %process.display_command(), "running packager");
        process.exec_and_check().await?;
        Ok(())
    }
}

/// Merge `overlay` into `base`.
///
/// Objects merge key by key, arrays are joined without duplicates, and any
/// other overlay value replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (Value::Array(mut base), Value::Array(overlay)) => {
            for value in overlay {
                if !base.contains(&value) {
                    base.push(value);
                }
            }
            Value::Array(base)
        }
        (Value::Null, overlay) => overlay,
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mode::Mode;
    use crate::test_support::ProjectFixture;

    #[test]
    fn test_deep_merge() {
        let base = json!({
            "appId": "com.example.app",
            "files": ["a"],
            "directories": { "output": "out", "app": "x" },
        });
        let overlay = json!({
            "files": ["a", "b"],
            "directories": { "app": "app" },
        });

        assert_eq!(
            deep_merge(base, overlay),
            json!({
                "appId": "com.example.app",
                "files": ["a", "b"],
                "directories": { "output": "out", "app": "app" },
            })
        );
    }

    #[test]
    fn test_merge_into_empty() {
        let overlay = json!({ "a": 1 });
        assert_eq!(deep_merge(json!({}), overlay.clone()), overlay);
        assert_eq!(deep_merge(Value::Null, overlay.clone()), overlay);
    }

    #[test]
    fn test_request_for_project() {
        let fixture = ProjectFixture::new().config(
            "resources = [\"icons\"]\n\n[packager.config]\nappId = \"com.example.app\"\n",
        );
        let project = fixture.load(Mode::Production).unwrap();
        let request = PackageRequest::for_project(&project);
        let root = display_slash(fixture.root());

        assert_eq!(request.app_dir, fixture.root().join("app"));
        assert_eq!(request.config["appId"], "com.example.app");
        assert_eq!(request.config["directories"]["app"], format!("{}/app", root));
        assert_eq!(
            request.config["directories"]["output"],
            format!("{}/buildOutput/${{os}} ${{arch}}", root)
        );
        assert_eq!(
            request.config["extraFiles"],
            json!([{ "from": "icons", "to": "icons/icons" }])
        );
    }
}
