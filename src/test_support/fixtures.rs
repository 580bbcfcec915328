//! On-disk project fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::config::CONFIG_FILE;
use crate::core::mode::Mode;
use crate::core::project::Project;
use crate::error::ConfigError;

/// A temporary project with a host package at `packages/host`.
///
/// Bridges and UIs added through [`ProjectFixture::bridge`] and
/// [`ProjectFixture::ui`] get their own package at
/// `packages/<kind>-<id>` and a matching `Triad.toml` entry.
#[derive(Debug)]
pub struct ProjectFixture {
    dir: TempDir,
    /// Top-level configuration written before any target table
    extra: String,
    bridges: Vec<String>,
    uis: Vec<String>,
}

impl ProjectFixture {
    /// Create a project with only a host target.
    pub fn new() -> Self {
        let fixture = ProjectFixture {
            dir: TempDir::new().expect("failed to create temp dir"),
            extra: String::new(),
            bridges: Vec::new(),
            uis: Vec::new(),
        };
        fixture.package("packages/host")
    }

    /// Create a package with a manifest and `source/index.ts`.
    pub fn package(self, rel: &str) -> Self {
        let name = rel.rsplit('/').next().unwrap_or(rel);
        self.file(
            &format!("{}/package.json", rel),
            &format!(
                "{{\n  \"name\": \"{}\",\n  \"main\": \"source/index.ts\"\n}}\n",
                name
            ),
        )
        .file(&format!("{}/source/index.ts", rel), "export {};\n")
    }

    /// Add a bridge target.
    pub fn bridge(mut self, id: &str) -> Self {
        self.bridges.push(id.to_string());
        self.package(&format!("packages/bridge-{}", id))
    }

    /// Add a UI target.
    pub fn ui(mut self, id: &str) -> Self {
        self.uis.push(id.to_string());
        self.package(&format!("packages/ui-{}", id))
    }

    /// Append raw configuration, placed before the target tables.
    pub fn config(mut self, extra: &str) -> Self {
        self.extra.push_str(extra);
        self.extra.push('\n');
        self
    }

    /// Write a file relative to the project root.
    pub fn file(self, rel: &str, content: &str) -> Self {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create fixture dir");
        }
        fs::write(&path, content).expect("failed to write fixture file");
        self
    }

    /// Get the project root.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Render `Triad.toml`.
    pub fn config_text(&self) -> String {
        let mut text = self.extra.clone();
        text.push_str("\n[host]\npackage = \"packages/host\"\n");
        for id in &self.bridges {
            text.push_str(&format!(
                "\n[[bridge]]\nid = \"{id}\"\npackage = \"packages/bridge-{id}\"\n"
            ));
        }
        for id in &self.uis {
            text.push_str(&format!(
                "\n[[ui]]\nid = \"{id}\"\npackage = \"packages/ui-{id}\"\n"
            ));
        }
        text
    }

    /// Write `Triad.toml` and return its path.
    pub fn write_config(&self) -> PathBuf {
        let path = self.dir.path().join(CONFIG_FILE);
        fs::write(&path, self.config_text()).expect("failed to write config");
        path
    }

    /// Write the configuration and initialize the project in `mode`.
    pub fn load(&self, mode: Mode) -> Result<Project, ConfigError> {
        self.write_config();
        Project::discover(self.root(), None, Some(mode))
    }
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}
