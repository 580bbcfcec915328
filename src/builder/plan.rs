//! Bundle plans.
//!
//! A plan is everything an engine needs to bundle one target: entries,
//! output location, platform, the external set, and the environment
//! substitutions. One-shot builds and watch sessions derive their plan
//! the same way.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::builder::externals::{classify, ExternalSet};
use crate::builder::virtual_modules::{self, VirtualModule, VIRTUAL_DIR};
use crate::core::mode::Mode;
use crate::core::project::Project;
use crate::core::target::{Entry, TargetDescriptor, TargetKind};
use crate::env::{substitutions, EnvironmentSet};

/// Where a bundle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Node,
    Browser,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Node => "node",
            Platform::Browser => "browser",
        }
    }

    /// Module format of bundles for this platform.
    pub fn format(&self) -> &'static str {
        match self {
            Platform::Node => "cjs",
            Platform::Browser => "esm",
        }
    }
}

/// Where bundled output goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    /// One bundle file
    File(PathBuf),
    /// A directory with one bundle per entry
    Dir(PathBuf),
}

/// Derived bundling configuration of one target.
#[derive(Debug, Clone, Serialize)]
pub struct BundlePlan {
    /// Target label
    pub target: String,
    pub kind: TargetKind,
    pub mode: Mode,
    pub root: PathBuf,
    pub entry: Entry,
    pub output_dir: PathBuf,
    pub output: OutputLayout,
    pub platform: Platform,
    pub tree_shaking: bool,
    pub minify: bool,
    pub externals: ExternalSet,
    /// Composed environment, plain form
    pub env: EnvironmentSet,
    /// `process.env.KEY` replacements, literal form
    pub defines: BTreeMap<String, String>,
    #[serde(skip)]
    pub virtual_modules: Vec<VirtualModule>,
}

impl BundlePlan {
    /// Derive the plan of `target` within `project`.
    ///
    /// `ui_urls` are the dev-server URLs of UI targets known at this point.
    pub fn derive(
        project: &Project,
        target: &TargetDescriptor,
        ui_urls: &BTreeMap<String, String>,
    ) -> Self {
        let mode = project.mode();
        let env = project.env_for(target, ui_urls);
        let defines = substitutions(&env);
        let externals = classify(target, project.manifest(), &project.config().engine.framework);

        let platform = if target.kind.runs_on_node() {
            Platform::Node
        } else {
            Platform::Browser
        };

        let output = if platform == Platform::Node && target.entry.is_single() {
            OutputLayout::File(target.bundle_file())
        } else {
            OutputLayout::Dir(target.output.clone())
        };

        BundlePlan {
            target: target.label(),
            kind: target.kind,
            mode,
            root: target.root.clone(),
            entry: target.entry.clone(),
            output_dir: target.output.clone(),
            output,
            platform,
            tree_shaking: true,
            minify: mode.is_production(),
            externals,
            env,
            defines,
            virtual_modules: virtual_modules::helpers(target, project.targets(), mode, ui_urls),
        }
    }

    /// Directory the virtual modules are written to.
    pub fn virtual_dir(&self) -> PathBuf {
        self.output_dir.join(VIRTUAL_DIR)
    }

    /// Write the virtual modules and return the alias map.
    pub fn materialize(&self) -> Result<BTreeMap<String, PathBuf>> {
        virtual_modules::materialize(&self.virtual_modules, &self.virtual_dir())
    }

    /// Whether a changed path should be ignored by a watcher.
    ///
    /// Output, installed packages and VCS metadata never trigger a rebuild.
    pub fn is_ignored(&self, path: &Path) -> bool {
        if path.starts_with(&self.output_dir) {
            return true;
        }

        path.components().any(|c| match c {
            Component::Normal(name) => {
                name == "node_modules" || name == ".git" || name == ".triad"
            }
            _ => false,
        })
    }

    /// Files of the last build below the output directory, excluding the
    /// generated virtual modules.
    pub fn written_files(&self) -> Vec<PathBuf> {
        let virtual_dir = self.virtual_dir();
        crate::util::fs::list_files(&self.output_dir)
            .into_iter()
            .filter(|p| !p.starts_with(&virtual_dir))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ProjectFixture;

    #[test]
    fn test_host_plan() {
        let fixture = ProjectFixture::new()
            .file(
                "package.json",
                r#"{ "dependencies": { "shared-lib": "1.0.0" } }"#,
            )
            .file(
                "packages/host/package.json",
                r#"{ "main": "source/index.ts", "dependencies": { "sqlite3": "5" } }"#,
            );
        let project = fixture.load(Mode::Preview).unwrap();
        let plan = BundlePlan::derive(&project, project.host(), &BTreeMap::new());

        assert_eq!(plan.target, "host");
        assert_eq!(plan.platform, Platform::Node);
        assert_eq!(
            plan.output,
            OutputLayout::File(fixture.root().join("packages/host/dist/index.cjs"))
        );
        assert!(plan.tree_shaking);
        assert!(!plan.minify);
        assert!(plan.externals.contains("electron"));
        assert!(plan.externals.contains("sqlite3"));
        assert!(plan.externals.contains("shared-lib"));
        assert!(plan.externals.contains("node:fs"));
        assert_eq!(plan.defines["process.env.NODE_ENV"], "\"preview\"");
    }

    #[test]
    fn test_ui_plan_is_browser_dir() {
        let fixture = ProjectFixture::new().ui("main");
        let project = fixture.load(Mode::Production).unwrap();
        let ui = project.uis().next().unwrap();
        let plan = BundlePlan::derive(&project, ui, &BTreeMap::new());

        assert_eq!(plan.platform, Platform::Browser);
        assert_eq!(plan.platform.format(), "esm");
        assert_eq!(plan.output, OutputLayout::Dir(fixture.root().join("app/ui/main")));
        assert!(plan.minify);
    }

    #[test]
    fn test_ignored_paths() {
        let fixture = ProjectFixture::new();
        let project = fixture.load(Mode::Development).unwrap();
        let plan = BundlePlan::derive(&project, project.host(), &BTreeMap::new());
        let root = &plan.root;

        assert!(plan.is_ignored(&root.join("dist/index.cjs")));
        assert!(plan.is_ignored(&root.join("node_modules/x/index.js")));
        assert!(!plan.is_ignored(&root.join("source/index.ts")));
    }

    #[test]
    fn test_written_files_skip_virtual_modules() {
        let fixture = ProjectFixture::new();
        let project = fixture.load(Mode::Development).unwrap();
        let plan = BundlePlan::derive(&project, project.host(), &BTreeMap::new());

        plan.materialize().unwrap();
        std::fs::write(plan.output_dir.join("index.cjs"), "").unwrap();

        assert_eq!(plan.written_files(), [plan.output_dir.join("index.cjs")]);
    }
}
