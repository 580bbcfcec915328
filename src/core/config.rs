//! `Triad.toml` project configuration.
//!
//! ```toml
//! mode = "development"
//! resources = ["resources"]
//!
//! [host]
//! package = "packages/host"
//! entry = "source/index.ts"
//! pack = { merge-dependencies = true, merge-dev-dependencies = { include = ["better-*"] } }
//!
//! [[bridge]]
//! id = "primary"
//! package = "@bridges/primary"
//!
//! [[ui]]
//! id = "primary"
//! package = "@ui/primary"
//! entry = { main = "source/main.ts", settings = "source/settings.ts" }
//!
//! [engine]
//! framework = "electron"
//! runtime = ["electron"]
//!
//! [supervisor]
//! restart-on = "both"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::mode::Mode;
use crate::error::ConfigError;
use crate::util::fs::find_upwards;

/// File name of the project configuration.
pub const CONFIG_FILE: &str = "Triad.toml";

/// The unified project configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// Run mode; the CLI subcommand overrides it
    pub mode: Mode,

    /// The privileged host process
    pub host: HostConfig,

    /// Bridge targets, each with a unique id
    #[serde(rename = "bridge")]
    pub bridges: Vec<BridgeConfig>,

    /// UI targets, each with a unique id
    #[serde(rename = "ui")]
    pub uis: Vec<UiConfig>,

    /// Directories shipped next to the packaged application
    #[serde(deserialize_with = "one_or_many")]
    pub resources: Vec<String>,

    /// Project-wide environment, layered over the project env files
    pub env: BTreeMap<String, String>,

    /// External engine commands
    pub engine: EngineConfig,

    /// Host process supervision
    pub supervisor: SupervisorConfig,

    /// Passthrough configuration for the packager
    pub packager: PackagerConfig,
}

/// Host target configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HostConfig {
    /// Relative path from the project root, or an installed package name
    pub package: String,

    /// Entry file; falls back to the package manifest's `main`
    pub entry: Option<String>,

    /// Target-specific environment
    pub env: BTreeMap<String, String>,

    /// Dependency merge rules for packaging
    pub pack: PackRules,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            package: "packages/host".to_string(),
            entry: None,
            env: BTreeMap::new(),
            pack: PackRules::default(),
        }
    }
}

/// Bridge target configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BridgeConfig {
    pub id: Option<String>,
    pub package: String,
    pub entry: Option<EntryConfig>,
    pub env: BTreeMap<String, String>,
    /// Overrides the host's merge rules for this target
    pub pack: Option<PackRules>,
}

/// UI target configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UiConfig {
    pub id: Option<String>,
    pub package: String,
    pub entry: Option<EntryConfig>,
    pub env: BTreeMap<String, String>,
    /// Dev-server port; defaults to `engine.dev-port` plus the UI's index
    pub port: Option<u16>,
    /// Overrides the host's merge rules for this target
    pub pack: Option<PackRules>,
}

/// Default entry for bridge and UI targets.
pub const DEFAULT_ENTRY: &str = "source/index.ts";

/// A single entry path or a named map of entry paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryConfig {
    Single(String),
    Named(BTreeMap<String, String>),
}

impl Default for EntryConfig {
    fn default() -> Self {
        EntryConfig::Single(DEFAULT_ENTRY.to_string())
    }
}

/// Which of a target's dependencies end up in the packaged manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PackRules {
    pub merge_dependencies: MergeRule,
    pub merge_dev_dependencies: MergeRule,
}

impl Default for PackRules {
    fn default() -> Self {
        PackRules {
            merge_dependencies: MergeRule::All(true),
            merge_dev_dependencies: MergeRule::All(false),
        }
    }
}

/// Either "merge everything"/"merge nothing", or an include/exclude
/// glob pattern pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MergeRule {
    All(bool),
    Filter {
        #[serde(default, deserialize_with = "one_or_many")]
        include: Vec<String>,
        #[serde(default, deserialize_with = "one_or_many")]
        exclude: Vec<String>,
    },
}

/// External engine commands and framework naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Name of the host framework runtime module
    pub framework: String,

    /// Command that runs the host bundle
    pub runtime: Vec<String>,

    /// Bundler for host and bridge targets
    pub bundler: Vec<String>,

    /// Bundler for UI targets
    pub ui_bundler: Vec<String>,

    /// Dev server for UI targets in development
    pub dev_server: Vec<String>,

    /// Packager invoked on the assembled application
    pub packager: Vec<String>,

    /// Written to `scripts.postinstall` of the packaged manifest
    pub native_rebuild: String,

    /// First dev-server port
    pub dev_port: u16,

    /// How long a dev server may take to accept connections
    pub dev_ready_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            framework: "electron".to_string(),
            runtime: vec!["electron".to_string()],
            bundler: vec!["esbuild".to_string()],
            ui_bundler: vec!["esbuild".to_string()],
            dev_server: vec!["esbuild".to_string()],
            packager: vec!["electron-builder".to_string()],
            native_rebuild: "electron-builder install-app-deps".to_string(),
            dev_port: 5173,
            dev_ready_timeout_ms: 30_000,
        }
    }
}

/// What restarts the host process in development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Only the operator's `m` key
    #[default]
    Keypress,
    /// Only a finished host rebuild
    Rebuild,
    /// Either of the above
    Both,
}

impl RestartPolicy {
    pub fn on_keypress(&self) -> bool {
        matches!(self, RestartPolicy::Keypress | RestartPolicy::Both)
    }

    pub fn on_rebuild(&self) -> bool {
        matches!(self, RestartPolicy::Rebuild | RestartPolicy::Both)
    }
}

/// Host process supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SupervisorConfig {
    pub restart_on: RestartPolicy,

    /// Wait for the old process tree before forcing it down
    pub restart_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            restart_on: RestartPolicy::default(),
            restart_timeout_ms: 5_000,
        }
    }
}

/// Opaque packager configuration, passed through as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagerConfig {
    pub config: toml::Table,
}

impl PackagerConfig {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }
}

impl ProjectConfig {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration content.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: ProjectConfig =
            toml::from_str(content).map_err(|e| ConfigError::Invalid {
                path: path.to_path_buf(),
                message: e.message().to_string(),
            })?;

        if config.resources.is_empty() && !content_sets_resources(content) {
            config.resources = vec!["resources".to_string()];
        }

        Ok(config)
    }

    /// Set the run mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

fn content_sets_resources(content: &str) -> bool {
    content
        .parse::<toml::Table>()
        .map(|table| table.contains_key("resources"))
        .unwrap_or(false)
}

/// Find `Triad.toml` in `cwd` or any parent directory.
pub fn find_config(cwd: &Path) -> Result<PathBuf, ConfigError> {
    find_upwards(cwd, CONFIG_FILE).ok_or_else(|| ConfigError::NotFound {
        file: CONFIG_FILE,
        dir: cwd.to_path_buf(),
    })
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}
