//! Project - the resolved set of targets.
//!
//! A Project is built once from `Triad.toml`: the host target first, then
//! every bridge, then every UI, then the project base environment. Any
//! failure aborts initialization.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::core::config::{find_config, EntryConfig, ProjectConfig, DEFAULT_ENTRY};
use crate::core::mode::Mode;
use crate::core::package_json::PackageJson;
use crate::core::target::{TargetDescriptor, TargetKind, TargetSource, APP_DIR, HOST_ID};
use crate::env::{self, EnvContext, EnvironmentSet};
use crate::error::ConfigError;

/// A project with every target resolved.
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    config: ProjectConfig,
    mode: Mode,
    /// Host first, then bridges, then UIs, each in configuration order
    targets: Vec<TargetDescriptor>,
    base_env: EnvironmentSet,
    manifest: PackageJson,
}

impl Project {
    /// Locate `Triad.toml` (or use `config_path`) and initialize the project.
    ///
    /// `mode` overrides the mode declared in the file.
    pub fn discover(
        cwd: &Path,
        config_path: Option<&Path>,
        mode: Option<Mode>,
    ) -> Result<Self, ConfigError> {
        let config_path = match config_path {
            Some(path) => cwd.join(path),
            None => find_config(cwd)?,
        };

        let mut config = ProjectConfig::load(&config_path)?;
        if let Some(mode) = mode {
            config = config.with_mode(mode);
        }

        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());

        tracing::debug!(config = %config_path.display(), mode = %config.mode, "loaded configuration");

        Project::init(&root, config)
    }

    /// Resolve every target of `config` against `root`.
    pub fn init(root: &Path, config: ProjectConfig) -> Result<Self, ConfigError> {
        let mode = config.mode;
        let mut targets = Vec::with_capacity(1 + config.bridges.len() + config.uis.len());

        let host = TargetSource {
            package: config.host.package.clone(),
            entry: config.host.entry.clone().map(EntryConfig::Single),
            default_entry: None,
            env: config.host.env.clone(),
            pack: Some(config.host.pack.clone()),
            port: None,
        };
        targets.push(resolve_target(TargetKind::Host, HOST_ID, host, root, mode)?);

        let bridge_ids = unique_ids(
            TargetKind::Bridge,
            config.bridges.iter().map(|b| b.id.as_deref()),
        )?;
        for (bridge, id) in config.bridges.iter().zip(bridge_ids) {
            let source = TargetSource {
                package: bridge.package.clone(),
                entry: bridge.entry.clone(),
                default_entry: Some(DEFAULT_ENTRY.to_string()),
                env: bridge.env.clone(),
                pack: bridge.pack.clone(),
                port: None,
            };
            targets.push(resolve_target(TargetKind::Bridge, id, source, root, mode)?);
        }

        let ui_ids = unique_ids(TargetKind::Ui, config.uis.iter().map(|u| u.id.as_deref()))?;
        for (index, (ui, id)) in config.uis.iter().zip(ui_ids).enumerate() {
            let port = ui
                .port
                .unwrap_or_else(|| config.engine.dev_port.saturating_add(index as u16));
            let source = TargetSource {
                package: ui.package.clone(),
                entry: ui.entry.clone(),
                default_entry: Some(DEFAULT_ENTRY.to_string()),
                env: ui.env.clone(),
                pack: ui.pack.clone(),
                port: Some(port),
            };
            targets.push(resolve_target(TargetKind::Ui, id, source, root, mode)?);
        }

        let base_env = env::base_environment(root, mode, &config.env)?;

        let manifest_path = root.join(crate::core::package_json::PACKAGE_JSON);
        let manifest = if manifest_path.is_file() {
            PackageJson::load(root)?
        } else {
            PackageJson::default()
        };

        Ok(Project {
            root: root.to_path_buf(),
            config,
            mode,
            targets,
            base_env,
            manifest,
        })
    }

    /// Get the project root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the configuration.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Get the root `package.json`, empty when the project has none.
    pub fn manifest(&self) -> &PackageJson {
        &self.manifest
    }

    /// Every target: host, then bridges, then UIs.
    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    pub fn host(&self) -> &TargetDescriptor {
        &self.targets[0]
    }

    pub fn bridges(&self) -> impl Iterator<Item = &TargetDescriptor> {
        self.of_kind(TargetKind::Bridge)
    }

    pub fn uis(&self) -> impl Iterator<Item = &TargetDescriptor> {
        self.of_kind(TargetKind::Ui)
    }

    fn of_kind(&self, kind: TargetKind) -> impl Iterator<Item = &TargetDescriptor> {
        self.targets.iter().filter(move |t| t.kind == kind)
    }

    /// Get the project base environment.
    pub fn base_env(&self) -> &EnvironmentSet {
        &self.base_env
    }

    /// Compose the environment of `target`.
    ///
    /// `ui_urls` holds the dev-server URLs known so far; UIs without one
    /// are left out of the cross-references.
    pub fn env_for(
        &self,
        target: &TargetDescriptor,
        ui_urls: &BTreeMap<String, String>,
    ) -> EnvironmentSet {
        env::compose(
            target,
            &EnvContext {
                mode: self.mode,
                base: &self.base_env,
                targets: &self.targets,
                ui_urls,
            },
        )
    }

    /// Directory the production application is assembled in.
    pub fn app_dir(&self) -> PathBuf {
        self.root.join(APP_DIR)
    }

    /// Resource directories shipped with the packaged application.
    pub fn resources(&self) -> Vec<PathBuf> {
        self.config
            .resources
            .iter()
            .map(|r| self.root.join(r))
            .collect()
    }
}

fn resolve_target(
    kind: TargetKind,
    id: &str,
    source: TargetSource,
    root: &Path,
    mode: Mode,
) -> Result<TargetDescriptor, ConfigError> {
    let mut target = TargetDescriptor::resolve(kind, id, source, root, mode)?;

    let mut layer = env::load_env_files(&target.root, mode)?;
    layer.append(&mut target.env);
    target.env = layer;

    Ok(target)
}

/// Check that every target of `kind` has an id and no id repeats.
fn unique_ids<'a>(
    kind: TargetKind,
    ids: impl Iterator<Item = Option<&'a str>>,
) -> Result<Vec<&'a str>, ConfigError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (index, id) in ids.enumerate() {
        let id = match id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(ConfigError::MissingId { kind, index }),
        };
        if !seen.insert(id) {
            return Err(ConfigError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
        out.push(id);
    }

    Ok(out)
}
