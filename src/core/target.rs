//! Target descriptors - what gets built.
//!
//! A target is one buildable unit of the application: the host process,
//! a bridge, or a UI. All three share the same record; behavior that
//! differs by kind is a match on [`TargetKind`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::config::{EntryConfig, PackRules};
use crate::core::mode::Mode;
use crate::core::package_json::{resolve_installed, PackageJson};
use crate::error::ConfigError;

/// Implicit id of the singleton host target.
pub const HOST_ID: &str = "main";

/// Directory (below the project root) the production app is assembled in.
pub const APP_DIR: &str = "app";

/// Output directory name next to a target's sources outside production.
pub const DIST_DIR: &str = "dist";

/// File name of a single-entry node bundle.
pub const BUNDLE_FILE: &str = "index.cjs";

/// The kind of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// The privileged main process
    Host,
    /// Script injected into a UI to expose a narrow API
    Bridge,
    /// Web rendering surface
    Ui,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Host => "host",
            TargetKind::Bridge => "bridge",
            TargetKind::Ui => "ui",
        }
    }

    /// Prefix of the environment keys describing targets of this kind.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            TargetKind::Host => "HOST",
            TargetKind::Bridge => "BRIDGE",
            TargetKind::Ui => "UI",
        }
    }

    /// Whether bundles of this kind run under node (as opposed to a browser).
    pub fn runs_on_node(&self) -> bool {
        !matches!(self, TargetKind::Ui)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target's entry point(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entry {
    Single(PathBuf),
    Named(BTreeMap<String, PathBuf>),
}

impl Entry {
    /// All entry paths, in name order for named entries.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Entry::Single(path) => vec![path.as_path()],
            Entry::Named(map) => map.values().map(PathBuf::as_path).collect(),
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Entry::Single(_))
    }
}

/// Configured inputs of one target, before resolution.
#[derive(Debug, Clone, Default)]
pub struct TargetSource {
    pub package: String,
    pub entry: Option<EntryConfig>,
    /// Used when neither `entry` nor the manifest's `main` is set
    pub default_entry: Option<String>,
    pub env: BTreeMap<String, String>,
    pub pack: Option<PackRules>,
    pub port: Option<u16>,
}

/// Immutable description of one buildable target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetDescriptor {
    pub kind: TargetKind,
    pub id: String,
    /// Package reference as configured
    pub package: String,
    /// Absolute source root
    pub root: PathBuf,
    pub entry: Entry,
    pub output: PathBuf,
    #[serde(skip)]
    pub manifest: PackageJson,
    /// Target-specific environment from the configuration
    #[serde(skip)]
    pub env: BTreeMap<String, String>,
    #[serde(skip)]
    pub pack: Option<PackRules>,
    /// Dev-server port, UI targets only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl TargetDescriptor {
    /// Resolve a target's root, manifest, entry and output path.
    pub fn resolve(
        kind: TargetKind,
        id: impl Into<String>,
        source: TargetSource,
        project_root: &Path,
        mode: Mode,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let label = label(kind, &id);

        let root = resolve_root(project_root, &source.package, &label)?;
        let manifest = PackageJson::load(&root)?;
        let entry = resolve_entry(
            &root,
            source.entry.as_ref(),
            &manifest,
            source.default_entry.as_deref(),
            &label,
        )?;
        let output = output_path(mode, kind, &id, project_root, &root);

        tracing::debug!(unit = %label, root = %root.display(), "resolved target");

        Ok(TargetDescriptor {
            kind,
            id,
            package: source.package,
            root,
            entry,
            output,
            manifest,
            env: source.env,
            pack: source.pack,
            port: source.port,
        })
    }

    /// Display label: `host`, `bridge:<id>` or `ui:<id>`.
    pub fn label(&self) -> String {
        label(self.kind, &self.id)
    }

    pub fn is_host(&self) -> bool {
        self.kind == TargetKind::Host
    }

    /// The file a single-entry node bundle is written to.
    pub fn bundle_file(&self) -> PathBuf {
        self.output.join(BUNDLE_FILE)
    }
}

/// Display label for a target.
pub fn label(kind: TargetKind, id: &str) -> String {
    match kind {
        TargetKind::Host => kind.to_string(),
        _ => format!("{}:{}", kind, id),
    }
}

/// Resolve a target's root directory.
///
/// A path relative to the project root wins over an installed package of
/// the same name.
pub fn resolve_root(project_root: &Path, package: &str, label: &str) -> Result<PathBuf, ConfigError> {
    let not_found = || ConfigError::PackageNotFound {
        target: label.to_string(),
        package: package.to_string(),
    };

    if package.trim().is_empty() {
        return Err(not_found());
    }

    let relative = project_root.join(package);
    if relative.is_dir() {
        return Ok(relative);
    }

    resolve_installed(project_root, package).ok_or_else(not_found)
}

/// Resolve a target's entry point(s) against its root.
///
/// Configured entry first, then the manifest's `main`, then `fallback`.
/// Every resolved file must exist.
pub fn resolve_entry(
    root: &Path,
    configured: Option<&EntryConfig>,
    manifest: &PackageJson,
    fallback: Option<&str>,
    label: &str,
) -> Result<Entry, ConfigError> {
    let existing = |relative: &str| -> Result<PathBuf, ConfigError> {
        let path = root.join(relative);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ConfigError::NoEntryFile {
                target: label.to_string(),
                tried: Some(path),
            })
        }
    };

    match configured {
        Some(EntryConfig::Single(path)) => existing(path).map(Entry::Single),
        Some(EntryConfig::Named(map)) => {
            if map.is_empty() {
                return Err(ConfigError::NoEntryFile {
                    target: label.to_string(),
                    tried: None,
                });
            }
            map.iter()
                .map(|(name, path)| Ok((name.clone(), existing(path)?)))
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Entry::Named)
        }
        None => match manifest.main.as_deref().or(fallback) {
            Some(main) => existing(main).map(Entry::Single),
            None => Err(ConfigError::NoEntryFile {
                target: label.to_string(),
                tried: None,
            }),
        },
    }
}

/// Output directory of a target.
///
/// Production output is namespaced below the assembled app root; any other
/// mode writes to a `dist` directory inside the target's own root.
pub fn output_path(
    mode: Mode,
    kind: TargetKind,
    id: &str,
    project_root: &Path,
    root: &Path,
) -> PathBuf {
    if !mode.is_production() {
        return root.join(DIST_DIR);
    }

    let app = project_root.join(APP_DIR);
    match kind {
        TargetKind::Host => app.join(kind.as_str()),
        TargetKind::Bridge | TargetKind::Ui => app.join(kind.as_str()).join(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn package(dir: &Path, manifest: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("package.json"), manifest).unwrap();
    }

    #[test]
    fn test_output_path_is_pure() {
        let project = Path::new("/work/app");
        let root = Path::new("/work/app/packages/ui");

        for mode in [Mode::Development, Mode::Preview, Mode::Production] {
            for kind in [TargetKind::Host, TargetKind::Bridge, TargetKind::Ui] {
                let first = output_path(mode, kind, "primary", project, root);
                let second = output_path(mode, kind, "primary", project, root);
                assert_eq!(first, second);
            }
        }
    }

    #[test]
    fn test_output_path_by_mode() {
        let project = Path::new("/work/app");
        let root = Path::new("/work/app/packages/ui");

        assert_eq!(
            output_path(Mode::Development, TargetKind::Ui, "primary", project, root),
            root.join("dist")
        );
        assert_eq!(
            output_path(Mode::Production, TargetKind::Host, HOST_ID, project, root),
            Path::new("/work/app/app/host")
        );
        assert_eq!(
            output_path(Mode::Production, TargetKind::Ui, "primary", project, root),
            Path::new("/work/app/app/ui/primary")
        );
    }

    #[test]
    fn test_resolve_root_prefers_relative_path() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path().join("@ui/primary");
        let installed = tmp.path().join("node_modules/@ui/primary");
        package(&local, "{}");
        package(&installed, "{}");

        let root = resolve_root(tmp.path(), "@ui/primary", "ui:primary").unwrap();
        assert_eq!(root, local);

        fs::remove_dir_all(&local).unwrap();
        let root = resolve_root(tmp.path(), "@ui/primary", "ui:primary").unwrap();
        assert_eq!(root, installed);
    }

    #[test]
    fn test_resolve_root_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_root(tmp.path(), "packages/missing", "bridge:x").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::PackageNotFound { ref package, .. } if package == "packages/missing"
        ));
    }

    #[test]
    fn test_entry_precedence() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("source")).unwrap();
        fs::write(tmp.path().join("source/main.ts"), "").unwrap();
        fs::write(tmp.path().join("source/index.ts"), "").unwrap();

        let manifest = PackageJson {
            main: Some("source/index.ts".into()),
            ..Default::default()
        };

        let configured = EntryConfig::Single("source/main.ts".into());
        let entry = resolve_entry(tmp.path(), Some(&configured), &manifest, None, "host").unwrap();
        assert_eq!(entry, Entry::Single(tmp.path().join("source/main.ts")));

        let entry = resolve_entry(tmp.path(), None, &manifest, None, "host").unwrap();
        assert_eq!(entry, Entry::Single(tmp.path().join("source/index.ts")));
    }

    #[test]
    fn test_entry_missing_on_disk() {
        let tmp = TempDir::new().unwrap();
        let manifest = PackageJson {
            main: Some("source/index.ts".into()),
            ..Default::default()
        };

        let err = resolve_entry(tmp.path(), None, &manifest, None, "host").unwrap_err();
        assert!(matches!(err, ConfigError::NoEntryFile { tried: Some(_), .. }));

        let err =
            resolve_entry(tmp.path(), None, &PackageJson::default(), None, "host").unwrap_err();
        assert!(matches!(err, ConfigError::NoEntryFile { tried: None, .. }));
    }

    #[test]
    fn test_named_entries() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.ts"), "").unwrap();
        fs::write(tmp.path().join("b.ts"), "").unwrap();

        let configured = EntryConfig::Named(BTreeMap::from([
            ("about".to_string(), "b.ts".to_string()),
            ("index".to_string(), "a.ts".to_string()),
        ]));
        let entry = resolve_entry(
            tmp.path(),
            Some(&configured),
            &PackageJson::default(),
            None,
            "ui:primary",
        )
        .unwrap();

        assert!(!entry.is_single());
        assert_eq!(
            entry.paths(),
            [tmp.path().join("b.ts"), tmp.path().join("a.ts")]
        );
    }

    #[test]
    fn test_labels() {
        assert_eq!(label(TargetKind::Host, HOST_ID), "host");
        assert_eq!(label(TargetKind::Bridge, "primary"), "bridge:primary");
        assert_eq!(label(TargetKind::Ui, "settings"), "ui:settings");
    }
}
