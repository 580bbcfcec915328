//! Virtual helper modules.
//!
//! Bundled code can import `triad/paths/helper` and `triad/utils/helper`
//! to learn where its sibling targets live and how it is being run. The
//! modules are generated per target and handed to the engine as aliases.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde_json::{json, Value};

use crate::core::mode::Mode;
use crate::core::target::{TargetDescriptor, TargetKind};
use crate::util::fs::{display_slash, relative_path, write_string};

/// Directory below a target's output holding the generated modules.
pub const VIRTUAL_DIR: &str = ".triad/virtual";

pub const PATHS_HELPER: &str = "triad/paths/helper";
pub const UTILS_HELPER: &str = "triad/utils/helper";

/// A generated ES module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualModule {
    pub specifier: &'static str,
    pub source: String,
}

impl VirtualModule {
    /// File the module is written to below `dir`.
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.mjs", self.specifier.replace('/', "-")))
    }
}

/// Generate the helper modules for `target`.
pub fn helpers(
    target: &TargetDescriptor,
    targets: &[TargetDescriptor],
    mode: Mode,
    ui_urls: &BTreeMap<String, String>,
) -> Vec<VirtualModule> {
    let host_dir = targets
        .iter()
        .find(|t| t.is_host())
        .map(|h| h.output.as_path())
        .unwrap_or(target.output.as_path());

    let rel = |to: &Path| -> String {
        let path = display_slash(&relative_path(host_dir, to));
        if path.is_empty() {
            ".".to_string()
        } else {
            path
        }
    };

    let bridges: BTreeMap<&str, String> = targets
        .iter()
        .filter(|t| t.kind == TargetKind::Bridge)
        .map(|t| (t.id.as_str(), rel(&t.output)))
        .collect();

    let uis: BTreeMap<&str, Value> = targets
        .iter()
        .filter(|t| t.kind == TargetKind::Ui)
        .map(|t| {
            let url = if mode.is_development() {
                ui_urls.get(&t.id).cloned()
            } else {
                None
            };
            (t.id.as_str(), json!({ "url": url, "dir": rel(&t.output) }))
        })
        .collect();

    let paths = es_module(&[
        ("hostDir", json!(rel(&target.output))),
        ("bridges", json!(bridges)),
        ("uis", json!(uis)),
    ]);

    let utils = es_module(&[
        ("mode", json!(mode.as_str())),
        ("process", json!(target.kind.as_str())),
    ]);

    vec![
        VirtualModule {
            specifier: PATHS_HELPER,
            source: paths,
        },
        VirtualModule {
            specifier: UTILS_HELPER,
            source: utils,
        },
    ]
}

/// Write `modules` below `dir` and return the alias map.
pub fn materialize(modules: &[VirtualModule], dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let mut aliases = BTreeMap::new();
    for module in modules {
        let path = module.path_in(dir);
        write_string(&path, &module.source)?;
        aliases.insert(module.specifier.to_string(), path);
    }
    Ok(aliases)
}

fn es_module(exports: &[(&str, Value)]) -> String {
    let mut source = String::new();
    for (name, value) in exports {
        source.push_str(&format!("export const {} = {};\n", name, value));
    }
    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ProjectFixture;

    #[test]
    fn test_paths_helper_is_relative_to_host() {
        let fixture = ProjectFixture::new().bridge("api").ui("main");
        let project = fixture.load(Mode::Production).unwrap();
        let urls = BTreeMap::new();

        let modules = helpers(project.host(), project.targets(), Mode::Production, &urls);
        let paths = &modules[0].source;

        assert!(paths.contains(r#"export const hostDir = ".";"#));
        assert!(paths.contains(r#"export const bridges = {"api":"../bridge/api"};"#));
        assert!(paths.contains(r#""dir":"../ui/main""#));
        assert!(paths.contains(r#""url":null"#));
        assert_eq!(
            modules[1].source,
            "export const mode = \"production\";\nexport const process = \"host\";\n"
        );
    }

    #[test]
    fn test_ui_url_only_in_development() {
        let fixture = ProjectFixture::new().ui("main");
        let project = fixture.load(Mode::Development).unwrap();
        let urls = BTreeMap::from([("main".to_string(), "http://localhost:5173/".to_string())]);

        let ui = project.uis().next().unwrap();
        let modules = helpers(ui, project.targets(), Mode::Development, &urls);
        assert!(modules[0].source.contains(r#""url":"http://localhost:5173/""#));
        assert!(modules[1].source.contains(r#"process = "ui""#));
    }

    #[test]
    fn test_materialize_writes_aliases() {
        let tmp = tempfile::TempDir::new().unwrap();
        let modules = vec![VirtualModule {
            specifier: UTILS_HELPER,
            source: "export const mode = \"preview\";\n".into(),
        }];

        let aliases = materialize(&modules, tmp.path()).unwrap();
        let path = &aliases[UTILS_HELPER];
        assert_eq!(path, &tmp.path().join("triad-utils-helper.mjs"));
        assert!(std::fs::read_to_string(path).unwrap().contains("preview"));
    }
}
