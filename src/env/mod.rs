//! Environment composition.
//!
//! Every target sees one flat set of variables, built in three layers:
//! the project base (environment files at the project root plus the
//! project `env` table), the target's own layer, and finally the computed
//! cross-references to every initialized target. Later layers win.

mod dotenv;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::core::mode::Mode;
use crate::core::target::{TargetDescriptor, TargetKind};
use crate::util::fs::display_slash;

pub use dotenv::load_env_files;

/// Ordered mapping from variable name to value.
pub type EnvironmentSet = BTreeMap<String, String>;

/// Key holding the running mode.
pub const MODE_KEY: &str = "NODE_ENV";

/// Key holding the project root.
pub const ROOT_KEY: &str = "ROOT_DIR";

/// Everything composition needs besides the target itself.
#[derive(Debug, Clone, Copy)]
pub struct EnvContext<'a> {
    pub mode: Mode,
    /// Project base layer
    pub base: &'a EnvironmentSet,
    /// Every initialized target, in any order
    pub targets: &'a [TargetDescriptor],
    /// Live dev-server URLs by UI id
    pub ui_urls: &'a BTreeMap<String, String>,
}

/// Build the project base layer: environment files at the project root,
/// `ROOT_DIR`, then the project `env` table.
pub fn base_environment(
    project_root: &Path,
    mode: Mode,
    configured: &BTreeMap<String, String>,
) -> Result<EnvironmentSet, crate::error::ConfigError> {
    let mut env = load_env_files(project_root, mode)?;
    env.insert(ROOT_KEY.to_string(), display_slash(project_root));
    env.extend(configured.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(env)
}

/// Compose the environment visible to `target`.
pub fn compose(target: &TargetDescriptor, ctx: &EnvContext<'_>) -> EnvironmentSet {
    let mut env = ctx.base.clone();

    env.extend(target.env.iter().map(|(k, v)| (k.clone(), v.clone())));

    env.insert(MODE_KEY.to_string(), ctx.mode.as_str().to_string());

    for other in ctx.targets {
        let prefix = key_prefix(other, ctx.targets);
        let is_self = other.kind == target.kind && other.id == target.id;

        env.insert(format!("{}_ROOT", prefix), display_slash(&other.root));

        if other.kind == TargetKind::Ui && ctx.mode.is_development() {
            if let Some(url) = ctx.ui_urls.get(&other.id) {
                env.insert(format!("{}_URL", prefix), url.clone());
            }
            if !is_self {
                continue;
            }
        }

        env.insert(format!("{}_DIR", prefix), display_slash(&other.output));
    }

    env
}

/// Key prefix for a target: the kind, suffixed with the id when several
/// targets of the same kind exist.
fn key_prefix(target: &TargetDescriptor, all: &[TargetDescriptor]) -> String {
    let siblings = all.iter().filter(|t| t.kind == target.kind).count();
    if siblings > 1 {
        format!("{}_{}", target.kind.env_prefix(), env_suffix(&target.id))
    } else {
        target.kind.env_prefix().to_string()
    }
}

fn env_suffix(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Textual replacements for bundled source: `process.env.KEY` mapped to a
/// JSON string literal of the value.
pub fn substitutions(env: &EnvironmentSet) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| (format!("process.env.{}", key), json_literal(value)))
        .collect()
}

/// Replace every `process.env.KEY` reference whose key is known with the
/// literal value. Unknown keys are left for run time.
pub fn substitute(source: &str, env: &EnvironmentSet) -> String {
    ENV_REFERENCE
        .replace_all(source, |caps: &Captures<'_>| match env.get(&caps[1]) {
            Some(value) => json_literal(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

static ENV_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"process\.env\.([A-Za-z_][A-Za-z0-9_]*)").expect("env reference pattern is valid")
});

fn json_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::package_json::PackageJson;
    use crate::core::target::Entry;
    use std::path::PathBuf;

    fn target(kind: TargetKind, id: &str) -> TargetDescriptor {
        let root = PathBuf::from(format!("/work/{}/{}", kind, id));
        TargetDescriptor {
            kind,
            id: id.to_string(),
            package: format!("{}/{}", kind, id),
            entry: Entry::Single(root.join("source/index.ts")),
            output: root.join("dist"),
            root,
            manifest: PackageJson::default(),
            env: BTreeMap::new(),
            pack: None,
            port: None,
        }
    }

    fn ctx<'a>(
        mode: Mode,
        base: &'a EnvironmentSet,
        targets: &'a [TargetDescriptor],
        urls: &'a BTreeMap<String, String>,
    ) -> EnvContext<'a> {
        EnvContext {
            mode,
            base,
            targets,
            ui_urls: urls,
        }
    }

    #[test]
    fn test_target_layer_overrides_base() {
        let base = EnvironmentSet::from([
            ("API".to_string(), "base".to_string()),
            ("KEEP".to_string(), "yes".to_string()),
        ]);
        let mut host = target(TargetKind::Host, "main");
        host.env.insert("API".into(), "host".into());
        let targets = vec![host.clone()];
        let urls = BTreeMap::new();

        let env = compose(&host, &ctx(Mode::Production, &base, &targets, &urls));
        assert_eq!(env["API"], "host");
        assert_eq!(env["KEEP"], "yes");
        assert_eq!(env[MODE_KEY], "production");
    }

    #[test]
    fn test_computed_layer_wins() {
        let base = EnvironmentSet::from([(MODE_KEY.to_string(), "test".to_string())]);
        let host = target(TargetKind::Host, "main");
        let targets = vec![host.clone()];
        let urls = BTreeMap::new();

        let env = compose(&host, &ctx(Mode::Preview, &base, &targets, &urls));
        assert_eq!(env[MODE_KEY], "preview");
        assert_eq!(env["HOST_DIR"], "/work/host/main/dist");
        assert_eq!(env["HOST_ROOT"], "/work/host/main");
    }

    #[test]
    fn test_sibling_order_does_not_matter() {
        let base = EnvironmentSet::new();
        let urls = BTreeMap::new();
        let host = target(TargetKind::Host, "main");
        let a = target(TargetKind::Bridge, "a");
        let b = target(TargetKind::Bridge, "b-side");

        let forward = vec![host.clone(), a.clone(), b.clone()];
        let backward = vec![b, a, host.clone()];

        let first = compose(&host, &ctx(Mode::Production, &base, &forward, &urls));
        let second = compose(&host, &ctx(Mode::Production, &base, &backward, &urls));
        assert_eq!(first, second);
        assert!(first.contains_key("BRIDGE_A_DIR"));
        assert!(first.contains_key("BRIDGE_B_SIDE_DIR"));
        assert!(!first.contains_key("BRIDGE_DIR"));
    }

    #[test]
    fn test_ui_url_in_development() {
        let base = EnvironmentSet::new();
        let host = target(TargetKind::Host, "main");
        let ui = target(TargetKind::Ui, "primary");
        let targets = vec![host.clone(), ui.clone()];
        let urls = BTreeMap::from([("primary".to_string(), "http://localhost:5173/".to_string())]);

        let env = compose(&host, &ctx(Mode::Development, &base, &targets, &urls));
        assert_eq!(env["UI_URL"], "http://localhost:5173/");
        assert!(!env.contains_key("UI_DIR"));

        let env = compose(&ui, &ctx(Mode::Development, &base, &targets, &urls));
        assert_eq!(env["UI_DIR"], "/work/ui/primary/dist");

        let env = compose(&host, &ctx(Mode::Production, &base, &targets, &urls));
        assert_eq!(env["UI_DIR"], "/work/ui/primary/dist");
        assert!(!env.contains_key("UI_URL"));
    }

    #[test]
    fn test_uninitialized_targets_are_omitted() {
        let base = EnvironmentSet::new();
        let host = target(TargetKind::Host, "main");
        let targets = vec![host.clone()];
        let urls = BTreeMap::new();

        let env = compose(&host, &ctx(Mode::Development, &base, &targets, &urls));
        assert!(!env.keys().any(|k| k.starts_with("BRIDGE") || k.starts_with("UI")));
    }

    #[test]
    fn test_substitute() {
        let env = EnvironmentSet::from([
            ("NODE_ENV".to_string(), "production".to_string()),
            ("QUOTE".to_string(), "say \"hi\"".to_string()),
        ]);

        let out = substitute(
            "if (process.env.NODE_ENV === 'development') {} f(process.env.QUOTE, process.env.HOME)",
            &env,
        );
        assert_eq!(
            out,
            r#"if ("production" === 'development') {} f("say \"hi\"", process.env.HOME)"#
        );

        let subs = substitutions(&env);
        assert_eq!(subs["process.env.NODE_ENV"], "\"production\"");
    }
}
