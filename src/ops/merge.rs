//! Dependency manifest merging for packaging.
//!
//! The packaged application ships one `package.json`. It starts from the
//! project root manifest; every target's own manifest is folded in under
//! that target's [`PackRules`].

use std::collections::BTreeMap;

use glob::Pattern;
use serde::Serialize;

use crate::core::config::{MergeRule, PackRules};
use crate::core::package_json::PackageJson;
use crate::core::target::TargetDescriptor;
use crate::error::PackagingError;

/// Merged `{dependencies, devDependencies}` of the deployable package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyManifest {
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
}

impl DependencyManifest {
    /// Start from the project root manifest.
    pub fn from_root(root: &PackageJson) -> Self {
        DependencyManifest {
            dependencies: root.dependencies.clone(),
            dev_dependencies: root.dev_dependencies.clone(),
        }
    }

    /// Fold a target's manifest in. Entries already present keep the
    /// version folded in last.
    pub fn fold(&mut self, target: &TargetDescriptor, rules: &PackRules) -> Result<(), PackagingError> {
        let deps = select(&target.manifest.dependencies, &rules.merge_dependencies)?;
        let dev_deps = select(&target.manifest.dev_dependencies, &rules.merge_dev_dependencies)?;

        tracing::debug!(
            unit = %target.label(),
            dependencies = deps.len(),
            dev_dependencies = dev_deps.len(),
            "merged manifest"
        );

        self.dependencies.extend(deps);
        self.dev_dependencies.extend(dev_deps);
        Ok(())
    }

    /// The framework runtime may only be a development dependency.
    pub fn ensure_framework_excluded(&self, framework: &str) -> Result<(), PackagingError> {
        if self.dependencies.contains_key(framework) {
            return Err(PackagingError::FrameworkInDependencies {
                name: framework.to_string(),
            });
        }
        Ok(())
    }

    /// Apply the merged dependencies to `manifest`.
    pub fn apply(&self, manifest: &mut PackageJson) {
        manifest.dependencies = self.dependencies.clone();
        manifest.dev_dependencies = self.dev_dependencies.clone();
    }
}

/// Pack rules in effect for `target`: its own, else the host's.
pub fn rules_for(target: &TargetDescriptor, host: &TargetDescriptor) -> PackRules {
    target
        .pack
        .clone()
        .or_else(|| host.pack.clone())
        .unwrap_or_default()
}

/// Entries of `deps` admitted by `rule`.
pub fn select(
    deps: &BTreeMap<String, String>,
    rule: &MergeRule,
) -> Result<BTreeMap<String, String>, PackagingError> {
    match rule {
        MergeRule::All(true) => Ok(deps.clone()),
        MergeRule::All(false) => Ok(BTreeMap::new()),
        MergeRule::Filter { include, exclude } => {
            let include = compile(include)?;
            let exclude = compile(exclude)?;

            Ok(deps
                .iter()
                .filter(|(name, _)| include.is_empty() || include.iter().any(|p| p.matches(name)))
                .filter(|(name, _)| !exclude.iter().any(|p| p.matches(name)))
                .map(|(name, version)| (name.clone(), version.clone()))
                .collect())
        }
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, PackagingError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| PackagingError::InvalidPattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}
