//! Implementation of `triad inspect`.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;

use crate::builder::externals::ExternalSet;
use crate::builder::plan::{BundlePlan, Platform};
use crate::core::mode::Mode;
use crate::core::project::Project;
use crate::core::target::TargetDescriptor;
use crate::env::EnvironmentSet;
use crate::ops::run::ui_dev_urls;

/// What triad would hand the engines, per target.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub root: String,
    pub mode: Mode,
    pub targets: Vec<TargetReport>,
}

#[derive(Debug, Serialize)]
pub struct TargetReport {
    pub label: String,
    #[serde(flatten)]
    pub descriptor: TargetDescriptor,
    pub platform: Platform,
    pub env: EnvironmentSet,
    pub externals: ExternalSet,
}

impl InspectReport {
    pub fn new(project: &Project) -> Self {
        let ui_urls = if project.mode().is_development() {
            ui_dev_urls(project)
        } else {
            BTreeMap::new()
        };

        let targets = project
            .targets()
            .iter()
            .map(|target| {
                let plan = BundlePlan::derive(project, target, &ui_urls);
                TargetReport {
                    label: plan.target,
                    descriptor: target.clone(),
                    platform: plan.platform,
                    env: plan.env,
                    externals: plan.externals,
                }
            })
            .collect();

        InspectReport {
            root: crate::util::fs::display_slash(project.root()),
            mode: project.mode(),
            targets,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Human-readable summary.
    pub fn format(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "project: {} ({})", self.root, self.mode);

        for target in &self.targets {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", target.label);
            let _ = writeln!(out, "  root:      {}", target.descriptor.root.display());
            for entry in target.descriptor.entry.paths() {
                let _ = writeln!(out, "  entry:     {}", entry.display());
            }
            let _ = writeln!(out, "  output:    {}", target.descriptor.output.display());
            let _ = writeln!(out, "  platform:  {}", target.platform.as_str());
            let _ = writeln!(out, "  externals: {} modules", target.externals.len());
            for (key, value) in &target.env {
                let _ = writeln!(out, "  {}={}", key, value);
            }
        }

        out
    }
}
