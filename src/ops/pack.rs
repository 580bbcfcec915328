//! Implementation of `triad pack`.

use std::path::PathBuf;

use crate::builder::driver::BuildOutput;
use crate::core::package_json::{PackageJson, PACKAGE_JSON};
use crate::error::{PackagingError, TriadError};
use crate::ops::merge::{rules_for, DependencyManifest};
use crate::ops::packager::PackageRequest;
use crate::ops::run::Orchestrator;
use crate::util::fs::{display_slash, relative_path, write_string};

/// Script that rebuilds native modules after installation.
const POSTINSTALL: &str = "postinstall";

/// Result of a packaging run.
#[derive(Debug)]
pub struct PackOutput {
    pub builds: Vec<BuildOutput>,
    /// The manifest written into the assembled application
    pub manifest_path: PathBuf,
    pub manifest: PackageJson,
}

/// Merge the dependency manifests of the project and every target.
pub fn merge_manifests(orchestrator: &Orchestrator) -> Result<DependencyManifest, PackagingError> {
    let project = orchestrator.project();
    let mut merged = DependencyManifest::from_root(project.manifest());

    for target in project.targets() {
        merged.fold(target, &rules_for(target, project.host()))?;
    }

    merged.ensure_framework_excluded(&project.config().engine.framework)?;
    Ok(merged)
}

/// The manifest of the assembled application.
pub fn app_manifest(orchestrator: &Orchestrator, merged: &DependencyManifest) -> PackageJson {
    let project = orchestrator.project();
    let mut manifest = project.manifest().clone();

    merged.apply(&mut manifest);
    manifest.main = Some(display_slash(&relative_path(
        &project.app_dir(),
        &project.host().bundle_file(),
    )));
    manifest.scripts = [(
        POSTINSTALL.to_string(),
        project.config().engine.native_rebuild.clone(),
    )]
    .into_iter()
    .collect();

    manifest
}

/// Build every target, assemble the application and run the packager.
pub async fn pack(orchestrator: &Orchestrator) -> Result<PackOutput, TriadError> {
    let project = orchestrator.project();

    tracing::info!("Building targets...");
    let builds = orchestrator.build_all().await?;

    let merged = merge_manifests(orchestrator)?;
    let manifest = app_manifest(orchestrator, &merged);

    let manifest_path = project.app_dir().join(PACKAGE_JSON);
    write_string(&manifest_path, &manifest.to_pretty_json()).map_err(|e| {
        PackagingError::Write {
            path: manifest_path.clone(),
            message: format!("{:#}", e),
        }
    })?;
    tracing::debug!(path = %manifest_path.display(), "wrote application manifest");

    tracing::info!("Packaging...");
    let request = PackageRequest::for_project(project);
    orchestrator
        .engines()
        .packager
        .package(&request)
        .await
        .map_err(|e| PackagingError::Packager {
            message: e.to_string(),
            detail: Some(format!("{:#}", e)),
        })?;

    tracing::info!("Done.");

    Ok(PackOutput {
        builds,
        manifest_path,
        manifest,
    })
}
