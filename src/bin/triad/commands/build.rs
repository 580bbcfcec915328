//! `triad build` command

use std::path::Path;

use triad::{Engines, Orchestrator, TriadError};

use super::load_project;
use crate::cli::BuildArgs;

pub async fn execute(config: Option<&Path>, args: BuildArgs) -> Result<i32, TriadError> {
    let project = load_project(config, args.mode)?;
    let engines = Engines::from_config(&project);
    let orchestrator = Orchestrator::new(project, engines);

    let outputs = orchestrator.build_all().await?;

    for output in &outputs {
        eprintln!(
            "    Finished `{}` in {}ms ({} files)",
            output.target,
            output.duration_ms,
            output.files.len()
        );
    }

    Ok(0)
}
