//! `triad pack` command

use std::path::Path;

use triad::ops::pack;
use triad::{Engines, Mode, Orchestrator, TriadError};

use super::load_project;

pub async fn execute(config: Option<&Path>) -> Result<i32, TriadError> {
    let project = load_project(config, Some(Mode::Production))?;
    let engines = Engines::from_config(&project);
    let orchestrator = Orchestrator::new(project, engines);

    let output = pack(&orchestrator).await?;

    eprintln!("    Packaged `{}`", output.manifest_path.display());
    Ok(0)
}
