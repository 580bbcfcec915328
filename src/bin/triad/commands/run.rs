//! `triad dev`, `triad preview` and `triad start` commands

use std::path::Path;

use triad::ops::ControlChannel;
use triad::{Engines, Mode, Orchestrator, TriadError};

use super::load_project;

pub async fn execute(config: Option<&Path>, mode: Mode) -> Result<i32, TriadError> {
    let project = load_project(config, Some(mode))?;
    let engines = Engines::from_config(&project);
    let orchestrator = Orchestrator::new(project, engines);

    tracing::info!("Running in {} mode", mode);
    if mode.is_development() {
        tracing::info!("Press `m` to restart the host, `q` to quit");
    }

    let outcome = orchestrator.run(ControlChannel::listen()).await?;
    Ok(outcome.exit_code())
}
