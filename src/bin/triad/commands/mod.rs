//! Command implementations

pub mod build;
pub mod completions;
pub mod inspect;
pub mod pack;
pub mod run;

use std::path::Path;

use triad::error::ConfigError;
use triad::{Mode, Project, TriadError};

/// Locate and initialize the project from the working directory.
pub fn load_project(config: Option<&Path>, mode: Option<Mode>) -> Result<Project, TriadError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Invalid {
        path: config.map(Path::to_path_buf).unwrap_or_default(),
        message: format!("cannot read the working directory: {}", e),
    })?;

    Ok(Project::discover(&cwd, config, mode)?)
}
