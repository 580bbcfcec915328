//! Layered environment files.

use std::path::Path;

use crate::core::mode::Mode;
use crate::env::EnvironmentSet;
use crate::error::ConfigError;

/// Load the environment files of `mode` from `dir`.
///
/// Files are read lowest precedence first; a key set by a later file
/// overrides the same key from an earlier one. Missing files are skipped.
pub fn load_env_files(dir: &Path, mode: Mode) -> Result<EnvironmentSet, ConfigError> {
    let mut env = EnvironmentSet::new();

    for name in mode.env_files() {
        let path = dir.join(name);
        if !path.is_file() {
            continue;
        }

        let to_error = |e: dotenvy::Error| ConfigError::EnvFile {
            path: path.clone(),
            message: e.to_string(),
        };

        for item in dotenvy::from_path_iter(&path).map_err(to_error)? {
            let (key, value) = item.map_err(to_error)?;
            env.insert(key, value);
        }

        tracing::debug!(file = %path.display(), "loaded environment file");
    }

    Ok(env)
}
