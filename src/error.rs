//! Error taxonomy.
//!
//! Four families of failures reach the top level. All of them are folded
//! into [`TriadError`], which carries a message plus an optional detail
//! string (the cause chain), so presentation is the same for every origin.

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::target::TargetKind;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Result alias used throughout the crate.
pub type Result<T, E = TriadError> = std::result::Result<T, E>;

/// Invalid or missing project configuration. Always fatal.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ConfigError {
    #[error("could not find `{file}` in `{}` or any parent directory", .dir.display())]
    #[diagnostic(code(triad::config::not_found))]
    NotFound { file: &'static str, dir: PathBuf },

    #[error("invalid configuration in `{}`: {message}", .path.display())]
    #[diagnostic(code(triad::config::invalid))]
    Invalid { path: PathBuf, message: String },

    #[error("{kind} target #{index} has no `id`")]
    #[diagnostic(code(triad::config::missing_id))]
    MissingId { kind: TargetKind, index: usize },

    #[error("duplicate {kind} target id `{id}`")]
    #[diagnostic(code(triad::config::duplicate_id))]
    DuplicateId { kind: TargetKind, id: String },

    #[error("package `{package}` for the {target} target not found")]
    #[diagnostic(code(triad::config::package_not_found))]
    PackageNotFound { target: String, package: String },

    #[error("failed to load manifest `{}`: {message}", .path.display())]
    #[diagnostic(code(triad::config::manifest))]
    Manifest { path: PathBuf, message: String },

    #[error("no entry file for the {target} target")]
    #[diagnostic(code(triad::config::no_entry))]
    NoEntryFile {
        target: String,
        tried: Option<PathBuf>,
    },

    #[error("failed to load environment file `{}`: {message}", .path.display())]
    #[diagnostic(code(triad::config::env_file))]
    EnvFile { path: PathBuf, message: String },
}

/// A bundler or compiler diagnostic.
///
/// Fatal for a one-shot build, reported and survived inside a watch session.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("failed to build the {target} target: {message}")]
#[diagnostic(code(triad::build::failed))]
pub struct BuildError {
    pub target: String,
    pub message: String,
    pub detail: Option<String>,
}

impl BuildError {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        BuildError {
            target: target.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        if !detail.trim().is_empty() {
            self.detail = Some(detail);
        }
        self
    }

    /// Wrap an `anyhow` chain, keeping the full chain as detail.
    pub fn from_anyhow(target: impl Into<String>, err: &anyhow::Error) -> Self {
        BuildError::new(target, err.to_string()).with_detail(format!("{:#}", err))
    }
}

/// Failure around the supervised host process.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ProcessError {
    #[error("failed to spawn `{program}`: {message}")]
    #[diagnostic(code(triad::process::spawn))]
    Spawn { program: String, message: String },

    #[error("cannot {action} the host process while it is {state}")]
    #[diagnostic(code(triad::process::state))]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },

    #[error("host process stream failed: {message}")]
    #[diagnostic(code(triad::process::stream))]
    Stream { message: String },
}

/// Failure while assembling or packaging the application. Always fatal.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum PackagingError {
    #[error("`{name}` must not be a runtime dependency of the packaged application")]
    #[diagnostic(code(triad::pack::framework_dependency))]
    FrameworkInDependencies { name: String },

    #[error("invalid dependency pattern `{pattern}`: {message}")]
    #[diagnostic(code(triad::pack::pattern))]
    InvalidPattern { pattern: String, message: String },

    #[error("failed to write `{}`: {message}", .path.display())]
    #[diagnostic(code(triad::pack::write))]
    Write { path: PathBuf, message: String },

    #[error("packager failed: {message}")]
    #[diagnostic(code(triad::pack::packager))]
    Packager {
        message: String,
        detail: Option<String>,
    },
}

/// The single structured error form that reaches the logging sink.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum TriadError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Packaging(#[from] PackagingError),
}

impl TriadError {
    /// Extended detail, shown only under the debug flag.
    pub fn detail(&self) -> Option<String> {
        match self {
            TriadError::Build(err) => err.detail.clone(),
            TriadError::Packaging(PackagingError::Packager { detail, .. }) => detail.clone(),
            TriadError::Config(ConfigError::NoEntryFile {
                tried: Some(path), ..
            }) => Some(format!("looked for {}", path.display())),
            _ => None,
        }
    }

    /// Render as a user-facing diagnostic.
    pub fn to_diagnostic(&self, debug: bool) -> Diagnostic {
        let mut diag = Diagnostic::error(self.to_string());

        let suggestion = match self {
            TriadError::Config(ConfigError::NotFound { .. }) => Some(suggestions::NO_CONFIG),
            TriadError::Config(ConfigError::PackageNotFound { .. }) => {
                Some(suggestions::PACKAGE_NOT_FOUND)
            }
            TriadError::Config(ConfigError::NoEntryFile { .. }) => Some(suggestions::NO_ENTRY),
            TriadError::Config(ConfigError::DuplicateId { .. }) => {
                Some(suggestions::DUPLICATE_ID)
            }
            TriadError::Packaging(PackagingError::FrameworkInDependencies { .. }) => {
                Some(suggestions::FRAMEWORK_IN_DEPENDENCIES)
            }
            _ => None,
        };

        if debug {
            if let Some(detail) = self.detail() {
                for line in detail.lines() {
                    diag = diag.with_context(line);
                }
            }
            if let Some(suggestion) = suggestion {
                diag = diag.with_suggestion(suggestion);
            }
        } else if self.detail().is_some() {
            diag = diag.with_suggestion(suggestions::DEBUG);
        }

        diag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_keeps_detail_for_debug() {
        let err: TriadError = BuildError::new("host", "unexpected token")
            .with_detail("source/index.ts:3:1: unexpected token")
            .into();

        let plain = err.to_diagnostic(false).format(false);
        assert_eq!(
            plain,
            "error: failed to build the host target: unexpected token\n\
             help: rerun with `--debug` for the full error chain\n"
        );

        let debug = err.to_diagnostic(true).format(false);
        assert!(debug.contains("source/index.ts:3:1"));
        assert!(!debug.contains("--debug"));
    }

    #[test]
    fn test_no_debug_hint_without_detail() {
        let err: TriadError = ConfigError::DuplicateId {
            kind: TargetKind::Ui,
            id: "main".into(),
        }
        .into();
        assert_eq!(
            err.to_diagnostic(false).format(false),
            "error: duplicate ui target id `main`\n"
        );
    }

    #[test]
    fn test_empty_detail_is_dropped() {
        let err = BuildError::new("ui:main", "boom").with_detail("   ");
        assert!(err.detail.is_none());
    }

    #[test]
    fn test_duplicate_id_message() {
        let err: TriadError = ConfigError::DuplicateId {
            kind: TargetKind::Bridge,
            id: "primary".into(),
        }
        .into();
        assert_eq!(err.to_string(), "duplicate bridge target id `primary`");
        assert!(err
            .to_diagnostic(true)
            .format(false)
            .contains("help: give every bridge"));
    }
}
