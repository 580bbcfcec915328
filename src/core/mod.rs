//! Core data structures.
//!
//! - Project configuration (`Triad.toml`) and package manifests
//! - Run modes
//! - Target descriptors and the resolved project

pub mod config;
pub mod mode;
pub mod package_json;
pub mod project;
pub mod target;

pub use config::{ProjectConfig, CONFIG_FILE};
pub use mode::Mode;
pub use package_json::PackageJson;
pub use project::Project;
pub use target::{Entry, TargetDescriptor, TargetKind};
