//! Triad - build, live-reload and packaging orchestrator for desktop
//! applications made of a host process, bridge scripts and UI surfaces.
//!
//! The library resolves a project into target descriptors, derives bundle
//! plans for them, drives bundler engines in one-shot or watch mode,
//! supervises the host process and assembles the packaged application.

pub mod builder;
pub mod core;
pub mod env;
pub mod error;
pub mod ops;
pub mod supervisor;
pub mod util;

/// Test fixtures and fake engines for unit tests.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{Mode, Project, ProjectConfig, TargetDescriptor, TargetKind};
pub use error::{Result, TriadError};
pub use ops::{Engines, Orchestrator};
