//! High-level operations.
//!
//! This module contains the implementation of triad commands: running a
//! project, one-shot builds, packaging and inspection.

pub mod control;
pub mod inspect;
pub mod merge;
pub mod pack;
pub mod packager;
pub mod run;

pub use control::{Control, ControlChannel};
pub use inspect::InspectReport;
pub use merge::DependencyManifest;
pub use pack::{pack, PackOutput};
pub use packager::{CommandPackager, PackageRequest, Packager};
pub use run::{Engines, Orchestrator, RunEvent, RunOutcome};
