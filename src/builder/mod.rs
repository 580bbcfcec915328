//! Bundling of targets.
//!
//! This module derives per-target bundle plans, classifies external
//! modules, and drives bundler and dev-server engines in one-shot or
//! watch mode.

pub mod command;
pub mod driver;
pub mod engine;
pub mod events;
pub mod externals;
pub mod plan;
pub mod virtual_modules;

pub use command::{CommandBundler, CommandDevServer};
pub use driver::{BuildDriver, BuildOutput, WatchSession};
pub use engine::{BundleEngine, DevServer, DevSession, WatchHandle};
pub use events::{ChangeKind, TargetEvent, WatchEvent};
pub use externals::{classify, ExternalSet};
pub use plan::{BundlePlan, OutputLayout, Platform};
