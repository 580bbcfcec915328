//! External module classification.
//!
//! A module is external when the bundle leaves its import in place for the
//! running host's module loader to satisfy. The decision is made on the
//! module name: the first segment of the import, or the first two for a
//! scoped `@scope/name` package.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::core::package_json::PackageJson;
use crate::core::target::TargetDescriptor;
use crate::util::fs::normalize_separators;

/// Namespace of the orchestrator's own virtual modules.
pub const INTERNAL_NAMESPACE: &str = "triad";

/// Built-in node modules, each also external in `node:` form.
pub const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Module names provided at run time for one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExternalSet {
    names: BTreeSet<String>,
}

impl ExternalSet {
    /// A set holding the framework runtime and every built-in module.
    pub fn new(framework: &str) -> Self {
        let mut names = BTreeSet::new();
        names.insert(framework.to_string());
        for module in BUILTIN_MODULES {
            names.insert(module.to_string());
            names.insert(format!("node:{}", module));
        }
        ExternalSet { names }
    }

    /// Add the runtime dependencies of a manifest.
    pub fn with_dependencies(mut self, manifest: &PackageJson) -> Self {
        self.names
            .extend(manifest.dependency_names().map(str::to_string));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Decide whether an import of `source` from `importer` stays external.
    ///
    /// `importer` is `None` for the build's own entry, which is never
    /// external. Relative and absolute paths and the internal namespace are
    /// always bundled.
    pub fn is_external(&self, source: &str, importer: Option<&str>) -> bool {
        importer.is_some() && self.provides(source)
    }

    /// Names handed to the bundler as externals: the members an import
    /// from inside the bundle would resolve to at run time.
    pub fn engine_names(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|name| self.provides(name))
    }

    fn provides(&self, source: &str) -> bool {
        if source.starts_with('.') || Path::new(source).is_absolute() || source.starts_with('/') {
            return false;
        }

        if source.starts_with(INTERNAL_NAMESPACE)
            || source.starts_with(&format!("@{}", INTERNAL_NAMESPACE))
        {
            return false;
        }

        self.contains(&module_name(source))
    }
}

/// Compute the external set of a target.
pub fn classify(target: &TargetDescriptor, project: &PackageJson, framework: &str) -> ExternalSet {
    ExternalSet::new(framework)
        .with_dependencies(&target.manifest)
        .with_dependencies(project)
}

/// Module name of an import: its first path segment, or `@scope/name`.
pub fn module_name(source: &str) -> String {
    let source = normalize_separators(source);
    let mut segments = source.split('/');

    let first = segments.next().unwrap_or_default();
    if first.starts_with('@') {
        if let Some(second) = segments.next() {
            return format!("{}/{}", first, second);
        }
    }

    first.to_string()
}
