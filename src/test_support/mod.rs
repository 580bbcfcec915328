//! Test utilities for unit tests.
//!
//! Provides on-disk project fixtures and recording fake engines that
//! stand in for the bundler, dev server and packager.
//!
//! # Example
//!
//! ```rust,ignore
//! use triad::test_support::{FakeBundler, ProjectFixture};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let fixture = ProjectFixture::new().ui("main");
//!     let project = fixture.load(Mode::Preview).unwrap();
//!     let bundler = Arc::new(FakeBundler::new());
//!
//!     // Hand the bundler to a driver or orchestrator...
//!     assert_eq!(bundler.built(), ["ui:main", "host"]);
//! }
//! ```

pub mod fixtures;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::builder::command::dev_url;
use crate::builder::engine::{cancelled, BundleEngine, DevServer, DevSession, EventSender, WatchHandle};
use crate::builder::events::WatchEvent;
use crate::builder::plan::{BundlePlan, OutputLayout};
use crate::ops::packager::{PackageRequest, Packager};

// Re-export fixtures for convenience
pub use fixtures::*;

/// A pass forced on the running watch sessions of a [`FakeBundler`].
#[derive(Debug, Clone)]
enum Rebuild {
    Pass { target: String },
    Fail { target: String, cause: String },
}

/// Bundler that writes placeholder output and records every plan.
///
/// Watch sessions bundle once on start; further passes are forced with
/// [`FakeBundler::rebuild`] and [`FakeBundler::fail`].
#[derive(Debug)]
pub struct FakeBundler {
    plans: Arc<Mutex<Vec<BundlePlan>>>,
    failure: Option<String>,
    /// Written as the host bundle instead of a placeholder
    host_script: Option<String>,
    rebuilds: broadcast::Sender<Rebuild>,
}

impl Default for FakeBundler {
    fn default() -> Self {
        let (rebuilds, _) = broadcast::channel(16);
        FakeBundler {
            plans: Arc::default(),
            failure: None,
            host_script: None,
            rebuilds,
        }
    }
}

impl FakeBundler {
    /// Create a bundler that always succeeds.
    pub fn new() -> Self {
        FakeBundler::default()
    }

    /// Create a bundler whose builds fail with `message`.
    pub fn failing(message: &str) -> Self {
        FakeBundler {
            failure: Some(message.to_string()),
            ..FakeBundler::default()
        }
    }

    /// Write `script` as the content of node bundle files.
    pub fn with_host_script(mut self, script: &str) -> Self {
        self.host_script = Some(script.to_string());
        self
    }

    /// Run another successful pass in the watch session of `target`.
    pub fn rebuild(&self, target: &str) {
        // no session may be running yet
        let _ = self.rebuilds.send(Rebuild::Pass {
            target: target.to_string(),
        });
    }

    /// Report a build error in the watch session of `target`.
    pub fn fail(&self, target: &str, cause: &str) {
        let _ = self.rebuilds.send(Rebuild::Fail {
            target: target.to_string(),
            cause: cause.to_string(),
        });
    }

    /// Labels of every target bundled so far, in order.
    pub fn built(&self) -> Vec<String> {
        self.plans()
            .into_iter()
            .map(|plan| plan.target)
            .collect()
    }

    /// Every plan handed to this bundler, in order.
    pub fn plans(&self) -> Vec<BundlePlan> {
        self.plans.lock().unwrap().clone()
    }

    fn record(&self, plan: &BundlePlan) {
        self.plans.lock().unwrap().push(plan.clone());
    }
}

fn write_output(plan: &BundlePlan, host_script: Option<&str>) -> Result<()> {
    let placeholder = format!("// {}\n", plan.target);

    let (file, content) = match &plan.output {
        OutputLayout::File(file) => (
            file.clone(),
            host_script.map(str::to_string).unwrap_or(placeholder),
        ),
        OutputLayout::Dir(dir) => (dir.join("index.js"), placeholder),
    };

    crate::util::fs::write_string(&file, &content)
}

#[async_trait]
impl BundleEngine for FakeBundler {
    async fn build(&self, plan: &BundlePlan, _aliases: &BTreeMap<String, PathBuf>) -> Result<()> {
        self.record(plan);
        if let Some(message) = &self.failure {
            bail!("{}", message);
        }
        write_output(plan, self.host_script.as_deref())
    }

    async fn watch(
        &self,
        plan: BundlePlan,
        _aliases: BTreeMap<String, PathBuf>,
        events: EventSender,
    ) -> Result<WatchHandle> {
        self.record(&plan);
        let outcome = match &self.failure {
            Some(message) => Err(message.clone()),
            None => write_output(&plan, self.host_script.as_deref()).map_err(|e| e.to_string()),
        };

        let mut rebuilds = self.rebuilds.subscribe();
        let plans = self.plans.clone();
        let host_script = self.host_script.clone();

        Ok(WatchHandle::spawn(move |mut shutdown| async move {
            let _ = events.send(WatchEvent::Started);
            let _ = events.send(WatchEvent::BundleStart);
            let _ = match outcome {
                Ok(()) => events.send(WatchEvent::BundleEnd { duration_ms: 1 }),
                Err(message) => events.send(WatchEvent::error(message)),
            };

            loop {
                let rebuild = tokio::select! {
                    _ = cancelled(&mut shutdown) => break,
                    rebuild = rebuilds.recv() => match rebuild {
                        Ok(rebuild) => rebuild,
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => {
                            cancelled(&mut shutdown).await;
                            break;
                        }
                    },
                };

                match rebuild {
                    Rebuild::Pass { target } if target == plan.target => {
                        plans.lock().unwrap().push(plan.clone());
                        let _ = events.send(WatchEvent::BundleStart);
                        let _ = match write_output(&plan, host_script.as_deref()) {
                            Ok(()) => events.send(WatchEvent::BundleEnd { duration_ms: 1 }),
                            Err(err) => events.send(WatchEvent::error(err.to_string())),
                        };
                    }
                    Rebuild::Fail { target, cause } if target == plan.target => {
                        let _ = events.send(WatchEvent::BundleStart);
                        let _ = events.send(WatchEvent::error(cause));
                    }
                    _ => {}
                }
            }
        }))
    }
}

/// Dev server that is ready immediately.
#[derive(Debug, Default)]
pub struct FakeDevServer {
    served: Mutex<Vec<(String, u16)>>,
}

impl FakeDevServer {
    pub fn new() -> Self {
        FakeDevServer::default()
    }

    /// Labels and ports of every session started so far.
    pub fn served(&self) -> Vec<(String, u16)> {
        self.served.lock().unwrap().clone()
    }
}

#[async_trait]
impl DevServer for FakeDevServer {
    async fn serve(
        &self,
        plan: BundlePlan,
        _aliases: BTreeMap<String, PathBuf>,
        port: u16,
        events: EventSender,
    ) -> Result<DevSession> {
        self.served.lock().unwrap().push((plan.target.clone(), port));

        let handle = WatchHandle::spawn(move |mut shutdown| async move {
            let _ = events.send(WatchEvent::Started);
            let _ = events.send(WatchEvent::BundleStart);
            let _ = events.send(WatchEvent::BundleEnd { duration_ms: 1 });
            cancelled(&mut shutdown).await;
        });

        Ok(DevSession {
            url: dev_url(port),
            handle,
        })
    }
}

/// Packager that records its requests.
#[derive(Debug, Default)]
pub struct FakePackager {
    requests: Mutex<Vec<PackageRequest>>,
    failure: Option<String>,
}

impl FakePackager {
    pub fn new() -> Self {
        FakePackager::default()
    }

    pub fn failing(message: &str) -> Self {
        FakePackager {
            failure: Some(message.to_string()),
            ..FakePackager::default()
        }
    }

    pub fn requests(&self) -> Vec<PackageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Packager for FakePackager {
    async fn package(&self, request: &PackageRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = &self.failure {
            bail!("{}", message);
        }
        Ok(())
    }
}

/// Engines backed entirely by fakes, sharing handles with the caller.
#[derive(Debug, Clone)]
pub struct FakeEngines {
    pub bundler: Arc<FakeBundler>,
    pub ui_bundler: Arc<FakeBundler>,
    pub dev_server: Arc<FakeDevServer>,
    pub packager: Arc<FakePackager>,
}

impl FakeEngines {
    pub fn new() -> Self {
        Self::with_bundler(FakeBundler::new())
    }

    /// Use `bundler` for host and bridge targets.
    pub fn with_bundler(bundler: FakeBundler) -> Self {
        FakeEngines {
            bundler: Arc::new(bundler),
            ui_bundler: Arc::new(FakeBundler::new()),
            dev_server: Arc::new(FakeDevServer::new()),
            packager: Arc::new(FakePackager::new()),
        }
    }

    pub fn with_packager(mut self, packager: FakePackager) -> Self {
        self.packager = Arc::new(packager);
        self
    }

    pub fn engines(&self) -> crate::ops::Engines {
        crate::ops::Engines {
            bundler: self.bundler.clone(),
            ui_bundler: self.ui_bundler.clone(),
            dev_server: self.dev_server.clone(),
            packager: self.packager.clone(),
        }
    }
}

impl Default for FakeEngines {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a file written by the code under test.
pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e))
}
