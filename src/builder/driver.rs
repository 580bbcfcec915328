//! Build driver.
//!
//! Turns a [`BundlePlan`] into either a one-shot build or a long-running
//! session. Sessions report through one channel of [`TargetEvent`]s; the
//! driver logs every event before forwarding it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::builder::engine::{BundleEngine, DevServer, WatchHandle};
use crate::builder::events::{TargetEvent, WatchEvent};
use crate::builder::plan::BundlePlan;
use crate::error::BuildError;

/// Outcome of a successful one-shot build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub target: String,
    /// Written artifacts
    pub files: Vec<PathBuf>,
    pub duration_ms: u64,
}

/// Runs engines on behalf of targets.
#[derive(Clone)]
pub struct BuildDriver {
    engine: Arc<dyn BundleEngine>,
}

impl BuildDriver {
    pub fn new(engine: Arc<dyn BundleEngine>) -> Self {
        BuildDriver { engine }
    }

    /// Bundle once and write the output.
    ///
    /// Engine diagnostics come back as a single [`BuildError`].
    pub async fn build_once(&self, plan: &BundlePlan) -> Result<BuildOutput, BuildError> {
        tracing::info!(unit = %plan.target, "Bundling started...");
        let start = Instant::now();

        let aliases = plan
            .materialize()
            .map_err(|e| BuildError::from_anyhow(&plan.target, &e))?;

        self.engine
            .build(plan, &aliases)
            .await
            .map_err(|e| BuildError::from_anyhow(&plan.target, &e))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(unit = %plan.target, duration_ms, "Bundle finished.");

        Ok(BuildOutput {
            target: plan.target.clone(),
            files: plan.written_files(),
            duration_ms,
        })
    }

    /// Start a watch session for `plan`.
    ///
    /// Fails only when the session cannot be started; build errors inside
    /// the session are reported as events.
    pub async fn watch(
        &self,
        plan: BundlePlan,
        sink: mpsc::UnboundedSender<TargetEvent>,
    ) -> Result<WatchSession, BuildError> {
        let label = plan.target.clone();
        let root = plan.root.clone();
        let aliases = plan
            .materialize()
            .map_err(|e| BuildError::from_anyhow(&label, &e))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self
            .engine
            .watch(plan, aliases, tx)
            .await
            .map_err(|e| BuildError::from_anyhow(&label, &e))?;

        Ok(WatchSession::forward(label, root, None, handle, rx, sink))
    }

    /// Start a dev server session for a UI `plan`.
    pub async fn serve(
        &self,
        server: &dyn DevServer,
        plan: BundlePlan,
        port: u16,
        sink: mpsc::UnboundedSender<TargetEvent>,
    ) -> Result<WatchSession, BuildError> {
        let label = plan.target.clone();
        let root = plan.root.clone();
        let aliases = plan
            .materialize()
            .map_err(|e| BuildError::from_anyhow(&label, &e))?;

        tracing::info!(unit = %label, "Starting server...");

        let (tx, rx) = mpsc::unbounded_channel();
        let session = server
            .serve(plan, aliases, port, tx)
            .await
            .map_err(|e| BuildError::from_anyhow(&label, &e))?;

        tracing::info!(unit = %label, url = %session.url, "Server listening");

        Ok(WatchSession::forward(
            label,
            root,
            Some(session.url),
            session.handle,
            rx,
            sink,
        ))
    }
}

/// A running watch or dev-server session.
#[derive(Debug)]
pub struct WatchSession {
    label: String,
    url: Option<String>,
    ready: watch::Receiver<bool>,
    handle: WatchHandle,
    forwarder: JoinHandle<()>,
}

impl WatchSession {
    fn forward(
        label: String,
        root: PathBuf,
        url: Option<String>,
        handle: WatchHandle,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        sink: mpsc::UnboundedSender<TargetEvent>,
    ) -> Self {
        let (ready_tx, ready) = watch::channel(false);

        let target = label.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log_event(&target, &root, &event);

                let bundle_end = event.is_bundle_end();
                // the orchestrator may stop listening first
                let _ = sink.send(TargetEvent::new(target.clone(), event));

                if bundle_end {
                    ready_tx.send_replace(true);
                }
            }
        });

        WatchSession {
            label,
            url,
            ready,
            handle,
            forwarder,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Dev-server URL, for UI sessions.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Wait for the first `bundleEnd` of the session.
    ///
    /// Returns `false` if the session ended before that.
    pub async fn wait_ready(&mut self) -> bool {
        self.ready.wait_for(|ready| *ready).await.is_ok()
    }

    /// Stop the session, releasing watchers and engine processes.
    pub async fn cancel(self) {
        self.handle.cancel().await;
        // the engine's sender is gone; the forwarder drains and exits
        let _ = self.forwarder.await;
        tracing::debug!(unit = %self.label, "session closed");
    }
}

fn log_event(target: &str, root: &std::path::Path, event: &WatchEvent) {
    match event {
        WatchEvent::Started => tracing::debug!(unit = %target, "watching"),
        WatchEvent::FileChanged { path, kind } => {
            let shown = path.strip_prefix(root).unwrap_or(path);
            tracing::info!(unit = %target, "{} {}", shown.display(), kind.verb());
        }
        WatchEvent::BundleStart => tracing::info!(unit = %target, "Bundling started..."),
        WatchEvent::BundleEnd { duration_ms } => {
            tracing::info!(unit = %target, duration_ms = *duration_ms, "Bundle finished.")
        }
        WatchEvent::Error { cause } => tracing::error!(unit = %target, "{}", cause),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mode::Mode;
    use crate::test_support::{FakeBundler, ProjectFixture};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_build_once_writes_output() {
        let fixture = ProjectFixture::new();
        let project = fixture.load(Mode::Preview).unwrap();
        let plan = BundlePlan::derive(&project, project.host(), &BTreeMap::new());
        let bundler = Arc::new(FakeBundler::new());

        let output = BuildDriver::new(bundler.clone())
            .build_once(&plan)
            .await
            .unwrap();

        assert_eq!(output.target, "host");
        assert_eq!(output.files, [project.host().bundle_file()]);
        assert_eq!(bundler.built(), ["host"]);
        assert!(plan.virtual_dir().join("triad-paths-helper.mjs").is_file());
    }

    #[tokio::test]
    async fn test_build_failure_is_one_error() {
        let fixture = ProjectFixture::new();
        let project = fixture.load(Mode::Preview).unwrap();
        let plan = BundlePlan::derive(&project, project.host(), &BTreeMap::new());

        let err = BuildDriver::new(Arc::new(FakeBundler::failing("unexpected token")))
            .build_once(&plan)
            .await
            .unwrap_err();

        assert_eq!(err.target, "host");
        assert!(err.message.contains("unexpected token"));
    }

    #[tokio::test]
    async fn test_watch_session_forwards_and_becomes_ready() {
        let fixture = ProjectFixture::new();
        let project = fixture.load(Mode::Development).unwrap();
        let plan = BundlePlan::derive(&project, project.host(), &BTreeMap::new());
        let (sink, mut events) = mpsc::unbounded_channel();

        let mut session = BuildDriver::new(Arc::new(FakeBundler::new()))
            .watch(plan, sink)
            .await
            .unwrap();

        assert!(session.wait_ready().await);
        assert_eq!(events.recv().await.unwrap().event, WatchEvent::Started);
        assert_eq!(events.recv().await.unwrap().event, WatchEvent::BundleStart);
        let end = events.recv().await.unwrap();
        assert_eq!(end.target, "host");
        assert!(end.event.is_bundle_end());

        session.cancel().await;
        assert!(events.recv().await.is_none());
    }
}
