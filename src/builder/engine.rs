//! Engine traits.
//!
//! Engines do the actual bundling and serving. The orchestrator only hands
//! them a [`BundlePlan`] and listens to the [`WatchEvent`]s they send back.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::builder::events::WatchEvent;
use crate::builder::plan::BundlePlan;

/// Sender half of a watch session's event stream.
pub type EventSender = mpsc::UnboundedSender<WatchEvent>;

/// A module bundler.
#[async_trait]
pub trait BundleEngine: Send + Sync {
    /// Bundle once and write the output.
    ///
    /// `aliases` map virtual module specifiers to their generated files.
    async fn build(&self, plan: &BundlePlan, aliases: &BTreeMap<String, PathBuf>) -> Result<()>;

    /// Start a session that rebuilds whenever a source file changes.
    ///
    /// The session must send `Started` first and bracket every pass,
    /// including the initial one, with `BundleStart` and `BundleEnd`
    /// (or `Error`).
    async fn watch(
        &self,
        plan: BundlePlan,
        aliases: BTreeMap<String, PathBuf>,
        events: EventSender,
    ) -> Result<WatchHandle>;
}

/// A development server for UI targets.
#[async_trait]
pub trait DevServer: Send + Sync {
    /// Start serving on `port`. The first `BundleEnd` marks the server as
    /// ready to accept connections.
    async fn serve(
        &self,
        plan: BundlePlan,
        aliases: BTreeMap<String, PathBuf>,
        port: u16,
        events: EventSender,
    ) -> Result<DevSession>;
}

/// A running dev server.
#[derive(Debug)]
pub struct DevSession {
    pub url: String,
    pub handle: WatchHandle,
}

/// Cancellation handle of an engine session.
///
/// Dropping the handle also stops the session.
#[derive(Debug)]
pub struct WatchHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Spawn `session` with a fresh shutdown flag.
    pub fn spawn<F, Fut>(session: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(session(shutdown_rx));
        WatchHandle { shutdown_tx, task }
    }

    /// Stop the session and wait until it released its resources.
    pub async fn cancel(self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Resolve once `shutdown` is set or its sender is gone.
pub async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    // a dropped sender counts as cancellation
    let _ = shutdown.wait_for(|stop| *stop).await;
}
