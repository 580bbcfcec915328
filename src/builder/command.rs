//! Command-line engines.
//!
//! [`CommandBundler`] and [`CommandDevServer`] drive an esbuild-compatible
//! CLI. File watching is done here with `notify`, so any bundler with a
//! one-shot mode can back a watch session.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};

use crate::builder::engine::{cancelled, BundleEngine, DevServer, DevSession, EventSender, WatchHandle};
use crate::builder::events::{ChangeKind, WatchEvent};
use crate::builder::plan::{BundlePlan, OutputLayout};
use crate::core::mode::Mode;
use crate::core::target::Entry;
use crate::supervisor::tree::terminate_tree;
use crate::util::fs::{ensure_dir, relative_path};
use crate::util::process::{resolve_command, OutputLines, ProcessBuilder};

/// Quiet period after a file event before rebuilding.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// How often a starting dev server's port is probed.
const READY_POLL: Duration = Duration::from_millis(100);

/// Arguments for bundling `plan` with an esbuild-compatible CLI.
pub fn bundle_args(plan: &BundlePlan, aliases: &BTreeMap<String, PathBuf>) -> Vec<String> {
    let mut args = Vec::new();

    match &plan.entry {
        Entry::Single(path) => args.push(path.display().to_string()),
        Entry::Named(map) => {
            for (name, path) in map {
                args.push(format!("{}={}", name, path.display()));
            }
        }
    }

    args.push("--bundle".to_string());
    args.push(format!("--format={}", plan.platform.format()));
    args.push(format!("--platform={}", plan.platform.as_str()));
    args.push(format!("--tree-shaking={}", plan.tree_shaking));

    match &plan.output {
        OutputLayout::File(file) => args.push(format!("--outfile={}", file.display())),
        OutputLayout::Dir(dir) => args.push(format!("--outdir={}", dir.display())),
    }

    if plan.minify {
        args.push("--minify".to_string());
    }
    if plan.mode == Mode::Development {
        args.push("--sourcemap".to_string());
    }

    for name in plan.externals.engine_names() {
        args.push(format!("--external:{}", name));
    }
    for (key, value) in &plan.defines {
        args.push(format!("--define:{}={}", key, value));
    }
    for (specifier, path) in aliases {
        args.push(format!("--alias:{}={}", specifier, path.display()));
    }

    args.push("--log-level=warning".to_string());
    args
}

/// Bundler driven through its command line.
#[derive(Debug, Clone)]
pub struct CommandBundler {
    command: Vec<String>,
    project_root: PathBuf,
}

impl CommandBundler {
    pub fn new(command: Vec<String>, project_root: impl Into<PathBuf>) -> Self {
        CommandBundler {
            command,
            project_root: project_root.into(),
        }
    }

    fn process(&self, plan: &BundlePlan, aliases: &BTreeMap<String, PathBuf>) -> Result<ProcessBuilder> {
        Ok(resolve_command(&self.project_root, &self.command)?
            .args(bundle_args(plan, aliases))
            .cwd(&plan.root))
    }
}

#[async_trait]
impl BundleEngine for CommandBundler {
    async fn build(&self, plan: &BundlePlan, aliases: &BTreeMap<String, PathBuf>) -> Result<()> {
        ensure_dir(&plan.output_dir)?;
        let process = self.process(plan, aliases)?;
        tracing::debug!(unit = %plan.target, command = %process.display_command(), "running bundler");
        process.exec_and_check().await?;
        Ok(())
    }

    async fn watch(
        &self,
        plan: BundlePlan,
        aliases: BTreeMap<String, PathBuf>,
        events: EventSender,
    ) -> Result<WatchHandle> {
        ensure_dir(&plan.output_dir)?;
        let process = self.process(&plan, &aliases)?;

        let (fs_tx, fs_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // the session may already be gone
            let _ = fs_tx.send(res);
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(&plan.root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch `{}`", plan.root.display()))?;

        Ok(WatchHandle::spawn(move |shutdown| async move {
            watch_loop(plan, process, watcher, fs_rx, events, shutdown).await;
        }))
    }
}

async fn watch_loop(
    plan: BundlePlan,
    process: ProcessBuilder,
    // dropped when the loop ends, releasing the OS watch
    _watcher: notify::RecommendedWatcher,
    mut fs_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    events: EventSender,
    mut shutdown: watch::Receiver<bool>,
) {
    let _ = events.send(WatchEvent::Started);
    bundle_pass(&process, &events).await;

    loop {
        let first = tokio::select! {
            _ = cancelled(&mut shutdown) => break,
            event = fs_rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let mut changes = BTreeMap::new();
        collect_changes(&plan, first, &mut changes, &events);

        // debounce: keep collecting until the tree is quiet
        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => return,
                event = tokio::time::timeout(DEBOUNCE, fs_rx.recv()) => match event {
                    Ok(Some(event)) => collect_changes(&plan, event, &mut changes, &events),
                    Ok(None) | Err(_) => break,
                },
            }
        }

        if changes.is_empty() {
            continue;
        }

        for (path, kind) in changes {
            let _ = events.send(WatchEvent::file_changed(relative_path(&plan.root, &path), kind));
        }

        bundle_pass(&process, &events).await;
    }
}

fn collect_changes(
    plan: &BundlePlan,
    event: notify::Result<notify::Event>,
    changes: &mut BTreeMap<PathBuf, ChangeKind>,
    events: &EventSender,
) {
    let event = match event {
        Ok(event) => event,
        Err(err) => {
            let _ = events.send(WatchEvent::error(format!("file watcher: {}", err)));
            return;
        }
    };

    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Updated,
        EventKind::Remove(_) => ChangeKind::Deleted,
        _ => return,
    };

    for path in event.paths {
        if plan.is_ignored(&path) {
            continue;
        }
        changes
            .entry(path)
            .and_modify(|existing| {
                if *existing == ChangeKind::Updated {
                    *existing = kind;
                }
            })
            .or_insert(kind);
    }
}

async fn bundle_pass(process: &ProcessBuilder, events: &EventSender) {
    let _ = events.send(WatchEvent::BundleStart);
    let start = Instant::now();

    match process.exec_and_check().await {
        Ok(_) => {
            let _ = events.send(WatchEvent::BundleEnd {
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }
        Err(err) => {
            let _ = events.send(WatchEvent::error(format!("{:#}", err)));
        }
    }
}

/// Dev server driven through its command line.
#[derive(Debug, Clone)]
pub struct CommandDevServer {
    command: Vec<String>,
    project_root: PathBuf,
    ready_timeout: Duration,
}

impl CommandDevServer {
    pub fn new(command: Vec<String>, project_root: impl Into<PathBuf>, ready_timeout: Duration) -> Self {
        CommandDevServer {
            command,
            project_root: project_root.into(),
            ready_timeout,
        }
    }

    /// Arguments for serving `plan` on `port`.
    pub fn serve_args(plan: &BundlePlan, aliases: &BTreeMap<String, PathBuf>, port: u16) -> Vec<String> {
        let mut args = bundle_args(plan, aliases);
        args.push(format!("--servedir={}", plan.root.display()));
        args.push(format!("--serve={}", port));
        args.push("--watch".to_string());
        args
    }
}

/// URL a dev server on `port` is reachable at.
pub fn dev_url(port: u16) -> String {
    format!("http://localhost:{}/", port)
}

#[async_trait]
impl DevServer for CommandDevServer {
    async fn serve(
        &self,
        plan: BundlePlan,
        aliases: BTreeMap<String, PathBuf>,
        port: u16,
        events: EventSender,
    ) -> Result<DevSession> {
        ensure_dir(&plan.output_dir)?;

        let process = resolve_command(&self.project_root, &self.command)?
            .args(Self::serve_args(&plan, &aliases, port))
            .cwd(&plan.root)
            .own_process_group();

        tracing::debug!(unit = %plan.target, command = %process.display_command(), "starting dev server");

        let mut cmd = process.command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", process.display_command()))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(log_lines(stdout, plan.target.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_lines(stderr, plan.target.clone()));
        }

        let ready_timeout = self.ready_timeout;
        let handle = WatchHandle::spawn(move |mut shutdown| async move {
            let _ = events.send(WatchEvent::Started);
            let _ = events.send(WatchEvent::BundleStart);

            let start = Instant::now();
            let mut ready = false;
            let mut timed_out = false;
            let mut poll = tokio::time::interval(READY_POLL);

            loop {
                tokio::select! {
                    _ = cancelled(&mut shutdown) => {
                        terminate_tree(&mut child, Duration::from_secs(2)).await;
                        break;
                    }
                    status = child.wait() => {
                        let cause = match status {
                            Ok(status) => format!("dev server exited with {}", status),
                            Err(err) => format!("dev server failed: {}", err),
                        };
                        let _ = events.send(WatchEvent::error(cause));
                        break;
                    }
                    _ = poll.tick(), if !ready && !timed_out => {
                        if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                            ready = true;
                            let _ = events.send(WatchEvent::BundleEnd {
                                duration_ms: start.elapsed().as_millis() as u64,
                            });
                        } else if start.elapsed() > ready_timeout {
                            timed_out = true;
                            let _ = events.send(WatchEvent::error(format!(
                                "dev server did not accept connections on port {} within {}s",
                                port,
                                ready_timeout.as_secs()
                            )));
                        }
                    }
                }
            }
        });

        Ok(DevSession {
            url: dev_url(port),
            handle,
        })
    }
}

async fn log_lines<R>(reader: R, label: String)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = OutputLines::new(reader);
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.is_empty() {
            tracing::debug!(unit = %label, "{}", line);
        }
    }
}
