//! Implementation of `triad dev`, `triad preview` and `triad start`.
//!
//! Development runs start every UI dev server, then every bridge and the
//! host watch session, wait until each has written its first bundle and
//! only then spawn the host process. Preview and production runs build
//! every target once, in the same order, before spawning it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::builder::command::{dev_url, CommandBundler, CommandDevServer};
use crate::builder::driver::{BuildDriver, BuildOutput, WatchSession};
use crate::builder::engine::{BundleEngine, DevServer};
use crate::builder::events::TargetEvent;
use crate::builder::plan::BundlePlan;
use crate::core::config::RestartPolicy;
use crate::core::project::Project;
use crate::core::target::{TargetDescriptor, TargetKind};
use crate::error::{BuildError, ProcessError, TriadError};
use crate::ops::control::{Control, ControlChannel};
use crate::ops::packager::{CommandPackager, Packager};
use crate::supervisor::{Supervisor, SupervisorEvent, SupervisorExit, SupervisorHandle};
use crate::util::process::{resolve_command, ProcessBuilder};

/// Engines a run hands its targets to.
#[derive(Clone)]
pub struct Engines {
    /// Host and bridge bundler
    pub bundler: Arc<dyn BundleEngine>,
    pub ui_bundler: Arc<dyn BundleEngine>,
    pub dev_server: Arc<dyn DevServer>,
    pub packager: Arc<dyn Packager>,
}

impl Engines {
    /// Command-line engines as configured under `[engine]`.
    pub fn from_config(project: &Project) -> Self {
        let engine = &project.config().engine;
        let root = project.root();

        Engines {
            bundler: Arc::new(CommandBundler::new(engine.bundler.clone(), root)),
            ui_bundler: Arc::new(CommandBundler::new(engine.ui_bundler.clone(), root)),
            dev_server: Arc::new(CommandDevServer::new(
                engine.dev_server.clone(),
                root,
                Duration::from_millis(engine.dev_ready_timeout_ms),
            )),
            packager: Arc::new(CommandPackager::new(engine.packager.clone())),
        }
    }

    fn driver_for(&self, kind: TargetKind) -> BuildDriver {
        match kind {
            TargetKind::Ui => BuildDriver::new(self.ui_bundler.clone()),
            TargetKind::Host | TargetKind::Bridge => BuildDriver::new(self.bundler.clone()),
        }
    }
}

/// Something observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RunEvent {
    Target(TargetEvent),
    Host(SupervisorEvent),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The operator quit.
    Quit,
    /// The host process exited on its own.
    HostExited(Option<i32>),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Quit | RunOutcome::HostExited(Some(0)) => 0,
            RunOutcome::HostExited(_) => 1,
        }
    }
}

/// Whether a finished host rebuild restarts the host process.
///
/// The first build happens before the process is spawned and never
/// restarts it.
pub fn restarts_on_rebuild(policy: RestartPolicy, host_builds: u64) -> bool {
    policy.on_rebuild() && host_builds > 1
}

/// Dev-server URLs of every UI, from their configured ports.
pub fn ui_dev_urls(project: &Project) -> BTreeMap<String, String> {
    let default_port = project.config().engine.dev_port;
    project
        .uis()
        .map(|ui| (ui.id.clone(), dev_url(ui.port.unwrap_or(default_port))))
        .collect()
}

/// Top-level coordinator of a run.
pub struct Orchestrator {
    project: Project,
    engines: Engines,
    observer: Option<mpsc::UnboundedSender<RunEvent>>,
}

impl Orchestrator {
    pub fn new(project: Project, engines: Engines) -> Self {
        Orchestrator {
            project,
            engines,
            observer: None,
        }
    }

    /// Also send every target and host event to `observer`.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn engines(&self) -> &Engines {
        &self.engines
    }

    fn observe(&self, event: RunEvent) {
        if let Some(observer) = &self.observer {
            let _ = observer.send(event);
        }
    }

    /// Targets in start order: UIs, bridges, then the host.
    fn start_order(&self) -> Vec<&TargetDescriptor> {
        self.project
            .uis()
            .chain(self.project.bridges())
            .chain(std::iter::once(self.project.host()))
            .collect()
    }

    /// Build every target once, strictly in start order.
    pub async fn build_all(&self) -> Result<Vec<BuildOutput>, BuildError> {
        let no_urls = BTreeMap::new();
        let mut outputs = Vec::new();

        for target in self.start_order() {
            let plan = BundlePlan::derive(&self.project, target, &no_urls);
            let output = self.engines.driver_for(target.kind).build_once(&plan).await?;
            outputs.push(output);
        }

        Ok(outputs)
    }

    /// The command that runs the host bundle.
    pub fn host_command(&self, ui_urls: &BTreeMap<String, String>) -> Result<ProcessBuilder, ProcessError> {
        let host = self.project.host();
        let runtime = &self.project.config().engine.runtime;

        let command = resolve_command(self.project.root(), runtime).map_err(|e| {
            ProcessError::Spawn {
                program: runtime.join(" "),
                message: e.to_string(),
            }
        })?;

        let cwd = if self.project.mode().is_production() {
            self.project.root()
        } else {
            host.root.as_path()
        };

        Ok(command
            .arg(host.bundle_file())
            .envs(&self.project.env_for(host, ui_urls))
            .env("FORCE_COLOR", "3")
            .cwd(cwd))
    }

    /// Run the project in its mode until the host exits or the operator
    /// quits.
    pub async fn run(&self, controls: ControlChannel) -> Result<RunOutcome, TriadError> {
        if self.project.mode().is_development() {
            return self.run_development(controls).await;
        }

        self.build_all().await?;

        // one-shot runs have no watch events
        let (_sink, target_events) = mpsc::unbounded_channel();
        let command = self.host_command(&BTreeMap::new())?;
        self.supervise(command, controls, target_events).await
    }

    async fn run_development(&self, controls: ControlChannel) -> Result<RunOutcome, TriadError> {
        let mut sessions = Vec::new();
        let outcome = self.develop(&mut sessions, controls).await;

        for session in sessions {
            session.cancel().await;
        }

        outcome
    }

    async fn develop(
        &self,
        sessions: &mut Vec<WatchSession>,
        mut controls: ControlChannel,
    ) -> Result<RunOutcome, TriadError> {
        let (sink, mut target_events) = mpsc::unbounded_channel();

        let ui_urls = self.start_sessions(&sink, &ui_dev_urls(&self.project), sessions).await?;

        if !self
            .await_first_bundles(sessions, &mut controls, &mut target_events)
            .await?
        {
            return Ok(RunOutcome::Quit);
        }

        let command = self.host_command(&ui_urls)?;
        self.supervise(command, controls, target_events).await
    }

    /// Start every watch session in start order.
    ///
    /// Returns the UI URLs as reported by the dev servers.
    async fn start_sessions(
        &self,
        sink: &mpsc::UnboundedSender<TargetEvent>,
        ui_urls: &BTreeMap<String, String>,
        sessions: &mut Vec<WatchSession>,
    ) -> Result<BTreeMap<String, String>, BuildError> {
        let default_port = self.project.config().engine.dev_port;
        let mut ui_urls = ui_urls.clone();

        for target in self.start_order() {
            let plan = BundlePlan::derive(&self.project, target, &ui_urls);
            let driver = self.engines.driver_for(target.kind);

            let session = if target.kind == TargetKind::Ui {
                let port = target.port.unwrap_or(default_port);
                driver
                    .serve(self.engines.dev_server.as_ref(), plan, port, sink.clone())
                    .await?
            } else {
                driver.watch(plan, sink.clone()).await?
            };

            if let Some(url) = session.url() {
                ui_urls.insert(target.id.clone(), url.to_string());
            }
            sessions.push(session);
        }

        Ok(ui_urls)
    }

    /// Wait until every session has written its first bundle.
    ///
    /// Returns `false` if the operator quit first.
    async fn await_first_bundles(
        &self,
        sessions: &mut [WatchSession],
        controls: &mut ControlChannel,
        target_events: &mut mpsc::UnboundedReceiver<TargetEvent>,
    ) -> Result<bool, BuildError> {
        let mut controls_open = true;

        for session in sessions.iter_mut() {
            let label = session.label().to_string();

            loop {
                tokio::select! {
                    ready = session.wait_ready() => {
                        if !ready {
                            return Err(BuildError::new(label, "session ended before its first bundle"));
                        }
                        break;
                    }
                    Some(event) = target_events.recv() => self.observe(RunEvent::Target(event)),
                    control = controls.recv(), if controls_open => match control {
                        Some(Control::Quit) => return Ok(false),
                        Some(Control::RestartHost) => {
                            tracing::info!(unit = "host", "not running yet");
                        }
                        None => controls_open = false,
                    },
                }
            }
        }

        // everything up to the first bundles is observed before the host runs
        while let Ok(event) = target_events.try_recv() {
            self.observe(RunEvent::Target(event));
        }

        Ok(true)
    }

    /// Spawn the host process and supervise it.
    async fn supervise(
        &self,
        command: ProcessBuilder,
        mut controls: ControlChannel,
        mut target_events: mpsc::UnboundedReceiver<TargetEvent>,
    ) -> Result<RunOutcome, TriadError> {
        let host_label = self.project.host().label();
        let settings = &self.project.config().supervisor;

        let (supervisor, handle, mut host_events) = Supervisor::new(
            command,
            host_label.clone(),
            Duration::from_millis(settings.restart_timeout_ms),
        );
        let mut supervision: JoinHandle<Result<SupervisorExit, ProcessError>> =
            tokio::spawn(supervisor.run());

        let mut controls_open = true;
        let mut host_builds = 1;

        let exit = loop {
            tokio::select! {
                result = &mut supervision => break result,
                Some(event) = host_events.recv() => self.observe(RunEvent::Host(event)),
                Some(event) = target_events.recv() => {
                    if event.target == host_label && event.event.is_bundle_end() {
                        host_builds += 1;
                        if restarts_on_rebuild(settings.restart_on, host_builds) {
                            request_restart(&handle);
                        }
                    }
                    self.observe(RunEvent::Target(event));
                }
                control = controls.recv(), if controls_open => match control {
                    Some(Control::Quit) => {
                        tracing::info!("Shutting down...");
                        handle.shutdown();
                    }
                    Some(Control::RestartHost) => {
                        if settings.restart_on.on_keypress() {
                            request_restart(&handle);
                        } else {
                            tracing::info!(unit = %host_label, "keypress restarts are disabled");
                        }
                    }
                    None => controls_open = false,
                },
            }
        };

        // the supervisor is gone; deliver what it reported last
        while let Ok(event) = host_events.try_recv() {
            self.observe(RunEvent::Host(event));
        }

        match exit {
            Ok(Ok(SupervisorExit::Exited(code))) => Ok(RunOutcome::HostExited(code)),
            Ok(Ok(SupervisorExit::Shutdown)) => Ok(RunOutcome::Quit),
            Ok(Err(err)) => Err(err.into()),
            Err(err) => Err(ProcessError::Stream {
                message: err.to_string(),
            }
            .into()),
        }
    }
}

fn request_restart(handle: &SupervisorHandle) {
    if !handle.restart() {
        tracing::debug!(unit = "host", "host process is gone, restart skipped");
    }
}
