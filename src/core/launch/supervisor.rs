// ─── Process Supervisor ───
// Owns one launch session: prepares the command line, spawns the game,
// batches its output and runs the exit path exactly once.
//
//   NOT_STARTED -> INITIALIZING -> STARTED -> STOPPED | ERRORED
//
// Preparation failures drop back to NOT_STARTED. `reset` returns a
// finished session to NOT_STARTED.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::classpath::{build_classpath, game_jar_path, join_classpath};
use super::collector::collect_libraries;
use super::command::{
    legacy_jvm_templates, legacy_resolution_templates, memory_templates, resolve_java,
    CommandLine, LaunchContext, PreLaunchTask,
};
use super::dedup::LibraryDeduplicator;
use super::events::{
    format_byte_progress, LaunchObserver, LogBatch, LogLine, OutputStream, ProgressThrottle,
    StatusEvent, TerminalEvent, TerminalReason,
};
use super::natives::{reap_orphaned, NativesExtractor};
use super::template::{ArgumentTemplater, LaunchValues};
use crate::core::assets::{index_path, AssetFetcher, AssetIndex, FetchProgress, FetchRequest};
use crate::core::auth::IdentityProvider;
use crate::core::config::LauncherConfig;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::instance::{Instance, InstanceStore};
use crate::core::version::{
    ArgumentTemplate, ManifestResolver, ResolvedChain, RuleContext, VersionIndex,
};

/// Cooperative cancellation flag, polled between preparation steps.
pub type CancellationToken = Arc<AtomicBool>;

pub fn cancellation_token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

const TOTAL_STEPS: usize = 6;

/// How long output readers may outlive the process before they are cut off.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    NotStarted,
    Initializing,
    Started,
    Stopped,
    Errored,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Stopped | Phase::Errored)
    }
}

/// Runs after the process exits, before ephemeral directories are deleted.
/// Receives the exit code, if any.
pub type ExitCallback = Box<dyn FnOnce(Option<i32>) -> LauncherResult<()> + Send>;

/// External collaborators a launch depends on.
#[derive(Clone)]
pub struct LaunchServices {
    pub versions: Arc<dyn VersionIndex>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub identity: Arc<dyn IdentityProvider>,
    pub instances: Arc<dyn InstanceStore>,
}

/// Returned by a successful `launch`.
#[derive(Debug, Clone)]
pub struct LaunchSession {
    pub pid: Option<u32>,
    /// Redacted, shell-escaped command line.
    pub command_line: String,
    pub natives_dir: PathBuf,
}

struct Prepared {
    instance: Instance,
    command: CommandLine,
    rendered: String,
    natives_dir: PathBuf,
}

struct SessionState {
    phase: Phase,
    chain: Option<ResolvedChain>,
    pre_launch_tasks: Vec<Arc<dyn PreLaunchTask>>,
    exit_callbacks: Vec<ExitCallback>,
    ephemeral_dirs: Vec<PathBuf>,
    observers: Vec<Arc<dyn LaunchObserver>>,
    kill_tx: Option<oneshot::Sender<()>>,
    user_stopped: bool,
    pid: Option<u32>,
}

struct Shared {
    state: Mutex<SessionState>,
    phase_tx: watch::Sender<Phase>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn observers(&self) -> Vec<Arc<dyn LaunchObserver>> {
        self.lock().observers.clone()
    }

    fn set_phase(&self, phase: Phase) {
        self.lock().phase = phase;
        self.phase_tx.send_replace(phase);
    }

    fn emit_log(&self, lines: Vec<LogLine>) {
        if lines.is_empty() {
            return;
        }
        let batch = LogBatch { lines };
        for observer in self.observers() {
            observer.on_log_batch(&batch);
        }
    }

    /// The exit path. Callbacks run first, then ephemeral directories are
    /// deleted, then the phase flips and the terminal event goes out.
    async fn finish(&self, phase: Phase, event: TerminalEvent) {
        let (callbacks, dirs) = {
            let mut state = self.lock();
            state.kill_tx = None;
            state.pid = None;
            (
                std::mem::take(&mut state.exit_callbacks),
                std::mem::take(&mut state.ephemeral_dirs),
            )
        };

        for callback in callbacks {
            if let Err(e) = callback(event.exit_code) {
                warn!("Exit callback failed: {}", e);
            }
        }
        remove_dirs(&dirs).await;

        self.lock().phase = phase;
        for observer in self.observers() {
            observer.on_terminal(&event);
        }
        self.phase_tx.send_replace(phase);
    }
}

pub struct ProcessSupervisor {
    config: LauncherConfig,
    services: LaunchServices,
    dedup: LibraryDeduplicator,
    shared: Arc<Shared>,
}

impl ProcessSupervisor {
    pub fn new(config: LauncherConfig, services: LaunchServices) -> Self {
        let dedup = LibraryDeduplicator::new(config.dedup_rules());
        let (phase_tx, _) = watch::channel(Phase::NotStarted);
        let state = SessionState {
            phase: Phase::NotStarted,
            chain: None,
            pre_launch_tasks: Vec::new(),
            exit_callbacks: Vec::new(),
            ephemeral_dirs: Vec::new(),
            observers: Vec::new(),
            kill_tx: None,
            user_stopped: false,
            pid: None,
        };

        Self {
            config,
            services,
            dedup,
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                phase_tx,
            }),
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    pub fn pid(&self) -> Option<u32> {
        self.shared.lock().pid
    }

    /// The chain resolved by the current session, if preparation got that far.
    pub fn resolved_chain(&self) -> Option<ResolvedChain> {
        self.shared.lock().chain.clone()
    }

    pub fn add_observer(&self, observer: Arc<dyn LaunchObserver>) {
        self.shared.lock().observers.push(observer);
    }

    pub fn add_pre_launch_task(&self, task: Arc<dyn PreLaunchTask>) {
        self.shared.lock().pre_launch_tasks.push(task);
    }

    pub fn add_exit_callback<F>(&self, callback: F)
    where
        F: FnOnce(Option<i32>) -> LauncherResult<()> + Send + 'static,
    {
        self.shared.lock().exit_callbacks.push(Box::new(callback));
    }

    /// Directory deleted recursively once the session reaches a terminal
    /// phase, or when preparation fails.
    pub fn register_ephemeral_dir(&self, dir: PathBuf) {
        self.shared.lock().ephemeral_dirs.push(dir);
    }

    /// Delete natives directories left behind by launcher processes that
    /// are no longer running.
    pub fn reap_orphaned_natives(&self) -> LauncherResult<usize> {
        reap_orphaned(&self.config.natives_dir())
    }

    /// Prepare and spawn the game for `instance_id`.
    ///
    /// Legal only from `NotStarted`. Preparation errors are returned here
    /// and leave the supervisor in `NotStarted`. Once the process runs, its
    /// fate is reported through observers only.
    pub async fn launch(
        &self,
        instance_id: &str,
        cancel: &CancellationToken,
    ) -> LauncherResult<LaunchSession> {
        {
            let mut state = self.shared.lock();
            if state.phase != Phase::NotStarted {
                return Err(LauncherError::IllegalState {
                    action: "launch",
                    phase: state.phase,
                });
            }
            state.phase = Phase::Initializing;
            state.user_stopped = false;
        }
        self.shared.phase_tx.send_replace(Phase::Initializing);

        let prepared = match self.prepare(instance_id, cancel).await {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("Launch preparation for {} failed: {}", instance_id, e);
                let dirs = std::mem::take(&mut self.shared.lock().ephemeral_dirs);
                remove_dirs(&dirs).await;
                self.shared.set_phase(Phase::NotStarted);
                return Err(e);
            }
        };

        self.spawn(prepared).await
    }

    /// Request termination of a running game. No-op unless `Started`.
    pub fn force_stop(&self) {
        let mut state = self.shared.lock();
        if state.phase != Phase::Started {
            debug!("force_stop ignored while {:?}", state.phase);
            return;
        }
        state.user_stopped = true;
        if let Some(kill_tx) = state.kill_tx.take() {
            let _ = kill_tx.send(());
        }
    }

    /// Back to `NotStarted`, dropping the resolved chain, pre-launch tasks
    /// and exit callbacks. Directories registered since the last launch are
    /// deleted. Observers stay registered.
    pub fn reset(&self) -> LauncherResult<()> {
        let dirs = {
            let mut state = self.shared.lock();
            match state.phase {
                Phase::NotStarted | Phase::Stopped | Phase::Errored => {}
                phase => {
                    return Err(LauncherError::IllegalState {
                        action: "reset",
                        phase,
                    })
                }
            }
            state.phase = Phase::NotStarted;
            state.chain = None;
            state.pre_launch_tasks.clear();
            state.exit_callbacks.clear();
            state.kill_tx = None;
            state.user_stopped = false;
            state.pid = None;
            std::mem::take(&mut state.ephemeral_dirs)
        };
        for dir in &dirs {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => debug!("Removed ephemeral directory {:?}", dir),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Cannot remove {:?}, leaving it for the startup sweep: {}", dir, e),
            }
        }
        self.shared.phase_tx.send_replace(Phase::NotStarted);
        Ok(())
    }

    /// Resolves once the session reaches `Stopped` or `Errored` and the
    /// terminal event has been delivered.
    pub async fn wait_for_exit(&self) -> Phase {
        let mut rx = self.shared.phase_tx.subscribe();
        let phase = match rx.wait_for(|phase| phase.is_terminal()).await {
            Ok(phase) => *phase,
            Err(_) => self.phase(),
        };
        phase
    }

    fn emit_status(&self, step_index: usize, description: &str, fraction: f64, bytes: Option<String>) {
        let event = StatusEvent {
            step_index,
            total_steps: TOTAL_STEPS,
            fraction,
            description: description.to_string(),
            bytes,
        };
        for observer in self.shared.observers() {
            observer.on_status(&event);
        }
    }

    async fn prepare(&self, instance_id: &str, cancel: &CancellationToken) -> LauncherResult<Prepared> {
        check_cancel(cancel)?;
        let instance = self.services.instances.load(instance_id).await?;

        // 1. Version chain
        self.emit_status(1, "Resolving version chain", 0.0, None);
        let chain = ManifestResolver::new(self.services.versions.as_ref())
            .resolve(&instance.version_id)
            .await?;
        info!("Resolved {} as {}", instance.version_id, chain.ids().join(" -> "));
        self.shared.lock().chain = Some(chain.clone());
        check_cancel(cancel)?;

        // 2. Libraries
        self.emit_status(2, "Collecting libraries", 0.0, None);
        let rules = RuleContext::current().with_features(instance.active_features());
        let collected = collect_libraries(&chain, &rules)?;
        let libraries = self.dedup.apply(&chain, collected).libraries;
        check_cancel(cancel)?;

        // 3. Files on disk
        self.emit_status(3, "Checking game files", 0.0, None);
        let libraries_dir = self.config.libraries_dir();
        let game_jar = game_jar_path(&self.config.versions_dir(), chain.jar_name());
        let assets_dir = self.config.assets_dir();
        let mut request =
            FetchRequest::for_launch(&libraries, &libraries_dir, &game_jar, chain.client_download());
        if let Some(info) = chain.asset_index() {
            request = request.with_asset_index(info, &assets_dir);
        }
        let throttle = Mutex::new(ProgressThrottle::new(self.config.progress_min_spacing()));
        let on_progress = |progress: FetchProgress| {
            let fraction = progress.fraction();
            let due = throttle
                .lock()
                .map(|mut t| t.should_emit(fraction))
                .unwrap_or(true);
            if due {
                let bytes = format_byte_progress(progress.bytes_done, progress.bytes_total);
                self.emit_status(3, "Checking game files", fraction, Some(bytes));
            }
        };
        self.services.fetcher.ensure(&request, &on_progress).await?;
        check_cancel(cancel)?;

        if let Some(info) = chain.asset_index() {
            let index = AssetIndex::load(&index_path(&assets_dir, &info.id)).await?;
            let objects = FetchRequest {
                entries: index.object_entries(&assets_dir),
            };
            debug!("Asset index {} lists {} objects", info.id, objects.entries.len());
            self.services.fetcher.ensure(&objects, &on_progress).await?;
            check_cancel(cancel)?;
        }

        // 4. Natives
        self.emit_status(4, "Extracting natives", 0.0, None);
        let extractor = NativesExtractor::new(self.config.natives_dir(), &libraries_dir);
        let natives_dir = extractor.create_session_dir(&chain.leaf().id).await?;
        self.register_ephemeral_dir(natives_dir.clone());
        extractor.extract(&libraries, &natives_dir).await?;
        check_cancel(cancel)?;

        // 5. Command line
        self.emit_status(5, "Building command line", 0.0, None);
        let game_dir = instance.game_dir();
        tokio::fs::create_dir_all(&game_dir)
            .await
            .map_err(|e| LauncherError::io(&game_dir, e))?;

        let classpath = join_classpath(&build_classpath(&libraries, &libraries_dir, &game_jar)?);
        let account = self.services.identity.launch_profile();
        let templater = ArgumentTemplater::for_launch(&LaunchValues {
            account: &account,
            version_name: &chain.leaf().id,
            version_type: chain.version_type(),
            game_dir: &game_dir,
            assets_root: &assets_dir,
            asset_index: chain.asset_index_id(),
            natives_dir: &natives_dir,
            libraries_dir: &libraries_dir,
            classpath: &classpath,
            launcher_name: &self.config.launcher_name,
            launcher_version: &self.config.launcher_version,
            resolution: instance.resolution.map(|r| (r.width, r.height)),
            max_memory_mb: instance.max_memory_mb,
            min_memory_mb: instance.min_memory_mb,
        });

        let (jvm_templates, game_templates) = launch_templates(&chain, &instance);
        let jvm = templater.render(&jvm_templates, &rules);
        let game = templater.render(&game_templates, &rules);
        let unresolved: Vec<&String> = jvm.unresolved.iter().chain(&game.unresolved).collect();
        if !unresolved.is_empty() {
            warn!("Launch placeholders without a value: {:?}", unresolved);
        }

        let tasks = self.shared.lock().pre_launch_tasks.clone();
        let mut ctx = LaunchContext::default();
        for task in &tasks {
            debug!("Running pre-launch task {}", task.name());
            task.run(&instance, &mut ctx).await?;
        }

        let java = resolve_java(&instance, &self.config.default_java);
        let command = CommandLine::assemble(
            &java,
            jvm.args,
            chain.main_class(),
            game.args,
            &ctx,
            &game_dir,
            &natives_dir,
        );
        let rendered = command.render_for_logs(&templater);
        info!("Launch command for {}: {}", instance.id, rendered);
        check_cancel(cancel)?;

        Ok(Prepared {
            instance,
            command,
            rendered,
            natives_dir,
        })
    }

    async fn spawn(&self, prepared: Prepared) -> LauncherResult<LaunchSession> {
        let Prepared {
            instance,
            command,
            rendered,
            natives_dir,
        } = prepared;

        // 6. Spawn
        self.emit_status(6, "Starting game", 0.0, None);
        let mut child = match command.to_command().spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("{}: {}", command.program, e);
                error!("Cannot start game for {}: {}", instance.id, message);
                let event = TerminalEvent {
                    reason: TerminalReason::LaunchFailed,
                    exit_code: None,
                    message: Some(message.clone()),
                };
                self.shared.finish(Phase::Errored, event).await;
                return Err(LauncherError::Spawn(message));
            }
        };

        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();
        {
            let mut state = self.shared.lock();
            state.phase = Phase::Started;
            state.pid = pid;
            state.kill_tx = Some(kill_tx);
        }
        self.shared.phase_tx.send_replace(Phase::Started);
        self.emit_status(6, "Game started", 1.0, None);
        info!("Launched instance {} (PID {:?})", instance.name, pid);

        if let Err(e) = self
            .services
            .instances
            .record_launch(&instance.id, Utc::now())
            .await
        {
            warn!("Cannot persist last-played time for {}: {}", instance.id, e);
        }

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump_lines(
                stdout,
                OutputStream::Stdout,
                instance.id.clone(),
                line_tx.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump_lines(
                stderr,
                OutputStream::Stderr,
                instance.id.clone(),
                line_tx.clone(),
            )));
        }
        drop(line_tx);

        let flusher = tokio::spawn(flush_batches(
            line_rx,
            self.config.log_flush_interval(),
            self.shared.clone(),
        ));
        tokio::spawn(watch_child(
            child,
            kill_rx,
            pumps,
            flusher,
            self.shared.clone(),
            instance.id.clone(),
        ));

        Ok(LaunchSession {
            pid,
            command_line: rendered,
            natives_dir,
        })
    }
}

/// JVM and program templates for a chain, with launcher defaults and the
/// instance's own extra arguments.
fn launch_templates(
    chain: &ResolvedChain,
    instance: &Instance,
) -> (Vec<ArgumentTemplate>, Vec<ArgumentTemplate>) {
    let mut jvm = memory_templates();
    let chain_jvm = chain.jvm_templates();
    if chain_jvm.is_empty() {
        jvm.extend(legacy_jvm_templates());
    } else {
        jvm.extend(chain_jvm);
    }
    jvm.extend(instance.jvm_args.iter().map(|a| ArgumentTemplate::plain(a.as_str())));

    let mut game = chain.game_templates();
    if !chain.has_modern_arguments() {
        game.extend(legacy_resolution_templates());
    }
    game.extend(instance.game_args.iter().map(|a| ArgumentTemplate::plain(a.as_str())));

    (jvm, game)
}

fn check_cancel(cancel: &CancellationToken) -> LauncherResult<()> {
    if cancel.load(Ordering::SeqCst) {
        return Err(LauncherError::Cancelled);
    }
    Ok(())
}

async fn remove_dirs(dirs: &[PathBuf]) {
    for dir in dirs {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => debug!("Removed ephemeral directory {:?}", dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot remove {:?}, leaving it for the startup sweep: {}", dir, e),
        }
    }
}

async fn pump_lines<R>(
    reader: R,
    stream: OutputStream,
    instance_id: String,
    tx: mpsc::UnboundedSender<LogLine>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(text)) => {
                match stream {
                    OutputStream::Stdout => info!("[game:{}][stdout] {}", instance_id, text),
                    OutputStream::Stderr => warn!("[game:{}][stderr] {}", instance_id, text),
                }
                if tx.send(LogLine { stream, text }).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Output pump for {} stopped: {}", instance_id, e);
                break;
            }
        }
    }
}

/// Collects lines and hands them to observers once per `interval`. Ends
/// with a final flush when every pump has finished.
async fn flush_batches(
    mut rx: mpsc::UnboundedReceiver<LogLine>,
    interval: Duration,
    shared: Arc<Shared>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending = Vec::new();

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => pending.push(line),
                None => break,
            },
            _ = ticker.tick() => shared.emit_log(std::mem::take(&mut pending)),
        }
    }
    shared.emit_log(pending);
}

async fn watch_child(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    mut pumps: Vec<JoinHandle<()>>,
    flusher: JoinHandle<()>,
    shared: Arc<Shared>,
    instance_id: String,
) {
    let pid = child.id();
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        Ok(()) = &mut kill_rx => None,
    };
    let status = match exited {
        Some(status) => status,
        None => {
            info!("Stopping game process for {}", instance_id);
            kill_process_group(pid);
            if let Err(e) = child.start_kill() {
                warn!("Kill request for {} failed: {}", instance_id, e);
            }
            child.wait().await
        }
    };

    // Every line read must be delivered before the terminal event. Pipes kept
    // open by leftover descendants are abandoned after the grace period.
    let drained = tokio::time::timeout(
        OUTPUT_DRAIN_GRACE,
        futures_util::future::join_all(pumps.iter_mut()),
    )
    .await;
    if drained.is_err() {
        warn!(
            "Output of {} still open {:?} after exit, closing readers",
            instance_id, OUTPUT_DRAIN_GRACE
        );
        for pump in &pumps {
            pump.abort();
        }
    }
    let _ = flusher.await;

    let user_stopped = shared.lock().user_stopped;
    let (phase, event) = match status {
        Ok(status) if user_stopped || status.success() => {
            info!("Game process for {} exited with status: {:?}", instance_id, status);
            (
                Phase::Stopped,
                TerminalEvent {
                    reason: TerminalReason::Stopped,
                    exit_code: status.code(),
                    message: None,
                },
            )
        }
        Ok(status) => {
            error!("Game process for {} exited abnormally with status: {:?}", instance_id, status);
            let message = match status.code() {
                Some(code) => format!("exited with code {}", code),
                None => "terminated without an exit code".to_string(),
            };
            (
                Phase::Errored,
                TerminalEvent {
                    reason: TerminalReason::Errored,
                    exit_code: status.code(),
                    message: Some(message),
                },
            )
        }
        Err(e) => {
            error!("Waiting on game process for {} failed: {}", instance_id, e);
            let _ = child.start_kill();
            (
                Phase::Errored,
                TerminalEvent {
                    reason: TerminalReason::InternalError,
                    exit_code: None,
                    message: Some(e.to_string()),
                },
            )
        }
    };

    shared.finish(phase, event).await;
}

/// SIGKILL the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "Process group {} not signalled: {}",
            pid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
