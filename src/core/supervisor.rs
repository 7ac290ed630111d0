// Tier2 sandbox supervisor
//
// Drives one candidate through Idle -> Prepared -> Running -> terminal ->
// Reaped. The candidate is spawned on the calling thread, which becomes its
// ptrace tracer; a watchdog thread owns the wall-clock deadline and kills the
// whole process group when it passes.

use crate::config::types::{Result, SandboxConfig, SandboxError};
use crate::core::types::{
    AnalysisRequest, Capability, ExitKind, KillReport, SandboxState, Tier2Report,
};
use crate::exec::preexec::ChildPlan;
use crate::kernel::namespace::NamespacePlan;
use crate::kernel::seccomp::SeccompProgram;
use crate::monitor::tracer::{reap_blocking, LivePids, Tracer};
use crate::monitor::MonitorMechanism;
use crate::observability::audit::{self, AuditEvent};
use crate::safety::ScratchDir;
use crate::verdict::behavior::BehaviorReducer;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{Pid, Uid};
use std::collections::HashSet;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const TRIAL_BINARY: &str = "/bin/true";
const TRIAL_BUDGET: Duration = Duration::from_secs(2);
const CHILD_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
const DEFAULT_CANDIDATE_NAME: &str = "candidate";
const MAX_CANDIDATE_NAME: usize = 64;

/// OS-level sandbox for dynamic analysis, configured once at probe time
pub struct Tier2Sandbox {
    mechanism: MonitorMechanism,
    program: SeccompProgram,
    /// Only the seccomp-trace mechanism installs the filter in the child
    install_filter: bool,
    namespaces: NamespacePlan,
    config: Arc<SandboxConfig>,
}

impl std::fmt::Debug for Tier2Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier2Sandbox")
            .field("mechanism", &self.mechanism)
            .field("install_filter", &self.install_filter)
            .field("namespaces", &self.namespaces.describe())
            .finish()
    }
}

impl Tier2Sandbox {
    /// Probe the host once and run a traced trial
    pub fn probe(config: &SandboxConfig) -> Capability<Self> {
        if !config.enable_tier2 {
            return Capability::unavailable("disabled by configuration");
        }
        let Some(mechanism) = MonitorMechanism::select() else {
            return Capability::unavailable("no syscall monitor on this platform");
        };
        if let Some(reason) = ptrace_restriction() {
            return Capability::unavailable(reason);
        }
        let program = match SeccompProgram::compile(&config.syscall_policy) {
            Ok(program) => program,
            Err(e) => return Capability::unavailable(format!("syscall policy does not compile: {}", e)),
        };

        let namespaces = NamespacePlan::select(config.network_isolation, &config.filesystem.read_only_paths);
        if config.network_isolation && !namespaces.isolates_network() {
            log::warn!("Network isolation requested but namespaces are unavailable; Tier2 runs with host network");
        }

        let sandbox = Self {
            mechanism,
            install_filter: mechanism == MonitorMechanism::SeccompTrace,
            program,
            namespaces,
            config: Arc::new(config.clone()),
        };

        match sandbox.trial() {
            Ok(()) => {
                log::info!(
                    "Tier2 sandbox ready: monitor {}, namespaces [{}], {} filter instructions",
                    sandbox.mechanism,
                    sandbox.namespaces.describe().join(", "),
                    sandbox.program.instruction_count()
                );
                Capability::Available(sandbox)
            }
            Err(e) => {
                log::warn!("Tier2 trial run failed: {}", e);
                Capability::unavailable(format!("trial run failed: {}", e))
            }
        }
    }

    /// Tier2 runs native executables and interpreter scripts only
    pub fn is_applicable(content: &[u8]) -> bool {
        content.starts_with(b"\x7fELF") || content.starts_with(b"#!")
    }

    pub fn mechanism(&self) -> MonitorMechanism {
        self.mechanism
    }

    pub fn namespaces(&self) -> Vec<&'static str> {
        self.namespaces.describe()
    }

    pub fn program(&self) -> &SeccompProgram {
        &self.program
    }

    /// Full run: prepare, launch, trace until exit or deadline, reap
    pub fn run(&self, request: &AnalysisRequest, budget: Duration) -> Result<Tier2Report> {
        let report = SandboxRun::new(self, request)
            .prepare()?
            .launch(budget)?
            .wait()?
            .into_report();
        Ok(report)
    }

    fn trial(&self) -> Result<()> {
        let scratch = ScratchDir::create(&self.config.filesystem.scratch_root)?;
        let started = Instant::now();
        let mut launched = self.spawn_traced(Path::new(TRIAL_BINARY), scratch.path(), TRIAL_BUDGET, started)?;

        let mut reducer = BehaviorReducer::new(self.config.scoring.clone());
        let traced = launched.tracer.run(&mut reducer);
        let fired = launched.watchdog.disarm();
        let outcome = traced?;
        launched.child.settle(outcome.root_exit.is_some());

        match outcome.root_exit {
            Some(ExitKind::Exited(0)) if !fired => Ok(()),
            other => Err(SandboxError::ProcessSpawn(format!(
                "{} under the sandbox ended with {:?}{}",
                TRIAL_BINARY,
                other,
                if fired { " after the deadline" } else { "" }
            ))),
        }
    }

    fn spawn_traced(&self, program: &Path, cwd: &Path, budget: Duration, started: Instant) -> Result<Launched<'_>> {
        let plan = ChildPlan::new(
            &self.config,
            budget,
            self.namespaces.clone(),
            self.install_filter.then(|| self.program.clone()),
        );

        let mut command = Command::new(program);
        command
            .env_clear()
            .env("PATH", CHILD_PATH)
            .env("HOME", cwd)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0);
        // SAFETY: run_in_child only issues raw syscalls on data prepared
        // before fork; it does not allocate, take locks, or log.
        unsafe {
            command.pre_exec(move || plan.run_in_child());
        }

        let child = command.spawn().map_err(SandboxError::from_spawn_error)?;
        let mut child = ChildHandle::adopt(child);
        let root = child.pid();

        let live: LivePids = Arc::new(Mutex::new(HashSet::from([root.as_raw()])));
        let watchdog = Watchdog::arm(root, Arc::clone(&live), budget)
            .map_err(|e| SandboxError::ResourceExhausted(format!("cannot start watchdog: {}", e)))?;

        let tracer = Tracer::attach(root, self.mechanism, Some(&self.program), live, started).map_err(|e| {
            // these come from a wait that already collected the root
            if matches!(e, SandboxError::ProcessSpawn(_)) {
                child.mark_reaped();
            }
            e
        })?;

        Ok(Launched {
            child,
            watchdog,
            tracer,
        })
    }
}

struct Launched<'s> {
    child: ChildHandle,
    watchdog: Watchdog,
    tracer: Tracer<'s>,
}

/// Owned sandbox child; killed and reaped on drop unless already collected
#[derive(Debug)]
pub struct ChildHandle {
    pid: Pid,
    reaped: bool,
}

impl ChildHandle {
    fn adopt(child: std::process::Child) -> Self {
        // std's Child is never waited on; this handle owns the reap
        let pid = Pid::from_raw(child.id() as i32);
        drop(child);
        Self { pid, reaped: false }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    fn mark_reaped(&mut self) {
        self.reaped = true;
    }

    /// Record that the tracer collected the root, or collect it now
    fn settle(&mut self, collected_by_tracer: bool) {
        if collected_by_tracer {
            self.mark_reaped();
        } else {
            self.kill_and_reap();
        }
    }

    fn kill_and_reap(&mut self) -> bool {
        if self.reaped {
            return false;
        }
        // the root is unreaped, so its pid and process group are still ours
        let _ = killpg(self.pid, Signal::SIGKILL);
        let _ = kill(self.pid, Signal::SIGKILL);
        reap_blocking(self.pid);
        self.reaped = true;
        true
    }
}

impl Drop for ChildHandle {
    fn drop(&mut self) {
        if self.kill_and_reap() {
            log::debug!("Killed and reaped sandbox child {} on cleanup", self.pid);
        }
    }
}

/// Wall-clock deadline for one run
struct Watchdog {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    fn arm(root: Pid, live: LivePids, budget: Duration) -> std::io::Result<Self> {
        let (tx, rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("sentinel-watchdog".to_string())
            .spawn(move || match rx.recv_timeout(budget) {
                Err(RecvTimeoutError::Timeout) => {
                    let live = live.lock().unwrap_or_else(PoisonError::into_inner);
                    if !live.is_empty() {
                        let _ = killpg(root, Signal::SIGKILL);
                    }
                    for pid in live.iter() {
                        let _ = kill(Pid::from_raw(*pid), Signal::SIGKILL);
                    }
                    true
                }
                _ => false,
            })?;
        Ok(Self {
            cancel: Some(tx),
            handle: Some(handle),
        })
    }

    /// Stop the timer; true when it had already fired
    fn disarm(&mut self) -> bool {
        self.cancel.take();
        self.handle
            .take()
            .map(|h| h.join().unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn ptrace_restriction() -> Option<String> {
    let scope = std::fs::read_to_string("/proc/sys/kernel/yama/ptrace_scope")
        .ok()
        .and_then(|s| s.trim().parse::<u8>().ok())
        .unwrap_or(0);
    match scope {
        0 | 1 => None,
        2 if Uid::effective().is_root() => None,
        other => Some(format!("ptrace restricted by yama (ptrace_scope={})", other)),
    }
}

/// File name for the candidate inside the scratch directory
fn candidate_name(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let clean: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_CANDIDATE_NAME)
        .collect();
    if clean.is_empty() || clean.starts_with('.') {
        DEFAULT_CANDIDATE_NAME.to_string()
    } else {
        clean
    }
}

// Run type-state

mod sealed {
    pub trait Sealed {}
}

/// Marker for the states of a `SandboxRun`
pub trait RunState: sealed::Sealed {
    const STATE: SandboxState;
}

pub struct Idle;

pub struct Prepared {
    scratch: ScratchDir,
    candidate: PathBuf,
}

pub struct Running<'s> {
    scratch: ScratchDir,
    launched: Launched<'s>,
    started: Instant,
    budget: Duration,
}

pub struct Finished {
    _scratch: ScratchDir,
    report: Tier2Report,
}

impl sealed::Sealed for Idle {}
impl sealed::Sealed for Prepared {}
impl sealed::Sealed for Running<'_> {}
impl sealed::Sealed for Finished {}

impl RunState for Idle {
    const STATE: SandboxState = SandboxState::Idle;
}
impl RunState for Prepared {
    const STATE: SandboxState = SandboxState::Prepared;
}
impl RunState for Running<'_> {
    const STATE: SandboxState = SandboxState::Running;
}
impl RunState for Finished {
    const STATE: SandboxState = SandboxState::Reaped;
}

/// One candidate's trip through the sandbox
///
/// Each transition consumes the previous state, so a run cannot be waited on
/// before launch, reported before it is reaped, or driven twice.
pub struct SandboxRun<'s, S: RunState> {
    sandbox: &'s Tier2Sandbox,
    request: &'s AnalysisRequest,
    state: S,
}

impl<S: RunState> SandboxRun<'_, S> {
    pub fn state(&self) -> SandboxState {
        S::STATE
    }
}

impl<'s> SandboxRun<'s, Idle> {
    pub fn new(sandbox: &'s Tier2Sandbox, request: &'s AnalysisRequest) -> Self {
        Self {
            sandbox,
            request,
            state: Idle,
        }
    }

    /// Private scratch directory with the candidate written owner-only
    pub fn prepare(self) -> Result<SandboxRun<'s, Prepared>> {
        let scratch = ScratchDir::create(&self.sandbox.config.filesystem.scratch_root)?;
        let candidate = scratch.write_candidate(&candidate_name(self.request.filename()), self.request.content())?;
        log::debug!(
            "Prepared Tier2 run {} at {}",
            self.request.id(),
            candidate.display()
        );
        Ok(SandboxRun {
            sandbox: self.sandbox,
            request: self.request,
            state: Prepared { scratch, candidate },
        })
    }
}

impl<'s> SandboxRun<'s, Prepared> {
    pub fn candidate(&self) -> &Path {
        &self.state.candidate
    }

    /// Spawn under the sandbox, arm the watchdog, attach the monitor
    pub fn launch(self, budget: Duration) -> Result<SandboxRun<'s, Running<'s>>> {
        let Prepared { scratch, candidate } = self.state;
        let started = Instant::now();
        let launched = self
            .sandbox
            .spawn_traced(&candidate, scratch.path(), budget, started)?;
        log::debug!(
            "Launched Tier2 candidate pid {} with {:?} budget",
            launched.child.pid(),
            budget
        );
        Ok(SandboxRun {
            sandbox: self.sandbox,
            request: self.request,
            state: Running {
                scratch,
                launched,
                started,
                budget,
            },
        })
    }
}

impl<'s> SandboxRun<'s, Running<'s>> {
    pub fn pid(&self) -> Pid {
        self.state.launched.child.pid()
    }

    /// Trace until the process tree is gone, then reap the root
    pub fn wait(self) -> Result<SandboxRun<'s, Finished>> {
        let Running {
            scratch,
            launched,
            started,
            budget,
        } = self.state;
        let Launched {
            mut child,
            mut watchdog,
            tracer,
        } = launched;
        let root_pid = child.pid().as_raw();
        let analysis_id = self.request.id().to_string();

        let mut reducer = BehaviorReducer::new(self.sandbox.config.scoring.clone());
        let traced = tracer.run(&mut reducer);
        let fired = watchdog.disarm();
        // an Err here drops `child`, which kills and reaps
        let outcome = traced?;
        child.settle(outcome.root_exit.is_some());

        let elapsed = started.elapsed();
        let terminal = if fired {
            SandboxState::TimedOut
        } else {
            match outcome.root_exit {
                Some(ExitKind::Exited(_)) => SandboxState::Completed,
                Some(ExitKind::Signaled(_)) | None => SandboxState::Crashed,
            }
        };
        debug_assert!(SandboxState::Running.can_advance_to(terminal));

        let policy_kill = outcome.tracer_policy_kill || outcome.root_exit.is_some_and(ExitKind::killed_by_filter);
        let metrics = reducer.finish(elapsed, fired, policy_kill);

        let mut notes = Vec::new();
        if outcome.root_exit.is_none() {
            notes.push("root exit status was not observed by the tracer".to_string());
        }
        if fired {
            log::warn!(
                "Tier2 candidate {} exceeded its {:?} budget and was killed",
                root_pid,
                budget
            );
            audit::emit(&AuditEvent::WatchdogKill {
                analysis_id: analysis_id.clone(),
                root_pid,
                budget_ms: budget.as_millis() as u64,
            });
        }
        if policy_kill {
            audit::emit(&AuditEvent::PolicyKill {
                analysis_id,
                root_pid,
                detail: format!("{:?}", outcome.root_exit),
            });
        }

        let report = Tier2Report {
            metrics,
            terminal_state: terminal,
            exit: outcome.root_exit,
            root_pid,
            monitor: self.sandbox.mechanism.to_string(),
            namespaces: self.sandbox.namespaces().into_iter().map(str::to_string).collect(),
            events_observed: outcome.events,
            kill: KillReport {
                watchdog_fired: fired,
                group_kill_sent: fired,
                stragglers_killed: outcome.stragglers_killed,
                reaped: child.is_reaped(),
                notes,
            },
            wall_time_ms: elapsed.as_millis() as u64,
        };

        Ok(SandboxRun {
            sandbox: self.sandbox,
            request: self.request,
            state: Finished {
                _scratch: scratch,
                report,
            },
        })
    }
}

impl SandboxRun<'_, Finished> {
    pub fn report(&self) -> &Tier2Report {
        &self.state.report
    }

    /// Take the report; the scratch directory is removed here
    pub fn into_report(self) -> Tier2Report {
        self.state.report
    }
}
