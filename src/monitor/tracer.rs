// ptrace-based syscall monitor for x86_64 Linux
//
// The tracer runs on the thread that spawned the candidate (ptrace ties
// tracees to the tracing thread). It waits on the candidate's process group
// only, so concurrent analyses never collect each other's children.

use crate::config::types::{PolicyAction, Result, SandboxError};
use crate::core::types::ExitKind;
use crate::kernel::seccomp::{self, SeccompProgram};
use crate::kernel::syscalls::{self, SyscallCategory};
use crate::monitor::decode::{self, MAX_PATH_BYTES, MAX_SOCKADDR_BYTES};
use crate::monitor::{Disposition, MonitorMechanism, SyscallEvent, TraceSink};
use nix::errno::Errno;
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const WORD: usize = std::mem::size_of::<libc::c_long>();

/// Pids currently traced, shared with the watchdog
pub type LivePids = Arc<Mutex<HashSet<i32>>>;

/// What the tracer saw by the time the process tree was gone
#[derive(Debug, Default)]
pub struct TraceOutcome {
    pub root_exit: Option<ExitKind>,
    pub events: u64,
    pub stragglers_killed: u32,
    /// A tracee was killed by the tracer for a kill-listed syscall
    pub tracer_policy_kill: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct TraceeState {
    in_syscall: bool,
    deny_pending: bool,
}

pub struct Tracer<'a> {
    mechanism: MonitorMechanism,
    program: Option<&'a SeccompProgram>,
    root: Pid,
    pgid: Pid,
    started: Instant,
    tracees: HashMap<Pid, TraceeState>,
    /// Children announced by a fork event whose first stop has not arrived yet
    expected: HashSet<Pid>,
    live: LivePids,
    outcome: TraceOutcome,
}

impl<'a> Tracer<'a> {
    /// Take over a child stopped at its post-exec SIGTRAP
    pub fn attach(
        root: Pid,
        mechanism: MonitorMechanism,
        program: Option<&'a SeccompProgram>,
        live: LivePids,
        started: Instant,
    ) -> Result<Self> {
        let mut tracer = Self {
            mechanism,
            program,
            root,
            pgid: root,
            started,
            tracees: HashMap::new(),
            expected: HashSet::new(),
            live,
            outcome: TraceOutcome::default(),
        };

        loop {
            match waitpid(root, Some(WaitPidFlag::__WALL)) {
                Ok(WaitStatus::Stopped(pid, Signal::SIGTRAP)) if pid == root => break,
                Ok(WaitStatus::Stopped(pid, sig)) if pid == root => {
                    // pre-exec stop for an unrelated signal; pass it on
                    ptrace::cont(pid, Some(sig)).map_err(attach_error)?;
                }
                Ok(WaitStatus::Exited(_, code)) => {
                    return Err(SandboxError::ProcessSpawn(format!(
                        "candidate exited with {} before exec",
                        code
                    )))
                }
                Ok(WaitStatus::Signaled(_, sig, _)) => {
                    return Err(SandboxError::ProcessSpawn(format!(
                        "candidate killed by {} before exec",
                        sig
                    )))
                }
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(attach_error(e)),
            }
        }

        let mut options = Options::PTRACE_O_TRACESYSGOOD
            | Options::PTRACE_O_TRACEFORK
            | Options::PTRACE_O_TRACEVFORK
            | Options::PTRACE_O_TRACECLONE
            | Options::PTRACE_O_TRACEEXEC
            | Options::PTRACE_O_EXITKILL;
        if mechanism == MonitorMechanism::SeccompTrace {
            options |= Options::PTRACE_O_TRACESECCOMP;
        }
        ptrace::setoptions(root, options).map_err(attach_error)?;

        tracer.track(root);
        tracer.resume(root, None);
        Ok(tracer)
    }

    /// Drive the process tree until every tracee is gone
    pub fn run(mut self, sink: &mut dyn TraceSink) -> Result<TraceOutcome> {
        let group = Pid::from_raw(-self.pgid.as_raw());
        let mut stragglers_signalled = false;

        while !self.tracees.is_empty() {
            let status = match waitpid(group, Some(WaitPidFlag::__WALL)) {
                Ok(status) => status,
                Err(Errno::EINTR) => continue,
                // tracees that left the group; handled below
                Err(Errno::ECHILD) => break,
                Err(e) => {
                    return Err(SandboxError::MonitorAttach(format!("waitpid failed: {}", e)));
                }
            };
            self.dispatch(status, sink);

            if self.outcome.root_exit.is_some() && !stragglers_signalled {
                stragglers_signalled = true;
                self.kill_remaining();
            }
        }

        // anything that escaped the process group
        if !self.tracees.is_empty() {
            self.kill_remaining();
            let pids: Vec<Pid> = self.tracees.keys().copied().collect();
            for pid in pids {
                reap_blocking(pid);
                self.forget(pid);
            }
        }

        Ok(self.outcome)
    }

    fn dispatch(&mut self, status: WaitStatus, sink: &mut dyn TraceSink) {
        match status {
            WaitStatus::Exited(pid, code) => {
                self.forget(pid);
                if pid == self.root {
                    self.outcome.root_exit = Some(ExitKind::Exited(code));
                }
            }
            WaitStatus::Signaled(pid, sig, _) => {
                self.forget(pid);
                if pid == self.root {
                    self.outcome.root_exit = Some(ExitKind::Signaled(sig as i32));
                }
            }
            WaitStatus::PtraceSyscall(pid) => self.on_syscall_stop(pid, sink),
            WaitStatus::PtraceEvent(pid, _, event) => self.on_event(pid, event, sink),
            WaitStatus::Stopped(pid, sig) => {
                if !self.tracees.contains_key(&pid) || self.expected.remove(&pid) {
                    // first stop of an auto-attached child
                    self.track(pid);
                    if sig == Signal::SIGSTOP {
                        self.resume(pid, None);
                        return;
                    }
                }
                let forward = match sig {
                    Signal::SIGTRAP | Signal::SIGSTOP => None,
                    other => Some(other),
                };
                self.resume(pid, forward);
            }
            _ => {}
        }
    }

    fn on_event(&mut self, pid: Pid, event: libc::c_int, sink: &mut dyn TraceSink) {
        match event {
            libc::PTRACE_EVENT_SECCOMP => {
                let action = ptrace::getevent(pid)
                    .map(seccomp::decode_trace_data)
                    .unwrap_or(PolicyAction::Log);
                if let Ok(mut regs) = ptrace::getregs(pid) {
                    match action {
                        PolicyAction::Deny => {
                            self.emit(pid, &regs, Disposition::Denied, sink);
                            skip_with_eperm(pid, &mut regs);
                        }
                        PolicyAction::Kill => {
                            self.emit(pid, &regs, Disposition::Unlisted, sink);
                            let _ = kill(pid, Signal::SIGKILL);
                            return;
                        }
                        PolicyAction::Allow | PolicyAction::Log => {
                            self.emit(pid, &regs, Disposition::Allowed, sink);
                        }
                    }
                }
            }
            libc::PTRACE_EVENT_FORK | libc::PTRACE_EVENT_VFORK | libc::PTRACE_EVENT_CLONE => {
                if let Ok(raw) = ptrace::getevent(pid) {
                    let child = Pid::from_raw(raw as i32);
                    if !self.tracees.contains_key(&child) {
                        self.expected.insert(child);
                        self.track(child);
                    }
                    sink.on_spawn(pid.as_raw(), child.as_raw());
                }
            }
            libc::PTRACE_EVENT_EXEC => sink.on_exec(pid.as_raw()),
            _ => {}
        }
        self.resume(pid, None);
    }

    /// Syscall-step mode: entry and exit stops alternate per tracee
    fn on_syscall_stop(&mut self, pid: Pid, sink: &mut dyn TraceSink) {
        let entering = {
            let state = self.tracees.entry(pid).or_default();
            state.in_syscall = !state.in_syscall;
            state.in_syscall
        };

        let Ok(mut regs) = ptrace::getregs(pid) else {
            self.resume(pid, None);
            return;
        };

        if !entering {
            let deny_pending = self
                .tracees
                .get_mut(&pid)
                .map(|state| std::mem::take(&mut state.deny_pending))
                .unwrap_or(false);
            if deny_pending {
                regs.rax = (-(libc::EPERM as i64)) as u64;
                let _ = ptrace::setregs(pid, regs);
            }
            self.resume(pid, None);
            return;
        }

        let number = regs.orig_rax as i64;
        let action = self
            .program
            .map(|p| p.action_for(number))
            .unwrap_or(PolicyAction::Log);

        match action {
            PolicyAction::Allow => {}
            PolicyAction::Log => self.emit(pid, &regs, Disposition::Allowed, sink),
            PolicyAction::Deny => {
                self.emit(pid, &regs, Disposition::Denied, sink);
                regs.orig_rax = u64::MAX;
                let _ = ptrace::setregs(pid, regs);
                if let Some(state) = self.tracees.get_mut(&pid) {
                    state.deny_pending = true;
                }
            }
            PolicyAction::Kill => {
                let listed = self.program.is_some_and(|p| p.is_listed(number));
                if listed {
                    self.emit(pid, &regs, Disposition::Killed, sink);
                    self.outcome.tracer_policy_kill = true;
                } else {
                    self.emit(pid, &regs, Disposition::Unlisted, sink);
                }
                let _ = kill(pid, Signal::SIGKILL);
                return;
            }
        }
        self.resume(pid, None);
    }

    fn emit(
        &mut self,
        pid: Pid,
        regs: &libc::user_regs_struct,
        disposition: Disposition,
        sink: &mut dyn TraceSink,
    ) {
        let number = regs.orig_rax as i64;
        let args = [regs.rdi, regs.rsi, regs.rdx, regs.r10, regs.r8, regs.r9];
        let info = syscalls::lookup_number(number);
        let name = info.map(|i| i.name).unwrap_or("unknown");
        let category = info.map(|i| i.category).unwrap_or(SyscallCategory::Other);

        let path = info
            .and_then(|i| i.path_arg)
            .and_then(|idx| read_c_string(pid, args[idx]));
        let endpoint = match name {
            "connect" | "bind" => read_sockaddr(pid, args[1], args[2]),
            "sendto" => read_sockaddr(pid, args[4], args[5]),
            _ => None,
        };

        let event = SyscallEvent {
            pid: pid.as_raw(),
            number,
            name,
            category,
            args,
            timestamp: self.started.elapsed(),
            path,
            endpoint,
            disposition,
        };
        self.outcome.events += 1;
        sink.on_syscall(&event);
    }

    fn resume(&self, pid: Pid, signal: Option<Signal>) {
        let result = match self.mechanism {
            MonitorMechanism::SeccompTrace => ptrace::cont(pid, signal),
            MonitorMechanism::SyscallStep => ptrace::syscall(pid, signal),
        };
        if let Err(e) = result {
            // ESRCH: the tracee died while stopped
            if e != Errno::ESRCH {
                log::debug!("failed to resume {}: {}", pid, e);
            }
        }
    }

    fn track(&mut self, pid: Pid) {
        self.tracees.entry(pid).or_default();
        if let Ok(mut live) = self.live.lock() {
            live.insert(pid.as_raw());
        }
    }

    fn forget(&mut self, pid: Pid) {
        self.tracees.remove(&pid);
        self.expected.remove(&pid);
        if let Ok(mut live) = self.live.lock() {
            live.remove(&pid.as_raw());
        }
    }

    fn kill_remaining(&mut self) {
        for pid in self.tracees.keys() {
            if kill(*pid, Signal::SIGKILL).is_ok() {
                self.outcome.stragglers_killed += 1;
            }
        }
    }
}

fn attach_error(e: Errno) -> SandboxError {
    SandboxError::MonitorAttach(format!("ptrace: {}", e))
}

fn skip_with_eperm(pid: Pid, regs: &mut libc::user_regs_struct) {
    regs.orig_rax = u64::MAX;
    regs.rax = (-(libc::EPERM as i64)) as u64;
    if let Err(e) = ptrace::setregs(pid, *regs) {
        log::debug!("failed to skip denied syscall in {}: {}", pid, e);
    }
}

/// Wait until `pid` is gone, tolerating it already being reaped
pub fn reap_blocking(pid: Pid) {
    loop {
        match waitpid(pid, Some(WaitPidFlag::__WALL)) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return,
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(_) => return,
        }
    }
}

fn read_bytes(pid: Pid, addr: u64, len: usize, stop_at_nul: bool) -> Option<Vec<u8>> {
    if addr == 0 || len == 0 {
        return None;
    }
    let mut out = Vec::with_capacity(len);
    let mut offset = 0usize;
    while out.len() < len {
        let at = addr.checked_add(offset as u64)?;
        let word = match ptrace::read(pid, at as usize as ptrace::AddressType) {
            Ok(word) => word,
            Err(_) if !out.is_empty() => break,
            Err(_) => return None,
        };
        for byte in word.to_ne_bytes() {
            if stop_at_nul && byte == 0 {
                return Some(out);
            }
            out.push(byte);
            if out.len() == len {
                break;
            }
        }
        offset += WORD;
    }
    Some(out)
}

fn read_c_string(pid: Pid, addr: u64) -> Option<String> {
    read_bytes(pid, addr, MAX_PATH_BYTES, true).map(|bytes| decode::c_string_lossy(&bytes))
}

fn read_sockaddr(pid: Pid, addr: u64, len: u64) -> Option<String> {
    let len = usize::try_from(len).ok()?.min(MAX_SOCKADDR_BYTES);
    read_bytes(pid, addr, len, false).and_then(|bytes| decode::decode_sockaddr(&bytes))
}
