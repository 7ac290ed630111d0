/// Child-side setup between fork and exec
///
/// The setup sequence is fixed:
/// 1. prctl(PR_SET_PDEATHSIG, SIGKILL)
/// 2. namespace unshare and mount hardening (best-effort unless strict)
/// 3. rlimits and umask
/// 4. PTRACE_TRACEME so the exec stops for the monitor
/// 5. prctl(PR_SET_NO_NEW_PRIVS, 1)
/// 6. seccomp filter
/// 7. exec (performed by the launcher once `ExecReady` is reached)
///
/// Everything here runs in the forked child of a possibly multi-threaded
/// parent: only async-signal-safe calls, no allocation, no logging.
use crate::config::types::{RlimitPolicy, SandboxConfig};
use crate::kernel::namespace::NamespacePlan;
use crate::kernel::seccomp::SeccompProgram;
use nix::sys::prctl;
use nix::sys::signal::Signal;
use std::io;
use std::marker::PhantomData;
use std::time::Duration;

/// Resource limits resolved for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlimitSet {
    pub cpu_seconds: u64,
    pub address_space_bytes: u64,
    pub open_files: u64,
    pub file_size_bytes: u64,
}

impl RlimitSet {
    /// CPU limit defaults to the wall budget rounded up, plus one second of slack
    pub fn resolve(policy: &RlimitPolicy, budget: Duration) -> Self {
        let derived = budget.as_secs() + u64::from(budget.subsec_nanos() > 0) + 1;
        Self {
            cpu_seconds: policy.cpu_seconds.unwrap_or(derived).max(1),
            address_space_bytes: policy.address_space_bytes,
            open_files: policy.open_files,
            file_size_bytes: policy.file_size_bytes,
        }
    }
}

/// Everything the child needs, prepared in the parent before fork
#[derive(Debug, Clone)]
pub struct ChildPlan {
    pub rlimits: RlimitSet,
    pub namespaces: NamespacePlan,
    pub seccomp: Option<SeccompProgram>,
    pub strict_mode: bool,
}

impl ChildPlan {
    pub fn new(
        config: &SandboxConfig,
        budget: Duration,
        namespaces: NamespacePlan,
        seccomp: Option<SeccompProgram>,
    ) -> Self {
        Self {
            rlimits: RlimitSet::resolve(&config.rlimits, budget),
            namespaces,
            seccomp,
            strict_mode: config.strict_mode,
        }
    }

    /// Run the full chain; used as the `pre_exec` hook
    pub fn run_in_child(&self) -> io::Result<()> {
        ChildSetup::<FreshChild>::new(self.strict_mode)
            .bind_lifecycle()?
            .enter_namespaces(&self.namespaces)?
            .apply_limits(&self.rlimits)?
            .request_trace()?
            .lock_privileges()?
            .install_filter(self.seccomp.as_ref())?
            .finish();
        Ok(())
    }
}

/// Type-state marker: fresh child, nothing applied
pub struct FreshChild;

/// Type-state marker: child dies with its supervisor
pub struct LifecycleBound;

/// Type-state marker: namespaces entered (or skipped)
pub struct Isolated;

/// Type-state marker: rlimits applied
pub struct Limited;

/// Type-state marker: exec will stop for the monitor
pub struct Traced;

/// Type-state marker: no_new_privs set
pub struct PrivsLocked;

/// Type-state marker: all gates passed, only exec remains
pub struct ExecReady;

/// Child setup progress
///
/// Each step consumes the previous state, so steps cannot be skipped,
/// reordered, or repeated.
pub struct ChildSetup<S> {
    strict_mode: bool,
    _state: PhantomData<S>,
}

impl<S> ChildSetup<S> {
    fn advance<N>(self) -> ChildSetup<N> {
        ChildSetup {
            strict_mode: self.strict_mode,
            _state: PhantomData,
        }
    }

    fn tolerate(&self, result: io::Result<()>) -> io::Result<()> {
        match result {
            Err(e) if self.strict_mode => Err(e),
            _ => Ok(()),
        }
    }
}

impl ChildSetup<FreshChild> {
    pub fn new(strict_mode: bool) -> Self {
        Self {
            strict_mode,
            _state: PhantomData,
        }
    }

    /// Kill the child if the supervising thread goes away
    pub fn bind_lifecycle(self) -> io::Result<ChildSetup<LifecycleBound>> {
        prctl::set_pdeathsig(Signal::SIGKILL).map_err(io::Error::from)?;
        Ok(self.advance())
    }
}

impl ChildSetup<LifecycleBound> {
    pub fn enter_namespaces(self, plan: &NamespacePlan) -> io::Result<ChildSetup<Isolated>> {
        self.tolerate(plan.apply().map_err(io::Error::from))?;
        Ok(self.advance())
    }
}

impl ChildSetup<Isolated> {
    pub fn apply_limits(self, limits: &RlimitSet) -> io::Result<ChildSetup<Limited>> {
        let table = [
            (libc::RLIMIT_CPU, limits.cpu_seconds, limits.cpu_seconds + 1),
            (libc::RLIMIT_AS, limits.address_space_bytes, limits.address_space_bytes),
            (libc::RLIMIT_NOFILE, limits.open_files, limits.open_files),
            (libc::RLIMIT_FSIZE, limits.file_size_bytes, limits.file_size_bytes),
            (libc::RLIMIT_CORE, 0, 0),
        ];
        for (resource, soft, hard) in table {
            self.tolerate(set_rlimit(resource, soft, hard))?;
        }
        // SAFETY: umask cannot fail
        unsafe { libc::umask(0o077) };
        Ok(self.advance())
    }
}

impl ChildSetup<Limited> {
    pub fn request_trace(self) -> io::Result<ChildSetup<Traced>> {
        nix::sys::ptrace::traceme().map_err(io::Error::from)?;
        Ok(self.advance())
    }
}

impl ChildSetup<Traced> {
    pub fn lock_privileges(self) -> io::Result<ChildSetup<PrivsLocked>> {
        prctl::set_no_new_privs().map_err(io::Error::from)?;
        Ok(self.advance())
    }
}

impl ChildSetup<PrivsLocked> {
    /// Install the filter; `None` only when the host has no seccomp
    pub fn install_filter(self, program: Option<&SeccompProgram>) -> io::Result<ChildSetup<ExecReady>> {
        if let Some(program) = program {
            program.install()?;
        }
        Ok(self.advance())
    }
}

impl ChildSetup<ExecReady> {
    /// Hand control back to the launcher, which performs the exec
    pub fn finish(self) {}
}

#[cfg(target_env = "gnu")]
type RlimitResource = libc::__rlimit_resource_t;
#[cfg(not(target_env = "gnu"))]
type RlimitResource = libc::c_int;

fn set_rlimit(resource: RlimitResource, soft: u64, hard: u64) -> io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };
    // SAFETY: limit is a valid rlimit for the duration of the call
    let rc = unsafe { libc::setrlimit(resource, &limit) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_limit_derived_from_budget() {
        let policy = RlimitPolicy::default();
        let limits = RlimitSet::resolve(&policy, Duration::from_millis(4500));
        assert_eq!(limits.cpu_seconds, 6);

        let limits = RlimitSet::resolve(&policy, Duration::from_secs(2));
        assert_eq!(limits.cpu_seconds, 3);
    }

    #[test]
    fn test_explicit_cpu_limit_wins() {
        let policy = RlimitPolicy {
            cpu_seconds: Some(1),
            ..RlimitPolicy::default()
        };
        let limits = RlimitSet::resolve(&policy, Duration::from_secs(30));
        assert_eq!(limits.cpu_seconds, 1);
        assert_eq!(limits.open_files, policy.open_files);
    }

    #[test]
    fn test_lifecycle_and_privilege_steps_take_effect() {
        // both attributes are per-thread; keep them off the test harness thread
        std::thread::spawn(|| {
            let bound = ChildSetup::<FreshChild>::new(true).bind_lifecycle().unwrap();
            assert_eq!(prctl::get_pdeathsig().unwrap(), Some(Signal::SIGKILL));
            drop(bound);

            let traced = ChildSetup::<Traced> {
                strict_mode: true,
                _state: PhantomData,
            };
            traced.lock_privileges().unwrap();
            assert!(prctl::get_no_new_privs().unwrap());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_permissive_mode_tolerates_step_failures() {
        let setup = ChildSetup::<FreshChild>::new(false);
        let err = io::Error::from_raw_os_error(libc::EPERM);
        assert!(setup.tolerate(Err(err)).is_ok());

        let strict = ChildSetup::<FreshChild>::new(true);
        let err = io::Error::from_raw_os_error(libc::EPERM);
        assert!(strict.tolerate(Err(err)).is_err());
    }
}
