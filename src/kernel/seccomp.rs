// Seccomp-BPF filter compiler and installer
// Compiled in the parent from a SyscallPolicy; installed in the child after
// no_new_privs and before exec. Log and Deny both use SECCOMP_RET_TRACE so
// the monitor sees them; the trace data tells the two apart. Only the
// explicit kill set is killed by the kernel. A default kill for an unlisted
// syscall goes through the tracer so it can be told apart from those.

use crate::config::types::{PolicyAction, Result, SandboxError, SyscallPolicy};
use crate::kernel::syscalls;
use std::collections::BTreeMap;

pub const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
pub const SECCOMP_RET_KILL_THREAD: u32 = 0x0000_0000;
pub const SECCOMP_RET_TRACE: u32 = 0x7ff0_0000;
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

/// Trace data attached to logged syscalls
pub const TRACE_DATA_LOG: u16 = 0;
/// Trace data attached to denied syscalls
pub const TRACE_DATA_DENY: u16 = 1;
/// Trace data attached to unlisted syscalls under a kill default
pub const TRACE_DATA_UNLISTED: u16 = 2;

const SECCOMP_MODE_FILTER: libc::c_ulong = 2;
const BPF_MAXINSNS: usize = 4096;

// classic BPF opcodes
const BPF_LD: u16 = 0x00;
const BPF_W: u16 = 0x00;
const BPF_ABS: u16 = 0x20;
const BPF_JMP: u16 = 0x05;
const BPF_JEQ: u16 = 0x10;
const BPF_JGE: u16 = 0x30;
const BPF_K: u16 = 0x00;
const BPF_RET: u16 = 0x06;

// struct seccomp_data offsets
const DATA_NR_OFFSET: u32 = 0;
const DATA_ARCH_OFFSET: u32 = 4;

#[cfg(target_arch = "x86_64")]
const AUDIT_ARCH_CURRENT: u32 = 0xC000_003E;
#[cfg(target_arch = "aarch64")]
const AUDIT_ARCH_CURRENT: u32 = 0xC000_00B7;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
const AUDIT_ARCH_CURRENT: u32 = 0;

#[cfg(target_arch = "x86_64")]
const X32_SYSCALL_BIT: u32 = 0x4000_0000;

fn stmt(code: u16, k: u32) -> libc::sock_filter {
    libc::sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

fn jump(code: u16, k: u32, jt: u8, jf: u8) -> libc::sock_filter {
    libc::sock_filter { code, jt, jf, k }
}

/// A compiled seccomp program, ready to install in the child
#[derive(Clone)]
pub struct SeccompProgram {
    filters: Vec<libc::sock_filter>,
    actions: BTreeMap<libc::c_long, PolicyAction>,
    default_action: PolicyAction,
    kill_return: u32,
}

impl std::fmt::Debug for SeccompProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeccompProgram")
            .field("instructions", &self.filters.len())
            .field("rules", &self.actions.len())
            .field("default_action", &self.default_action)
            .finish()
    }
}

impl SeccompProgram {
    /// Compile a policy for the build architecture
    ///
    /// Names missing from the architecture's table are skipped. Fails when
    /// the program would exceed the kernel's instruction limit.
    pub fn compile(policy: &SyscallPolicy) -> Result<Self> {
        let kill_return = if supports_action("kill_process") {
            SECCOMP_RET_KILL_PROCESS
        } else {
            SECCOMP_RET_KILL_THREAD
        };
        Self::compile_with(policy, kill_return)
    }

    fn compile_with(policy: &SyscallPolicy, kill_return: u32) -> Result<Self> {
        let mut actions: BTreeMap<libc::c_long, PolicyAction> = BTreeMap::new();
        let sets = [
            (&policy.allow, PolicyAction::Allow),
            (&policy.log, PolicyAction::Log),
            (&policy.deny, PolicyAction::Deny),
            (&policy.kill, PolicyAction::Kill),
        ];

        for (names, action) in sets {
            for name in names.iter() {
                match syscalls::lookup_name(name) {
                    Some(info) => {
                        let slot = actions.entry(info.number).or_insert(action);
                        if action.severity() > slot.severity() {
                            *slot = action;
                        }
                    }
                    None => log::debug!("seccomp: skipping '{}' (not on this architecture)", name),
                }
            }
        }

        let mut filters = vec![
            stmt(BPF_LD | BPF_W | BPF_ABS, DATA_ARCH_OFFSET),
            jump(BPF_JMP | BPF_JEQ | BPF_K, AUDIT_ARCH_CURRENT, 1, 0),
            stmt(BPF_RET | BPF_K, kill_return),
            stmt(BPF_LD | BPF_W | BPF_ABS, DATA_NR_OFFSET),
        ];

        #[cfg(target_arch = "x86_64")]
        {
            filters.push(jump(BPF_JMP | BPF_JGE | BPF_K, X32_SYSCALL_BIT, 0, 1));
            filters.push(stmt(BPF_RET | BPF_K, kill_return));
        }

        let fallthrough = default_return(policy.default_action, kill_return);
        for (&number, &action) in &actions {
            let ret = return_value(action, kill_return);
            if ret == fallthrough {
                continue;
            }
            filters.push(jump(BPF_JMP | BPF_JEQ | BPF_K, number as u32, 0, 1));
            filters.push(stmt(BPF_RET | BPF_K, ret));
        }
        filters.push(stmt(BPF_RET | BPF_K, fallthrough));

        if filters.len() > BPF_MAXINSNS {
            return Err(SandboxError::Config(format!(
                "seccomp program has {} instructions, kernel limit is {}",
                filters.len(),
                BPF_MAXINSNS
            )));
        }

        Ok(Self {
            filters,
            actions,
            default_action: policy.default_action,
            kill_return,
        })
    }

    /// Action the filter takes for a raw syscall number
    pub fn action_for(&self, number: libc::c_long) -> PolicyAction {
        self.actions
            .get(&number)
            .copied()
            .unwrap_or(self.default_action)
    }

    /// True when a rule names the syscall, false when the default applies
    pub fn is_listed(&self, number: libc::c_long) -> bool {
        self.actions.contains_key(&number)
    }

    pub fn instruction_count(&self) -> usize {
        self.filters.len()
    }

    pub fn rules(&self) -> impl Iterator<Item = (libc::c_long, PolicyAction)> + '_ {
        self.actions.iter().map(|(n, a)| (*n, *a))
    }

    pub fn kills_whole_process(&self) -> bool {
        self.kill_return == SECCOMP_RET_KILL_PROCESS
    }

    /// Install the filter on the calling thread
    ///
    /// Runs between fork and exec: no allocation, no logging. The caller must
    /// have set no_new_privs first.
    pub fn install(&self) -> std::io::Result<()> {
        let prog = libc::sock_fprog {
            len: self.filters.len() as libc::c_ushort,
            filter: self.filters.as_ptr() as *mut libc::sock_filter,
        };
        // SAFETY: prog points at a live, correctly sized instruction buffer
        // for the duration of the call; the kernel copies it.
        let rc = unsafe {
            libc::prctl(
                libc::PR_SET_SECCOMP,
                SECCOMP_MODE_FILTER,
                &prog as *const libc::sock_fprog as libc::c_ulong,
                0,
                0,
            )
        };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

fn return_value(action: PolicyAction, kill_return: u32) -> u32 {
    match action {
        PolicyAction::Allow => SECCOMP_RET_ALLOW,
        PolicyAction::Log => SECCOMP_RET_TRACE | TRACE_DATA_LOG as u32,
        PolicyAction::Deny => SECCOMP_RET_TRACE | TRACE_DATA_DENY as u32,
        PolicyAction::Kill => kill_return,
    }
}

fn default_return(action: PolicyAction, kill_return: u32) -> u32 {
    match action {
        PolicyAction::Kill => SECCOMP_RET_TRACE | TRACE_DATA_UNLISTED as u32,
        other => return_value(other, kill_return),
    }
}

/// Map the data of a PTRACE_EVENT_SECCOMP stop back to the policy action
///
/// `Kill` here always means an unlisted syscall; listed kills never reach
/// the tracer.
pub fn decode_trace_data(data: libc::c_long) -> PolicyAction {
    match (data & 0xffff) as u16 {
        TRACE_DATA_DENY => PolicyAction::Deny,
        TRACE_DATA_UNLISTED => PolicyAction::Kill,
        _ => PolicyAction::Log,
    }
}

fn actions_avail() -> Option<String> {
    std::fs::read_to_string("/proc/sys/kernel/seccomp/actions_avail").ok()
}

fn supports_action(action: &str) -> bool {
    actions_avail()
        .map(|avail| avail.split_whitespace().any(|a| a == action))
        .unwrap_or(false)
}

/// Check if seccomp filtering is available on this system
pub fn is_seccomp_supported() -> bool {
    cfg!(target_os = "linux")
        && std::fs::read_to_string("/proc/self/status")
            .map(|status| status.lines().any(|l| l.starts_with("Seccomp:")))
            .unwrap_or(false)
}

/// True when the kernel can hand filtered syscalls to a ptrace tracer
pub fn supports_trace_action() -> bool {
    supports_action("trace")
}

/// Get seccomp support status for capability reporting
pub fn get_seccomp_status() -> String {
    match (is_seccomp_supported(), supports_trace_action()) {
        (true, true) => "available (trace)".to_string(),
        (true, false) => "available (no trace action)".to_string(),
        _ => "unavailable".to_string(),
    }
}
