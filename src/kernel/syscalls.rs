//! Syscall number, name, and category table for the build architecture.
//!
//! The table drives both the filter compiler (name -> number) and the monitor
//! (number -> name, category, which argument carries a path).

use serde::Serialize;

/// Behavioral category of a syscall
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyscallCategory {
    File,
    Process,
    Memory,
    Network,
    Privilege,
    Kernel,
    Other,
}

/// One syscall known to the sandbox
#[derive(Clone, Copy, Debug)]
pub struct SyscallInfo {
    pub name: &'static str,
    pub number: libc::c_long,
    pub category: SyscallCategory,
    /// Index of the argument holding a path, if any
    pub path_arg: Option<usize>,
}

const fn sys(name: &'static str, number: libc::c_long, category: SyscallCategory) -> SyscallInfo {
    SyscallInfo {
        name,
        number,
        category,
        path_arg: None,
    }
}

const fn path(
    name: &'static str,
    number: libc::c_long,
    category: SyscallCategory,
    arg: usize,
) -> SyscallInfo {
    SyscallInfo {
        name,
        number,
        category,
        path_arg: Some(arg),
    }
}

use SyscallCategory::*;

/// Calls shared by the generic and x86_64 tables
const COMMON: &[SyscallInfo] = &[
    sys("read", libc::SYS_read, Other),
    sys("write", libc::SYS_write, Other),
    sys("pread64", libc::SYS_pread64, Other),
    sys("pwrite64", libc::SYS_pwrite64, Other),
    sys("readv", libc::SYS_readv, Other),
    sys("writev", libc::SYS_writev, Other),
    sys("close", libc::SYS_close, Other),
    sys("close_range", libc::SYS_close_range, Other),
    sys("fstat", libc::SYS_fstat, Other),
    path("newfstatat", libc::SYS_newfstatat, Other, 1),
    path("statx", libc::SYS_statx, Other, 1),
    sys("lseek", libc::SYS_lseek, Other),
    sys("fstatfs", libc::SYS_fstatfs, Other),
    path("statfs", libc::SYS_statfs, Other, 0),
    sys("getdents64", libc::SYS_getdents64, Other),
    path("readlinkat", libc::SYS_readlinkat, Other, 1),
    path("faccessat", libc::SYS_faccessat, Other, 1),
    path("faccessat2", libc::SYS_faccessat2, Other, 1),
    sys("fcntl", libc::SYS_fcntl, Other),
    sys("flock", libc::SYS_flock, Other),
    sys("fsync", libc::SYS_fsync, Other),
    sys("fdatasync", libc::SYS_fdatasync, Other),
    sys("ioctl", libc::SYS_ioctl, Other),
    path("getxattr", libc::SYS_getxattr, Other, 0),
    path("lgetxattr", libc::SYS_lgetxattr, Other, 0),
    sys("fgetxattr", libc::SYS_fgetxattr, Other),
    sys("dup", libc::SYS_dup, Other),
    sys("dup3", libc::SYS_dup3, Other),
    sys("pipe2", libc::SYS_pipe2, Other),
    sys("brk", libc::SYS_brk, Memory),
    sys("munmap", libc::SYS_munmap, Memory),
    sys("madvise", libc::SYS_madvise, Memory),
    sys("msync", libc::SYS_msync, Memory),
    sys("rt_sigaction", libc::SYS_rt_sigaction, Other),
    sys("rt_sigprocmask", libc::SYS_rt_sigprocmask, Other),
    sys("rt_sigreturn", libc::SYS_rt_sigreturn, Other),
    sys("rt_sigpending", libc::SYS_rt_sigpending, Other),
    sys("rt_sigsuspend", libc::SYS_rt_sigsuspend, Other),
    sys("rt_sigtimedwait", libc::SYS_rt_sigtimedwait, Other),
    sys("sigaltstack", libc::SYS_sigaltstack, Other),
    sys("sched_yield", libc::SYS_sched_yield, Other),
    sys("sched_getaffinity", libc::SYS_sched_getaffinity, Other),
    sys("nanosleep", libc::SYS_nanosleep, Other),
    sys("clock_nanosleep", libc::SYS_clock_nanosleep, Other),
    sys("clock_gettime", libc::SYS_clock_gettime, Other),
    sys("clock_getres", libc::SYS_clock_getres, Other),
    sys("gettimeofday", libc::SYS_gettimeofday, Other),
    sys("getitimer", libc::SYS_getitimer, Other),
    sys("setitimer", libc::SYS_setitimer, Other),
    sys("getpid", libc::SYS_getpid, Other),
    sys("getppid", libc::SYS_getppid, Other),
    sys("gettid", libc::SYS_gettid, Other),
    sys("getpgid", libc::SYS_getpgid, Other),
    sys("getsid", libc::SYS_getsid, Other),
    sys("getuid", libc::SYS_getuid, Other),
    sys("geteuid", libc::SYS_geteuid, Other),
    sys("getgid", libc::SYS_getgid, Other),
    sys("getegid", libc::SYS_getegid, Other),
    sys("getgroups", libc::SYS_getgroups, Other),
    sys("getresuid", libc::SYS_getresuid, Other),
    sys("getresgid", libc::SYS_getresgid, Other),
    sys("getcwd", libc::SYS_getcwd, Other),
    path("chdir", libc::SYS_chdir, Other, 0),
    sys("fchdir", libc::SYS_fchdir, Other),
    sys("umask", libc::SYS_umask, Other),
    sys("uname", libc::SYS_uname, Other),
    sys("sysinfo", libc::SYS_sysinfo, Other),
    sys("times", libc::SYS_times, Other),
    sys("getrlimit", libc::SYS_getrlimit, Other),
    sys("prlimit64", libc::SYS_prlimit64, Other),
    sys("getrusage", libc::SYS_getrusage, Other),
    sys("getpriority", libc::SYS_getpriority, Other),
    sys("getrandom", libc::SYS_getrandom, Other),
    sys("futex", libc::SYS_futex, Other),
    sys("set_tid_address", libc::SYS_set_tid_address, Other),
    sys("set_robust_list", libc::SYS_set_robust_list, Other),
    sys("get_robust_list", libc::SYS_get_robust_list, Other),
    sys("rseq", libc::SYS_rseq, Other),
    sys("membarrier", libc::SYS_membarrier, Memory),
    sys("prctl", libc::SYS_prctl, Process),
    sys("capget", libc::SYS_capget, Other),
    sys("ppoll", libc::SYS_ppoll, Other),
    sys("pselect6", libc::SYS_pselect6, Other),
    sys("epoll_create1", libc::SYS_epoll_create1, Other),
    sys("epoll_ctl", libc::SYS_epoll_ctl, Other),
    sys("epoll_pwait", libc::SYS_epoll_pwait, Other),
    sys("eventfd2", libc::SYS_eventfd2, Other),
    sys("wait4", libc::SYS_wait4, Process),
    sys("waitid", libc::SYS_waitid, Process),
    sys("kill", libc::SYS_kill, Process),
    sys("tkill", libc::SYS_tkill, Process),
    sys("tgkill", libc::SYS_tgkill, Process),
    sys("exit", libc::SYS_exit, Process),
    sys("exit_group", libc::SYS_exit_group, Process),
    sys("restart_syscall", libc::SYS_restart_syscall, Other),
    path("execve", libc::SYS_execve, Process, 0),
    path("execveat", libc::SYS_execveat, Process, 1),
    sys("sendfile", libc::SYS_sendfile, File),
    sys("copy_file_range", libc::SYS_copy_file_range, File),
    path("utimensat", libc::SYS_utimensat, File, 1),
    sys("fadvise64", libc::SYS_fadvise64, Other),
    // file mutation
    path("openat", libc::SYS_openat, File, 1),
    path("truncate", libc::SYS_truncate, File, 0),
    sys("ftruncate", libc::SYS_ftruncate, File),
    path("unlinkat", libc::SYS_unlinkat, File, 1),
    path("renameat", libc::SYS_renameat, File, 3),
    path("renameat2", libc::SYS_renameat2, File, 3),
    path("mkdirat", libc::SYS_mkdirat, File, 1),
    sys("fchmod", libc::SYS_fchmod, File),
    path("fchmodat", libc::SYS_fchmodat, File, 1),
    path("linkat", libc::SYS_linkat, File, 3),
    path("symlinkat", libc::SYS_symlinkat, File, 2),
    sys("memfd_create", libc::SYS_memfd_create, File),
    // network
    sys("socket", libc::SYS_socket, Network),
    sys("socketpair", libc::SYS_socketpair, Network),
    sys("connect", libc::SYS_connect, Network),
    sys("bind", libc::SYS_bind, Network),
    sys("listen", libc::SYS_listen, Network),
    sys("accept", libc::SYS_accept, Network),
    sys("accept4", libc::SYS_accept4, Network),
    sys("sendto", libc::SYS_sendto, Network),
    sys("sendmsg", libc::SYS_sendmsg, Network),
    sys("sendmmsg", libc::SYS_sendmmsg, Network),
    sys("recvfrom", libc::SYS_recvfrom, Network),
    sys("recvmsg", libc::SYS_recvmsg, Network),
    sys("setsockopt", libc::SYS_setsockopt, Network),
    sys("getsockopt", libc::SYS_getsockopt, Network),
    sys("getsockname", libc::SYS_getsockname, Network),
    sys("getpeername", libc::SYS_getpeername, Network),
    sys("shutdown", libc::SYS_shutdown, Network),
    // process creation and cross-process access
    sys("clone", libc::SYS_clone, Process),
    sys("clone3", libc::SYS_clone3, Process),
    sys("ptrace", libc::SYS_ptrace, Process),
    sys("process_vm_readv", libc::SYS_process_vm_readv, Process),
    sys("process_vm_writev", libc::SYS_process_vm_writev, Process),
    sys("seccomp", libc::SYS_seccomp, Process),
    // memory
    sys("mmap", libc::SYS_mmap, Memory),
    sys("mprotect", libc::SYS_mprotect, Memory),
    sys("mremap", libc::SYS_mremap, Memory),
    // privilege and namespace changes
    sys("setuid", libc::SYS_setuid, Privilege),
    sys("setgid", libc::SYS_setgid, Privilege),
    sys("setreuid", libc::SYS_setreuid, Privilege),
    sys("setregid", libc::SYS_setregid, Privilege),
    sys("setresuid", libc::SYS_setresuid, Privilege),
    sys("setresgid", libc::SYS_setresgid, Privilege),
    sys("setfsuid", libc::SYS_setfsuid, Privilege),
    sys("setfsgid", libc::SYS_setfsgid, Privilege),
    sys("setgroups", libc::SYS_setgroups, Privilege),
    sys("capset", libc::SYS_capset, Privilege),
    path("mount", libc::SYS_mount, Privilege, 1),
    path("umount2", libc::SYS_umount2, Privilege, 0),
    sys("unshare", libc::SYS_unshare, Privilege),
    sys("setns", libc::SYS_setns, Privilege),
    path("chroot", libc::SYS_chroot, Privilege, 0),
    path("pivot_root", libc::SYS_pivot_root, Privilege, 0),
    sys("setsid", libc::SYS_setsid, Process),
    sys("setpgid", libc::SYS_setpgid, Process),
    sys("personality", libc::SYS_personality, Privilege),
    path("acct", libc::SYS_acct, Privilege, 0),
    sys("sethostname", libc::SYS_sethostname, Privilege),
    sys("setdomainname", libc::SYS_setdomainname, Privilege),
    sys("settimeofday", libc::SYS_settimeofday, Privilege),
    path("swapon", libc::SYS_swapon, Privilege, 0),
    path("swapoff", libc::SYS_swapoff, Privilege, 0),
    // kernel interfaces
    sys("reboot", libc::SYS_reboot, Kernel),
    sys("kexec_load", libc::SYS_kexec_load, Kernel),
    sys("kexec_file_load", libc::SYS_kexec_file_load, Kernel),
    sys("init_module", libc::SYS_init_module, Kernel),
    sys("finit_module", libc::SYS_finit_module, Kernel),
    sys("delete_module", libc::SYS_delete_module, Kernel),
    sys("syslog", libc::SYS_syslog, Kernel),
    sys("quotactl", libc::SYS_quotactl, Kernel),
    sys("bpf", libc::SYS_bpf, Kernel),
    sys("perf_event_open", libc::SYS_perf_event_open, Kernel),
    sys("open_by_handle_at", libc::SYS_open_by_handle_at, Kernel),
];

/// Legacy entry points that only exist on x86_64
#[cfg(target_arch = "x86_64")]
const X86_64_LEGACY: &[SyscallInfo] = &[
    path("open", libc::SYS_open, File, 0),
    path("creat", libc::SYS_creat, File, 0),
    path("unlink", libc::SYS_unlink, File, 0),
    path("rename", libc::SYS_rename, File, 1),
    path("mkdir", libc::SYS_mkdir, File, 0),
    path("rmdir", libc::SYS_rmdir, File, 0),
    path("chmod", libc::SYS_chmod, File, 0),
    path("link", libc::SYS_link, File, 1),
    path("symlink", libc::SYS_symlink, File, 1),
    sys("fork", libc::SYS_fork, Process),
    sys("vfork", libc::SYS_vfork, Process),
    sys("arch_prctl", libc::SYS_arch_prctl, Other),
    path("access", libc::SYS_access, Other, 0),
    path("stat", libc::SYS_stat, Other, 0),
    path("lstat", libc::SYS_lstat, Other, 0),
    sys("poll", libc::SYS_poll, Other),
    sys("select", libc::SYS_select, Other),
    sys("pipe", libc::SYS_pipe, Other),
    sys("dup2", libc::SYS_dup2, Other),
    path("readlink", libc::SYS_readlink, Other, 0),
    sys("getdents", libc::SYS_getdents, Other),
    sys("getpgrp", libc::SYS_getpgrp, Other),
    sys("time", libc::SYS_time, Other),
    sys("alarm", libc::SYS_alarm, Other),
    sys("pause", libc::SYS_pause, Other),
    sys("epoll_wait", libc::SYS_epoll_wait, Other),
    sys("epoll_create", libc::SYS_epoll_create, Other),
    sys("ioperm", libc::SYS_ioperm, Kernel),
    sys("iopl", libc::SYS_iopl, Kernel),
];

#[cfg(not(target_arch = "x86_64"))]
const X86_64_LEGACY: &[SyscallInfo] = &[];

/// Names present in the x86_64 legacy table, kept for config validation on other targets
const X86_64_ONLY: &[&str] = &[
    "open", "creat", "unlink", "rename", "mkdir", "rmdir", "chmod", "link", "symlink", "fork",
    "vfork", "arch_prctl", "access", "stat", "lstat", "poll", "select", "pipe", "dup2",
    "readlink", "getdents", "getpgrp", "time", "alarm", "pause", "epoll_wait", "epoll_create",
    "ioperm", "iopl",
];

fn all() -> impl Iterator<Item = &'static SyscallInfo> {
    COMMON.iter().chain(X86_64_LEGACY.iter())
}

/// Look up a syscall by name
pub fn lookup_name(name: &str) -> Option<&'static SyscallInfo> {
    all().find(|info| info.name == name)
}

/// Look up a syscall by number
pub fn lookup_number(number: libc::c_long) -> Option<&'static SyscallInfo> {
    all().find(|info| info.number == number)
}

/// Name for a raw syscall number, "unknown" when not in the table
pub fn name_of(number: libc::c_long) -> &'static str {
    lookup_number(number).map(|info| info.name).unwrap_or("unknown")
}

/// True for names that exist on x86_64 but not on the build target
pub fn is_known_elsewhere(name: &str) -> bool {
    X86_64_ONLY.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets;
    use std::collections::HashSet;

    #[test]
    fn test_numbers_are_unique() {
        let mut seen = HashSet::new();
        for info in all() {
            assert!(seen.insert(info.number), "duplicate number for {}", info.name);
        }
    }

    #[test]
    fn test_every_preset_name_resolves() {
        let sets = [
            presets::DEFAULT_ALLOW,
            presets::DEFAULT_LOG,
            presets::DEFAULT_DENY,
            presets::DEFAULT_KILL,
        ];
        for set in sets {
            for name in set {
                assert!(
                    lookup_name(name).is_some() || is_known_elsewhere(name),
                    "preset names unknown syscall {}",
                    name
                );
            }
        }
    }

    #[test]
    fn test_round_trip_by_number() {
        let info = lookup_name("openat").unwrap();
        assert_eq!(lookup_number(info.number).unwrap().name, "openat");
        assert_eq!(info.category, SyscallCategory::File);
        assert_eq!(info.path_arg, Some(1));
        assert_eq!(name_of(-1), "unknown");
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn test_legacy_table_present_on_x86_64() {
        assert!(lookup_name("open").is_some());
        assert!(lookup_name("fork").is_some());
        for name in X86_64_ONLY {
            assert!(lookup_name(name).is_some(), "{} missing from legacy table", name);
        }
    }
}
