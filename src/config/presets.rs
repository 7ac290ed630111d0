/// Default syscall policy sets
///
/// Names are resolved against the syscall table for the build architecture;
/// names that do not exist there (legacy x86_64 calls on aarch64) are skipped
/// when the filter is compiled.

/// Process startup, libc and shell needs that carry no behavioral signal
pub const DEFAULT_ALLOW: &[&str] = &[
    "read",
    "write",
    "pread64",
    "pwrite64",
    "readv",
    "writev",
    "close",
    "close_range",
    "fstat",
    "newfstatat",
    "statx",
    "lseek",
    "fstatfs",
    "statfs",
    "getdents64",
    "readlinkat",
    "faccessat",
    "faccessat2",
    "fcntl",
    "flock",
    "fsync",
    "fdatasync",
    "ioctl",
    "dup",
    "dup3",
    "pipe2",
    "brk",
    "munmap",
    "madvise",
    "msync",
    "rt_sigaction",
    "rt_sigprocmask",
    "rt_sigreturn",
    "rt_sigpending",
    "rt_sigsuspend",
    "rt_sigtimedwait",
    "sigaltstack",
    "sched_yield",
    "sched_getaffinity",
    "nanosleep",
    "clock_nanosleep",
    "clock_gettime",
    "clock_getres",
    "gettimeofday",
    "getitimer",
    "setitimer",
    "getpid",
    "getppid",
    "gettid",
    "getpgid",
    "getsid",
    "getuid",
    "geteuid",
    "getgid",
    "getegid",
    "getgroups",
    "getresuid",
    "getresgid",
    "getcwd",
    "chdir",
    "fchdir",
    "umask",
    "uname",
    "sysinfo",
    "times",
    "getrlimit",
    "prlimit64",
    "getrusage",
    "getpriority",
    "getrandom",
    "futex",
    "set_tid_address",
    "set_robust_list",
    "get_robust_list",
    "rseq",
    "membarrier",
    "prctl",
    "capget",
    "ppoll",
    "pselect6",
    "epoll_create1",
    "epoll_ctl",
    "epoll_pwait",
    "eventfd2",
    "wait4",
    "waitid",
    "kill",
    "tkill",
    "tgkill",
    "exit",
    "exit_group",
    "restart_syscall",
    "execve",
    "execveat",
    "sendfile",
    "copy_file_range",
    "utimensat",
    "fadvise64",
    "shutdown",
    "getsockname",
    "getpeername",
    "getsockopt",
    "recvfrom",
    // x86_64 legacy entry points
    "arch_prctl",
    "access",
    "stat",
    "lstat",
    "poll",
    "select",
    "pipe",
    "dup2",
    "readlink",
    "getdents",
    "getpgrp",
    "time",
    "alarm",
    "pause",
    "epoll_wait",
    "epoll_create",
];

/// Behaviorally interesting calls reported to the syscall monitor
pub const DEFAULT_LOG: &[&str] = &[
    "openat",
    "truncate",
    "ftruncate",
    "unlinkat",
    "renameat",
    "renameat2",
    "mkdirat",
    "fchmod",
    "fchmodat",
    "linkat",
    "symlinkat",
    "socket",
    "socketpair",
    "connect",
    "bind",
    "listen",
    "accept",
    "accept4",
    "sendto",
    "sendmsg",
    "sendmmsg",
    "recvmsg",
    "setsockopt",
    "clone",
    "clone3",
    "ptrace",
    "process_vm_readv",
    "process_vm_writev",
    "mmap",
    "mprotect",
    "mremap",
    "memfd_create",
    "seccomp",
    // x86_64 legacy entry points
    "open",
    "creat",
    "unlink",
    "rename",
    "mkdir",
    "rmdir",
    "chmod",
    "link",
    "symlink",
    "fork",
    "vfork",
];

/// Privilege changes and namespace escapes answered with EPERM
pub const DEFAULT_DENY: &[&str] = &[
    "setuid",
    "setgid",
    "setreuid",
    "setregid",
    "setresuid",
    "setresgid",
    "setfsuid",
    "setfsgid",
    "setgroups",
    "capset",
    "mount",
    "umount2",
    "unshare",
    "setns",
    "chroot",
    "pivot_root",
    "setsid",
    "setpgid",
    "personality",
    "acct",
    "sethostname",
    "setdomainname",
    "settimeofday",
    "swapon",
    "swapoff",
];

/// Kernel-facing calls that end the sandbox run outright
pub const DEFAULT_KILL: &[&str] = &[
    "reboot",
    "kexec_load",
    "kexec_file_load",
    "init_module",
    "finit_module",
    "delete_module",
    "syslog",
    "quotactl",
    "bpf",
    "perf_event_open",
    "open_by_handle_at",
    // x86_64 only
    "ioperm",
    "iopl",
];

pub fn names(set: &[&str]) -> Vec<String> {
    set.iter().map(|s| s.to_string()).collect()
}
