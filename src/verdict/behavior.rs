/// Behavioral metrics
/// Folds the syscall stream of one Tier2 run into per-category counters and
/// a threat score in [0.0, 1.0].
use crate::config::types::ScoringPolicy;
use crate::kernel::syscalls::SyscallCategory;
use crate::monitor::decode::{basename, is_network_endpoint};
use crate::monitor::{Disposition, SyscallEvent, TraceSink};
use crate::verdict::abuse::{self, DetectedPattern};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;

const PAGE_SIZE: u64 = 4096;
/// Endpoints kept verbatim on the metrics; the count is exact
const MAX_RECORDED_ENDPOINTS: usize = 16;

const PTRACE_POKETEXT: u64 = 4;
const PTRACE_POKEDATA: u64 = 5;
const PTRACE_ATTACH: u64 = 16;
const PTRACE_SEIZE: u64 = 0x4206;

const TEMP_PREFIXES: &[&str] = &["/tmp/", "/var/tmp/", "/dev/shm/"];
const SENSITIVE_PATHS: &[&str] = &["/etc/shadow", "/etc/passwd", "/etc/sudoers", "/root/", "/.ssh/", "/boot/"];
const KERNEL_INTERFACES: &[&str] = &["/proc/kallsyms", "/dev/mem", "/dev/kmem", "/proc/kcore", "/sys/kernel"];
const PERSISTENCE_MARKERS: &[&str] = &[
    "cron",
    "systemd",
    "autostart",
    ".bashrc",
    ".profile",
    "ld.so.preload",
    "rc.local",
    "init.d",
];
const INPUT_DEVICES: &str = "/dev/input/";

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileActivity {
    /// Read-only opens
    pub opens: u64,
    /// Write-mode opens and truncations
    pub writes: u64,
    pub deletes: u64,
    pub renames: u64,
    /// Files created or chmod'ed with an execute bit
    pub executable_drops: u64,
    pub hidden_files: u64,
    pub temp_writes: u64,
    pub sensitive_access: u64,
    pub kernel_interface_access: u64,
    pub persistence_attempts: u64,
    pub input_device_access: u64,
}

impl FileActivity {
    pub fn total(&self) -> u64 {
        self.opens + self.writes + self.deletes + self.renames
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessActivity {
    pub forks: u64,
    pub execs: u64,
    pub ptrace_attaches: u64,
    /// Longest parent-to-child chain below the root
    pub chain_depth: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryActivity {
    pub mmaps: u64,
    /// Pages mapped or re-protected writable and executable at once
    pub rwx_pages: u64,
    pub repeated_size_allocations: u64,
    pub memfd_creates: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkActivity {
    pub sockets: u64,
    pub outbound_connections: u64,
    pub unique_endpoints: u64,
    pub estimated_requests: u64,
    pub listeners: u64,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlatformFlags {
    pub privilege_escalation_attempts: u64,
    pub denied_syscalls: u64,
    /// Terminated by the syscall filter or the tracer for a kill-tier call
    pub policy_kill: bool,
    /// Kills for syscalls no rule names, under a kill default
    pub unlisted_kills: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BehavioralMetrics {
    pub file: FileActivity,
    pub process: ProcessActivity,
    pub memory: MemoryActivity,
    pub network: NetworkActivity,
    pub platform: PlatformFlags,
    pub code_injection_attempts: u64,
    pub process_injection_attempts: u64,
    pub ransomware_pattern_hits: u64,
    pub syscalls_observed: u64,
    pub threat_score: f32,
    pub timed_out: bool,
    pub execution_time_ms: u64,
    pub suspicious_behaviors: Vec<String>,
    pub patterns: Vec<DetectedPattern>,
}

impl BehavioralMetrics {
    pub fn file_operations(&self) -> u64 {
        self.file.total()
    }
}

/// Streaming fold from syscall events to `BehavioralMetrics`
pub struct BehaviorReducer {
    policy: ScoringPolicy,
    metrics: BehavioralMetrics,
    mutation_window: VecDeque<Duration>,
    allocation_sizes: HashMap<u64, u32>,
    depths: HashMap<i32, u32>,
    endpoints: BTreeSet<String>,
}

impl BehaviorReducer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self {
            policy,
            metrics: BehavioralMetrics::default(),
            mutation_window: VecDeque::new(),
            allocation_sizes: HashMap::new(),
            depths: HashMap::new(),
            endpoints: BTreeSet::new(),
        }
    }

    /// Snapshot of the counters folded so far
    pub fn metrics(&self) -> &BehavioralMetrics {
        &self.metrics
    }

    /// Close the run: record its outcome, detect patterns, score
    pub fn finish(mut self, elapsed: Duration, timed_out: bool, policy_kill: bool) -> BehavioralMetrics {
        let mut metrics = std::mem::take(&mut self.metrics);
        metrics.timed_out = timed_out;
        metrics.platform.policy_kill |= policy_kill;
        metrics.execution_time_ms = elapsed.as_millis() as u64;
        metrics.network.unique_endpoints = self.endpoints.len() as u64;
        metrics.network.endpoints = self.endpoints.iter().take(MAX_RECORDED_ENDPOINTS).cloned().collect();

        metrics.patterns = abuse::detect(&metrics, self.policy.ransomware_burst_threshold);
        metrics.suspicious_behaviors = describe(&metrics);
        metrics.threat_score = score(&metrics, &self.policy, elapsed);
        metrics
    }

    fn record_mutation(&mut self, at: Duration) {
        let window = Duration::from_millis(self.policy.ransomware_window_ms);
        while let Some(&front) = self.mutation_window.front() {
            if at.saturating_sub(front) > window {
                self.mutation_window.pop_front();
            } else {
                break;
            }
        }
        self.mutation_window.push_back(at);
        if self.mutation_window.len() > self.policy.ransomware_burst_threshold {
            self.metrics.ransomware_pattern_hits += 1;
        }
    }

    fn on_open(&mut self, event: &SyscallEvent, flags: u64, mode: Option<u64>) {
        let file = &mut self.metrics.file;
        let write_intent = flags & (libc::O_WRONLY | libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC) as u64 != 0;
        let creating = flags & libc::O_CREAT as u64 != 0;

        if let Some(path) = event.path.as_deref() {
            classify_path(file, path, write_intent);
        }
        if creating && mode.is_some_and(|m| m & 0o111 != 0) {
            file.executable_drops += 1;
        }
        if write_intent {
            file.writes += 1;
            self.record_mutation(event.timestamp);
        } else {
            file.opens += 1;
        }
    }

    fn fold_file(&mut self, event: &SyscallEvent) {
        let a = &event.args;
        match event.name {
            "open" => self.on_open(event, a[1], Some(a[2])),
            "openat" => self.on_open(event, a[2], Some(a[3])),
            "creat" => self.on_open(
                event,
                (libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC) as u64,
                Some(a[1]),
            ),
            "unlink" | "unlinkat" | "rmdir" => {
                self.metrics.file.deletes += 1;
                self.record_mutation(event.timestamp);
            }
            "rename" | "renameat" | "renameat2" => {
                self.metrics.file.renames += 1;
                self.record_mutation(event.timestamp);
            }
            "chmod" | "fchmod" if a[1] & 0o111 != 0 => self.metrics.file.executable_drops += 1,
            "fchmodat" if a[2] & 0o111 != 0 => self.metrics.file.executable_drops += 1,
            "memfd_create" => self.metrics.memory.memfd_creates += 1,
            "truncate" | "ftruncate" => {
                self.metrics.file.writes += 1;
                self.record_mutation(event.timestamp);
            }
            _ => {}
        }
    }

    fn fold_process(&mut self, event: &SyscallEvent) {
        let a = &event.args;
        match event.name {
            "clone" if a[0] & libc::CLONE_THREAD as u64 == 0 => self.metrics.process.forks += 1,
            // clone3 passes its flags behind a pointer
            "clone3" | "fork" | "vfork" => self.metrics.process.forks += 1,
            "ptrace" => match a[0] {
                PTRACE_ATTACH | PTRACE_SEIZE => {
                    self.metrics.process.ptrace_attaches += 1;
                    self.metrics.process_injection_attempts += 1;
                }
                PTRACE_POKETEXT | PTRACE_POKEDATA => self.metrics.process_injection_attempts += 1,
                _ => {}
            },
            "process_vm_writev" => self.metrics.process_injection_attempts += 1,
            _ => {}
        }
    }

    fn fold_memory(&mut self, event: &SyscallEvent) {
        let a = &event.args;
        let wx = (libc::PROT_WRITE | libc::PROT_EXEC) as u64;
        let memory = &mut self.metrics.memory;
        match event.name {
            "mmap" => {
                memory.mmaps += 1;
                if a[2] & wx == wx {
                    memory.rwx_pages += pages(a[1]);
                }
                if a[3] & libc::MAP_ANONYMOUS as u64 != 0 {
                    let seen = self.allocation_sizes.entry(a[1]).or_insert(0);
                    *seen += 1;
                    if *seen > 1 {
                        memory.repeated_size_allocations += 1;
                    }
                }
            }
            "mprotect" if a[2] & wx == wx => {
                memory.rwx_pages += pages(a[1]);
                self.metrics.code_injection_attempts += 1;
            }
            _ => {}
        }
    }

    fn fold_network(&mut self, event: &SyscallEvent) {
        let remote = event.endpoint.as_deref().filter(|e| is_network_endpoint(e));
        let network = &mut self.metrics.network;
        match event.name {
            "socket" => network.sockets += 1,
            "connect" => {
                if let Some(endpoint) = remote {
                    network.outbound_connections += 1;
                    self.endpoints.insert(endpoint.to_string());
                }
            }
            "bind" => {
                if remote.is_some() {
                    network.listeners += 1;
                }
            }
            "listen" | "accept" | "accept4" => network.listeners += 1,
            "sendto" | "sendmsg" | "sendmmsg" => {
                network.estimated_requests += 1;
                if let Some(endpoint) = remote {
                    self.endpoints.insert(endpoint.to_string());
                }
            }
            _ => {}
        }
    }
}

impl TraceSink for BehaviorReducer {
    fn on_syscall(&mut self, event: &SyscallEvent) {
        self.metrics.syscalls_observed += 1;

        match event.disposition {
            Disposition::Allowed => {}
            Disposition::Denied => self.metrics.platform.denied_syscalls += 1,
            Disposition::Killed => self.metrics.platform.policy_kill = true,
            Disposition::Unlisted => self.metrics.platform.unlisted_kills += 1,
        }

        match event.category {
            SyscallCategory::File => self.fold_file(event),
            SyscallCategory::Process => self.fold_process(event),
            SyscallCategory::Memory => self.fold_memory(event),
            SyscallCategory::Network => self.fold_network(event),
            SyscallCategory::Privilege => self.metrics.platform.privilege_escalation_attempts += 1,
            SyscallCategory::Kernel | SyscallCategory::Other => {}
        }
    }

    fn on_spawn(&mut self, parent: i32, child: i32) {
        let depth = self.depths.get(&parent).copied().unwrap_or(0) + 1;
        self.depths.insert(child, depth);
        let process = &mut self.metrics.process;
        process.chain_depth = process.chain_depth.max(depth);
    }

    fn on_exec(&mut self, _pid: i32) {
        self.metrics.process.execs += 1;
    }
}

fn pages(len: u64) -> u64 {
    len.div_ceil(PAGE_SIZE).max(1)
}

fn classify_path(file: &mut FileActivity, path: &str, write_intent: bool) {
    let name = basename(path);
    if write_intent && name.starts_with('.') && name != "." && name != ".." {
        file.hidden_files += 1;
    }
    if write_intent && TEMP_PREFIXES.iter().any(|p| path.starts_with(p)) {
        file.temp_writes += 1;
    }
    if SENSITIVE_PATHS.iter().any(|p| path.starts_with(p) || path.contains(p)) {
        file.sensitive_access += 1;
    }
    if KERNEL_INTERFACES.iter().any(|p| path.starts_with(p)) {
        file.kernel_interface_access += 1;
    }
    if write_intent && PERSISTENCE_MARKERS.iter().any(|m| path.contains(m)) {
        file.persistence_attempts += 1;
    }
    if path.starts_with(INPUT_DEVICES) {
        file.input_device_access += 1;
    }
}

/// Events per second; runs shorter than a second count as one second
fn rate(count: u64, elapsed: Duration) -> f64 {
    count as f64 / elapsed.as_secs_f64().max(1.0)
}

fn file_score(f: &FileActivity, elapsed: Duration) -> f32 {
    let ops = rate(f.total(), elapsed);
    let mut score: f32 = if ops > 200.0 {
        0.9
    } else if ops > 50.0 {
        0.6
    } else if ops > 20.0 {
        0.3
    } else if f.total() > 0 {
        0.1
    } else {
        0.0
    };
    if f.persistence_attempts > 0 || f.sensitive_access > 0 {
        score = score.max(0.6);
    }
    if f.hidden_files > 0 {
        score += 0.1;
    }
    if f.executable_drops > 0 {
        score += 0.2;
    }
    score.min(1.0)
}

fn process_score(p: &ProcessActivity, injections: u64, elapsed: Duration) -> f32 {
    let spawns = rate(p.forks + p.execs, elapsed);
    let mut score: f32 = if spawns > 50.0 {
        0.9
    } else if spawns > 10.0 {
        0.6
    } else if spawns > 3.0 {
        0.3
    } else {
        0.0
    };
    if p.ptrace_attaches > 0 || injections > 0 {
        score = score.max(0.9);
    }
    if p.chain_depth > 3 {
        score += 0.2;
    }
    score.min(1.0)
}

fn memory_score(m: &MemoryActivity, code_injections: u64) -> f32 {
    let mut score: f32 = if m.mmaps > 1000 { 0.3 } else { 0.0 };
    if m.rwx_pages > 0 {
        score = score.max(0.7);
    }
    if code_injections > 0 {
        score = score.max(0.8);
    }
    if m.repeated_size_allocations > 10 {
        score += 0.2;
    }
    if m.memfd_creates > 0 {
        score += 0.2;
    }
    score.min(1.0)
}

fn network_score(n: &NetworkActivity) -> f32 {
    let mut score: f32 = if n.unique_endpoints > 5 {
        0.8
    } else if n.outbound_connections > 0 {
        0.4
    } else if n.sockets > 0 {
        0.1
    } else {
        0.0
    };
    if n.listeners > 0 {
        score += 0.3;
    }
    if n.estimated_requests > 100 {
        score += 0.2;
    }
    score.min(1.0)
}

fn platform_score(p: &PlatformFlags, timed_out: bool) -> f32 {
    let mut score: f32 = 0.0;
    if p.policy_kill {
        score = score.max(0.8);
    }
    if p.privilege_escalation_attempts > 0 {
        score = score.max(0.5);
    }
    if p.unlisted_kills > 0 {
        score = score.max(0.4);
    }
    if p.denied_syscalls > 0 {
        score = score.max(0.3);
    }
    if timed_out {
        score += 0.3;
    }
    score.min(1.0)
}

/// Weighted category sum, raised to the floor of any detected pattern
pub fn score(metrics: &BehavioralMetrics, policy: &ScoringPolicy, elapsed: Duration) -> f32 {
    let w = &policy.weights;
    let total = w.total();
    let weighted = if total > 0.0 {
        (w.file * file_score(&metrics.file, elapsed)
            + w.process * process_score(&metrics.process, metrics.process_injection_attempts, elapsed)
            + w.memory * memory_score(&metrics.memory, metrics.code_injection_attempts)
            + w.network * network_score(&metrics.network)
            + w.platform * platform_score(&metrics.platform, metrics.timed_out))
            / total
    } else {
        0.0
    };
    let floor = abuse::pattern_floor(&metrics.patterns, &policy.pattern_floors);
    weighted.max(floor).clamp(0.0, 1.0)
}

fn describe(m: &BehavioralMetrics) -> Vec<String> {
    let mut out = Vec::new();
    if m.ransomware_pattern_hits > 0 {
        out.push(format!("Rapid file mutation ({} burst hits)", m.ransomware_pattern_hits));
    }
    if m.file.executable_drops > 0 {
        out.push(format!("Created {} executable files", m.file.executable_drops));
    }
    if m.file.hidden_files > 0 {
        out.push(format!("Created {} hidden files", m.file.hidden_files));
    }
    if m.file.sensitive_access > 0 {
        out.push(format!("Touched {} sensitive paths", m.file.sensitive_access));
    }
    if m.file.persistence_attempts > 0 {
        out.push(format!("Wrote {} persistence locations", m.file.persistence_attempts));
    }
    if m.code_injection_attempts > 0 {
        out.push(format!("Made memory writable and executable {} times", m.code_injection_attempts));
    }
    if m.process_injection_attempts > 0 {
        out.push(format!("Attempted {} cross-process injections", m.process_injection_attempts));
    }
    if m.network.outbound_connections > 0 {
        out.push(format!(
            "Opened {} outbound connections to {} endpoints",
            m.network.outbound_connections, m.network.unique_endpoints
        ));
    }
    if m.platform.privilege_escalation_attempts > 0 {
        out.push(format!(
            "Attempted {} privilege changes",
            m.platform.privilege_escalation_attempts
        ));
    }
    if m.platform.policy_kill {
        out.push("Killed by the syscall policy".to_string());
    }
    if m.platform.unlisted_kills > 0 {
        out.push("Killed for a syscall outside the policy".to_string());
    }
    if m.timed_out {
        out.push("Still running at the deadline".to_string());
    }
    out.extend(m.patterns.iter().map(|p| format!("Pattern {}: {}", p.pattern, p.description)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::syscalls;

    fn event(name: &str, args: [u64; 6], path: Option<&str>, at_ms: u64) -> SyscallEvent {
        let info = syscalls::lookup_name(name).unwrap();
        SyscallEvent {
            pid: 100,
            number: info.number as i64,
            name: info.name,
            category: info.category,
            args,
            timestamp: Duration::from_millis(at_ms),
            path: path.map(str::to_string),
            endpoint: None,
            disposition: Disposition::Allowed,
        }
    }

    fn openat_write(path: &str, at_ms: u64) -> SyscallEvent {
        let flags = (libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC) as u64;
        event("openat", [libc::AT_FDCWD as u64, 0, flags, 0o644, 0, 0], Some(path), at_ms)
    }

    #[test]
    fn test_mass_file_writes_score_high() {
        let mut reducer = BehaviorReducer::new(ScoringPolicy::default());
        for i in 0..200u64 {
            reducer.on_syscall(&openat_write(&format!("out/file{}", i), i * 2));
        }
        let metrics = reducer.finish(Duration::from_millis(500), false, false);
        assert_eq!(metrics.file.writes, 200);
        assert_eq!(metrics.file.opens, 0);
        assert_eq!(metrics.file_operations(), 200);
        assert!(metrics.ransomware_pattern_hits > 0);
        assert!(metrics.threat_score > 0.6, "score {}", metrics.threat_score);
    }

    #[test]
    fn test_read_only_opens_stay_quiet() {
        let mut reducer = BehaviorReducer::new(ScoringPolicy::default());
        let read = event("openat", [0, 0, libc::O_RDONLY as u64, 0, 0, 0], Some("/usr/lib/libc.so.6"), 1);
        for _ in 0..5 {
            reducer.on_syscall(&read);
        }
        let metrics = reducer.finish(Duration::from_millis(20), false, false);
        assert_eq!(metrics.file.opens, 5);
        assert_eq!(metrics.file.writes, 0);
        assert!(metrics.patterns.is_empty());
        assert!(metrics.threat_score < 0.3, "score {}", metrics.threat_score);
    }

    #[test]
    fn test_wx_mprotect_counts_code_injection() {
        let mut reducer = BehaviorReducer::new(ScoringPolicy::default());
        let prot = (libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC) as u64;
        reducer.on_syscall(&event("mprotect", [0x1000, 8192, prot, 0, 0, 0], None, 1));
        let metrics = reducer.finish(Duration::from_millis(5), false, false);
        assert_eq!(metrics.code_injection_attempts, 1);
        assert_eq!(metrics.memory.rwx_pages, 2);
    }

    #[test]
    fn test_ptrace_attach_counts_injection() {
        let mut reducer = BehaviorReducer::new(ScoringPolicy::default());
        reducer.on_syscall(&event("ptrace", [PTRACE_ATTACH, 1, 0, 0, 0, 0], None, 1));
        reducer.on_syscall(&event("ptrace", [PTRACE_POKEDATA, 1, 0, 0, 0, 0], None, 2));
        let metrics = reducer.finish(Duration::from_millis(5), false, false);
        assert_eq!(metrics.process.ptrace_attaches, 1);
        assert_eq!(metrics.process_injection_attempts, 2);
        let floor = crate::config::types::PatternFloors::default().process_injector;
        assert!(metrics.threat_score >= floor);
    }

    #[test]
    fn test_threads_are_not_forks() {
        let mut reducer = BehaviorReducer::new(ScoringPolicy::default());
        reducer.on_syscall(&event("clone", [libc::CLONE_THREAD as u64 | libc::CLONE_VM as u64, 0, 0, 0, 0, 0], None, 1));
        reducer.on_syscall(&event("clone", [libc::SIGCHLD as u64, 0, 0, 0, 0, 0], None, 2));
        reducer.on_spawn(100, 101);
        reducer.on_spawn(101, 102);
        let metrics = reducer.finish(Duration::from_millis(5), false, false);
        assert_eq!(metrics.process.forks, 1);
        assert_eq!(metrics.process.chain_depth, 2);
    }

    #[test]
    fn test_unique_endpoints_counted_once() {
        let mut reducer = BehaviorReducer::new(ScoringPolicy::default());
        for _ in 0..3 {
            let mut connect = event("connect", [3, 0, 16, 0, 0, 0], None, 1);
            connect.endpoint = Some("inet:10.0.0.1:443".to_string());
            reducer.on_syscall(&connect);
        }
        let mut local = event("connect", [3, 0, 16, 0, 0, 0], None, 1);
        local.endpoint = Some("unix:/run/nscd/socket".to_string());
        reducer.on_syscall(&local);

        let metrics = reducer.finish(Duration::from_millis(5), false, false);
        assert_eq!(metrics.network.outbound_connections, 3);
        assert_eq!(metrics.network.unique_endpoints, 1);
        assert_eq!(metrics.network.endpoints, vec!["inet:10.0.0.1:443".to_string()]);
    }

    #[test]
    fn test_path_classification() {
        let mut file = FileActivity::default();
        classify_path(&mut file, "/home/u/.config/autostart/.x.desktop", true);
        classify_path(&mut file, "/etc/shadow", false);
        classify_path(&mut file, "/dev/input/event0", false);
        classify_path(&mut file, "/proc/kallsyms", false);
        assert_eq!(file.hidden_files, 1);
        assert_eq!(file.persistence_attempts, 1);
        assert_eq!(file.sensitive_access, 1);
        assert_eq!(file.input_device_access, 1);
        assert_eq!(file.kernel_interface_access, 1);
    }

    #[test]
    fn test_unlisted_syscall_kill_is_not_malicious() {
        let policy = crate::config::types::VerdictPolicy::default();
        let mut reducer = BehaviorReducer::new(ScoringPolicy::default());
        let read = event("openat", [0, 0, libc::O_RDONLY as u64, 0, 0, 0], Some("/etc/ld.so.cache"), 1);
        reducer.on_syscall(&read);
        let mut xattr = event("lgetxattr", [0, 0, 0, 0, 0, 0], Some("/tmp/x"), 2);
        xattr.disposition = Disposition::Unlisted;
        reducer.on_syscall(&xattr);

        let metrics = reducer.finish(Duration::from_millis(10), false, false);
        assert!(!metrics.platform.policy_kill);
        assert_eq!(metrics.platform.unlisted_kills, 1);
        assert!(metrics.patterns.iter().all(|p| p.pattern != abuse::BehaviorPattern::Rootkit));
        assert!(metrics.threat_score >= policy.clean_below, "score {}", metrics.threat_score);
        assert!(metrics.threat_score < policy.malicious_at, "score {}", metrics.threat_score);
    }

    #[test]
    fn test_listed_syscall_kill_reads_as_malicious() {
        let mut reducer = BehaviorReducer::new(ScoringPolicy::default());
        let mut load = event("finit_module", [3, 0, 0, 0, 0, 0], None, 1);
        load.disposition = Disposition::Killed;
        reducer.on_syscall(&load);

        let metrics = reducer.finish(Duration::from_millis(10), false, false);
        assert!(metrics.platform.policy_kill);
        assert!(metrics.threat_score >= ScoringPolicy::default().pattern_floors.rootkit);
    }

    #[test]
    fn test_timeout_alone_is_not_malicious() {
        let reducer = BehaviorReducer::new(ScoringPolicy::default());
        let metrics = reducer.finish(Duration::from_secs(5), true, false);
        assert!(metrics.timed_out);
        assert!(metrics.threat_score < 0.3);
        assert!((0.0..=1.0).contains(&metrics.threat_score));
    }
}
