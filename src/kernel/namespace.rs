/// Namespace selection and application for the Tier2 child
/// Flags are decided in the parent; `apply` runs between fork and exec.
use nix::mount::{mount, MsFlags};
use nix::sched::{unshare, CloneFlags};
use std::ffi::CString;
use std::path::PathBuf;

/// Namespaces the child will unshare, plus the mount work to do inside them
#[derive(Debug, Clone)]
pub struct NamespacePlan {
    flags: CloneFlags,
    read_only: Vec<CString>,
}

impl NamespacePlan {
    /// Decide which namespaces to request
    ///
    /// Unprivileged callers need a user namespace to unshare anything else.
    pub fn select(network_isolation: bool, read_only_paths: &[PathBuf]) -> Self {
        if !Self::is_supported() {
            return Self::none();
        }

        let mut flags = CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWIPC | CloneFlags::CLONE_NEWUTS;
        if network_isolation {
            flags |= CloneFlags::CLONE_NEWNET;
        }
        // SAFETY: geteuid has no preconditions
        if unsafe { libc::geteuid() } != 0 {
            flags |= CloneFlags::CLONE_NEWUSER;
        }

        let read_only = read_only_paths
            .iter()
            .filter(|p| p.exists())
            .filter_map(|p| CString::new(p.as_os_str().as_encoded_bytes()).ok())
            .collect();

        Self { flags, read_only }
    }

    /// A plan that leaves the child in the caller's namespaces
    pub fn none() -> Self {
        Self {
            flags: CloneFlags::empty(),
            read_only: Vec::new(),
        }
    }

    /// Check if namespace isolation is supported on this system
    pub fn is_supported() -> bool {
        std::fs::read_dir("/proc/self/ns").is_ok()
    }

    pub fn flags(&self) -> CloneFlags {
        self.flags
    }

    pub fn isolates_network(&self) -> bool {
        self.flags.contains(CloneFlags::CLONE_NEWNET)
    }

    /// Namespaces as names for reporting
    pub fn describe(&self) -> Vec<&'static str> {
        let names = [
            (CloneFlags::CLONE_NEWUSER, "user"),
            (CloneFlags::CLONE_NEWNS, "mount"),
            (CloneFlags::CLONE_NEWNET, "network"),
            (CloneFlags::CLONE_NEWIPC, "ipc"),
            (CloneFlags::CLONE_NEWUTS, "uts"),
        ];
        names
            .iter()
            .filter(|(flag, _)| self.flags.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Unshare and harden mounts inside the new mount namespace
    ///
    /// Child-side: no allocation, no logging. Returns the first error; the
    /// caller decides whether it is fatal.
    pub fn apply(&self) -> nix::Result<()> {
        if self.flags.is_empty() {
            return Ok(());
        }
        unshare(self.flags)?;

        if self.flags.contains(CloneFlags::CLONE_NEWNS) {
            harden_mount_propagation()?;
            // keep going past a locked mount, report the first failure
            let mut first_err = None;
            for path in &self.read_only {
                if let Err(e) = remount_read_only(path) {
                    first_err.get_or_insert(e);
                }
            }
            if let Some(e) = first_err {
                return Err(e);
            }
        }
        Ok(())
    }
}

/// mount(NULL, "/", NULL, MS_REC | MS_PRIVATE, NULL) so nothing leaks to the host
pub fn harden_mount_propagation() -> nix::Result<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
}

fn remount_read_only(path: &CString) -> nix::Result<()> {
    let target = path.as_c_str();
    mount(
        Some(target),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )?;
    mount(
        None::<&str>,
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
        None::<&str>,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_plan_is_a_no_op() {
        let plan = NamespacePlan::none();
        assert!(plan.flags().is_empty());
        assert!(plan.describe().is_empty());
        assert!(plan.apply().is_ok());
    }

    #[test]
    fn test_network_flag_follows_config() {
        if !NamespacePlan::is_supported() {
            return;
        }
        let isolated = NamespacePlan::select(true, &[]);
        assert!(isolated.isolates_network());
        assert!(isolated.describe().contains(&"mount"));

        let open = NamespacePlan::select(false, &[]);
        assert!(!open.isolates_network());
    }

    #[test]
    fn test_missing_read_only_paths_are_dropped() {
        let plan = NamespacePlan::select(false, &[PathBuf::from("/definitely/not/here")]);
        assert!(plan.read_only.is_empty());
    }
}
