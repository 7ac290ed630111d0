/// This test should FAIL to compile
/// Installing the syscall filter before no_new_privs is set

use sentinel_sandbox::exec::{ChildSetup, RlimitSet};
use sentinel_sandbox::kernel::namespace::NamespacePlan;

fn main() {
    let limits = RlimitSet {
        cpu_seconds: 1,
        address_space_bytes: 1 << 28,
        open_files: 64,
        file_size_bytes: 1 << 20,
    };
    let setup = ChildSetup::new(false)
        .bind_lifecycle()
        .expect("lifecycle")
        .enter_namespaces(&NamespacePlan::none())
        .expect("namespaces")
        .apply_limits(&limits)
        .expect("limits")
        .request_trace()
        .expect("trace");

    // This should fail: Traced has no install_filter method
    let _ = setup.install_filter(None);
}
