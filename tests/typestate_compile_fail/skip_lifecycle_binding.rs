/// This test should FAIL to compile
/// Entering namespaces before the parent-death signal is bound

use sentinel_sandbox::exec::ChildSetup;
use sentinel_sandbox::kernel::namespace::NamespacePlan;

fn main() {
    let setup = ChildSetup::new(false);
    let plan = NamespacePlan::none();

    // This should fail: FreshChild has no enter_namespaces method
    let _ = setup.enter_namespaces(&plan);
}
