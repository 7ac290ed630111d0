/// This test should FAIL to compile
/// Reaching exec without passing through the filter step

use sentinel_sandbox::exec::ChildSetup;

fn main() {
    let setup = ChildSetup::new(false).bind_lifecycle().expect("lifecycle");

    // This should fail: LifecycleBound has no finish method
    setup.finish();
}
