/// This test should FAIL to compile
/// Reusing a setup state after a transition consumed it

use sentinel_sandbox::exec::ChildSetup;

fn main() {
    let setup = ChildSetup::new(false);

    let _bound = setup.bind_lifecycle().expect("lifecycle");

    // This should fail: setup was moved by bind_lifecycle
    let _ = setup.bind_lifecycle();
}
