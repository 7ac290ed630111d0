use anyhow::Result;

fn main() -> Result<()> {
    sentinel_sandbox::cli::run()
}
