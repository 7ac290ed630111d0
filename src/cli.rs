use crate::config::types::SandboxConfig;
use crate::core::Orchestrator;
use crate::kernel::syscalls;
use crate::verdict::{Classification, Verdict};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Fail instead of degrading when an isolation layer is missing
    #[arg(long, global = true)]
    strict: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a file and print the verdict
    Analyze {
        /// File to analyze
        file: PathBuf,
        /// Overall wall-clock budget in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print the full verdict as JSON
        #[arg(long)]
        json: bool,
        /// Static analysis only
        #[arg(long)]
        no_tier2: bool,
        /// Keep the host network visible to the candidate
        #[arg(long)]
        allow_network: bool,
        /// Tier1 analysis module (.wasm)
        #[arg(long)]
        module: Option<PathBuf>,
    },
    /// Report which isolation mechanisms this host supports
    Probe {
        /// Tier1 analysis module (.wasm)
        #[arg(long)]
        module: Option<PathBuf>,
    },
    /// Print the effective syscall policy
    Policy,
}

/// Process exit code for a classification
pub fn exit_code(classification: Classification) -> i32 {
    match classification {
        Classification::Clean => 0,
        Classification::Suspicious => 10,
        Classification::Malicious => 20,
    }
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = SandboxConfig {
        strict_mode: cli.strict,
        ..Default::default()
    };

    match cli.command {
        Commands::Analyze {
            file,
            timeout_ms,
            json,
            no_tier2,
            allow_network,
            module,
        } => {
            config.enable_tier2 = !no_tier2;
            config.network_isolation = !allow_network;
            config.tier1_module = module;
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.default_timeout());

            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let orchestrator = Orchestrator::new(config).context("starting orchestrator")?;
            let verdict = orchestrator
                .analyze(&bytes, &filename, timeout)
                .with_context(|| format!("analyzing {}", file.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                print_verdict(&filename, &verdict);
            }
            std::process::exit(exit_code(verdict.classification));
        }
        Commands::Probe { module } => {
            config.tier1_module = module;
            let orchestrator = Orchestrator::new(config).context("starting orchestrator")?;
            println!("{}", serde_json::to_string_pretty(orchestrator.capabilities())?);
        }
        Commands::Policy => {
            let policy = &config.syscall_policy;
            let unknown: Vec<&String> = policy
                .allow
                .iter()
                .chain(&policy.log)
                .chain(&policy.deny)
                .chain(&policy.kill)
                .filter(|name| syscalls::lookup_name(name).is_none())
                .collect();
            let json_result = serde_json::json!({
                "policy": policy,
                "not_on_this_arch": unknown,
            });
            println!("{}", serde_json::to_string_pretty(&json_result)?);
        }
    }

    Ok(())
}

fn print_verdict(filename: &str, verdict: &Verdict) {
    println!(
        "{}: {} (confidence {:.2}, score {:.2})",
        filename, verdict.classification, verdict.confidence, verdict.composite_score
    );
    println!("  {}", verdict.explanation);
    for signal in &verdict.signals {
        println!("  {:?} [{}] score {:.2}", signal.tier, signal.source, signal.score);
        for reason in &signal.reasons {
            println!("    - {}", reason);
        }
    }
    println!("  sha256 {}", verdict.fingerprint);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_flags_parse() {
        let cli = Cli::try_parse_from([
            "sentinel",
            "analyze",
            "/tmp/sample.bin",
            "--timeout-ms",
            "2500",
            "--no-tier2",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze {
                timeout_ms,
                no_tier2,
                json,
                allow_network,
                ..
            } => {
                assert_eq!(timeout_ms, Some(2500));
                assert!(no_tier2 && json && !allow_network);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_exit_codes_order_by_severity() {
        assert!(exit_code(Classification::Clean) < exit_code(Classification::Suspicious));
        assert!(exit_code(Classification::Suspicious) < exit_code(Classification::Malicious));
    }
}
