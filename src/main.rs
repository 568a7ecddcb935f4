//! melt - firewall rule compiler
//!
//! Compiles a JSON policy document into netfilter (`iptables-restore`) or pf
//! rule sets. The compiled rules go to stdout; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! melt compile policy.json                     # netfilter, both families
//! melt compile policy.json --backend pf        # pf.conf
//! melt compile policy.json --backend netfilter6 --policy pass
//! melt check policy.json                       # validate and summarize
//! melt targets policy.json                     # every backend, with file paths
//! ```

use clap::{Parser, Subcommand};
use melt::{Action, Backend, PolicyDocument, Rule, SystemResolver};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use strum::IntoEnumIterator;
use tracing::Level;

#[derive(Parser)]
#[command(name = "melt")]
#[command(about = "Compile firewall rules for netfilter and pf", long_about = None)]
#[command(version)]
struct Cli {
    /// Log compilation details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a policy document for one backend
    Compile {
        /// Path to the JSON policy document
        file: PathBuf,
        /// Target backend (pf, netfilter, netfilter4, netfilter6)
        #[arg(short, long, default_value = "netfilter")]
        backend: Backend,
        /// Override the default policy of the document (pass, block, log)
        #[arg(short, long)]
        policy: Option<Action>,
        /// Omit the "Generated by" header line
        #[arg(long)]
        no_header: bool,
    },
    /// Validate a policy document without compiling it
    Check {
        /// Path to the JSON policy document
        file: PathBuf,
    },
    /// Compile a policy document for every backend
    Targets {
        /// Path to the JSON policy document
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries the rule set
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        })
        .init();

    match handle_cli(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Some(error) = e.downcast_ref::<melt::Error>() {
                let translation = error.translate();
                eprintln!("{}", translation.user_message);
                for suggestion in translation.suggestions {
                    eprintln!("  - {suggestion}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn handle_cli(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Compile {
            file,
            backend,
            policy,
            no_header,
        } => {
            let (document, rules) = load_rules(&file)?;
            let header = (!no_header).then(header);
            println!(
                "{}",
                compile(&document, &rules, backend, policy, header.as_deref())
            );
        }
        Commands::Check { file } => {
            let (document, rules) = load_rules(&file)?;
            println!("{}", check_report(&file, &document, &rules));
        }
        Commands::Targets { file } => {
            let (document, rules) = load_rules(&file)?;
            println!("{}", targets(&document, &rules, &header()));
        }
    }
    Ok(())
}

fn load_rules(path: &Path) -> melt::Result<(PolicyDocument, Vec<Rule>)> {
    let document = PolicyDocument::load(path)?;
    let rules = document.into_rules(&SystemResolver)?;
    Ok((document, rules))
}

/// Compiled rule set, `policy` overriding the document policy.
fn compile(
    document: &PolicyDocument,
    rules: &[Rule],
    backend: Backend,
    policy: Option<Action>,
    header: Option<&str>,
) -> String {
    let policy = policy.unwrap_or(document.policy);
    let output = backend.formatter().emit_ruleset(rules, policy);
    match header {
        Some(header) => format!("{header}\n{output}"),
        None => output,
    }
}

fn check_report(file: &Path, document: &PolicyDocument, rules: &[Rule]) -> String {
    let count = |predicate: fn(&Rule) -> bool| rules.iter().filter(|&r| predicate(r)).count();
    [
        format!("✓ {} is valid", file.display()),
        format!("Policy: {}", document.policy),
        format!("Rules: {} ({} in document)", rules.len(), document.rules.len()),
        format!("  Filter:   {}", count(Rule::is_filter)),
        format!("  NAT:      {}", count(Rule::is_nat)),
        format!("  Redirect: {}", count(Rule::is_redirect)),
        format!("  IPv4:     {}", count(Rule::ipv4_compatible)),
        format!("  IPv6:     {}", count(Rule::ipv6_compatible)),
    ]
    .join("\n")
}

/// Every backend's rule set under its packaging path.
fn targets(document: &PolicyDocument, rules: &[Rule], header: &str) -> String {
    Backend::iter()
        .map(|backend| {
            let formatter = backend.formatter();
            format!(
                "==> {} <==\n{header}\n{}\n",
                formatter.filename_fragment().join("/"),
                formatter.emit_ruleset(rules, document.policy)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn header() -> String {
    format!(
        "# Generated by melt v{} on {}",
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%c")
    )
}
