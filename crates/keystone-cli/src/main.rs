//! Keystone - declarative on-chain deployment
//!
//! Usage:
//!   keystone deploy              # Provision everything the spec declares
//!   keystone deploy --simulate   # Rehearse against an in-memory network
//!   keystone status              # Compare persisted records with the spec
//!   keystone validate            # Load and check the spec only
//!   keystone config              # Print the effective configuration

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keystone_core::prelude::*;
use keystone_core::orchestrator::WiringStatus;
use keystone_core::status::GroupSummary;

#[derive(Parser)]
#[command(name = "keystone")]
#[command(about = "Dependency-ordered on-chain deployment", long_about = None)]
struct Cli {
    /// Path to keystone.toml (defaults to the user config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Deployment root, overriding paths.root
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision tokens and instance groups, then activate and wire them
    Deploy(DeployArgs),

    /// Show persisted records against the declared counts
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Load and validate the deploy spec without touching the network
    Validate,

    /// Print the effective configuration (file plus --root) as TOML
    Config,
}

#[derive(Args)]
struct DeployArgs {
    /// Reuse persisted records for every group whose count matches
    #[arg(long)]
    reuse_all: bool,

    /// Provision every group fresh
    #[arg(long, conflicts_with = "reuse_all")]
    reuse_none: bool,

    /// Groups to provision fresh even when records match (comma-separated labels)
    #[arg(long, value_delimiter = ',', value_name = "LABEL")]
    fresh: Vec<String>,

    /// Only process these groups; others keep their persisted records
    #[arg(long, value_delimiter = ',', value_name = "LABEL")]
    only: Vec<String>,

    /// Run activation on reused groups as well
    #[arg(long)]
    force_activate: bool,

    /// Run against an in-memory network; records go to <state>-simulated
    #[arg(long)]
    simulate: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keystone=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => keystone_core::config::default_config_path()?,
    };
    let base = load_config(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    match cli.command {
        Commands::Deploy(args) => run_deploy(base, cli.root, args),
        Commands::Status { format } => run_status(base, cli.root, format),
        Commands::Validate => run_validate(base, cli.root),
        Commands::Config => {
            print!("{}", effective_config(base, cli.root)?);
            Ok(())
        }
    }
}

fn run_deploy(base: DeployConfig, root: Option<PathBuf>, args: DeployArgs) -> Result<()> {
    let config = base.with_overrides(ConfigOverrides {
        root,
        reuse_all: args.reuse_all,
        reuse_none: args.reuse_none,
        fresh: parse_labels(&args.fresh)?,
        force_activate: args.force_activate,
    })?;
    let spec = DeploySpec::load(&config.spec_path())?;

    let filter = if args.only.is_empty() {
        None
    } else {
        Some(parse_labels(&args.only)?.into_iter().collect::<BTreeSet<_>>())
    };

    let summary = if args.simulate {
        let config = config.simulated();
        let network = SimulatedNetwork::new();
        let deployer = config
            .deployer
            .address
            .unwrap_or_else(|| Address::derive(b"keystone-simulated-deployer"));
        tracing::info!(
            deployer = %deployer,
            state = %config.state_dir().display(),
            "Running against simulated network"
        );
        let mut orchestrator = Orchestrator::connect(&config, &spec, &network, &network, deployer)?;
        orchestrator.run(filter.as_ref())
    } else {
        let gateway_url = config
            .network
            .gateway
            .clone()
            .ok_or_else(|| anyhow::anyhow!("network.gateway is not configured (or use --simulate)"))?;
        let index_url = config.network.index.clone().unwrap_or_else(|| gateway_url.clone());
        let deployer = config
            .deployer
            .address
            .ok_or_else(|| anyhow::anyhow!("deployer.address is not configured"))?;

        let gateway = HttpGateway::new(gateway_url)?;
        let index = HttpTokenIndex::new(index_url)?;
        let mut orchestrator = Orchestrator::connect(&config, &spec, &gateway, &index, deployer)?;
        orchestrator.run(filter.as_ref())
    };

    match args.format {
        OutputFormat::Table => print_run_table(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    if !summary.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_status(base: DeployConfig, root: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let config = base.with_overrides(ConfigOverrides {
        root,
        ..Default::default()
    })?;
    let spec = DeploySpec::load(&config.spec_path())?;
    let store = RecordStore::new(config.state_dir());
    let statuses = store_status(&spec, &store);

    match format {
        OutputFormat::Table => print_status_table(&statuses),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "schema_version": 1,
                "state_dir": store.dir(),
                "groups": statuses,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn run_validate(base: DeployConfig, root: Option<PathBuf>) -> Result<()> {
    let config = base.with_overrides(ConfigOverrides {
        root,
        ..Default::default()
    })?;
    let spec = DeploySpec::load(&config.spec_path())?;

    println!("Spec: {}", config.spec_path().display());
    for kind in InstanceKind::CATALOG {
        let declared = spec.declared(kind);
        if declared > 0 {
            println!("  {:<16} {}", kind.label(), declared);
        }
    }
    println!(
        "OK: {} instances, {} tokens",
        spec.total_declared(),
        spec.tokens().count
    );
    Ok(())
}

fn effective_config(base: DeployConfig, root: Option<PathBuf>) -> Result<String> {
    let config = base.with_overrides(ConfigOverrides {
        root,
        ..Default::default()
    })?;
    keystone_core::config::parser::to_toml(&config)
}

fn parse_labels(labels: &[String]) -> Result<Vec<InstanceKind>> {
    labels
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.parse::<InstanceKind>())
        .collect()
}

// =============================================================================
// Output
// =============================================================================

fn print_run_table(summary: &RunSummary) {
    let tokens = &summary.tokens;
    println!(
        "Tokens: {}/{} available ({} minted)",
        tokens.available, tokens.declared, tokens.minted
    );
    if let Some(ref error) = tokens.error {
        println!("  error: {}", error);
    }
    if let Some(ref error) = tokens.save_error {
        println!("  not saved: {}", error);
    }
    println!();

    println!(
        "  {:<16} {:<9} {:<7} {:<8} {:<8} Error",
        "Group", "Declared", "Ready", "Orphans", "Origin"
    );
    println!("  {}", "-".repeat(70));
    for group in summary.groups.iter().filter(|g| g.declared > 0 || g.ready > 0) {
        println!(
            "  {:<16} {:<9} {:<7} {:<8} {:<8} {}",
            group.kind.label(),
            group.declared,
            group.ready,
            group.orphaned,
            origin_label(group),
            group_error(group)
        );
    }
    println!();

    if !summary.wiring.is_empty() {
        println!("Wiring:");
        for report in &summary.wiring {
            let detail = match &report.status {
                WiringStatus::Applied { calls } => format!("applied ({} calls)", calls),
                WiringStatus::Skipped { reason } => format!("skipped: {}", reason),
                WiringStatus::Failed { error } => format!("FAILED: {}", error),
            };
            println!("  {:<32} {}", report.step, detail);
        }
        if let Some(ref error) = summary.wiring_save_error {
            println!("  pending steps not saved: {}", error);
        }
        println!();
    }

    let sequence = &summary.sequence;
    println!(
        "Sequence: {} -> {} ({} accepted, {} rejected)",
        sequence.initial, sequence.current, sequence.accepted, sequence.rejected
    );

    if summary.is_complete() {
        println!("Summary: all groups ready");
    } else {
        let short: Vec<&str> = summary.short_groups().map(|g| g.kind.label()).collect();
        println!(
            "Summary: incomplete (short: {}; re-run to continue)",
            if short.is_empty() { "-".to_string() } else { short.join(", ") }
        );
    }
}

fn print_status_table(statuses: &[StoreStatus]) {
    println!(
        "  {:<16} {:<9} {:<10} {:<8} Status",
        "Group", "Declared", "Persisted", "Orphans"
    );
    println!("  {}", "-".repeat(60));
    for status in statuses {
        let state = match &status.error {
            Some(error) => format!("Unreadable: {}", truncate(error, 40)),
            None if status.is_current() => "OK".to_string(),
            None => "Will provision".to_string(),
        };
        println!(
            "  {:<16} {:<9} {:<10} {:<8} {}",
            status.kind.label(),
            status.declared,
            status.persisted,
            status.orphaned,
            state
        );
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn origin_label(group: &GroupSummary) -> &'static str {
    match group.origin {
        Origin::Pending => "-",
        Origin::Skipped => "skipped",
        Origin::Reused => "reused",
        Origin::Fresh => "fresh",
    }
}

fn group_error(group: &GroupSummary) -> String {
    match (&group.error, &group.activation_error, &group.save_error) {
        (Some(e), _, _) => truncate(e, 40),
        (None, Some(e), _) => format!("activation: {}", truncate(e, 28)),
        (None, None, Some(e)) => format!("not saved: {}", truncate(e, 29)),
        (None, None, None) => String::new(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels_accepts_dashes_and_skips_blanks() {
        let labels = vec!["fees-collector".to_string(), " ".to_string(), "pair".to_string()];
        assert_eq!(
            parse_labels(&labels).unwrap(),
            vec![InstanceKind::FeesCollector, InstanceKind::Pair]
        );
    }

    #[test]
    fn test_parse_labels_rejects_unknown() {
        assert!(parse_labels(&["bridge".to_string()]).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long message", 10), "a very ...");
    }

    #[test]
    fn test_effective_config_applies_root() {
        let rendered = effective_config(DeployConfig::new(), Some(PathBuf::from("/srv/deploy"))).unwrap();
        let parsed = keystone_core::config::parser::parse_config_str(&rendered).unwrap();
        assert_eq!(parsed.root(), std::path::Path::new("/srv/deploy"));
        assert_eq!(parsed.paths.state, "state");
    }

    #[test]
    fn test_cli_parses_config_command() {
        let cli = Cli::parse_from(["keystone", "--root", "/srv/deploy", "config"]);
        assert!(matches!(cli.command, Commands::Config));
        assert_eq!(cli.root, Some(PathBuf::from("/srv/deploy")));
    }

    #[test]
    fn test_cli_parses_deploy_flags() {
        let cli = Cli::parse_from([
            "keystone",
            "deploy",
            "--fresh",
            "pair,farm",
            "--only",
            "router,pair",
            "--simulate",
        ]);
        let Commands::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.fresh, vec!["pair", "farm"]);
        assert_eq!(args.only.len(), 2);
        assert!(args.simulate);
    }
}
