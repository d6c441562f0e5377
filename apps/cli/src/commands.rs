//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use seedhub_core::merge::{MergeReport, harvest, load_plan, merge_targets};
use seedhub_core::pipeline::{ProgressReporter, ReconcileResult, reconcile};
use seedhub_github::GitHubClient;
use seedhub_shared::{HubConfig, init_config, load_config, load_config_from};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SeedHub: keep a hub's view of its module repositories in sync.
#[derive(Parser)]
#[command(
    name = "seedhub",
    version,
    about = "Reconcile seed manifests from module repositories into a hub index and README.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Rebuild the registry index, write the artifact, and patch the README.
    Reconcile {
        #[command(flatten)]
        hub: HubArgs,

        /// Discovery topic used when the registry declares no modules.
        #[arg(long, env = "SEEDHUB_TOPIC")]
        topic: Option<String>,

        /// Index artifact path, relative to the hub root.
        #[arg(long, env = "SEEDHUB_ARTIFACT")]
        artifact: Option<PathBuf>,

        /// Document to patch, relative to the hub root.
        #[arg(long, env = "SEEDHUB_DOCUMENT")]
        document: Option<PathBuf>,
    },

    /// Merge remote seed manifests into hub targets according to a plan.
    Merge {
        #[command(flatten)]
        hub: HubArgs,

        /// Merge plan path, relative to the hub root.
        #[arg(long)]
        plan: Option<PathBuf>,
    },

    /// Collect shared seed files from every module into the hub.
    Harvest {
        #[command(flatten)]
        hub: HubArgs,

        /// Seed file names to harvest (repeatable).
        #[arg(long = "seed")]
        seeds: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options shared by every command that touches the hub.
#[derive(Args)]
pub(crate) struct HubArgs {
    /// Config file (defaults to ~/.seedhub/seedhub.toml when present).
    #[arg(long, env = "SEEDHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Local checkout of the hub repository.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Hub repository as owner/repo.
    #[arg(long, env = "GITHUB_REPOSITORY")]
    hub: Option<String>,

    /// Declared registry path, relative to the hub root.
    #[arg(long)]
    registry: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show the configuration commands would run with.
    Show {
        #[command(flatten)]
        hub: HubArgs,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "seedhub=info",
        1 => "seedhub=debug",
        _ => "seedhub=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Reconcile {
            hub,
            topic,
            artifact,
            document,
        } => {
            let mut config = resolve_config(&hub)?;
            if let Some(topic) = topic {
                config.sources.topic = topic;
            }
            if let Some(artifact) = artifact {
                config.outputs.artifact_path = artifact;
            }
            if let Some(document) = document {
                config.outputs.document_path = document;
            }
            cmd_reconcile(&config).await
        }
        Command::Merge { hub, plan } => {
            let mut config = resolve_config(&hub)?;
            if let Some(plan) = plan {
                config.merge.plan_path = plan;
            }
            cmd_merge(&config).await
        }
        Command::Harvest { hub, seeds } => {
            let mut config = resolve_config(&hub)?;
            if !seeds.is_empty() {
                config.merge.harvest_seeds = seeds;
            }
            cmd_harvest(&config).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show { hub } => cmd_config_show(&hub).await,
        },
    }
}

/// Load the config file and apply flag overrides.
///
/// An explicitly named config file must exist; the default one is optional.
fn resolve_config(args: &HubArgs) -> Result<HubConfig> {
    let mut config = match &args.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    if let Some(root) = &args.root {
        config.hub.root = root.clone();
    }
    if let Some(hub) = &args.hub {
        let (owner, repo) = hub
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| eyre!("invalid hub repository '{hub}': expected owner/repo"))?;
        config.hub.owner = owner.to_string();
        config.hub.repo = repo.to_string();
    }
    if let Some(registry) = &args.registry {
        config.sources.registry_path = registry.clone();
    }

    Ok(config)
}

fn github_client(config: &HubConfig) -> Result<GitHubClient> {
    let token = config.github.token_from_env();
    if token.is_none() {
        info!(env = %config.github.token_env, "no token set, using unauthenticated requests");
    }
    Ok(GitHubClient::new(&config.github, token.as_deref())?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_reconcile(config: &HubConfig) -> Result<()> {
    let client = github_client(config)?;

    info!(
        root = %config.hub.root.display(),
        hub = config.hub.full_name().as_deref().unwrap_or("<unset>"),
        "reconciling registry"
    );

    let reporter = CliProgress::new();
    let result = reconcile(&client, config, &reporter).await?;

    println!();
    println!("  Registry reconciled.");
    println!("  Source:    {:?}", result.origin);
    println!("  Modules:   {}", result.module_count);
    println!("  Artifact:  {}", result.artifact);
    println!("  Document:  {}", result.document);
    println!("  Problems:  {}", result.problems.len());
    for problem in &result.problems {
        println!("    - {problem}");
    }
    println!("  Stamp:     {}", result.reconciled_at);
    println!(
        "  Time:      {:.1}s",
        result.elapsed.as_secs_f64()
    );
    println!();

    Ok(())
}

async fn cmd_merge(config: &HubConfig) -> Result<()> {
    let plan = load_plan(&config.hub_path(&config.merge.plan_path))?;
    let client = github_client(config)?;

    let reports = merge_targets(&client, config, &plan).await?;
    print_reports("Merge", &reports);
    Ok(())
}

async fn cmd_harvest(config: &HubConfig) -> Result<()> {
    let client = github_client(config)?;

    let selection = seedhub_core::index::resolve_repos(&client, config).await?;
    info!(repos = selection.repos.len(), "harvesting seeds");

    let reports = harvest(&client, config, &selection.repos).await?;
    print_reports("Harvest", &reports);
    Ok(())
}

fn print_reports(title: &str, reports: &[MergeReport]) {
    println!();
    println!("  {title} complete: {} target(s).", reports.len());
    for report in reports {
        let outcome = report
            .outcome
            .map(|o| o.to_string())
            .unwrap_or_else(|| "skipped".to_string());
        println!(
            "  {:<32} {:>4} records  {} used / {} skipped  {outcome}",
            report.target, report.records, report.sources_used, report.sources_skipped,
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn repo_started(&self, repo: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Indexing [{current}/{total}] {repo}"));
    }

    fn done(&self, _result: &ReconcileResult) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(args: &HubArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
