//! CI Bootstrapper CLI
//!
//! The `ci-bootstrap` command prepares a scheduled build to run its real
//! executable.
//!
//! ## Commands
//!
//! - `resolve`: resolve the properties file, download packages and write
//!   the rewritten build
//! - `validate`: check a build's bootstrap properties without contacting
//!   any service

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bootstrap_clients::{
    CasClient, CipdClient, ClientConfig, GclientEvaluator, GerritClient, GitilesClient,
    PatchCommand,
};
use bootstrap_core::{
    bootstrap_span, sleep_before_exiting, update_build, BootstrapError, BootstrapInput,
    BootstrapResolver, BootstrapSpan, Build, ConfigLocator, ExeDescriptor, InputOptions,
    PackageAcquirer, MANIFEST_EVALUATOR_CHANNEL, METRICS,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, Instrument, Level};

#[derive(Parser)]
#[command(name = "ci-bootstrap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bootstrap a CI build from a versioned properties file", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, env = "BOOTSTRAP_VERBOSE")]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true, env = "BOOTSTRAP_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct BuildArgs {
    /// Path to the build (JSON)
    #[arg(short, long, env = "BOOTSTRAP_BUILD")]
    build: PathBuf,

    /// Build properties take precedence over builder properties
    #[arg(long, env = "BOOTSTRAP_POLYMORPHIC")]
    polymorphic: bool,

    /// Do not fail when the build has no properties config
    #[arg(long, env = "BOOTSTRAP_PROPERTIES_OPTIONAL")]
    properties_optional: bool,
}

/// Overrides for the `BOOTSTRAP_*` client settings.
#[derive(Args)]
struct ClientArgs {
    /// Per-request timeout for Gitiles and Gerrit, in seconds
    #[arg(long)]
    http_timeout_secs: Option<u64>,

    /// Extra attempts for transient HTTP failures
    #[arg(long)]
    http_retries: Option<u32>,

    /// Package registry service URL
    #[arg(long)]
    cipd_server: Option<String>,
}

impl ClientArgs {
    fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(secs) = self.http_timeout_secs {
            config = config.with_http_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = self.http_retries {
            config = config.with_http_retries(retries);
        }
        if let Some(server) = &self.cipd_server {
            config = config.with_cipd_server(server);
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve config, acquire packages and write the bootstrapped build
    Resolve {
        #[command(flatten)]
        build: BuildArgs,

        #[command(flatten)]
        clients: ClientArgs,

        /// Directory packages are installed under
        #[arg(long, env = "BOOTSTRAP_OUTPUT_ROOT")]
        output_root: PathBuf,

        /// Where to write the result (default: stdout)
        #[arg(short, long, env = "BOOTSTRAP_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Validate a build's bootstrap properties
    Validate {
        #[command(flatten)]
        build: BuildArgs,
    },
}

/// What `resolve` hands to the caller.
#[derive(Serialize)]
struct BootstrapOutput<'a> {
    build: &'a Build,
    exe: &'a ExeDescriptor,
    /// Absolute command line of the executable
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    bootstrap_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Resolve {
            build,
            clients,
            output_root,
            output,
        } => cmd_resolve(&build, &clients, &output_root, output.as_deref()).await,
        Commands::Validate { build } => cmd_validate(&build),
    }
}

fn load_build(path: &Path) -> Result<Build> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read build file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid build JSON in {:?}", path))
}

fn load_input(args: &BuildArgs) -> Result<(Build, BootstrapInput)> {
    let build = load_build(&args.build)?;
    let options = InputOptions {
        polymorphic: args.polymorphic,
        properties_optional: args.properties_optional,
    };
    let input = BootstrapInput::from_build(&build, options)
        .context("Build has invalid bootstrap properties")?;
    Ok((build, input))
}

/// Resolve, acquire and rewrite the build
async fn cmd_resolve(
    args: &BuildArgs,
    client_args: &ClientArgs,
    output_root: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let (mut build, input) = load_input(args)?;
    let span = bootstrap_span(build.id, &build.builder);
    run_resolve(&mut build, &input, client_args, output_root, output)
        .instrument(span)
        .await
}

async fn run_resolve(
    build: &mut Build,
    input: &BootstrapInput,
    client_args: &ClientArgs,
    output_root: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let clients = client_args
        .apply(ClientConfig::from_env().context("Invalid client configuration")?);
    let (evaluator_tx, evaluator_rx) = mpsc::channel::<PathBuf>(1);
    let resolver = BootstrapResolver::new(
        Arc::new(GitilesClient::new(&clients).context("Failed to create Gitiles client")?),
        Arc::new(GerritClient::new(&clients).context("Failed to create Gerrit client")?),
        Arc::new(GclientEvaluator::from_channel(evaluator_rx)),
        Arc::new(PatchCommand::new(&clients)),
    );
    let acquirer = PackageAcquirer::new(
        Arc::new(CipdClient::new(&clients)),
        Arc::new(CasClient::new(&clients)),
    );
    let outputs = HashMap::from([(MANIFEST_EVALUATOR_CHANNEL.to_string(), evaluator_tx)]);

    let result = tokio::try_join!(
        resolver.resolve(input),
        acquirer.acquire(input, output_root, outputs),
    );
    METRICS.flush();
    let (config, exe) = match result {
        Ok(resolved) => resolved,
        Err(e) => return Err(fail(e).await),
    };

    update_build(build, &config, &exe.provenance)
        .context("Failed to update build with bootstrap results")?;

    let result = BootstrapOutput {
        build,
        exe: &exe,
        command: exe.command(),
    };
    let json = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write output to {:?}", path))?;
            info!(path = %path.display(), "bootstrapped build written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Log `err`, honor any sleep-before-exiting directive, then hand it back
/// for a non-zero exit.
async fn fail(err: BootstrapError) -> anyhow::Error {
    error!(error = %err, "bootstrap failed");
    if let Some(sleep) = sleep_before_exiting(&err) {
        info!(seconds = sleep.as_secs(), "sleeping before exiting");
        tokio::time::sleep(sleep).await;
    }
    anyhow::Error::new(err).context("Bootstrap failed")
}

/// Validate without resolving
fn cmd_validate(args: &BuildArgs) -> Result<()> {
    let (build, input) = load_input(args)?;
    let _span = BootstrapSpan::enter(build.id, &build.builder);

    println!("Build {} ({})", build.id, build.builder);
    match input.config.as_ref().map(|c| &c.locator) {
        Some(ConfigLocator::TopLevel(project)) => {
            println!("  Config:  {} (top-level)", project.repo)
        }
        Some(ConfigLocator::Dependency(project)) => println!(
            "  Config:  {} (dependency of {})",
            project.config_repo, project.top_level_repo
        ),
        None => println!("  Config:  none"),
    }
    if let Some(config) = &input.config {
        println!("  File:    {}", config.properties_file);
    }
    match (&input.cas_bundle, &input.exe) {
        (Some(bundle), _) => println!("  Exe:     cas {}", bundle.digest),
        (None, Some(exe)) => println!("  Exe:     {}@{}", exe.package, exe.version),
        (None, None) => println!("  Exe:     none"),
    }
    println!("  Commits: {}", input.commits.len());
    println!("  Changes: {}", input.changes.len());
    Ok(())
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
    fn test_resolve_args_parse() {
        let cli = Cli::try_parse_from([
            "ci-bootstrap",
            "--json",
            "resolve",
            "--build",
            "build.json",
            "--output-root",
            "/b/packages",
            "--polymorphic",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Resolve {
                build,
                output_root,
                output,
                ..
            } => {
                assert_eq!(build.build, PathBuf::from("build.json"));
                assert!(build.polymorphic);
                assert!(!build.properties_optional);
                assert_eq!(output_root, PathBuf::from("/b/packages"));
                assert!(output.is_none());
            }
            Commands::Validate { .. } => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_client_flags_override_config() {
        let cli = Cli::try_parse_from([
            "ci-bootstrap",
            "resolve",
            "--build",
            "build.json",
            "--output-root",
            "/b/packages",
            "--http-timeout-secs",
            "5",
            "--http-retries",
            "2",
            "--cipd-server",
            "https://cipd.example.com/",
        ])
        .unwrap();
        let Commands::Resolve { clients, .. } = cli.command else {
            panic!("expected resolve");
        };

        let config = clients.apply(ClientConfig::default());
        assert_eq!(config.http_timeout, Duration::from_secs(5));
        assert_eq!(config.http_retries, 2);
        assert_eq!(config.cipd_server, "https://cipd.example.com");
    }

    #[test]
    fn test_absent_client_flags_keep_config() {
        let args = ClientArgs {
            http_timeout_secs: None,
            http_retries: None,
            cipd_server: None,
        };
        assert_eq!(args.apply(ClientConfig::default()), ClientConfig::default());
    }
}
