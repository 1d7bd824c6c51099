//! `ccsa-install`: transactional install/update/uninstall of the managed
//! binaries, agent files, and editor configuration described in the
//! installer crate.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use ccsa_installer::{EnvOverrides, InstallOptions, InstallerManager, LocalMode, Paths};
use ccsubagents::attestation::CommandAttestationVerifier;
use ccsubagents::github::GitHubReleaseFetcher;

/// The repo this installer fetches release assets from.
const REPO: &str = "example/ccsubagents";
const BINARY_ASSET: &str = "ccsa-mcp";

#[derive(Parser)]
#[command(name = "ccsa-install")]
#[command(about = "Install, update or uninstall the ccsubagents MCP server and its editor wiring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Skip verifying release asset attestations.
    #[arg(long, global = true)]
    skip_attestations_check: bool,

    /// Install scope.
    #[arg(long, value_enum, global = true, default_value = "global")]
    scope: Scope,

    /// Verbose (debug-level) logging.
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a fresh copy.
    Install,
    /// Update an existing install to the latest release.
    Update,
    /// Remove a previously tracked install.
    Uninstall,
}

#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Local,
    Global,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    warn_if_web_ui_addr_set();

    let home = home_dir();
    let env = EnvOverrides::from_env();
    let paths = Paths::resolve(home, &env);

    let fetcher = match GitHubReleaseFetcher::from_env() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("ccsa-install: {e}");
            process::exit(1);
        }
    };
    let verifier = CommandAttestationVerifier::new(REPO);
    let manager = InstallerManager::new(paths, &fetcher, &verifier);

    let opts = InstallOptions {
        repo: REPO.to_string(),
        binary_assets: vec![BINARY_ASSET.to_string()],
        config_targets: Vec::new(),
        skip_attestations: cli.skip_attestations_check,
    };

    let result = match (cli.command, cli.scope) {
        (Commands::Install, Scope::Global) => manager.install(&opts).map(Some),
        (Commands::Update, Scope::Global) => manager.update(&opts).map(Some),
        (Commands::Uninstall, Scope::Global) => manager.uninstall_global().map(|()| None),
        (Commands::Install, Scope::Local) => {
            let root = current_dir();
            manager
                .install_local(&opts, &root, LocalMode::Team, false)
                .map(Some)
        }
        (Commands::Update, Scope::Local) => {
            let root = current_dir();
            manager
                .install_local(&opts, &root, LocalMode::Team, false)
                .map(Some)
        }
        (Commands::Uninstall, Scope::Local) => {
            let root = current_dir();
            manager.uninstall_local(&root).map(|()| None)
        }
    };

    match result {
        Ok(Some(report)) if report.no_op => {
            println!("already at latest version ({})", report.release_tag);
            process::exit(0);
        }
        Ok(Some(report)) => {
            println!("installed {}", report.release_tag);
            process::exit(0);
        }
        Ok(None) => {
            println!("done");
            process::exit(0);
        }
        Err(e) => {
            eprintln!("ccsa-install: {e}");
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

fn warn_if_web_ui_addr_set() {
    if std::env::var_os("LOCAL_ARTIFACT_WEB_UI_ADDR").is_some() {
        tracing::warn!("LOCAL_ARTIFACT_WEB_UI_ADDR is set but this build has no web UI to bind");
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
