//! Berth CLI - deploy a project's images and chart to Kubernetes

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod commands;
mod display;
mod error;
mod exit_codes;

use commands::PipelineArgs;
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "berth")]
#[command(author = "Berth Contributors")]
#[command(version)]
#[command(
    about = "Deploy container images and their Helm-style chart to Kubernetes",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a release to the cluster
    Deploy {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Kubeconfig context (default: current context)
        #[arg(long, env = "BERTH_KUBE_CONTEXT")]
        kube_context: Option<String>,

        /// How long to wait for workloads to become ready (e.g. 90s, 5m)
        #[arg(long, value_parser = commands::parse_duration)]
        timeout: Option<Duration>,
    },

    /// Render the release locally without touching the cluster
    Render {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Write one file per template instead of printing a YAML stream
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Manage the secret key and encrypted values
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

#[derive(Subcommand)]
enum SecretAction {
    /// Generate a new secret key
    GenerateKey {
        /// Project directory
        #[arg(short = 'd', long, default_value = ".")]
        dir: PathBuf,

        /// Replace an existing key file
        #[arg(long)]
        force: bool,

        /// Print the key instead of writing it
        #[arg(long)]
        print: bool,
    },

    /// Encrypt every value of a plain YAML file
    Encrypt {
        /// Plain values file
        file: PathBuf,

        /// Project directory
        #[arg(short = 'd', long, default_value = ".")]
        dir: PathBuf,

        /// Hex-encoded secret key
        #[arg(long, env = "BERTH_SECRET_KEY", hide_env_values = true)]
        secret_key: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decrypt an encrypted values file to stdout
    Decrypt {
        /// Encrypted values file
        file: PathBuf,

        /// Project directory
        #[arg(short = 'd', long, default_value = ".")]
        dir: PathBuf,

        /// Hex-encoded secret key
        #[arg(long, env = "BERTH_SECRET_KEY", hide_env_values = true)]
        secret_key: Option<String>,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .init();
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Deploy {
            pipeline,
            kube_context,
            timeout,
        } => commands::deploy::run(&pipeline, kube_context, timeout).await,

        Commands::Render {
            pipeline,
            output_dir,
        } => commands::render::run(&pipeline, output_dir.as_deref()).await,

        Commands::Secret { action } => match action {
            SecretAction::GenerateKey { dir, force, print } => {
                commands::secret::generate_key(&dir, force, print)
            }
            SecretAction::Encrypt {
                file,
                dir,
                secret_key,
                output,
            } => commands::secret::encrypt(&dir, secret_key.as_deref(), &file, output.as_deref()),
            SecretAction::Decrypt {
                file,
                dir,
                secret_key,
            } => commands::secret::decrypt(&dir, secret_key.as_deref(), &file).await,
        },
    }
}

fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::internal(format!("cannot start runtime: {}", e)))
        .and_then(|runtime| runtime.block_on(run(cli.command)));

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
    std::process::exit(exit_codes::SUCCESS);
}
