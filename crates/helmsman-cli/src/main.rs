mod commands;

use clap::{Parser, Subcommand};
use helmsman_cluster::{ConfigStore, HttpStore};
use helmsman_core::{install_signal_handler, Deployment};
use helmsman_runtime::{select_plane, TerraformEngine};
use helmsman_schema::ModelName;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "helmsman",
    version,
    about = "Deployment and lifecycle orchestrator for multi-node cloud control planes"
)]
struct Cli {
    /// URL of the cluster config service.
    #[arg(long, default_value = "http://127.0.0.1:7000", global = true)]
    cluster_url: String,

    /// Provisioning plan directory the terraform engine runs in.
    #[arg(long, default_value = "/var/lib/helmsman/plan", global = true)]
    plans_dir: PathBuf,

    /// Control plane backend to drive (juju or mock).
    #[arg(long, default_value = "juju", global = true)]
    plane: String,

    /// Model hosting the k8s control-plane components.
    #[arg(long, default_value = "openstack", global = true)]
    control_model: String,

    /// Model hosting the machine components.
    #[arg(long, default_value = "controller", global = true)]
    machine_model: String,

    /// Answer every prompt with its default (non-interactive).
    #[arg(long, default_value_t = false, global = true)]
    accept_defaults: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Refresh the deployment: upgrade components to the latest revision
    /// in their channels, or to new channels with --upgrade-release.
    Refresh {
        /// Manifest file overriding the persisted one.
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Switch channel tracks to the manifest's channels (major upgrade).
        #[arg(long, default_value_t = false)]
        upgrade_release: bool,
        /// Discard persisted mysql upgrade state and start fresh.
        #[arg(long, default_value_t = false)]
        reset_mysql_upgrade_state: bool,
    },
    /// Show the persisted variable set of a provisioning plan.
    Vars {
        /// Plan name (e.g. control-plane).
        plan: String,
    },
    /// Show the persisted mysql upgrade state.
    State,
    /// Raw access to the cluster config database.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    Get { key: String },
    Set { key: String, value: String },
    Delete { key: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("HELMSMAN_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let store: Arc<dyn ConfigStore> = Arc::new(HttpStore::new(&cli.cluster_url));
    let interactive = console::user_attended() && !cli.accept_defaults;

    let result = match &cli.command {
        Commands::Refresh {
            manifest,
            upgrade_release,
            reset_mysql_upgrade_state,
        } => match build_deployment(&cli, Arc::clone(&store)) {
            Ok(deployment) => commands::refresh::run(
                &deployment,
                manifest.as_deref(),
                *upgrade_release,
                *reset_mysql_upgrade_state,
                interactive,
                cli.accept_defaults,
            ),
            Err(msg) => Err(msg),
        },
        Commands::Vars { plan } => commands::vars::run(store.as_ref(), plan),
        Commands::State => commands::state::run(store.as_ref()),
        Commands::Config { command } => match command {
            ConfigCommands::Get { key } => commands::config::get(store.as_ref(), key),
            ConfigCommands::Set { key, value } => {
                commands::config::set(store.as_ref(), key, value)
            }
            ConfigCommands::Delete { key } => commands::config::delete(store.as_ref(), key),
        },
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(commands::classify_error(&msg))
        }
    }
}

fn build_deployment(cli: &Cli, store: Arc<dyn ConfigStore>) -> Result<Deployment, String> {
    let plane = select_plane(&cli.plane).map_err(|e| e.to_string())?;
    let provisioner = Arc::new(TerraformEngine::new(&cli.plans_dir));
    Ok(Deployment::new(
        store,
        plane,
        provisioner,
        ModelName::new(cli.control_model.clone()),
        ModelName::new(cli.machine_model.clone()),
    ))
}
