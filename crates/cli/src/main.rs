mod config_commands;

use std::path::PathBuf;

use {
    clap::{Args, Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "strata", version, about = "Strata: layered configuration inspector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(flatten)]
    layers: LayerArgs,
}

/// Where values come from and which keys are expected.
#[derive(Args, Debug, Default)]
pub struct LayerArgs {
    /// Configuration file (json, toml, yaml). Repeatable; the first one wins.
    #[arg(long = "file", short = 'f', global = true, value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Read `PREFIX_KEY_PATH` environment variables for registered keys.
    #[arg(long, global = true, env = "STRATA_ENV_PREFIX", value_name = "PREFIX")]
    pub env_prefix: Option<String>,

    /// Mark a key as required. Repeatable.
    #[arg(long = "require", global = true, value_name = "KEY")]
    pub required: Vec<String>,

    /// Register a key, optionally with a default. Repeatable.
    #[arg(long = "key", global = true, value_name = "KEY[=DEFAULT]")]
    pub keys: Vec<String>,

    /// Engine options file (key_delimiter, description_wrapper, case_sensitive).
    #[arg(long, global = true, value_name = "PATH")]
    pub options: Option<PathBuf>,

    /// Match keys without regard to case.
    #[arg(long, global = true, default_value_t = false)]
    pub case_insensitive: bool,

    /// Key path delimiter.
    #[arg(long, global = true, value_name = "D")]
    pub delimiter: Option<String>,

    /// Expand `${VAR}` placeholders in configuration files.
    #[arg(long, global = true, default_value_t = false)]
    pub expand_env: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved value of a key.
    Get { key: String },
    /// Print every resolved value, defaults included.
    Dump {
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Print a placeholder config listing every registered key.
    Blank {
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Parse all sources and report missing or invalid values.
    Check,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "strata starting");

    match cli.command {
        Commands::Get { key } => config_commands::get(&cli.layers, &key),
        Commands::Dump { format } => config_commands::dump(&cli.layers, &format),
        Commands::Blank { format } => config_commands::blank(&cli.layers, &format),
        Commands::Check => config_commands::check(&cli.layers),
    }
}
