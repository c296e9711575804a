use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use relay::task::TaskKind;

mod cmd;

#[derive(Parser)]
#[command(name = "relay")]
#[command(version, about = "Chat-driven coding agent orchestrator")]
pub struct Cli {
    /// Config file (defaults to ./relay.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Telegram bot and the health endpoint
    Serve {
        /// Port for the health endpoint (overrides PORT and relay.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind on all interfaces and allow cross-origin requests
        #[arg(long)]
        dev: bool,
    },
    /// Run a single task from the terminal, reporting to stdout
    Run {
        /// Project name as configured
        project: String,

        /// GitHub issue to fix
        #[arg(long, conflicts_with = "prompt", required_unless_present = "prompt")]
        issue: Option<u64>,

        /// Free-form task description
        #[arg(long)]
        prompt: Option<String>,

        /// Task kind for a prompt (ignored for issues)
        #[arg(long, value_enum, default_value = "auto")]
        kind: TaskKind,
    },
    /// List configured projects
    Projects,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = relay::config::Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, dev } => cmd::cmd_serve(config, port, dev).await?,
        Commands::Run {
            project,
            issue,
            prompt,
            kind,
        } => cmd::cmd_run(config, project, issue, prompt, kind).await?,
        Commands::Projects => cmd::cmd_projects(&config)?,
    }

    Ok(())
}
