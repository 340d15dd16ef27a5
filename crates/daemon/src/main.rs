// fuzzyd: serve a directory of notes over WebSocket.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use fuzzy_daemon::config::{ConfigOverrides, DaemonConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fuzzyd", version, about = "Fuzzy note server")]
struct Cli {
    /// Config file (default: ~/.fuzzy/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Location of the notes.
    #[arg(long)]
    path: Option<PathBuf>,

    /// IP address to listen on.
    #[arg(long)]
    ip: Option<IpAddr>,

    /// Port to serve on.
    #[arg(long)]
    port: Option<u16>,

    /// Tag marker.
    #[arg(long)]
    tag: Option<String>,

    /// Put tags on the line after the title.
    #[arg(long)]
    sep: bool,

    /// Header marker written on save.
    #[arg(long)]
    head: Option<String>,

    /// Enable editing.
    #[arg(long)]
    edit: bool,

    /// Keep file names when a save changes the title.
    #[arg(long)]
    no_rename: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root: self.path.clone(),
            ip: self.ip,
            port: self.port,
            tag_marker: self.tag.clone(),
            header_marker: self.head.clone(),
            separated: self.sep,
            editable: self.edit,
            no_rename: self.no_rename,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load_from(path)
            .with_context(|| format!("failed to load config `{}`", path.display()))?,
        None => DaemonConfig::load().context("failed to load global config")?,
    };
    config.apply(cli.overrides());
    config.validate().context("invalid configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("starting fuzzy daemon");
    fuzzy_daemon::runtime::run(config).await.context("fuzzy daemon terminated unexpectedly")
}
