use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use fnroute::core::logging::setup_logging;
use fnroute::core::{settings_loader, Settings};
use people_demo::{dispatcher, PersonRepository};

#[derive(Parser)]
#[command(name = "people")]
#[command(about = "Serves a person directory through an fnroute route table", long_about = None)]
struct Cli {
    /// Address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Settings file (TOML, or JSON when the extension is `.json`).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_settings(config: Option<&Path>) -> anyhow::Result<Settings> {
    let Some(path) = config else {
        return Ok(settings_loader::from_env());
    };
    let settings = if path.extension().is_some_and(|ext| ext == "json") {
        settings_loader::from_json_file_with_env(path)
    } else {
        settings_loader::from_toml_file_with_env(path)
    };
    settings.with_context(|| format!("loading settings from {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    setup_logging(&settings);

    let app = dispatcher(&PersonRepository::new(), settings)
        .context("building the route table")?
        .into_axum_router();

    let listener = tokio::net::TcpListener::bind(&cli.addr)
        .await
        .with_context(|| format!("binding {}", cli.addr))?;
    tracing::info!("listening on http://{}/", cli.addr);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
