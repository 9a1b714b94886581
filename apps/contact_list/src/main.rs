use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{HttpUsersSource, LoadController};
use shared::protocol::LoadState;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

mod config;
mod render;

use config::Settings;

#[derive(Parser, Debug)]
#[command(about = "Fetch the remote contact list and print it")]
struct Args {
    /// Users endpoint returning a JSON array of contacts.
    #[arg(long)]
    endpoint: Option<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Settings file; defaults to ./contact_list.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the final state as JSON instead of rendering each transition.
    #[arg(long)]
    json: bool,
    /// Load a second time once the first load settles.
    #[arg(long)]
    reload: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(v) = &self.endpoint {
            settings.endpoint = v.clone();
        }
        if let Some(v) = self.timeout_secs {
            settings.request_timeout_secs = v;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Installed before settings load so config warnings are visible; the
    // configured filter replaces the default once known.
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut settings = config::load_settings(args.config.as_deref())?;
    args.apply(&mut settings);

    match EnvFilter::try_new(&settings.log_filter) {
        Ok(configured) => filter_handle
            .reload(configured)
            .context("failed to apply log filter")?,
        Err(err) => warn!(
            filter = %settings.log_filter,
            error = %err,
            "invalid log filter; keeping info"
        ),
    }

    let endpoint = settings.endpoint_url()?;
    info!(%endpoint, "starting contact list");
    let source = HttpUsersSource::new(endpoint, settings.request_timeout())
        .context("failed to build HTTP client")?;
    let controller = LoadController::new(Arc::new(source));

    let render_each = !args.json;
    let _view = controller.subscribe(move |state| {
        if render_each {
            println!("{}\n", render::render_state(state));
        }
    });

    controller.load();
    let mut state = controller.settled().await;
    if args.reload {
        controller.load();
        state = controller.settled().await;
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
    }

    match state {
        LoadState::Failed(err) => Err(err).context("could not load contacts"),
        _ => Ok(()),
    }
}
