mod api;
mod app;
mod application;
mod config;
mod domain;
mod storage;
mod ui;
mod utils;

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{app::DownloadApp, config::AppConfig, ui::TerminalNotifier};

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_filter);

    let mut app = DownloadApp::new(config, Arc::new(TerminalNotifier));
    app.request_permission().await;

    let result = match app.requested_task() {
        Ok(task) => app.start_downloading_file(task).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(task) => {
            println!("{}", app.view().view());
            if task.destination_locator.is_some() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "download not started");
            println!("{e}");
            ExitCode::FAILURE
        }
    }
}
