//! # SparkCRM Console
//!
//! Terminal front end for SparkCRM contacts and tasks. Each invocation checks
//! for a session, signs in with the configured credentials when needed, runs
//! one command and prints the result followed by any feedback reports.
//!
//! ## Usage
//!
//! ```bash
//! SPARKCRM_DEMO=true cargo run -p sparkcrm-console -- tasks list
//! ```

use clap::Parser;
use sparkcrm_console::app::App;
use sparkcrm_console::cli::Cli;
use sparkcrm_console::commands;
use sparkcrm_console::config::Config;
use sparkcrm_shared::error::CrmError;
use sparkcrm_sync::feedback::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "sparkcrm_console=debug,sparkcrm_sync=debug,sparkcrm_shared=debug"
    } else {
        "sparkcrm_console=info,sparkcrm_sync=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("SparkCRM console v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let app = App::connect(&config, &commands::start_path(&cli.command)).await?;

    let outcome = commands::run(&app, cli.command).await;

    if let Ok(lines) = &outcome {
        for line in lines {
            println!("{}", line);
        }
    }
    for report in app.feedback.visible() {
        match report.level {
            Level::Success => eprintln!("ok: {}", report.message),
            Level::Failure => eprintln!("failed: {}", report.message),
        }
    }

    app.shutdown();

    match outcome {
        // Core failures were already printed as feedback
        Err(e) if e.downcast_ref::<CrmError>().is_some() => std::process::exit(1),
        Err(e) => Err(e),
        Ok(_) => Ok(()),
    }
}
