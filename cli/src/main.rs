use std::sync::Arc;

use clap::Parser;

use ags_cli::commands::{cli, loadtest, precache};
use ags_cli::logging::init_tracing;
use ags_core::api::{AppContext, CliError, ConfigError};
use ags_plugins::CloudServicesFactory;

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let mut cfg = ags_core::api::load(args.config.as_deref())?;

    // Progress bars and console log lines would interleave on stderr.
    let console = match &args.command {
        cli::Commands::Precache(p) => {
            p.apply(&mut cfg)?;
            cfg.logging.console && (args.log_console || !precache::shows_progress(p))
        }
        cli::Commands::Loadtest(l) => {
            l.apply(&mut cfg)?;
            cfg.logging.console
        }
    };
    init_tracing(&cfg.logging, console).map_err(|e| {
        CliError::Config(ConfigError::Invalid {
            field: "logging",
            reason: format!("{e:#}"),
        })
    })?;

    let ctx = AppContext::new(cfg, Some(Arc::new(CloudServicesFactory)));
    match &args.command {
        cli::Commands::Precache(p) => precache::run(p, &ctx).await,
        cli::Commands::Loadtest(_) => loadtest::run(&ctx).await,
    }
}
