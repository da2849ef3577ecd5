use std::sync::Arc;

use ags_core::api::{
    AppContext, CliError, IndicatifProgress, NoopProgress, PrecacheReport, ProgressSink,
};

use super::cli::PrecacheArgs;
use super::signal::wait_for_shutdown;

/// Whether progress bars will be drawn for this run.
pub fn shows_progress(args: &PrecacheArgs) -> bool {
    !args.no_progress && atty::is(atty::Stream::Stderr)
}

pub async fn run(args: &PrecacheArgs, ctx: &AppContext) -> Result<i32, CliError> {
    ctx.cfg().validate_for_precache()?;
    let services = ctx.build_services().await?;

    let progress: Arc<dyn ProgressSink> = if shows_progress(args) {
        Arc::new(IndicatifProgress::new(true))
    } else {
        Arc::new(NoopProgress)
    };
    let precacher = Arc::new(ctx.precacher(&services, progress)?);

    let watcher = {
        let precacher = precacher.clone();
        tokio::spawn(async move {
            let signal = wait_for_shutdown().await;
            tracing::warn!(signal, "stopping precache, waiting for in-flight images");
            precacher.shutdown();
        })
    };
    let result = precacher.run().await;
    watcher.abort();

    let report = result?;
    print_summary(&report);
    Ok(exit_code(&report))
}

/// Non-zero when any image is still cold.
pub fn exit_code(report: &PrecacheReport) -> i32 {
    if report.cancelled || !report.permanently_failed.is_empty() || !report.abandoned.is_empty() {
        20
    } else {
        0
    }
}

fn print_summary(report: &PrecacheReport) {
    println!(
        "precache finished: submitted={} succeeded={} failed={} abandoned={} attempts={}{}",
        report.submitted,
        report.succeeded,
        report.permanently_failed.len(),
        report.abandoned.len(),
        report.attempts,
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for image in &report.permanently_failed {
        println!("  failed: {image}");
    }
    for image in &report.abandoned {
        println!("  not attempted after shutdown: {image}");
    }
}
