//! tracesink - Main Entry Point
//!
//! Reads trace messages from a built-in source, prints one line per batch
//! and per message, and finishes with the number of events analyzed.

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use tracesink_rs::{cli::Cli, pipeline::PipelineBuilder, PipelineError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli) {
        Ok(events) => {
            tracing::info!("Finished: {} events", events);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

/// Log to stderr, and to `--log-file` when given. Standard output carries the trace.
fn init_logging(cli: &Cli) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tracesink_rs=info,tracesink=info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &cli.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("installing the tracing subscriber")?;

    Ok(guard)
}

fn run(cli: &Cli) -> anyhow::Result<u64> {
    let config = cli.resolve_config()?;
    tracing::info!(
        "Starting tracesink: source={} mode={:?}",
        config.source.kind,
        config.sink.mode
    );

    let mut pipeline = PipelineBuilder::new(&config).build()?;
    let result = pipeline.run();

    if cli.summary_json {
        let summary = serde_json::to_string_pretty(&pipeline.summary())
            .context("serializing run summary")?;
        println!("{}", summary);
    }

    Ok(result?)
}
