use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use bible_study_bot::cli::commands::{
    handle_build, handle_config, handle_ingest, handle_lookup, handle_publish, handle_search,
    handle_status,
};
use bible_study_bot::cli::output::get_formatter;
use bible_study_bot::cli::{Cli, Commands};
use bible_study_bot::context::AppContext;
use bible_study_bot::models::{Config, OutputFormat, ScorerKind};

const LOG_ENV: &str = "BSB_LOG";

/// Detect the ONNX Runtime library and set ORT_DYLIB_PATH if not already set.
/// Must run before any ort code.
fn detect_and_set_ort_path() {
    if std::env::var("ORT_DYLIB_PATH")
        .map(|p| Path::new(&p).exists())
        .unwrap_or(false)
    {
        return;
    }

    let home = std::env::var("HOME").unwrap_or_default();

    let candidates: Vec<String> = if cfg!(target_os = "macos") {
        vec![
            format!("{home}/.local/lib/bible-study-bot/libonnxruntime.dylib"),
            "/opt/homebrew/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
            "/usr/local/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
        ]
    } else if cfg!(target_os = "linux") {
        vec![
            format!("{home}/.local/lib/bible-study-bot/libonnxruntime.so"),
            "/usr/lib/libonnxruntime.so".into(),
            "/usr/local/lib/libonnxruntime.so".into(),
            "/usr/lib/x86_64-linux-gnu/libonnxruntime.so".into(),
            "/usr/lib/aarch64-linux-gnu/libonnxruntime.so".into(),
        ]
    } else {
        Vec::new()
    };

    if let Some(path) = candidates.into_iter().find(|p| Path::new(p).exists()) {
        // SAFETY: called at program start before the runtime spawns threads.
        unsafe {
            std::env::set_var("ORT_DYLIB_PATH", path);
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let fallback = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    if config.rerank.scorer == ScorerKind::CrossEncoder {
        detect_and_set_ort_path();
    }
    init_tracing(cli.verbose, cli.quiet);

    let format = cli.format.unwrap_or(config.search.default_format);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(run(cli, config, format));

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprint!("{}", get_formatter(format).format_error(&format!("{e:#}")));
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(cli: Cli, config: Config, format: OutputFormat) -> Result<()> {
    tokio::select! {
        result = run_command(cli, config, format) => result,
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, stopping.");
            Ok(())
        }
    }
}

async fn run_command(cli: Cli, config: Config, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let formatter = formatter.as_ref();

    match cli.command {
        Commands::Config(cmd) => handle_config(cmd, &config, format, formatter),
        Commands::Status => handle_status(&config, formatter).await,
        Commands::Search(args) => handle_search(args, config, formatter, cli.verbose).await,
        Commands::Build(args) => handle_build(args, &context(config)?, formatter).await,
        Commands::Publish(args) => handle_publish(args, &context(config)?, formatter, cli.quiet).await,
        Commands::Ingest => handle_ingest(&context(config)?, formatter, cli.quiet).await,
        Commands::Lookup(args) => handle_lookup(args, &context(config)?, formatter).await,
    }
}

fn context(config: Config) -> Result<AppContext> {
    AppContext::from_config(config).context("failed to initialise services")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
