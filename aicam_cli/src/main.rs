mod cli;
mod error_fmt;
mod run;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(level: &str, json: bool, logging: &aicam_config::Logging) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Optional JSON-lines file sink, rotation per config.
    let file_writer = logging.file.as_ref().map(|path| {
        let p = std::path::Path::new(path);
        let dir = match p.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => std::path::Path::new("."),
        };
        let name = p
            .file_name()
            .map_or_else(|| std::ffi::OsString::from("aicam.log"), |n| n.to_os_string());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        writer
    });

    let registry = tracing_subscriber::registry().with(filter);
    match (json, file_writer) {
        (true, Some(writer)) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init(),
        (true, None) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        (false, Some(writer)) => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init(),
        (false, None) => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_config(cli: &Cli) -> eyre::Result<aicam_config::Config> {
    if cli.config.exists() {
        aicam_config::load_config(&cli.config)
    } else {
        // No file: the built-in defaults describe the stock two-flag game.
        let cfg = aicam_config::Config::default();
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporting: {e}");
    }
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let result = try_main(&cli);
    if let Err(e) = result {
        if cli.json {
            println!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("{}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}

fn try_main(cli: &Cli) -> eyre::Result<()> {
    let cfg = load_config(cli)?;
    init_tracing(&cli.log_level, cli.json, &cfg.logging);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
        }) {
            tracing::warn!(error = %e, "failed to install ctrl-c handler");
        }
    }

    match &cli.cmd {
        Commands::Run {
            rounds,
            port,
            sim,
            sim_id,
            seed,
        } => run::cmd_run(
            &cfg,
            *rounds,
            port.clone(),
            *sim,
            *sim_id,
            *seed,
            cli.json,
            &shutdown,
        ),
        Commands::Watch {
            port,
            sim,
            seconds,
        } => run::cmd_watch(&cfg, port.clone(), *sim, *seconds, cli.json, &shutdown),
        Commands::SelfCheck => run::cmd_self_check(&cfg, cli.json),
    }
}
