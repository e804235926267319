use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use ripd::config::Config;
use ripd::router;

/// Run one RIPv2-style distance-vector router as a daemon over loopback UDP.
#[derive(Debug, Parser)]
struct Cli {
    /// Path to the router's configuration file.
    config: PathBuf,
    /// Raise the log level by one step (info -> debug -> trace), overriding
    /// RUST_LOG.
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config, args.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(router::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins if it's set; otherwise fall back to the config file's
/// `log-level`, `-v`, or `info`, in that order.
fn init_logging(config: &Config, verbose: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        pretty_env_logger::init_timed();
        return;
    }
    let mut level = config.log_level.unwrap_or(log::LevelFilter::Info);
    if verbose {
        level = bump(level);
    }
    pretty_env_logger::formatted_timed_builder().filter_level(level).init();
}

fn bump(level: log::LevelFilter) -> log::LevelFilter {
    use log::LevelFilter::*;
    match level {
        Off => Error,
        Error => Warn,
        Warn => Info,
        Info => Debug,
        Debug => Trace,
        Trace => Trace,
    }
}
