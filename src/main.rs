use clap::Parser;
use ptyserial::bridge;
use ptyserial::cli::Cli;
use ptyserial::config::{Config, ConfigError};
use ptyserial::error::AppError;
use ptyserial::logging;

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            let err = AppError::from(err);
            eprintln!("Error: {}", err);
            return err.exit_code();
        }
    };
    logging::init_tracing(&config.logging, cli.log_level.as_deref());

    let result = cli
        .invocation()
        .map_err(AppError::from)
        .and_then(|invocation| bridge::run(&invocation, &config));

    match result {
        Ok(report) => report.exit_code(),
        Err(err) => {
            if !err.is_reported() {
                tracing::error!("{}", err);
            }
            err.exit_code()
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}
