use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;

use rlepipe::cli::Cli;
use rlepipe::{PipelineDriver, RleError};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), RleError> {
    let config = Arc::new(cli.resolve_config()?);
    log::debug!("rlepipe {} with {:?}", rlepipe::VERSION, config);

    let driver = PipelineDriver::new(config);
    let (mut stdout, _summary) = driver.run_files_buffered(&cli.files, io::stdout())?;
    stdout.flush()?;
    Ok(())
}

/// Logs go to stderr; stdout carries only encoded data. `RUST_LOG`, when set,
/// overrides the level chosen with `-v`.
fn init_logging(level: LevelFilter) {
    let mut builder = env_logger::Builder::new();

    builder.filter_level(level);
    builder.parse_default_env();

    // Custom formatter: just print the level and message
    builder.format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));

    let _ = builder.try_init();
}
