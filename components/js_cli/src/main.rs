//! Corten Ejs CLI
//!
//! Entry point for the module runner. Parses CLI arguments and delegates
//! to the Runtime.

use clap::Parser as ClapParser;
use core_types::Value;
use js_cli::{Cli, Runtime};
use std::process::ExitCode;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = Runtime::from_cli(&cli).and_then(|mut runtime| runtime.execute(&cli));
    match result {
        Ok(Some(value)) => {
            if !matches!(value, Value::Undefined) {
                println!("{}", value);
            }
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", error);
            ExitCode::from(error.exit_code())
        }
    }
}
