//! `appup` launcher.
//!
//! # Responsibility
//! - Parse `-c <config>` and load the runtime configuration.
//! - Initialize logging, run the runtime, exit with its status code.

use appup_core::{
    default_log_level, init_launcher_logging, Runtime, RuntimeConfig, TypeCatalog,
};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const USAGE_EXIT_CODE: u8 = 10;
const DEFAULT_LOG_DIR: &str = "logs";

fn main() -> ExitCode {
    let config_path = match parse_args(std::env::args().skip(1)) {
        Ok(path) => path,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("usage: appup [-c <config.toml>]");
            return ExitCode::from(USAGE_EXIT_CODE);
        }
    };

    let config = match &config_path {
        Some(path) => match RuntimeConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("Error starting application: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => RuntimeConfig::default(),
    };

    let level = config
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
    match std::path::absolute(&log_dir) {
        Ok(log_dir) => {
            if let Err(err) = init_launcher_logging(&level, &log_dir.to_string_lossy()) {
                eprintln!("logging disabled: {err}");
            }
        }
        Err(err) => eprintln!("logging disabled: {err}"),
    }
    info!(
        "event=launcher_start module=cli status=ok version={} config={}",
        appup_core::core_version(),
        config_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    let mut runtime = Runtime::new(config, Arc::new(TypeCatalog::new()));
    let code = runtime.run();
    info!("event=launcher_exit module=cli status=ok exit_code={code}");
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Option<PathBuf>, String> {
    let mut args = args;
    let mut config = None;
    while let Some(arg) = args.next() {
        if arg == "-c" {
            let value = args
                .next()
                .ok_or_else(|| "Invalid arguments: -c requires a file".to_string())?;
            let path = PathBuf::from(value);
            if !path.is_file() {
                return Err(format!("No such file: {}", path.display()));
            }
            config = Some(path);
        }
    }
    Ok(config)
}
