//! The crick command-line driver: run a C-like source file.
//!
//! ```text
//! crick [--stack-size BYTES] file.c
//! ```
//!
//! Top-level statements run as they are parsed; if the program defines
//! `main()`, it is called afterwards and its return value becomes the
//! process exit code. Logging is configured from `CRICK_*` environment
//! variables (see `crick_log`).

use crick_engine::{Engine, EngineOptions};
use std::process::ExitCode;
use tracing::debug;

mod platform;

fn usage() -> ExitCode {
    eprintln!("usage: crick [--stack-size BYTES] file.c");
    ExitCode::from(2)
}

fn main() -> ExitCode {
    if let Err(err) = crick_log::Logger::init(crick_log::LoggerConfig::from_env("CRICK")) {
        eprintln!("crick: logging disabled: {}", err);
    }

    let mut options = EngineOptions::default();
    if let Ok(size) = std::env::var("CRICK_STACK_SIZE") {
        match size.parse() {
            Ok(bytes) => options.stack_size = bytes,
            Err(_) => {
                eprintln!("crick: bad CRICK_STACK_SIZE '{}'", size);
                return ExitCode::from(2);
            }
        }
    }

    let mut file: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stack-size" => {
                let Some(bytes) = args.next().and_then(|v| v.parse().ok()) else {
                    return usage();
                };
                options.stack_size = bytes;
            }
            _ if file.is_none() => file = Some(arg),
            _ => return usage(),
        }
    }
    let Some(file) = file else {
        return usage();
    };

    let source = match std::fs::read_to_string(&file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("crick: {}: {}", file, err);
            return ExitCode::from(2);
        }
    };

    let mut engine = Engine::new(options);
    platform::install(&mut engine);

    if let Err(err) = engine.run(&file, &source) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    if let Some(code) = engine.exit_value {
        debug!(code, "program exited from top level");
        return ExitCode::from(code as u8);
    }

    match engine.call_main() {
        Ok(Some(code)) => ExitCode::from(code as u8),
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
