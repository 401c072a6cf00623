//! Logger setup for the command line binary

use std::path::Path;
use std::time::SystemTime;

use fern::colors::{Color, ColoredLevelConfig};
use fern::Dispatch;
use log::{info, LevelFilter};

/// Parses a level name such as `info` or `DEBUG`, defaulting to Info
pub fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or(LevelFilter::Info)
}

/// Installs a dispatcher writing colored lines to stderr and plain lines to
/// `log_file` when given.
pub fn initialize(level: LevelFilter, log_file: Option<&Path>) -> Result<(), String> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::Magenta)
        .debug(Color::Blue)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    let console = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message}",
                date = humantime::format_rfc3339_seconds(SystemTime::now()),
                level = colors.color(record.level()),
                message = message,
            ))
        })
        .chain(std::io::stderr());

    let mut dispatch = Dispatch::new()
        .level(level)
        // reqwest/hyper internals are noisy below warn
        .level_for("hyper", LevelFilter::Warn)
        .level_for("hyper_util", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(console);

    if let Some(path) = log_file {
        crate::paths::ensure_parent_dir(path)?;
        let file = fern::log_file(path)
            .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;

        dispatch = dispatch.chain(
            Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "[{date} - {level}] {message} [{file}:{line}]",
                        date = humantime::format_rfc3339(SystemTime::now()),
                        level = record.level(),
                        message = message,
                        file = record.file().unwrap_or("unknown"),
                        line = record.line().unwrap_or(0),
                    ))
                })
                .chain(file),
        );
    }

    dispatch
        .apply()
        .map_err(|e| format!("Failed to initialize logger: {}", e))?;

    info!("Logger initialized: level={:?}", level);
    Ok(())
}
