use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
    /// Appended to; used by the terminal UI so output does not tear the screen.
    File(PathBuf),
}

pub fn parse_level(level: &str) -> Option<LevelFilter> {
    let lvl = match level.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return None,
    };
    Some(lvl)
}

pub fn init_logger(level: LevelFilter, target: LogTarget) {
    let mut builder = env_logger::Builder::new();
    builder
        .format(move |buf, record| {
            writeln!(
                buf,
                "{} {}: {} - {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter_level(level);

    match target {
        LogTarget::Stdout => {
            builder.target(env_logger::Target::Stdout);
        }
        LogTarget::Stderr => {
            builder.target(env_logger::Target::Stderr);
        }
        LogTarget::File(path) => {
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => {
                    eprintln!("Could not open log file {}: {}", path.display(), e);
                    builder.filter_level(LevelFilter::Off);
                }
            }
        }
    }

    let _ = builder.try_init();

    log::set_max_level(level);
}

/// Returns false for an unrecognised level name.
pub fn set_log_level(level: &str, target: LogTarget) -> bool {
    match parse_level(level) {
        Some(lvl) => {
            init_logger(lvl, target);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("WARNING"), Some(LevelFilter::Warn));
        assert_eq!(parse_level("Trace"), Some(LevelFilter::Trace));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn unknown_levels_are_rejected() {
        assert!(!set_log_level("verbose", LogTarget::Stderr));
    }
}
