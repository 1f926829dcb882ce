use slog::{o, Drain, Level, Logger};
use std::{str::FromStr, sync::Mutex};

/// Root logger writing to the terminal, filtered at `level`.
pub fn terminal_logger(level: Level) -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build();
    let drain = Mutex::new(drain).fuse();
    let drain = slog::LevelFilter::new(drain, level).fuse();

    Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

/// Logger that drops everything; used by tests and as a library default.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}

pub fn parse_level(level: &str) -> Result<Level, String> {
    Level::from_str(level).map_err(|_| format!("Invalid log level: {level}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("info").unwrap(), Level::Info);
        assert_eq!(parse_level("debug").unwrap(), Level::Debug);
        assert!(parse_level("loud").is_err());
    }
}
