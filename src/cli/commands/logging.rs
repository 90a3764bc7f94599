use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity order; the index is the `-v` count.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn parse_level(level: &str) -> Result<u8, String> {
    let level = level.trim();
    if let Ok(count) = level.parse::<u8>() {
        return if usize::from(count) < LEVELS.len() {
            Ok(count)
        } else {
            Err(format!("verbosity must be below {}", LEVELS.len()))
        };
    }

    LEVELS
        .iter()
        .position(|name| name.eq_ignore_ascii_case(level))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("invalid log level '{level}', expected one of: {}", LEVELS.join(", ")))
}

/// Accepts a level name or a verbosity count, used for `ASTEWAI_LOG_LEVEL`.
#[must_use]
pub fn log_level_parser() -> ValueParser {
    ValueParser::from(parse_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log level: -v warn, -vv info, -vvv debug, -vvvv trace (default: error)")
            .env("ASTEWAI_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(log_level_parser()),
    )
}
