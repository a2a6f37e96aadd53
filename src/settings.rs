use std::time::Duration;

use clap::Parser;

/// Runtime settings for the relay.
///
/// Designed to be flattened into a host binary's CLI; every knob also
/// binds to an environment variable. The debug switch accepts `0`/`1`
/// alongside `true`/`false`, matching the convar style of the game-server
/// environments this layer grew up in.
#[derive(Debug, Clone, Parser)]
pub struct RelaySettings {
    /// Connection string, `key=value;` or URI form.
    #[arg(long = "mysql-connection-string", env = "MYSQL_CONNECTION_STRING")]
    pub connection_string: String,

    /// Log every statement with its timing, not just slow ones.
    // bool fields default to SetTrue, which takes no value; Set routes
    // `--mysql-debug 1` through parse_switch.
    #[arg(
        long = "mysql-debug",
        env = "MYSQL_DEBUG",
        default_value = "0",
        action = clap::ArgAction::Set,
        value_parser = parse_switch
    )]
    pub debug: bool,

    /// Slow-query warning threshold in milliseconds.
    #[arg(
        long = "mysql-slow-query-warning",
        env = "MYSQL_SLOW_QUERY_WARNING",
        default_value_t = 500
    )]
    pub slow_query_warning_ms: u64,

    /// Keep-alive probe interval in seconds; 0 disables probing.
    #[arg(long = "mysql-keep-alive", env = "MYSQL_KEEP_ALIVE", default_value_t = 0)]
    pub keep_alive_secs: u64,
}

impl RelaySettings {
    /// Programmatic construction with the same defaults as the CLI.
    #[must_use]
    pub fn new(connection_string: impl Into<String>) -> Self {
        RelaySettings {
            connection_string: connection_string.into(),
            debug: false,
            slow_query_warning_ms: 500,
            keep_alive_secs: 0,
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_slow_query_warning_ms(mut self, ms: u64) -> Self {
        self.slow_query_warning_ms = ms;
        self
    }

    #[must_use]
    pub fn with_keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    /// The slow-query threshold as a `Duration`.
    #[must_use]
    pub fn slow_query_warning(&self) -> Duration {
        Duration::from_millis(self.slow_query_warning_ms)
    }
}

fn parse_switch(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(format!("expected 0/1 or true/false, got `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let settings = RelaySettings::try_parse_from([
            "host",
            "--mysql-connection-string",
            "mysql://db1/game",
        ])
        .unwrap();
        assert!(!settings.debug);
        assert_eq!(settings.slow_query_warning_ms, 500);
        assert_eq!(settings.keep_alive_secs, 0);
        assert_eq!(settings.slow_query_warning(), Duration::from_millis(500));
    }

    #[test]
    fn debug_switch_accepts_numeric_form() {
        let settings = RelaySettings::try_parse_from([
            "host",
            "--mysql-connection-string",
            "mysql://db1/game",
            "--mysql-debug",
            "1",
        ])
        .unwrap();
        assert!(settings.debug);

        let settings = RelaySettings::try_parse_from([
            "host",
            "--mysql-connection-string",
            "mysql://db1/game",
            "--mysql-debug",
            "0",
        ])
        .unwrap();
        assert!(!settings.debug);
    }

    #[test]
    fn debug_switch_accepts_word_form() {
        let settings = RelaySettings::try_parse_from([
            "host",
            "--mysql-connection-string",
            "mysql://db1/game",
            "--mysql-debug=true",
        ])
        .unwrap();
        assert!(settings.debug);
    }

    #[test]
    fn switch_parser_covers_both_spellings() {
        assert_eq!(parse_switch("1"), Ok(true));
        assert_eq!(parse_switch("true"), Ok(true));
        assert_eq!(parse_switch("0"), Ok(false));
        assert_eq!(parse_switch("FALSE"), Ok(false));
        assert!(parse_switch("maybe").is_err());
    }

    #[test]
    fn builder_methods_mirror_the_cli() {
        let settings = RelaySettings::new("mysql://db1/game")
            .with_debug(true)
            .with_slow_query_warning_ms(250)
            .with_keep_alive_secs(30);
        assert!(settings.debug);
        assert_eq!(settings.slow_query_warning(), Duration::from_millis(250));
        assert_eq!(settings.keep_alive_secs, 30);
    }
}
