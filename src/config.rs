//! Layered configuration: CLI flags take precedence over environment
//! variables, which take precedence over compiled-in defaults, all
//! resolved through one `clap` derive struct (`env` attributes) rather
//! than a separate `AppConfig::from_env()` plus `CliArgs` split.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "net-analyzer")]
#[command(about = "UDP-ingest streaming analyzer for network-telemetry records")]
#[command(version)]
pub struct CliArgs {
    /// UDP bind address for the ingest socket.
    #[arg(long, env = "NET_ANALYZER_BIND", default_value = "0.0.0.0:9000")]
    pub bind: String,

    /// Directory for `log_history.bin` and `nn_weights.bin`.
    #[arg(long, env = "NET_ANALYZER_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Comma-separated hidden layer sizes, e.g. "16,32,64,32".
    #[arg(long, env = "NET_ANALYZER_HIDDEN", default_value = "16,32,64,32")]
    pub hidden: String,

    /// Online SGD learning rate.
    #[arg(long, env = "NET_ANALYZER_LEARNING_RATE", default_value_t = 0.1)]
    pub learning_rate: f64,

    /// Run every stage except the UI (useful for tests/CI).
    #[arg(long, env = "NET_ANALYZER_NO_UI")]
    pub no_ui: bool,

    /// Log output format.
    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// The resolved runtime configuration, built once in `main` and handed to
/// stage constructors by reference or clone. No stage reads the
/// environment or the CLI directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub data_dir: PathBuf,
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub no_ui: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--hidden must be a non-empty comma-separated list of positive integers, got {0:?}")]
    InvalidHidden(String),
}

impl CliArgs {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let hidden_layers = parse_hidden(&self.hidden)?;
        Ok(Config {
            bind: self.bind,
            data_dir: self.data_dir,
            hidden_layers,
            learning_rate: self.learning_rate,
            no_ui: self.no_ui,
        })
    }
}

fn parse_hidden(raw: &str) -> Result<Vec<usize>, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::InvalidHidden(raw.to_string()));
    }
    raw.split(',')
        .map(|tok| tok.trim().parse::<usize>().map_err(|_| ConfigError::InvalidHidden(raw.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_hidden_list() {
        assert_eq!(parse_hidden("8,8").unwrap(), vec![8, 8]);
    }

    #[test]
    fn rejects_empty_hidden_list() {
        assert!(parse_hidden("").is_err());
    }

    #[test]
    fn rejects_non_numeric_token() {
        assert!(parse_hidden("8,x").is_err());
    }

    #[test]
    fn cli_overrides_produce_expected_config() {
        let args = CliArgs::parse_from([
            "net-analyzer",
            "--bind",
            "127.0.0.1:19000",
            "--hidden",
            "8,8",
            "--learning-rate",
            "0.05",
        ]);
        let config = args.into_config().unwrap();
        assert_eq!(config.bind, "127.0.0.1:19000");
        assert_eq!(config.hidden_layers, vec![8, 8]);
        assert!((config.learning_rate - 0.05).abs() < 1e-12);
    }
}
