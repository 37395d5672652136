//! Preprocess stage: classify each `raw` line as JSON or legacy CSV, parse
//! it, append a history record, and emit either a normalized CSV line or
//! the legacy line unchanged onto `proc`. Malformed/empty records are
//! routed to `error` and `processed` is not incremented for them.

use std::path::PathBuf;
use std::sync::Arc;

use crate::channel::Channel;
use crate::datapoint::{is_json_payload, parse_json, parse_legacy_csv};
use crate::error::PreprocessError;
use crate::predictor::history::{self, HistoryEntry};
use crate::stats::{Counter, StatsRegistry};

pub struct PreprocessConfig {
    pub data_dir: PathBuf,
}

fn history_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("log_history.bin")
}

/// Process one `raw` line, returning the line to push onto `proc` (and the
/// history record to persist) on success, or the typed parse failure
/// otherwise.
pub fn process_line(line: &str) -> Result<(String, HistoryEntry), PreprocessError> {
    if is_json_payload(line) {
        let dp = parse_json(line);
        if dp.is_all_nan() {
            return Err(PreprocessError::EmptyDatapoint);
        }
        let (in0, in1) = dp.history_key();
        let entry = HistoryEntry { ts_ms: dp.ts_ms(), in0, in1 };
        Ok((dp.to_proc_line(), entry))
    } else {
        let rec = parse_legacy_csv(line)?;
        let (in0, in1) = rec.history_key();
        let entry = HistoryEntry { ts_ms: rec.ts, in0, in1 };
        Ok((line.to_string(), entry))
    }
}

/// Runs the preprocess stage to completion: pops lines off `raw`, parses,
/// persists history, and pushes onto `proc` or `error`. Exits once `raw`
/// is closed and drained, then closes `proc`.
pub fn run(config: PreprocessConfig, raw: Arc<Channel>, proc: Arc<Channel>, error: Arc<Channel>, stats: Arc<StatsRegistry>) {
    tracing::info!("preprocess stage started");
    let hpath = history_path(&config.data_dir);

    while let Some(line) = raw.pop() {
        match process_line(&line) {
            Ok((proc_line, entry)) => {
                if let Err(e) = history::append(&hpath, entry) {
                    tracing::warn!(error = %e, "failed to append history record, continuing");
                }
                proc.push(proc_line);
                stats.increment(Counter::Processed);
            }
            Err(e) => {
                tracing::warn!(line = %line, error = %e, "malformed or empty record");
                error.push(line);
            }
        }
    }

    proc.close();
    tracing::info!("preprocess stage shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_happy_path() {
        let raw = r#"{"timestamp":1700000000,"export_bytes":1234567,"export_flows":50,"export_packets":1000,"export_rtr":1.0,"export_rtt":2000,"export_srt":3000}"#;
        let (proc_line, entry) = process_line(raw).unwrap();
        assert_eq!(
            proc_line,
            "1700000000000,1234567.000000,50.000000,1000.000000,1.000000,2000.000000,3000.000000"
        );
        assert_eq!(entry.ts_ms, 1700000000000);
    }

    #[test]
    fn legacy_csv_forwarded_unchanged() {
        let raw = "1700000000,1500,1500";
        let (proc_line, entry) = process_line(raw).unwrap();
        assert_eq!(proc_line, "1700000000,1500,1500");
        assert_eq!(entry.ts_ms, 1700000000);
        assert!((entry.in0 - 0.75).abs() < 1e-6);
        assert!((entry.in1 - 0.75).abs() < 1e-6);
    }

    #[test]
    fn negative_legacy_field_routes_to_error() {
        let err = process_line("1700000000,-5,10").unwrap_err();
        assert!(matches!(err, PreprocessError::NegativeField { field: "bs", value: -5 }));
    }

    #[test]
    fn empty_json_routes_to_error() {
        let err = process_line("{}").unwrap_err();
        assert!(matches!(err, PreprocessError::EmptyDatapoint));
    }
}
