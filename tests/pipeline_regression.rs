use std::sync::Arc;
use std::thread;

use net_analyzer::channel::Channel;
use net_analyzer::predictor::PredictorConfig;
use net_analyzer::preprocess::PreprocessConfig;
use net_analyzer::stats::StatsRegistry;
use net_analyzer::{predictor, preprocess, representer};
use tempfile::tempdir;

/// Drives three raw JSON datapoints and one malformed line through
/// preprocess -> predictor -> representer wired with real threads and
/// channels, then checks the accounting invariants.
#[test]
fn end_to_end_pipeline_preserves_counter_ordering() {
    let dir = tempdir().unwrap();
    let raw = Arc::new(Channel::new());
    let proc = Arc::new(Channel::new());
    let repr = Arc::new(Channel::new());
    let error = Arc::new(Channel::new());
    let stats = Arc::new(StatsRegistry::new());

    let preprocess_handle = {
        let raw = raw.clone();
        let proc = proc.clone();
        let error = error.clone();
        let stats = stats.clone();
        let config = PreprocessConfig { data_dir: dir.path().to_path_buf() };
        thread::spawn(move || preprocess::run(config, raw, proc, error, stats))
    };

    let predictor_handle = {
        let proc = proc.clone();
        let repr = repr.clone();
        let stats = stats.clone();
        let config = PredictorConfig { data_dir: dir.path().to_path_buf(), hidden_sizes: vec![4], learning_rate: 0.1 };
        thread::spawn(move || predictor::run(config, proc, repr, stats))
    };

    let representer_handle = {
        let repr = repr.clone();
        let error = error.clone();
        thread::spawn(move || representer::run(repr, error, None))
    };

    for i in 0..3 {
        let ts = 1700000000 + i;
        raw.push(format!(
            r#"{{"timestamp":{ts},"export_bytes":1000000,"export_flows":50,"export_packets":1000,"export_rtr":1.0,"export_rtt":2000,"export_srt":3000}}"#
        ));
    }
    raw.push("{}".to_string());
    raw.close();

    preprocess_handle.join().unwrap();
    predictor_handle.join().unwrap();
    representer_handle.join().unwrap();

    let counts = stats.snapshot_counts();
    assert_eq!(counts.received, 0, "ingest stage was not part of this harness");
    assert_eq!(counts.processed, 3, "the malformed {{}} line must not be counted as processed");
    assert_eq!(counts.represented, 3);
    assert!(counts.processed >= counts.represented);

    let mut error_lines = Vec::new();
    while let Some(line) = error.try_pop() {
        error_lines.push(line);
    }
    assert!(error_lines.iter().any(|l| l == "{}"), "malformed record should reach the error channel");
}
