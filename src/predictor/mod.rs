//! Predictor stage: normalize, forward-pass, online-train, and persist.
//!
//! Owns the single six-wide MLP shared by both the JSON-origin path
//! (normalized via the fixed [`crate::datapoint::SCALE`] vector) and the
//! legacy two-input path (already-normalized `in0`/`in1`, zero-padded to
//! six features), so both record shapes train and predict against the
//! same weight tensors.

pub mod history;
pub mod mlp;
pub mod weights;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::channel::Channel;
use crate::datapoint::{Datapoint, LegacyRecord, INPUT_SIZE, SCALE};
use crate::stats::{Counter, StatsRegistry};
use mlp::Mlp;

fn normalize(raw: &[f64; INPUT_SIZE]) -> [f64; INPUT_SIZE] {
    let mut out = [0.0; INPUT_SIZE];
    for i in 0..INPUT_SIZE {
        out[i] = raw[i] / SCALE[i];
    }
    out
}

fn denormalize(norm: &[f64]) -> Vec<f64> {
    norm.iter().enumerate().map(|(i, v)| v * SCALE[i]).collect()
}

/// A six-wide input built either from a full datapoint (normalized by
/// scale) or a legacy two-input record (already normalized, zero-padded).
fn legacy_vector(in0: f32, in1: f32) -> [f64; INPUT_SIZE] {
    let mut v = [0.0; INPUT_SIZE];
    v[0] = in0 as f64;
    v[1] = in1 as f64;
    v
}

pub struct PredictorConfig {
    pub data_dir: PathBuf,
    pub hidden_sizes: Vec<usize>,
    pub learning_rate: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            hidden_sizes: vec![16, 32, 64, 32],
            learning_rate: 0.1,
        }
    }
}

pub struct Predictor {
    mlp: Mlp,
    data_dir: PathBuf,
    prev_input: Option<[f64; INPUT_SIZE]>,
}

fn weights_path(data_dir: &Path) -> PathBuf {
    data_dir.join("nn_weights.bin")
}

fn history_path(data_dir: &Path) -> PathBuf {
    data_dir.join("log_history.bin")
}

impl Predictor {
    /// Construct a predictor: random init, then attempt a weight-file
    /// load (tolerant of shape mismatch), then a warm-start sweep over
    /// the history file.
    pub fn init(config: &PredictorConfig) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut mlp = Mlp::new(&config.hidden_sizes, config.learning_rate, &mut rng);

        let wpath = weights_path(&config.data_dir);
        match File::open(&wpath) {
            Ok(f) => {
                let mut reader = std::io::BufReader::new(f);
                if let Err(e) = weights::load_mlp(&mut reader, &mut mlp) {
                    tracing::warn!(error = %e, path = %wpath.display(), "weight file did not fully match configured architecture; keeping random init for unmatched layers");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %wpath.display(), "no weight file found, starting from random init");
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %wpath.display(), "failed to open weight file, starting from random init");
            }
        }

        let mut predictor = Self {
            mlp,
            data_dir: config.data_dir.clone(),
            prev_input: None,
        };
        predictor.warm_start();
        predictor
    }

    /// One training step per history entry: the first entry bootstraps
    /// against itself (no prior sample exists yet), and every entry after
    /// it trains `(previous -> current)`, so `N` history entries always
    /// produce exactly `N` training steps. Returns the number of steps
    /// performed.
    fn warm_start(&mut self) -> u64 {
        let hpath = history_path(&self.data_dir);
        let entries = match history::load_all(&hpath) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, path = %hpath.display(), "history file corrupt, skipping warm start");
                return 0;
            }
        };
        let Some((first, rest)) = entries.split_first() else {
            return 0;
        };
        let mut steps = 0u64;
        let mut prev = legacy_vector(first.in0, first.in1);
        self.mlp.train_step(&prev, &prev);
        steps += 1;
        for entry in rest {
            let cur = legacy_vector(entry.in0, entry.in1);
            self.mlp.train_step(&prev, &cur);
            steps += 1;
            prev = cur;
        }
        tracing::info!(steps, "warm-start training sweep complete");
        steps
    }

    /// Best-effort atomic weight save (write temp, rename). Skips the
    /// write entirely if any weight or bias is NaN/Inf.
    fn save_weights(&self) {
        let has_non_finite = self
            .mlp
            .layers
            .iter()
            .flat_map(|l| l.neurons.iter())
            .any(|n| !n.bias.is_finite() || n.weights.iter().any(|w| !w.is_finite()));
        if has_non_finite {
            tracing::warn!("refusing to persist weights containing NaN/Inf");
            return;
        }
        let path = weights_path(&self.data_dir);
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "failed to create data directory for weight file");
                return;
            }
        }
        let tmp_path = path.with_extension("bin.tmp");
        let result = (|| -> std::io::Result<()> {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            weights::write_mlp(&mut writer, &self.mlp)?;
            Ok(())
        })();
        match result {
            Ok(()) => {
                if let Err(e) = std::fs::rename(&tmp_path, &path) {
                    tracing::warn!(error = %e, "failed to atomically rename weight file into place");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %tmp_path.display(), "failed to write weight file");
            }
        }
    }

    /// Run one training+predict step for a parsed JSON-origin datapoint.
    /// Returns the repr-channel lines to emit (pred_prev first, if any,
    /// then the always-emitted pred line) and the pre-update cost.
    pub fn step_datapoint(&mut self, dp: &Datapoint) -> (Vec<String>, f64) {
        let raw = dp.features();
        let normalized = normalize(&raw);
        self.step_inner(normalized, raw_repr(&raw))
    }

    /// Run one training+predict step for a legacy two-input record.
    pub fn step_legacy(&mut self, rec: &LegacyRecord) -> (Vec<String>, f64) {
        let (in0, in1) = rec.history_key();
        let normalized = legacy_vector(in0, in1);
        let raw = denormalize(&normalized);
        self.step_inner(normalized, raw)
    }

    fn step_inner(&mut self, normalized_current: [f64; INPUT_SIZE], raw_current: Vec<f64>) -> (Vec<String>, f64) {
        let mut lines = Vec::new();
        let mut cost = 0.0;

        if let Some(prev) = self.prev_input {
            cost = self.mlp.train_step(&prev, &normalized_current);
            let post_update_pred = denormalize(&self.mlp.predict(&prev));
            lines.push(format_pred_prev_line(&post_update_pred, &raw_current, cost));
            self.save_weights();
        }

        let current_pred = denormalize(&self.mlp.predict(&normalized_current));
        lines.push(format_pred_line(&current_pred, cost));

        self.prev_input = Some(normalized_current);
        (lines, cost)
    }

    pub fn hidden_sizes(&self) -> Vec<usize> {
        self.mlp.hidden_sizes()
    }

    #[cfg(test)]
    fn warm_start_for_test(&mut self) -> u64 {
        self.warm_start()
    }
}

fn raw_repr(features: &[f64; INPUT_SIZE]) -> Vec<f64> {
    features.to_vec()
}

fn format_pred_line(pred: &[f64], cost: f64) -> String {
    let mut s = String::from("pred");
    for v in pred {
        s.push(',');
        s.push_str(&format!("{v}"));
    }
    s.push_str(&format!(",cost,{cost}"));
    s
}

fn format_pred_prev_line(pred: &[f64], target: &[f64], cost: f64) -> String {
    let mut s = String::from("pred_prev,pred");
    for v in pred {
        s.push(',');
        s.push_str(&format!("{v}"));
    }
    s.push_str(",target");
    for v in target {
        s.push(',');
        s.push_str(&format!("{v}"));
    }
    s.push_str(&format!(",cost,{cost}"));
    s
}

/// Runs the predictor stage to completion: pops normalized CSV / forwarded
/// legacy lines off `proc`, trains, and pushes formatted lines to `repr`.
/// Exits (after a final weight flush) once `proc` is closed and drained,
/// then closes `repr` so the representer stage observes shutdown in turn.
pub fn run(config: PredictorConfig, proc: Arc<Channel>, repr: Arc<Channel>, stats: Arc<StatsRegistry>) {
    let mut predictor = Predictor::init(&config);
    tracing::info!(hidden = ?predictor.hidden_sizes(), "predictor stage started");

    while let Some(line) = proc.pop() {
        let fields: Vec<&str> = line.split(',').collect();
        let (lines, cost) = if fields.len() == 7 {
            match parse_proc_datapoint(&line) {
                Some(dp) => predictor.step_datapoint(&dp),
                None => {
                    tracing::warn!(%line, "predictor could not parse normalized CSV line");
                    continue;
                }
            }
        } else if fields.len() == 3 {
            match crate::datapoint::parse_legacy_csv(&line) {
                Ok(rec) => predictor.step_legacy(&rec),
                Err(e) => {
                    tracing::warn!(%line, error = %e, "predictor could not parse legacy line");
                    continue;
                }
            }
        } else {
            tracing::warn!(%line, "predictor received a proc line of unrecognized shape");
            continue;
        };

        stats.record_error(cost.abs());
        for l in lines {
            repr.push(l);
        }
        stats.increment(Counter::Represented);
    }

    predictor.save_weights();
    repr.close();
    tracing::info!("predictor stage shutting down, weights flushed");
}

fn parse_proc_datapoint(line: &str) -> Option<Datapoint> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 7 {
        return None;
    }
    let ts_ms: f64 = fields[0].parse().ok()?;
    Some(Datapoint {
        timestamp: ts_ms / 1000.0,
        export_bytes: fields[1].parse().ok()?,
        export_flows: fields[2].parse().ok()?,
        export_packets: fields[3].parse().ok()?,
        export_rtr: fields[4].parse().ok()?,
        export_rtt: fields[5].parse().ok()?,
        export_srt: fields[6].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> PredictorConfig {
        PredictorConfig {
            data_dir: dir.to_path_buf(),
            hidden_sizes: vec![4],
            learning_rate: 0.1,
        }
    }

    #[test]
    fn normalize_denormalize_round_trips_within_tolerance() {
        let raw = [1.0e6, 10.0, 500.0, 0.5, 100_000.0, 200_000.0];
        let normalized = normalize(&raw);
        let back = denormalize(&normalized);
        for (a, b) in raw.iter().zip(back.iter()) {
            let tol = a.abs() * 2f64.powi(-23).max(1e-9);
            assert!((a - b).abs() <= tol.max(1e-6), "{a} vs {b}");
        }
    }

    #[test]
    fn first_record_emits_only_a_pred_line() {
        let dir = tempdir().unwrap();
        let mut predictor = Predictor::init(&test_config(dir.path()));
        let dp = Datapoint {
            timestamp: 1700000000.0,
            export_bytes: 1234567.0,
            export_flows: 50.0,
            export_packets: 1000.0,
            export_rtr: 1.0,
            export_rtt: 2000.0,
            export_srt: 3000.0,
        };
        let (lines, _cost) = predictor.step_datapoint(&dp);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("pred,"));
    }

    #[test]
    fn second_identical_record_trains_and_emits_both_lines() {
        let dir = tempdir().unwrap();
        let mut predictor = Predictor::init(&test_config(dir.path()));
        let dp = Datapoint {
            timestamp: 1700000000.0,
            export_bytes: 1234567.0,
            export_flows: 50.0,
            export_packets: 1000.0,
            export_rtr: 1.0,
            export_rtt: 2000.0,
            export_srt: 3000.0,
        };
        predictor.step_datapoint(&dp);
        let (lines, cost) = predictor.step_datapoint(&dp);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("pred_prev,pred"));
        assert!(lines[1].starts_with("pred,"));
        assert!(cost.is_finite());
    }

    #[test]
    fn warm_start_performs_one_training_step_per_history_entry() {
        let dir = tempdir().unwrap();
        let hpath = history_path(dir.path());
        for i in 0..5i64 {
            history::append(
                &hpath,
                history::HistoryEntry { ts_ms: i, in0: 0.5, in1: 0.5 },
            )
            .unwrap();
        }
        let mut predictor = Predictor::init(&test_config(dir.path()));
        let steps = predictor.warm_start_for_test();
        assert_eq!(steps, 5, "5 history entries must produce exactly 5 training steps");
    }

    #[test]
    fn warm_start_on_a_single_entry_performs_one_bootstrap_step() {
        let dir = tempdir().unwrap();
        let hpath = history_path(dir.path());
        history::append(&hpath, history::HistoryEntry { ts_ms: 0, in0: 0.5, in1: 0.5 }).unwrap();
        let mut predictor = Predictor::init(&test_config(dir.path()));
        let steps = predictor.warm_start_for_test();
        assert_eq!(steps, 1);
    }
}
