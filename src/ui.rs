//! ASCII terminal dashboard: a 5-second cooperative tick that redraws a
//! framed panel of queue depths, cumulative counts, EMA-smoothed
//! throughput, windowed totals, and the rolling average prediction error
//! (or the most recent error, if one occurred this tick).
//!
//! State machine: `Idle -> Drain -> Snapshot -> Render -> Sleep(5s) -> ...`,
//! terminal when `running` is cleared (process-level `SIGINT`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::Channel;
use crate::stats::{Counter, CountsSnapshot, StatsRegistry};

const TICK: Duration = Duration::from_secs(5);
const EMA_ALPHA: f64 = 0.3;
const WINDOW_SECS: i64 = 60;

struct Ema {
    value: f64,
    initialized: bool,
}

impl Ema {
    fn new() -> Self {
        Self { value: 0.0, initialized: false }
    }

    fn update(&mut self, sample: f64) -> f64 {
        if !self.initialized {
            self.value = sample;
            self.initialized = true;
        } else {
            self.value = EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * self.value;
        }
        self.value
    }
}

pub struct Queues {
    pub raw: Arc<Channel>,
    pub proc: Arc<Channel>,
    pub repr: Arc<Channel>,
    pub error: Arc<Channel>,
}

/// Stdout is written through one mutex so a UI frame is never interleaved
/// with a `tracing` log line from another stage.
static STDOUT_LOCK: Mutex<()> = Mutex::new(());

fn render_frame(
    queues: &Queues,
    counts: CountsSnapshot,
    rates: (f64, f64, f64),
    windowed_received: u64,
    windowed_represented: u64,
    avg_error: f64,
    last_error: Option<&str>,
) {
    let _guard = STDOUT_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    print!("\u{1b}[2J\u{1b}[H");
    println!("┌─ net-analyzer ──────────────────────────────────────────┐");
    println!(
        "│ queues   raw={:<6} proc={:<6} repr={:<6} error={:<6} │",
        queues.raw.len(),
        queues.proc.len(),
        queues.repr.len(),
        queues.error.len()
    );
    println!(
        "│ totals   received={:<10} processed={:<10} represented={:<10} │",
        counts.received, counts.processed, counts.represented
    );
    println!(
        "│ rate/s   received={:<8.2} processed={:<8.2} represented={:<8.2} │",
        rates.0, rates.1, rates.2
    );
    println!(
        "│ window({WINDOW_SECS}s)  received={windowed_received:<10} represented={windowed_represented:<10} │"
    );
    match last_error {
        Some(err) => println!("│ last error: {err:<47} │"),
        None => println!("│ avg pred error ({WINDOW_SECS}s): {avg_error:<34.6} │"),
    }
    println!("└─────────────────────────────────────────────────────────┘");
}

/// Runs the UI stage until `running` is cleared.
pub fn run(queues: Queues, stats: Arc<StatsRegistry>, running: Arc<AtomicBool>) {
    tracing::info!("ui stage started");

    let mut last_counts = stats.snapshot_counts();
    let mut ema_received = Ema::new();
    let mut ema_processed = Ema::new();
    let mut ema_represented = Ema::new();

    while running.load(Ordering::SeqCst) {
        let mut last_error: Option<String> = None;
        while let Some(line) = queues.error.try_pop() {
            last_error = Some(line);
        }

        let counts = stats.snapshot_counts();
        let delta_received = counts.received.saturating_sub(last_counts.received) as f64;
        let delta_processed = counts.processed.saturating_sub(last_counts.processed) as f64;
        let delta_represented = counts.represented.saturating_sub(last_counts.represented) as f64;
        last_counts = counts;

        let rate_received = ema_received.update(delta_received / TICK.as_secs_f64());
        let rate_processed = ema_processed.update(delta_processed / TICK.as_secs_f64());
        let rate_represented = ema_represented.update(delta_represented / TICK.as_secs_f64());

        let windowed_received = stats.rate_window(Counter::Received, WINDOW_SECS);
        let windowed_represented = stats.rate_window(Counter::Represented, WINDOW_SECS);
        let avg_error = stats.average_error_window(WINDOW_SECS);

        render_frame(
            &queues,
            counts,
            (rate_received, rate_processed, rate_represented),
            windowed_received,
            windowed_represented,
            avg_error,
            last_error.as_deref(),
        );

        std::thread::sleep(TICK);
    }

    tracing::info!("ui stage shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_first_sample_is_the_value_itself() {
        let mut ema = Ema::new();
        assert_eq!(ema.update(10.0), 10.0);
    }

    #[test]
    fn ema_blends_toward_new_samples() {
        let mut ema = Ema::new();
        ema.update(10.0);
        let next = ema.update(0.0);
        assert!((next - 7.0).abs() < 1e-9); // 0.3*0 + 0.7*10
    }
}
