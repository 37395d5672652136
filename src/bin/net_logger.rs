//! CSV/JSONL replay sender: reads telemetry rows from a directory or a
//! single file and sends each row as one UDP datagram to the analyzer.
//!
//! Usage:
//!   cargo run --bin net_logger -- data/
//!   cargo run --bin net_logger -- --json data/merged.jsonl --rate 2000
//!   cargo run --bin net_logger -- --accel 100 --once data/volve_like.csv

use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "net_logger")]
#[command(about = "Replays CSV/JSONL telemetry rows over UDP for net-analyzer")]
#[command(version)]
struct CliArgs {
    /// Timestamp-delta acceleration factor (CSV mode only).
    #[arg(short = 'a', long, default_value_t = 50.0)]
    accel: f64,

    /// Send the input once and exit instead of looping forever.
    #[arg(short = '1', long)]
    once: bool,

    /// Append a `src=<path>` field to each outgoing line.
    #[arg(short = 's', long)]
    append_source: bool,

    /// Treat PATH as a newline-delimited JSON file instead of CSV.
    #[arg(short = 'j', long)]
    json: Option<PathBuf>,

    /// Fixed packets/second in JSON mode.
    #[arg(short = 'r', long, default_value_t = 10000.0)]
    rate: f64,

    /// UDP destination.
    #[arg(long, default_value = "127.0.0.1:9000")]
    target: String,

    /// CSV file, CSV directory, or (with --json) a JSONL file. Defaults to
    /// auto-detecting `data/merged.jsonl` under `data/`.
    path: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let accel = if args.accel <= 0.0 { 10.0 } else { args.accel };
    let rate = if args.rate <= 0.0 { 1.0 } else { args.rate };

    let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind sender socket")?;
    socket.connect(&args.target).with_context(|| format!("failed to connect to {}", args.target))?;
    tracing::info!(target = %args.target, accel, "net_logger starting");

    let (json_path, csv_path) = resolve_source(&args)?;

    if let Some(jpath) = json_path {
        run_json(&socket, &jpath, rate, args.once, args.append_source)
    } else if let Some(path) = csv_path {
        let files = resolve_csv_files(&path)?;
        run_csv_merge(&socket, &files, accel, args.once, args.append_source)
    } else {
        anyhow::bail!("no input source resolved");
    }
}

/// Decide between JSON and CSV mode, applying the auto-detect rule: if the
/// caller neither passed `--json` nor an explicit path, prefer
/// `data/merged.jsonl` when it exists.
fn resolve_source(args: &CliArgs) -> Result<(Option<PathBuf>, Option<PathBuf>)> {
    if let Some(jpath) = &args.json {
        return Ok((Some(jpath.clone()), None));
    }

    let src = args.path.clone().unwrap_or_else(|| PathBuf::from("data"));
    if args.path.is_none() {
        let candidate = src.join("merged.jsonl");
        if candidate.is_file() {
            tracing::info!(path = %candidate.display(), "auto-detected merged.jsonl");
            return Ok((Some(candidate), None));
        }
    }
    Ok((None, Some(src)))
}

/// Expand a CSV source into a sorted list of files: the path itself if it's
/// a file, or every `*.csv` inside it (lexicographic order) if it's a
/// directory.
fn resolve_csv_files(src: &Path) -> Result<Vec<PathBuf>> {
    if src.is_file() {
        return Ok(vec![src.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(src)
        .with_context(|| format!("cannot open directory {}", src.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect();
    if files.is_empty() {
        anyhow::bail!("no CSV files found in {}", src.display());
    }
    files.sort();
    Ok(files)
}

fn run_json(socket: &UdpSocket, path: &Path, rate: f64, once: bool, append_source: bool) -> Result<()> {
    let period = Duration::from_secs_f64(1.0 / rate);
    loop {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            send_line(socket, &line, append_source.then(|| path));
            std::thread::sleep(period);
        }
        if once {
            break;
        }
    }
    Ok(())
}

/// One file's CSV replay cursor: the next unread data row and its
/// timestamp, used as the merge key in [`run_csv_merge`]'s min-heap.
struct CsvCursor {
    reader: BufReader<File>,
    path: PathBuf,
    next_line: String,
    next_ts: i64,
}

impl CsvCursor {
    fn open(path: &Path) -> Result<Option<Self>> {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        let mut reader = BufReader::new(file);
        match read_next_row(&mut reader)? {
            Some((line, ts)) => Ok(Some(Self { reader, path: path.to_path_buf(), next_line: line, next_ts: ts })),
            None => Ok(None),
        }
    }

    /// Advance past the currently-held row, returning the row that was held.
    fn advance(mut self) -> Result<(String, Option<Self>)> {
        let line = self.next_line;
        match read_next_row(&mut self.reader)? {
            Some((next_line, next_ts)) => {
                self.next_line = next_line;
                self.next_ts = next_ts;
                Ok((line, Some(self)))
            }
            None => Ok((line, None)),
        }
    }
}

/// Reads lines until one is a well-formed `ts,...` data row (skipping a
/// leading `timestamp,...` header and blank lines), returning it and its
/// parsed leading timestamp.
fn read_next_row(reader: &mut BufReader<File>) -> Result<Option<(String, i64)>> {
    let mut buf = String::new();
    loop {
        buf.clear();
        let n = reader.read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        let line = buf.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }
        if line.starts_with("timestamp") {
            continue;
        }
        let Some((ts_field, _)) = line.split_once(',') else { continue };
        let Ok(ts) = ts_field.trim().parse::<i64>() else { continue };
        return Ok(Some((line.to_string(), ts)));
    }
}

/// Min-heap entry ordered by ascending timestamp (reversed so
/// `BinaryHeap`, a max-heap, yields the smallest timestamp first).
struct HeapEntry(CsvCursor);

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.next_ts == other.0.next_ts
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.0.next_ts.cmp(&self.0.next_ts)
    }
}

/// Merge every CSV file by ascending timestamp, waiting `(dt_next -
/// dt_prev) / accel` seconds between sends, looping the whole merged pass
/// unless `once` is set.
fn run_csv_merge(socket: &UdpSocket, files: &[PathBuf], accel: f64, once: bool, append_source: bool) -> Result<()> {
    loop {
        let mut heap = BinaryHeap::new();
        for path in files {
            if let Some(cursor) = CsvCursor::open(path)? {
                heap.push(HeapEntry(cursor));
            }
        }
        if heap.is_empty() {
            anyhow::bail!("no data found in {} file(s)", files.len());
        }

        let mut prev_sent_ts: Option<i64> = None;
        while let Some(HeapEntry(cursor)) = heap.pop() {
            let ts = cursor.next_ts;
            if let Some(prev) = prev_sent_ts {
                let dt = ts - prev;
                if dt > 0 {
                    std::thread::sleep(Duration::from_secs_f64(dt as f64 / accel));
                }
            }
            prev_sent_ts = Some(ts);

            let path = cursor.path.clone();
            let (line, next_cursor) = cursor.advance()?;
            send_line(socket, &line, append_source.then_some(path.as_path()));
            if let Some(next_cursor) = next_cursor {
                heap.push(HeapEntry(next_cursor));
            }
        }

        if once {
            break;
        }
    }
    Ok(())
}

fn send_line(socket: &UdpSocket, line: &str, source: Option<&Path>) {
    let outgoing = match source {
        Some(path) => format!("{line},src={}", path.display()),
        None => line.to_string(),
    };
    if let Err(e) = socket.send(outgoing.as_bytes()) {
        tracing::warn!(error = %e, "failed to send datagram");
        return;
    }
    tracing::debug!(line = %outgoing, "sent");
}
