//! The seven-field telemetry record, its permissive wire parsers, and the
//! fixed per-feature normalization scale.
//!
//! The JSON parser is deliberately not a general parser: it is a numeric
//! key-value extractor that walks the known field names and reads the
//! number that follows each one's `:`, tolerating quoted or bare keys,
//! extra whitespace, and trailing commas.

use crate::error::PreprocessError;

/// Number of network/feature channels the network predicts (excludes the
/// timestamp).
pub const INPUT_SIZE: usize = 6;
pub const OUTPUT_SIZE: usize = INPUT_SIZE;

/// Per-feature scale used to map raw magnitudes into the network's working
/// domain: `export_bytes, export_flows, export_packets, export_rtr,
/// export_rtt, export_srt`, in that order. Compiled-in hyperparameters, not
/// configuration.
pub const SCALE: [f64; INPUT_SIZE] = [
    3.1075704787e7,
    3.355433e2,
    2.864212e4,
    2.847470817e1,
    8.656777584e5,
    4.7823377e6,
];

const FIELD_NAMES: [&str; 7] = [
    "timestamp",
    "export_bytes",
    "export_flows",
    "export_packets",
    "export_rtr",
    "export_rtt",
    "export_srt",
];

/// A parsed telemetry record. Missing fields are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datapoint {
    pub timestamp: f64,
    pub export_bytes: f64,
    pub export_flows: f64,
    pub export_packets: f64,
    pub export_rtr: f64,
    pub export_rtt: f64,
    pub export_srt: f64,
}

impl Datapoint {
    pub fn all_nan() -> Self {
        Self {
            timestamp: f64::NAN,
            export_bytes: f64::NAN,
            export_flows: f64::NAN,
            export_packets: f64::NAN,
            export_rtr: f64::NAN,
            export_rtt: f64::NAN,
            export_srt: f64::NAN,
        }
    }

    /// The six network-facing feature values, in `SCALE` order.
    pub fn features(&self) -> [f64; INPUT_SIZE] {
        [
            self.export_bytes,
            self.export_flows,
            self.export_packets,
            self.export_rtr,
            self.export_rtt,
            self.export_srt,
        ]
    }

    /// True when every field (including timestamp) failed to parse.
    pub fn is_all_nan(&self) -> bool {
        self.timestamp.is_nan()
            && self.export_bytes.is_nan()
            && self.export_flows.is_nan()
            && self.export_packets.is_nan()
            && self.export_rtr.is_nan()
            && self.export_rtt.is_nan()
            && self.export_srt.is_nan()
    }

    /// `ts_ms = round(timestamp * 1000)`, used both for the normalized CSV
    /// line and the history record.
    pub fn ts_ms(&self) -> i64 {
        (self.timestamp * 1000.0).round() as i64
    }

    /// The normalized-CSV line emitted onto `proc`:
    /// `"{ts_ms},{export_bytes},...,{export_srt}"` with 6-digit fractions.
    pub fn to_proc_line(&self) -> String {
        format!(
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            self.ts_ms(),
            self.export_bytes,
            self.export_flows,
            self.export_packets,
            self.export_rtr,
            self.export_rtt,
            self.export_srt
        )
    }

    /// Two-channel projection used for the history file and the legacy
    /// two-input warm-start path: `in0 = export_bytes/1e6`,
    /// `in1 = export_flows/100`, both clamped to `[0,1]`, NaN mapped to 0.
    pub fn history_key(&self) -> (f32, f32) {
        let in0 = clamp01_or_zero(self.export_bytes / 1e6);
        let in1 = clamp01_or_zero(self.export_flows / 100.0);
        (in0, in1)
    }
}

fn clamp01_or_zero(x: f64) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0) as f32
    }
}

/// Classify a raw payload as JSON or legacy CSV per §4.3 step 1: JSON if
/// the first non-whitespace byte is `{` or the token `export_bytes`
/// appears anywhere in the payload.
pub fn is_json_payload(raw: &str) -> bool {
    raw.trim_start().starts_with('{') || raw.contains("export_bytes")
}

/// Extract a floating-point value following `key` (quoted or bare) in a
/// flat JSON-ish object, tolerating whitespace around `:` and a following
/// comma/brace. Returns `NaN` if the key is absent or its value fails to
/// parse as a float.
fn find_json_number(raw: &str, key: &str) -> f64 {
    let quoted = format!("\"{key}\"");
    let pos = raw.find(quoted.as_str()).map(|p| p + quoted.len()).or_else(|| {
        // Bare key: must not be a substring of a longer identifier, so
        // require a non-identifier boundary on both sides.
        let mut search_from = 0;
        while let Some(rel) = raw[search_from..].find(key) {
            let start = search_from + rel;
            let end = start + key.len();
            let before_ok = start == 0
                || !raw.as_bytes()[start - 1].is_ascii_alphanumeric() && raw.as_bytes()[start - 1] != b'_';
            let after_ok = end == raw.len()
                || !raw.as_bytes()[end].is_ascii_alphanumeric() && raw.as_bytes()[end] != b'_';
            if before_ok && after_ok {
                return Some(end);
            }
            search_from = end;
        }
        None
    });

    let Some(mut idx) = pos else {
        return f64::NAN;
    };

    let bytes = raw.as_bytes();
    // Skip to and past the ':'.
    while idx < bytes.len() && bytes[idx] != b':' {
        idx += 1;
    }
    if idx >= bytes.len() {
        return f64::NAN;
    }
    idx += 1;
    while idx < bytes.len() && (bytes[idx] as char).is_whitespace() {
        idx += 1;
    }

    let start = idx;
    while idx < bytes.len() {
        let c = bytes[idx] as char;
        if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' || c == 'e' || c == 'E' {
            idx += 1;
        } else {
            break;
        }
    }
    raw[start..idx].parse::<f64>().unwrap_or(f64::NAN)
}

/// Parse a permissive flat JSON object into a [`Datapoint`]. Missing keys
/// are `NaN`; a value that is present but unparseable is also `NaN`.
pub fn parse_json(raw: &str) -> Datapoint {
    let values: Vec<f64> = FIELD_NAMES.iter().map(|k| find_json_number(raw, k)).collect();
    Datapoint {
        timestamp: values[0],
        export_bytes: values[1],
        export_flows: values[2],
        export_packets: values[3],
        export_rtr: values[4],
        export_rtt: values[5],
        export_srt: values[6],
    }
}

/// A successfully parsed legacy CSV `ts,bs,br` row, forwarded unchanged on
/// `proc`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyRecord {
    pub ts: i64,
    pub bs: i64,
    pub br: i64,
}

impl LegacyRecord {
    /// `in0 = bs/2000`, `in1 = br/2000`, both clamped to `[0,1]`.
    pub fn history_key(&self) -> (f32, f32) {
        let in0 = clamp01_or_zero(self.bs as f64 / 2000.0);
        let in1 = clamp01_or_zero(self.br as f64 / 2000.0);
        (in0, in1)
    }
}

/// Parse `ts,bs,br`: three integer fields, `bs`/`br` must be non-negative.
/// Malformed field counts/tokens and negative `bs`/`br` are rejected.
pub fn parse_legacy_csv(raw: &str) -> Result<LegacyRecord, PreprocessError> {
    let fields: Vec<&str> = raw.trim().split(',').collect();
    if fields.len() != 3 {
        return Err(PreprocessError::MalformedCsv(raw.to_string()));
    }
    let ts: i64 = fields[0]
        .trim()
        .parse()
        .map_err(|_| PreprocessError::MalformedCsv(raw.to_string()))?;
    let bs: i64 = fields[1]
        .trim()
        .parse()
        .map_err(|_| PreprocessError::MalformedCsv(raw.to_string()))?;
    let br: i64 = fields[2]
        .trim()
        .parse()
        .map_err(|_| PreprocessError::MalformedCsv(raw.to_string()))?;
    if bs < 0 {
        return Err(PreprocessError::NegativeField { field: "bs", value: bs });
    }
    if br < 0 {
        return Err(PreprocessError::NegativeField { field: "br", value: br });
    }
    Ok(LegacyRecord { ts, bs, br })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_json_by_brace() {
        assert!(is_json_payload("  {\"timestamp\":1}"));
    }

    #[test]
    fn classifies_json_by_field_token() {
        assert!(is_json_payload("export_bytes=5,flows=6"));
    }

    #[test]
    fn classifies_legacy_csv() {
        assert!(!is_json_payload("1700000000,1500,1500"));
    }

    #[test]
    fn json_happy_path_round_trips_to_proc_line() {
        let raw = r#"{"timestamp":1700000000,"export_bytes":1234567,"export_flows":50,"export_packets":1000,"export_rtr":1.0,"export_rtt":2000,"export_srt":3000}"#;
        let dp = parse_json(raw);
        assert_eq!(
            dp.to_proc_line(),
            "1700000000000,1234567.000000,50.000000,1000.000000,1.000000,2000.000000,3000.000000"
        );
    }

    #[test]
    fn json_missing_fields_stay_nan() {
        let dp = parse_json("{}");
        assert!(dp.is_all_nan());
    }

    #[test]
    fn json_tolerates_bare_keys_and_whitespace() {
        let dp = parse_json("{ timestamp : 5 , export_bytes : 10 }");
        assert_eq!(dp.timestamp, 5.0);
        assert_eq!(dp.export_bytes, 10.0);
    }

    #[test]
    fn legacy_csv_happy_path() {
        let rec = parse_legacy_csv("1700000000,1500,1500").unwrap();
        assert_eq!(rec.ts, 1700000000);
        assert_eq!(rec.bs, 1500);
        assert_eq!(rec.br, 1500);
        let (in0, in1) = rec.history_key();
        assert!((in0 - 0.75).abs() < 1e-6);
        assert!((in1 - 0.75).abs() < 1e-6);
    }

    #[test]
    fn legacy_csv_rejects_negative_field() {
        let err = parse_legacy_csv("1700000000,-5,10").unwrap_err();
        assert!(matches!(err, PreprocessError::NegativeField { field: "bs", value: -5 }));
    }

    #[test]
    fn legacy_csv_rejects_wrong_arity() {
        assert!(parse_legacy_csv("1700000000,1500").is_err());
    }

    #[test]
    fn history_key_clamps_to_unit_interval() {
        let dp = Datapoint {
            timestamp: 0.0,
            export_bytes: 5_000_000.0, // > 1e6 -> clamps to 1.0
            export_flows: -10.0,       // negative -> clamps to 0.0
            export_packets: 0.0,
            export_rtr: 0.0,
            export_rtt: 0.0,
            export_srt: 0.0,
        };
        let (in0, in1) = dp.history_key();
        assert_eq!(in0, 1.0);
        assert_eq!(in1, 0.0);
    }
}
