//! net-analyzer: a UDP-ingest streaming analyzer for network-telemetry
//! records.
//!
//! Five pipeline stages — ingest, preprocess, predictor, representer, UI —
//! run as dedicated OS threads connected by closable FIFO
//! [`channel::Channel`]s of owned strings, with a shared
//! [`stats::StatsRegistry`] read by the UI and written by every producer
//! stage.

pub mod channel;
pub mod config;
pub mod datapoint;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod predictor;
pub mod preprocess;
pub mod representer;
pub mod stats;
pub mod ui;
