//! Representer stage: logs every prediction line verbatim, tracks the
//! most recently observed target, and raises an anomaly event on the
//! `error` channel when a first-component prediction runs away from it.
//!
//! Tokens are scanned left-to-right as they appear in the line so that a
//! `pred_prev,pred,<...>,target,<...>,cost,<...>` line is checked against
//! the *previous* target before this line's own target value takes over —
//! matching how a standalone `"pred,<p>"` line is checked against whatever
//! `"target,<v>"` line preceded it on the channel.

use std::sync::Arc;

use crate::channel::Channel;

const ANOMALY_THRESHOLD: f64 = 1e5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyEvent {
    pub last_target: f64,
    pub prediction: f64,
    pub diff: f64,
}

impl AnomalyEvent {
    pub fn to_error_line(self) -> String {
        format!(
            "anomaly,last_target,{},prediction,{},diff,{}",
            self.last_target, self.prediction, self.diff
        )
    }
}

pub struct Representer {
    last_target_first: Option<f64>,
}

impl Representer {
    pub fn new() -> Self {
        Self { last_target_first: None }
    }

    /// Process one repr-channel line, returning an anomaly event if the
    /// rule fired anywhere in the line's token stream.
    pub fn process_line(&mut self, line: &str) -> Option<AnomalyEvent> {
        let tokens: Vec<&str> = line.split(',').collect();
        let mut event = None;
        let mut i = 0;
        while i < tokens.len() {
            match tokens[i] {
                "pred" if i + 1 < tokens.len() => {
                    if let Ok(p) = tokens[i + 1].parse::<f64>() {
                        if let Some(last_target) = self.last_target_first {
                            let diff = p - last_target;
                            if diff > ANOMALY_THRESHOLD && event.is_none() {
                                event = Some(AnomalyEvent { last_target, prediction: p, diff });
                            }
                        }
                    }
                    i += 2;
                }
                "target" if i + 1 < tokens.len() => {
                    if let Ok(t) = tokens[i + 1].parse::<f64>() {
                        self.last_target_first = Some(t);
                    }
                    i += 2;
                }
                _ => i += 1,
            }
        }
        event
    }
}

impl Default for Representer {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the representer stage to completion: pops lines off `repr`, logs
/// each verbatim, and pushes an anomaly line to `error` when the rule
/// fires. Optionally dispatches an out-of-band LLM interpretation call
/// when `llm` is present; failures there are logged and otherwise ignored.
/// Closes `error` on exit, completing the topological shutdown chain.
pub fn run(repr: Arc<Channel>, error: Arc<Channel>, llm: Option<crate::llm::LlmClient>) {
    let mut representer = Representer::new();
    tracing::info!("representer stage started");

    while let Some(line) = repr.pop() {
        tracing::info!(%line, "repr");

        if let Some(event) = representer.process_line(&line) {
            tracing::warn!(
                last_target = event.last_target,
                prediction = event.prediction,
                diff = event.diff,
                "anomaly detected"
            );
            error.push(event.to_error_line());
        }

        if let Some(client) = &llm {
            client.interpret_async(line.clone());
        }
    }

    error.close();
    tracing::info!("representer stage shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_anomaly_without_a_prior_target() {
        let mut rep = Representer::new();
        assert_eq!(rep.process_line("pred,1200000,cost,0.1"), None);
    }

    #[test]
    fn anomaly_fires_when_prediction_runs_away_from_target() {
        let mut rep = Representer::new();
        assert_eq!(rep.process_line("target,1000000"), None);
        let event = rep.process_line("pred,1200000,cost,0.1").unwrap();
        assert_eq!(event.last_target, 1_000_000.0);
        assert_eq!(event.prediction, 1_200_000.0);
        assert_eq!(event.diff, 200_000.0);
    }

    #[test]
    fn no_anomaly_within_threshold() {
        let mut rep = Representer::new();
        rep.process_line("target,1000000");
        assert_eq!(rep.process_line("pred,1000050,cost,0.1"), None);
    }

    #[test]
    fn pred_prev_line_checks_against_the_prior_target_not_its_own() {
        let mut rep = Representer::new();
        rep.process_line("target,100");
        // This single line both predicts far beyond the old target (100)
        // and carries a fresh target of its own; the anomaly check must
        // use the old target (100), not the new one (50), since "pred"
        // appears before "target" in the token stream.
        let event = rep
            .process_line("pred_prev,pred,300000,target,50,cost,0.2")
            .unwrap();
        assert_eq!(event.last_target, 100.0);
        assert_eq!(event.prediction, 300000.0);
    }
}
