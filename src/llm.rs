//! Optional, out-of-band LLM interpretation of representer lines.
//!
//! Gated on the presence of `OPENAI_API_KEY`; dispatched onto a small
//! dedicated `tokio` runtime so a stalled HTTP call can never block a
//! pipeline thread. Failures are logged at `warn` and otherwise
//! swallowed — this path must never affect pipeline correctness.

use std::sync::Arc;
use std::time::Duration;

const MAX_TOKENS: u32 = 256;
const SYSTEM_PROMPT: &str =
    "You are a terse network-operations assistant. Interpret the following prediction line in one sentence.";

#[derive(Clone)]
pub struct LlmClient {
    api_key: Arc<str>,
    runtime: Arc<tokio::runtime::Runtime>,
    http: reqwest::Client,
}

impl LlmClient {
    /// Returns `None` when `OPENAI_API_KEY` is unset — the optional path
    /// is simply not constructed, rather than constructed-but-disabled.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .ok()?;
        Some(Self {
            api_key: Arc::from(api_key.as_str()),
            runtime: Arc::new(runtime),
            http: reqwest::Client::new(),
        })
    }

    /// Fire-and-forget: spawn a task on the dedicated runtime to interpret
    /// `line`. Never blocks the caller, never propagates an error.
    pub fn interpret_async(&self, line: String) {
        let api_key = self.api_key.clone();
        let http = self.http.clone();
        self.runtime.spawn(async move {
            match call_chat_completion(&http, &api_key, &line).await {
                Ok(reply) => tracing::info!(%reply, "llm interpretation"),
                Err(e) => tracing::warn!(error = %e, "llm interpretation call failed"),
            }
        });
    }
}

async fn call_chat_completion(http: &reqwest::Client, api_key: &str, line: &str) -> anyhow::Result<String> {
    let body = serde_json::json!({
        "model": "gpt-4o-mini",
        "max_tokens": MAX_TOKENS,
        "messages": [
            {"role": "system", "content": SYSTEM_PROMPT},
            {"role": "user", "content": line},
        ],
    });

    let resp = http
        .post("https://api.openai.com/v1/chat/completions")
        .bearer_auth(api_key)
        .json(&body)
        .timeout(Duration::from_secs(10))
        .send()
        .await?
        .error_for_status()?;

    let value: serde_json::Value = resp.json().await?;
    let reply = value["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();
    Ok(reply)
}
