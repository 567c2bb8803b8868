//! Extraction gateway implementations.
//!
//! - **[`DisabledGateway`]** fails every call; used when `extraction.provider = "disabled"`.
//! - **[`OpenAiGateway`]** calls the chat completions API in JSON mode, with retry and backoff.
//!
//! Use [`create_gateway`] to build the one the configuration asks for.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Whatever error is left after the retries reaches the reconciliation
//! driver, which defers the comment to the next pass.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use timeline_sync_core::gateway::{parse_extraction, Extraction, ExtractionGateway};

use crate::config::ExtractionConfig;

pub const SYSTEM_PROMPT: &str = r#"You read one comment from a UK naturalisation timeline thread and turn it into a single structured row.
Comments are informal, often edited several times, and may contain unrelated chatter.

Respond with exactly this JSON object and nothing else:
{
  "category": "<string>",
  "method": "<Online|Paper|Other>",
  "application_date": "<YYYY-MM-DD|N/A>",
  "biometric_date": "<YYYY-MM-DD|N/A>",
  "approval_date": "<YYYY-MM-DD|N/A>",
  "ceremony_date": "<YYYY-MM-DD|N/A>",
  "skip": <true|false>
}

Rules:
1. Set "skip": true when the comment is not a personal timeline (a question, a reply, a joke)
   or gives no route and no date at all. Use "N/A" for every date in that case.
2. "category" is one base route, optionally followed by qualifiers:
     ILR, EUSS, MN1 (Child), Form T, BNO, Armed Forces
   Qualifiers, only when stated explicitly: " (+ Marriage)" for the spouse of a British citizen,
   " (+ DV)" for the domestic violence route, " (+ Refugee)" for refugees.
   Do not add visa history, councils or durations.
3. "method" is Online unless the comment says the application was made on paper.
   Applying through a solicitor's portal counts as Online.
4. Dates are written as YYYY-MM-DD. Numeric dates in the comment are day-first (03/04/2025 is
   3 April 2025); two-digit years are 20xx. A month without a day, "TBC", "pending" or anything
   missing becomes "N/A". When an edit updates a date, use the most recent value.
5. Never put free text in a date field and never add extra keys."#;

pub const USER_PROMPT_TEMPLATE: &str = r#"Comment:

{body}

Return the JSON object described above. Use the latest values if the comment was edited,
and set "skip": true if this is not somebody's own timeline."#;

pub fn user_prompt(body: &str) -> String {
    USER_PROMPT_TEMPLATE.replace("{body}", body)
}

// ============ Disabled Gateway ============

/// Gateway used when extraction is not configured. Every call fails, so
/// new and edited comments are deferred rather than guessed at.
pub struct DisabledGateway;

#[async_trait]
impl ExtractionGateway for DisabledGateway {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn extract(&self, _content: &str) -> Result<Extraction> {
        bail!("Extraction provider is disabled")
    }
}

// ============ OpenAI Gateway ============

/// Extraction via the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_retries: u32,
}

impl OpenAiGateway {
    pub fn new(config: &ExtractionConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("extraction.model required for OpenAI provider"))?;

        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, content: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(content)},
            ],
        })
    }
}

#[async_trait]
impl ExtractionGateway for OpenAiGateway {
    fn name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, content: &str) -> Result<Extraction> {
        let body = self.request_body(content);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        let text = message_content(&json)?;
                        return parse_extraction(text);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "OpenAI API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Extraction failed after retries")))
    }
}

/// Pull `choices[0].message.content` out of a chat completion.
fn message_content(json: &serde_json::Value) -> Result<&str> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
}

/// Create the gateway named by `extraction.provider`.
///
/// | Config Value | Gateway |
/// |-------------|---------|
/// | `"disabled"` | [`DisabledGateway`] |
/// | `"openai"` | [`OpenAiGateway`] |
pub fn create_gateway(config: &ExtractionConfig) -> Result<Box<dyn ExtractionGateway>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGateway)),
        "openai" => Ok(Box::new(OpenAiGateway::new(config)?)),
        other => bail!("Unknown extraction provider: {}", other),
    }
}
